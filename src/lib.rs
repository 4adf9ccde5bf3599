//! a1c-triage — bulk HbA1c risk assessment over a clinical read store.
//!
//! Given a batch of patient identifiers, the pipeline resolves the HbA1c
//! code definition, fetches each patient's most recent eligible lab
//! observation and diabetes-care-program enrollment, and classifies every
//! patient into a risk tier. One structured result per patient; bad data for
//! one patient never fails the batch. The store is read-only to this crate.

pub mod catalog;
pub mod config;
pub mod db;
pub mod models;
pub mod triage;

pub use models::enums::RiskCategory;
pub use models::{AssessmentRequest, AssessmentResult};
pub use triage::{assess, classify, AssessmentStore, SqliteStore};

use tracing_subscriber::EnvFilter;

/// Initialize tracing for hosts that don't configure their own subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
