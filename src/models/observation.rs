use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ObservationStatus, ValueKind};

/// A clinical observation row as returned by the read store.
///
/// `subject_id` is the external patient identifier and is treated as opaque;
/// row ids are owned by the store itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    pub subject_id: String,
    pub code_id: Uuid,
    pub status: ObservationStatus,
    pub value_kind: ValueKind,
    pub value_quantity: Option<f64>,
    pub unit: Option<String>,
    pub effective_at: Option<NaiveDateTime>,
}
