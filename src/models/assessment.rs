use serde::{Deserialize, Serialize};

use super::enums::RiskCategory;

/// One patient to assess. Created by the caller, consumed once per batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequest {
    /// External patient identifier. Mandatory; blank values are flagged at
    /// the boundary rather than silently skipped.
    pub patient_id: String,
    /// Reserved for a future recency window on observation retrieval.
    /// Accepted but not applied yet.
    #[serde(default)]
    pub lookback_days: Option<u32>,
}

impl AssessmentRequest {
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            lookback_days: None,
        }
    }
}

/// Per-patient outcome of a triage batch.
///
/// Exactly one is produced per requested patient. When `error` is set the
/// remaining fields may be unset; callers should check it first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub patient_id: String,
    pub hba1c_value: Option<f64>,
    pub risk_category: Option<RiskCategory>,
    pub in_care_program: bool,
    pub error: Option<String>,
}

impl AssessmentResult {
    /// A fresh result with nothing determined yet.
    pub fn new(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            hba1c_value: None,
            risk_category: None,
            in_care_program: false,
            error: None,
        }
    }

    /// A result carrying only an error message.
    pub fn failed(patient_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(patient_id)
        }
    }
}
