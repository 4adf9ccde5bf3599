//! Invocable-surface catalog — field metadata for declarative callers.
//!
//! Automation surfaces (workflow designers, scheduled-job builders) bind to
//! the request/result fields by name; this module hands them the labels and
//! descriptions to render alongside. Serialized as-is over JSON.

use serde::Serialize;

/// Metadata for one exposed field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// Input fields of an assessment request.
pub fn request_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            name: "patient_id",
            label: "Patient ID",
            description: "Identifier of the patient to assess. Requests without one are flagged, not skipped.",
            required: true,
        },
        FieldSpec {
            name: "lookback_days",
            label: "Lookback (days)",
            description: "Reserved for a future recency window on lab retrieval; accepted but not applied yet.",
            required: false,
        },
    ]
}

/// Output fields of an assessment result.
pub fn result_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            name: "patient_id",
            label: "Patient ID",
            description: "Identifier the result belongs to, echoed from the request.",
            required: true,
        },
        FieldSpec {
            name: "hba1c_value",
            label: "HbA1c Value",
            description: "Most recent finalized HbA1c value, absent when the patient has no eligible lab result.",
            required: false,
        },
        FieldSpec {
            name: "risk_category",
            label: "Risk Category",
            description: "well_controlled (< 7.0), needs_attention (7.0–8.99), high_risk (>= 9.0), or no_data.",
            required: false,
        },
        FieldSpec {
            name: "in_care_program",
            label: "In Care Program",
            description: "True when the patient holds an active enrollment in a diabetes-care program.",
            required: true,
        },
        FieldSpec {
            name: "error",
            label: "Error",
            description: "Present when this patient could not be assessed; check before reading other fields.",
            required: false,
        },
    ]
}
