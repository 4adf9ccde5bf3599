//! Bulk HbA1c triage pipeline.
//!
//! Resolves the HbA1c code definition, pulls the latest eligible observation
//! and the care-program enrollment flag for every requested patient, and
//! classifies each patient into a risk tier. One result per patient: a
//! single patient's bad data never aborts the batch, and store-level
//! failures come back as error results instead of a raised fault.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{DIABETES_PROGRAM_KEYWORD, HBA1C_CODE_NAME};
use crate::db::{repository, DatabaseError};
use crate::models::enums::RiskCategory;
use crate::models::{AssessmentRequest, AssessmentResult, Observation};

/// Values below this classify as well controlled.
pub const NEEDS_ATTENTION_FROM: f64 = 7.0;
/// Values at or above this classify as high risk.
pub const HIGH_RISK_FROM: f64 = 9.0;

/// Fixed message when the code definition cannot be resolved.
pub const CODE_NOT_FOUND_MESSAGE: &str = "HbA1c CodeSet not found in the system";
/// Message attached to requests arriving without a patient identifier.
pub const MISSING_PATIENT_ID_MESSAGE: &str = "patient identifier is required";

// ─── Read seam ───────────────────────────────────────────────────────────────

/// Narrow read interface the pipeline consumes. One production
/// implementation ([`SqliteStore`]); tests substitute fakes for call
/// counting and fault injection.
pub trait AssessmentStore {
    /// Resolve a code definition by exact display name.
    fn resolve_code(&self, display_name: &str) -> Result<Option<Uuid>, DatabaseError>;

    /// Most recent eligible observation per patient, at most one entry each.
    fn latest_eligible_observations(
        &self,
        code_id: &Uuid,
        patient_ids: &[String],
    ) -> Result<HashMap<String, Observation>, DatabaseError>;

    /// Enrollment flag per patient, total over the requested set.
    fn active_program_enrollment(
        &self,
        patient_ids: &[String],
        program_keyword: &str,
    ) -> Result<HashMap<String, bool>, DatabaseError>;
}

/// [`AssessmentStore`] backed by the SQLite read store.
pub struct SqliteStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AssessmentStore for SqliteStore<'_> {
    fn resolve_code(&self, display_name: &str) -> Result<Option<Uuid>, DatabaseError> {
        repository::resolve_code_id(self.conn, display_name)
    }

    fn latest_eligible_observations(
        &self,
        code_id: &Uuid,
        patient_ids: &[String],
    ) -> Result<HashMap<String, Observation>, DatabaseError> {
        repository::latest_eligible_observations(self.conn, code_id, patient_ids)
    }

    fn active_program_enrollment(
        &self,
        patient_ids: &[String],
        program_keyword: &str,
    ) -> Result<HashMap<String, bool>, DatabaseError> {
        repository::active_program_enrollment(self.conn, patient_ids, program_keyword)
    }
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Risk tier for an HbA1c value. Total over presence and magnitude: absent
/// values map to `NoData`. Thresholds are exact comparisons — 7.0 and 9.0
/// land in the upper band.
pub fn classify(hba1c_value: Option<f64>) -> RiskCategory {
    match hba1c_value {
        None => RiskCategory::NoData,
        Some(v) if v < NEEDS_ATTENTION_FROM => RiskCategory::WellControlled,
        Some(v) if v < HIGH_RISK_FROM => RiskCategory::NeedsAttention,
        Some(_) => RiskCategory::HighRisk,
    }
}

/// A fault while evaluating one patient. Caught at that patient's
/// granularity; the rest of the batch continues.
#[derive(Debug, Error)]
pub enum PatientFault {
    #[error("observation carries a non-finite HbA1c value ({0})")]
    NonFiniteValue(f64),
}

/// Pure per-patient evaluation from the frozen maps.
fn evaluate_patient(
    patient_id: &str,
    observation: Option<&Observation>,
    enrolled: Option<bool>,
) -> Result<AssessmentResult, PatientFault> {
    let mut result = AssessmentResult::new(patient_id);

    if let Some(value) = observation.and_then(|obs| obs.value_quantity) {
        if !value.is_finite() {
            return Err(PatientFault::NonFiniteValue(value));
        }
        result.hba1c_value = Some(value);
    }
    result.risk_category = Some(classify(result.hba1c_value));

    // The enrollment map is total over the request set; the default is
    // defensive only.
    result.in_care_program = enrolled.unwrap_or(false);

    Ok(result)
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Assess a batch of patients.
///
/// Always returns one result per requested patient: per-patient faults are
/// converted into error results carrying the patient identifier, and
/// system-level failures (unresolvable code, unreachable store) produce an
/// identical error result for every patient rather than a raised fault.
/// Results carry no ordering guarantee.
pub fn assess(store: &impl AssessmentStore, requests: &[AssessmentRequest]) -> Vec<AssessmentResult> {
    if requests.is_empty() {
        return Vec::new();
    }

    // Boundary validation: blank identifiers are flagged, not skipped;
    // duplicates collapse to one result, first occurrence wins.
    let mut patient_ids: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut flagged: Vec<AssessmentResult> = Vec::new();
    for request in requests {
        let id = request.patient_id.trim();
        if id.is_empty() {
            flagged.push(AssessmentResult::failed(
                request.patient_id.clone(),
                MISSING_PATIENT_ID_MESSAGE,
            ));
        } else if seen.insert(id.to_string()) {
            patient_ids.push(id.to_string());
        }
    }
    if patient_ids.is_empty() {
        return flagged;
    }

    tracing::info!(
        patients = patient_ids.len(),
        flagged = flagged.len(),
        "starting triage batch"
    );

    let code_id = match store.resolve_code(HBA1C_CODE_NAME) {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::error!("{CODE_NOT_FOUND_MESSAGE}");
            return batch_failure(&patient_ids, flagged, CODE_NOT_FOUND_MESSAGE);
        }
        Err(e) => {
            tracing::error!("code resolution failed: {e}");
            let message = format!("code resolution failed: {e}");
            return batch_failure(&patient_ids, flagged, &message);
        }
    };

    let observations = match store.latest_eligible_observations(&code_id, &patient_ids) {
        Ok(map) => map,
        Err(e) => {
            tracing::error!("observation retrieval failed: {e}");
            let message = format!("observation retrieval failed: {e}");
            return batch_failure(&patient_ids, flagged, &message);
        }
    };

    let enrollment =
        match store.active_program_enrollment(&patient_ids, DIABETES_PROGRAM_KEYWORD) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("enrollment retrieval failed: {e}");
                let message = format!("enrollment retrieval failed: {e}");
                return batch_failure(&patient_ids, flagged, &message);
            }
        };

    // Both maps are frozen; each patient evaluates independently.
    let mut results: Vec<AssessmentResult> = Vec::with_capacity(patient_ids.len() + flagged.len());
    for patient_id in &patient_ids {
        let evaluated = evaluate_patient(
            patient_id,
            observations.get(patient_id),
            enrollment.get(patient_id).copied(),
        );
        results.push(match evaluated {
            Ok(result) => result,
            Err(fault) => {
                tracing::warn!("assessment failed for patient {patient_id}: {fault}");
                AssessmentResult::failed(
                    patient_id,
                    format!("assessment failed for patient {patient_id}: {fault}"),
                )
            }
        });
    }
    results.extend(flagged);

    tracing::info!(results = results.len(), "triage batch complete");
    results
}

/// Identical error result for every patient — system-level short circuit.
fn batch_failure(
    patient_ids: &[String],
    flagged: Vec<AssessmentResult>,
    message: &str,
) -> Vec<AssessmentResult> {
    let mut results: Vec<AssessmentResult> = patient_ids
        .iter()
        .map(|id| AssessmentResult::failed(id, message))
        .collect();
    results.extend(flagged);
    results
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use rusqlite::params;

    use super::*;
    use crate::db::sqlite::open_memory_database;

    // A fake store: canned data, call counters, injectable failures.
    #[derive(Default)]
    struct FakeStore {
        code_id: Option<Uuid>,
        observations: HashMap<String, Observation>,
        enrollment: HashMap<String, bool>,
        fail_resolve: bool,
        fail_observations: bool,
        fail_enrollment: bool,
        calls: RefCell<CallLog>,
    }

    #[derive(Default)]
    struct CallLog {
        resolve: u32,
        observations: u32,
        enrollment: u32,
    }

    fn store_error() -> DatabaseError {
        DatabaseError::ConstraintViolation("store offline".into())
    }

    impl AssessmentStore for FakeStore {
        fn resolve_code(&self, _display_name: &str) -> Result<Option<Uuid>, DatabaseError> {
            self.calls.borrow_mut().resolve += 1;
            if self.fail_resolve {
                return Err(store_error());
            }
            Ok(self.code_id)
        }

        fn latest_eligible_observations(
            &self,
            _code_id: &Uuid,
            patient_ids: &[String],
        ) -> Result<HashMap<String, Observation>, DatabaseError> {
            self.calls.borrow_mut().observations += 1;
            if self.fail_observations {
                return Err(store_error());
            }
            Ok(self
                .observations
                .iter()
                .filter(|(id, _)| patient_ids.contains(id))
                .map(|(id, obs)| (id.clone(), obs.clone()))
                .collect())
        }

        fn active_program_enrollment(
            &self,
            patient_ids: &[String],
            _program_keyword: &str,
        ) -> Result<HashMap<String, bool>, DatabaseError> {
            self.calls.borrow_mut().enrollment += 1;
            if self.fail_enrollment {
                return Err(store_error());
            }
            Ok(patient_ids
                .iter()
                .map(|id| (id.clone(), *self.enrollment.get(id).unwrap_or(&false)))
                .collect())
        }
    }

    fn observation(subject: &str, value: Option<f64>) -> Observation {
        use crate::models::enums::{ObservationStatus, ValueKind};
        Observation {
            id: Uuid::new_v4(),
            subject_id: subject.into(),
            code_id: Uuid::new_v4(),
            status: ObservationStatus::Final,
            value_kind: ValueKind::Quantity,
            value_quantity: value,
            unit: Some("%".into()),
            effective_at: None,
        }
    }

    fn ready_store() -> FakeStore {
        FakeStore {
            code_id: Some(Uuid::new_v4()),
            ..FakeStore::default()
        }
    }

    fn requests(ids: &[&str]) -> Vec<AssessmentRequest> {
        ids.iter().map(|id| AssessmentRequest::new(*id)).collect()
    }

    fn result_for<'a>(results: &'a [AssessmentResult], id: &str) -> &'a AssessmentResult {
        results.iter().find(|r| r.patient_id == id).unwrap()
    }

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(Some(6.99)), RiskCategory::WellControlled);
        assert_eq!(classify(Some(7.0)), RiskCategory::NeedsAttention);
        assert_eq!(classify(Some(8.99)), RiskCategory::NeedsAttention);
        assert_eq!(classify(Some(9.0)), RiskCategory::HighRisk);
        assert_eq!(classify(None), RiskCategory::NoData);
    }

    #[test]
    fn empty_batch_issues_no_store_calls() {
        let store = ready_store();
        let results = assess(&store, &[]);
        assert!(results.is_empty());
        let calls = store.calls.borrow();
        assert_eq!(calls.resolve, 0);
        assert_eq!(calls.observations, 0);
        assert_eq!(calls.enrollment, 0);
    }

    #[test]
    fn one_result_per_distinct_patient() {
        let store = ready_store();
        let results = assess(&store, &requests(&["p-1", "p-2", "p-1"]));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn blank_patient_id_flagged_not_skipped() {
        let store = ready_store();
        let results = assess(&store, &requests(&["p-1", "  "]));
        assert_eq!(results.len(), 2);

        let flagged = results.iter().find(|r| r.error.is_some()).unwrap();
        assert_eq!(flagged.error.as_deref(), Some(MISSING_PATIENT_ID_MESSAGE));
        assert!(result_for(&results, "p-1").error.is_none());
    }

    #[test]
    fn all_blank_batch_never_touches_the_store() {
        let store = ready_store();
        let results = assess(&store, &requests(&["", "   "]));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.error.is_some()));
        assert_eq!(store.calls.borrow().resolve, 0);
    }

    #[test]
    fn unresolved_code_fails_every_patient_identically() {
        let store = FakeStore::default(); // code_id: None
        let results = assess(&store, &requests(&["p-1", "p-2"]));
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.error.as_deref(), Some(CODE_NOT_FOUND_MESSAGE));
            assert!(result.hba1c_value.is_none());
            assert!(result.risk_category.is_none());
        }
        // Short-circuit: neither fetch was issued.
        let calls = store.calls.borrow();
        assert_eq!(calls.observations, 0);
        assert_eq!(calls.enrollment, 0);
    }

    #[test]
    fn store_failure_during_resolution_fails_the_batch() {
        let store = FakeStore {
            fail_resolve: true,
            ..ready_store()
        };
        let results = assess(&store, &requests(&["p-1", "p-2"]));
        assert_eq!(results.len(), 2);
        for result in &results {
            let message = result.error.as_deref().unwrap();
            assert!(message.starts_with("code resolution failed"), "{message}");
        }
    }

    #[test]
    fn observation_fetch_failure_is_reported_per_patient() {
        let store = FakeStore {
            fail_observations: true,
            ..ready_store()
        };
        let results = assess(&store, &requests(&["p-1"]));
        let message = results[0].error.as_deref().unwrap();
        assert!(message.starts_with("observation retrieval failed"), "{message}");
    }

    #[test]
    fn enrollment_fetch_failure_is_reported_per_patient() {
        let store = FakeStore {
            fail_enrollment: true,
            ..ready_store()
        };
        let results = assess(&store, &requests(&["p-1"]));
        let message = results[0].error.as_deref().unwrap();
        assert!(message.starts_with("enrollment retrieval failed"), "{message}");
    }

    #[test]
    fn missing_observation_classifies_as_no_data() {
        let store = ready_store();
        let results = assess(&store, &requests(&["p-1"]));
        let result = &results[0];
        assert!(result.hba1c_value.is_none());
        assert_eq!(result.risk_category, Some(RiskCategory::NoData));
        assert!(result.error.is_none());
    }

    #[test]
    fn value_and_enrollment_flow_into_the_result() {
        let mut store = ready_store();
        store
            .observations
            .insert("p-1".into(), observation("p-1", Some(9.4)));
        store.enrollment.insert("p-1".into(), true);

        let results = assess(&store, &requests(&["p-1", "p-2"]));
        let p1 = result_for(&results, "p-1");
        assert_eq!(p1.hba1c_value, Some(9.4));
        assert_eq!(p1.risk_category, Some(RiskCategory::HighRisk));
        assert!(p1.in_care_program);

        let p2 = result_for(&results, "p-2");
        assert_eq!(p2.risk_category, Some(RiskCategory::NoData));
        assert!(!p2.in_care_program);
    }

    #[test]
    fn fault_on_one_patient_leaves_the_rest_intact() {
        let mut store = ready_store();
        store
            .observations
            .insert("p-a".into(), observation("p-a", Some(6.5)));
        store
            .observations
            .insert("p-b".into(), observation("p-b", Some(f64::NAN)));

        let results = assess(&store, &requests(&["p-a", "p-b"]));

        let ok = result_for(&results, "p-a");
        assert_eq!(ok.risk_category, Some(RiskCategory::WellControlled));
        assert!(ok.error.is_none());

        let faulted = result_for(&results, "p-b");
        let message = faulted.error.as_deref().unwrap();
        assert!(message.contains("p-b"), "{message}");
        assert!(message.contains("non-finite"), "{message}");
        assert!(faulted.hba1c_value.is_none());
    }

    // End-to-end over the real store implementation.
    #[test]
    fn sqlite_store_end_to_end() {
        let conn = open_memory_database().unwrap();
        let code_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO code_definitions (id, display_name) VALUES (?1, 'HbA1c')",
            params![code_id.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO observations (id, subject_id, code_id, status, value_kind,
             value_quantity, unit, effective_at)
             VALUES (?1, 'p-1', ?2, 'final', 'quantity', 7.2, '%', '2024-01-15 09:00:00')",
            params![Uuid::new_v4().to_string(), code_id.to_string()],
        )
        .unwrap();
        let program_id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO care_programs (id, name) VALUES (?1, 'Type 2 Diabetes Management')",
            params![program_id.to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO program_enrollments (id, patient_id, program_id, status)
             VALUES (?1, 'p-1', ?2, 'active')",
            params![Uuid::new_v4().to_string(), program_id.to_string()],
        )
        .unwrap();

        let store = SqliteStore::new(&conn);
        let results = assess(&store, &requests(&["p-1", "p-2"]));
        assert_eq!(results.len(), 2);

        let p1 = result_for(&results, "p-1");
        assert_eq!(p1.hba1c_value, Some(7.2));
        assert_eq!(p1.risk_category, Some(RiskCategory::NeedsAttention));
        assert!(p1.in_care_program);

        let p2 = result_for(&results, "p-2");
        assert_eq!(p2.risk_category, Some(RiskCategory::NoData));
        assert!(!p2.in_care_program);
        assert!(p2.error.is_none());
    }

    #[test]
    fn sqlite_store_without_code_definition_short_circuits() {
        let conn = open_memory_database().unwrap();
        let store = SqliteStore::new(&conn);
        let results = assess(&store, &requests(&["p-1"]));
        assert_eq!(results[0].error.as_deref(), Some(CODE_NOT_FOUND_MESSAGE));
    }
}
