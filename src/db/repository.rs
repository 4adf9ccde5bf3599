//! Read-side queries for the triage pipeline — code lookup, latest eligible
//! observations, active program enrollment.
//!
//! This layer is read-only: the pipeline never writes back to the store.
//! Bulk lookups chunk the patient-id set so no single query exceeds the
//! bounded fetch size or SQLite's host-parameter limit.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use super::DatabaseError;
use crate::config::{OBSERVATION_FETCH_LIMIT, PATIENT_ID_CHUNK};
use crate::models::enums::{EnrollmentStatus, ObservationStatus, ValueKind};
use crate::models::Observation;

// ═══════════════════════════════════════════
// Code reference lookup
// ═══════════════════════════════════════════

/// Resolves a code definition by exact display name.
///
/// Returns `None` when no definition matches; store errors propagate and
/// short-circuit the whole batch upstream.
pub fn resolve_code_id(
    conn: &Connection,
    display_name: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id FROM code_definitions WHERE display_name = ?1 LIMIT 1",
        params![display_name],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(id) => Ok(Some(parse_row_id(&id)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ═══════════════════════════════════════════
// Observation lookup
// ═══════════════════════════════════════════

/// Fetches the single most recent eligible observation per patient.
///
/// Eligible means: matching code, final status, quantity value kind, and a
/// non-null numeric value. Rows come back ordered by effective timestamp
/// descending with absent timestamps last; the first row seen per subject
/// wins and later rows are discarded. Ties on the timestamp resolve to
/// whichever row the store returns first.
///
/// The patient set is chunked into bounded fetches; each fetch is capped at
/// OBSERVATION_FETCH_LIMIT rows, so a chunk whose eligible history exceeds
/// the cap surfaces only its most recent rows.
pub fn latest_eligible_observations(
    conn: &Connection,
    code_id: &Uuid,
    patient_ids: &[String],
) -> Result<HashMap<String, Observation>, DatabaseError> {
    let mut latest: HashMap<String, Observation> = HashMap::new();
    if patient_ids.is_empty() {
        return Ok(latest);
    }

    let code = code_id.to_string();
    for chunk in patient_ids.chunks(PATIENT_ID_CHUNK) {
        let placeholders = numbered_placeholders(2, chunk.len());
        let sql = format!(
            "SELECT id, subject_id, code_id, status, value_kind, value_quantity, unit, effective_at
             FROM observations
             WHERE code_id = ?1
               AND status = '{status}'
               AND value_kind = '{kind}'
               AND value_quantity IS NOT NULL
               AND subject_id IN ({placeholders})
             ORDER BY (effective_at IS NULL), effective_at DESC
             LIMIT {limit}",
            status = ObservationStatus::Final.as_str(),
            kind = ValueKind::Quantity.as_str(),
            limit = OBSERVATION_FETCH_LIMIT,
        );

        let mut bind: Vec<&str> = Vec::with_capacity(chunk.len() + 1);
        bind.push(&code);
        bind.extend(chunk.iter().map(String::as_str));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), observation_row_from_rusqlite)?;

        for row in rows {
            let obs = observation_from_row(row?)?;
            // First row per subject is the most recent eligible one.
            latest.entry(obs.subject_id.clone()).or_insert(obs);
        }
    }

    Ok(latest)
}

// ═══════════════════════════════════════════
// Program enrollment lookup
// ═══════════════════════════════════════════

/// Returns an enrollment flag for every requested patient.
///
/// The map is total over `patient_ids`: every patient starts at `false` and
/// is upgraded to `true` when an active enrollment in a program whose name
/// contains `program_keyword` exists. Multiple matches are idempotent. The
/// name match uses SQLite's default LIKE comparison (ASCII
/// case-insensitive).
pub fn active_program_enrollment(
    conn: &Connection,
    patient_ids: &[String],
    program_keyword: &str,
) -> Result<HashMap<String, bool>, DatabaseError> {
    let mut enrolled: HashMap<String, bool> = HashMap::new();
    if patient_ids.is_empty() {
        return Ok(enrolled);
    }

    for id in patient_ids {
        enrolled.insert(id.clone(), false);
    }

    for chunk in patient_ids.chunks(PATIENT_ID_CHUNK) {
        let placeholders = numbered_placeholders(2, chunk.len());
        let sql = format!(
            "SELECT e.patient_id
             FROM program_enrollments e
             JOIN care_programs p ON e.program_id = p.id
             WHERE e.status = '{status}'
               AND p.name LIKE '%' || ?1 || '%'
               AND e.patient_id IN ({placeholders})",
            status = EnrollmentStatus::Active.as_str(),
        );

        let mut bind: Vec<&str> = Vec::with_capacity(chunk.len() + 1);
        bind.push(program_keyword);
        bind.extend(chunk.iter().map(String::as_str));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| row.get::<_, String>(0))?;

        for row in rows {
            enrolled.insert(row?, true);
        }
    }

    Ok(enrolled)
}

// ═══════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════

/// `?N, ?N+1, ...` placeholder list starting at `first`.
fn numbered_placeholders(first: usize, count: usize) -> String {
    (0..count)
        .map(|i| format!("?{}", first + i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_row_id(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

// Internal row type for Observation mapping
struct ObservationRow {
    id: String,
    subject_id: String,
    code_id: String,
    status: String,
    value_kind: String,
    value_quantity: Option<f64>,
    unit: Option<String>,
    effective_at: Option<String>,
}

fn observation_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ObservationRow, rusqlite::Error> {
    Ok(ObservationRow {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        code_id: row.get(2)?,
        status: row.get(3)?,
        value_kind: row.get(4)?,
        value_quantity: row.get(5)?,
        unit: row.get(6)?,
        effective_at: row.get(7)?,
    })
}

fn observation_from_row(row: ObservationRow) -> Result<Observation, DatabaseError> {
    Ok(Observation {
        id: parse_row_id(&row.id)?,
        subject_id: row.subject_id,
        code_id: parse_row_id(&row.code_id)?,
        status: ObservationStatus::from_str(&row.status)?,
        value_kind: ValueKind::from_str(&row.value_kind)?,
        value_quantity: row.value_quantity,
        unit: row.unit,
        effective_at: row.effective_at.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
