/// Crate-level constants
pub const APP_NAME: &str = "a1c-triage";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Display name of the lab-test code definition the pipeline resolves.
pub const HBA1C_CODE_NAME: &str = "HbA1c";

/// Substring identifying diabetes-care programs in the enrollment lookup.
pub const DIABETES_PROGRAM_KEYWORD: &str = "Diabetes";

/// Hard cap on rows returned by one bounded observation fetch. Protects the
/// store from unbounded query cost; large patient sets are chunked so no
/// patient is dropped by the cap.
pub const OBSERVATION_FETCH_LIMIT: u32 = 1000;

/// Patients per bounded fetch. Keeps IN-lists well under SQLite's host
/// parameter limit and leaves headroom under OBSERVATION_FETCH_LIMIT for
/// patients with long observation histories.
pub const PATIENT_ID_CHUNK: usize = 200;

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "a1c_triage=info,warn".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_fits_inside_fetch_cap() {
        // Every patient in a chunk must be able to surface at least one row.
        assert!(PATIENT_ID_CHUNK as u32 <= OBSERVATION_FETCH_LIMIT);
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
