//! Fixed run parameters
//!
//! The run is deliberately not configurable: no command-line flags and no
//! environment variables. The cutoff date and the privileged exclusion set
//! are constants of this one repair, and the config struct exists so the
//! runner takes them by parameter instead of reaching for globals.

use chrono::{DateTime, TimeZone, Utc};

/// Connection URL for the live database
pub const DATABASE_URL: &str = "postgres://localhost:5432/mct_live";

/// Scope tags whose presence on a deactivation record excludes it from the
/// backfill
pub const PRIVILEGED_SCOPES: [&str; 2] = ["ATHLET", "COACH"];

/// Parameters for one backfill run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Connection URL of the store holding the history records
    pub database_url: String,

    /// Deactivations at or after this instant are left untouched
    pub cutoff: DateTime<Utc>,

    /// Scope tags that exclude a record from selection
    pub privileged_scopes: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            database_url: DATABASE_URL.to_string(),
            cutoff: Utc.ymd(2020, 12, 31).and_hms(0, 0, 0),
            privileged_scopes: PRIVILEGED_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}
