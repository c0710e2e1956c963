//! Error types for the backfill run
//!
//! Only two tiers exist at runtime: a candidate that fails its re-read is
//! logged and skipped inside the loop, and everything else propagates here to
//! be caught once at the top level.

use thiserror::Error;

/// Errors raised while running the backfill
#[derive(Debug, Error)]
pub enum Error {
    /// Store connection, query or update failure
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
