//! # Deactivation scope backfill
//!
//! One-shot repair of historical population records: for every user whose
//! lifecycle within a (tenant, season) consists of exactly one `USER_ADD`
//! event and one qualifying `USER_DEACTIVATION` event, the scopes stored on
//! the deactivation record are overwritten with the scopes captured at add
//! time.
//!
//! The store only filters, projects and orders each event branch; the pairing
//! itself (group per user, union the branches, first/last reduction, keep
//! groups of exactly two) runs client-side over typed rows in [`aggregate`].
//! [`runner::migrate`] drives the sequential verify-and-patch loop and is
//! generic over [`store::HistoryStore`] so tests can substitute an in-memory
//! store.

#![deny(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod runner;
pub mod store;

pub use crate::{
    config::MigrationConfig,
    error::Error,
    runner::{migrate, MigrationSummary},
    store::{HistoryStore, PgHistoryStore},
};
