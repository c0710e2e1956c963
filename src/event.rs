//! Typed shapes for population history records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Main classification tag on user lifecycle records
pub const MAIN_TYPE_USERS: &str = "USERS";

/// Subtype tag on deactivation records
pub const SUB_TYPE_USER_DEACTIVATION: &str = "USER_DEACTIVATION";

/// Subtype tag on user-add records
pub const SUB_TYPE_USER_ADD: &str = "USER_ADD";

/// Snapshot of a user as embedded in a history record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    /// User ID
    pub id: Uuid,

    /// Role tags held by the user at the time the record was written
    pub scopes: Vec<String>,
}

impl UserSnapshot {
    /// Check whether any held scope is in the given privileged set
    pub fn has_privileged_scope(&self, privileged: &[String]) -> bool {
        self.scopes.iter().any(|scope| privileged.contains(scope))
    }
}

/// A stored population history record
///
/// Immutable history except for the one field this backfill rewrites: the
/// scopes inside the embedded user snapshot on matched deactivation records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationEvent {
    /// Record ID
    pub id: Uuid,

    /// Main classification tag, e.g. `USERS`
    pub main_type: String,

    /// Subtype tag, e.g. `USER_DEACTIVATION` or `USER_ADD`
    pub sub_type: String,

    /// Tenant the record belongs to
    pub tenant_id: i32,

    /// Season the record belongs to
    pub season_id: i32,

    /// Single-element sequence of user snapshots, kept in its historical
    /// array shape
    pub user: Vec<UserSnapshot>,

    /// Opaque payload, passed through unchanged
    pub miscellaneous: Option<serde_json::Value>,

    /// The time at which this record was written
    pub created_at: DateTime<Utc>,
}

/// A record after branch projection: the snapshot sequence unwrapped to its
/// single element
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedEvent {
    /// Source record ID
    pub id: Uuid,

    /// Tenant the record belongs to
    pub tenant_id: i32,

    /// Season the record belongs to
    pub season_id: i32,

    /// The embedded user snapshot
    pub user: UserSnapshot,

    /// Opaque payload carried through the projection
    pub miscellaneous: Option<serde_json::Value>,

    /// The time at which the source record was written
    pub created_at: DateTime<Utc>,
}

impl ProjectedEvent {
    /// The grouping key identifying one user's lifecycle within one tenant
    /// and season
    pub fn key(&self) -> GroupKey {
        GroupKey {
            tenant_id: self.tenant_id,
            season_id: self.season_id,
            user_id: self.user.id,
        }
    }
}

/// Grouping key: one user's lifecycle within one tenant/season
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    /// Tenant ID
    pub tenant_id: i32,

    /// Season ID
    pub season_id: i32,

    /// User ID taken from the embedded snapshot
    pub user_id: Uuid,
}
