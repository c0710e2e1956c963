//! Client-side pairing of add and deactivation events
//!
//! Each branch arrives already filtered, projected and ordered ascending by
//! timestamp. This module reduces each branch to its chronologically last row
//! per [`GroupKey`], unions the two reductions, re-orders, and re-groups
//! taking the first row's scopes and the last row's record reference. A group
//! survives only when exactly two rows contributed, which pins the first row
//! to the add event and the last row to the deactivation event.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::event::{GroupKey, ProjectedEvent};

/// Which selection branch a row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Qualifying `USER_DEACTIVATION` records; these carry the record
    /// reference to patch
    Deactivation,

    /// `USER_ADD` records
    Add,
}

/// A row of the unioned stream, reshaped to the common form shared by both
/// branches
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleRow {
    /// Grouping key
    pub key: GroupKey,

    /// Timestamp of the contributing record
    pub created_at: DateTime<Utc>,

    /// Scopes held by the user on the contributing record
    pub scopes: Vec<String>,

    /// Opaque payload carried through from the record
    pub miscellaneous: Option<Value>,

    /// Reference to the deactivation record to patch; present only on rows
    /// from the deactivation branch
    pub request_id: Option<Uuid>,
}

/// A paired lifecycle selected for patching
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Grouping key
    pub key: GroupKey,

    /// Number of rows that contributed to the group
    pub count: usize,

    /// Scopes of the chronologically first row, expected to be the add event
    pub scopes: Vec<String>,

    /// Timestamp of the chronologically first row
    pub last_updated: DateTime<Utc>,

    /// Timestamp of the chronologically last row
    pub deactivated_at: DateTime<Utc>,

    /// Record reference of the chronologically last row; `None` when that row
    /// came from the add branch
    pub request_id: Option<Uuid>,
}

/// Reduce one ordered branch to its chronologically last row per key
///
/// `events` must be ordered ascending by `created_at`; later rows replace
/// earlier ones under the same key.
pub fn group_last(events: Vec<ProjectedEvent>, branch: Branch) -> Vec<LifecycleRow> {
    let mut latest: BTreeMap<GroupKey, LifecycleRow> = BTreeMap::new();

    for event in events {
        let key = event.key();

        let row = LifecycleRow {
            key,
            created_at: event.created_at,
            scopes: event.user.scopes,
            miscellaneous: event.miscellaneous,
            request_id: match branch {
                Branch::Deactivation => Some(event.id),
                Branch::Add => None,
            },
        };

        latest.insert(key, row);
    }

    latest.into_iter().map(|(_, row)| row).collect()
}

/// Union the two reduced branches, re-order ascending by timestamp, re-group
/// per key and keep only groups with exactly two contributing rows
///
/// Within a group the first row supplies `scopes` and `last_updated`, the
/// last row supplies `deactivated_at` and `request_id`. The sort is stable,
/// so rows with equal timestamps keep the deactivation branch ahead of the
/// add branch.
pub fn pair_candidates(
    deactivations: Vec<LifecycleRow>,
    adds: Vec<LifecycleRow>,
) -> Vec<Candidate> {
    let mut rows = deactivations;
    rows.extend(adds);
    rows.sort_by_key(|row| row.created_at);

    let mut groups: BTreeMap<GroupKey, Candidate> = BTreeMap::new();

    for row in rows {
        match groups.entry(row.key) {
            Entry::Vacant(slot) => {
                slot.insert(Candidate {
                    key: row.key,
                    count: 1,
                    scopes: row.scopes,
                    last_updated: row.created_at,
                    deactivated_at: row.created_at,
                    request_id: row.request_id,
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                group.count += 1;
                group.deactivated_at = row.created_at;
                group.request_id = row.request_id;
            }
        }
    }

    groups
        .into_iter()
        .map(|(_, group)| group)
        .filter(|group| group.count == 2)
        .collect()
}

/// Full pairing step over the two projected branches
pub fn candidates(
    deactivations: Vec<ProjectedEvent>,
    adds: Vec<ProjectedEvent>,
) -> Vec<Candidate> {
    pair_candidates(
        group_last(deactivations, Branch::Deactivation),
        group_last(adds, Branch::Add),
    )
}
