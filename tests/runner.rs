//! Runner behaviour over an in-memory store double
//!
//! The double implements the same selection predicate and ordering as the
//! Postgres store, which lets these tests exercise the whole verify-and-patch
//! loop without a live database.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use scope_backfill::event::{
    PopulationEvent, ProjectedEvent, UserSnapshot, MAIN_TYPE_USERS, SUB_TYPE_USER_ADD,
    SUB_TYPE_USER_DEACTIVATION,
};
use scope_backfill::{migrate, Error, HistoryStore, MigrationConfig};

struct MemoryStore {
    records: Mutex<Vec<PopulationEvent>>,

    /// Records removed at the first re-read, to model a concurrent writer
    /// deleting them between selection and patch.
    vanish_before_recheck: Mutex<Vec<Uuid>>,
}

impl MemoryStore {
    fn new(records: Vec<PopulationEvent>) -> Self {
        Self {
            records: Mutex::new(records),
            vanish_before_recheck: Mutex::new(Vec::new()),
        }
    }

    fn vanish_before_recheck(self, ids: Vec<Uuid>) -> Self {
        *self.vanish_before_recheck.lock().unwrap() = ids;
        self
    }

    fn snapshot(&self) -> Vec<PopulationEvent> {
        self.records.lock().unwrap().clone()
    }

    fn apply_vanish(&self) {
        let ids: Vec<Uuid> = self.vanish_before_recheck.lock().unwrap().drain(..).collect();

        if !ids.is_empty() {
            self.records
                .lock()
                .unwrap()
                .retain(|record| !ids.contains(&record.id));
        }
    }
}

fn project(record: &PopulationEvent) -> Option<ProjectedEvent> {
    let user = record.user.first()?.clone();

    Some(ProjectedEvent {
        id: record.id,
        tenant_id: record.tenant_id,
        season_id: record.season_id,
        user,
        miscellaneous: record.miscellaneous.clone(),
        created_at: record.created_at,
    })
}

fn matches_deactivation(record: &PopulationEvent, privileged: &[String]) -> bool {
    record.main_type == MAIN_TYPE_USERS
        && record.sub_type == SUB_TYPE_USER_DEACTIVATION
        && !record
            .user
            .first()
            .map(|user| user.has_privileged_scope(privileged))
            .unwrap_or(false)
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn deactivations_before(
        &self,
        cutoff: DateTime<Utc>,
        privileged: &[String],
    ) -> Result<Vec<ProjectedEvent>, Error> {
        let mut selected: Vec<ProjectedEvent> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| {
                matches_deactivation(record, privileged) && record.created_at < cutoff
            })
            .filter_map(project)
            .collect();

        selected.sort_by_key(|event| event.created_at);

        Ok(selected)
    }

    async fn user_adds(&self) -> Result<Vec<ProjectedEvent>, Error> {
        let mut selected: Vec<ProjectedEvent> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.sub_type == SUB_TYPE_USER_ADD)
            .filter_map(project)
            .collect();

        selected.sort_by_key(|event| event.created_at);

        Ok(selected)
    }

    async fn find_deactivation(
        &self,
        id: Uuid,
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error> {
        self.apply_vanish();

        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.id == id && matches_deactivation(record, privileged))
            .cloned())
    }

    async fn overwrite_scopes(
        &self,
        id: Uuid,
        scopes: &[String],
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error> {
        let mut records = self.records.lock().unwrap();

        let record = records
            .iter_mut()
            .find(|record| record.id == id && matches_deactivation(record, privileged));

        Ok(record.map(|record| {
            for user in &mut record.user {
                user.scopes = scopes.to_vec();
            }

            record.clone()
        }))
    }
}

fn record(
    sub_type: &str,
    tenant_id: i32,
    season_id: i32,
    user_id: Uuid,
    scopes: &[&str],
    created_at: &str,
) -> PopulationEvent {
    PopulationEvent {
        id: Uuid::new_v4(),
        main_type: MAIN_TYPE_USERS.to_string(),
        sub_type: sub_type.to_string(),
        tenant_id,
        season_id,
        user: vec![UserSnapshot {
            id: user_id,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }],
        miscellaneous: None,
        created_at: created_at.parse().unwrap(),
    }
}

fn scopes_of(store: &MemoryStore, id: Uuid) -> Vec<String> {
    store
        .snapshot()
        .into_iter()
        .find(|r| r.id == id)
        .unwrap()
        .user[0]
        .scopes
        .clone()
}

#[async_std::test]
async fn patches_deactivation_scopes_from_add_event() {
    let config = MigrationConfig::default();
    let user_id = Uuid::new_v4();

    let add = record(
        SUB_TYPE_USER_ADD,
        1,
        1,
        user_id,
        &["EDITOR"],
        "2020-01-01T00:00:00Z",
    );
    let deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        user_id,
        &["VIEWER"],
        "2020-06-01T00:00:00Z",
    );
    let deactivation_id = deactivation.id;

    let store = MemoryStore::new(vec![add, deactivation]);

    let summary = migrate(&store, &config).await.unwrap();

    assert_eq!(summary.candidates, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(scopes_of(&store, deactivation_id), vec!["EDITOR".to_string()]);
}

#[async_std::test]
async fn privileged_deactivation_is_never_selected() {
    let config = MigrationConfig::default();
    let user_id = Uuid::new_v4();

    let add = record(
        SUB_TYPE_USER_ADD,
        1,
        1,
        user_id,
        &["EDITOR"],
        "2020-01-01T00:00:00Z",
    );
    let deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        user_id,
        &["VIEWER", "COACH"],
        "2020-06-01T00:00:00Z",
    );
    let deactivation_id = deactivation.id;

    let store = MemoryStore::new(vec![add, deactivation]);

    let summary = migrate(&store, &config).await.unwrap();

    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(
        scopes_of(&store, deactivation_id),
        vec!["VIEWER".to_string(), "COACH".to_string()]
    );
}

#[async_std::test]
async fn deactivation_at_or_after_cutoff_is_never_selected() {
    let config = MigrationConfig::default();
    let user_id = Uuid::new_v4();

    let add = record(
        SUB_TYPE_USER_ADD,
        1,
        1,
        user_id,
        &["EDITOR"],
        "2020-01-01T00:00:00Z",
    );
    let deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        user_id,
        &["VIEWER"],
        "2021-01-02T00:00:00Z",
    );
    let deactivation_id = deactivation.id;

    let store = MemoryStore::new(vec![add, deactivation]);

    let summary = migrate(&store, &config).await.unwrap();

    assert_eq!(summary.updated, 0);
    assert_eq!(scopes_of(&store, deactivation_id), vec!["VIEWER".to_string()]);
}

#[async_std::test]
async fn unpaired_deactivation_is_excluded() {
    let config = MigrationConfig::default();

    let deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        Uuid::new_v4(),
        &["VIEWER"],
        "2020-06-01T00:00:00Z",
    );

    let store = MemoryStore::new(vec![deactivation]);

    let summary = migrate(&store, &config).await.unwrap();

    assert_eq!(summary.candidates, 0);
    assert_eq!(summary.updated, 0);
}

#[async_std::test]
async fn vanished_record_is_skipped_without_aborting() {
    let config = MigrationConfig::default();
    let vanishing_user = Uuid::new_v4();
    let surviving_user = Uuid::new_v4();

    let vanishing_deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        vanishing_user,
        &["VIEWER"],
        "2020-06-01T00:00:00Z",
    );
    let vanishing_id = vanishing_deactivation.id;

    let surviving_deactivation = record(
        SUB_TYPE_USER_DEACTIVATION,
        1,
        1,
        surviving_user,
        &["VIEWER"],
        "2020-07-01T00:00:00Z",
    );
    let surviving_id = surviving_deactivation.id;

    let store = MemoryStore::new(vec![
        record(
            SUB_TYPE_USER_ADD,
            1,
            1,
            vanishing_user,
            &["EDITOR"],
            "2020-01-01T00:00:00Z",
        ),
        record(
            SUB_TYPE_USER_ADD,
            1,
            1,
            surviving_user,
            &["ANALYST"],
            "2020-02-01T00:00:00Z",
        ),
        vanishing_deactivation,
        surviving_deactivation,
    ])
    .vanish_before_recheck(vec![vanishing_id]);

    let summary = migrate(&store, &config).await.unwrap();

    assert_eq!(summary.candidates, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(
        scopes_of(&store, surviving_id),
        vec!["ANALYST".to_string()]
    );
}

#[async_std::test]
async fn second_run_leaves_state_unchanged() {
    let config = MigrationConfig::default();
    let user_id = Uuid::new_v4();

    let store = MemoryStore::new(vec![
        record(
            SUB_TYPE_USER_ADD,
            1,
            1,
            user_id,
            &["EDITOR"],
            "2020-01-01T00:00:00Z",
        ),
        record(
            SUB_TYPE_USER_DEACTIVATION,
            1,
            1,
            user_id,
            &["VIEWER"],
            "2020-06-01T00:00:00Z",
        ),
    ]);

    migrate(&store, &config).await.unwrap();
    let after_first = store.snapshot();

    // The patched scopes are still non-privileged, so the second run selects
    // the same pair and re-applies the same value.
    let summary = migrate(&store, &config).await.unwrap();
    let after_second = store.snapshot();

    assert_eq!(summary.updated, 1);
    assert_eq!(after_first, after_second);
}
