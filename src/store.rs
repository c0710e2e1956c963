//! History store access
//!
//! [`HistoryStore`] is the seam between the runner and the database; the
//! production implementation is [`PgHistoryStore`] over a Postgres pool, and
//! the integration tests substitute an in-memory double. Both the point
//! re-read and the conditional update re-assert the full selection predicate,
//! so a record modified between selection and patch falls out as a miss
//! rather than being patched blind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Error;
use crate::event::{
    PopulationEvent, ProjectedEvent, UserSnapshot, MAIN_TYPE_USERS, SUB_TYPE_USER_ADD,
    SUB_TYPE_USER_DEACTIVATION,
};

/// Table holding the population history records
pub const HISTORY_TABLE: &str = "population_history";

/// Store operations used by the backfill runner
#[async_trait]
pub trait HistoryStore {
    /// Deactivation branch: `USERS`/`USER_DEACTIVATION` records created
    /// strictly before `cutoff` whose snapshot scopes exclude the privileged
    /// set, projected and ordered ascending by timestamp
    async fn deactivations_before(
        &self,
        cutoff: DateTime<Utc>,
        privileged: &[String],
    ) -> Result<Vec<ProjectedEvent>, Error>;

    /// Add branch: all `USER_ADD` records, projected and ordered ascending by
    /// timestamp
    async fn user_adds(&self) -> Result<Vec<ProjectedEvent>, Error>;

    /// Re-read one deactivation record by ID under the same predicate used
    /// for selection
    async fn find_deactivation(
        &self,
        id: Uuid,
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error>;

    /// Overwrite the scopes inside the record's embedded snapshot, still
    /// under the selection predicate, returning the updated record
    async fn overwrite_scopes(
        &self,
        id: Uuid,
        scopes: &[String],
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error>;
}

/// [sqlx](https://docs.rs/sqlx)-based Postgres history store
pub struct PgHistoryStore {
    /// sqlx [`PgPool`](sqlx::PgPool) to communicate with the database
    pool: PgPool,
}

impl PgHistoryStore {
    /// Create a new store instance with a given [`PgPool`](sqlx::PgPool)
    pub async fn new(pool: PgPool) -> Result<Self, Error> {
        Self::create_history_table(&pool).await?;

        Ok(Self { pool })
    }

    async fn create_history_table(pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            create table if not exists population_history(
                id uuid primary key,
                main_type varchar(64) not null,
                sub_type varchar(64) not null,
                tenant_id integer not null,
                season_id integer not null,
                -- Single-element sequence of user snapshots, kept in its
                -- historical array shape.
                user_snapshot jsonb not null,
                miscellaneous jsonb null,
                created_at timestamp with time zone not null
            );
        "#,
        )
        .execute(&mut tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

/// One record of a branch query, snapshot already unwrapped by the projection
#[derive(sqlx::FromRow)]
struct ProjectedRow {
    id: Uuid,
    tenant_id: i32,
    season_id: i32,
    snapshot: Json<UserSnapshot>,
    miscellaneous: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<ProjectedRow> for ProjectedEvent {
    fn from(row: ProjectedRow) -> Self {
        ProjectedEvent {
            id: row.id,
            tenant_id: row.tenant_id,
            season_id: row.season_id,
            user: row.snapshot.0,
            miscellaneous: row.miscellaneous.map(|value| value.0),
            created_at: row.created_at,
        }
    }
}

/// A full history record as stored
#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    main_type: String,
    sub_type: String,
    tenant_id: i32,
    season_id: i32,
    user_snapshot: Json<Vec<UserSnapshot>>,
    miscellaneous: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl From<EventRow> for PopulationEvent {
    fn from(row: EventRow) -> Self {
        PopulationEvent {
            id: row.id,
            main_type: row.main_type,
            sub_type: row.sub_type,
            tenant_id: row.tenant_id,
            season_id: row.season_id,
            user: row.user_snapshot.0,
            miscellaneous: row.miscellaneous.map(|value| value.0),
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn deactivations_before(
        &self,
        cutoff: DateTime<Utc>,
        privileged: &[String],
    ) -> Result<Vec<ProjectedEvent>, Error> {
        let rows: Vec<ProjectedRow> = sqlx::query_as(
            r#"select
                id,
                tenant_id,
                season_id,
                user_snapshot -> 0 as snapshot,
                miscellaneous,
                created_at
            from population_history
            where main_type = $1
                and sub_type = $2
                and created_at < $3
                and not (user_snapshot -> 0 -> 'scopes' ?| $4)
            order by created_at asc"#,
        )
        .bind(MAIN_TYPE_USERS)
        .bind(SUB_TYPE_USER_DEACTIVATION)
        .bind(cutoff)
        .bind(privileged)
        .fetch_all(&self.pool)
        .await?;

        trace!("Selected {} deactivation records", rows.len());

        Ok(rows.into_iter().map(ProjectedEvent::from).collect())
    }

    async fn user_adds(&self) -> Result<Vec<ProjectedEvent>, Error> {
        let rows: Vec<ProjectedRow> = sqlx::query_as(
            r#"select
                id,
                tenant_id,
                season_id,
                user_snapshot -> 0 as snapshot,
                miscellaneous,
                created_at
            from population_history
            where sub_type = $1
            order by created_at asc"#,
        )
        .bind(SUB_TYPE_USER_ADD)
        .fetch_all(&self.pool)
        .await?;

        trace!("Selected {} add records", rows.len());

        Ok(rows.into_iter().map(ProjectedEvent::from).collect())
    }

    async fn find_deactivation(
        &self,
        id: Uuid,
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"select
                id,
                main_type,
                sub_type,
                tenant_id,
                season_id,
                user_snapshot,
                miscellaneous,
                created_at
            from population_history
            where id = $1
                and main_type = $2
                and sub_type = $3
                and not (user_snapshot -> 0 -> 'scopes' ?| $4)"#,
        )
        .bind(id)
        .bind(MAIN_TYPE_USERS)
        .bind(SUB_TYPE_USER_DEACTIVATION)
        .bind(privileged)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PopulationEvent::from))
    }

    async fn overwrite_scopes(
        &self,
        id: Uuid,
        scopes: &[String],
        privileged: &[String],
    ) -> Result<Option<PopulationEvent>, Error> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"update population_history
            set user_snapshot = jsonb_set(user_snapshot, '{0,scopes}', $2)
            where id = $1
                and main_type = $3
                and sub_type = $4
                and not (user_snapshot -> 0 -> 'scopes' ?| $5)
            returning
                id,
                main_type,
                sub_type,
                tenant_id,
                season_id,
                user_snapshot,
                miscellaneous,
                created_at"#,
        )
        .bind(id)
        .bind(Json(scopes))
        .bind(MAIN_TYPE_USERS)
        .bind(SUB_TYPE_USER_DEACTIVATION)
        .bind(privileged)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(updated) = &row {
            trace!("Patched scopes on record {}", updated.id);
        }

        Ok(row.map(PopulationEvent::from))
    }
}
