//! The backfill runner
//!
//! Sequential and deliberately untransactional: each candidate is an
//! independent re-read followed by a conditional patch, and a miss on one
//! candidate never blocks the rest.

use log::{error, info};

use crate::aggregate;
use crate::config::MigrationConfig;
use crate::error::Error;
use crate::store::HistoryStore;

/// Totals reported after a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MigrationSummary {
    /// Candidate rows produced by the pairing step
    pub candidates: usize,

    /// Deactivation records actually patched
    pub updated: usize,
}

/// Run the backfill against the given store
///
/// Selects both event branches, pairs them client-side, then walks the
/// candidates one at a time: re-read the referenced deactivation record under
/// the selection predicate, and overwrite its snapshot scopes with the scopes
/// captured at add time. A failed re-read is logged at error level and
/// skipped; any store error aborts the run and propagates to the caller.
pub async fn migrate<S>(store: &S, config: &MigrationConfig) -> Result<MigrationSummary, Error>
where
    S: HistoryStore + Sync,
{
    let deactivations = store
        .deactivations_before(config.cutoff, &config.privileged_scopes)
        .await?;
    let adds = store.user_adds().await?;

    let candidates = aggregate::candidates(deactivations, adds);
    let total = candidates.len();
    info!("{} deactivation records selected for repair", total);

    let mut updated = 0;

    for candidate in candidates {
        let request_id = match candidate.request_id {
            Some(id) => id,
            None => {
                error!(
                    "user not updated, pair for {:?} has no deactivation reference",
                    candidate.key
                );
                continue;
            }
        };

        let existing = store
            .find_deactivation(request_id, &config.privileged_scopes)
            .await?;

        if existing.is_none() {
            error!("user not updated: {:?}", existing);
            continue;
        }

        match store
            .overwrite_scopes(request_id, &candidate.scopes, &config.privileged_scopes)
            .await?
        {
            Some(patched) => {
                updated += 1;
                info!("user updated: {:?}", patched);
            }
            None => {
                error!(
                    "user not updated, record {} changed between re-check and update",
                    request_id
                );
            }
        }
    }

    info!("no of documents updated: {}", updated);

    Ok(MigrationSummary {
        candidates: total,
        updated,
    })
}
