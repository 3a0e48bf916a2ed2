//! ClaimFinalizer - the single-claim state transition.
//!
//! A found item moves to `claimed` through a compare-and-set on its prior
//! status, so of two concurrent approvals exactly one wins. The loser gets a
//! conflict.

use chrono::Utc;
use serde_json::json;
use std::collections::HashSet;
use tracing::{error, info, warn};

use reclaim_core::{Claim, ClaimAttempt, Decision, Report, ReportStatus};

use crate::error::{ReclaimError, Result};
use crate::store::{patch, Collections, Query};

/// Applies approved verifications to item state.
pub struct ClaimFinalizer {
    collections: Collections,
}

impl ClaimFinalizer {
    pub fn new(collections: Collections) -> Self {
        Self { collections }
    }

    /// Mark `found` claimed by `claimant_id` and record the claim.
    ///
    /// `found` must be the record as read before verification; its status is
    /// the expected prior value of the swap.
    pub async fn finalize(&self, found: &Report, claimant_id: &str, confidence: f64) -> Result<Claim> {
        if found.status == ReportStatus::Claimed {
            return Err(ReclaimError::Conflict("Item already claimed".to_string()));
        }

        let swapped = self
            .collections
            .found_items
            .compare_and_set(
                &found.id,
                "status",
                &json!(found.status.as_str()),
                patch([
                    ("status", json!(ReportStatus::Claimed.as_str())),
                    ("claimedBy", json!(claimant_id)),
                    ("claimedAt", json!(Utc::now())),
                ]),
            )
            .await?;

        if !swapped {
            warn!(found_item_id = %found.id, claimant_id, "Lost claim race");
            return Err(ReclaimError::Conflict("Item already claimed".to_string()));
        }

        let claim = Claim {
            id: String::new(),
            found_item_id: found.id.clone(),
            claimant_id: claimant_id.to_string(),
            confidence,
            created_at: None,
        };

        match self.collections.claims.insert(&claim).await {
            Ok(claim) => {
                info!(found_item_id = %found.id, claimant_id, confidence, "Item claimed");
                Ok(claim)
            }
            Err(e) => {
                error!(
                    found_item_id = %found.id,
                    claimant_id,
                    error = %e,
                    "Item marked claimed but claim record was not written"
                );
                Err(e.into())
            }
        }
    }

    /// Approved attempts on an item with no claim by the same user.
    pub async fn find_divergences(&self, found_item_id: &str) -> Result<Vec<ClaimAttempt>> {
        let attempts = self
            .collections
            .claim_attempts
            .query(
                &Query::all()
                    .eq("foundItemId", found_item_id)
                    .eq("decision", Decision::Approved.as_str()),
            )
            .await?;

        let claimants: HashSet<String> = self
            .collections
            .claims
            .query(&Query::all().eq("foundItemId", found_item_id))
            .await?
            .into_iter()
            .map(|c| c.claimant_id)
            .collect();

        Ok(attempts
            .into_iter()
            .filter(|a| !claimants.contains(&a.user_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, MemoryStore};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, Collections, Report) {
        let store = Arc::new(MemoryStore::new());
        let collections = Collections::new(store.clone() as Arc<dyn DocumentStore>, Duration::from_secs(1));
        let mut found = Report::new("finder", "wallet", "Wallet", "Library");
        found.status = ReportStatus::Unclaimed;
        let found = collections.found_items.insert(&found).await.unwrap();
        (store, collections, found)
    }

    #[tokio::test]
    async fn test_finalize_claims_item() {
        let (_, collections, found) = setup().await;
        let finalizer = ClaimFinalizer::new(collections.clone());

        let claim = finalizer.finalize(&found, "owner", 1.0).await.unwrap();
        assert_eq!(claim.found_item_id, found.id);
        assert!(claim.created_at.is_some());

        let stored = collections.found_items.get(&found.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Claimed);
        assert_eq!(stored.claimed_by.as_deref(), Some("owner"));
        assert!(stored.claimed_at.is_some());
    }

    #[tokio::test]
    async fn test_stale_read_loses() {
        let (store, collections, found) = setup().await;
        let finalizer = ClaimFinalizer::new(collections);

        finalizer.finalize(&found, "first", 1.0).await.unwrap();
        let err = finalizer.finalize(&found, "second", 1.0).await.unwrap_err();

        assert!(matches!(err, ReclaimError::Conflict(_)));
        assert_eq!(store.len("claims"), 1);
    }

    #[tokio::test]
    async fn test_divergence_detected() {
        let (_, collections, found) = setup().await;
        let finalizer = ClaimFinalizer::new(collections.clone());

        for user in ["owner", "rival"] {
            collections
                .claim_attempts
                .insert(&ClaimAttempt {
                    id: String::new(),
                    found_item_id: found.id.clone(),
                    user_id: user.into(),
                    answers: BTreeMap::new(),
                    unrecognized_answers: BTreeMap::new(),
                    confidence: 1.0,
                    decision: Decision::Approved,
                    created_at: None,
                })
                .await
                .unwrap();
        }
        finalizer.finalize(&found, "owner", 1.0).await.unwrap();

        let divergent = finalizer.find_divergences(&found.id).await.unwrap();
        assert_eq!(divergent.len(), 1);
        assert_eq!(divergent[0].user_id, "rival");
    }
}
