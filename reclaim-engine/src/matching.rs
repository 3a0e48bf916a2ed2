//! MatchEngine - scores one report against the opposing pool.
//!
//! Pairs at or above the match threshold whose reporters both resolve to a
//! user record are persisted as pending [`MatchCandidate`]s. Scans are not
//! idempotent: every call rescans the whole pool and may write duplicates.

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use reclaim_core::{score_pair, MatchCandidate, MatchStatus, Report, ReportKind, UserProfile};

use crate::config::MatchingConfig;
use crate::error::{ReclaimError, Result};
use crate::store::{Collections, Query};

/// A persisted match with both reporters' contact identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedMatch {
    #[serde(flatten)]
    pub candidate: MatchCandidate,
    pub lost_user_email: String,
    pub found_user_email: String,
}

/// Matches reports against the opposing pool.
pub struct MatchEngine {
    collections: Collections,
    config: MatchingConfig,
}

impl MatchEngine {
    pub fn new(collections: Collections, config: MatchingConfig) -> Self {
        Self {
            collections,
            config,
        }
    }

    /// Score a lost report against every found report.
    pub async fn match_lost_item(&self, lost: &Report) -> Result<Vec<CreatedMatch>> {
        self.stream_matches(lost, ReportKind::Lost).try_collect().await
    }

    /// Score a found report against every lost report.
    pub async fn match_found_item(&self, found: &Report) -> Result<Vec<CreatedMatch>> {
        self.stream_matches(found, ReportKind::Found).try_collect().await
    }

    /// Lazily scan the pool opposing `subject`, yielding created matches in
    /// pool order.
    ///
    /// User lookups for up to `lookup_concurrency` pairs run at once. A pair
    /// with a missing reporter record is skipped; a store failure ends the
    /// stream with an error.
    pub fn stream_matches<'a>(
        &'a self,
        subject: &'a Report,
        kind: ReportKind,
    ) -> BoxStream<'a, Result<CreatedMatch>> {
        let pool = self.collections.reports(kind.opposite());

        stream::once(async move { pool.query(&Query::all()).await })
            .map(|loaded| match loaded {
                Ok(reports) => stream::iter(reports.into_iter().map(Ok)).left_stream(),
                Err(e) => stream::once(future::ready(Err(ReclaimError::from(e)))).right_stream(),
            })
            .flatten()
            .map(move |other| async move {
                match other {
                    Ok(other) => self.consider(subject, kind, other).await,
                    Err(e) => Err(e),
                }
            })
            .buffered(self.config.lookup_concurrency.max(1))
            .filter_map(|outcome| future::ready(outcome.transpose()))
            .boxed()
    }

    async fn consider(
        &self,
        subject: &Report,
        kind: ReportKind,
        other: Report,
    ) -> Result<Option<CreatedMatch>> {
        let (lost, found) = match kind {
            ReportKind::Lost => (subject, &other),
            ReportKind::Found => (&other, subject),
        };

        let scored = score_pair(lost, found);
        debug!(
            lost_item_id = %lost.id,
            found_item_id = %found.id,
            score = scored.score,
            "Scored pair"
        );

        if scored.score < self.config.match_threshold {
            return Ok(None);
        }

        let (lost_user, found_user) = futures::try_join!(
            self.lookup_user(&lost.reporter_id),
            self.lookup_user(&found.reporter_id)
        )?;

        let (Some(lost_user), Some(found_user)) = (lost_user, found_user) else {
            warn!(
                lost_item_id = %lost.id,
                found_item_id = %found.id,
                "Reporter record missing, skipping pair"
            );
            return Ok(None);
        };

        let candidate = MatchCandidate {
            id: String::new(),
            lost_item_id: lost.id.clone(),
            found_item_id: found.id.clone(),
            lost_user_id: lost.reporter_id.clone(),
            found_user_id: found.reporter_id.clone(),
            score: scored.score,
            reasons: scored.reasons,
            status: MatchStatus::Pending,
            notified: false,
            created_at: None,
        };

        let candidate = self.collections.matches.insert(&candidate).await?;

        info!(
            match_id = %candidate.id,
            lost_item_id = %candidate.lost_item_id,
            found_item_id = %candidate.found_item_id,
            score = candidate.score,
            "Created match candidate"
        );

        Ok(Some(CreatedMatch {
            candidate,
            lost_user_email: lost_user.email,
            found_user_email: found_user.email,
        }))
    }

    async fn lookup_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        if user_id.trim().is_empty() {
            return Ok(None);
        }
        Ok(self.collections.users.get(user_id).await?)
    }
}
