//! Visit and download hooks, the narrow contract the out-of-scope web
//! layer calls into.
//!
//! A visit records access (which feeds tier promotion), flags stale
//! records for early refresh, and gives archived records their
//! on-demand resurrection check.

use anyhow::Result;
use chrono::Utc;
use log::debug;

use crate::models::Tier;
use crate::pipeline::Pipeline;
use crate::resurrect;
use crate::tiers::FLAG_PREFIX;

const LOG_TARGET: &str = "visit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    NotFound,
    Recorded,
    /// Recorded, and the record was flagged for refresh on the next
    /// scheduled pass.
    FlaggedForUpdate,
    /// The record was archived and came back through the on-demand
    /// check.
    Resurrected,
}

pub async fn record_visit(
    pipeline: &Pipeline,
    owner: &str,
    repo: &str,
    skill_path: &str,
) -> Result<VisitOutcome> {
    let now = Utc::now();
    let skill = match pipeline.store.find_by_repo(owner, repo, skill_path).await? {
        Some(skill) => skill,
        None => return Ok(VisitOutcome::NotFound),
    };

    pipeline.store.record_access(&skill.id, now).await?;

    if skill.tier == Tier::Archived {
        if resurrect::check_on_demand(pipeline, &skill).await? {
            return Ok(VisitOutcome::Resurrected);
        }
        return Ok(VisitOutcome::Recorded);
    }

    // Cold records carry no schedule at all, so a visit is the only
    // thing that gets them refreshed.
    let due = match skill.next_update_at {
        None => true,
        Some(at) => at <= now,
    };
    if due {
        let key = format!("{}{}", FLAG_PREFIX, skill.id);
        pipeline
            .flags
            .set(&key, "1", pipeline.config.scheduler.flag_ttl_secs)
            .await?;
        debug!(target: LOG_TARGET, "{} flagged for refresh", skill.repo_ref());
        return Ok(VisitOutcome::FlaggedForUpdate);
    }

    Ok(VisitOutcome::Recorded)
}

/// A download/install event, rolled into 7/30-day counters daily.
pub async fn record_download(pipeline: &Pipeline, skill_id: &str) -> Result<()> {
    pipeline.store.record_download(skill_id, Utc::now()).await
}
