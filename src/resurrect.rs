//! Resurrection of archived records.
//!
//! Three ways back: the quarterly sweep re-checks every archived record
//! against a high star threshold, a user visiting an archived record
//! triggers an on-demand check against a lower one (interest is itself a
//! signal), and resubmitting the repository resurrects unconditionally
//! (that path lives in ingestion). All three share one qualification
//! core and one restore routine.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use log::{debug, info, warn};

use crate::blob;
use crate::github::RepoMetadata;
use crate::models::{ArchiveBlob, Category, Skill, Tier};
use crate::pipeline::Pipeline;

const LOG_TARGET: &str = "resurrect";
const CHECKPOINT: &str = "resurrection_sweep";
const SWEEP_CHUNK: usize = 50;

/// Qualification core shared by sweep and on-demand checks: enough
/// stars, or pushed recently.
pub fn qualifies(
    meta: &RepoMetadata,
    min_stars: i64,
    push_window_days: i64,
    now: DateTime<Utc>,
) -> bool {
    if meta.stars >= min_stars {
        return true;
    }
    meta.pushed_at
        .map(|at| now - at <= chrono::Duration::days(push_window_days))
        .unwrap_or(false)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub resurrected: usize,
    pub failed: usize,
}

/// Re-check every archived record against the sweep threshold. Guarded
/// to once per quarter unless `force` is set; run metrics land in
/// `sweep_runs`.
pub async fn run_resurrection_sweep(pipeline: &Pipeline, force: bool) -> Result<SweepSummary> {
    let now = Utc::now();
    let quarter = format!("{}-Q{}", now.year(), now.month0() / 3 + 1);
    if !force
        && pipeline.store.get_checkpoint(CHECKPOINT).await?.as_deref() == Some(quarter.as_str())
    {
        debug!(target: LOG_TARGET, "Sweep already ran in {}", quarter);
        return Ok(SweepSummary::default());
    }

    let config = &pipeline.config.resurrect;
    let archived = pipeline.store.archived_skills().await?;
    let run_id = pipeline.store.start_sweep_run(now).await?;
    let mut summary = SweepSummary::default();

    for (i, chunk) in archived.chunks(SWEEP_CHUNK).enumerate() {
        // fixed inter-batch delay to stay under the provider's rate limit
        if i > 0 {
            tokio::time::sleep(Duration::from_millis(config.batch_delay_ms)).await;
        }
        let refs: Vec<(String, String)> = chunk
            .iter()
            .map(|s| (s.owner.clone(), s.repo.clone()))
            .collect();
        let fetched = match pipeline.metadata.fetch_many(&refs).await {
            Ok(map) => map,
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "Sweep batch fetch failed ({:#}); {} records deferred to the next sweep",
                    e,
                    chunk.len()
                );
                summary.failed += chunk.len();
                continue;
            }
        };
        for skill in chunk {
            summary.checked += 1;
            let meta = match fetched.get(&(skill.owner.clone(), skill.repo.clone())) {
                Some(meta) => meta,
                None => continue,
            };
            if !qualifies(meta, config.sweep_star_threshold, config.push_window_days, now) {
                continue;
            }
            match resurrect(pipeline, skill).await {
                Ok(()) => summary.resurrected += 1,
                Err(e) => {
                    warn!(
                        target: LOG_TARGET,
                        "Failed to resurrect {}: {:#}",
                        skill.repo_ref(),
                        e
                    );
                    summary.failed += 1;
                }
            }
        }
    }

    pipeline
        .store
        .finish_sweep_run(
            run_id,
            summary.checked as i64,
            summary.resurrected as i64,
            summary.failed as i64,
            Utc::now(),
        )
        .await?;
    pipeline.store.set_checkpoint(CHECKPOINT, &quarter).await?;
    info!(
        target: LOG_TARGET,
        "Sweep complete: {} checked, {} resurrected, {} failed",
        summary.checked,
        summary.resurrected,
        summary.failed
    );
    Ok(summary)
}

/// On-demand check for a visited archived record, against the lower
/// threshold. Returns whether the record came back.
pub async fn check_on_demand(pipeline: &Pipeline, skill: &Skill) -> Result<bool> {
    if skill.tier != Tier::Archived {
        return Ok(false);
    }
    let config = &pipeline.config.resurrect;
    let now = Utc::now();
    let meta = match pipeline.metadata.fetch_repo(&skill.owner, &skill.repo).await? {
        Some(meta) => meta,
        None => return Ok(false),
    };
    if !qualifies(
        &meta,
        config.on_demand_star_threshold,
        config.push_window_days,
        now,
    ) {
        debug!(
            target: LOG_TARGET,
            "{} does not qualify for on-demand resurrection",
            skill.repo_ref()
        );
        return Ok(false);
    }
    resurrect(pipeline, skill).await?;
    Ok(true)
}

/// Restore an archived record to active rotation: cached marker back to
/// blob storage, category links back, tier `cold` (it must re-earn hot
/// or warm status), and the archive blob deleted last so a crash leaves
/// it retryable.
pub async fn resurrect(pipeline: &Pipeline, skill: &Skill) -> Result<()> {
    let now = Utc::now();
    let key = blob::archive_key(skill.created_at, &skill.id);
    let stored = pipeline
        .blobs
        .get(&key)
        .await
        .with_context(|| format!("Failed to read archive blob {}", key))?;

    let mut categories: Vec<String> = Vec::new();
    match &stored {
        Some(raw) => match serde_json::from_str::<ArchiveBlob>(raw) {
            Ok(payload) => {
                if let Some(skill_md) = &payload.skill_md {
                    let prefix =
                        blob::skill_prefix(&skill.owner, &skill.repo, &skill.skill_path);
                    pipeline
                        .blobs
                        .put(&format!("{}/SKILL.md", prefix), skill_md)
                        .await?;
                }
                categories = payload.categories;
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Archive blob {} unreadable: {:#}", key, e);
            }
        },
        None => {
            warn!(
                target: LOG_TARGET,
                "No archive blob at {} for {}; restoring record state only",
                key,
                skill.repo_ref()
            );
        }
    }

    if !categories.is_empty() {
        let vocab = pipeline.store.all_categories().await?;
        for slug in &categories {
            if !vocab.iter().any(|c| c.slug == *slug) {
                pipeline
                    .store
                    .upsert_category(&Category {
                        slug: slug.clone(),
                        name: slug.clone(),
                        description: None,
                        keywords: Vec::new(),
                        usage_count: 0,
                    })
                    .await?;
            }
        }
        pipeline.store.link_categories(&skill.id, &categories).await?;
    }

    pipeline.store.restore_skill(&skill.id, now).await?;
    if stored.is_some() {
        pipeline.blobs.delete(&key).await?;
    }

    info!(target: LOG_TARGET, "Resurrected {}", skill.repo_ref());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(stars: i64, pushed_days_ago: Option<i64>) -> RepoMetadata {
        let now = Utc::now();
        RepoMetadata {
            owner: "octo".to_string(),
            repo: "tools".to_string(),
            stars,
            forks: 0,
            description: None,
            pushed_at: pushed_days_ago.map(|d| now - chrono::Duration::days(d)),
            is_fork: false,
            topics: Vec::new(),
            head_sha: None,
        }
    }

    #[test]
    fn test_qualification_by_stars() {
        let now = Utc::now();
        assert!(qualifies(&meta(50, None), 50, 90, now));
        assert!(!qualifies(&meta(49, None), 50, 90, now));
        assert!(qualifies(&meta(25, None), 20, 90, now));
    }

    #[test]
    fn test_qualification_by_recent_push() {
        let now = Utc::now();
        assert!(qualifies(&meta(0, Some(30)), 50, 90, now));
        assert!(!qualifies(&meta(0, Some(120)), 50, 90, now));
        assert!(!qualifies(&meta(0, None), 50, 90, now));
    }
}
