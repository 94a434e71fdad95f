//! Tier assignment and the scheduled re-scoring pass.
//!
//! Tiers control how often a record is re-evaluated against the hosting
//! platform: popular or recently visited records refresh often, the long
//! tail barely at all. The hourly pass works through user-flagged
//! records first, then due hot/warm/cool records, each bounded by a
//! per-run cap, fetching metadata in batched chunks and writing each
//! chunk in one transaction.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::blob;
use crate::listings;
use crate::models::{ClassificationMethod, ClassifyMessage, Skill, Tier};
use crate::pipeline::Pipeline;
use crate::queue::TOPIC_CLASSIFY;
use crate::store::ScoreUpdate;
use crate::trending::{self, ScoreInputs};

const LOG_TARGET: &str = "tiers";

pub const FLAG_PREFIX: &str = "needs_update:";
const DAILY_ROLLUP_CHECKPOINT: &str = "daily_rollup";

const HOT_STARS: i64 = 1000;
const WARM_STARS: i64 = 100;
const COOL_STARS: i64 = 10;
const HOT_ACCESS_DAYS: i64 = 7;
const WARM_ACCESS_DAYS: i64 = 30;
const COOL_ACCESS_DAYS: i64 = 90;

/// Pure tier assignment from stars and access recency. Access alone can
/// promote a low-star record. Never returns `Archived`; only the
/// archiver moves a record there.
pub fn assign_tier(
    stars: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Tier {
    let accessed_within = |days: i64| {
        last_accessed_at
            .map(|at| now - at <= chrono::Duration::days(days))
            .unwrap_or(false)
    };
    if stars >= HOT_STARS || accessed_within(HOT_ACCESS_DAYS) {
        Tier::Hot
    } else if stars >= WARM_STARS || accessed_within(WARM_ACCESS_DAYS) {
        Tier::Warm
    } else if stars >= COOL_STARS || accessed_within(COOL_ACCESS_DAYS) {
        Tier::Cool
    } else {
        Tier::Cold
    }
}

/// When the record should next be refreshed, `None` for tiers that are
/// only touched on access.
pub fn next_update_at(tier: Tier, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    tier.refresh_interval().map(|interval| now + interval)
}

/// What one scheduled pass did, for logs and the CLI.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub flagged: usize,
    pub refreshed: usize,
    pub fetch_failures: usize,
    pub reclassified: usize,
    pub rolled_up: u64,
    pub published: bool,
}

/// One scheduled pass: flagged records, due tiers in priority order, the
/// daily usage rollup, and listing publication.
pub async fn run_scheduled_pass(pipeline: &Pipeline) -> Result<PassSummary> {
    let now = Utc::now();
    let scheduler = &pipeline.config.scheduler;
    let mut summary = PassSummary::default();

    // 1. User-flagged records, regardless of tier. Flags are cleared
    // only after their batch was written.
    let flag_keys = pipeline.flags.list(FLAG_PREFIX).await?;
    let flag_keys: Vec<String> = flag_keys
        .into_iter()
        .take(scheduler.run_cap_flagged as usize)
        .collect();
    if !flag_keys.is_empty() {
        let ids: Vec<String> = flag_keys
            .iter()
            .map(|key| key[FLAG_PREFIX.len()..].to_string())
            .collect();
        let mut skills = pipeline.store.skills_by_ids(&ids).await?;
        skills.retain(|s| s.tier != Tier::Archived);
        summary.flagged = skills.len();
        refresh_skills(pipeline, skills, now, &mut summary).await?;
        for key in &flag_keys {
            pipeline.flags.delete(key).await?;
        }
    }

    // 2-4. Due records per tier, re-read fresh so work done above (or by
    // a concurrent run) is not repeated.
    for (tier, cap) in [
        (Tier::Hot, scheduler.run_cap_hot),
        (Tier::Warm, scheduler.run_cap_warm),
        (Tier::Cool, scheduler.run_cap_cool),
    ] {
        let due = pipeline.store.due_skills(tier, now, cap).await?;
        refresh_skills(pipeline, due, now, &mut summary).await?;
    }

    // 5. Daily usage rollup, at most once per calendar day.
    summary.rolled_up = run_daily_rollup(pipeline, now).await?;

    // 6. Published listings are regenerated at the end of every pass.
    listings::publish_listings(
        &pipeline.store,
        pipeline.blobs.as_ref(),
        scheduler.listing_size,
    )
    .await?;
    summary.published = true;

    info!(
        target: LOG_TARGET,
        "Pass complete: {} flagged, {} refreshed, {} fetch failures, {} reclassified, {} events pruned",
        summary.flagged,
        summary.refreshed,
        summary.fetch_failures,
        summary.reclassified,
        summary.rolled_up
    );
    Ok(summary)
}

async fn refresh_skills(
    pipeline: &Pipeline,
    skills: Vec<Skill>,
    now: DateTime<Utc>,
    summary: &mut PassSummary,
) -> Result<()> {
    let chunk_size = pipeline.config.scheduler.chunk_size;
    for chunk in skills.chunks(chunk_size) {
        refresh_chunk(pipeline, chunk, now, summary).await?;
    }
    Ok(())
}

/// Refresh one metadata-batched chunk. A failed batch call or an
/// individual miss degrades to rescoring from stored data; the record is
/// always rescheduled, never dropped from the cycle.
async fn refresh_chunk(
    pipeline: &Pipeline,
    chunk: &[Skill],
    now: DateTime<Utc>,
    summary: &mut PassSummary,
) -> Result<()> {
    let refs: Vec<(String, String)> = chunk
        .iter()
        .map(|s| (s.owner.clone(), s.repo.clone()))
        .collect();
    let fetched = match pipeline.metadata.fetch_many(&refs).await {
        Ok(map) => map,
        Err(e) => {
            warn!(
                target: LOG_TARGET,
                "Batch metadata fetch failed ({:#}); rescoring {} records from stored data",
                e,
                chunk.len()
            );
            HashMap::new()
        }
    };

    let threshold = pipeline.config.classify.ai_star_threshold;
    let mut updates: Vec<ScoreUpdate> = Vec::with_capacity(chunk.len());
    let mut reclassify: Vec<(&Skill, i64)> = Vec::new();

    for skill in chunk {
        let meta = fetched.get(&(skill.owner.clone(), skill.repo.clone()));
        if meta.is_none() {
            summary.fetch_failures += 1;
        }
        let stars = meta.map(|m| m.stars).unwrap_or(skill.stars);
        let forks = meta.map(|m| m.forks).unwrap_or(skill.forks);
        let pushed_at = meta.map(|m| m.pushed_at).unwrap_or(skill.last_commit_at);

        let history = trending::advance_history(&skill.star_history, now.date_naive(), stars);
        let score = trending::calculate_trending_score(&ScoreInputs {
            stars,
            history: &history,
            created_at: skill.created_at,
            last_commit_at: pushed_at,
            downloads_7d: skill.downloads_7d,
            now,
        });
        let tier = assign_tier(stars, skill.last_accessed_at, now);
        updates.push(ScoreUpdate {
            skill_id: skill.id.clone(),
            stars,
            forks,
            star_history: history,
            trending_score: score,
            last_commit_at: pushed_at,
            tier,
            next_update_at: next_update_at(tier, now),
        });

        if skill.classification_method == Some(ClassificationMethod::Keyword)
            && skill.stars < threshold
            && stars >= threshold
        {
            reclassify.push((skill, stars));
        }
    }

    pipeline.store.apply_score_updates(&updates).await?;
    summary.refreshed += updates.len();

    for (skill, stars) in reclassify {
        let skill_md_path = marker_blob_key(pipeline, skill).await?;
        let msg = ClassifyMessage {
            skill_id: skill.id.clone(),
            owner: skill.owner.clone(),
            repo: skill.repo.clone(),
            skill_md_path,
            frontmatter_categories: Vec::new(),
            tags: skill.tags.clone(),
            stars,
            is_reclassification: true,
        };
        pipeline.queue.enqueue(TOPIC_CLASSIFY, &msg).await?;
        summary.reclassified += 1;
        info!(
            target: LOG_TARGET,
            "{} crossed the AI threshold; reclassification queued",
            skill.repo_ref()
        );
    }
    Ok(())
}

/// Blob key of the record's cached marker, preferring the canonical
/// filename.
async fn marker_blob_key(pipeline: &Pipeline, skill: &Skill) -> Result<String> {
    let prefix = blob::skill_prefix(&skill.owner, &skill.repo, &skill.skill_path);
    let canonical = format!("{}/SKILL.md", prefix);
    if pipeline.blobs.get(&canonical).await?.is_some() {
        Ok(canonical)
    } else {
        Ok(format!("{}/skill.md", prefix))
    }
}

async fn run_daily_rollup(pipeline: &Pipeline, now: DateTime<Utc>) -> Result<u64> {
    let today = now.format("%Y-%m-%d").to_string();
    let last = pipeline.store.get_checkpoint(DAILY_ROLLUP_CHECKPOINT).await?;
    if last.as_deref() == Some(today.as_str()) {
        return Ok(0);
    }
    let pruned = pipeline.store.rollup_usage(now).await?;
    pipeline
        .store
        .set_checkpoint(DAILY_ROLLUP_CHECKPOINT, &today)
        .await?;
    info!(
        target: LOG_TARGET,
        "Daily usage rollup done; {} old events pruned",
        pruned
    );
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days_ago(now: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
        Some(now - chrono::Duration::days(days))
    }

    #[test]
    fn test_tier_star_thresholds() {
        let now = Utc::now();
        assert_eq!(assign_tier(1500, None, now), Tier::Hot);
        assert_eq!(assign_tier(1000, None, now), Tier::Hot);
        assert_eq!(assign_tier(999, None, now), Tier::Warm);
        assert_eq!(assign_tier(100, None, now), Tier::Warm);
        assert_eq!(assign_tier(99, None, now), Tier::Cool);
        assert_eq!(assign_tier(42, None, now), Tier::Cool);
        assert_eq!(assign_tier(10, None, now), Tier::Cool);
        assert_eq!(assign_tier(9, None, now), Tier::Cold);
        assert_eq!(assign_tier(0, None, now), Tier::Cold);
    }

    #[test]
    fn test_access_recency_alone_promotes() {
        let now = Utc::now();
        assert_eq!(assign_tier(5, days_ago(now, 3), now), Tier::Hot);
        assert_eq!(assign_tier(5, days_ago(now, 10), now), Tier::Warm);
        assert_eq!(assign_tier(5, days_ago(now, 60), now), Tier::Cool);
        assert_eq!(assign_tier(5, days_ago(now, 100), now), Tier::Cold);
        assert_eq!(assign_tier(5, None, now), Tier::Cold);
    }

    #[test]
    fn test_stars_win_over_stale_access() {
        let now = Utc::now();
        assert_eq!(assign_tier(1500, days_ago(now, 500), now), Tier::Hot);
        assert_eq!(assign_tier(50, days_ago(now, 91), now), Tier::Cool);
    }

    #[test]
    fn test_never_assigns_archived() {
        let now = Utc::now();
        for stars in [0, 5, 50, 500, 5000] {
            for accessed in [None, days_ago(now, 1), days_ago(now, 1000)] {
                assert_ne!(assign_tier(stars, accessed, now), Tier::Archived);
            }
        }
    }

    #[test]
    fn test_next_update_schedule() {
        let now = Utc::now();
        assert_eq!(
            next_update_at(Tier::Hot, now),
            Some(now + chrono::Duration::hours(6))
        );
        assert_eq!(
            next_update_at(Tier::Warm, now),
            Some(now + chrono::Duration::hours(24))
        );
        assert_eq!(
            next_update_at(Tier::Cool, now),
            Some(now + chrono::Duration::days(7))
        );
        assert_eq!(next_update_at(Tier::Cold, now), None);
        assert_eq!(next_update_at(Tier::Archived, now), None);
    }
}
