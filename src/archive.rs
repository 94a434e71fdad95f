//! Archival of idle records.
//!
//! Runs monthly. Records nobody has visited in a year, with almost no
//! stars and no push activity in two years, are serialized to a cold
//! storage blob and stripped down to their identity in the live store.
//! The archive blob is written before anything is deleted, so a crash
//! mid-record leaves the record live and re-archivable.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::blob;
use crate::models::{ArchiveBlob, Skill};
use crate::pipeline::Pipeline;

const LOG_TARGET: &str = "archive";
const CHECKPOINT: &str = "archive_pass";

/// Archive every eligible record. Guarded to once per calendar month
/// unless `force` is set. Returns the number archived.
pub async fn run_archive_pass(pipeline: &Pipeline, force: bool) -> Result<usize> {
    let now = Utc::now();
    let month = now.format("%Y-%m").to_string();
    if !force
        && pipeline.store.get_checkpoint(CHECKPOINT).await?.as_deref() == Some(month.as_str())
    {
        debug!(target: LOG_TARGET, "Archive pass already ran in {}", month);
        return Ok(0);
    }

    let config = &pipeline.config.archive;
    let access_cutoff = now - chrono::Duration::days(config.idle_days);
    let push_cutoff = now - chrono::Duration::days(config.push_stale_days);
    let candidates = pipeline
        .store
        .archive_candidates(access_cutoff, config.max_stars, push_cutoff)
        .await?;

    let mut archived = 0usize;
    for skill in &candidates {
        archive_one(pipeline, skill, now)
            .await
            .with_context(|| format!("Failed to archive {}", skill.repo_ref()))?;
        archived += 1;
    }

    pipeline.store.set_checkpoint(CHECKPOINT, &month).await?;
    info!(
        target: LOG_TARGET,
        "Archive pass complete: {} record(s) archived",
        archived
    );
    Ok(archived)
}

async fn archive_one(pipeline: &Pipeline, skill: &Skill, now: DateTime<Utc>) -> Result<()> {
    let prefix = blob::skill_prefix(&skill.owner, &skill.repo, &skill.skill_path);
    let mut skill_md = pipeline.blobs.get(&format!("{}/SKILL.md", prefix)).await?;
    if skill_md.is_none() {
        skill_md = pipeline.blobs.get(&format!("{}/skill.md", prefix)).await?;
    }
    let categories = pipeline.store.skill_categories(&skill.id).await?;

    let payload = ArchiveBlob {
        skill: skill.clone(),
        skill_md,
        categories,
        archived_at: now,
    };
    let key = blob::archive_key(skill.created_at, &skill.id);
    pipeline
        .blobs
        .put(&key, &serde_json::to_string_pretty(&payload)?)
        .await?;

    pipeline.blobs.delete_prefix(&prefix).await?;
    pipeline.store.archive_skill(&skill.id, now).await?;

    info!(target: LOG_TARGET, "Archived {} to {}", skill.repo_ref(), key);
    Ok(())
}
