//! Admission & ingestion.
//!
//! Takes a repository reference from the discovery feed or a user
//! submission and turns it into a cataloged record: marker lookup,
//! front-matter extraction, bounded tree fetch, fingerprinting, the
//! anti-duplication guard, and the upsert + blob cache + classification
//! handoff. Re-running on the same input converges; every write is keyed
//! by natural identity.

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use crate::blob;
use crate::config::IngestConfig;
use crate::fingerprint;
use crate::frontmatter;
use crate::github::TreeEntry;
use crate::models::{
    slugify, ClassifyMessage, HashKind, IngestMessage, Skill, Tier, Visibility,
};
use crate::pipeline::Pipeline;
use crate::queue::TOPIC_CLASSIFY;
use crate::resurrect;
use crate::tiers;
use crate::trending;

const LOG_TARGET: &str = "ingest";

const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "json", "yaml", "yml", "toml", "xml", "csv", "js", "mjs", "cjs",
    "ts", "jsx", "tsx", "py", "rb", "sh", "bash", "rs", "go", "java", "c", "h", "cpp", "hpp",
    "css", "html", "sql",
];
const TEXT_BARE_NAMES: &[&str] = &["LICENSE", "README", "Makefile", "Dockerfile", "CHANGELOG"];

/// Why an ingestion was a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RepoGone,
    Fork,
    NoMarker,
    DotDir,
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Record created or reindexed; a classification job was enqueued.
    Indexed {
        skill_id: String,
        classify: ClassifyMessage,
    },
    /// Commit unchanged since last index; only popularity was updated.
    CountersOnly { skill_id: String },
    /// Content matched an existing private record, which was converted
    /// to public instead of duplicating.
    ConvertedPrivate { skill_id: String },
    /// Low-reputation copy of a high-reputation record.
    DuplicateRejected,
    Skipped(SkipReason),
}

pub async fn run_ingest(pipeline: &Pipeline, msg: &IngestMessage) -> Result<IngestOutcome> {
    let config = &pipeline.config.ingest;
    let now = Utc::now();

    let meta = match pipeline.metadata.fetch_repo(&msg.owner, &msg.repo).await? {
        Some(meta) => meta,
        None => {
            debug!(target: LOG_TARGET, "{}/{} is gone; skipping", msg.owner, msg.repo);
            return Ok(IngestOutcome::Skipped(SkipReason::RepoGone));
        }
    };
    if meta.is_fork {
        debug!(target: LOG_TARGET, "{}/{} is a fork; skipping", msg.owner, msg.repo);
        return Ok(IngestOutcome::Skipped(SkipReason::Fork));
    }

    let mut existing = pipeline
        .store
        .find_by_repo(&msg.owner, &msg.repo, &msg.skill_path)
        .await?;

    // Resubmission of an archived record is explicit demand: resurrect
    // unconditionally, then carry on with a normal reindex.
    if let Some(skill) = &existing {
        if skill.tier == Tier::Archived {
            info!(
                target: LOG_TARGET,
                "Resubmission of archived {}; resurrecting",
                skill.repo_ref()
            );
            resurrect::resurrect(pipeline, skill).await?;
            existing = pipeline.store.get_skill(&skill.id).await?;
        }
    }

    // Unchanged commit: popularity counters only, before any content
    // fetch. Re-running on an unchanged repository costs one metadata
    // call and nothing else.
    if let Some(skill) = &existing {
        let unchanged = match (&skill.last_commit_sha, &meta.head_sha) {
            (Some(prev), Some(head)) => prev == head,
            _ => false,
        };
        if unchanged && !msg.force_reindex {
            pipeline
                .store
                .update_counters(&skill.id, meta.stars, meta.forks, meta.pushed_at, now)
                .await?;
            debug!(
                target: LOG_TARGET,
                "{} unchanged; counters only",
                skill.repo_ref()
            );
            return Ok(IngestOutcome::CountersOnly {
                skill_id: skill.id.clone(),
            });
        }
    }

    // Dot-prefixed directories are IDE/config noise unless the repo is
    // popular enough to be a known monorepo.
    if has_dot_component(&msg.skill_path) && meta.stars <= config.dot_dir_star_allowance {
        debug!(
            target: LOG_TARGET,
            "{}/{}/{} is under a dot directory; skipping",
            msg.owner,
            msg.repo,
            msg.skill_path
        );
        return Ok(IngestOutcome::Skipped(SkipReason::DotDir));
    }

    let mut marker: Option<(String, String)> = None;
    for candidate in marker_candidates(&msg.skill_path) {
        if let Some(content) = pipeline
            .metadata
            .get_file(&msg.owner, &msg.repo, &candidate)
            .await?
        {
            marker = Some((candidate, content));
            break;
        }
    }
    let (marker_repo_path, marker_content) = match marker {
        Some(found) => found,
        None => {
            debug!(
                target: LOG_TARGET,
                "No marker file in {}/{} at '{}'; skipping",
                msg.owner,
                msg.repo,
                msg.skill_path
            );
            return Ok(IngestOutcome::Skipped(SkipReason::NoMarker));
        }
    };

    let parsed = frontmatter::parse(&marker_content);
    let front = parsed.front;

    let head_ref = meta.head_sha.clone().unwrap_or_else(|| "HEAD".to_string());
    let tree = pipeline
        .metadata
        .get_tree(&msg.owner, &msg.repo, &head_ref)
        .await
        .with_context(|| format!("Failed to list tree of {}/{}", msg.owner, msg.repo))?;
    let files = fetch_subtree(
        pipeline,
        msg,
        &tree,
        &marker_repo_path,
        &marker_content,
        config,
    )
    .await?;

    let prints = fingerprint::compute(&files);

    if existing.is_none() {
        // Guard (a): a low-reputation submission whose normalized content
        // matches a high-reputation public record is a farming attempt.
        if meta.stars < config.trusted_stars {
            let matches = pipeline
                .store
                .skills_matching_fingerprint(HashKind::Normalized.as_str(), &prints.normalized)
                .await?;
            if matches.iter().any(|s| {
                s.visibility == Visibility::Public && s.stars >= config.duplicate_guard_stars
            }) {
                info!(
                    target: LOG_TARGET,
                    "Rejected {}/{}: duplicates a high-reputation record",
                    msg.owner,
                    msg.repo
                );
                return Ok(IngestOutcome::DuplicateRejected);
            }
        }

        // Guard (b): content identical to a private record means the
        // author published it; convert in place instead of duplicating.
        let full_matches = pipeline
            .store
            .skills_matching_fingerprint(HashKind::Full.as_str(), &prints.full)
            .await?;
        if let Some(private) = full_matches
            .iter()
            .find(|s| s.visibility == Visibility::Private)
        {
            pipeline
                .store
                .convert_private_to_public(
                    &private.id,
                    &msg.owner,
                    &msg.repo,
                    &msg.skill_path,
                    meta.stars,
                    meta.forks,
                    meta.pushed_at,
                    now,
                )
                .await?;
            pipeline
                .store
                .insert_notice(
                    &private.id,
                    "converted_public",
                    &format!(
                        "Your private skill was found publicly at {}/{} and is now listed",
                        msg.owner, msg.repo
                    ),
                    now,
                )
                .await?;
            cache_files(pipeline, msg, &files).await?;
            info!(
                target: LOG_TARGET,
                "Converted private record {} to public {}/{}",
                private.id,
                msg.owner,
                msg.repo
            );
            return Ok(IngestOutcome::ConvertedPrivate {
                skill_id: private.id.clone(),
            });
        }
    }

    let skill_id = match &existing {
        Some(skill) => skill.id.clone(),
        None => Uuid::new_v4().to_string(),
    };
    let name = front
        .name
        .clone()
        .unwrap_or_else(|| default_name(msg));
    let slug = match &existing {
        Some(skill) => skill.slug.clone(),
        None => assign_slug(pipeline, &name, msg, &skill_id).await?,
    };

    let last_accessed_at = existing.as_ref().and_then(|s| s.last_accessed_at);
    let tier = tiers::assign_tier(meta.stars, last_accessed_at, now);
    let history = trending::advance_history(
        existing
            .as_ref()
            .map(|s| s.star_history.as_slice())
            .unwrap_or(&[]),
        now.date_naive(),
        meta.stars,
    );
    let created_at = existing.as_ref().map(|s| s.created_at).unwrap_or(now);
    let score = trending::calculate_trending_score(&trending::ScoreInputs {
        stars: meta.stars,
        history: &history,
        created_at,
        last_commit_at: meta.pushed_at,
        downloads_7d: existing.as_ref().map(|s| s.downloads_7d).unwrap_or(0),
        now,
    });
    let tags = merge_tags(&front.tags, &meta.topics);

    let skill = Skill {
        id: skill_id.clone(),
        owner: msg.owner.clone(),
        repo: msg.repo.clone(),
        skill_path: msg.skill_path.clone(),
        slug,
        name,
        description: front.description.clone().or_else(|| meta.description.clone()),
        stars: meta.stars,
        forks: meta.forks,
        star_history: history,
        trending_score: score,
        last_commit_at: meta.pushed_at,
        last_commit_sha: meta.head_sha.clone(),
        content_hash: Some(prints.full.clone()),
        tier,
        last_accessed_at,
        accesses_7d: existing.as_ref().map(|s| s.accesses_7d).unwrap_or(0),
        accesses_30d: existing.as_ref().map(|s| s.accesses_30d).unwrap_or(0),
        downloads_7d: existing.as_ref().map(|s| s.downloads_7d).unwrap_or(0),
        downloads_30d: existing.as_ref().map(|s| s.downloads_30d).unwrap_or(0),
        next_update_at: tiers::next_update_at(tier, now),
        classification_method: existing.as_ref().and_then(|s| s.classification_method),
        visibility: existing
            .as_ref()
            .map(|s| s.visibility)
            .unwrap_or(Visibility::Public),
        tags,
        created_at,
        updated_at: now,
        last_indexed_at: now,
    };

    pipeline.store.upsert_skill(&skill).await?;
    pipeline
        .store
        .put_fingerprints(&skill_id, &prints.full, &prints.normalized, now)
        .await?;
    cache_files(pipeline, msg, &files).await?;

    let marker_key = blob_key_for(
        &blob::skill_prefix(&msg.owner, &msg.repo, &msg.skill_path),
        &msg.skill_path,
        &marker_repo_path,
    );
    let classify = ClassifyMessage {
        skill_id: skill_id.clone(),
        owner: msg.owner.clone(),
        repo: msg.repo.clone(),
        skill_md_path: marker_key,
        frontmatter_categories: front.categories.clone(),
        tags: skill.tags.clone(),
        stars: meta.stars,
        is_reclassification: false,
    };
    pipeline.queue.enqueue(TOPIC_CLASSIFY, &classify).await?;

    info!(
        target: LOG_TARGET,
        "Indexed {} ({} files, {} stars, tier {})",
        skill.repo_ref(),
        files.len(),
        meta.stars,
        tier.as_str()
    );
    Ok(IngestOutcome::Indexed { skill_id, classify })
}

/// Fetch the skill's subtree within the configured bounds. The marker is
/// always included; binary and oversized files are counted but never
/// fetched; fetching stops at the file cap or the aggregate byte cap.
async fn fetch_subtree(
    pipeline: &Pipeline,
    msg: &IngestMessage,
    tree: &[TreeEntry],
    marker_repo_path: &str,
    marker_content: &str,
    config: &IngestConfig,
) -> Result<Vec<(String, String)>> {
    let prefix = if msg.skill_path.is_empty() {
        String::new()
    } else {
        format!("{}/", msg.skill_path)
    };
    let mut files: Vec<(String, String)> = Vec::new();
    files.push((marker_repo_path.to_string(), marker_content.to_string()));
    let mut total_bytes = marker_content.len() as u64;
    let mut counted = 1usize;
    let mut skipped = 0usize;

    for entry in tree {
        if !prefix.is_empty() && !entry.path.starts_with(prefix.as_str()) {
            continue;
        }
        if entry.path == marker_repo_path {
            continue;
        }
        if counted >= config.max_files {
            break;
        }
        if entry.size > config.max_file_bytes {
            skipped += 1;
            continue;
        }
        if total_bytes + entry.size > config.max_total_bytes {
            break;
        }
        counted += 1;
        if !is_text_path(&entry.path) {
            skipped += 1;
            continue;
        }
        if let Some(content) = pipeline
            .metadata
            .get_file(&msg.owner, &msg.repo, &entry.path)
            .await?
        {
            total_bytes += content.len() as u64;
            files.push((entry.path.clone(), content));
        }
    }

    if skipped > 0 {
        debug!(
            target: LOG_TARGET,
            "{}/{}: {} binary or oversized files not fetched",
            msg.owner,
            msg.repo,
            skipped
        );
    }
    Ok(files)
}

/// Replace the cached blob tree for this skill with the freshly fetched
/// files, so removed files disappear from the cache as well.
async fn cache_files(
    pipeline: &Pipeline,
    msg: &IngestMessage,
    files: &[(String, String)],
) -> Result<()> {
    let prefix = blob::skill_prefix(&msg.owner, &msg.repo, &msg.skill_path);
    pipeline.blobs.delete_prefix(&prefix).await?;
    for (repo_path, content) in files {
        let key = blob_key_for(&prefix, &msg.skill_path, repo_path);
        pipeline.blobs.put(&key, content).await?;
    }
    Ok(())
}

async fn assign_slug(
    pipeline: &Pipeline,
    name: &str,
    msg: &IngestMessage,
    skill_id: &str,
) -> Result<String> {
    let mut base = slugify(name);
    if base.is_empty() {
        base = slugify(&format!("{}-{}", msg.owner, msg.repo));
    }
    if base.is_empty() {
        base = format!("skill-{}", &skill_id[..8]);
    }
    let mut candidate = base.clone();
    let mut n = 1;
    while pipeline.store.slug_exists(&candidate).await? {
        n += 1;
        candidate = format!("{}-{}", base, n);
    }
    Ok(candidate)
}

fn marker_candidates(skill_path: &str) -> [String; 2] {
    if skill_path.is_empty() {
        ["SKILL.md".to_string(), "skill.md".to_string()]
    } else {
        [
            format!("{}/SKILL.md", skill_path),
            format!("{}/skill.md", skill_path),
        ]
    }
}

fn has_dot_component(path: &str) -> bool {
    path.split('/').any(|c| c.starts_with('.'))
}

fn is_text_path(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((_, ext)) => TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => TEXT_BARE_NAMES.contains(&file_name),
    }
}

/// Blob key for a repo-relative file path, under the skill's blob prefix.
fn blob_key_for(prefix: &str, skill_path: &str, repo_path: &str) -> String {
    let rel = if skill_path.is_empty() {
        repo_path
    } else {
        repo_path
            .strip_prefix(skill_path)
            .map(|r| r.trim_start_matches('/'))
            .unwrap_or(repo_path)
    };
    format!("{}/{}", prefix, rel)
}

fn default_name(msg: &IngestMessage) -> String {
    if msg.skill_path.is_empty() {
        msg.repo.clone()
    } else {
        msg.skill_path
            .rsplit('/')
            .next()
            .unwrap_or(msg.repo.as_str())
            .to_string()
    }
}

fn merge_tags(front_tags: &[String], topics: &[String]) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in front_tags.iter().chain(topics.iter()) {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(trimmed)) {
            tags.push(trimmed.to_string());
        }
    }
    tags
}
