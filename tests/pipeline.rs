//! End-to-end pipeline tests.
//!
//! These drive the real stages (ingest, classify, tier refresh, archive,
//! resurrect) against a temporary SQLite database, in-memory blob and
//! flag stores, and a scripted metadata provider that counts its calls,
//! so convergence and fetch-cost properties can be asserted exactly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use skilldex::archive::run_archive_pass;
use skilldex::blob::{archive_key, skill_prefix, BlobStore, MemoryBlobStore};
use skilldex::classify::run_classify;
use skilldex::config::Config;
use skilldex::db;
use skilldex::fingerprint;
use skilldex::flags::{FlagStore, MemoryFlagStore};
use skilldex::github::{MetadataProvider, RepoMetadata, TreeEntry};
use skilldex::ingest::{run_ingest, IngestOutcome};
use skilldex::migrate;
use skilldex::models::{
    ArchiveBlob, ClassificationMethod, IngestMessage, Listing, Skill, StarSnapshot, Tier,
    Visibility,
};
use skilldex::pipeline::Pipeline;
use skilldex::queue::{Queue, TOPIC_CLASSIFY, TOPIC_INGEST};
use skilldex::resurrect::run_resurrection_sweep;
use skilldex::store::Store;
use skilldex::tiers::run_scheduled_pass;
use skilldex::visit::{record_visit, VisitOutcome};
use skilldex::worker::drain_once;

// ─── Scripted metadata provider ─────────────────────────────────────

/// In-memory [`MetadataProvider`] with per-method call counters and
/// injectable failures.
struct ScriptedProvider {
    repos: RwLock<HashMap<(String, String), RepoMetadata>>,
    files: RwLock<HashMap<(String, String, String), String>>,
    trees: RwLock<HashMap<(String, String), Vec<TreeEntry>>>,
    failing: RwLock<HashSet<(String, String)>>,
    fetch_repo_calls: AtomicUsize,
    fetch_many_calls: AtomicUsize,
    get_file_calls: AtomicUsize,
    get_tree_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
            files: RwLock::new(HashMap::new()),
            trees: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            fetch_repo_calls: AtomicUsize::new(0),
            fetch_many_calls: AtomicUsize::new(0),
            get_file_calls: AtomicUsize::new(0),
            get_tree_calls: AtomicUsize::new(0),
        }
    }

    fn put_repo(&self, meta: RepoMetadata) {
        self.repos
            .write()
            .unwrap()
            .insert((meta.owner.clone(), meta.repo.clone()), meta);
    }

    fn put_file(&self, owner: &str, repo: &str, path: &str, content: &str) {
        self.files.write().unwrap().insert(
            (owner.to_string(), repo.to_string(), path.to_string()),
            content.to_string(),
        );
    }

    fn put_tree(&self, owner: &str, repo: &str, entries: &[(&str, u64)]) {
        let entries = entries
            .iter()
            .map(|(path, size)| TreeEntry {
                path: path.to_string(),
                size: *size,
            })
            .collect();
        self.trees
            .write()
            .unwrap()
            .insert((owner.to_string(), repo.to_string()), entries);
    }

    fn set_failing(&self, owner: &str, repo: &str, failing: bool) {
        let key = (owner.to_string(), repo.to_string());
        let mut set = self.failing.write().unwrap();
        if failing {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    fn set_stars(&self, owner: &str, repo: &str, stars: i64) {
        let mut repos = self.repos.write().unwrap();
        if let Some(meta) = repos.get_mut(&(owner.to_string(), repo.to_string())) {
            meta.stars = stars;
        }
    }

    fn get_file_count(&self) -> usize {
        self.get_file_calls.load(Ordering::SeqCst)
    }

    fn get_tree_count(&self) -> usize {
        self.get_tree_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for ScriptedProvider {
    async fn fetch_repo(&self, owner: &str, repo: &str) -> Result<Option<RepoMetadata>> {
        self.fetch_repo_calls.fetch_add(1, Ordering::SeqCst);
        let key = (owner.to_string(), repo.to_string());
        if self.failing.read().unwrap().contains(&key) {
            bail!("scripted outage for {}/{}", owner, repo);
        }
        Ok(self.repos.read().unwrap().get(&key).cloned())
    }

    async fn fetch_many(
        &self,
        refs: &[(String, String)],
    ) -> Result<HashMap<(String, String), RepoMetadata>> {
        self.fetch_many_calls.fetch_add(1, Ordering::SeqCst);
        let repos = self.repos.read().unwrap();
        Ok(refs
            .iter()
            .filter_map(|key| repos.get(key).map(|meta| (key.clone(), meta.clone())))
            .collect())
    }

    async fn get_file(&self, owner: &str, repo: &str, path: &str) -> Result<Option<String>> {
        self.get_file_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .files
            .read()
            .unwrap()
            .get(&(owner.to_string(), repo.to_string(), path.to_string()))
            .cloned())
    }

    async fn get_tree(&self, owner: &str, repo: &str, _head_ref: &str) -> Result<Vec<TreeEntry>> {
        self.get_tree_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .trees
            .read()
            .unwrap()
            .get(&(owner.to_string(), repo.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

fn test_config(tmp: &TempDir) -> Config {
    let content = format!(
        r#"
[db]
path = "{}/catalog.db"

[blobs]
root = "{}/blobs"

[resurrect]
batch_delay_ms = 0
"#,
        tmp.path().display(),
        tmp.path().display()
    );
    toml::from_str(&content).unwrap()
}

async fn test_pipeline(provider: Arc<ScriptedProvider>) -> (TempDir, Pipeline) {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let pool = db::connect(&cfg).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let pipeline = Pipeline {
        store: Store::new(pool.clone()),
        queue: Queue::new(pool, cfg.queue.max_attempts),
        blobs: Arc::new(MemoryBlobStore::new()),
        flags: Arc::new(MemoryFlagStore::new()),
        metadata: provider,
        config: cfg,
    };
    (tmp, pipeline)
}

fn meta(owner: &str, repo: &str, stars: i64) -> RepoMetadata {
    RepoMetadata {
        owner: owner.to_string(),
        repo: repo.to_string(),
        stars,
        forks: stars / 10,
        description: Some(format!("{} description", repo)),
        pushed_at: Some(Utc::now() - Duration::days(2)),
        is_fork: false,
        topics: Vec::new(),
        head_sha: Some(format!("{}-{}-head", owner, repo)),
    }
}

fn submit(owner: &str, repo: &str) -> IngestMessage {
    IngestMessage {
        owner: owner.to_string(),
        repo: repo.to_string(),
        skill_path: String::new(),
        submitted_by: None,
        force_reindex: false,
    }
}

const PDF_MARKER: &str = "---\nname: PDF Toolkit\ndescription: Extract text and tables from PDF files\ncategory: productivity\ntags:\n  - pdf\n  - documents\n---\n# PDF Toolkit\n\nTurn PDFs into clean text.\n";

/// Script a complete single-skill repository at the repo root.
fn script_pdf_repo(provider: &ScriptedProvider, owner: &str, repo: &str, stars: i64) {
    provider.put_repo(meta(owner, repo, stars));
    provider.put_file(owner, repo, "SKILL.md", PDF_MARKER);
    provider.put_file(owner, repo, "README.md", "# Readme\n\nUsage notes.\n");
    provider.put_tree(
        owner,
        repo,
        &[("SKILL.md", 200), ("README.md", 30), ("logo.png", 4096)],
    );
}

fn baseline_skill(id: &str, owner: &str, repo: &str, stars: i64) -> Skill {
    let now = Utc::now();
    Skill {
        id: id.to_string(),
        owner: owner.to_string(),
        repo: repo.to_string(),
        skill_path: String::new(),
        slug: format!("{}-{}", owner, repo),
        name: repo.to_string(),
        description: None,
        stars,
        forks: 0,
        star_history: vec![StarSnapshot {
            date: now.date_naive(),
            stars,
        }],
        trending_score: 0.0,
        last_commit_at: Some(now - Duration::days(10)),
        last_commit_sha: Some("sha".to_string()),
        content_hash: None,
        tier: Tier::Cold,
        last_accessed_at: None,
        accesses_7d: 0,
        accesses_30d: 0,
        downloads_7d: 0,
        downloads_30d: 0,
        next_update_at: None,
        classification_method: None,
        visibility: Visibility::Public,
        tags: Vec::new(),
        created_at: now - Duration::days(200),
        updated_at: now,
        last_indexed_at: now,
    }
}

// ─── Ingest + classify ──────────────────────────────────────────────

/// Prove that a submitted repository ends up as one classified catalog
/// record: direct classification from the declared category, cool tier
/// from its star count, and cached source blobs.
#[tokio::test]
async fn test_submitted_repo_is_indexed_and_classified() {
    let provider = Arc::new(ScriptedProvider::new());
    script_pdf_repo(&provider, "octo", "pdf-kit", 42);
    let (_tmp, pipeline) = test_pipeline(provider).await;

    let outcome = run_ingest(&pipeline, &submit("octo", "pdf-kit"))
        .await
        .unwrap();
    let classify = match outcome {
        IngestOutcome::Indexed { classify, .. } => classify,
        other => panic!("expected Indexed, got {:?}", other),
    };

    let skill = pipeline
        .store
        .find_by_repo("octo", "pdf-kit", "")
        .await
        .unwrap()
        .expect("record should exist");
    assert_eq!(skill.name, "PDF Toolkit");
    assert_eq!(skill.slug, "pdf-toolkit");
    assert_eq!(skill.stars, 42);
    assert_eq!(skill.tier, Tier::Cool);
    assert_eq!(
        skill.description.as_deref(),
        Some("Extract text and tables from PDF files")
    );
    assert!(skill.tags.iter().any(|t| t == "pdf"));

    // Cached source: the marker and the readme, but not the png.
    let prefix = skill_prefix("octo", "pdf-kit", "");
    let cached = pipeline.blobs.list_prefix(&prefix).await.unwrap();
    assert_eq!(cached.len(), 2);
    assert!(pipeline
        .blobs
        .get(&format!("{}/SKILL.md", prefix))
        .await
        .unwrap()
        .is_some());

    let outcome = run_classify(&pipeline, &classify).await.unwrap();
    assert_eq!(outcome.method, ClassificationMethod::Direct);
    assert_eq!(outcome.categories, vec!["productivity"]);
    assert_eq!(
        pipeline.store.skill_categories(&skill.id).await.unwrap(),
        vec!["productivity"]
    );
    let skill = pipeline.store.get_skill(&skill.id).await.unwrap().unwrap();
    assert_eq!(
        skill.classification_method,
        Some(ClassificationMethod::Direct)
    );
}

/// Prove that resubmitting an unchanged repository converges: still one
/// record, and the second run costs one metadata call and zero content
/// fetches.
#[tokio::test]
async fn test_unchanged_resubmission_fetches_no_content() {
    let provider = Arc::new(ScriptedProvider::new());
    script_pdf_repo(&provider, "octo", "pdf-kit", 42);
    let (_tmp, pipeline) = test_pipeline(provider.clone()).await;

    let first = run_ingest(&pipeline, &submit("octo", "pdf-kit"))
        .await
        .unwrap();
    assert!(matches!(first, IngestOutcome::Indexed { .. }));
    let files_after_first = provider.get_file_count();
    let trees_after_first = provider.get_tree_count();

    provider.set_stars("octo", "pdf-kit", 55);
    let second = run_ingest(&pipeline, &submit("octo", "pdf-kit"))
        .await
        .unwrap();
    assert!(matches!(second, IngestOutcome::CountersOnly { .. }));

    assert_eq!(provider.get_file_count(), files_after_first);
    assert_eq!(provider.get_tree_count(), trees_after_first);
    assert_eq!(pipeline.store.count_skills().await.unwrap(), 1);

    let skill = pipeline
        .store
        .find_by_repo("octo", "pdf-kit", "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(skill.stars, 55, "counters should still be refreshed");
}

/// Prove keyword classification kicks in for a low-star record with no
/// declared category: seeded vocabulary keywords in the marker text win.
#[tokio::test]
async fn test_keyword_classification_from_marker_text() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.put_repo(meta("lowkey", "query-helper", 5));
    provider.put_file(
        "lowkey",
        "query-helper",
        "SKILL.md",
        "---\nname: Query Helper\n---\nWrite sql against any database, chart the results, export csv.\n",
    );
    provider.put_tree("lowkey", "query-helper", &[("SKILL.md", 100)]);
    let (_tmp, pipeline) = test_pipeline(provider).await;

    let classify = match run_ingest(&pipeline, &submit("lowkey", "query-helper"))
        .await
        .unwrap()
    {
        IngestOutcome::Indexed { classify, .. } => classify,
        other => panic!("expected Indexed, got {:?}", other),
    };
    let outcome = run_classify(&pipeline, &classify).await.unwrap();

    assert_eq!(outcome.method, ClassificationMethod::Keyword);
    assert_eq!(outcome.categories[0], "data");
}

/// Prove the anti-duplication guard: a low-reputation copy of a
/// high-reputation public record is rejected, while a reputable
/// submitter with the same content is admitted.
#[tokio::test]
async fn test_duplicate_guard_rejects_by_reputation() {
    let provider = Arc::new(ScriptedProvider::new());
    script_pdf_repo(&provider, "bigco", "pdf-kit", 1500);
    script_pdf_repo(&provider, "copycat", "pdf-clone", 5);
    script_pdf_repo(&provider, "rival", "pdf-pro", 150);
    let (_tmp, pipeline) = test_pipeline(provider).await;

    let original = run_ingest(&pipeline, &submit("bigco", "pdf-kit"))
        .await
        .unwrap();
    assert!(matches!(original, IngestOutcome::Indexed { .. }));

    let copy = run_ingest(&pipeline, &submit("copycat", "pdf-clone"))
        .await
        .unwrap();
    assert!(matches!(copy, IngestOutcome::DuplicateRejected));
    assert_eq!(pipeline.store.count_skills().await.unwrap(), 1);

    // Same content from a submitter above the trust threshold is let in.
    let trusted = run_ingest(&pipeline, &submit("rival", "pdf-pro"))
        .await
        .unwrap();
    assert!(matches!(trusted, IngestOutcome::Indexed { .. }));
    assert_eq!(pipeline.store.count_skills().await.unwrap(), 2);
}

/// Prove that publishing content identical to an existing private record
/// converts that record in place instead of creating a duplicate.
#[tokio::test]
async fn test_public_copy_of_private_record_converts_in_place() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.put_repo(meta("author", "now-public", 30));
    provider.put_file("author", "now-public", "SKILL.md", PDF_MARKER);
    provider.put_tree("author", "now-public", &[("SKILL.md", 200)]);
    let (_tmp, pipeline) = test_pipeline(provider).await;

    // Seed the private record with the fingerprints ingestion will see.
    let mut private = baseline_skill("priv-1", "author", "private-stash", 0);
    private.visibility = Visibility::Private;
    pipeline.store.upsert_skill(&private).await.unwrap();
    let prints = fingerprint::compute(&[("SKILL.md".to_string(), PDF_MARKER.to_string())]);
    pipeline
        .store
        .put_fingerprints("priv-1", &prints.full, &prints.normalized, Utc::now())
        .await
        .unwrap();

    let outcome = run_ingest(&pipeline, &submit("author", "now-public"))
        .await
        .unwrap();
    match outcome {
        IngestOutcome::ConvertedPrivate { skill_id } => assert_eq!(skill_id, "priv-1"),
        other => panic!("expected ConvertedPrivate, got {:?}", other),
    }

    let skill = pipeline.store.get_skill("priv-1").await.unwrap().unwrap();
    assert_eq!(skill.visibility, Visibility::Public);
    assert_eq!(skill.owner, "author");
    assert_eq!(skill.repo, "now-public");
    assert_eq!(pipeline.store.count_skills().await.unwrap(), 1);
}

// ─── Scheduled pass ─────────────────────────────────────────────────

/// Prove the visit → flag → refresh loop: a visited cold record is
/// flagged, the next pass refreshes it from the platform, promotes its
/// tier, queues reclassification once it crosses the AI threshold, and
/// republishes listings.
#[tokio::test]
async fn test_flagged_refresh_promotes_and_requeues_classification() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.put_repo(meta("sleeper", "hit", 3));
    provider.put_file(
        "sleeper",
        "hit",
        "SKILL.md",
        "---\nname: Task Hero\n---\nOrganize tasks and todo lists into a weekly planning workflow.\n",
    );
    provider.put_tree("sleeper", "hit", &[("SKILL.md", 80)]);
    let (_tmp, pipeline) = test_pipeline(provider.clone()).await;

    let outcome = run_ingest(&pipeline, &submit("sleeper", "hit")).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Indexed { .. }));

    // Drain the classification job ingest queued. No declared category
    // and 3 stars lands it on the keyword path, which is the method
    // reclassification watches for.
    assert_eq!(drain_once(&pipeline).await.unwrap(), 1);
    let skill = pipeline
        .store
        .find_by_repo("sleeper", "hit", "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        skill.classification_method,
        Some(ClassificationMethod::Keyword)
    );
    assert_eq!(
        pipeline.store.skill_categories(&skill.id).await.unwrap(),
        vec!["productivity"]
    );
    assert_eq!(skill.tier, Tier::Cold);
    assert_eq!(skill.next_update_at, None);

    // A visit flags the unscheduled record for the next pass.
    let visit = record_visit(&pipeline, "sleeper", "hit", "").await.unwrap();
    assert_eq!(visit, VisitOutcome::FlaggedForUpdate);

    provider.set_stars("sleeper", "hit", 150);
    let summary = run_scheduled_pass(&pipeline).await.unwrap();
    assert_eq!(summary.flagged, 1);
    assert_eq!(summary.refreshed, 1);
    assert_eq!(summary.fetch_failures, 0);
    assert_eq!(summary.reclassified, 1, "crossed the AI star threshold");
    assert!(summary.published);

    let skill = pipeline.store.get_skill(&skill.id).await.unwrap().unwrap();
    assert_eq!(skill.stars, 150);
    assert_eq!(skill.tier, Tier::Hot, "freshly visited records run hot");
    assert!(skill.next_update_at.is_some());
    assert!(pipeline.flags.list("needs_update:").await.unwrap().is_empty());
    assert_eq!(
        pipeline.queue.pending_count(TOPIC_CLASSIFY).await.unwrap(),
        1
    );

    let raw = pipeline
        .blobs
        .get("cache/trending.json")
        .await
        .unwrap()
        .expect("listings should be published");
    let listing: Listing = serde_json::from_str(&raw).unwrap();
    assert_eq!(listing.data.len(), 1);
    assert_eq!(listing.data[0].slug, skill.slug);
}

// ─── Archival and resurrection ──────────────────────────────────────

/// Prove the archive pass: a dormant record moves to cold storage (blob
/// written, cache cleared, record stripped), eligible records only, and
/// the monthly checkpoint stops a second run.
#[tokio::test]
async fn test_archive_pass_moves_dormant_records() {
    let provider = Arc::new(ScriptedProvider::new());
    let (_tmp, pipeline) = test_pipeline(provider).await;
    let now = Utc::now();

    let mut dormant = baseline_skill("dormant-1", "ghost", "old-skill", 2);
    dormant.last_accessed_at = Some(now - Duration::days(400));
    dormant.last_commit_at = Some(now - Duration::days(800));
    pipeline.store.upsert_skill(&dormant).await.unwrap();
    pipeline
        .store
        .replace_skill_categories(
            "dormant-1",
            &[("productivity".to_string(), 1.0)],
            ClassificationMethod::Direct,
            now,
        )
        .await
        .unwrap();
    let prefix = skill_prefix("ghost", "old-skill", "");
    pipeline
        .blobs
        .put(&format!("{}/SKILL.md", prefix), "# Old Skill\n")
        .await
        .unwrap();
    pipeline
        .blobs
        .put(&format!("{}/README.md", prefix), "readme")
        .await
        .unwrap();

    // Same idleness but too many stars: stays live.
    let mut popular = baseline_skill("popular-1", "ghost", "starred", 50);
    popular.last_accessed_at = Some(now - Duration::days(400));
    popular.last_commit_at = Some(now - Duration::days(800));
    pipeline.store.upsert_skill(&popular).await.unwrap();

    // Never reported a push date: left alone.
    let mut unknown = baseline_skill("unknown-1", "ghost", "no-push", 1);
    unknown.last_accessed_at = Some(now - Duration::days(400));
    unknown.last_commit_at = None;
    pipeline.store.upsert_skill(&unknown).await.unwrap();

    let archived = run_archive_pass(&pipeline, false).await.unwrap();
    assert_eq!(archived, 1);

    let record = pipeline.store.get_skill("dormant-1").await.unwrap().unwrap();
    assert_eq!(record.tier, Tier::Archived);
    assert!(record.star_history.is_empty());
    assert!(pipeline.blobs.list_prefix(&prefix).await.unwrap().is_empty());

    let key = archive_key(dormant.created_at, "dormant-1");
    let raw = pipeline
        .blobs
        .get(&key)
        .await
        .unwrap()
        .expect("archive blob should exist");
    let payload: ArchiveBlob = serde_json::from_str(&raw).unwrap();
    assert_eq!(payload.skill.id, "dormant-1");
    assert_eq!(payload.skill_md.as_deref(), Some("# Old Skill\n"));
    assert_eq!(payload.categories, vec!["productivity"]);

    let popular = pipeline.store.get_skill("popular-1").await.unwrap().unwrap();
    assert_ne!(popular.tier, Tier::Archived);
    let unknown = pipeline.store.get_skill("unknown-1").await.unwrap().unwrap();
    assert_ne!(unknown.tier, Tier::Archived);

    // Second run in the same month is a checkpointed no-op.
    assert_eq!(run_archive_pass(&pipeline, false).await.unwrap(), 0);
}

/// Prove on-demand resurrection: visiting an archived record whose
/// repository regained interest restores it to the cold tier, puts the
/// marker back, relinks categories, and deletes the archive blob.
#[tokio::test]
async fn test_visit_resurrects_archived_record() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.put_repo(meta("ghost", "revived", 25));
    let (_tmp, pipeline) = test_pipeline(provider).await;
    let now = Utc::now();

    let skill = baseline_skill("arch-1", "ghost", "revived", 2);
    pipeline.store.upsert_skill(&skill).await.unwrap();
    pipeline.store.archive_skill("arch-1", now).await.unwrap();

    let payload = ArchiveBlob {
        skill: skill.clone(),
        skill_md: Some("# Revived\n".to_string()),
        categories: vec!["productivity".to_string()],
        archived_at: now,
    };
    let key = archive_key(skill.created_at, "arch-1");
    pipeline
        .blobs
        .put(&key, &serde_json::to_string(&payload).unwrap())
        .await
        .unwrap();

    let outcome = record_visit(&pipeline, "ghost", "revived", "").await.unwrap();
    assert_eq!(outcome, VisitOutcome::Resurrected);

    let record = pipeline.store.get_skill("arch-1").await.unwrap().unwrap();
    assert_eq!(record.tier, Tier::Cold, "must re-earn a higher tier");
    assert_eq!(
        pipeline.store.skill_categories("arch-1").await.unwrap(),
        vec!["productivity"]
    );
    let prefix = skill_prefix("ghost", "revived", "");
    assert_eq!(
        pipeline
            .blobs
            .get(&format!("{}/SKILL.md", prefix))
            .await
            .unwrap()
            .as_deref(),
        Some("# Revived\n")
    );
    assert!(pipeline.blobs.get(&key).await.unwrap().is_none());
}

/// Prove that visiting an archived record nobody cares about records the
/// access but leaves it archived.
#[tokio::test]
async fn test_visit_on_unpopular_archived_record_stays_archived() {
    let provider = Arc::new(ScriptedProvider::new());
    let mut stale = meta("ghost", "still-dead", 3);
    stale.pushed_at = Some(Utc::now() - Duration::days(200));
    provider.put_repo(stale);
    let (_tmp, pipeline) = test_pipeline(provider).await;

    let skill = baseline_skill("arch-2", "ghost", "still-dead", 2);
    pipeline.store.upsert_skill(&skill).await.unwrap();
    pipeline
        .store
        .archive_skill("arch-2", Utc::now())
        .await
        .unwrap();

    let outcome = record_visit(&pipeline, "ghost", "still-dead", "")
        .await
        .unwrap();
    assert_eq!(outcome, VisitOutcome::Recorded);
    let record = pipeline.store.get_skill("arch-2").await.unwrap().unwrap();
    assert_eq!(record.tier, Tier::Archived);
}

/// Prove the quarterly sweep: archived records are re-checked in one
/// batched metadata call, qualifying ones come back, and the checkpoint
/// stops a second run in the same quarter.
#[tokio::test]
async fn test_quarterly_sweep_restores_popular_records() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.put_repo(meta("ghost", "comeback", 60));
    let mut dead = meta("ghost", "flatline", 10);
    dead.pushed_at = Some(Utc::now() - Duration::days(400));
    provider.put_repo(dead);
    let (_tmp, pipeline) = test_pipeline(provider.clone()).await;
    let now = Utc::now();

    for (id, repo) in [("sw-1", "comeback"), ("sw-2", "flatline")] {
        let skill = baseline_skill(id, "ghost", repo, 2);
        pipeline.store.upsert_skill(&skill).await.unwrap();
        pipeline.store.archive_skill(id, now).await.unwrap();
    }

    let summary = run_resurrection_sweep(&pipeline, false).await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.resurrected, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(provider.fetch_many_calls.load(Ordering::SeqCst), 1);

    let comeback = pipeline.store.get_skill("sw-1").await.unwrap().unwrap();
    assert_eq!(comeback.tier, Tier::Cold);
    let flatline = pipeline.store.get_skill("sw-2").await.unwrap().unwrap();
    assert_eq!(flatline.tier, Tier::Archived);

    // Checkpointed: second run in the same quarter does nothing.
    let again = run_resurrection_sweep(&pipeline, false).await.unwrap();
    assert_eq!(again.checked, 0);
}

// ─── Worker and queue ───────────────────────────────────────────────

/// Prove the retry path: a job failing on a transient outage is backed
/// off and retried, then the whole pipeline converges once the outage
/// clears.
#[tokio::test]
async fn test_queue_retries_transient_failure_then_converges() {
    let provider = Arc::new(ScriptedProvider::new());
    script_pdf_repo(&provider, "flaky", "net", 42);
    provider.set_failing("flaky", "net", true);
    let (_tmp, pipeline) = test_pipeline(provider.clone()).await;

    pipeline
        .queue
        .enqueue(TOPIC_INGEST, &submit("flaky", "net"))
        .await
        .unwrap();

    // First drain hits the outage; the job is nacked with backoff.
    assert_eq!(drain_once(&pipeline).await.unwrap(), 1);
    assert!(pipeline
        .store
        .find_by_repo("flaky", "net", "")
        .await
        .unwrap()
        .is_none());
    assert_eq!(pipeline.queue.pending_count(TOPIC_INGEST).await.unwrap(), 1);

    // Backoff keeps it invisible right away.
    assert_eq!(drain_once(&pipeline).await.unwrap(), 0);

    provider.set_failing("flaky", "net", false);
    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    // One drain now ingests and then classifies in the same sweep.
    assert_eq!(drain_once(&pipeline).await.unwrap(), 2);
    assert_eq!(pipeline.queue.pending_count(TOPIC_INGEST).await.unwrap(), 0);
    assert_eq!(
        pipeline.queue.pending_count(TOPIC_CLASSIFY).await.unwrap(),
        0
    );

    let skill = pipeline
        .store
        .find_by_repo("flaky", "net", "")
        .await
        .unwrap()
        .expect("record should exist after retry");
    assert_eq!(
        skill.classification_method,
        Some(ClassificationMethod::Direct)
    );
}

/// Prove that resubmitting an archived repository resurrects it and
/// reindexes in one go.
#[tokio::test]
async fn test_resubmission_resurrects_archived_record() {
    let provider = Arc::new(ScriptedProvider::new());
    script_pdf_repo(&provider, "ghost", "back", 42);
    let (_tmp, pipeline) = test_pipeline(provider).await;
    let now = Utc::now();

    let skill = baseline_skill("res-1", "ghost", "back", 2);
    pipeline.store.upsert_skill(&skill).await.unwrap();
    pipeline.store.archive_skill("res-1", now).await.unwrap();

    let outcome = run_ingest(&pipeline, &submit("ghost", "back")).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Indexed { .. }));

    let record = pipeline.store.get_skill("res-1").await.unwrap().unwrap();
    assert_eq!(record.tier, Tier::Cool, "reindexed at its current stars");
    assert_eq!(record.stars, 42);
    assert_eq!(pipeline.store.count_skills().await.unwrap(), 1);
}
