//! Relational persistence for the catalog.
//!
//! All SQL lives here. Mutations that must land together (a refresh
//! chunk, a classification result, an archival) run in one transaction;
//! independent batches are independent transactions, so a crash between
//! them leaves re-runnable state rather than corruption.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{
    Category, ClassificationMethod, Skill, StarSnapshot, Tier, Visibility,
};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Per-record write of a scheduled refresh chunk.
#[derive(Debug, Clone)]
pub struct ScoreUpdate {
    pub skill_id: String,
    pub stars: i64,
    pub forks: i64,
    pub star_history: Vec<StarSnapshot>,
    pub trending_score: f64,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub tier: Tier,
    pub next_update_at: Option<DateTime<Utc>>,
}

fn ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<i64> {
    dt.map(|d| d.timestamp())
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn from_opt_ts(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t, 0))
}

fn skill_from_row(row: &sqlx::sqlite::SqliteRow) -> Skill {
    let history_json: String = row.get("star_history");
    let tags_json: String = row.get("tags");
    let tier: String = row.get("tier");
    let method: Option<String> = row.get("classification_method");
    let visibility: String = row.get("visibility");

    Skill {
        id: row.get("id"),
        owner: row.get("owner"),
        repo: row.get("repo"),
        skill_path: row.get("skill_path"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        stars: row.get("stars"),
        forks: row.get("forks"),
        star_history: serde_json::from_str(&history_json).unwrap_or_default(),
        trending_score: row.get("trending_score"),
        last_commit_at: from_opt_ts(row.get("last_commit_at")),
        last_commit_sha: row.get("last_commit_sha"),
        content_hash: row.get("content_hash"),
        tier: Tier::parse(&tier).unwrap_or(Tier::Cold),
        last_accessed_at: from_opt_ts(row.get("last_accessed_at")),
        accesses_7d: row.get("accesses_7d"),
        accesses_30d: row.get("accesses_30d"),
        downloads_7d: row.get("downloads_7d"),
        downloads_30d: row.get("downloads_30d"),
        next_update_at: from_opt_ts(row.get("next_update_at")),
        classification_method: method.as_deref().and_then(ClassificationMethod::parse),
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Public),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: from_ts(row.get("created_at")),
        updated_at: from_ts(row.get("updated_at")),
        last_indexed_at: from_ts(row.get("last_indexed_at")),
    }
}

const SKILL_COLUMNS: &str = "id, owner, repo, skill_path, slug, name, description, stars, forks, \
     star_history, trending_score, last_commit_at, last_commit_sha, content_hash, tier, \
     last_accessed_at, accesses_7d, accesses_30d, downloads_7d, downloads_30d, next_update_at, \
     classification_method, visibility, tags, created_at, updated_at, last_indexed_at";

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- skills ----

    pub async fn find_by_repo(
        &self,
        owner: &str,
        repo: &str,
        skill_path: &str,
    ) -> Result<Option<Skill>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM skills WHERE owner = ? AND repo = ? AND skill_path = ?",
            SKILL_COLUMNS
        ))
        .bind(owner)
        .bind(repo)
        .bind(skill_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(skill_from_row))
    }

    pub async fn get_skill(&self, id: &str) -> Result<Option<Skill>> {
        let row = sqlx::query(&format!("SELECT {} FROM skills WHERE id = ?", SKILL_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(skill_from_row))
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM skills WHERE slug = ?")
            .bind(slug)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Insert or update on the natural key. The slug, id, and created_at
    /// of an existing row are never changed by the conflict arm; callers
    /// resolve them by reading first.
    pub async fn upsert_skill(&self, skill: &Skill) -> Result<()> {
        let history = serde_json::to_string(&skill.star_history)?;
        let tags = serde_json::to_string(&skill.tags)?;
        sqlx::query(
            r#"
            INSERT INTO skills (id, owner, repo, skill_path, slug, name, description, stars, forks,
                star_history, trending_score, last_commit_at, last_commit_sha, content_hash, tier,
                last_accessed_at, accesses_7d, accesses_30d, downloads_7d, downloads_30d,
                next_update_at, classification_method, visibility, tags, created_at, updated_at,
                last_indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(owner, repo, skill_path) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                stars = excluded.stars,
                forks = excluded.forks,
                star_history = excluded.star_history,
                trending_score = excluded.trending_score,
                last_commit_at = excluded.last_commit_at,
                last_commit_sha = excluded.last_commit_sha,
                content_hash = excluded.content_hash,
                tier = excluded.tier,
                last_accessed_at = excluded.last_accessed_at,
                next_update_at = excluded.next_update_at,
                classification_method = excluded.classification_method,
                visibility = excluded.visibility,
                tags = excluded.tags,
                updated_at = excluded.updated_at,
                last_indexed_at = excluded.last_indexed_at
            "#,
        )
        .bind(&skill.id)
        .bind(&skill.owner)
        .bind(&skill.repo)
        .bind(&skill.skill_path)
        .bind(&skill.slug)
        .bind(&skill.name)
        .bind(&skill.description)
        .bind(skill.stars)
        .bind(skill.forks)
        .bind(&history)
        .bind(skill.trending_score)
        .bind(opt_ts(skill.last_commit_at))
        .bind(&skill.last_commit_sha)
        .bind(&skill.content_hash)
        .bind(skill.tier.as_str())
        .bind(opt_ts(skill.last_accessed_at))
        .bind(skill.accesses_7d)
        .bind(skill.accesses_30d)
        .bind(skill.downloads_7d)
        .bind(skill.downloads_30d)
        .bind(opt_ts(skill.next_update_at))
        .bind(skill.classification_method.map(|m| m.as_str()))
        .bind(skill.visibility.as_str())
        .bind(&tags)
        .bind(ts(skill.created_at))
        .bind(ts(skill.updated_at))
        .bind(ts(skill.last_indexed_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Popularity-only update for the unchanged-commit early-out.
    pub async fn update_counters(
        &self,
        id: &str,
        stars: i64,
        forks: i64,
        pushed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE skills SET stars = ?, forks = ?, last_commit_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(stars)
        .bind(forks)
        .bind(opt_ts(pushed_at))
        .bind(ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rewrite a private record's identity in place when a public
    /// discovery turns out to be the same content.
    pub async fn convert_private_to_public(
        &self,
        id: &str,
        owner: &str,
        repo: &str,
        skill_path: &str,
        stars: i64,
        forks: i64,
        pushed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE skills SET owner = ?, repo = ?, skill_path = ?, visibility = 'public',
                stars = ?, forks = ?, last_commit_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(owner)
        .bind(repo)
        .bind(skill_path)
        .bind(stars)
        .bind(forks)
        .bind(opt_ts(pushed_at))
        .bind(ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn skills_by_ids(&self, ids: &[String]) -> Result<Vec<Skill>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(skill) = self.get_skill(id).await? {
                out.push(skill);
            }
        }
        Ok(out)
    }

    /// Records of `tier` whose next update is unset or in the past,
    /// oldest first.
    pub async fn due_skills(&self, tier: Tier, now: DateTime<Utc>, cap: i64) -> Result<Vec<Skill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills WHERE tier = ? AND (next_update_at IS NULL OR next_update_at <= ?)
             ORDER BY COALESCE(next_update_at, 0) ASC LIMIT ?",
            SKILL_COLUMNS
        ))
        .bind(tier.as_str())
        .bind(ts(now))
        .bind(cap)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    pub async fn archived_skills(&self) -> Result<Vec<Skill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills WHERE tier = 'archived' ORDER BY updated_at ASC",
            SKILL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    /// Records eligible for archival. Records that never reported a push
    /// date are left alone.
    pub async fn archive_candidates(
        &self,
        access_cutoff: DateTime<Utc>,
        max_stars: i64,
        push_cutoff: DateTime<Utc>,
    ) -> Result<Vec<Skill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills
             WHERE tier != 'archived'
               AND stars < ?
               AND last_commit_at IS NOT NULL AND last_commit_at <= ?
               AND COALESCE(last_accessed_at, created_at) <= ?",
            SKILL_COLUMNS
        ))
        .bind(max_stars)
        .bind(ts(push_cutoff))
        .bind(ts(access_cutoff))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    /// Apply one refresh chunk's writes atomically.
    pub async fn apply_score_updates(&self, updates: &[ScoreUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let now = ts(Utc::now());
        let mut tx = self.pool.begin().await?;
        for update in updates {
            let history = serde_json::to_string(&update.star_history)?;
            sqlx::query(
                r#"
                UPDATE skills SET stars = ?, forks = ?, star_history = ?, trending_score = ?,
                    last_commit_at = ?, tier = ?, next_update_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(update.stars)
            .bind(update.forks)
            .bind(&history)
            .bind(update.trending_score)
            .bind(opt_ts(update.last_commit_at))
            .bind(update.tier.as_str())
            .bind(opt_ts(update.next_update_at))
            .bind(now)
            .bind(&update.skill_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Strip an archived record down to its identity in one transaction.
    pub async fn archive_skill(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM skill_categories WHERE skill_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM fingerprints WHERE skill_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE skills SET tier = 'archived', star_history = '[]', tags = '[]',
                content_hash = NULL, next_update_at = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ts(now))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Return a record to active rotation at the bottom tier. It must
    /// re-earn hot or warm status through normal scoring.
    pub async fn restore_skill(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE skills SET tier = 'cold', next_update_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(ts(now))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- usage events & rollup ----

    pub async fn record_access(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE skills SET last_accessed_at = ? WHERE id = ?")
            .bind(ts(now))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO usage_events (skill_id, kind, occurred_at) VALUES (?, 'access', ?)")
            .bind(id)
            .bind(ts(now))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn record_download(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_events (skill_id, kind, occurred_at) VALUES (?, 'download', ?)",
        )
        .bind(id)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recompute the rolling 7/30-day counters for every record from raw
    /// events, then prune events older than 35 days.
    pub async fn rollup_usage(&self, now: DateTime<Utc>) -> Result<u64> {
        let d7 = ts(now - chrono::Duration::days(7));
        let d30 = ts(now - chrono::Duration::days(30));
        let prune_before = ts(now - chrono::Duration::days(35));

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE skills SET
                accesses_7d = (SELECT COUNT(*) FROM usage_events
                    WHERE skill_id = skills.id AND kind = 'access' AND occurred_at > ?),
                accesses_30d = (SELECT COUNT(*) FROM usage_events
                    WHERE skill_id = skills.id AND kind = 'access' AND occurred_at > ?),
                downloads_7d = (SELECT COUNT(*) FROM usage_events
                    WHERE skill_id = skills.id AND kind = 'download' AND occurred_at > ?),
                downloads_30d = (SELECT COUNT(*) FROM usage_events
                    WHERE skill_id = skills.id AND kind = 'download' AND occurred_at > ?)
            "#,
        )
        .bind(d7)
        .bind(d30)
        .bind(d7)
        .bind(d30)
        .execute(&mut *tx)
        .await?;
        let pruned = sqlx::query("DELETE FROM usage_events WHERE occurred_at < ?")
            .bind(prune_before)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(pruned)
    }

    // ---- fingerprints ----

    pub async fn put_fingerprints(
        &self,
        skill_id: &str,
        full: &str,
        normalized: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (kind, hash) in [("full", full), ("normalized", normalized)] {
            sqlx::query(
                r#"
                INSERT INTO fingerprints (skill_id, kind, hash, updated_at) VALUES (?, ?, ?, ?)
                ON CONFLICT(skill_id, kind) DO UPDATE SET hash = excluded.hash, updated_at = excluded.updated_at
                "#,
            )
            .bind(skill_id)
            .bind(kind)
            .bind(hash)
            .bind(ts(now))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Records whose stored fingerprint of `kind` equals `hash`.
    pub async fn skills_matching_fingerprint(&self, kind: &str, hash: &str) -> Result<Vec<Skill>> {
        let rows = sqlx::query(
            "SELECT s.* FROM skills s JOIN fingerprints f ON f.skill_id = s.id
             WHERE f.kind = ? AND f.hash = ?",
        )
        .bind(kind)
        .bind(hash)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    // ---- categories ----

    pub async fn all_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT slug, name, description, keywords, usage_count FROM categories ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let keywords: String = row.get("keywords");
                Category {
                    slug: row.get("slug"),
                    name: row.get("name"),
                    description: row.get("description"),
                    keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                    usage_count: row.get("usage_count"),
                }
            })
            .collect())
    }

    /// Insert a category, or bump its usage count if another
    /// classification created it concurrently.
    pub async fn upsert_category(&self, category: &Category) -> Result<()> {
        let keywords = serde_json::to_string(&category.keywords)?;
        sqlx::query(
            r#"
            INSERT INTO categories (slug, name, description, keywords, usage_count)
            VALUES (?, ?, ?, ?, 1)
            ON CONFLICT(slug) DO UPDATE SET usage_count = usage_count + 1
            "#,
        )
        .bind(&category.slug)
        .bind(&category.name)
        .bind(&category.description)
        .bind(&keywords)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace a record's category links and record the method used, in
    /// one transaction. Also bumps the hourly method counter.
    pub async fn replace_skill_categories(
        &self,
        skill_id: &str,
        assignments: &[(String, f64)],
        method: ClassificationMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let hour_bucket = now.format("%Y-%m-%dT%H").to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM skill_categories WHERE skill_id = ?")
            .bind(skill_id)
            .execute(&mut *tx)
            .await?;
        for (slug, confidence) in assignments {
            sqlx::query(
                "INSERT INTO skill_categories (skill_id, category_slug, confidence) VALUES (?, ?, ?)",
            )
            .bind(skill_id)
            .bind(slug)
            .bind(confidence)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE skills SET classification_method = ?, updated_at = ? WHERE id = ?")
            .bind(method.as_str())
            .bind(ts(now))
            .bind(skill_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO classification_stats (hour_bucket, method, count) VALUES (?, ?, 1)
            ON CONFLICT(hour_bucket, method) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(&hour_bucket)
        .bind(method.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn skill_categories(&self, skill_id: &str) -> Result<Vec<String>> {
        let slugs: Vec<String> = sqlx::query_scalar(
            "SELECT category_slug FROM skill_categories WHERE skill_id = ? ORDER BY category_slug",
        )
        .bind(skill_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(slugs)
    }

    /// Restore category links without touching the method, used by
    /// resurrection.
    pub async fn link_categories(&self, skill_id: &str, slugs: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for slug in slugs {
            sqlx::query(
                r#"
                INSERT INTO skill_categories (skill_id, category_slug, confidence) VALUES (?, ?, 1.0)
                ON CONFLICT(skill_id, category_slug) DO NOTHING
                "#,
            )
            .bind(skill_id)
            .bind(slug)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- notices ----

    /// One-time notice per (record, kind); repeats are ignored.
    pub async fn insert_notice(
        &self,
        skill_id: &str,
        kind: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notices (skill_id, kind, message, created_at) VALUES (?, ?, ?, ?)
            ON CONFLICT(skill_id, kind) DO NOTHING
            "#,
        )
        .bind(skill_id)
        .bind(kind)
        .bind(message)
        .bind(ts(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- sweep runs ----

    pub async fn start_sweep_run(&self, now: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO sweep_runs (started_at) VALUES (?)")
            .bind(ts(now))
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn finish_sweep_run(
        &self,
        run_id: i64,
        checked: i64,
        resurrected: i64,
        failed: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sweep_runs SET finished_at = ?, checked = ?, resurrected = ?, failed = ? WHERE id = ?",
        )
        .bind(ts(now))
        .bind(checked)
        .bind(resurrected)
        .bind(failed)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- checkpoints ----

    pub async fn get_checkpoint(&self, name: &str) -> Result<Option<String>> {
        let cursor: Option<String> =
            sqlx::query_scalar("SELECT cursor FROM checkpoints WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(cursor)
    }

    pub async fn set_checkpoint(&self, name: &str, cursor: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (name, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET cursor = excluded.cursor, updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(cursor)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- listings ----

    pub async fn top_by_trending(&self, limit: i64) -> Result<Vec<Skill>> {
        self.listing_query("trending_score DESC", limit).await
    }

    pub async fn top_by_stars(&self, limit: i64) -> Result<Vec<Skill>> {
        self.listing_query("stars DESC", limit).await
    }

    pub async fn recently_indexed(&self, limit: i64) -> Result<Vec<Skill>> {
        self.listing_query("last_indexed_at DESC", limit).await
    }

    async fn listing_query(&self, order: &str, limit: i64) -> Result<Vec<Skill>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM skills WHERE visibility = 'public' AND tier != 'archived'
             ORDER BY {} LIMIT ?",
            SKILL_COLUMNS, order
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(skill_from_row).collect())
    }

    // ---- stats ----

    pub async fn count_skills(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM skills")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn tier_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT tier, COUNT(*) AS n FROM skills GROUP BY tier ORDER BY tier")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("tier"), row.get::<i64, _>("n")))
            .collect())
    }

    pub async fn method_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT classification_method AS m, COUNT(*) AS n FROM skills
             WHERE classification_method IS NOT NULL GROUP BY classification_method ORDER BY m",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("m"), row.get::<i64, _>("n")))
            .collect())
    }
}
