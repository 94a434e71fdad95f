use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Catalog records. skill_path is '' (not NULL) for repository-root
    // skills so the natural-key uniqueness constraint holds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS skills (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            skill_path TEXT NOT NULL DEFAULT '',
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            stars INTEGER NOT NULL DEFAULT 0,
            forks INTEGER NOT NULL DEFAULT 0,
            star_history TEXT NOT NULL DEFAULT '[]',
            trending_score REAL NOT NULL DEFAULT 0,
            last_commit_at INTEGER,
            last_commit_sha TEXT,
            content_hash TEXT,
            tier TEXT NOT NULL DEFAULT 'cold',
            last_accessed_at INTEGER,
            accesses_7d INTEGER NOT NULL DEFAULT 0,
            accesses_30d INTEGER NOT NULL DEFAULT 0,
            downloads_7d INTEGER NOT NULL DEFAULT 0,
            downloads_30d INTEGER NOT NULL DEFAULT 0,
            next_update_at INTEGER,
            classification_method TEXT,
            visibility TEXT NOT NULL DEFAULT 'public',
            tags TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_indexed_at INTEGER NOT NULL,
            UNIQUE(owner, repo, skill_path),
            UNIQUE(slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Content fingerprints, one row per (record, hash kind)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            skill_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE(skill_id, kind),
            FOREIGN KEY (skill_id) REFERENCES skills(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Controlled category vocabulary
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            slug TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            keywords TEXT NOT NULL DEFAULT '[]',
            usage_count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS skill_categories (
            skill_id TEXT NOT NULL,
            category_slug TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 1.0,
            UNIQUE(skill_id, category_slug),
            FOREIGN KEY (skill_id) REFERENCES skills(id),
            FOREIGN KEY (category_slug) REFERENCES categories(slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Raw access/download events, rolled up daily and pruned at 35 days
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS usage_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            skill_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            occurred_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Per-hour classification method counters
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS classification_stats (
            hour_bucket TEXT NOT NULL,
            method TEXT NOT NULL,
            count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(hour_bucket, method)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Named cursors guarding the daily rollup, monthly archive pass,
    // and quarterly resurrection sweep
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            name TEXT PRIMARY KEY,
            cursor TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sweep_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            checked INTEGER NOT NULL DEFAULT 0,
            resurrected INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Durable at-least-once work queue
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            topic TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            run_after INTEGER NOT NULL,
            claimed_at INTEGER,
            failed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // TTL'd flag store backing
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS flags (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One-time owner notifications (e.g. private record made public)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            skill_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(skill_id, kind)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_skills_tier_next ON skills(tier, next_update_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_skills_trending ON skills(trending_score DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_skills_stars ON skills(stars DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_skills_last_indexed ON skills(last_indexed_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints(hash)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_usage_events_skill ON usage_events(skill_id, occurred_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_usage_events_occurred ON usage_events(occurred_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_topic_due ON queue_jobs(topic, failed, run_after)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_skill_categories_skill ON skill_categories(skill_id)",
    )
    .execute(pool)
    .await?;

    seed_categories(pool).await?;

    Ok(())
}

/// Seed the starter vocabulary. `INSERT OR IGNORE` keeps this idempotent
/// and never overwrites curated edits; later growth comes from validated
/// classifier suggestions.
async fn seed_categories(pool: &SqlitePool) -> Result<()> {
    let seed: &[(&str, &str, &str, &str)] = &[
        (
            "productivity",
            "Productivity",
            "Task management, note taking, and personal workflows",
            r#"["productivity","task","tasks","todo","workflow","organize","planning","notes","calendar"]"#,
        ),
        (
            "development",
            "Development",
            "Software engineering and code tooling",
            r#"["code","coding","developer","programming","debug","git","refactor","testing","api"]"#,
        ),
        (
            "data",
            "Data & Analytics",
            "Working with datasets, queries, and visualization",
            r#"["data","sql","database","analytics","csv","spreadsheet","chart","visualization","etl"]"#,
        ),
        (
            "writing",
            "Writing",
            "Drafting, editing, and documentation",
            r#"["writing","write","blog","draft","edit","grammar","prose","documentation","summarize"]"#,
        ),
        (
            "research",
            "Research",
            "Finding and synthesizing information",
            r#"["research","search","papers","literature","cite","sources","web","lookup"]"#,
        ),
        (
            "automation",
            "Automation",
            "Scripted and scheduled workflows",
            r#"["automation","automate","script","cron","pipeline","deploy","ci","bot"]"#,
        ),
        (
            "design",
            "Design",
            "Visual and interface design",
            r#"["design","ui","ux","layout","color","typography","image","mockup"]"#,
        ),
        (
            "communication",
            "Communication",
            "Messaging, mail, and meetings",
            r#"["email","slack","chat","message","meeting","translate","reply"]"#,
        ),
        (
            "security",
            "Security",
            "Auditing, scanning, and secrets handling",
            r#"["security","vulnerability","scan","audit","secrets","encryption","auth"]"#,
        ),
        ("other", "Other", "Everything else", "[]"),
    ];
    for (slug, name, description, keywords) in seed {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO categories (slug, name, description, keywords, usage_count)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(slug)
        .bind(name)
        .bind(description)
        .bind(keywords)
        .execute(pool)
        .await?;
    }
    Ok(())
}
