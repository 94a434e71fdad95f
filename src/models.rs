//! Core data models used throughout skilldex.
//!
//! These types represent the catalog records, star-history snapshots,
//! queue messages, and archive payloads that flow through the ingestion,
//! classification, scoring, and archival pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Refresh tier controlling how often a record is re-evaluated.
///
/// `Archived` is never produced by tier assignment — only the archiver
/// moves a record into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Hot,
    Warm,
    Cool,
    Cold,
    Archived,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cool => "cool",
            Tier::Cold => "cold",
            Tier::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "hot" => Some(Tier::Hot),
            "warm" => Some(Tier::Warm),
            "cool" => Some(Tier::Cool),
            "cold" => Some(Tier::Cold),
            "archived" => Some(Tier::Archived),
            _ => None,
        }
    }

    /// Re-evaluation interval for this tier, or `None` for tiers that are
    /// only refreshed on access (`cold`) or never (`archived`).
    pub fn refresh_interval(&self) -> Option<chrono::Duration> {
        match self {
            Tier::Hot => Some(chrono::Duration::hours(6)),
            Tier::Warm => Some(chrono::Duration::hours(24)),
            Tier::Cool => Some(chrono::Duration::days(7)),
            Tier::Cold | Tier::Archived => None,
        }
    }
}

/// How a record's categories were determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    Direct,
    Keyword,
    Ai,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::Direct => "direct",
            ClassificationMethod::Keyword => "keyword",
            ClassificationMethod::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<ClassificationMethod> {
        match s {
            "direct" => Some(ClassificationMethod::Direct),
            "keyword" => Some(ClassificationMethod::Keyword),
            "ai" => Some(ClassificationMethod::Ai),
            _ => None,
        }
    }
}

/// Listing visibility of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Unlisted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
        }
    }

    pub fn parse(s: &str) -> Option<Visibility> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "unlisted" => Some(Visibility::Unlisted),
            _ => None,
        }
    }
}

/// One point of star history. The history list on a record is kept
/// time-ordered and capped at 20 points by snapshot compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarSnapshot {
    pub date: NaiveDate,
    pub stars: i64,
}

/// The catalog record: one indexed skill, identified by
/// (owner, repo, skill_path). `skill_path` is `""` for skills at the
/// repository root so the natural-key uniqueness constraint holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub skill_path: String,
    /// URL-safe identifier, unique and immutable once assigned.
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub stars: i64,
    pub forks: i64,
    pub star_history: Vec<StarSnapshot>,
    pub trending_score: f64,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub last_commit_sha: Option<String>,
    /// Full content fingerprint, denormalized from the fingerprints table.
    pub content_hash: Option<String>,
    pub tier: Tier,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub accesses_7d: i64,
    pub accesses_30d: i64,
    pub downloads_7d: i64,
    pub downloads_30d: i64,
    pub next_update_at: Option<DateTime<Utc>>,
    pub classification_method: Option<ClassificationMethod>,
    pub visibility: Visibility,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_indexed_at: DateTime<Utc>,
}

impl Skill {
    /// Human-oriented `owner/repo[/path]` reference.
    pub fn repo_ref(&self) -> String {
        if self.skill_path.is_empty() {
            format!("{}/{}", self.owner, self.repo)
        } else {
            format!("{}/{}/{}", self.owner, self.repo, self.skill_path)
        }
    }
}

/// Which of the two fingerprint variants a hash row holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Full,
    Normalized,
}

impl HashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashKind::Full => "full",
            HashKind::Normalized => "normalized",
        }
    }
}

/// A category in the controlled vocabulary. New categories can be
/// proposed by the AI classifier and become first-class entries once
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub usage_count: i64,
}

/// Ingestion queue payload, produced by the discovery feed or a user
/// submission and consumed by admission & ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub skill_path: String,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub force_reindex: bool,
}

/// Classification queue payload, produced by ingestion and by the tier
/// manager's reclassification detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyMessage {
    pub skill_id: String,
    pub owner: String,
    pub repo: String,
    /// Blob key of the cached marker file.
    pub skill_md_path: String,
    #[serde(default)]
    pub frontmatter_categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stars: i64,
    #[serde(default)]
    pub is_reclassification: bool,
}

/// Cold-storage snapshot of an archived record, stored at
/// `archive/{year}/{month}/{id}.json` and deleted on resurrection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveBlob {
    pub skill: Skill,
    /// Cached primary text content (the marker file), if it was cached.
    pub skill_md: Option<String>,
    pub categories: Vec<String>,
    pub archived_at: DateTime<Utc>,
}

/// One entry of a published listing snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingEntry {
    pub slug: String,
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub description: Option<String>,
    pub stars: i64,
    pub trending_score: f64,
    pub tier: Tier,
}

/// A published listing snapshot (`cache/{trending|top|recent}.json`),
/// the read path consumed by the out-of-scope web layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub data: Vec<ListingEntry>,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
}

/// Lowercase a display name into slug form: ascii alphanumerics with
/// single dashes between runs, capped at 60 chars.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(60);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_roundtrip() {
        for tier in [Tier::Hot, Tier::Warm, Tier::Cool, Tier::Cold, Tier::Archived] {
            assert_eq!(Tier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(Tier::parse("lukewarm"), None);
    }

    #[test]
    fn test_tier_intervals() {
        assert_eq!(Tier::Hot.refresh_interval(), Some(chrono::Duration::hours(6)));
        assert_eq!(Tier::Warm.refresh_interval(), Some(chrono::Duration::hours(24)));
        assert_eq!(Tier::Cool.refresh_interval(), Some(chrono::Duration::days(7)));
        assert_eq!(Tier::Cold.refresh_interval(), None);
        assert_eq!(Tier::Archived.refresh_interval(), None);
    }

    #[test]
    fn test_method_roundtrip() {
        for m in [
            ClassificationMethod::Direct,
            ClassificationMethod::Keyword,
            ClassificationMethod::Ai,
        ] {
            assert_eq!(ClassificationMethod::parse(m.as_str()), Some(m));
        }
    }

    #[test]
    fn test_repo_ref_with_and_without_path() {
        let mut skill = sample_skill();
        assert_eq!(skill.repo_ref(), "octo/tools");
        skill.skill_path = "skills/notes".to_string();
        assert_eq!(skill.repo_ref(), "octo/tools/skills/notes");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("PDF Toolkit"), "pdf-toolkit");
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
        assert_eq!(slugify("C++ Helper!"), "c-helper");
        assert_eq!(slugify("émoji ☃ name"), "moji-name");
        assert_eq!(slugify("---"), "");
        let long = "x".repeat(100);
        assert_eq!(slugify(&long).len(), 60);
    }

    fn sample_skill() -> Skill {
        let now = Utc::now();
        Skill {
            id: "s-1".to_string(),
            owner: "octo".to_string(),
            repo: "tools".to_string(),
            skill_path: String::new(),
            slug: "octo-tools".to_string(),
            name: "Tools".to_string(),
            description: None,
            stars: 0,
            forks: 0,
            star_history: Vec::new(),
            trending_score: 0.0,
            last_commit_at: None,
            last_commit_sha: None,
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
            created_at: now,
            updated_at: now,
            last_indexed_at: now,
        }
    }
}
