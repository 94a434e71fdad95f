use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub blobs: BlobConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub resurrect: ResurrectConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            graphql_url: default_graphql_url(),
            token_env: default_token_env(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_graphql_url() -> String {
    "https://api.github.com/graphql".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_user_agent() -> String {
    "skilldex".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
    /// Skills under dot-prefixed directories are skipped unless the
    /// repository has more stars than this.
    #[serde(default = "default_dot_dir_star_allowance")]
    pub dot_dir_star_allowance: i64,
    /// Submissions at or above this star count bypass the duplicate guard.
    #[serde(default = "default_trusted_stars")]
    pub trusted_stars: i64,
    /// Normalized-hash collisions against public records at or above this
    /// star count reject the submission.
    #[serde(default = "default_duplicate_guard_stars")]
    pub duplicate_guard_stars: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            dot_dir_star_allowance: default_dot_dir_star_allowance(),
            trusted_stars: default_trusted_stars(),
            duplicate_guard_stars: default_duplicate_guard_stars(),
        }
    }
}

fn default_max_files() -> usize {
    50
}
fn default_max_file_bytes() -> u64 {
    512 * 1024
}
fn default_max_total_bytes() -> u64 {
    5 * 1024 * 1024
}
fn default_dot_dir_star_allowance() -> i64 {
    500
}
fn default_trusted_stars() -> i64 {
    100
}
fn default_duplicate_guard_stars() -> i64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyConfig {
    /// Records at or above this star count get AI classification.
    #[serde(default = "default_ai_star_threshold")]
    pub ai_star_threshold: i64,
    /// Owners whose records always get AI classification regardless of stars.
    #[serde(default)]
    pub trusted_owners: Vec<String>,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
    #[serde(default = "default_tag_match_bonus")]
    pub tag_match_bonus: i64,
    /// Marker content sent to the AI provider is truncated to this many chars.
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,
    #[serde(default)]
    pub primary: Option<AiProviderConfig>,
    #[serde(default)]
    pub secondary: Option<AiProviderConfig>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            ai_star_threshold: default_ai_star_threshold(),
            trusted_owners: Vec::new(),
            fallback_category: default_fallback_category(),
            tag_match_bonus: default_tag_match_bonus(),
            prompt_char_budget: default_prompt_char_budget(),
            ai_timeout_secs: default_ai_timeout_secs(),
            primary: None,
            secondary: None,
        }
    }
}

fn default_ai_star_threshold() -> i64 {
    100
}
fn default_fallback_category() -> String {
    "other".to_string()
}
fn default_tag_match_bonus() -> i64 {
    10
}
fn default_prompt_char_budget() -> usize {
    8000
}
fn default_ai_timeout_secs() -> u64 {
    45
}

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct AiProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    /// Pool for the random-alternate attempt; empty skips that attempt.
    #[serde(default)]
    pub alternate_models: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_run_cap_flagged")]
    pub run_cap_flagged: i64,
    #[serde(default = "default_run_cap_hot")]
    pub run_cap_hot: i64,
    #[serde(default = "default_run_cap_warm")]
    pub run_cap_warm: i64,
    #[serde(default = "default_run_cap_cool")]
    pub run_cap_cool: i64,
    /// Records per GraphQL batch request; the API allows at most 50.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_listing_size")]
    pub listing_size: i64,
    #[serde(default = "default_flag_ttl_secs")]
    pub flag_ttl_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_cap_flagged: default_run_cap_flagged(),
            run_cap_hot: default_run_cap_hot(),
            run_cap_warm: default_run_cap_warm(),
            run_cap_cool: default_run_cap_cool(),
            chunk_size: default_chunk_size(),
            listing_size: default_listing_size(),
            flag_ttl_secs: default_flag_ttl_secs(),
        }
    }
}

fn default_run_cap_flagged() -> i64 {
    100
}
fn default_run_cap_hot() -> i64 {
    500
}
fn default_run_cap_warm() -> i64 {
    500
}
fn default_run_cap_cool() -> i64 {
    125
}
fn default_chunk_size() -> usize {
    50
}
fn default_listing_size() -> i64 {
    100
}
fn default_flag_ttl_secs() -> i64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_idle_days")]
    pub idle_days: i64,
    /// Records at or above this star count are never archived.
    #[serde(default = "default_archive_max_stars")]
    pub max_stars: i64,
    #[serde(default = "default_push_stale_days")]
    pub push_stale_days: i64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            idle_days: default_idle_days(),
            max_stars: default_archive_max_stars(),
            push_stale_days: default_push_stale_days(),
        }
    }
}

fn default_idle_days() -> i64 {
    365
}
fn default_archive_max_stars() -> i64 {
    5
}
fn default_push_stale_days() -> i64 {
    730
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResurrectConfig {
    #[serde(default = "default_sweep_star_threshold")]
    pub sweep_star_threshold: i64,
    #[serde(default = "default_on_demand_star_threshold")]
    pub on_demand_star_threshold: i64,
    #[serde(default = "default_push_window_days")]
    pub push_window_days: i64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for ResurrectConfig {
    fn default() -> Self {
        Self {
            sweep_star_threshold: default_sweep_star_threshold(),
            on_demand_star_threshold: default_on_demand_star_threshold(),
            push_window_days: default_push_window_days(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

fn default_sweep_star_threshold() -> i64 {
    50
}
fn default_on_demand_star_threshold() -> i64 {
    20
}
fn default_push_window_days() -> i64 {
    90
}
fn default_batch_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> i64 {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate ingest bounds
    if config.ingest.max_files == 0 {
        anyhow::bail!("ingest.max_files must be > 0");
    }
    if config.ingest.max_file_bytes == 0 || config.ingest.max_total_bytes == 0 {
        anyhow::bail!("ingest.max_file_bytes and ingest.max_total_bytes must be > 0");
    }
    if config.ingest.max_total_bytes < config.ingest.max_file_bytes {
        anyhow::bail!("ingest.max_total_bytes must be >= ingest.max_file_bytes");
    }

    // Validate classification
    if config.classify.fallback_category.is_empty() {
        anyhow::bail!("classify.fallback_category must not be empty");
    }
    for provider in [&config.classify.primary, &config.classify.secondary]
        .into_iter()
        .flatten()
    {
        if provider.base_url.is_empty() || provider.model.is_empty() {
            anyhow::bail!("AI provider entries require base_url and model");
        }
        if provider.api_key_env.is_empty() {
            anyhow::bail!("AI provider entries require api_key_env");
        }
    }

    // Validate scheduler
    if config.scheduler.chunk_size == 0 || config.scheduler.chunk_size > 50 {
        anyhow::bail!("scheduler.chunk_size must be in [1, 50]");
    }
    if config.scheduler.listing_size < 1 {
        anyhow::bail!("scheduler.listing_size must be >= 1");
    }

    // Validate queue
    if config.queue.max_attempts < 1 {
        anyhow::bail!("queue.max_attempts must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[db]
path = "catalog.db"

[blobs]
root = "blobs"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ingest.max_files, 50);
        assert_eq!(config.ingest.duplicate_guard_stars, 1000);
        assert_eq!(config.classify.ai_star_threshold, 100);
        assert_eq!(config.classify.fallback_category, "other");
        assert_eq!(config.scheduler.run_cap_cool, 125);
        assert_eq!(config.scheduler.chunk_size, 50);
        assert_eq!(config.archive.idle_days, 365);
        assert_eq!(config.resurrect.on_demand_star_threshold, 20);
        assert!(config.classify.primary.is_none());
    }

    #[test]
    fn test_chunk_size_over_graphql_limit_rejected() {
        let file = write_config(
            r#"
[db]
path = "catalog.db"

[blobs]
root = "blobs"

[scheduler]
chunk_size = 80
"#,
        );
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_provider_without_model_rejected() {
        let file = write_config(
            r#"
[db]
path = "catalog.db"

[blobs]
root = "blobs"

[classify.primary]
base_url = "https://api.example.com/v1"
api_key_env = "EXAMPLE_KEY"
model = ""
"#,
        );
        assert!(load_config(file.path()).is_err());
    }
}
