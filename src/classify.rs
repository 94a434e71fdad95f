//! Classification: assigns 1-3 vocabulary categories to a record.
//!
//! Three methods, picked by an admission policy. Front-matter categories
//! that already match the vocabulary win outright (direct). Otherwise
//! records with enough stars or a trusted owner go through an AI
//! fallback chain; everything else is scored against category keywords.
//! The keyword path is also the terminal fallback when every AI attempt
//! fails, so classification never errors out of a malformed response.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::config::{AiProviderConfig, ClassifyConfig};
use crate::models::{slugify, Category, ClassificationMethod, ClassifyMessage};
use crate::pipeline::Pipeline;

const LOG_TARGET: &str = "classify";

const SYSTEM_PROMPT: &str = "You classify agent skills into a fixed category vocabulary. \
     Respond with a single JSON object and nothing else.";

/// What a classification run decided, for logging and tests.
#[derive(Debug)]
pub struct ClassifyOutcome {
    pub method: ClassificationMethod,
    pub categories: Vec<String>,
}

/// Admission policy. AI classification is reserved for records that are
/// popular enough to justify the spend, or whose owner is on the curated
/// allow-list. Never "skip" — the alternative is always keyword scoring.
pub fn determine_method(owner: &str, stars: i64, config: &ClassifyConfig) -> ClassificationMethod {
    let trusted = config
        .trusted_owners
        .iter()
        .any(|o| o.eq_ignore_ascii_case(owner));
    if stars >= config.ai_star_threshold || trusted {
        ClassificationMethod::Ai
    } else {
        ClassificationMethod::Keyword
    }
}

/// Cheap pre-check: author-declared categories that match the vocabulary
/// exactly are used as-is, skipping both AI and keyword paths.
pub fn try_direct_match(declared: &[String], vocab: &[Category]) -> Option<Vec<String>> {
    let mut matched: Vec<String> = Vec::new();
    for raw in declared {
        let slug = slugify(raw);
        if vocab.iter().any(|c| c.slug == slug) && !matched.contains(&slug) {
            matched.push(slug);
        }
    }
    if matched.is_empty() {
        return None;
    }
    matched.truncate(3);
    Some(matched)
}

/// Score every category by whole-word keyword occurrences in the marker
/// text, plus a fixed bonus when an author tag names the category
/// outright. Sorted best-first, slug-ordered on ties for determinism.
pub fn keyword_scores(
    text: &str,
    tags: &[String],
    vocab: &[Category],
    tag_bonus: i64,
) -> Vec<(String, i64)> {
    let mut scores: Vec<(String, i64)> = Vec::with_capacity(vocab.len());
    for category in vocab {
        let mut score = 0i64;
        for keyword in &category.keywords {
            if keyword.is_empty() {
                continue;
            }
            let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
            let Ok(re) = Regex::new(&pattern) else {
                continue;
            };
            score += re.find_iter(text).count() as i64;
        }
        let tag_hit = tags.iter().any(|tag| {
            tag.eq_ignore_ascii_case(&category.slug)
                || category.keywords.iter().any(|k| tag.eq_ignore_ascii_case(k))
        });
        if tag_hit {
            score += tag_bonus;
        }
        scores.push((category.slug.clone(), score));
    }
    scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scores
}

/// Top 1-3 positive scorers, or the catch-all category when nothing
/// scored at all.
pub fn keyword_assignments(scores: &[(String, i64)], fallback: &str) -> Vec<(String, f64)> {
    let picked: Vec<(String, f64)> = scores
        .iter()
        .filter(|(_, score)| *score > 0)
        .take(3)
        .map(|(slug, score)| (slug.clone(), keyword_confidence(*score)))
        .collect();
    if picked.is_empty() {
        vec![(fallback.to_string(), 0.2)]
    } else {
        picked
    }
}

fn keyword_confidence(score: i64) -> f64 {
    (0.3 + score as f64 * 0.05).min(0.9)
}

/// Suggested-category slugs must look like `^[a-z][a-z0-9-]{1,39}$`.
fn is_valid_slug(slug: &str) -> bool {
    let bytes = slug.as_bytes();
    if bytes.len() < 2 || bytes.len() > 40 {
        return false;
    }
    bytes[0].is_ascii_lowercase()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

#[derive(Debug, Deserialize)]
struct AiVerdict {
    #[serde(default)]
    categories: Vec<String>,
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    new_category: Option<SuggestedCategory>,
}

#[derive(Debug, Deserialize)]
struct SuggestedCategory {
    slug: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
}

struct AiAssignments {
    assignments: Vec<(String, f64)>,
    new_category: Option<Category>,
}

/// One call of the AI fallback chain. The chain itself is data built
/// from config, so reordering providers needs no control-flow change.
struct AiAttempt<'a> {
    provider: &'a AiProviderConfig,
    model: &'a str,
    label: &'static str,
}

fn build_attempts(config: &ClassifyConfig) -> Vec<AiAttempt<'_>> {
    let mut attempts = Vec::new();
    if let Some(primary) = &config.primary {
        attempts.push(AiAttempt {
            provider: primary,
            model: &primary.model,
            label: "primary",
        });
        attempts.push(AiAttempt {
            provider: primary,
            model: &primary.model,
            label: "primary retry",
        });
        if !primary.alternate_models.is_empty() {
            let pick = Utc::now().timestamp_subsec_nanos() as usize
                % primary.alternate_models.len();
            attempts.push(AiAttempt {
                provider: primary,
                model: &primary.alternate_models[pick],
                label: "alternate",
            });
        }
    }
    if let Some(secondary) = &config.secondary {
        attempts.push(AiAttempt {
            provider: secondary,
            model: &secondary.model,
            label: "secondary",
        });
    }
    attempts
}

fn build_prompt(marker: &str, vocab: &[Category], budget: usize) -> String {
    let mut vocab_lines = String::new();
    for category in vocab {
        vocab_lines.push_str("- ");
        vocab_lines.push_str(&category.slug);
        if let Some(description) = &category.description {
            vocab_lines.push_str(": ");
            vocab_lines.push_str(description);
        }
        vocab_lines.push('\n');
    }
    let content: String = marker.chars().take(budget).collect();
    format!(
        "Assign 1-3 categories to the skill below.\n\n\
         Vocabulary:\n{}\n\
         Skill definition:\n---\n{}\n---\n\n\
         Reply with JSON: {{\"categories\": [\"slug\"], \"confidence\": 0.0-1.0, \
         \"reasoning\": \"...\", \"new_category\": {{\"slug\", \"name\", \"description\"}}}}. \
         Use only vocabulary slugs in \"categories\". Include \"new_category\" only when \
         nothing in the vocabulary fits.",
        vocab_lines, content
    )
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let rest = match trimmed.strip_prefix("```") {
        Some(rest) => rest,
        None => return trimmed,
    };
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Filter a parsed verdict down to linkable assignments: unknown slugs
/// are dropped, a suggested category must be well-formed and new, and
/// zero survivors degrade to the catch-all (method stays `ai`).
fn validate_verdict(verdict: AiVerdict, vocab: &[Category], fallback: &str) -> AiAssignments {
    let confidence = verdict.confidence.unwrap_or(0.7).clamp(0.0, 1.0);
    let mut slugs: Vec<String> = Vec::new();
    for raw in &verdict.categories {
        let slug = slugify(raw);
        if vocab.iter().any(|c| c.slug == slug) && !slugs.contains(&slug) {
            slugs.push(slug);
        }
    }
    let mut new_category = None;
    if let Some(suggested) = verdict.new_category {
        let slug = suggested.slug.trim().to_string();
        if is_valid_slug(&slug) && !vocab.iter().any(|c| c.slug == slug) && !slugs.contains(&slug)
        {
            let name = if suggested.name.trim().is_empty() {
                slug.clone()
            } else {
                suggested.name.trim().to_string()
            };
            slugs.push(slug.clone());
            new_category = Some(Category {
                slug,
                name,
                description: suggested.description,
                keywords: Vec::new(),
                usage_count: 0,
            });
        }
    }
    slugs.truncate(3);
    if slugs.is_empty() {
        return AiAssignments {
            assignments: vec![(fallback.to_string(), 0.2)],
            new_category: None,
        };
    }
    if let Some(category) = &new_category {
        if !slugs.contains(&category.slug) {
            new_category = None;
        }
    }
    AiAssignments {
        assignments: slugs.into_iter().map(|slug| (slug, confidence)).collect(),
        new_category,
    }
}

async fn call_chat(
    client: &reqwest::Client,
    attempt: &AiAttempt<'_>,
    prompt: &str,
) -> Result<AiVerdict> {
    let api_key = std::env::var(&attempt.provider.api_key_env).with_context(|| {
        format!(
            "AI API key env var not set: {}",
            attempt.provider.api_key_env
        )
    })?;
    let url = format!(
        "{}/chat/completions",
        attempt.provider.base_url.trim_end_matches('/')
    );
    let body = json!({
        "model": attempt.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": prompt }
        ],
        "temperature": 0.2
    });
    let response = client
        .post(&url)
        .bearer_auth(&api_key)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("{} returned {}", url, status);
    }
    let value: serde_json::Value = response.json().await?;
    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Completion response missing message content"))?;
    let verdict: AiVerdict = serde_json::from_str(strip_code_fences(content))
        .context("Completion content was not the requested JSON shape")?;
    Ok(verdict)
}

/// Try `[primary, primary retry, random alternate, secondary]` in order.
/// Any attempt producing a parseable verdict wins; all failing returns
/// `None` and the caller falls back to keyword scoring.
async fn run_ai_chain(
    config: &ClassifyConfig,
    marker: &str,
    vocab: &[Category],
) -> Option<AiAssignments> {
    let attempts = build_attempts(config);
    if attempts.is_empty() {
        debug!(target: LOG_TARGET, "No AI providers configured");
        return None;
    }
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.ai_timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(target: LOG_TARGET, "Could not build AI client: {:#}", e);
            return None;
        }
    };
    let prompt = build_prompt(marker, vocab, config.prompt_char_budget);
    for attempt in &attempts {
        match call_chat(&client, attempt, &prompt).await {
            Ok(verdict) => {
                debug!(
                    target: LOG_TARGET,
                    "AI verdict via {} ({}): {}",
                    attempt.label,
                    attempt.model,
                    verdict.reasoning.as_deref().unwrap_or("-")
                );
                return Some(validate_verdict(verdict, vocab, &config.fallback_category));
            }
            Err(e) => {
                warn!(
                    target: LOG_TARGET,
                    "AI attempt {} ({}) failed: {:#}",
                    attempt.label,
                    attempt.model,
                    e
                );
            }
        }
    }
    None
}

async fn persist(
    pipeline: &Pipeline,
    msg: &ClassifyMessage,
    assignments: &[(String, f64)],
    new_category: Option<Category>,
    method: ClassificationMethod,
    vocab: &[Category],
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(category) = &new_category {
        pipeline.store.upsert_category(category).await?;
    }
    // The configured catch-all may sit outside the seeded vocabulary;
    // every linked slug needs a vocabulary row.
    for (slug, _) in assignments {
        let known = vocab.iter().any(|c| c.slug == *slug)
            || new_category.as_ref().map(|c| c.slug.as_str()) == Some(slug.as_str());
        if !known {
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
    pipeline
        .store
        .replace_skill_categories(&msg.skill_id, assignments, method, now)
        .await?;
    Ok(())
}

/// Classify one record. Reads the cached marker from blob storage,
/// runs the chosen method, and replaces the record's category links.
pub async fn run_classify(pipeline: &Pipeline, msg: &ClassifyMessage) -> Result<ClassifyOutcome> {
    let config = &pipeline.config.classify;
    let now = Utc::now();
    let vocab = pipeline.store.all_categories().await?;

    // Reclassification skips the shortcut: the declared categories were
    // already considered the first time around.
    if !msg.is_reclassification {
        if let Some(slugs) = try_direct_match(&msg.frontmatter_categories, &vocab) {
            let assignments: Vec<(String, f64)> =
                slugs.iter().map(|slug| (slug.clone(), 1.0)).collect();
            persist(
                pipeline,
                msg,
                &assignments,
                None,
                ClassificationMethod::Direct,
                &vocab,
                now,
            )
            .await?;
            info!(
                target: LOG_TARGET,
                "Classified {}/{} as [{}] (direct)",
                msg.owner,
                msg.repo,
                slugs.join(", ")
            );
            return Ok(ClassifyOutcome {
                method: ClassificationMethod::Direct,
                categories: slugs,
            });
        }
    }

    let marker = pipeline
        .blobs
        .get(&msg.skill_md_path)
        .await?
        .unwrap_or_default();
    if marker.is_empty() {
        warn!(
            target: LOG_TARGET,
            "No cached marker at {}; classifying {}/{} from tags alone",
            msg.skill_md_path,
            msg.owner,
            msg.repo
        );
    }

    if determine_method(&msg.owner, msg.stars, config) == ClassificationMethod::Ai {
        if let Some(ai) = run_ai_chain(config, &marker, &vocab).await {
            let slugs: Vec<String> = ai.assignments.iter().map(|(s, _)| s.clone()).collect();
            persist(
                pipeline,
                msg,
                &ai.assignments,
                ai.new_category,
                ClassificationMethod::Ai,
                &vocab,
                now,
            )
            .await?;
            info!(
                target: LOG_TARGET,
                "Classified {}/{} as [{}] (ai)",
                msg.owner,
                msg.repo,
                slugs.join(", ")
            );
            return Ok(ClassifyOutcome {
                method: ClassificationMethod::Ai,
                categories: slugs,
            });
        }
        warn!(
            target: LOG_TARGET,
            "All AI attempts failed for {}/{}; falling back to keywords",
            msg.owner,
            msg.repo
        );
    }

    let scores = keyword_scores(&marker, &msg.tags, &vocab, config.tag_match_bonus);
    let assignments = keyword_assignments(&scores, &config.fallback_category);
    let slugs: Vec<String> = assignments.iter().map(|(s, _)| s.clone()).collect();
    persist(
        pipeline,
        msg,
        &assignments,
        None,
        ClassificationMethod::Keyword,
        &vocab,
        now,
    )
    .await?;
    info!(
        target: LOG_TARGET,
        "Classified {}/{} as [{}] (keyword)",
        msg.owner,
        msg.repo,
        slugs.join(", ")
    );
    Ok(ClassifyOutcome {
        method: ClassificationMethod::Keyword,
        categories: slugs,
    })
}
