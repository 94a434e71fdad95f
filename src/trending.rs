//! Trending score computation and star-history compression.
//!
//! Everything here is a pure function of its inputs, so the same history
//! and clock always produce the same score. The score is a product of
//! five signals:
//!
//! ```text
//! score = base × velocity × recency × activity × download_boost
//! ```
//!
//! - base: `log10(stars + 1) × 10`, damping very large repositories
//! - velocity: 7-day growth rate scaled by acceleration against the
//!   30-day rate, clamped to [1, 5]
//! - recency: up to 1.5× for the first two weeks after first indexing
//! - activity: staleness penalty from the last push date
//! - download_boost: up to 2× from 7-day install volume
//!
//! rounded to two decimals.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::models::StarSnapshot;

/// History is compressed down to this many points.
pub const MAX_SNAPSHOTS: usize = 20;

#[derive(Debug, Clone)]
pub struct ScoreInputs<'a> {
    pub stars: i64,
    pub history: &'a [StarSnapshot],
    pub created_at: DateTime<Utc>,
    pub last_commit_at: Option<DateTime<Utc>>,
    pub downloads_7d: i64,
    pub now: DateTime<Utc>,
}

pub fn calculate_trending_score(inputs: &ScoreInputs) -> f64 {
    let today = inputs.now.date_naive();
    let g7 = daily_growth(inputs.history, today, inputs.stars, 7);
    let g30 = daily_growth(inputs.history, today, inputs.stars, 30);

    let score = base_score(inputs.stars)
        * velocity_multiplier(g7, acceleration(g7, g30))
        * recency_boost(inputs.created_at, inputs.now)
        * activity_penalty(inputs.last_commit_at, inputs.now)
        * download_boost(inputs.downloads_7d);

    (score * 100.0).round() / 100.0
}

fn base_score(stars: i64) -> f64 {
    ((stars as f64) + 1.0).log10() * 10.0
}

/// Star count `n` days before `today`: the most recent snapshot at or
/// before the target date, else the earliest snapshot, else the current
/// count when there is no history at all.
fn stars_n_days_ago(history: &[StarSnapshot], today: NaiveDate, current: i64, n: i64) -> i64 {
    let target = today - chrono::Duration::days(n);
    let mut sorted: Vec<&StarSnapshot> = history.iter().collect();
    sorted.sort_by_key(|s| s.date);

    sorted
        .iter()
        .rev()
        .find(|s| s.date <= target)
        .or_else(|| sorted.first())
        .map(|s| s.stars)
        .unwrap_or(current)
}

fn daily_growth(history: &[StarSnapshot], today: NaiveDate, current: i64, n: i64) -> f64 {
    let then = stars_n_days_ago(history, today, current, n);
    ((current - then) as f64 / n as f64).max(0.0)
}

/// Ratio of short-term to long-term growth. The `g30 > 0.1` guard keeps
/// near-zero denominators from exploding the ratio.
fn acceleration(g7: f64, g30: f64) -> f64 {
    if g30 > 0.1 {
        g7 / g30
    } else if g7 > 0.0 {
        2.0
    } else {
        1.0
    }
}

fn velocity_multiplier(g7: f64, accel: f64) -> f64 {
    (1.0 + (g7 + 1.0).log2() * accel.min(3.0) * 0.4).clamp(1.0, 5.0)
}

fn recency_boost(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - created_at).num_seconds() as f64 / 86400.0;
    (1.5 - days / 14.0).max(1.0)
}

fn activity_penalty(last_commit_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let pushed = match last_commit_at {
        Some(pushed) => pushed,
        // No known push date reads as neutral, not stale
        None => return 1.0,
    };
    match (now - pushed).num_days() {
        d if d <= 30 => 1.0,
        d if d <= 90 => 0.9,
        d if d <= 180 => 0.7,
        d if d <= 365 => 0.5,
        _ => 0.3,
    }
}

fn download_boost(downloads_7d: i64) -> f64 {
    (1.0 + ((downloads_7d as f64) + 1.0).log2() * 0.15).min(2.0)
}

/// Append (or overwrite) today's snapshot, then compress.
pub fn advance_history(
    history: &[StarSnapshot],
    today: NaiveDate,
    stars: i64,
) -> Vec<StarSnapshot> {
    let mut points = history.to_vec();
    points.sort_by_key(|s| s.date);
    match points.last_mut() {
        Some(last) if last.date == today => last.stars = stars,
        _ => points.push(StarSnapshot { date: today, stars }),
    }
    compress_history(&points)
}

/// Bound history at [`MAX_SNAPSHOTS`] points while preserving the shape
/// velocity computation needs.
///
/// Kept points: the first and last, everything within the last 7 days,
/// the first point of each week for the prior 8 weeks, the first point
/// of each month before that, and any point whose star delta from its
/// predecessor exceeds 10%. The kept set is then truncated to the most
/// recent [`MAX_SNAPSHOTS`], with the original first point forced back
/// into slot 0 if the truncation dropped it. Lists already at or under
/// the cap pass through unchanged.
pub fn compress_history(history: &[StarSnapshot]) -> Vec<StarSnapshot> {
    if history.len() <= MAX_SNAPSHOTS {
        return history.to_vec();
    }

    let mut sorted = history.to_vec();
    sorted.sort_by_key(|s| s.date);
    let first = sorted[0];
    let anchor = sorted[sorted.len() - 1].date;

    let mut keep = vec![false; sorted.len()];
    keep[0] = true;
    keep[sorted.len() - 1] = true;

    let mut seen_weeks = std::collections::HashSet::new();
    let mut seen_months = std::collections::HashSet::new();
    for (i, point) in sorted.iter().enumerate() {
        let days_old = anchor.signed_duration_since(point.date).num_days();
        if days_old <= 7 {
            keep[i] = true;
        } else if days_old <= 63 {
            // weekly region: first point wins its week bucket
            if seen_weeks.insert((days_old - 1) / 7) {
                keep[i] = true;
            }
        } else if seen_months.insert((point.date.year(), point.date.month())) {
            keep[i] = true;
        }
    }

    for i in 1..sorted.len() {
        let prev = sorted[i - 1].stars;
        let delta = (sorted[i].stars - prev).abs();
        let spiked = if prev == 0 {
            delta > 0
        } else {
            delta as f64 / prev as f64 > 0.1
        };
        if spiked {
            keep[i] = true;
        }
    }

    let mut kept: Vec<StarSnapshot> = sorted
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| *k)
        .map(|(p, _)| p)
        .collect();

    if kept.len() > MAX_SNAPSHOTS {
        kept = kept.split_off(kept.len() - MAX_SNAPSHOTS);
        if kept[0].date != first.date {
            kept[0] = first;
        }
    }
    kept
}
