//! Published listing snapshots.
//!
//! The web layer never queries the relational store directly; it reads
//! three pre-computed JSON snapshots from blob storage, regenerated at
//! the end of every scheduled pass.

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::blob::BlobStore;
use crate::models::{Listing, ListingEntry, Skill};
use crate::store::Store;

const LOG_TARGET: &str = "listings";

fn entry(skill: &Skill) -> ListingEntry {
    ListingEntry {
        slug: skill.slug.clone(),
        name: skill.name.clone(),
        owner: skill.owner.clone(),
        repo: skill.repo.clone(),
        description: skill.description.clone(),
        stars: skill.stars,
        trending_score: skill.trending_score,
        tier: skill.tier,
    }
}

/// Write `cache/{trending,top,recent}.json`, each capped at `size`
/// public records.
pub async fn publish_listings(store: &Store, blobs: &dyn BlobStore, size: i64) -> Result<()> {
    let generated_at = Utc::now();
    let sets = [
        ("trending", store.top_by_trending(size).await?),
        ("top", store.top_by_stars(size).await?),
        ("recent", store.recently_indexed(size).await?),
    ];
    for (name, skills) in sets {
        let listing = Listing {
            data: skills.iter().map(entry).collect(),
            generated_at,
        };
        let body = serde_json::to_string_pretty(&listing)?;
        blobs.put(&format!("cache/{}.json", name), &body).await?;
    }
    info!(target: LOG_TARGET, "Published trending/top/recent listings");
    Ok(())
}
