//! Catalog overview for the `stats` command.

use anyhow::Result;

use crate::pipeline::Pipeline;
use crate::queue::{TOPIC_CLASSIFY, TOPIC_INGEST};

pub async fn print_stats(pipeline: &Pipeline) -> Result<()> {
    let total = pipeline.store.count_skills().await?;
    println!("Catalog");
    println!("  skills: {}", total);

    let tiers = pipeline.store.tier_counts().await?;
    if !tiers.is_empty() {
        println!();
        println!("Tiers");
        for (tier, count) in tiers {
            println!("  {:<10} {}", tier, count);
        }
    }

    let methods = pipeline.store.method_counts().await?;
    if !methods.is_empty() {
        println!();
        println!("Classification");
        for (method, count) in methods {
            println!("  {:<10} {}", method, count);
        }
    }

    println!();
    println!("Queues");
    for topic in [TOPIC_INGEST, TOPIC_CLASSIFY] {
        let pending = pipeline.queue.pending_count(topic).await?;
        let parked = pipeline.queue.parked_count(topic).await?;
        println!("  {:<10} {} pending, {} parked", topic, pending, parked);
    }

    Ok(())
}
