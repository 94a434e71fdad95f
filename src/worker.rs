//! Long-running worker loop.
//!
//! The worker drains the ingest and classify queues and fires the
//! time-based passes (tier refresh, archival, resurrection sweep) on a
//! fixed cycle. The passes carry their own checkpoint guards, so firing
//! them more often than their natural period is harmless.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};

use crate::archive;
use crate::classify;
use crate::ingest;
use crate::models::{ClassifyMessage, IngestMessage};
use crate::pipeline::Pipeline;
use crate::queue::{Job, TOPIC_CLASSIFY, TOPIC_INGEST};
use crate::resurrect;
use crate::tiers;

const LOG_TARGET: &str = "worker";

/// Jobs claimed per topic per drain.
const CLAIM_BATCH: i64 = 10;

/// How often the scheduled passes fire while the worker runs.
const CYCLE_SECS: u64 = 3600;

/// A time-triggered unit of work. Stage logic stays trigger-agnostic;
/// the worker only decides when to invoke it.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, pipeline: &Pipeline) -> Result<()>;
}

struct RefreshPass;

#[async_trait]
impl Task for RefreshPass {
    fn name(&self) -> &'static str {
        "refresh"
    }

    async fn run(&self, pipeline: &Pipeline) -> Result<()> {
        tiers::run_scheduled_pass(pipeline).await.map(|_| ())
    }
}

struct ArchivePass;

#[async_trait]
impl Task for ArchivePass {
    fn name(&self) -> &'static str {
        "archive"
    }

    async fn run(&self, pipeline: &Pipeline) -> Result<()> {
        archive::run_archive_pass(pipeline, false).await.map(|_| ())
    }
}

struct ResurrectionSweep;

#[async_trait]
impl Task for ResurrectionSweep {
    fn name(&self) -> &'static str {
        "resurrection-sweep"
    }

    async fn run(&self, pipeline: &Pipeline) -> Result<()> {
        resurrect::run_resurrection_sweep(pipeline, false)
            .await
            .map(|_| ())
    }
}

fn scheduled_tasks() -> Vec<Box<dyn Task>> {
    vec![
        Box::new(RefreshPass),
        Box::new(ArchivePass),
        Box::new(ResurrectionSweep),
    ]
}

/// Claims and handles one batch of due jobs per topic. Returns how many
/// jobs were handled, successfully or not.
pub async fn drain_once(pipeline: &Pipeline) -> Result<usize> {
    let mut handled = 0usize;
    for topic in [TOPIC_INGEST, TOPIC_CLASSIFY] {
        let jobs = pipeline
            .queue
            .claim_due(topic, CLAIM_BATCH, Utc::now())
            .await?;
        for job in jobs {
            handled += 1;
            match dispatch(pipeline, &job).await {
                Ok(()) => pipeline.queue.ack(job.id).await?,
                Err(e) => {
                    warn!(
                        target: LOG_TARGET,
                        "{} job {} failed on attempt {}: {:#}",
                        job.topic,
                        job.id,
                        job.attempts + 1,
                        e
                    );
                    pipeline.queue.nack(&job, Utc::now()).await?;
                }
            }
        }
    }
    Ok(handled)
}

async fn dispatch(pipeline: &Pipeline, job: &Job) -> Result<()> {
    match job.topic.as_str() {
        TOPIC_INGEST => {
            let message: IngestMessage =
                serde_json::from_str(&job.payload).context("Malformed ingest payload")?;
            ingest::run_ingest(pipeline, &message).await.map(|_| ())
        }
        TOPIC_CLASSIFY => {
            let message: ClassifyMessage =
                serde_json::from_str(&job.payload).context("Malformed classify payload")?;
            classify::run_classify(pipeline, &message).await.map(|_| ())
        }
        other => bail!("Unknown queue topic: {}", other),
    }
}

/// Runs forever, draining queues and firing the scheduled passes once
/// per cycle. Job failures are retried through the queue; pass failures
/// are logged and retried next cycle.
pub async fn run_worker(pipeline: &Pipeline, poll_secs: u64) -> Result<()> {
    info!(
        target: LOG_TARGET,
        "Worker started (poll every {}s, passes every {}s)", poll_secs, CYCLE_SECS
    );
    let tasks = scheduled_tasks();
    let mut last_cycle: Option<Instant> = None;
    loop {
        let handled = match drain_once(pipeline).await {
            Ok(n) => n,
            Err(e) => {
                error!(target: LOG_TARGET, "Queue drain failed: {:#}", e);
                0
            }
        };

        let cycle_due = last_cycle
            .map(|at| at.elapsed() >= Duration::from_secs(CYCLE_SECS))
            .unwrap_or(true);
        if cycle_due {
            for task in &tasks {
                if let Err(e) = task.run(pipeline).await {
                    error!(target: LOG_TARGET, "{} pass failed: {:#}", task.name(), e);
                }
            }
            last_cycle = Some(Instant::now());
        }

        if handled == 0 {
            tokio::time::sleep(Duration::from_secs(poll_secs)).await;
        }
    }
}
