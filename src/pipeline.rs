//! Shared pipeline context.
//!
//! Every stage takes a [`Pipeline`] carrying its collaborators: the
//! relational store, the work queue, and the three external contracts
//! (blobs, flags, repository metadata) behind trait objects so tests can
//! substitute fakes.

use std::sync::Arc;

use anyhow::Result;

use crate::blob::{BlobStore, FsBlobStore};
use crate::config::Config;
use crate::db;
use crate::flags::{FlagStore, SqliteFlagStore};
use crate::github::{GithubClient, MetadataProvider};
use crate::migrate;
use crate::queue::Queue;
use crate::store::Store;

pub struct Pipeline {
    pub config: Config,
    pub store: Store,
    pub queue: Queue,
    pub blobs: Arc<dyn BlobStore>,
    pub flags: Arc<dyn FlagStore>,
    pub metadata: Arc<dyn MetadataProvider>,
}

impl Pipeline {
    /// Wire up the production backends: SQLite (migrated on connect),
    /// filesystem blobs, and the GitHub client.
    pub async fn connect(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::run_migrations(&pool).await?;

        let store = Store::new(pool.clone());
        let queue = Queue::new(pool.clone(), config.queue.max_attempts);
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.blobs.root.clone()));
        let flags: Arc<dyn FlagStore> = Arc::new(SqliteFlagStore::new(pool));
        let metadata: Arc<dyn MetadataProvider> = Arc::new(GithubClient::new(&config.github)?);

        Ok(Self {
            config,
            store,
            queue,
            blobs,
            flags,
            metadata,
        })
    }
}
