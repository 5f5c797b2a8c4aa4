//! # Herald Queue
//!
//! Durable job queue, producer and worker runtime for the Herald
//! notification fan-out engine.
//!
//! Producers and workers are independent processes that meet only in the
//! shared store: [`dispatch`] pages recipients out of a caller-supplied
//! source and enqueues fan-out jobs; [`WorkerManager`] claims them, checks
//! campaign cancellation, hands the batch to a channel adapter, and
//! accumulates per-recipient outcome counters.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use herald_channels::{ChannelRegistry, TelegramChannel, TelegramConfig};
//! use herald_queue::{NoopEvents, StoreConnection, WorkerConfig, WorkerManager};
//! use herald_redis::RedisConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ChannelRegistry::new());
//!     registry.register(Arc::new(TelegramChannel::new(
//!         TelegramConfig::new(std::env::var("BOT_TOKEN")?),
//!     )?));
//!
//!     let handle = WorkerManager::start(
//!         StoreConnection::Params(RedisConfig::from_env().build()),
//!         WorkerConfig::new("notifications"),
//!         registry,
//!         Arc::new(NoopEvents),
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     handle.close().await;
//!     Ok(())
//! }
//! ```

pub mod cancel;
mod codec;
mod error;
mod job;
mod producer;
mod queue;
pub mod stats;
mod worker;

pub use codec::JobCodec;
pub use error::{QueueError, Result};
pub use job::{BackoffKind, BackoffPolicy, JobId, JobOptions, JobState, QueuedJob};
pub use producer::{
    dispatch, DispatchConfig, DispatchSummary, MetaBuilder, PageFetcher, RecipientMapper,
    RecipientSource, StoreConnection,
};
pub use queue::{JobCounts, JobQueue, QueueConfig};
pub use worker::{NoopEvents, WorkerConfig, WorkerEvents, WorkerHandle, WorkerManager};

/// Prelude for common imports.
///
/// ```
/// use herald_queue::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{QueueError, Result};
    pub use crate::job::{BackoffPolicy, JobOptions, JobState, QueuedJob};
    pub use crate::producer::{dispatch, DispatchConfig, RecipientSource, StoreConnection};
    pub use crate::queue::{JobCounts, JobQueue, QueueConfig};
    pub use crate::worker::{NoopEvents, WorkerConfig, WorkerEvents, WorkerManager};
}
