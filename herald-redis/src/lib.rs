//! # Herald Redis
//!
//! Shared-store client for the Herald notification fan-out engine.
//!
//! Producers and workers communicate only through the job queue and a few
//! well-known keys in this store: outcome counter hashes and campaign
//! cancellation flags. The client is a thin typed surface over one
//! multiplexed, auto-reconnecting connection that both sides can clone
//! freely.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald_redis::{RedisConfig, Store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::builder()
//!         .url("redis://localhost:6379")
//!         .build();
//!
//!     let store = Store::connect(config).await?;
//!
//!     store.hincr("notifications:stats", "success", 1).await?;
//!     let stats = store.hgetall_counts("notifications:stats").await?;
//!     println!("{:?}", stats);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod store;

pub use config::{RedisConfig, RedisConfigBuilder};
pub use error::{Result, StoreError};
pub use store::Store;

// Re-export the redis crate for callers that need raw commands.
pub use redis;

/// Prelude for common imports.
///
/// ```
/// use herald_redis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{RedisConfig, RedisConfigBuilder};
    pub use crate::error::{Result, StoreError};
    pub use crate::store::Store;
}
