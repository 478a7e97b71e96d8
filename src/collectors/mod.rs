//! Multi-worker collection disciplines.
//!
//! Two coordinator disciplines over the same worker pool: lock-step rounds
//! ([`MultiSyncCollector`]) and continuous streaming
//! ([`MultiAsyncCollector`], with [`AsyncCollector`] as the single-worker
//! convenience).

pub mod async_collector;
pub mod pool;
pub mod sync_collector;


pub use async_collector::{AsyncBatches, AsyncCollector, MultiAsyncCollector};
pub use pool::WorkerPool;
pub use sync_collector::{MultiSyncCollector, SyncBatches};
