//! # Multi-worker experience collection for reinforcement learning
//!
//! Collects experience trajectories from simulated environments by driving
//! worker threads that each run a (policy, environment) interaction loop,
//! and multiplexes their output into batches for a training consumer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Multi-worker collector                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Thread 1          Thread 2          Thread N                    │
//! │  ┌──────────┐      ┌──────────┐      ┌──────────┐               │
//! │  │ Worker 0 │      │ Worker 1 │      │ Worker N │               │
//! │  │ engine   │      │ engine   │      │ engine   │               │
//! │  │ env+pol  │      │ env+pol  │      │ env+pol  │               │
//! │  └──┬───▲───┘      └──┬───▲───┘      └──┬───▲───┘               │
//! │     │   │ control     │   │             │   │                    │
//! │     └───┼─────────────┼───┼─────────────┼───┘                    │
//! │         │        ┌────▼───┴────┐        │                        │
//! │         │        │ block queue │  ┌─────┴──────┐                 │
//! │         │        │ (bounded)   │  │ WeightsSlot│                 │
//! │         │        └──────┬──────┘  │ per device │                 │
//! │         │               ▼         └─────▲──────┘                 │
//! │         │        ┌─────────────┐        │                        │
//! │         └────────│ Coordinator │────────┘                        │
//! │                  │ sync/async  │──→ training consumer            │
//! │                  └─────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each worker thread exclusively owns its environment, policy and
//! [`RolloutEngine`]; control flows over per-worker channels and blocks
//! flow through one bounded shared queue. Two disciplines consume the
//! queue: [`MultiSyncCollector`] runs lock-step rounds and yields merged
//! batches with globally renumbered trajectory ids, while
//! [`MultiAsyncCollector`] streams per-worker blocks in arrival order.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rl_collectors::{CollectorConfig, MultiSyncCollector};
//!
//! let config = CollectorConfig::new()
//!     .with_total_frames(1_000_000)
//!     .with_frames_per_batch(256)
//!     .with_max_frames_per_traj(1000);
//!
//! let factories = (0..4).map(|_| || MyEnv::new(64)).collect();
//! let mut collector = MultiSyncCollector::new(factories, |device| MyPolicy::on(device), config)?;
//! collector.set_seed(42)?;
//! while let Some(batch) = collector.next_batch()? {
//!     train(&batch);
//!     collector.update_policy_weights()?;
//! }
//! ```

pub mod collectors;
pub mod config;
pub mod core;
pub mod engine;
pub mod environment;
pub mod error;
pub mod messages;
pub mod policy;
pub mod split;
pub mod workers;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use crate::collectors::{AsyncCollector, MultiAsyncCollector, MultiSyncCollector, WorkerPool};
pub use crate::config::{CollectorConfig, Device, DeviceSpec, ExplorationMode};
pub use crate::core::{Block, CollectorStateDict, Frame, RolloutState, WorkerStateDict};
pub use crate::engine::{RolloutEngine, TrajectoryTracker};
pub use crate::environment::{ResetMask, VectorizedEnv};
pub use crate::error::CollectorError;
pub use crate::messages::{ControlMsg, QueueEntry, ReplyMsg};
pub use crate::policy::{Policy, RandomPolicy, WeightSource};
pub use crate::split::split_trajectories;
