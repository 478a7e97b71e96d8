//! Lock-step multi-worker collection.
//!
//! Each round, every worker is told to produce exactly one block; the
//! coordinator waits for all of them, renumbers trajectory ids into one
//! global space, concatenates along the lane axis in ascending worker
//! order, and yields one merged batch. No environment steps happen between
//! the reception of a batch and the start of the next round, so this
//! discipline is safe for on-policy consumers.

use std::collections::HashMap;

use crate::collectors::pool::{BlockDirectory, WorkerPool};
use crate::config::{CollectorConfig, Device};
use crate::core::block::Block;
use crate::core::state_dict::CollectorStateDict;
use crate::environment::VectorizedEnv;
use crate::error::CollectorError;
use crate::messages::ControlMsg;
use crate::policy::{Policy, WeightSource};
use crate::split::split_trajectories;

/// Multi-worker collector with lock-step rounds.
pub struct MultiSyncCollector {
    pool: WorkerPool,
    config: CollectorConfig,
    directory: BlockDirectory,
    frames: u64,
    workers_frames: Vec<u64>,
    dones: Vec<bool>,
    finished: bool,
}

impl MultiSyncCollector {
    /// Spawn one worker per environment factory. The per-batch frame count
    /// is divided across workers, rounding up; the shared queue holds one
    /// entry per worker.
    pub fn new<E, P, F, G>(
        env_factories: Vec<F>,
        policy_factory: G,
        config: CollectorConfig,
    ) -> Result<Self, CollectorError>
    where
        E: VectorizedEnv + 'static,
        P: Policy + 'static,
        F: FnOnce() -> E + Send + 'static,
        G: Fn(Device) -> P,
    {
        let n_workers = env_factories.len();
        config.validate(n_workers)?;
        let frames_per_block = config.frames_per_batch_worker(n_workers);
        let pool = WorkerPool::spawn(
            env_factories,
            policy_factory,
            &config,
            frames_per_block,
            n_workers,
        )?;
        Ok(Self {
            pool,
            config,
            directory: BlockDirectory::new(),
            frames: 0,
            workers_frames: vec![0; n_workers],
            dones: vec![false; n_workers],
            finished: false,
        })
    }

    /// Install the accessor behind [`update_policy_weights`].
    ///
    /// [`update_policy_weights`]: Self::update_policy_weights
    pub fn with_weight_source(mut self, source: WeightSource) -> Self {
        self.pool.set_weight_source(source);
        self
    }

    /// Total frames credited so far.
    pub fn frames_collected(&self) -> u64 {
        self.frames
    }

    /// Frames delivered per worker so far.
    pub fn worker_frames(&self) -> &[u64] {
        &self.workers_frames
    }

    /// Run one round and return the merged batch, or `None` once the total
    /// frame target has been reached (workers are shut down at that point).
    pub fn next_batch(&mut self) -> Result<Option<Block>, CollectorError> {
        if self.finished {
            return Ok(None);
        }
        if self.dones.iter().all(|&d| d) || self.frames >= self.config.total_frames {
            self.finished = true;
            self.pool.shutdown();
            return Ok(None);
        }

        if self.config.update_at_each_batch {
            self.pool.update_policy_weights()?;
        }

        let n_workers = self.pool.num_workers();
        let msg = if self.frames < self.config.init_random_frames {
            ControlMsg::ContinueRandom
        } else {
            ControlMsg::Continue
        };
        for index in 0..n_workers {
            // A worker flagged done is still dispatched until the aggregate
            // target is reached, so finished workers keep producing blocks
            // that get merged like any other.
            // TODO: decide whether done workers should be excluded from
            // dispatch instead of producing surplus frames.
            self.pool.send(index, msg.clone())?;
        }

        let mut round_blocks: HashMap<usize, Block> = HashMap::with_capacity(n_workers);
        for _ in 0..n_workers {
            let entry = self.pool.queue().recv().map_err(|_| {
                CollectorError::protocol("block queue closed while collecting a round")
            })?;
            let (worker, block) = self.directory.resolve(entry)?;
            self.workers_frames[worker] += block.frame_count() as u64;
            if self.workers_frames[worker] >= self.config.total_frames && !self.dones[worker] {
                log::info!("worker {} reached the total frame target", worker);
                self.dones[worker] = true;
            }
            round_blocks.insert(worker, block);
        }

        let mut parts = Vec::with_capacity(n_workers);
        let mut offset: u64 = 0;
        for index in 0..n_workers {
            let mut block = round_blocks.remove(&index).ok_or_else(|| {
                CollectorError::protocol(format!("round finished without a block from worker {}", index))
            })?;
            block.shift_traj_ids(offset);
            offset = block.max_traj_id() + 1;
            parts.push(block);
        }
        let merged = Block::concat(parts)?;

        let out = if self.config.split_trajs {
            let split = split_trajectories(&merged);
            self.frames += split.frame_count() as u64;
            split
        } else {
            self.frames += merged.frame_count() as u64;
            merged
        };
        Ok(Some(out))
    }

    /// Iterator adapter over [`next_batch`](Self::next_batch).
    pub fn iter(&mut self) -> SyncBatches<'_> {
        SyncBatches { collector: self }
    }

    /// Seed workers sequentially; returns the last effective seed.
    pub fn set_seed(&mut self, seed: u64) -> Result<u64, CollectorError> {
        self.pool.set_seed(seed)
    }

    /// Reset selected workers (all when `mask` is `None`).
    pub fn reset(&mut self, mask: Option<&[bool]>) -> Result<(), CollectorError> {
        self.pool.reset(mask)
    }

    /// Snapshot all workers' state, keyed by worker index.
    pub fn state_dict(&self) -> Result<CollectorStateDict, CollectorError> {
        self.pool.state_dict()
    }

    /// Restore all workers' state.
    pub fn load_state_dict(&self, state_dict: &CollectorStateDict) -> Result<(), CollectorError> {
        self.pool.load_state_dict(state_dict)
    }

    /// Push fresh policy weights to every worker.
    pub fn update_policy_weights(&self) -> Result<(), CollectorError> {
        self.pool.update_policy_weights()
    }

    /// Close all workers. Idempotent and safe after failures.
    pub fn shutdown(&mut self) {
        self.finished = true;
        self.pool.shutdown();
    }
}

/// Iterator over merged batches from a [`MultiSyncCollector`].
pub struct SyncBatches<'a> {
    collector: &'a mut MultiSyncCollector,
}

impl Iterator for SyncBatches<'_> {
    type Item = Result<Block, CollectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.collector.next_batch().transpose()
    }
}
