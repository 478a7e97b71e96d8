//! Continuous streaming multi-worker collection.
//!
//! Workers keep producing between yields: the coordinator drains the shared
//! single-slot queue as blocks arrive, in whatever order workers deliver,
//! and re-arms the delivering worker before handing its block to the
//! consumer, so no worker sits idle while control is with the training
//! loop. Collection runs ahead of consumption, which makes this discipline
//! suited to off-policy consumers.

use crate::collectors::pool::{BlockDirectory, WorkerPool};
use crate::config::{CollectorConfig, Device};
use crate::core::block::Block;
use crate::core::state_dict::CollectorStateDict;
use crate::environment::VectorizedEnv;
use crate::error::CollectorError;
use crate::messages::ControlMsg;
use crate::policy::{Policy, WeightSource};
use crate::split::split_trajectories;
use crate::workers::worker::POLL_TIMEOUT;

/// Multi-worker collector streaming blocks in arrival order.
///
/// Output order is arrival order at the shared queue, not worker order;
/// consumers must not assume determinism across runs under scheduling
/// variance.
pub struct MultiAsyncCollector {
    pool: WorkerPool,
    config: CollectorConfig,
    directory: BlockDirectory,
    frames: u64,
    workers_frames: Vec<u64>,
    dones: Vec<bool>,
    frames_per_worker: u64,
    started: bool,
    running: bool,
    finished: bool,
}

impl MultiAsyncCollector {
    /// Spawn one worker per environment factory. Every worker produces
    /// full-size blocks; the shared queue is a single-slot handoff, so a
    /// worker must finish delivering before it is re-armed and fast
    /// producers cannot grow memory without bound.
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
        let frames_per_worker = config.frames_per_worker(n_workers);
        let pool = WorkerPool::spawn(
            env_factories,
            policy_factory,
            &config,
            config.frames_per_batch,
            1,
        )?;
        Ok(Self {
            pool,
            config,
            directory: BlockDirectory::new(),
            frames: 0,
            workers_frames: vec![0; n_workers],
            dones: vec![false; n_workers],
            frames_per_worker,
            started: false,
            running: false,
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

    /// Total frames accumulated so far.
    pub fn frames_collected(&self) -> u64 {
        self.frames
    }

    /// Frames delivered per worker so far.
    pub fn worker_frames(&self) -> &[u64] {
        &self.workers_frames
    }

    fn production_msg(&self) -> ControlMsg {
        if self.frames < self.config.init_random_frames {
            ControlMsg::ContinueRandom
        } else {
            ControlMsg::Continue
        }
    }

    /// Pop the next delivered block, or `None` once the total frame target
    /// has been reached (workers are shut down at that point).
    ///
    /// The delivering worker is re-armed before this method returns, unless
    /// its own cumulative frames have reached its share of the target, in
    /// which case it is stopped for good.
    pub fn next_batch(&mut self) -> Result<Option<Block>, CollectorError> {
        if self.finished {
            return Ok(None);
        }
        if !self.started {
            if self.config.update_at_each_batch {
                self.pool.update_policy_weights()?;
            }
            let msg = if self.config.init_random_frames > 0 {
                ControlMsg::ContinueRandom
            } else {
                ControlMsg::Continue
            };
            for index in 0..self.pool.num_workers() {
                self.pool.send(index, msg.clone())?;
            }
            self.started = true;
            self.running = true;
        }
        if self.frames >= self.config.total_frames {
            self.finished = true;
            self.running = false;
            self.pool.shutdown();
            return Ok(None);
        }

        let entry = self
            .pool
            .queue()
            .recv()
            .map_err(|_| CollectorError::protocol("block queue closed while streaming"))?;
        let (worker, block) = self.directory.resolve(entry)?;

        let worker_frames = block.frame_count() as u64;
        let out = if self.config.split_trajs {
            split_trajectories(&block)
        } else {
            block
        };
        self.frames += worker_frames;
        self.workers_frames[worker] += worker_frames;

        if self.workers_frames[worker] < self.frames_per_worker {
            self.pool.send(worker, self.production_msg())?;
        } else if !self.dones[worker] {
            log::info!("worker {} reached its frame share", worker);
            self.dones[worker] = true;
        }

        Ok(Some(out))
    }

    /// Iterator adapter over [`next_batch`](Self::next_batch).
    pub fn iter(&mut self) -> AsyncBatches<'_> {
        AsyncBatches { collector: self }
    }

    /// Seed workers sequentially; returns the last effective seed.
    pub fn set_seed(&mut self, seed: u64) -> Result<u64, CollectorError> {
        self.pool.set_seed(seed)
    }

    /// Reset selected workers (all when `mask` is `None`).
    ///
    /// When the collector is mid-stream, waits for the single-slot queue to
    /// drain and re-arms every worker afterwards so collection resumes from
    /// the reset state.
    pub fn reset(&mut self, mask: Option<&[bool]>) -> Result<(), CollectorError> {
        self.pool.reset(mask)?;
        if self.pool.queue().is_full() {
            log::debug!("waiting for the block queue to drain after reset");
            std::thread::sleep(POLL_TIMEOUT);
        }
        if self.pool.queue().is_full() {
            return Err(CollectorError::protocol(
                "block queue still full after reset",
            ));
        }
        if self.running {
            for index in 0..self.pool.num_workers() {
                self.pool.send(index, self.production_msg())?;
            }
        }
        Ok(())
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
        self.running = false;
        self.pool.shutdown();
    }
}

/// Iterator over streamed blocks from a [`MultiAsyncCollector`].
pub struct AsyncBatches<'a> {
    collector: &'a mut MultiAsyncCollector,
}

impl Iterator for AsyncBatches<'_> {
    type Item = Result<Block, CollectorError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.collector.next_batch().transpose()
    }
}

/// Single-worker streaming collector.
///
/// A thin wrapper around [`MultiAsyncCollector`] with one worker: the
/// worker collects continuously on its own thread while the consumer
/// trains, which suits off-policy settings where the behavior policy may
/// lag the trained one.
pub struct AsyncCollector {
    inner: MultiAsyncCollector,
}

impl AsyncCollector {
    /// Spawn the single worker.
    pub fn new<E, P, F, G>(
        env_factory: F,
        policy_factory: G,
        config: CollectorConfig,
    ) -> Result<Self, CollectorError>
    where
        E: VectorizedEnv + 'static,
        P: Policy + 'static,
        F: FnOnce() -> E + Send + 'static,
        G: Fn(Device) -> P,
    {
        Ok(Self {
            inner: MultiAsyncCollector::new(vec![env_factory], policy_factory, config)?,
        })
    }

    /// Install the accessor behind `update_policy_weights`.
    pub fn with_weight_source(mut self, source: WeightSource) -> Self {
        self.inner = self.inner.with_weight_source(source);
        self
    }

    /// Pop the next block, or `None` once the frame target is reached.
    pub fn next_batch(&mut self) -> Result<Option<Block>, CollectorError> {
        self.inner.next_batch()
    }

    /// Iterator adapter over [`next_batch`](Self::next_batch).
    pub fn iter(&mut self) -> AsyncBatches<'_> {
        self.inner.iter()
    }

    /// Seed the worker; returns the effective seed.
    pub fn set_seed(&mut self, seed: u64) -> Result<u64, CollectorError> {
        self.inner.set_seed(seed)
    }

    /// Reset the worker's lanes.
    pub fn reset(&mut self) -> Result<(), CollectorError> {
        self.inner.reset(None)
    }

    /// Snapshot the worker's state.
    pub fn state_dict(&self) -> Result<CollectorStateDict, CollectorError> {
        self.inner.state_dict()
    }

    /// Restore the worker's state.
    pub fn load_state_dict(&self, state_dict: &CollectorStateDict) -> Result<(), CollectorError> {
        self.inner.load_state_dict(state_dict)
    }

    /// Push fresh policy weights to the worker.
    pub fn update_policy_weights(&self) -> Result<(), CollectorError> {
        self.inner.update_policy_weights()
    }

    /// Close the worker. Idempotent.
    pub fn shutdown(&mut self) {
        self.inner.shutdown()
    }
}
