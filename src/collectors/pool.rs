//! Shared coordinator plumbing for multi-worker collectors.
//!
//! A [`WorkerPool`] owns the worker set, the consuming end of the shared
//! block queue, and the explicit device-to-weights-slot map built once at
//! spawn: workers assigned to the same collection device read published
//! weights from the same slot, so the policy blob is copied per device, not
//! per worker.

use crossbeam_channel::{bounded, Receiver};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::{CollectorConfig, Device};
use crate::core::block::Block;
use crate::core::block_slot::SharedBlockSlot;
use crate::core::state_dict::{CollectorStateDict, WorkerStateDict};
use crate::core::weights_slot::{weights_slot, SharedWeightsSlot};
use crate::environment::VectorizedEnv;
use crate::error::CollectorError;
use crate::messages::{ControlMsg, QueueEntry, ReplyMsg};
use crate::policy::{Policy, WeightSource};
use crate::workers::worker::{spawn_worker, WorkerConfig, WorkerHandle};

/// Bounded wait for each worker's close confirmation during shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinator-side mapping from worker index to its registered block
/// buffer, populated by first-publish queue entries.
pub(crate) struct BlockDirectory {
    slots: HashMap<usize, SharedBlockSlot>,
}

impl BlockDirectory {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    /// Resolve a queue entry to a snapshot of the producing worker's block.
    pub(crate) fn resolve(&mut self, entry: QueueEntry) -> Result<(usize, Block), CollectorError> {
        let worker = entry.worker();
        if let QueueEntry::First { slot, .. } = entry {
            self.slots.insert(worker, slot);
        }
        let slot = self.slots.get(&worker).ok_or_else(|| {
            CollectorError::protocol(format!(
                "worker {} signaled a reused block before registering its buffer",
                worker
            ))
        })?;
        let block = slot.snapshot().ok_or_else(|| {
            CollectorError::protocol(format!("worker {} registered an empty block buffer", worker))
        })?;
        Ok((worker, block))
    }
}

/// A set of spawned workers plus the channels and weight slots that drive
/// them.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    queue_rx: Receiver<QueueEntry>,
    weight_slots: HashMap<Device, SharedWeightsSlot>,
    weight_source: Option<WeightSource>,
    closed: bool,
}

impl WorkerPool {
    /// Spawn one worker per environment factory.
    ///
    /// `policy_factory` is invoked once per worker with the worker's
    /// resolved device; `frames_per_block` is each worker's per-block
    /// frame share; `queue_capacity` bounds the shared output queue.
    pub fn spawn<E, P, F, G>(
        env_factories: Vec<F>,
        policy_factory: G,
        config: &CollectorConfig,
        frames_per_block: usize,
        queue_capacity: usize,
    ) -> Result<Self, CollectorError>
    where
        E: VectorizedEnv + 'static,
        P: Policy + 'static,
        F: FnOnce() -> E + Send + 'static,
        G: Fn(Device) -> P,
    {
        let n_workers = env_factories.len();
        config.validate(n_workers)?;
        let devices = config.devices.resolve(n_workers)?;
        let passing_devices = config.passing_devices.resolve(n_workers)?;

        let (queue_tx, queue_rx) = bounded(queue_capacity);
        let mut weight_slots: HashMap<Device, SharedWeightsSlot> = HashMap::new();
        for device in &devices {
            weight_slots.entry(*device).or_insert_with(weights_slot);
        }

        let mut workers = Vec::with_capacity(n_workers);
        for (index, env_factory) in env_factories.into_iter().enumerate() {
            let device = devices[index];
            let policy = policy_factory(device);
            let worker_config = WorkerConfig {
                index,
                frames_per_block,
                device,
                passing_device: passing_devices[index],
            };
            workers.push(spawn_worker(
                worker_config,
                config.clone(),
                env_factory,
                policy,
                std::sync::Arc::clone(&weight_slots[&device]),
                queue_tx.clone(),
            ));
        }

        Ok(Self {
            workers,
            queue_rx,
            weight_slots,
            weight_source: None,
            closed: false,
        })
    }

    /// Number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Consuming end of the shared block queue.
    pub fn queue(&self) -> &Receiver<QueueEntry> {
        &self.queue_rx
    }

    /// Install the accessor used by [`update_policy_weights`].
    ///
    /// [`update_policy_weights`]: Self::update_policy_weights
    pub fn set_weight_source(&mut self, source: WeightSource) {
        self.weight_source = Some(source);
    }

    /// Send a control message to one worker without awaiting a reply.
    pub fn send(&self, index: usize, msg: ControlMsg) -> Result<(), CollectorError> {
        self.workers[index].ctrl_tx.send(msg).map_err(|_| {
            CollectorError::protocol(format!("worker {} control channel closed", index))
        })
    }

    fn recv_reply(&self, index: usize) -> Result<ReplyMsg, CollectorError> {
        self.workers[index].reply_rx.recv().map_err(|_| {
            CollectorError::protocol(format!("worker {} reply channel closed", index))
        })
    }

    fn request(&self, index: usize, msg: ControlMsg) -> Result<ReplyMsg, CollectorError> {
        self.send(index, msg)?;
        self.recv_reply(index)
    }

    /// Seed every worker sequentially: each worker is seeded with the
    /// previous worker's effective seed plus one. Returns the last
    /// effective seed, then resets all workers so collection restarts from
    /// the seeded state.
    pub fn set_seed(&mut self, seed: u64) -> Result<u64, CollectorError> {
        let mut next_seed = seed;
        let mut effective = seed;
        for index in 0..self.workers.len() {
            match self.request(index, ControlMsg::Seed(next_seed))? {
                ReplyMsg::Seeded(reply_seed) => {
                    effective = reply_seed;
                    next_seed = reply_seed + 1;
                }
                other => {
                    return Err(CollectorError::protocol(format!(
                        "expected Seeded from worker {}, got {}",
                        index,
                        other.tag()
                    )))
                }
            }
        }
        self.reset(None)?;
        Ok(effective)
    }

    /// Reset the selected workers' lanes (all workers when `mask` is
    /// `None`).
    pub fn reset(&mut self, mask: Option<&[bool]>) -> Result<(), CollectorError> {
        if let Some(mask) = mask {
            if mask.len() != self.workers.len() {
                return Err(CollectorError::config(format!(
                    "reset mask length {} does not match worker count {}",
                    mask.len(),
                    self.workers.len()
                )));
            }
        }
        let selected = |index: usize| mask.map_or(true, |m| m[index]);
        for index in 0..self.workers.len() {
            if selected(index) {
                self.send(index, ControlMsg::Reset)?;
            }
        }
        for index in 0..self.workers.len() {
            if selected(index) {
                match self.recv_reply(index)? {
                    ReplyMsg::Reset => {}
                    other => {
                        return Err(CollectorError::protocol(format!(
                            "expected Reset from worker {}, got {}",
                            index,
                            other.tag()
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    /// Snapshot every worker's state, keyed by worker index.
    pub fn state_dict(&self) -> Result<CollectorStateDict, CollectorError> {
        for index in 0..self.workers.len() {
            self.send(index, ControlMsg::StateDictRequest)?;
        }
        let mut state_dict = CollectorStateDict::new();
        for index in 0..self.workers.len() {
            match self.recv_reply(index)? {
                ReplyMsg::StateDict(sd) => {
                    state_dict.insert(index, sd);
                }
                other => {
                    return Err(CollectorError::protocol(format!(
                        "expected StateDict from worker {}, got {}",
                        index,
                        other.tag()
                    )))
                }
            }
        }
        Ok(state_dict)
    }

    /// Restore every worker's state from a snapshot keyed by worker index.
    pub fn load_state_dict(&self, state_dict: &CollectorStateDict) -> Result<(), CollectorError> {
        for index in 0..self.workers.len() {
            let sd: &WorkerStateDict = state_dict.get(&index).ok_or_else(|| {
                CollectorError::config(format!("state dict has no entry for worker {}", index))
            })?;
            self.send(index, ControlMsg::LoadStateDict(sd.clone()))?;
        }
        for index in 0..self.workers.len() {
            match self.recv_reply(index)? {
                ReplyMsg::Loaded => {}
                other => {
                    return Err(CollectorError::protocol(format!(
                        "expected Loaded from worker {}, got {}",
                        index,
                        other.tag()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Pull weights from the configured source, publish them to every
    /// device slot and tell every worker to reload. A no-op without a
    /// weight source.
    ///
    /// Advisory, not real-time safe: a worker mid-block finishes that block
    /// with the old weights before reloading.
    pub fn update_policy_weights(&self) -> Result<(), CollectorError> {
        let source = match &self.weight_source {
            Some(source) => source,
            None => return Ok(()),
        };
        let bytes = source();
        for slot in self.weight_slots.values() {
            slot.publish(bytes.clone());
        }
        for index in 0..self.workers.len() {
            self.send(index, ControlMsg::UpdateWeights)?;
        }
        for index in 0..self.workers.len() {
            match self.recv_reply(index)? {
                ReplyMsg::Updated => {}
                other => {
                    return Err(CollectorError::protocol(format!(
                        "expected Updated from worker {}, got {}",
                        index,
                        other.tag()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Close every worker and join the threads. Idempotent and bounded: a
    /// worker that fails to confirm within the timeout is logged and
    /// detached rather than waited on forever.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for worker in &self.workers {
            let _ = worker.ctrl_tx.send(ControlMsg::Close);
        }

        let mut confirmed = vec![false; self.workers.len()];
        for (index, worker) in self.workers.iter().enumerate() {
            loop {
                match worker.reply_rx.recv_timeout(SHUTDOWN_TIMEOUT) {
                    Ok(ReplyMsg::Closed) => {
                        confirmed[index] = true;
                        break;
                    }
                    Ok(other) => {
                        // stale reply from an interrupted exchange, keep draining
                        log::warn!(
                            "worker {}: discarding {} reply during shutdown",
                            worker.index,
                            other.tag()
                        );
                    }
                    Err(_) => {
                        log::warn!("worker {} did not confirm close", worker.index);
                        break;
                    }
                }
            }
        }

        for (index, worker) in self.workers.drain(..).enumerate() {
            if confirmed[index] {
                if worker.join().is_err() {
                    log::error!("worker {} panicked during shutdown", index);
                }
            } else {
                // joining an unconfirmed worker could hang forever; dropping
                // the handle detaches the thread instead
                log::warn!("worker {} detached without join", index);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
