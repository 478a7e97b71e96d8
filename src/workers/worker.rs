//! Worker thread: one rollout engine behind the control protocol.
//!
//! Each worker runs on a dedicated named OS thread and exclusively owns its
//! environment, policy and engine; nothing inside a worker is shared with
//! another worker. The loop polls the control channel with a long timeout,
//! shortened after a failed block delivery so the worker stays responsive
//! while it retries under backpressure.
//!
//! Production semantics favor freshness over throughput: after finishing a
//! block the worker first checks for a control message that arrived while
//! it was producing, and if one is pending the block is discarded and the
//! message handled instead. Delivery goes through the shared bounded queue;
//! the first delivery hands the coordinator a handle to the worker's block
//! buffer and later deliveries are refresh signals resolved through that
//! handle.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::{CollectorConfig, Device};
use crate::core::block_slot::block_slot;
use crate::core::weights_slot::SharedWeightsSlot;
use crate::engine::rollout::RolloutEngine;
use crate::environment::VectorizedEnv;
use crate::messages::{ControlMsg, QueueEntry, ReplyMsg};
use crate::policy::Policy;

/// Normal control poll timeout.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Shortened poll timeout used right after a failed delivery, and the
/// post-production freshness check window. Several orders of magnitude
/// below the time spent producing a block.
pub const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// How long a worker waits for space in the output queue before retrying
/// with a fresh block.
pub const QUEUE_PUT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Capacity of the per-worker control and reply channels.
const CHANNEL_CAPACITY: usize = 16;

/// Per-worker spawn parameters.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker index, used for queue tagging and log lines.
    pub index: usize,
    /// Frames per block for this worker, summed across its lanes.
    pub frames_per_block: usize,
    /// Device the worker's policy lives on.
    pub device: Device,
    /// Device tag stamped on the worker's output blocks.
    pub passing_device: Device,
}

/// Handle to a spawned worker thread.
pub struct WorkerHandle {
    /// Worker index.
    pub index: usize,
    /// Control channel into the worker.
    pub ctrl_tx: Sender<ControlMsg>,
    /// Reply channel out of the worker.
    pub reply_rx: Receiver<ReplyMsg>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Wait for the worker thread to finish.
    pub fn join(self) -> std::thread::Result<()> {
        self.thread.join()
    }
}

/// Spawn a worker thread running the control protocol around a rollout
/// engine built from `env_factory` and `policy`.
///
/// The environment is constructed on the worker thread so native handles
/// never cross threads. A failed engine construction or a fatal rollout
/// error terminates the thread; the coordinator observes the dropped
/// channels as a protocol error.
pub fn spawn_worker<E, P, F>(
    worker_config: WorkerConfig,
    collector_config: CollectorConfig,
    env_factory: F,
    policy: P,
    weights: SharedWeightsSlot,
    queue_tx: Sender<QueueEntry>,
) -> WorkerHandle
where
    E: VectorizedEnv + 'static,
    P: Policy + 'static,
    F: FnOnce() -> E + Send + 'static,
{
    let (ctrl_tx, ctrl_rx) = bounded(CHANNEL_CAPACITY);
    let (reply_tx, reply_rx) = bounded(CHANNEL_CAPACITY);
    let index = worker_config.index;

    let thread = std::thread::Builder::new()
        .name(format!("collector-worker-{}", index))
        .spawn(move || {
            let env = env_factory();
            let engine = match RolloutEngine::with_frames_per_block(
                env,
                policy,
                &collector_config,
                worker_config.frames_per_block,
                worker_config.passing_device,
            ) {
                Ok(engine) => engine,
                Err(e) => {
                    log::error!("worker {}: engine construction failed: {}", index, e);
                    return;
                }
            };
            run_worker(engine, index, ctrl_rx, reply_tx, queue_tx, weights);
        })
        .expect("failed to spawn collector worker thread");

    WorkerHandle {
        index,
        ctrl_tx,
        reply_rx,
        thread,
    }
}

fn run_worker<E: VectorizedEnv, P: Policy>(
    mut engine: RolloutEngine<E, P>,
    index: usize,
    ctrl_rx: Receiver<ControlMsg>,
    reply_tx: Sender<ReplyMsg>,
    queue_tx: Sender<QueueEntry>,
    weights: SharedWeightsSlot,
) {
    let slot = block_slot();
    let mut registered = false;
    let mut seq: u64 = 0;
    let mut has_timed_out = false;
    let mut last_directive: Option<ControlMsg> = None;
    // a message that arrived during production supersedes the block it
    // interrupted and is handled on the next pass
    let mut pending: Option<ControlMsg> = None;

    loop {
        let msg = match pending.take() {
            Some(msg) => msg,
            None => {
                let timeout = if has_timed_out { MIN_TIMEOUT } else { POLL_TIMEOUT };
                match ctrl_rx.recv_timeout(timeout) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => {
                        // a timed-out delivery means the coordinator expects
                        // the previous production directive to keep running
                        match &last_directive {
                            Some(directive) if has_timed_out && directive.is_continue() => {
                                directive.clone()
                            }
                            _ => continue,
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        };
        last_directive = Some(msg.clone());

        match msg {
            ControlMsg::Continue | ControlMsg::ContinueRandom => {
                let budget = if matches!(msg, ControlMsg::ContinueRandom) {
                    u64::MAX
                } else {
                    0
                };
                engine.set_init_random_frames(budget);
                let block = match engine.produce_block() {
                    Ok(block) => block.clone(),
                    Err(e) => {
                        log::error!("worker {}: rollout failed: {}", index, e);
                        break;
                    }
                };
                match ctrl_rx.recv_timeout(MIN_TIMEOUT) {
                    Ok(superseding) => {
                        pending = Some(superseding);
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                slot.publish(block);
                let entry = if registered {
                    QueueEntry::Reuse { worker: index, seq }
                } else {
                    QueueEntry::First {
                        slot: Arc::clone(&slot),
                        worker: index,
                        seq,
                    }
                };
                match queue_tx.send_timeout(entry, QUEUE_PUT_TIMEOUT) {
                    Ok(()) => {
                        registered = true;
                        seq += 1;
                        has_timed_out = false;
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        log::debug!("worker {}: output queue full, retrying", index);
                        has_timed_out = true;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => break,
                }
            }
            ControlMsg::Seed(seed) => {
                let effective = engine.set_seed(seed);
                if reply_tx.send(ReplyMsg::Seeded(effective)).is_err() {
                    break;
                }
                has_timed_out = false;
            }
            ControlMsg::Reset => {
                if let Err(e) = engine.reset() {
                    log::error!("worker {}: reset failed: {}", index, e);
                    break;
                }
                if reply_tx.send(ReplyMsg::Reset).is_err() {
                    break;
                }
            }
            ControlMsg::UpdateWeights => {
                if let Some(bytes) = weights.get() {
                    if let Err(e) = engine.load_policy_weights(&bytes) {
                        log::error!("worker {}: weight update failed: {}", index, e);
                        break;
                    }
                }
                if reply_tx.send(ReplyMsg::Updated).is_err() {
                    break;
                }
                has_timed_out = false;
            }
            ControlMsg::StateDictRequest => {
                // serializing is also the transfer to host memory
                if reply_tx.send(ReplyMsg::StateDict(engine.state_dict())).is_err() {
                    break;
                }
                has_timed_out = false;
            }
            ControlMsg::LoadStateDict(state_dict) => {
                if let Err(e) = engine.load_state_dict(&state_dict) {
                    log::error!("worker {}: state restore failed: {}", index, e);
                    break;
                }
                if reply_tx.send(ReplyMsg::Loaded).is_err() {
                    break;
                }
                has_timed_out = false;
            }
            ControlMsg::Close => {
                engine.shutdown();
                let _ = reply_tx.send(ReplyMsg::Closed);
                log::debug!("worker {} closed", index);
                break;
            }
        }
    }
}
