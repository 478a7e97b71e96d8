//! Worker threads running the control protocol around rollout engines.

pub mod worker;

pub use worker::{
    spawn_worker, WorkerConfig, WorkerHandle, MIN_TIMEOUT, POLL_TIMEOUT, QUEUE_PUT_TIMEOUT,
};
