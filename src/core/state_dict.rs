//! Snapshot records for saving and restoring collector state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized policy and environment state for one worker.
///
/// The blobs are opaque to the collector: each collaborator serializes and
/// restores its own state. Serialization also serves as the host-memory
/// copy, so a state dict is always safe to move between threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStateDict {
    /// Serialized policy parameters and internal state.
    pub policy: Vec<u8>,
    /// Serialized environment state.
    pub env: Vec<u8>,
}

/// Aggregated state of a multi-worker collector, keyed by worker index.
pub type CollectorStateDict = BTreeMap<usize, WorkerStateDict>;
