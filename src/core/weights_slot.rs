//! Serialized policy weight handoff.
//!
//! Weight updates are a pull model: the coordinator publishes the latest
//! serialized parameters into one slot per distinct collection device, and
//! every worker assigned to that device reads from the shared slot when told
//! to update. `Vec<u8>` crosses thread boundaries regardless of what the
//! policy itself holds, and the blob form doubles as the host-memory copy
//! required before weights travel between devices.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe slot holding the latest serialized policy weights.
pub struct WeightsSlot {
    bytes: Mutex<Option<Vec<u8>>>,
    version: AtomicU64,
}

impl WeightsSlot {
    /// Create a new empty slot.
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Current version, incremented on every publish.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Publish new weights, overwriting any previous blob.
    pub fn publish(&self, bytes: Vec<u8>) {
        let mut guard = self.bytes.lock();
        *guard = Some(bytes);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Clone the current weights without removing them. Multiple workers on
    /// the same device each read the same blob.
    pub fn get(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }

    /// Whether weights have been published.
    pub fn has_weights(&self) -> bool {
        self.bytes.lock().is_some()
    }
}

impl Default for WeightsSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared weights slot.
pub type SharedWeightsSlot = Arc<WeightsSlot>;

/// Create a new shared weights slot.
pub fn weights_slot() -> SharedWeightsSlot {
    Arc::new(WeightsSlot::new())
}
