//! Per-worker shared block buffer.
//!
//! Each worker refreshes the same underlying block storage in place across
//! invocations and only ships a lightweight queue entry once the coordinator
//! holds a handle to the slot. The coordinator snapshots the contents under
//! the lock; it never mutates a worker's buffer.
//!
//! ```text
//! Worker thread                              Coordinator
//! ┌───────────────────┐                      ┌──────────────────┐
//! │ produce_block()   │                      │ queue entry j    │
//! │       ↓           │                      │       ↓          │
//! │ slot.publish(b) ──────BlockSlot────────→ │ slot.snapshot()  │
//! └───────────────────┘                      └──────────────────┘
//! ```

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::block::Block;

/// Single-slot block container shared between one worker and the
/// coordinator.
///
/// Publishing overwrites the previous contents, so the slot never holds more
/// than one block. The scheduling disciplines guarantee the coordinator
/// consumes entry `j` before the worker is re-armed to produce `j + 1`; a
/// late read under backpressure observes fresher data, never torn data.
pub struct BlockSlot {
    current: Mutex<Option<Block>>,
    version: AtomicU64,
}

impl BlockSlot {
    /// Create a new empty slot.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Number of blocks published so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Publish a refreshed block, overwriting the previous contents.
    pub fn publish(&self, block: Block) {
        let mut guard = self.current.lock();
        *guard = Some(block);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Clone the current contents without removing them.
    pub fn snapshot(&self) -> Option<Block> {
        self.current.lock().clone()
    }

    /// Whether a block has been published.
    pub fn has_block(&self) -> bool {
        self.current.lock().is_some()
    }
}

impl Default for BlockSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared block slot.
pub type SharedBlockSlot = Arc<BlockSlot>;

/// Create a new shared block slot.
pub fn block_slot() -> SharedBlockSlot {
    Arc::new(BlockSlot::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;

    fn dummy_block(tag: u64) -> Block {
        let mut block = Block::new(1, 1, 1, 1, Device::Cpu);
        let state = {
            let mut s = crate::core::state::RolloutState::new(1, 1, 1);
            s.traj_ids[0] = tag;
            s
        };
        block.record_step(0, &state);
        block
    }

    #[test]
    fn test_publish_and_snapshot() {
        let slot = BlockSlot::new();
        assert!(slot.snapshot().is_none());
        assert!(!slot.has_block());
        assert_eq!(slot.version(), 0);

        slot.publish(dummy_block(1));
        assert_eq!(slot.version(), 1);
        assert!(slot.has_block());

        let first = slot.snapshot().unwrap();
        let second = slot.snapshot().unwrap();
        assert_eq!(first.frame(0, 0).traj_id, 1);
        assert_eq!(second.frame(0, 0).traj_id, 1);
    }

    #[test]
    fn test_publish_overwrites() {
        let slot = BlockSlot::new();
        slot.publish(dummy_block(1));
        slot.publish(dummy_block(2));
        assert_eq!(slot.version(), 2);
        assert_eq!(slot.snapshot().unwrap().frame(0, 0).traj_id, 2);
    }

    #[test]
    fn test_shared_across_handles() {
        let slot = block_slot();
        let other = Arc::clone(&slot);
        slot.publish(dummy_block(9));
        assert_eq!(other.snapshot().unwrap().frame(0, 0).traj_id, 9);
    }
}
