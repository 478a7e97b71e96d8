//! Core data types shared across the collection pipeline.

pub mod block;
pub mod block_slot;
pub mod state;
pub mod state_dict;
pub mod weights_slot;

pub use block::{Block, Frame};
pub use block_slot::{block_slot, BlockSlot, SharedBlockSlot};
pub use state::RolloutState;
pub use state_dict::{CollectorStateDict, WorkerStateDict};
pub use weights_slot::{weights_slot, SharedWeightsSlot, WeightsSlot};
