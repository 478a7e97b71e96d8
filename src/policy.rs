//! Policy abstraction consumed by the rollout engine.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

use crate::config::{Device, ExplorationMode};
use crate::core::state::RolloutState;
use crate::error::CollectorError;

/// A mapping from an observation batch to an action batch.
///
/// Reads `state.observations` and writes `state.actions` for every lane.
/// Policies may hold weights and internal state; they are exclusively owned
/// by one worker thread, so `Send` suffices.
pub trait Policy: Send {
    /// Select one action per lane from the current observations.
    fn select_actions(&mut self, state: &mut RolloutState, mode: ExplorationMode);

    /// Declared parameter device, used for the device-to-weights-slot
    /// mapping. `None` means the policy has no placement preference.
    fn device(&self) -> Option<Device> {
        None
    }

    /// Serialize policy parameters and internal state.
    fn state_dict(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore policy parameters and internal state.
    fn load_state_dict(&mut self, _blob: &[u8]) -> Result<(), CollectorError> {
        Ok(())
    }
}

/// Coordinator-side accessor producing the latest serialized policy
/// weights, pulled on [`update_policy_weights`] calls.
///
/// [`update_policy_weights`]: crate::collectors::WorkerPool::update_policy_weights
pub type WeightSource = Arc<dyn Fn() -> Vec<u8> + Send + Sync>;

/// Policy sampling uniformly random actions within fixed bounds.
///
/// Useful as a stand-in when no trained policy exists yet, or for purely
/// random data collection.
pub struct RandomPolicy {
    action_size: usize,
    low: f32,
    high: f32,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    /// Create a random policy over `[-1, 1)` actions.
    pub fn new(action_size: usize) -> Self {
        Self::with_bounds(action_size, -1.0, 1.0)
    }

    /// Create a random policy over `[low, high)` actions.
    pub fn with_bounds(action_size: usize, low: f32, high: f32) -> Self {
        Self {
            action_size,
            low,
            high,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Reseed the policy's sampler.
    pub fn seeded(mut self, seed: u64) -> Self {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self
    }
}

impl Policy for RandomPolicy {
    fn select_actions(&mut self, state: &mut RolloutState, _mode: ExplorationMode) {
        debug_assert_eq!(state.action_size(), self.action_size);
        for lane in 0..state.n_lanes() {
            for value in state.action_mut(lane) {
                *value = self.rng.gen_range(self.low..self.high);
            }
        }
    }
}
