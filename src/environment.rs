//! Environment abstraction consumed by the rollout engine.
//!
//! A [`VectorizedEnv`] wraps a batch of independent environment instances
//! ("lanes") behind a single stepped interface. The engine owns the
//! [`RolloutState`] scratch record; the environment reads actions from it
//! and writes observations, rewards and done flags back into it.

use rand_chacha::ChaCha8Rng;

use crate::config::Device;
use crate::core::state::RolloutState;
use crate::error::CollectorError;

/// Mask selecting which lanes an operation applies to.
#[derive(Debug, Clone)]
pub struct ResetMask {
    mask: Vec<bool>,
}

impl ResetMask {
    /// Create from per-lane flags.
    pub fn from_flags(flags: &[bool]) -> Self {
        Self {
            mask: flags.to_vec(),
        }
    }

    /// Whether any lane is selected.
    pub fn any(&self) -> bool {
        self.mask.iter().any(|&x| x)
    }

    /// Whether a specific lane is selected.
    pub fn is_set(&self, lane: usize) -> bool {
        self.mask[lane]
    }

    /// Number of selected lanes.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&x| x).count()
    }

    /// The underlying flags.
    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }
}

/// A batch of independent environment lanes stepped in lock step.
///
/// Implementations are exclusively owned by one worker thread; they only
/// need to be `Send`, never `Sync`, so native handles inside the
/// environment are never shared.
pub trait VectorizedEnv: Send {
    /// Number of lanes in the batch.
    fn n_lanes(&self) -> usize;

    /// Observation width per lane.
    fn obs_size(&self) -> usize;

    /// Action width per lane.
    fn action_size(&self) -> usize;

    /// Placement tag of the environment's native state.
    fn device(&self) -> Device {
        Device::Cpu
    }

    /// Reset the selected lanes (all lanes when `mask` is `None`).
    ///
    /// Writes fresh initial observations into `state.next_observations` for
    /// the selected lanes and clears their done flags. The engine promotes
    /// them to current observations on the following
    /// [`advance`](RolloutState::advance). Leaving a selected lane's done
    /// flag set is a contract violation the engine treats as fatal.
    fn reset(&mut self, mask: Option<&ResetMask>, state: &mut RolloutState);

    /// Step every lane with the actions in `state.actions`.
    ///
    /// Writes `state.next_observations`, `state.rewards` and `state.dones`.
    fn step(&mut self, state: &mut RolloutState);

    /// Sample a uniformly random valid action per lane, write it into
    /// `state.actions`, then step. Used during the random warmup budget.
    fn rand_step(&mut self, state: &mut RolloutState, rng: &mut ChaCha8Rng);

    /// Seed every lane sequentially starting from `seed`.
    ///
    /// Returns the effective seed: the seed consumed by the last lane, so a
    /// single-lane environment returns `seed` and an `L`-lane environment
    /// returns `seed + L - 1`. Coordinators chain worker seeds from this
    /// value.
    fn set_seed(&mut self, seed: u64) -> u64;

    /// Serialize environment state for snapshotting.
    fn state_dict(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Restore environment state from a snapshot.
    fn load_state_dict(&mut self, _blob: &[u8]) -> Result<(), CollectorError> {
        Ok(())
    }

    /// Release environment resources. Called once on shutdown.
    fn close(&mut self) {}
}
