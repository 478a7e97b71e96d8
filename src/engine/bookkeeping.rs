//! Trajectory boundary bookkeeping.
//!
//! Decides, after every step, which lanes must be reset, drives the masked
//! environment reset, and keeps trajectory identity correct: step counts
//! return to zero exactly on a reset, and trajectory ids are strictly
//! increasing and never shared between lanes.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::core::state::RolloutState;
use crate::environment::{ResetMask, VectorizedEnv};
use crate::error::CollectorError;

/// Per-lane reset policy applied after each environment step.
///
/// A lane is terminal when its done flag is set, or when a step cap is
/// configured and the lane's step count has reached it. With lag enabled,
/// lanes that have never gone terminal may additionally be force-reset with
/// probability `1 / max_frames_per_traj` per step, desynchronizing lane
/// phase during the initial trajectories. The `has_been_done` mask is
/// sticky for the tracker's lifetime, so lag stops perturbing a lane once
/// it has completed a trajectory of its own.
#[derive(Debug)]
pub struct TrajectoryTracker {
    max_frames_per_traj: u32,
    init_with_lag: bool,
    has_been_done: Vec<bool>,
}

impl TrajectoryTracker {
    /// Create a tracker for `n_lanes` lanes. Lag is only effective when a
    /// step cap is configured.
    pub fn new(n_lanes: usize, max_frames_per_traj: u32, init_with_lag: bool) -> Self {
        Self {
            max_frames_per_traj,
            init_with_lag: init_with_lag && max_frames_per_traj > 0,
            has_been_done: vec![false; n_lanes],
        }
    }

    /// Compute which lanes must be reset this step.
    fn reset_set(&mut self, state: &RolloutState, rng: &mut ChaCha8Rng) -> Vec<bool> {
        let n_lanes = state.n_lanes();
        let mut terminal = vec![false; n_lanes];
        for lane in 0..n_lanes {
            terminal[lane] = state.dones[lane]
                || (self.max_frames_per_traj > 0
                    && state.step_counts[lane] == self.max_frames_per_traj);
            if terminal[lane] {
                self.has_been_done[lane] = true;
            }
        }
        if self.init_with_lag && !self.has_been_done.iter().all(|&d| d) {
            let p = 1.0 / self.max_frames_per_traj as f32;
            for lane in 0..n_lanes {
                if !self.has_been_done[lane] && rng.gen::<f32>() < p {
                    terminal[lane] = true;
                }
            }
        }
        terminal
    }

    /// Run the post-step reset pass: zero terminal lanes, reset them in the
    /// environment, zero their step counts and assign fresh trajectory ids
    /// in lane-index order above the current global maximum.
    pub fn apply<E: VectorizedEnv>(
        &mut self,
        env: &mut E,
        state: &mut RolloutState,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), CollectorError> {
        let flags = self.reset_set(state, rng);
        if !flags.iter().any(|&f| f) {
            return Ok(());
        }
        let mask = ResetMask::from_flags(&flags);
        let base = state.max_traj_id();

        for lane in 0..state.n_lanes() {
            if mask.is_set(lane) {
                state.zero_lane(lane);
            }
        }
        env.reset(Some(&mask), state);

        let mut next_id = base;
        for lane in 0..state.n_lanes() {
            if !mask.is_set(lane) {
                continue;
            }
            if state.dones[lane] {
                return Err(CollectorError::consistency(format!(
                    "lane {} reports done immediately after reset",
                    lane
                )));
            }
            next_id += 1;
            state.traj_ids[lane] = next_id;
            state.step_counts[lane] = 0;
        }
        Ok(())
    }

    /// Whether a lane has ever completed a trajectory.
    pub fn has_been_done(&self, lane: usize) -> bool {
        self.has_been_done[lane]
    }
}
