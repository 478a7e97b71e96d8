//! Live lane-batch record mutated in place during a rollout.
//!
//! One `RolloutState` is exclusively owned by one engine. It is the mutable
//! half of the engine's double buffer: the environment and policy write into
//! it every step, and the engine snapshots it into an immutable
//! [`Block`](crate::core::block::Block) frame by frame. The two are never
//! aliased across threads.

/// Per-lane scratch state for a batched environment.
///
/// Observations and actions are stored flat, one contiguous slice per lane:
/// `observations[lane * obs_size .. (lane + 1) * obs_size]`.
#[derive(Debug, Clone)]
pub struct RolloutState {
    n_lanes: usize,
    obs_size: usize,
    action_size: usize,
    /// Observations the next action will be selected from.
    pub observations: Vec<f32>,
    /// Observations produced by the most recent step, promoted into
    /// `observations` by [`advance`](Self::advance).
    pub next_observations: Vec<f32>,
    /// Actions applied on the most recent step.
    pub actions: Vec<f32>,
    /// Rewards produced by the most recent step.
    pub rewards: Vec<f32>,
    /// Done flags produced by the most recent step.
    pub dones: Vec<bool>,
    /// Trajectory identity per lane. Strictly increasing, never reused.
    pub traj_ids: Vec<u64>,
    /// Steps taken since the lane's trajectory started.
    pub step_counts: Vec<u32>,
}

impl RolloutState {
    /// Create a zeroed state for `n_lanes` lanes.
    pub fn new(n_lanes: usize, obs_size: usize, action_size: usize) -> Self {
        Self {
            n_lanes,
            obs_size,
            action_size,
            observations: vec![0.0; n_lanes * obs_size],
            next_observations: vec![0.0; n_lanes * obs_size],
            actions: vec![0.0; n_lanes * action_size],
            rewards: vec![0.0; n_lanes],
            dones: vec![false; n_lanes],
            traj_ids: vec![0; n_lanes],
            step_counts: vec![0; n_lanes],
        }
    }

    /// Number of lanes.
    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    /// Observation width per lane.
    pub fn obs_size(&self) -> usize {
        self.obs_size
    }

    /// Action width per lane.
    pub fn action_size(&self) -> usize {
        self.action_size
    }

    /// Current observation slice for one lane.
    pub fn obs(&self, lane: usize) -> &[f32] {
        &self.observations[lane * self.obs_size..(lane + 1) * self.obs_size]
    }

    /// Mutable slice of the post-step observation for one lane. Written by
    /// the environment on `step` and `reset`.
    pub fn next_obs_mut(&mut self, lane: usize) -> &mut [f32] {
        &mut self.next_observations[lane * self.obs_size..(lane + 1) * self.obs_size]
    }

    /// Action slice for one lane.
    pub fn action(&self, lane: usize) -> &[f32] {
        &self.actions[lane * self.action_size..(lane + 1) * self.action_size]
    }

    /// Mutable action slice for one lane. Written by the policy, or by the
    /// environment on `rand_step`.
    pub fn action_mut(&mut self, lane: usize) -> &mut [f32] {
        &mut self.actions[lane * self.action_size..(lane + 1) * self.action_size]
    }

    /// Promote post-step observations to current observations.
    pub fn advance(&mut self) {
        self.observations.copy_from_slice(&self.next_observations);
    }

    /// Zero one lane's data fields ahead of a reset. Trajectory ids and
    /// step counts are bookkeeping state and are updated separately.
    pub fn zero_lane(&mut self, lane: usize) {
        self.obs_zero(lane);
        for v in self.action_mut(lane) {
            *v = 0.0;
        }
        self.rewards[lane] = 0.0;
        self.dones[lane] = false;
    }

    fn obs_zero(&mut self, lane: usize) {
        let range = lane * self.obs_size..(lane + 1) * self.obs_size;
        for v in &mut self.observations[range.clone()] {
            *v = 0.0;
        }
        for v in &mut self.next_observations[range] {
            *v = 0.0;
        }
    }

    /// Highest trajectory id currently assigned to any lane.
    pub fn max_traj_id(&self) -> u64 {
        self.traj_ids.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_layout() {
        let state = RolloutState::new(3, 4, 2);
        assert_eq!(state.observations.len(), 12);
        assert_eq!(state.actions.len(), 6);
        assert_eq!(state.rewards.len(), 3);
        assert_eq!(state.obs(1).len(), 4);
        assert_eq!(state.action(2).len(), 2);
    }

    #[test]
    fn test_advance_promotes_next_obs() {
        let mut state = RolloutState::new(2, 2, 1);
        state.next_obs_mut(0).copy_from_slice(&[1.0, 2.0]);
        state.next_obs_mut(1).copy_from_slice(&[3.0, 4.0]);
        state.advance();
        assert_eq!(state.obs(0), &[1.0, 2.0]);
        assert_eq!(state.obs(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_zero_lane_leaves_bookkeeping() {
        let mut state = RolloutState::new(2, 2, 1);
        state.next_obs_mut(0).copy_from_slice(&[1.0, 2.0]);
        state.advance();
        state.rewards[0] = 5.0;
        state.dones[0] = true;
        state.traj_ids[0] = 7;
        state.step_counts[0] = 3;

        state.zero_lane(0);

        assert_eq!(state.obs(0), &[0.0, 0.0]);
        assert_eq!(state.rewards[0], 0.0);
        assert!(!state.dones[0]);
        assert_eq!(state.traj_ids[0], 7);
        assert_eq!(state.step_counts[0], 3);
    }

    #[test]
    fn test_max_traj_id() {
        let mut state = RolloutState::new(3, 1, 1);
        state.traj_ids = vec![4, 9, 2];
        assert_eq!(state.max_traj_id(), 9);
    }
}
