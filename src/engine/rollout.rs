//! Single-process rollout engine.
//!
//! Drives one environment batch through repeated observe, act, step,
//! bookkeep cycles and produces one fixed-size [`Block`] per invocation.
//! The engine is an explicit double buffer: a mutable [`RolloutState`]
//! scratch record written by the environment and policy, and an immutable
//! block buffer it snapshots into once per step. The same block storage is
//! refreshed in place across invocations, which is what lets workers ship a
//! lightweight "reuse" entry instead of a fresh block after their first
//! publish.
//!
//! Besides serving as the state machine inside every worker, the engine is
//! the standalone single-process collector: [`next_batch`] iterates until
//! the configured frame target is reached.
//!
//! [`next_batch`]: RolloutEngine::next_batch

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{CollectorConfig, Device, ExplorationMode};
use crate::core::block::Block;
use crate::core::state::RolloutState;
use crate::core::state_dict::WorkerStateDict;
use crate::engine::bookkeeping::TrajectoryTracker;
use crate::environment::VectorizedEnv;
use crate::error::CollectorError;
use crate::policy::Policy;
use crate::split::split_trajectories;

/// Single-process collection state machine.
pub struct RolloutEngine<E, P> {
    env: E,
    policy: P,
    state: RolloutState,
    out: Block,
    tracker: TrajectoryTracker,
    rng: ChaCha8Rng,
    t_len: usize,
    exploration_mode: ExplorationMode,
    reset_at_each_iter: bool,
    split_trajs: bool,
    init_random_frames: u64,
    total_frames: u64,
    frames_collected: u64,
    first_call: bool,
    closed: bool,
}

impl<E: VectorizedEnv, P: Policy> RolloutEngine<E, P> {
    /// Create a standalone engine producing `config.frames_per_batch`
    /// frames per block.
    pub fn new(env: E, policy: P, config: &CollectorConfig) -> Result<Self, CollectorError> {
        let passing_device = config.passing_devices.resolve(1)?[0];
        Self::with_frames_per_block(env, policy, config, config.frames_per_batch, passing_device)
    }

    /// Create an engine producing `frames_per_block` frames per block,
    /// summed across lanes. Workers use this with their per-worker share.
    pub fn with_frames_per_block(
        mut env: E,
        policy: P,
        config: &CollectorConfig,
        frames_per_block: usize,
        passing_device: Device,
    ) -> Result<Self, CollectorError> {
        let n_lanes = env.n_lanes();
        if n_lanes == 0 {
            return Err(CollectorError::config("environment reports zero lanes"));
        }
        if frames_per_block == 0 {
            return Err(CollectorError::config(
                "effective frames per block is zero for this worker",
            ));
        }
        if config.reset_at_each_iter && config.split_trajs {
            return Err(CollectorError::config(
                "reset_at_each_iter and split_trajs are incompatible",
            ));
        }
        let t_len = (frames_per_block + n_lanes - 1) / n_lanes;

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        if let Some(seed) = config.seed {
            env.set_seed(seed);
        }

        let mut state = RolloutState::new(n_lanes, env.obs_size(), env.action_size());
        env.reset(None, &mut state);
        state.advance();

        let out = Block::new(
            n_lanes,
            t_len,
            env.obs_size(),
            env.action_size(),
            passing_device,
        );

        Ok(Self {
            tracker: TrajectoryTracker::new(
                n_lanes,
                config.max_frames_per_traj,
                config.init_with_lag,
            ),
            env,
            policy,
            state,
            out,
            rng,
            t_len,
            exploration_mode: config.exploration_mode,
            reset_at_each_iter: config.reset_at_each_iter,
            split_trajs: config.split_trajs,
            init_random_frames: config.init_random_frames,
            total_frames: config.total_frames,
            frames_collected: 0,
            first_call: true,
            closed: false,
        })
    }

    /// Number of lanes driven by this engine.
    pub fn n_lanes(&self) -> usize {
        self.state.n_lanes()
    }

    /// Frames per lane per block.
    pub fn t_len(&self) -> usize {
        self.t_len
    }

    /// Total frames produced so far.
    pub fn frames_collected(&self) -> u64 {
        self.frames_collected
    }

    /// Whether the engine has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Override the random warmup budget. Workers set this to `u64::MAX`
    /// on a random directive and to 0 on a normal one, so the coordinator
    /// decides warmup globally.
    pub fn set_init_random_frames(&mut self, frames: u64) {
        self.init_random_frames = frames;
    }

    /// Produce one block of `t_len` consecutive frames per lane.
    ///
    /// Every frame is tagged with the trajectory id and step count valid at
    /// capture time, before any end-of-trajectory reset, so terminal frames
    /// are visible with `done` set. The returned reference points into the
    /// engine's in-place buffer; clone it before the next invocation if it
    /// must outlive one.
    pub fn produce_block(&mut self) -> Result<&Block, CollectorError> {
        if self.closed {
            return Err(CollectorError::protocol(
                "produce_block called on a closed engine",
            ));
        }
        if self.reset_at_each_iter {
            self.reset_all_lanes()?;
        }
        if self.first_call {
            for lane in 0..self.state.n_lanes() {
                self.state.traj_ids[lane] = lane as u64;
            }
            self.first_call = false;
        }

        for t in 0..self.t_len {
            if self.frames_collected < self.init_random_frames {
                self.env.rand_step(&mut self.state, &mut self.rng);
            } else {
                self.policy
                    .select_actions(&mut self.state, self.exploration_mode);
                self.env.step(&mut self.state);
            }
            for count in &mut self.state.step_counts {
                *count += 1;
            }
            self.out.record_step(t, &self.state);
            self.tracker
                .apply(&mut self.env, &mut self.state, &mut self.rng)?;
            self.state.advance();
        }

        self.frames_collected += (self.t_len * self.state.n_lanes()) as u64;
        Ok(&self.out)
    }

    /// Produce the next owned batch, or `None` once the total frame target
    /// has been reached (the engine shuts down at that point). Applies
    /// trajectory splitting when configured.
    pub fn next_batch(&mut self) -> Result<Option<Block>, CollectorError> {
        if self.frames_collected >= self.total_frames {
            self.shutdown();
            return Ok(None);
        }
        let block = self.produce_block()?.clone();
        if self.split_trajs {
            Ok(Some(split_trajectories(&block)))
        } else {
            Ok(Some(block))
        }
    }

    /// Reset every lane to a fresh initial state.
    ///
    /// Step counts return to zero and every lane starts a new trajectory
    /// under a fresh id, so ids stay unique across the reset boundary.
    pub fn reset(&mut self) -> Result<(), CollectorError> {
        self.reset_all_lanes()
    }

    fn reset_all_lanes(&mut self) -> Result<(), CollectorError> {
        for lane in 0..self.state.n_lanes() {
            self.state.zero_lane(lane);
        }
        self.env.reset(None, &mut self.state);
        self.state.advance();
        if let Some(lane) = self.state.dones.iter().position(|&d| d) {
            return Err(CollectorError::consistency(format!(
                "lane {} reports done immediately after reset",
                lane
            )));
        }
        let base = if self.first_call {
            self.first_call = false;
            0
        } else {
            self.state.max_traj_id() + 1
        };
        for lane in 0..self.state.n_lanes() {
            self.state.traj_ids[lane] = base + lane as u64;
            self.state.step_counts[lane] = 0;
        }
        Ok(())
    }

    /// Reseed the engine's RNG and the environment. Returns the effective
    /// seed reported by the environment.
    pub fn set_seed(&mut self, seed: u64) -> u64 {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.env.set_seed(seed)
    }

    /// Snapshot policy and environment state.
    pub fn state_dict(&self) -> WorkerStateDict {
        WorkerStateDict {
            policy: self.policy.state_dict(),
            env: self.env.state_dict(),
        }
    }

    /// Restore policy and environment state from a snapshot.
    pub fn load_state_dict(&mut self, state_dict: &WorkerStateDict) -> Result<(), CollectorError> {
        self.policy.load_state_dict(&state_dict.policy)?;
        self.env.load_state_dict(&state_dict.env)
    }

    /// Load serialized policy weights published by the coordinator.
    pub fn load_policy_weights(&mut self, bytes: &[u8]) -> Result<(), CollectorError> {
        self.policy.load_state_dict(bytes)
    }

    /// Release environment resources. Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.env.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingPolicy, MockEnv};

    fn engine(
        n_lanes: usize,
        episode_len: u32,
        config: CollectorConfig,
    ) -> RolloutEngine<MockEnv, CountingPolicy> {
        RolloutEngine::new(MockEnv::new(n_lanes, episode_len), CountingPolicy::new(), &config)
            .unwrap()
    }

    #[test]
    fn test_first_call_assigns_lane_ids() {
        let config = CollectorConfig::new().with_frames_per_batch(4).with_seed(0);
        let mut e = engine(2, 0, config);
        let block = e.produce_block().unwrap();
        assert_eq!(block.frame(0, 0).traj_id, 0);
        assert_eq!(block.frame(1, 0).traj_id, 1);
    }

    #[test]
    fn test_block_shape_divides_frames_across_lanes() {
        let config = CollectorConfig::new().with_frames_per_batch(10).with_seed(0);
        let e = engine(4, 0, config);
        // ceil(10 / 4) frames per lane
        assert_eq!(e.t_len(), 3);
    }

    #[test]
    fn test_zero_frames_per_block_rejected() {
        let config = CollectorConfig::new().with_seed(0);
        let result = RolloutEngine::with_frames_per_block(
            MockEnv::new(1, 0),
            CountingPolicy::new(),
            &config,
            0,
            Device::Cpu,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_step_counts_track_steps_since_reset() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(10)
            .with_max_frames_per_traj(4)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        let block = e.produce_block().unwrap();
        let counts: Vec<u32> = (0..10).map(|t| block.frame(0, t).step_count).collect();
        assert_eq!(counts, vec![1, 2, 3, 4, 1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn test_traj_id_increments_once_per_cap_stretch() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(12)
            .with_max_frames_per_traj(4)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        let block = e.produce_block().unwrap();
        let ids: Vec<u64> = (0..12).map(|t| block.frame(0, t).traj_id).collect();
        assert_eq!(ids, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_traj_ids_continue_across_blocks() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(4)
            .with_max_frames_per_traj(2)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        let first: Vec<u64> = {
            let b = e.produce_block().unwrap();
            (0..4).map(|t| b.frame(0, t).traj_id).collect()
        };
        let second: Vec<u64> = {
            let b = e.produce_block().unwrap();
            (0..4).map(|t| b.frame(0, t).traj_id).collect()
        };
        assert_eq!(first, vec![0, 0, 1, 1]);
        assert_eq!(second, vec![2, 2, 3, 3]);
    }

    #[test]
    fn test_terminal_frame_visible_with_done() {
        let config = CollectorConfig::new().with_frames_per_batch(6).with_seed(0);
        // environment terminates every 3 steps
        let mut e = engine(1, 3, config);
        let block = e.produce_block().unwrap();
        let dones: Vec<bool> = (0..6).map(|t| block.frame(0, t).done).collect();
        assert_eq!(dones, vec![false, false, true, false, false, true]);
        // the frame after the terminal one starts a new trajectory
        assert_eq!(block.frame(0, 2).step_count, 3);
        assert_eq!(block.frame(0, 3).step_count, 1);
        assert_ne!(block.frame(0, 2).traj_id, block.frame(0, 3).traj_id);
    }

    #[test]
    fn test_random_budget_gates_policy_queries() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(4)
            .with_init_random_frames(4)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        e.produce_block().unwrap();
        assert_eq!(e.policy_calls(), 0);
        e.produce_block().unwrap();
        assert_eq!(e.policy_calls(), 4);
    }

    #[test]
    fn test_worker_budget_override() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(4)
            .with_init_random_frames(100)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        e.set_init_random_frames(0);
        e.produce_block().unwrap();
        assert_eq!(e.policy_calls(), 4);
    }

    #[test]
    fn test_next_batch_stops_at_total_frames() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(200)
            .with_total_frames(1000)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        let mut batches = 0;
        while let Some(block) = e.next_batch().unwrap() {
            assert_eq!(block.frame_count(), 200);
            batches += 1;
        }
        assert_eq!(batches, 5);
        assert!(e.is_closed());
    }

    #[test]
    fn test_reset_at_each_iter_starts_fresh_trajectories() {
        let config = CollectorConfig::new()
            .with_frames_per_batch(4)
            .with_reset_at_each_iter(true)
            .with_seed(0);
        let mut e = engine(1, 0, config);
        let first_id = e.produce_block().unwrap().frame(0, 3).traj_id;
        let b = e.produce_block().unwrap();
        assert!(b.frame(0, 0).traj_id > first_id);
        assert_eq!(b.frame(0, 0).step_count, 1);
    }

    #[test]
    fn test_state_dict_round_trip_is_bit_identical() {
        let config = CollectorConfig::new().with_frames_per_batch(8).with_seed(3);
        let mut e = engine(1, 5, config.clone());
        e.produce_block().unwrap();
        let saved = e.state_dict();

        let reference: Block = e.produce_block().unwrap().clone();

        let mut restored = engine(1, 5, config);
        restored.produce_block().unwrap();
        restored.load_state_dict(&saved).unwrap();
        let replayed = restored.produce_block().unwrap().clone();

        assert_eq!(reference, replayed);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let config = CollectorConfig::new().with_frames_per_batch(2).with_seed(0);
        let mut e = engine(1, 0, config);
        e.shutdown();
        e.shutdown();
        assert!(e.is_closed());
        assert!(e.produce_block().is_err());
    }

    impl RolloutEngine<MockEnv, CountingPolicy> {
        fn policy_calls(&self) -> usize {
            self.policy.calls()
        }
    }
}
