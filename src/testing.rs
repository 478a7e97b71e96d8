//! Deterministic mock collaborators shared across test modules.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::ExplorationMode;
use crate::core::state::RolloutState;
use crate::environment::{ResetMask, VectorizedEnv};
use crate::error::CollectorError;
use crate::policy::Policy;

pub(crate) const MOCK_OBS_SIZE: usize = 3;
pub(crate) const MOCK_ACTION_SIZE: usize = 1;

/// Deterministic vectorized environment.
///
/// Each lane counts its steps since reset; observations are a pure function
/// of (counter, lane, seed), rewards equal the counter, and a lane reports
/// done once its counter reaches `episode_len` (0 disables termination).
pub(crate) struct MockEnv {
    n_lanes: usize,
    episode_len: u32,
    counters: Vec<u32>,
    seed: u64,
}

impl MockEnv {
    pub(crate) fn new(n_lanes: usize, episode_len: u32) -> Self {
        Self {
            n_lanes,
            episode_len,
            counters: vec![0; n_lanes],
            seed: 0,
        }
    }

    fn write_obs(&self, lane: usize, state: &mut RolloutState) {
        let counter = self.counters[lane];
        let seed = self.seed;
        let obs = state.next_obs_mut(lane);
        obs[0] = counter as f32;
        obs[1] = lane as f32;
        obs[2] = seed as f32;
    }
}

impl VectorizedEnv for MockEnv {
    fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    fn obs_size(&self) -> usize {
        MOCK_OBS_SIZE
    }

    fn action_size(&self) -> usize {
        MOCK_ACTION_SIZE
    }

    fn reset(&mut self, mask: Option<&ResetMask>, state: &mut RolloutState) {
        for lane in 0..self.n_lanes {
            if mask.map_or(true, |m| m.is_set(lane)) {
                self.counters[lane] = 0;
                self.write_obs(lane, state);
                state.dones[lane] = false;
            }
        }
    }

    fn step(&mut self, state: &mut RolloutState) {
        for lane in 0..self.n_lanes {
            self.counters[lane] += 1;
            let counter = self.counters[lane];
            state.rewards[lane] = counter as f32;
            state.dones[lane] = self.episode_len > 0 && counter >= self.episode_len;
            self.write_obs(lane, state);
        }
    }

    fn rand_step(&mut self, state: &mut RolloutState, rng: &mut ChaCha8Rng) {
        for lane in 0..self.n_lanes {
            state.action_mut(lane)[0] = rng.gen_range(-1.0..1.0);
        }
        self.step(state);
    }

    fn set_seed(&mut self, seed: u64) -> u64 {
        self.seed = seed;
        seed + self.n_lanes as u64 - 1
    }

    fn state_dict(&self) -> Vec<u8> {
        let mut bytes = self.seed.to_le_bytes().to_vec();
        for counter in &self.counters {
            bytes.extend_from_slice(&counter.to_le_bytes());
        }
        bytes
    }

    fn load_state_dict(&mut self, blob: &[u8]) -> Result<(), CollectorError> {
        let expected = 8 + 4 * self.n_lanes;
        if blob.len() != expected {
            return Err(CollectorError::consistency(format!(
                "environment state blob has {} bytes, expected {}",
                blob.len(),
                expected
            )));
        }
        self.seed = u64::from_le_bytes(blob[..8].try_into().unwrap());
        for (lane, chunk) in blob[8..].chunks_exact(4).enumerate() {
            self.counters[lane] = u32::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(())
    }
}

/// Environment whose reset leaves the done flag set, violating the reset
/// contract.
pub(crate) struct BadResetEnv {
    n_lanes: usize,
}

impl BadResetEnv {
    pub(crate) fn new(n_lanes: usize) -> Self {
        Self { n_lanes }
    }
}

impl VectorizedEnv for BadResetEnv {
    fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    fn obs_size(&self) -> usize {
        1
    }

    fn action_size(&self) -> usize {
        1
    }

    fn reset(&mut self, mask: Option<&ResetMask>, state: &mut RolloutState) {
        for lane in 0..self.n_lanes {
            if mask.map_or(true, |m| m.is_set(lane)) {
                state.dones[lane] = true;
            }
        }
    }

    fn step(&mut self, state: &mut RolloutState) {
        for lane in 0..self.n_lanes {
            state.dones[lane] = true;
        }
    }

    fn rand_step(&mut self, state: &mut RolloutState, _rng: &mut ChaCha8Rng) {
        self.step(state);
    }

    fn set_seed(&mut self, seed: u64) -> u64 {
        seed
    }
}

/// Deterministic policy: action is the first observation component scaled
/// by a gain. Counts how often it is queried, which makes random warmup
/// gating observable.
pub(crate) struct CountingPolicy {
    gain: f32,
    calls: usize,
}

impl CountingPolicy {
    pub(crate) fn new() -> Self {
        Self {
            gain: 0.5,
            calls: 0,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls
    }
}

impl Policy for CountingPolicy {
    fn select_actions(&mut self, state: &mut RolloutState, _mode: ExplorationMode) {
        self.calls += 1;
        for lane in 0..state.n_lanes() {
            let value = state.obs(lane)[0];
            state.action_mut(lane)[0] = value * self.gain;
        }
    }

    fn state_dict(&self) -> Vec<u8> {
        self.gain.to_le_bytes().to_vec()
    }

    fn load_state_dict(&mut self, blob: &[u8]) -> Result<(), CollectorError> {
        if blob.len() != 4 {
            return Err(CollectorError::consistency(format!(
                "policy state blob has {} bytes, expected 4",
                blob.len()
            )));
        }
        self.gain = f32::from_le_bytes(blob.try_into().unwrap());
        Ok(())
    }
}

/// Initialize test logging once; later calls are no-ops.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
