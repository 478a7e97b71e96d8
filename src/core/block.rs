//! Fixed-length stacked frame blocks.
//!
//! A [`Block`] is the unit of transfer between a rollout engine and the
//! training consumer: a lane-major matrix of [`Frame`] snapshots, `t_len`
//! consecutive frames per lane. Lane identity is the outermost axis so that
//! per-worker blocks concatenate along the lane dimension when merged.

use crate::config::Device;
use crate::core::state::RolloutState;
use crate::error::CollectorError;

/// One (observation, action, reward, done) record for one lane at one step.
///
/// Frames are captured before any end-of-trajectory reset, so the terminal
/// frame of a trajectory is visible with `done` set and the step count the
/// trajectory ended at.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Observation the action was selected from.
    pub observation: Vec<f32>,
    /// Action applied on this step.
    pub action: Vec<f32>,
    /// Reward produced by this step.
    pub reward: f32,
    /// Whether the lane's episode ended on this step.
    pub done: bool,
    /// Trajectory identity at capture time.
    pub traj_id: u64,
    /// Steps since the trajectory's reset, counting this one.
    pub step_count: u32,
}

impl Frame {
    fn zeroed(obs_size: usize, action_size: usize) -> Self {
        Self {
            observation: vec![0.0; obs_size],
            action: vec![0.0; action_size],
            reward: 0.0,
            done: false,
            traj_id: 0,
            step_count: 0,
        }
    }
}

/// A stacked sequence of frames for a set of lanes.
///
/// Frames are stored lane-major: `frames[lane * t_len + t]`. The optional
/// validity mask (set on split output) marks padding frames invalid and
/// changes what [`frame_count`](Self::frame_count) reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    frames: Vec<Frame>,
    n_lanes: usize,
    t_len: usize,
    /// Placement tag of the buffer this block was produced into.
    pub device: Device,
    /// Lane-major validity mask. `None` means every frame is valid.
    pub mask: Option<Vec<bool>>,
}

impl Block {
    /// Create a zeroed block buffer, ready for in-place refresh.
    pub fn new(
        n_lanes: usize,
        t_len: usize,
        obs_size: usize,
        action_size: usize,
        device: Device,
    ) -> Self {
        Self {
            frames: vec![Frame::zeroed(obs_size, action_size); n_lanes * t_len],
            n_lanes,
            t_len,
            device,
            mask: None,
        }
    }

    /// Build a block from pre-assembled frames. `frames.len()` must equal
    /// `n_lanes * t_len`; the mask, when given, must match.
    pub fn from_frames(
        frames: Vec<Frame>,
        n_lanes: usize,
        t_len: usize,
        device: Device,
        mask: Option<Vec<bool>>,
    ) -> Self {
        debug_assert_eq!(frames.len(), n_lanes * t_len);
        if let Some(mask) = &mask {
            debug_assert_eq!(mask.len(), frames.len());
        }
        Self {
            frames,
            n_lanes,
            t_len,
            device,
            mask,
        }
    }

    /// Number of lanes.
    pub fn n_lanes(&self) -> usize {
        self.n_lanes
    }

    /// Frames per lane.
    pub fn t_len(&self) -> usize {
        self.t_len
    }

    /// Frame at (lane, t).
    pub fn frame(&self, lane: usize, t: usize) -> &Frame {
        &self.frames[lane * self.t_len + t]
    }

    /// All frames, lane-major.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of valid frames: masked count when a mask is present, total
    /// element count otherwise.
    pub fn frame_count(&self) -> usize {
        match &self.mask {
            Some(mask) => mask.iter().filter(|&&valid| valid).count(),
            None => self.n_lanes * self.t_len,
        }
    }

    /// Snapshot the live state into time column `t`, refreshing this buffer
    /// in place.
    pub fn record_step(&mut self, t: usize, state: &RolloutState) {
        debug_assert!(t < self.t_len);
        for lane in 0..self.n_lanes {
            let frame = &mut self.frames[lane * self.t_len + t];
            frame.observation.copy_from_slice(state.obs(lane));
            frame.action.copy_from_slice(state.action(lane));
            frame.reward = state.rewards[lane];
            frame.done = state.dones[lane];
            frame.traj_id = state.traj_ids[lane];
            frame.step_count = state.step_counts[lane];
        }
    }

    /// Highest trajectory id in the block.
    pub fn max_traj_id(&self) -> u64 {
        self.frames.iter().map(|f| f.traj_id).max().unwrap_or(0)
    }

    /// Add `offset` to every frame's trajectory id. Used by coordinators to
    /// renumber per-worker blocks into a globally unique id space.
    pub fn shift_traj_ids(&mut self, offset: u64) {
        if offset == 0 {
            return;
        }
        for frame in &mut self.frames {
            frame.traj_id += offset;
        }
    }

    /// Concatenate blocks along the lane axis, preserving input order.
    ///
    /// All blocks must share the same time length; a mismatch means the
    /// producers disagree on batch shape and is a consistency error.
    pub fn concat(blocks: Vec<Block>) -> Result<Block, CollectorError> {
        let mut iter = blocks.into_iter();
        let first = iter.next().ok_or_else(|| {
            CollectorError::consistency("cannot concatenate an empty set of blocks")
        })?;
        let t_len = first.t_len;
        let device = first.device;
        let mut n_lanes = first.n_lanes;
        let mut frames = first.frames;
        for block in iter {
            if block.t_len != t_len {
                return Err(CollectorError::consistency(format!(
                    "cannot concatenate blocks with time lengths {} and {}",
                    t_len, block.t_len
                )));
            }
            n_lanes += block.n_lanes;
            frames.extend(block.frames);
        }
        Ok(Block {
            frames,
            n_lanes,
            t_len,
            device,
            mask: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with_ids(ids: &[u64], t_len: usize) -> Block {
        let mut frames = Vec::new();
        for &id in ids {
            for t in 0..t_len {
                let mut f = Frame::zeroed(1, 1);
                f.traj_id = id;
                f.step_count = t as u32 + 1;
                frames.push(f);
            }
        }
        Block::from_frames(frames, ids.len(), t_len, Device::Cpu, None)
    }

    #[test]
    fn test_record_step_snapshots_state() {
        let mut state = RolloutState::new(2, 2, 1);
        state.next_obs_mut(0).copy_from_slice(&[1.0, 2.0]);
        state.advance();
        state.action_mut(1)[0] = 0.5;
        state.rewards[0] = 1.5;
        state.dones[1] = true;
        state.traj_ids = vec![3, 4];
        state.step_counts = vec![10, 20];

        let mut block = Block::new(2, 3, 2, 1, Device::Cpu);
        block.record_step(1, &state);

        let f0 = block.frame(0, 1);
        assert_eq!(f0.observation, vec![1.0, 2.0]);
        assert_eq!(f0.reward, 1.5);
        assert_eq!(f0.traj_id, 3);
        assert_eq!(f0.step_count, 10);

        let f1 = block.frame(1, 1);
        assert_eq!(f1.action, vec![0.5]);
        assert!(f1.done);
        assert_eq!(f1.traj_id, 4);
    }

    #[test]
    fn test_frame_count_respects_mask() {
        let mut block = block_with_ids(&[0, 1], 4);
        assert_eq!(block.frame_count(), 8);
        block.mask = Some(vec![true, true, false, false, true, false, false, false]);
        assert_eq!(block.frame_count(), 3);
    }

    #[test]
    fn test_shift_traj_ids() {
        let mut block = block_with_ids(&[0, 2], 2);
        block.shift_traj_ids(5);
        assert_eq!(block.frame(0, 0).traj_id, 5);
        assert_eq!(block.frame(1, 0).traj_id, 7);
        assert_eq!(block.max_traj_id(), 7);
    }

    #[test]
    fn test_concat_preserves_order() {
        let a = block_with_ids(&[0, 1], 2);
        let b = block_with_ids(&[2], 2);
        let merged = Block::concat(vec![a, b]).unwrap();
        assert_eq!(merged.n_lanes(), 3);
        assert_eq!(merged.t_len(), 2);
        assert_eq!(merged.frame(0, 0).traj_id, 0);
        assert_eq!(merged.frame(2, 0).traj_id, 2);
        assert_eq!(merged.frame_count(), 6);
    }

    #[test]
    fn test_concat_rejects_time_mismatch() {
        let a = block_with_ids(&[0], 2);
        let b = block_with_ids(&[1], 3);
        assert!(Block::concat(vec![a, b]).is_err());
    }
}
