//! Trajectory splitting.
//!
//! Reshapes a collected block into padded per-trajectory segments: one
//! output lane per trajectory, padded to the longest segment, with a
//! validity mask marking real frames. Consumers that train on whole
//! trajectories read segments; frame accounting uses the mask so padding
//! is never credited.

use crate::core::block::{Block, Frame};

/// Split a block into padded per-trajectory segments.
///
/// Segments are ordered by source lane, then by time within the lane, so
/// output order is deterministic. The returned block has one lane per
/// trajectory, time length equal to the longest segment, and a validity
/// mask; [`frame_count`](Block::frame_count) on the result counts only
/// real frames.
pub fn split_trajectories(block: &Block) -> Block {
    let mut segments: Vec<Vec<Frame>> = Vec::new();
    for lane in 0..block.n_lanes() {
        let mut current: Vec<Frame> = Vec::new();
        for t in 0..block.t_len() {
            let frame = block.frame(lane, t);
            if let Some(last) = current.last() {
                if last.traj_id != frame.traj_id {
                    segments.push(std::mem::take(&mut current));
                }
            }
            current.push(frame.clone());
        }
        if !current.is_empty() {
            segments.push(current);
        }
    }

    let max_len = segments.iter().map(|s| s.len()).max().unwrap_or(0);
    let n_segments = segments.len();
    let mut frames = Vec::with_capacity(n_segments * max_len);
    let mut mask = Vec::with_capacity(n_segments * max_len);
    for segment in segments {
        let valid = segment.len();
        let pad_template = pad_frame(&segment[0]);
        frames.extend(segment);
        mask.extend(std::iter::repeat(true).take(valid));
        for _ in valid..max_len {
            frames.push(pad_template.clone());
            mask.push(false);
        }
    }

    Block::from_frames(frames, n_segments, max_len, block.device, Some(mask))
}

fn pad_frame(template: &Frame) -> Frame {
    Frame {
        observation: vec![0.0; template.observation.len()],
        action: vec![0.0; template.action.len()],
        reward: 0.0,
        done: false,
        traj_id: template.traj_id,
        step_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;

    fn frame(traj_id: u64, step_count: u32) -> Frame {
        Frame {
            observation: vec![traj_id as f32],
            action: vec![0.0],
            reward: 1.0,
            done: false,
            traj_id,
            step_count,
        }
    }

    #[test]
    fn test_split_single_trajectory_is_identity_shaped() {
        let frames = vec![frame(0, 1), frame(0, 2), frame(0, 3)];
        let block = Block::from_frames(frames, 1, 3, Device::Cpu, None);
        let split = split_trajectories(&block);
        assert_eq!(split.n_lanes(), 1);
        assert_eq!(split.t_len(), 3);
        assert_eq!(split.frame_count(), 3);
    }

    #[test]
    fn test_split_pads_to_longest_segment() {
        // lane 0: traj 0 for 3 frames, then traj 2 for 1 frame
        let frames = vec![frame(0, 1), frame(0, 2), frame(0, 3), frame(2, 1)];
        let block = Block::from_frames(frames, 1, 4, Device::Cpu, None);
        let split = split_trajectories(&block);

        assert_eq!(split.n_lanes(), 2);
        assert_eq!(split.t_len(), 3);
        // 4 valid frames, 2 padding
        assert_eq!(split.frame_count(), 4);
        let mask = split.mask.as_ref().unwrap();
        assert_eq!(mask, &vec![true, true, true, true, false, false]);
        // padding keeps the segment's trajectory id but carries no data
        assert_eq!(split.frame(1, 1).traj_id, 2);
        assert_eq!(split.frame(1, 1).reward, 0.0);
    }

    #[test]
    fn test_split_orders_segments_by_lane_then_time() {
        // lane 0: traj 0 then traj 2; lane 1: traj 1 throughout
        let frames = vec![frame(0, 1), frame(2, 1), frame(1, 1), frame(1, 2)];
        let block = Block::from_frames(frames, 2, 2, Device::Cpu, None);
        let split = split_trajectories(&block);

        assert_eq!(split.n_lanes(), 3);
        assert_eq!(split.frame(0, 0).traj_id, 0);
        assert_eq!(split.frame(1, 0).traj_id, 2);
        assert_eq!(split.frame(2, 0).traj_id, 1);
    }
}
