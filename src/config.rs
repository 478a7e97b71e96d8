//! Collector configuration.
//!
//! Follows the builder-style config pattern used across the crate: a plain
//! struct with a `Default` impl and `with_*` methods, validated eagerly into
//! [`CollectorError::Config`] before any worker is spawned.

use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

/// Placement tag for a policy or an output buffer.
///
/// Collectors do not perform tensor math; the tag selects which weight slot
/// a worker reads from and labels the blocks it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Device {
    /// Host memory.
    Cpu,
    /// Accelerator with an ordinal.
    Cuda(u32),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

/// Device assignment for a set of workers: one shared value, or one entry
/// per worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSpec {
    /// Every worker gets the same device.
    Uniform(Device),
    /// One device per worker, matched by index.
    PerWorker(Vec<Device>),
}

impl Default for DeviceSpec {
    fn default() -> Self {
        Self::Uniform(Device::Cpu)
    }
}

impl DeviceSpec {
    /// Resolve to one device per worker.
    ///
    /// A per-worker list whose length does not match `n_workers` is a
    /// configuration error.
    pub fn resolve(&self, n_workers: usize) -> Result<Vec<Device>, CollectorError> {
        match self {
            Self::Uniform(device) => Ok(vec![*device; n_workers]),
            Self::PerWorker(devices) => {
                if devices.len() != n_workers {
                    return Err(CollectorError::config(format!(
                        "device list length {} does not match worker count {}",
                        devices.len(),
                        n_workers
                    )));
                }
                Ok(devices.clone())
            }
        }
    }
}

/// How the policy should act when queried during collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExplorationMode {
    /// Sample from the policy's action distribution.
    #[default]
    Random,
    /// Take the mode of the action distribution.
    Mode,
    /// Take the mean of the action distribution.
    Mean,
    /// Use the raw network output.
    NetOutput,
}

/// Configuration shared by all collector disciplines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Lower bound on the total number of frames collected over the run.
    /// `u64::MAX` means unbounded.
    pub total_frames: u64,
    /// Number of frames per yielded batch, summed across lanes. The sync
    /// discipline divides this across workers; the async discipline gives
    /// each worker the full value.
    pub frames_per_batch: usize,
    /// Maximum steps per trajectory before a forced reset. 0 disables the
    /// cap. A trajectory may span several batches.
    pub max_frames_per_traj: u32,
    /// Number of initial frames collected with random actions before the
    /// policy is queried. 0 disables random warmup.
    pub init_random_frames: u64,
    /// Reset every lane at the start of each batch.
    pub reset_at_each_iter: bool,
    /// Reshape yielded batches into padded per-trajectory segments.
    pub split_trajs: bool,
    /// Probabilistically truncate initial trajectories early to
    /// desynchronize lane phase. Only effective when `max_frames_per_traj`
    /// is set.
    pub init_with_lag: bool,
    /// Interaction mode passed to the policy when collecting.
    pub exploration_mode: ExplorationMode,
    /// Push fresh policy weights to every worker before each batch.
    pub update_at_each_batch: bool,
    /// Seed applied to every worker's environment and RNG at construction.
    /// Use `set_seed` on the collector for sequential per-worker seeding.
    pub seed: Option<u64>,
    /// Device assignment for worker policies.
    pub devices: DeviceSpec,
    /// Device assignment for worker output blocks.
    pub passing_devices: DeviceSpec,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            total_frames: u64::MAX,
            frames_per_batch: 200,
            max_frames_per_traj: 0,
            init_random_frames: 0,
            reset_at_each_iter: false,
            split_trajs: false,
            init_with_lag: false,
            exploration_mode: ExplorationMode::default(),
            update_at_each_batch: false,
            seed: None,
            devices: DeviceSpec::default(),
            passing_devices: DeviceSpec::default(),
        }
    }
}

impl CollectorConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total frame target.
    pub fn with_total_frames(mut self, total_frames: u64) -> Self {
        self.total_frames = total_frames;
        self
    }

    /// Set the number of frames per batch.
    pub fn with_frames_per_batch(mut self, frames_per_batch: usize) -> Self {
        self.frames_per_batch = frames_per_batch;
        self
    }

    /// Set the per-trajectory step cap.
    pub fn with_max_frames_per_traj(mut self, max_frames_per_traj: u32) -> Self {
        self.max_frames_per_traj = max_frames_per_traj;
        self
    }

    /// Set the random warmup frame budget.
    pub fn with_init_random_frames(mut self, init_random_frames: u64) -> Self {
        self.init_random_frames = init_random_frames;
        self
    }

    /// Reset all lanes at the start of each batch.
    pub fn with_reset_at_each_iter(mut self, reset_at_each_iter: bool) -> Self {
        self.reset_at_each_iter = reset_at_each_iter;
        self
    }

    /// Split yielded batches into padded per-trajectory segments.
    pub fn with_split_trajs(mut self, split_trajs: bool) -> Self {
        self.split_trajs = split_trajs;
        self
    }

    /// Desynchronize initial trajectories with random early resets.
    pub fn with_init_with_lag(mut self, init_with_lag: bool) -> Self {
        self.init_with_lag = init_with_lag;
        self
    }

    /// Set the exploration mode.
    pub fn with_exploration_mode(mut self, exploration_mode: ExplorationMode) -> Self {
        self.exploration_mode = exploration_mode;
        self
    }

    /// Push policy weights before each batch.
    pub fn with_update_at_each_batch(mut self, update_at_each_batch: bool) -> Self {
        self.update_at_each_batch = update_at_each_batch;
        self
    }

    /// Set the construction-time seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the policy device assignment.
    pub fn with_devices(mut self, devices: DeviceSpec) -> Self {
        self.devices = devices;
        self
    }

    /// Set the output device assignment.
    pub fn with_passing_devices(mut self, passing_devices: DeviceSpec) -> Self {
        self.passing_devices = passing_devices;
        self
    }

    /// Validate against a worker count. Called by collectors before any
    /// worker is spawned.
    pub fn validate(&self, n_workers: usize) -> Result<(), CollectorError> {
        if n_workers == 0 {
            return Err(CollectorError::config("at least one worker is required"));
        }
        if self.frames_per_batch == 0 {
            return Err(CollectorError::config(
                "frames_per_batch must be positive, zero-length batches are not collectable",
            ));
        }
        if self.reset_at_each_iter && self.split_trajs {
            return Err(CollectorError::config(
                "reset_at_each_iter and split_trajs are incompatible: per-batch resets make \
                 trajectory segment shapes unpredictable",
            ));
        }
        self.devices.resolve(n_workers)?;
        self.passing_devices.resolve(n_workers)?;
        Ok(())
    }

    /// Per-worker frame share for one batch under the sync discipline.
    pub fn frames_per_batch_worker(&self, n_workers: usize) -> usize {
        (self.frames_per_batch + n_workers - 1) / n_workers
    }

    /// Per-worker share of the total frame target under the async
    /// discipline.
    pub fn frames_per_worker(&self, n_workers: usize) -> u64 {
        if self.total_frames == u64::MAX {
            u64::MAX
        } else {
            (self.total_frames + n_workers as u64 - 1) / n_workers as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CollectorConfig::new()
            .with_total_frames(1000)
            .with_frames_per_batch(200)
            .with_max_frames_per_traj(50)
            .with_init_random_frames(64)
            .with_seed(7);

        assert_eq!(config.total_frames, 1000);
        assert_eq!(config.frames_per_batch, 200);
        assert_eq!(config.max_frames_per_traj, 50);
        assert_eq!(config.init_random_frames, 64);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_device_spec_uniform_resolve() {
        let spec = DeviceSpec::Uniform(Device::Cuda(1));
        let devices = spec.resolve(3).unwrap();
        assert_eq!(devices, vec![Device::Cuda(1); 3]);
    }

    #[test]
    fn test_device_spec_length_mismatch() {
        let spec = DeviceSpec::PerWorker(vec![Device::Cpu, Device::Cuda(0)]);
        assert!(spec.resolve(3).is_err());
        assert!(spec.resolve(2).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = CollectorConfig::new().with_frames_per_batch(0);
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_validate_rejects_reset_plus_split() {
        let config = CollectorConfig::new()
            .with_reset_at_each_iter(true)
            .with_split_trajs(true);
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = CollectorConfig::new();
        assert!(config.validate(0).is_err());
    }

    #[test]
    fn test_frames_per_batch_worker_rounds_up() {
        let config = CollectorConfig::new().with_frames_per_batch(100);
        assert_eq!(config.frames_per_batch_worker(3), 34);
        assert_eq!(config.frames_per_batch_worker(4), 25);
        assert_eq!(config.frames_per_batch_worker(1), 100);
    }

    #[test]
    fn test_frames_per_worker_unbounded() {
        let config = CollectorConfig::new();
        assert_eq!(config.frames_per_worker(4), u64::MAX);

        let config = config.with_total_frames(500);
        assert_eq!(config.frames_per_worker(3), 167);
    }
}
