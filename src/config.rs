use std::time::Duration;

use thiserror::Error;

/// what a walking worker does when it steps onto a cell that already has a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BlendPolicy {
    /// mix the walker's color with the one already there.
    #[default]
    Blend,
    /// recompute the cell from its surroundings, dropping its own color.
    Overwrite,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },
    #[error("at least one initial worker is required")]
    NoWorkers,
    #[error("saturation threshold must be at least 1")]
    ZeroSaturation,
    #[error("depth limit must be at least 1")]
    ZeroDepthLimit,
    #[error("spawn range must be at least 1")]
    ZeroSpawnRange,
    #[error("spawn band {band} is wider than the spawn range {range}")]
    SpawnBand { band: u32, range: u32 },
    #[error("spread percent must be within 0..=100, got {0}")]
    SpreadPercent(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub width: usize,
    pub height: usize,
    pub initial_workers: usize,
    /// no spawn happens while this many workers are running.
    pub max_workers: usize,
    /// each change notification draws from `0..spawn_range`...
    pub spawn_range: u32,
    /// ...and spawns a worker when the draw lands below `spawn_band`.
    pub spawn_band: u32,
    /// updates after which a cell is no longer walked onto.
    pub saturation: u32,
    /// steps one traversal may take before it is wrapped up.
    pub depth_limit: usize,
    /// an opportunistic spread runs every that many steps, 0 disables it.
    pub spread_interval: usize,
    pub spread_percent: u32,
    pub spread_cap: usize,
    /// pause after every mutation.
    pub step_delay: Duration,
    pub policy: BlendPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 300,
            height: 300,
            initial_workers: 3,
            max_workers: 5,
            spawn_range: 100_000,
            spawn_band: 2,
            saturation: 1,
            depth_limit: 300,
            spread_interval: 30,
            spread_percent: 10,
            spread_cap: 100,
            step_delay: Duration::from_millis(20),
            policy: BlendPolicy::Blend,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        if self.initial_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.saturation == 0 {
            return Err(ConfigError::ZeroSaturation);
        }
        if self.depth_limit == 0 {
            return Err(ConfigError::ZeroDepthLimit);
        }
        if self.spawn_range == 0 {
            return Err(ConfigError::ZeroSpawnRange);
        }
        if self.spawn_band > self.spawn_range {
            return Err(ConfigError::SpawnBand {
                band: self.spawn_band,
                range: self.spawn_range,
            });
        }
        if self.spread_percent > 100 {
            return Err(ConfigError::SpreadPercent(self.spread_percent));
        }
        Ok(())
    }

    /// how many edge cells one spread pass samples out of `edges`.
    pub fn spread_sample(&self, edges: usize) -> usize {
        let share = (edges * self.spread_percent as usize).div_ceil(100);
        share.min(self.spread_cap)
    }
}
