use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use utils::Pos;
mod utils;

pub use color::Color;
mod color;

pub use config::{BlendPolicy, Config, ConfigError};
mod config;

pub use grid::{Cell, CellId, Grid, GridError};
mod grid;

pub use worker::{Worker, WorkerId};
mod worker;

pub use pool::{CellChange, Pool, PoolError, PoolHandle, Presenter, Report};
mod pool;

pub use view::View;
mod view;

/// random walkers bleeding color across a grid.
///
/// every setting left out falls back to its default.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// grid columns [default: 300]
    #[arg(long)]
    width: Option<usize>,
    /// grid rows [default: 300]
    #[arg(long)]
    height: Option<usize>,
    /// workers started right away [default: 3]
    #[arg(long)]
    workers: Option<usize>,
    /// no spawns beyond this many running workers [default: 5]
    #[arg(long)]
    max_workers: Option<usize>,
    /// every colored cell draws a number below this... [default: 100000]
    #[arg(long)]
    spawn_range: Option<u32>,
    /// ...and spawns a worker when it is below this [default: 2]
    #[arg(long)]
    spawn_band: Option<u32>,
    /// updates after which a cell is not walked onto anymore [default: 1]
    #[arg(long)]
    saturation: Option<u32>,
    /// steps per traversal [default: 300]
    #[arg(long)]
    depth_limit: Option<usize>,
    /// steps between opportunistic spreads, 0 disables them [default: 30]
    #[arg(long)]
    spread_interval: Option<usize>,
    /// share of edge cells one spread samples [default: 10]
    #[arg(long)]
    spread_percent: Option<u32>,
    /// upper bound of edge cells one spread samples [default: 100]
    #[arg(long)]
    spread_cap: Option<usize>,
    /// pause after every colored cell [default: 20]
    #[arg(long)]
    step_delay_ms: Option<u64>,
    /// what walking onto a colored cell does [default: blend]
    #[arg(long, value_enum)]
    policy: Option<BlendPolicy>,
    /// log progress instead of drawing the grid
    #[arg(long)]
    headless: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            initial_workers: self.workers.unwrap_or(defaults.initial_workers),
            max_workers: self.max_workers.unwrap_or(defaults.max_workers),
            spawn_range: self.spawn_range.unwrap_or(defaults.spawn_range),
            spawn_band: self.spawn_band.unwrap_or(defaults.spawn_band),
            saturation: self.saturation.unwrap_or(defaults.saturation),
            depth_limit: self.depth_limit.unwrap_or(defaults.depth_limit),
            spread_interval: self.spread_interval.unwrap_or(defaults.spread_interval),
            spread_percent: self.spread_percent.unwrap_or(defaults.spread_percent),
            spread_cap: self.spread_cap.unwrap_or(defaults.spread_cap),
            step_delay: self
                .step_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.step_delay),
            policy: self.policy.unwrap_or(defaults.policy),
        }
    }
}

/// logs go to stderr. the terminal view owns the screen, so only warnings
/// are shown there unless `RUST_LOG` says otherwise.
fn init_tracing(headless: bool) {
    let fallback = if headless { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.headless);

    let config = cli.config();
    let (width, height) = (config.width, config.height);

    let report = if cli.headless {
        let pool = Pool::spawn(config, view::Headless::default())
            .context("could not start the simulation")?;
        pool.join()?
    } else {
        let (painter, frames) = view::channel();
        let pool = Pool::spawn(config, painter).context("could not start the simulation")?;
        let view = View::spawn(pool.handle(), frames, width, height);

        let report = pool.join()?;
        view.join().context("terminal view failed")?;
        report
    };

    info!(
        spawned = report.spawned,
        notifications = report.notifications,
        stopped = report.stopped,
        "simulation over"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_defaults() {
        let cli = Cli::parse_from([
            "bleedfield",
            "--width",
            "40",
            "--saturation",
            "2",
            "--step-delay-ms",
            "0",
            "--policy",
            "overwrite",
        ]);
        let config = cli.config();
        assert_eq!(config.width, 40);
        assert_eq!(config.height, Config::default().height);
        assert_eq!(config.saturation, 2);
        assert_eq!(config.step_delay, Duration::ZERO);
        assert_eq!(config.policy, BlendPolicy::Overwrite);
        assert!(!cli.headless);
    }

    #[test]
    fn cli_without_arguments_is_the_default_config() {
        let cli = Cli::parse_from(["bleedfield"]);
        assert_eq!(cli.config(), Config::default());
    }
}
