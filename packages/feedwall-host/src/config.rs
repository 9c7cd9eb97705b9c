use std::time::Duration;

use clap::Parser;

use crate::resources::ResourceBase;

#[derive(Debug, Clone, Parser)]
#[command(name = "feedwall", version, about)]
pub struct Args {
    /// Directory or http(s) URL the module, roster and relative avatars are
    /// resolved against.
    ///
    /// Environment variable: `FEEDWALL_RESOURCES`.
    #[arg(long, env = "FEEDWALL_RESOURCES", default_value = ".")]
    resources: String,

    /// Compiled feed module, relative to the resource base.
    #[arg(long, env = "FEEDWALL_MODULE", default_value = "feed.wasm")]
    module: String,

    /// Roster (JSON array of people), relative to the resource base.
    #[arg(long, env = "FEEDWALL_ROSTER", default_value = "people.stage1.json")]
    roster: String,

    /// Delay between the end of one tick and the start of the next.
    #[arg(long, env = "FEEDWALL_TICK_INTERVAL_MS", default_value_t = 100)]
    tick_interval_ms: u64,

    /// Width the layout presets are spread across.
    #[arg(long, env = "FEEDWALL_VIEWPORT_WIDTH", default_value_t = 1920.0)]
    viewport_width: f64,

    /// Skip fetching every avatar at startup.
    #[arg(long)]
    no_preload: bool,

    /// Log filter (tracing-subscriber EnvFilter syntax). `RUST_LOG` wins when set.
    ///
    /// Environment variable: `FEEDWALL_LOG_LEVEL`.
    #[arg(long, env = "FEEDWALL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub resources: ResourceBase,
    pub module: String,
    pub roster: String,
    pub tick_interval: Duration,
    pub viewport_width: f64,
    pub preload: bool,
    pub log_level: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> anyhow::Result<Self> {
        anyhow::ensure!(
            args.viewport_width.is_finite() && args.viewport_width > 0.0,
            "viewport width must be positive, got {}",
            args.viewport_width
        );
        Ok(Self {
            resources: args.resources.parse()?,
            module: args.module,
            roster: args.roster,
            tick_interval: Duration::from_millis(args.tick_interval_ms),
            viewport_width: args.viewport_width,
            preload: !args.no_preload,
            log_level: args.log_level,
        })
    }
}
