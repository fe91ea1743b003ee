use anyhow::Context;
use clap::Parser;
use cyclops::{Config, Scheduler};
use log::{LevelFilter, info};
use std::path::PathBuf;

/// Tracks the largest circle of a configured color in a video stream.
#[derive(Parser, Debug)]
#[command(name = "cyclops", version)]
struct Cli {
    /// Path to config file. Defaults to config.yaml in /etc/cyclops, $HOME/.cyclops or the working directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error, off). RUST_LOG overrides it.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let level: LevelFilter = level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level `{level}`"))?;
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::load(cli.config.as_deref()).context("error loading configuration")?;
    info!(
        "capture {} at {}x{} every {:?}",
        config.capture.device, config.capture.width, config.capture.height, config.capture.interval
    );
    info!(
        "hue {}..={}, saturation {}..={}, value {}..={}, blur {}, erosion {}",
        config.threshold.min_hue,
        config.threshold.max_hue,
        config.threshold.min_saturation,
        config.threshold.max_saturation,
        config.threshold.min_value,
        config.threshold.max_value,
        config.morph.blur,
        config.morph.erosion
    );

    let mut scheduler =
        Scheduler::open(&config, std::io::stdout().lock()).context("error initializing capture device")?;
    scheduler.run().await.context("pipeline stopped")?;
    Ok(())
}
