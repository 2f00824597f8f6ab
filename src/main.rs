use anyhow::Context;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tile_streamer::config::{CliArgs, LogFormat, ViewerConfig};
use tile_streamer::externals::RayonTaskProcessor;
use tile_streamer::viewer::{Viewer, local_externals};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let filter = if args.verbose {
        EnvFilter::new("tile_streamer=debug")
    } else {
        EnvFilter::new("tile_streamer=info")
    };
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    let config: ViewerConfig = args.into();

    let workers = match config.threads {
        Some(threads) => RayonTaskProcessor::with_threads(threads)
            .context("Failed to configure tile loader thread pool")?,
        None => RayonTaskProcessor::global(),
    };

    match Viewer::run(&config, local_externals(workers)) {
        Ok(result) => {
            println!(
                "Done: {} tiles rendered, {} vertices resident, {} failures after {} frames in {:.2}s{}",
                result.tiles_rendered,
                result.resident_vertices,
                result.failures,
                result.frames,
                result.duration.as_secs_f64(),
                if result.settled { "" } else { " (still loading)" }
            );
            Ok(())
        }
        Err(e) => {
            error!(%e, "Viewer failed");
            Err(anyhow::anyhow!(e)).context("tile-streamer viewer failed")
        }
    }
}
