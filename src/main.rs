use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use rgbfan::bus::DEFAULT_DEVICE;
use rgbfan::*;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::EnvFilter;

/// Rainbow animation daemon for WS2812 LED strips.
///
/// Animation settings are read from RGBFAN_PIXELS, RGBFAN_BRIGHTNESS,
/// RGBFAN_FPS, RGBFAN_SPEED and RGBFAN_PIXEL_ORDER.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// spidev node the strip is attached to
    #[arg(short, long, env = "RGBFAN_SPI_DEVICE", default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// Log frames instead of writing to the SPI device
    #[arg(long, env = "RGBFAN_DRY_RUN")]
    dry_run: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("rgbfan=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!(?cli, "Parsed command line arguments");

    // A wedged bus write must not keep the process alive past shutdown.
    shutdown::block_on(daemon(cli))??;

    info!("Shut down cleanly");
    Ok(())
}

async fn daemon(cli: Cli) -> Result<()> {
    let config = Config::from_env();

    let shutdown = Arc::new(ShutdownController::new());
    shutdown.clone().listen_for_signals()?;

    if cli.dry_run {
        info!("Dry run, frames are logged at trace level");
        let mut bus = LogBus::new();
        serve(&config, &mut bus, &shutdown).await?;
        info!("Wrote {} frames", bus.frames);
    } else {
        let mut bus = match SpiBus::open(&cli.device, config.pixel_count).await {
            Ok(bus) => bus,
            Err(e) => {
                error!("Failed to initialize bus: {}", e);
                return Err(e.into());
            }
        };
        serve(&config, &mut bus, &shutdown).await?;
    }

    Ok(())
}

#[instrument(skip_all)]
async fn serve<B: Bus>(config: &Config, bus: &mut B, shutdown: &ShutdownController) -> Result<()> {
    if let Err(e) = run(config, bus, shutdown).await {
        error!("Render loop failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}
