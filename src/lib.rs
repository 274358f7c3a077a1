/*!
 # rgbfan: rainbow animation for WS2812 LED strips

 A small daemon library that renders a traveling color-wheel rainbow onto an
 addressable LED strip attached to a Linux SPI bus.

 ## Features

 * Environment based configuration with safe defaults
 * Exact 8-bit color wheel
 * All six RGB channel orders
 * Frame pacing with per-pixel phase offset
 * Graceful shutdown that turns every pixel off

 ## Example

 ```no_run
 use std::sync::Arc;
 use rgbfan::*;

 fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
     tracing_subscriber::fmt::init();

     let config = Config::from_env();
     shutdown::block_on(async {
         let mut bus = SpiBus::open("/dev/spidev0.0", config.pixel_count).await?;

         let shutdown = Arc::new(ShutdownController::new());
         shutdown.clone().listen_for_signals()?;

         run(&config, &mut bus, &shutdown).await
     })??;
     Ok(())
 }
 ```
*/

use std::time::Duration;

use thiserror::Error;

/// Error types for the LED strip driver
#[derive(Error, Debug)]
pub enum Error {
    /// The bus device could not be opened
    #[error("SPI bus {device} is unavailable: {source}")]
    BusUnavailable {
        device: String,
        #[source]
        source: std::io::Error,
    },

    /// A full frame does not fit into one bus transfer
    #[error("{pixels} pixels need {bytes} bytes per frame, the bus accepts at most {limit}")]
    FrameTooLarge {
        pixels: usize,
        bytes: usize,
        limit: usize,
    },

    /// Writing a frame to the bus failed
    #[error("bus write failed: {0}")]
    BusWrite(#[source] std::io::Error),

    /// Termination signal handlers could not be installed
    #[error("cannot listen for termination signals: {0}")]
    SignalSetup(#[source] std::io::Error),

    /// The all-off write did not finish in time
    #[error("all-off write did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod bus;
pub mod config;
pub mod order;
pub mod scheduler;
pub mod shutdown;
pub mod wheel;

pub use bus::{encode, encoded_len, Bus, LogBus, SpiBus};
pub use config::Config;
pub use order::{PixelOrder, UnknownPixelOrder};
pub use scheduler::{run, Animation};
pub use shutdown::{ShutdownController, ShutdownState, SHUTDOWN_WRITE_TIMEOUT};
pub use smart_leds::RGB8;
pub use wheel::{scale, wheel};
