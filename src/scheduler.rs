/*!
 # Frame scheduler

 Owns the animation phase and drives the render loop: build a frame, push
 it to the bus, advance the phase, sleep for one frame period. The loop
 checks for shutdown before every frame and while sleeping, so stopping
 takes at most one frame period.
*/

use tokio::time;
use tracing::{debug, error, info, instrument, trace};

use crate::bus::Bus;
use crate::config::Config;
use crate::shutdown::ShutdownController;
use crate::wheel::{scale, wheel};
use crate::Result;

/// Number of wheel positions in a full hue cycle
pub const WHEEL_SIZE: f32 = 256.0;

/// Wheel distance between neighbouring pixels
pub const PIXEL_PHASE_OFFSET: u32 = 32;

/// Rainbow animation state
#[derive(Debug, Clone)]
pub struct Animation {
    config: Config,
    frame: f32,
}

impl Animation {
    pub fn new(config: Config) -> Self {
        Self { config, frame: 0.0 }
    }

    /// Starts the animation at an arbitrary phase, wrapped into the wheel
    pub fn with_frame(config: Config, frame: f32) -> Self {
        Self {
            config,
            frame: wrap(frame),
        }
    }

    /// Current wheel phase, always in `[0, 256)`
    pub fn frame(&self) -> f32 {
        self.frame
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wheel position for pixel `index` at the current phase
    pub fn hue_position(&self, index: usize) -> u8 {
        // u32 wraps at a multiple of 256, so wrapping keeps the result exact.
        let offset = (index as u32).wrapping_mul(PIXEL_PHASE_OFFSET);
        ((self.frame.floor() as u32).wrapping_add(offset) % 256) as u8
    }

    /// Builds the current frame: wheel color, brightness, channel order.
    pub fn render(&self) -> Vec<[u8; 3]> {
        (0..self.config.pixel_count)
            .map(|i| {
                let color = scale(wheel(self.hue_position(i)), self.config.brightness);
                self.config.pixel_order.apply(color)
            })
            .collect()
    }

    /// Moves the phase forward by one tick
    pub fn advance(&mut self) {
        self.frame = wrap(self.frame + self.config.step());
    }
}

fn wrap(frame: f32) -> f32 {
    let wrapped = frame.rem_euclid(WHEEL_SIZE);
    // rem_euclid can round up to exactly 256.0 for tiny negative inputs
    if wrapped >= WHEEL_SIZE {
        0.0
    } else {
        wrapped
    }
}

/// Runs the rainbow until `shutdown` is requested or the bus fails.
///
/// Pixels are turned off before returning in both cases. A bus write
/// failure is returned after the all-off attempt; a requested shutdown
/// returns `Ok` even when the all-off write itself failed.
#[instrument(skip_all, fields(pixels = config.pixel_count, fps = config.frame_rate))]
pub async fn run<B: Bus>(config: &Config, bus: &mut B, shutdown: &ShutdownController) -> Result<()> {
    let mut animation = Animation::new(config.clone());
    let period = config.frame_period();
    let mut ticks: u64 = 0;

    info!(
        "Starting rainbow: {} pixels, {} order, brightness {}, {} fps, speed {}",
        config.pixel_count,
        config.pixel_order,
        config.brightness,
        config.frame_rate,
        config.speed_scale
    );

    while !shutdown.is_stopping() {
        let pixels = animation.render();
        trace!(tick = ticks, frame = animation.frame(), "Writing frame");

        if let Err(e) = bus.write(&pixels).await {
            error!("Frame write failed after {} ticks: {}", ticks, e);
            let _ = ShutdownController::all_off_bounded(bus, config.pixel_count).await;
            return Err(e);
        }

        animation.advance();
        ticks += 1;

        tokio::select! {
            _ = time::sleep(period) => {}
            _ = shutdown.stopped() => debug!("Sleep interrupted by shutdown"),
        }
    }

    info!("Render loop stopped after {} ticks", ticks);
    if let Err(e) = ShutdownController::all_off_bounded(bus, config.pixel_count).await {
        error!("Could not turn pixels off during shutdown: {}", e);
    }
    Ok(())
}
