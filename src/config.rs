/*!
 # Runtime configuration

 All tunables come from environment variables, usually supplied by the
 service supervisor through an environment file. Every value is optional;
 anything missing or malformed falls back to its default so a typo never
 keeps the strip from starting.
*/

use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::order::PixelOrder;

pub const PIXELS_KEY: &str = "RGBFAN_PIXELS";
pub const BRIGHTNESS_KEY: &str = "RGBFAN_BRIGHTNESS";
pub const FPS_KEY: &str = "RGBFAN_FPS";
pub const SPEED_KEY: &str = "RGBFAN_SPEED";
pub const PIXEL_ORDER_KEY: &str = "RGBFAN_PIXEL_ORDER";

/// Phase advance per tick before `speed_scale` is applied
pub const BASE_STEP: f32 = 2.0;

const MIN_SPEED_SCALE: f32 = 0.01;

/// Immutable animation settings, resolved once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Number of pixels on the strip (at least 1)
    pub pixel_count: usize,
    /// Output brightness (0.0-1.0)
    pub brightness: f32,
    /// Target frames per second (at least 1)
    pub frame_rate: u32,
    /// Multiplier for the per-tick phase advance (at least 0.01)
    pub speed_scale: f32,
    /// Channel order expected by the strip
    pub pixel_order: PixelOrder,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pixel_count: 2,
            brightness: 0.5,
            frame_rate: 100,
            speed_scale: 0.75,
            pixel_order: PixelOrder::Grb,
        }
    }
}

impl Config {
    /// Resolves the configuration from the process environment
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolves the configuration from an arbitrary key/value lookup
    #[instrument(skip(lookup))]
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let pixel_count = parse_or(&lookup, PIXELS_KEY, defaults.pixel_count).max(1);
        let brightness = parse_or(&lookup, BRIGHTNESS_KEY, defaults.brightness).clamp(0.0, 1.0);
        let frame_rate = parse_or(&lookup, FPS_KEY, defaults.frame_rate).max(1);
        let speed_scale = parse_or(&lookup, SPEED_KEY, defaults.speed_scale).max(MIN_SPEED_SCALE);
        let pixel_order = parse_or(&lookup, PIXEL_ORDER_KEY, defaults.pixel_order);

        let config = Self {
            pixel_count,
            brightness,
            frame_rate,
            speed_scale,
            pixel_order,
        };
        debug!(?config, "Configuration resolved");
        config
    }

    /// Time budget of a single frame
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate
    }

    /// Phase advance per tick
    pub fn step(&self) -> f32 {
        BASE_STEP * self.speed_scale
    }
}

/// Values whose parse result needs a sanity check beyond `FromStr`
trait Setting: FromStr {
    fn is_usable(&self) -> bool {
        true
    }
}

impl Setting for usize {}
impl Setting for u32 {}
impl Setting for PixelOrder {}

impl Setting for f32 {
    fn is_usable(&self) -> bool {
        self.is_finite()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: Setting + std::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value.is_usable() => value,
        _ => {
            info!(
                "Ignoring invalid value {:?} for {}, using default {:?}",
                raw, key, default
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(pairs: &[(&str, &str)]) -> Config {
        let source: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(|key| source.get(key).cloned())
    }

    #[test]
    fn empty_source_yields_defaults() {
        assert_eq!(resolve(&[]), Config::default());
        let config = Config::default();
        assert_eq!(config.pixel_count, 2);
        assert_eq!(config.brightness, 0.5);
        assert_eq!(config.frame_rate, 100);
        assert_eq!(config.speed_scale, 0.75);
        assert_eq!(config.pixel_order, PixelOrder::Grb);
    }

    #[test]
    fn reads_all_settings() {
        let config = resolve(&[
            (PIXELS_KEY, "12"),
            (BRIGHTNESS_KEY, "0.25"),
            (FPS_KEY, "60"),
            (SPEED_KEY, "1.5"),
            (PIXEL_ORDER_KEY, "rgb"),
        ]);
        assert_eq!(
            config,
            Config {
                pixel_count: 12,
                brightness: 0.25,
                frame_rate: 60,
                speed_scale: 1.5,
                pixel_order: PixelOrder::Rgb,
            }
        );
        assert_eq!(config.step(), 3.0);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let config = resolve(&[
            (PIXELS_KEY, "many"),
            (BRIGHTNESS_KEY, "bright"),
            (FPS_KEY, "fast"),
            (SPEED_KEY, "NaN"),
            (PIXEL_ORDER_KEY, "RGBW"),
        ]);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn values_are_clamped_into_range() {
        let config = resolve(&[
            (PIXELS_KEY, "0"),
            (BRIGHTNESS_KEY, "4.2"),
            (FPS_KEY, "0"),
            (SPEED_KEY, "-3"),
        ]);
        assert_eq!(config.pixel_count, 1);
        assert_eq!(config.brightness, 1.0);
        assert_eq!(config.frame_rate, 1);
        assert_eq!(config.speed_scale, MIN_SPEED_SCALE);

        let config = resolve(&[(BRIGHTNESS_KEY, "-0.3"), (SPEED_KEY, "0")]);
        assert_eq!(config.brightness, 0.0);
        assert!(config.speed_scale > 0.0);
    }

    #[test]
    fn negative_integers_are_malformed() {
        let config = resolve(&[(PIXELS_KEY, "-4"), (FPS_KEY, "-1")]);
        assert_eq!(config.pixel_count, 2);
        assert_eq!(config.frame_rate, 100);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let config = resolve(&[(FPS_KEY, " 30\n"), (PIXEL_ORDER_KEY, "  bgr ")]);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.pixel_order, PixelOrder::Bgr);
    }

    #[test]
    fn ranges_hold_for_arbitrary_inputs() {
        let inputs = [
            "", "0", "-1", "1", "0.5", "1e9", "-1e9", "inf", "-inf", "NaN", "abc", "255", "1.0001",
        ];
        for raw in inputs {
            let config = resolve(&[
                (PIXELS_KEY, raw),
                (BRIGHTNESS_KEY, raw),
                (FPS_KEY, raw),
                (SPEED_KEY, raw),
            ]);
            assert!((0.0..=1.0).contains(&config.brightness), "{raw}");
            assert!(config.frame_rate >= 1, "{raw}");
            assert!(config.speed_scale > 0.0, "{raw}");
            assert!(config.pixel_count >= 1, "{raw}");
        }
    }

    #[test]
    fn frame_period_matches_rate() {
        let config = resolve(&[(FPS_KEY, "50")]);
        assert_eq!(config.frame_period(), Duration::from_millis(20));
        assert_eq!(Config::default().frame_period(), Duration::from_millis(10));
    }
}
