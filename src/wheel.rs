/*!
 # Color wheel

 Maps an 8-bit wheel position onto a fully saturated hue. Sweeping the
 position from 0 to 255 walks red, green, blue and back to red.
*/

use smart_leds::RGB8;

/// Returns the wheel color for `position`.
///
/// The inverted position is split into three bands of 85 steps, each
/// crossfading between two primaries.
pub fn wheel(position: u8) -> RGB8 {
    let p = 255 - position;
    if p < 85 {
        return (255 - p * 3, 0, p * 3).into();
    }
    if p < 170 {
        let p = p - 85;
        return (0, p * 3, 255 - p * 3).into();
    }
    let p = p - 170;
    (p * 3, 255 - p * 3, 0).into()
}

/// Scales every channel linearly by `brightness` (0.0-1.0), truncating.
pub fn scale(color: RGB8, brightness: f32) -> RGB8 {
    let brightness = brightness.clamp(0.0, 1.0);
    let channel = |c: u8| (f32::from(c) * brightness) as u8;
    RGB8::new(channel(color.r), channel(color.g), channel(color.b))
}
