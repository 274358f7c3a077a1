/*!
 # Pixel channel order

 WS2812-class chipsets disagree on the byte order they expect on the wire.
 [`PixelOrder`] moves a logical [`RGB8`] color into that physical order.
*/

use std::fmt;
use std::str::FromStr;

use smart_leds::RGB8;
use thiserror::Error;

/// Physical channel order of a strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelOrder {
    Rgb,
    Rbg,
    /// Order used by most WS2812B strips
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

/// Returned when a string names none of the six channel orders
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown pixel order {0:?}")]
pub struct UnknownPixelOrder(pub String);

impl PixelOrder {
    pub const ALL: [PixelOrder; 6] = [
        PixelOrder::Rgb,
        PixelOrder::Rbg,
        PixelOrder::Grb,
        PixelOrder::Gbr,
        PixelOrder::Brg,
        PixelOrder::Bgr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PixelOrder::Rgb => "RGB",
            PixelOrder::Rbg => "RBG",
            PixelOrder::Grb => "GRB",
            PixelOrder::Gbr => "GBR",
            PixelOrder::Brg => "BRG",
            PixelOrder::Bgr => "BGR",
        }
    }

    /// Returns the bytes of `color` in the order they go on the wire.
    pub fn apply(self, color: RGB8) -> [u8; 3] {
        let RGB8 { r, g, b } = color;
        match self {
            PixelOrder::Rgb => [r, g, b],
            PixelOrder::Rbg => [r, b, g],
            PixelOrder::Grb => [g, r, b],
            PixelOrder::Gbr => [g, b, r],
            PixelOrder::Brg => [b, r, g],
            PixelOrder::Bgr => [b, g, r],
        }
    }

    /// Inverse of [`PixelOrder::apply`].
    pub fn restore(self, wire: [u8; 3]) -> RGB8 {
        let [x, y, z] = wire;
        match self {
            PixelOrder::Rgb => RGB8::new(x, y, z),
            PixelOrder::Rbg => RGB8::new(x, z, y),
            PixelOrder::Grb => RGB8::new(y, x, z),
            PixelOrder::Gbr => RGB8::new(z, x, y),
            PixelOrder::Brg => RGB8::new(y, z, x),
            PixelOrder::Bgr => RGB8::new(z, y, x),
        }
    }
}

impl fmt::Display for PixelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelOrder {
    type Err = UnknownPixelOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        PixelOrder::ALL
            .into_iter()
            .find(|order| order.name() == wanted)
            .ok_or_else(|| UnknownPixelOrder(s.to_string()))
    }
}
