/*!
 # Hardware bus

 The [`Bus`] trait is the only path from the animation to the strip. The
 production implementation, [`SpiBus`], shifts WS2812 waveforms out of a
 Linux spidev node. [`LogBus`] stands in when no hardware is attached.

 ## Wire format

 Each data bit becomes one SPI byte, most significant bit first. With the
 bus clocked at 6.4 MHz a byte lasts 1.25 µs, which is one WS2812 bit slot:

 * `1` is sent as `0b1111_1000` (0.78 µs high)
 * `0` is sent as `0b1100_0000` (0.31 µs high)

 Every frame ends with a run of zero bytes that holds the line low long
 enough for the strip to latch.

 ## Transfer size

 A frame must go out as a single transfer, otherwise the gap between two
 transfers latches a partial frame. spidev refuses writes larger than its
 `bufsiz` module parameter (4096 bytes unless changed), which caps a strip
 at 168 pixels. Longer strips need `spidev.bufsiz=<bytes>` on the kernel
 command line. [`SpiBus::open`] checks the limit up front.
*/

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, trace};

use crate::{Error, Result};

/// SPI byte emitted for a `1` data bit
pub const ONE_BIT: u8 = 0b1111_1000;
/// SPI byte emitted for a `0` data bit
pub const ZERO_BIT: u8 = 0b1100_0000;
/// Low time appended after each frame, 80 µs at 6.4 MHz
pub const LATCH_BYTES: usize = 64;

/// Default spidev node used when none is configured
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.0";

/// Where the kernel exposes spidev's per-transfer limit
pub const BUFSIZ_PARAM: &str = "/sys/module/spidev/parameters/bufsiz";
/// spidev's built-in `bufsiz`
pub const DEFAULT_MAX_TRANSFER: usize = 4096;

/// A transport that can push one frame of pixels to the strip
///
/// Pixels are already in physical channel order. Implementations do not
/// retry; a failed write is reported to the caller.
#[allow(async_fn_in_trait)]
pub trait Bus {
    /// Transmits one frame
    async fn write(&mut self, pixels: &[[u8; 3]]) -> Result<()>;

    /// Turns `pixel_count` pixels off
    async fn all_off(&mut self, pixel_count: usize) -> Result<()> {
        let frame = vec![[0u8; 3]; pixel_count];
        self.write(&frame).await
    }
}

/// Number of SPI bytes [`encode`] produces for `pixel_count` pixels
pub fn encoded_len(pixel_count: usize) -> usize {
    pixel_count * 24 + LATCH_BYTES
}

/// Expands pixel bytes into the SPI bit pattern, followed by the latch.
pub fn encode(pixels: &[[u8; 3]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(pixels.len()));
    for byte in pixels.iter().flatten() {
        for bit in (0..8).rev() {
            out.push(if byte & (1 << bit) != 0 { ONE_BIT } else { ZERO_BIT });
        }
    }
    out.resize(out.len() + LATCH_BYTES, 0);
    out
}

/// WS2812 strip on a Linux spidev device
///
/// The device node is held open for the lifetime of the value and closed
/// when it is dropped. The bus clock is taken from the device setup.
#[derive(Debug)]
pub struct SpiBus {
    device: String,
    file: File,
    max_transfer: usize,
}

impl SpiBus {
    /// Opens the spidev node at `path` for a strip of `pixel_count` pixels.
    ///
    /// Fails if a full frame would exceed spidev's transfer limit.
    pub async fn open(path: impl AsRef<Path>, pixel_count: usize) -> Result<Self> {
        let max_transfer = max_transfer().await;
        Self::open_with_limit(path, pixel_count, max_transfer).await
    }

    /// Like [`SpiBus::open`], with an explicit transfer limit in bytes
    #[instrument(skip(path), fields(device = %path.as_ref().display()))]
    pub async fn open_with_limit(
        path: impl AsRef<Path>,
        pixel_count: usize,
        max_transfer: usize,
    ) -> Result<Self> {
        let device = path.as_ref().display().to_string();
        debug!("Opening SPI device");

        let file = OpenOptions::new()
            .write(true)
            .open(path.as_ref())
            .await
            .map_err(|source| {
                error!("Failed to open SPI device {}: {}", device, source);
                Error::BusUnavailable {
                    device: device.clone(),
                    source,
                }
            })?;

        let bytes = encoded_len(pixel_count);
        if bytes > max_transfer {
            error!(
                "{} pixels need {} bytes per transfer, {} accepts {}",
                pixel_count, bytes, device, max_transfer
            );
            return Err(Error::FrameTooLarge {
                pixels: pixel_count,
                bytes,
                limit: max_transfer,
            });
        }

        info!("SPI device {} opened", device);
        Ok(Self {
            device,
            file,
            max_transfer,
        })
    }

    /// Path of the underlying device node
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Bus for SpiBus {
    #[instrument(skip(self, pixels), fields(device = %self.device, pixels = pixels.len()))]
    async fn write(&mut self, pixels: &[[u8; 3]]) -> Result<()> {
        let payload = encode(pixels);
        if payload.len() > self.max_transfer {
            return Err(Error::FrameTooLarge {
                pixels: pixels.len(),
                bytes: payload.len(),
                limit: self.max_transfer,
            });
        }
        trace!("Writing {} SPI bytes", payload.len());

        self.file.write_all(&payload).await.map_err(Error::BusWrite)?;
        self.file.flush().await.map_err(Error::BusWrite)
    }
}

/// Reads spidev's `bufsiz`, falling back to the kernel default
async fn max_transfer() -> usize {
    match tokio::fs::read_to_string(BUFSIZ_PARAM).await {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            debug!("Unreadable spidev bufsiz {:?}, assuming {}", raw, DEFAULT_MAX_TRANSFER);
            DEFAULT_MAX_TRANSFER
        }),
        Err(e) => {
            debug!("Cannot read {}: {}, assuming {}", BUFSIZ_PARAM, e, DEFAULT_MAX_TRANSFER);
            DEFAULT_MAX_TRANSFER
        }
    }
}

/// Bus that only logs frames, for running without a strip attached
#[derive(Debug, Default)]
pub struct LogBus {
    /// Number of frames written so far
    pub frames: u64,
    /// Most recently written frame
    pub last: Vec<[u8; 3]>,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Bus for LogBus {
    async fn write(&mut self, pixels: &[[u8; 3]]) -> Result<()> {
        self.frames += 1;
        trace!(frame = self.frames, "{:?}", pixels);
        self.last.clear();
        self.last.extend_from_slice(pixels);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_msb_first_with_latch() {
        let out = encode(&[[0b1000_0001, 0x00, 0xff]]);
        assert_eq!(out.len(), 24 + LATCH_BYTES);

        assert_eq!(out[0], ONE_BIT);
        assert!(out[1..7].iter().all(|&b| b == ZERO_BIT));
        assert_eq!(out[7], ONE_BIT);
        assert!(out[8..16].iter().all(|&b| b == ZERO_BIT));
        assert!(out[16..24].iter().all(|&b| b == ONE_BIT));
        assert!(out[24..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_frame_is_only_latch() {
        assert_eq!(encode(&[]), vec![0u8; LATCH_BYTES]);
    }

    #[tokio::test]
    async fn all_off_writes_zero_frame_of_requested_size() {
        let mut bus = LogBus::new();
        bus.write(&[[1, 2, 3]]).await.unwrap();
        bus.all_off(5).await.unwrap();

        assert_eq!(bus.frames, 2);
        assert_eq!(bus.last, vec![[0u8; 3]; 5]);
    }

    #[tokio::test]
    async fn missing_device_is_unavailable() {
        let err = SpiBus::open("/nonexistent/spidev9.9", 2).await.unwrap_err();
        match err {
            Error::BusUnavailable { device, source } => {
                assert_eq!(device, "/nonexistent/spidev9.9");
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn spi_bus_writes_encoded_frames_to_the_node() {
        let path = std::env::temp_dir().join(format!("rgbfan-spi-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let mut bus = SpiBus::open(&path, 1).await.unwrap();
        bus.write(&[[0xff, 0x00, 0x0f]]).await.unwrap();
        drop(bus);

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, encode(&[[0xff, 0x00, 0x0f]]));
    }

    #[test]
    fn default_limit_fits_168_pixels() {
        assert_eq!(encoded_len(168), DEFAULT_MAX_TRANSFER);
        assert!(encoded_len(169) > DEFAULT_MAX_TRANSFER);
        assert_eq!(encoded_len(3), encode(&[[0u8; 3]; 3]).len());
    }

    #[tokio::test]
    async fn strips_beyond_the_transfer_limit_fail_at_open() {
        let path = std::env::temp_dir().join(format!("rgbfan-limit-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let fits = SpiBus::open_with_limit(&path, 168, DEFAULT_MAX_TRANSFER).await;
        let too_long = SpiBus::open_with_limit(&path, 169, DEFAULT_MAX_TRANSFER).await;
        let raised = SpiBus::open_with_limit(&path, 1000, 65536).await;
        std::fs::remove_file(&path).unwrap();

        assert!(fits.is_ok());
        assert!(raised.is_ok());
        match too_long.unwrap_err() {
            Error::FrameTooLarge {
                pixels,
                bytes,
                limit,
            } => {
                assert_eq!(pixels, 169);
                assert_eq!(bytes, 169 * 24 + LATCH_BYTES);
                assert_eq!(limit, DEFAULT_MAX_TRANSFER);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected_without_writing() {
        let path = std::env::temp_dir().join(format!("rgbfan-oversize-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();

        let mut bus = SpiBus::open_with_limit(&path, 2, encoded_len(2)).await.unwrap();
        let err = bus.write(&[[1, 2, 3]; 3]).await.unwrap_err();
        drop(bus);

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, Error::FrameTooLarge { pixels: 3, .. }));
        assert!(written.is_empty());
    }
}
