use std::path::Path;

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::device::{CameraBackend, CameraDevice, StillConfig};
use crate::error::{CaptureError, Result};
use crate::format::encode;

/// Largest frame side the pattern renders; bigger requests would be
/// multi-gigabyte buffers.
pub const MAX_SIDE: u32 = 16_384;

/// Synthetic camera for hosts without one. Frames are a colour gradient
/// with a frame counter baked into the blue channel.
#[derive(Debug, Clone, Default)]
pub struct TestPatternBackend;

#[async_trait]
impl CameraBackend for TestPatternBackend {
    fn name(&self) -> &'static str {
        "test-pattern"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn open(&self) -> Result<Box<dyn CameraDevice>> {
        Ok(Box::new(TestPatternDevice::default()))
    }
}

#[derive(Debug, Default)]
pub struct TestPatternDevice {
    config: Option<StillConfig>,
    streaming: bool,
    frames: u8,
}

#[async_trait]
impl CameraDevice for TestPatternDevice {
    async fn configure(&mut self, cfg: &StillConfig) -> Result<()> {
        if cfg.width > MAX_SIDE || cfg.height > MAX_SIDE {
            return Err(CaptureError::Configuration(format!(
                "{}x{} exceeds test-pattern maximum of {MAX_SIDE}x{MAX_SIDE}",
                cfg.width, cfg.height
            )));
        }
        self.config = Some(*cfg);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.streaming = true;
        Ok(())
    }

    async fn capture_to_file(&mut self, path: &Path) -> Result<()> {
        let cfg = self
            .config
            .ok_or_else(|| CaptureError::Configuration("capture before configure".into()))?;
        if !self.streaming {
            return Err(CaptureError::CaptureIo("capture before start".into()));
        }
        self.frames = self.frames.wrapping_add(1);
        let frame = self.frames;

        let bytes = tokio::task::spawn_blocking(move || {
            let img = render(cfg.width, cfg.height, frame);
            encode(&DynamicImage::ImageRgb8(img), cfg.format)
        })
        .await
        .map_err(|e| CaptureError::CaptureIo(format!("render task failed: {e}")))??;

        debug!("test-pattern: {} bytes -> {}", bytes.len(), path.display());
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CaptureError::io(format_args!("write {}", path.display()), e))
    }

    async fn stop(&mut self) -> Result<()> {
        self.streaming = false;
        Ok(())
    }
}

fn render(width: u32, height: u32, frame: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([ramp(x, width), ramp(y, height), frame])
    })
}

/// 0..=255 across `len` pixels.
fn ramp(pos: u32, len: u32) -> u8 {
    (u64::from(pos) * 255 / u64::from(len.max(1))) as u8
}
