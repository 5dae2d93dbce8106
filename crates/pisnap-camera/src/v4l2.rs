use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::device::{find_program, CameraBackend, CameraDevice, StillConfig};
use crate::error::{CaptureError, Result};
use crate::format::persist_jpeg;
use crate::helper::{Helper, Signal};

pub const INSTALL_HINT: &str = "Install with: sudo apt install -y ffmpeg";
pub const DEFAULT_DEVICE: &str = "/dev/video0";

/// ffmpeg finalises its output on SIGINT.
const SIG_QUIT: Signal = Signal::SIGINT;

/// USB/UVC webcams through `ffmpeg`'s video4linux2 input.
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    device: PathBuf,
}

impl V4l2Backend {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self { device: device.into() }
    }

    fn program(&self) -> Result<PathBuf> {
        find_program("ffmpeg").ok_or_else(|| CaptureError::DependencyMissing {
            tool: "ffmpeg".into(),
            install_hint: INSTALL_HINT.into(),
        })
    }
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

#[async_trait]
impl CameraBackend for V4l2Backend {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    async fn probe(&self) -> Result<()> {
        self.program().map(|_| ())
    }

    async fn open(&self) -> Result<Box<dyn CameraDevice>> {
        let program = self.program()?;
        tokio::fs::OpenOptions::new()
            .read(true)
            .open(&self.device)
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", self.device.display())))?;

        info!("v4l2: using {}", self.device.display());
        Ok(Box::new(V4l2Device {
            program,
            device: self.device.clone(),
            config: None,
            helper: Helper::new()?,
        }))
    }
}

pub struct V4l2Device {
    program: PathBuf,
    device: PathBuf,
    config: Option<StillConfig>,
    helper: Helper,
}

impl V4l2Device {
    // ffmpeg -f video4linux2 -input_format mjpeg -video_size WxH -i /dev/video0 -f image2 -update 1 frame.jpg
    fn stream_command(&self, cfg: &StillConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-hide_banner", "-loglevel", "error",
            "-f", "video4linux2",
            "-input_format", "mjpeg",
            "-video_size", &format!("{}x{}", cfg.width, cfg.height),
        ]);
        cmd.arg("-i").arg(&self.device);
        cmd.args(["-f", "image2", "-update", "1", "-q:v", "2", "-y"]);
        cmd.arg(self.helper.frame_path());
        cmd
    }
}

#[async_trait]
impl CameraDevice for V4l2Device {
    async fn configure(&mut self, cfg: &StillConfig) -> Result<()> {
        // the driver only negotiates once ffmpeg opens the node
        self.config = Some(*cfg);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let cfg = self
            .config
            .ok_or_else(|| CaptureError::Configuration("start before configure".into()))?;
        let cmd = self.stream_command(&cfg);
        self.helper.spawn(cmd, INSTALL_HINT)
    }

    async fn capture_to_file(&mut self, path: &Path) -> Result<()> {
        let cfg = self
            .config
            .ok_or_else(|| CaptureError::Configuration("capture before configure".into()))?;
        if !self.helper.is_running() {
            return Err(CaptureError::CaptureIo("capture before start".into()));
        }

        debug!("v4l2: waiting for streamed frame");
        // ffmpeg quitting before its first frame means the node refused the format
        let jpeg = self.helper.wait_for_frame().await.map_err(|log| {
            CaptureError::Configuration(format!(
                "{} rejected {}x{} mjpeg: {log}",
                self.device.display(),
                cfg.width,
                cfg.height
            ))
        })?;
        persist_jpeg(jpeg, path, cfg.format).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.helper.terminate(Some(SIG_QUIT), Duration::from_secs(2)).await
    }
}
