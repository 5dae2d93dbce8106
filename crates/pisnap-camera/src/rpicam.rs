use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::device::{find_program, CameraBackend, CameraDevice, StillConfig};
use crate::error::{CaptureError, Result};
use crate::format::persist_jpeg;
use crate::helper::{send_signal, Helper, Signal};

pub const INSTALL_HINT: &str = "Install with: sudo apt install -y rpicam-apps";

/// Current name first, then the pre-Bookworm `libcamera-apps` name.
const STILL_PROGRAMS: [&str; 2] = ["rpicam-still", "libcamera-still"];

const SIG_CAPTURE: Signal = Signal::SIGUSR1;
const SIG_QUIT: Signal = Signal::SIGUSR2;

const QUIT_GRACE: Duration = Duration::from_secs(2);

/// Sensor entry from `rpicam-still --list-cameras`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub index: u32,
    pub model: String,
    pub max_width: u32,
    pub max_height: u32,
}

/// Raspberry Pi camera stack (libcamera via `rpicam-apps`).
#[derive(Debug, Clone, Default)]
pub struct RpicamBackend {
    camera: u32,
    program: Option<PathBuf>,
}

impl RpicamBackend {
    pub fn new(camera: u32) -> Self {
        Self { camera, program: None }
    }

    /// Uses `program` instead of searching `PATH` for the still app.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = Some(program.into());
        self
    }

    fn program(&self) -> Result<PathBuf> {
        if let Some(p) = &self.program {
            return Ok(p.clone());
        }
        STILL_PROGRAMS
            .iter()
            .find_map(|p| find_program(p))
            .ok_or_else(|| CaptureError::DependencyMissing {
                tool: STILL_PROGRAMS[0].to_string(),
                install_hint: INSTALL_HINT.to_string(),
            })
    }
}

#[async_trait]
impl CameraBackend for RpicamBackend {
    fn name(&self) -> &'static str {
        "rpicam"
    }

    async fn probe(&self) -> Result<()> {
        self.program().map(|_| ())
    }

    async fn open(&self) -> Result<Box<dyn CameraDevice>> {
        let program = self.program()?;

        let out = Command::new(&program)
            .arg("--list-cameras")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CaptureError::DeviceUnavailable(format!("run {}: {e}", program.display())))?;

        // camera list goes to stdout or stderr depending on the apps version
        let listing = format!(
            "{}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
        let sensors = parse_camera_list(&listing);
        let sensor = sensors
            .into_iter()
            .find(|s| s.index == self.camera)
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("no camera at index {}", self.camera)))?;

        info!("rpicam: camera {} is {} ({}x{})", sensor.index, sensor.model, sensor.max_width, sensor.max_height);
        Ok(Box::new(RpicamDevice {
            program,
            sensor,
            config: None,
            helper: Helper::new()?,
        }))
    }
}

pub struct RpicamDevice {
    program: PathBuf,
    sensor: SensorInfo,
    config: Option<StillConfig>,
    helper: Helper,
}

impl RpicamDevice {
    fn still_command(&self, cfg: &StillConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["--camera", &self.sensor.index.to_string()]);
        cmd.args([
            "-n",        // no preview window
            "-t", "0",   // run until told to stop
            "-s",        // SIGUSR1 captures, SIGUSR2 quits
            "--width", &cfg.width.to_string(),
            "--height", &cfg.height.to_string(),
            "--encoding", "jpg",
        ]);
        cmd.arg("-o").arg(self.helper.frame_path());
        cmd
    }
}

#[async_trait]
impl CameraDevice for RpicamDevice {
    async fn configure(&mut self, cfg: &StillConfig) -> Result<()> {
        if cfg.width > self.sensor.max_width || cfg.height > self.sensor.max_height {
            return Err(CaptureError::Configuration(format!(
                "{}x{} exceeds {} maximum of {}x{}",
                cfg.width, cfg.height, self.sensor.model, self.sensor.max_width, self.sensor.max_height
            )));
        }
        self.config = Some(*cfg);
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let cfg = self
            .config
            .ok_or_else(|| CaptureError::Configuration("start before configure".into()))?;
        let cmd = self.still_command(&cfg);
        self.helper.spawn(cmd, INSTALL_HINT)?;

        // SIGUSR1 kills the app until its handler is in place
        self.helper
            .wait_until_catches(SIG_CAPTURE)
            .await
            .map_err(|log| CaptureError::DeviceUnavailable(format!("rpicam-still did not start: {log}")))?;
        debug!("rpicam: still app ready");
        Ok(())
    }

    async fn capture_to_file(&mut self, path: &Path) -> Result<()> {
        let cfg = self
            .config
            .ok_or_else(|| CaptureError::Configuration("capture before configure".into()))?;
        let Some(child) = self.helper.child() else {
            return Err(CaptureError::CaptureIo("capture before start".into()));
        };

        debug!("rpicam: trigger still");
        send_signal(child, SIG_CAPTURE)
            .map_err(|e| CaptureError::io("trigger still capture", e))?;

        let jpeg = self
            .helper
            .wait_for_frame()
            .await
            .map_err(|log| CaptureError::CaptureIo(format!("rpicam-still: {log}")))?;
        persist_jpeg(jpeg, path, cfg.format).await
    }

    async fn stop(&mut self) -> Result<()> {
        self.helper.terminate(Some(SIG_QUIT), QUIT_GRACE).await
    }
}

/// Parses the `N : model [WxH ...]` lines of a `--list-cameras` report.
pub fn parse_camera_list(text: &str) -> Vec<SensorInfo> {
    text.lines().filter_map(parse_sensor_line).collect()
}

fn parse_sensor_line(line: &str) -> Option<SensorInfo> {
    let (index, rest) = line.trim().split_once(" : ")?;
    let index = index.trim().parse().ok()?;
    let (model, rest) = rest.split_once('[')?;
    let size = rest.split_whitespace().next()?;
    let (w, h) = size.split_once('x')?;
    Some(SensorInfo {
        index,
        model: model.trim().to_string(),
        max_width: w.parse().ok()?,
        max_height: h.trim_end_matches(']').parse().ok()?,
    })
}
