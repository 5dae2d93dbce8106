#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pisnap_camera::error::Result;
use pisnap_camera::{CameraBackend, CameraDevice, CaptureError, StillConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Open,
    Configure(u32, u32),
    Start,
    Capture,
    Stop,
}

/// Which step misbehaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    pub missing_tool: bool,
    pub fail_open: bool,
    pub hang_open: bool,
    pub fail_configure: bool,
    pub fail_capture: bool,
    pub fail_stop: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
    dir_at_open: Arc<Mutex<Option<bool>>>,
}

impl Recorder {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Whether the watched directory existed when `open` ran.
    pub fn dir_at_open(&self) -> Option<bool> {
        *self.dir_at_open.lock().unwrap()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub struct FakeBackend {
    pub script: Script,
    pub recorder: Recorder,
    pub watch_dir: Option<PathBuf>,
}

impl FakeBackend {
    pub fn new(script: Script) -> (Box<dyn CameraBackend>, Recorder) {
        Self::watching(script, None)
    }

    pub fn watching(script: Script, watch_dir: Option<PathBuf>) -> (Box<dyn CameraBackend>, Recorder) {
        let recorder = Recorder::default();
        let backend = FakeBackend { script, recorder: recorder.clone(), watch_dir };
        (Box::new(backend), recorder)
    }
}

#[async_trait]
impl CameraBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self) -> Result<()> {
        self.recorder.push(Call::Probe);
        if self.script.missing_tool {
            return Err(CaptureError::DependencyMissing {
                tool: "fake-still".into(),
                install_hint: "Install with: apt install fake-still".into(),
            });
        }
        Ok(())
    }

    async fn open(&self) -> Result<Box<dyn CameraDevice>> {
        self.recorder.push(Call::Open);
        if let Some(dir) = &self.watch_dir {
            *self.recorder.dir_at_open.lock().unwrap() = Some(dir.is_dir());
        }
        if self.script.hang_open {
            std::future::pending::<()>().await;
        }
        if self.script.fail_open {
            return Err(CaptureError::DeviceUnavailable("camera busy".into()));
        }
        Ok(Box::new(FakeDevice { script: self.script, recorder: self.recorder.clone() }))
    }
}

struct FakeDevice {
    script: Script,
    recorder: Recorder,
}

#[async_trait]
impl CameraDevice for FakeDevice {
    async fn configure(&mut self, cfg: &StillConfig) -> Result<()> {
        self.recorder.push(Call::Configure(cfg.width, cfg.height));
        if self.script.fail_configure {
            return Err(CaptureError::Configuration(format!("{}x{} unsupported", cfg.width, cfg.height)));
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        self.recorder.push(Call::Start);
        Ok(())
    }

    async fn capture_to_file(&mut self, path: &Path) -> Result<()> {
        self.recorder.push(Call::Capture);
        // half a frame, like a device dying mid-write
        std::fs::write(path, b"fake").map_err(|e| CaptureError::CaptureIo(e.to_string()))?;
        if self.script.fail_capture {
            return Err(CaptureError::CaptureIo("disk full".into()));
        }
        std::fs::write(path, b"fake-frame").map_err(|e| CaptureError::CaptureIo(e.to_string()))
    }

    async fn stop(&mut self) -> Result<()> {
        self.recorder.push(Call::Stop);
        if self.script.fail_stop {
            return Err(CaptureError::DeviceUnavailable("release failed".into()));
        }
        Ok(())
    }
}
