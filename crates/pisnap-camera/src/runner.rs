use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::device::{CameraBackend, CameraDevice, StillConfig};
use crate::error::{CaptureError, Result};
use crate::request::CaptureRequest;

pub const DEFAULT_WARMUP: Duration = Duration::from_secs(2);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Wait between starting the stream and reading the frame, for AE/AWB to settle.
    pub warmup: Duration,
    /// Upper bound for each device call. `None` waits forever.
    pub step_timeout: Option<Duration>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self { warmup: DEFAULT_WARMUP, step_timeout: Some(DEFAULT_STEP_TIMEOUT) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    pub path: PathBuf,
}

impl fmt::Display for CaptureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image captured successfully: {}", self.path.display())
    }
}

/// Runs one still capture against a backend: directory, open, configure,
/// start, warm-up, capture, stop.
pub struct CaptureRunner {
    backend: Box<dyn CameraBackend>,
    settings: RunnerSettings,
}

impl CaptureRunner {
    pub fn new(backend: Box<dyn CameraBackend>, settings: RunnerSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend(&self) -> &dyn CameraBackend {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> RunnerSettings {
        self.settings
    }

    pub async fn run(&self, req: &CaptureRequest) -> Result<CaptureOutcome> {
        self.run_until(req, std::future::pending()).await
    }

    /// Like [`run`](Self::run), but aborts with `Cancelled` once `shutdown`
    /// resolves. The device is released before returning either way.
    pub async fn run_until<F>(&self, req: &CaptureRequest, shutdown: F) -> Result<CaptureOutcome>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        info!(
            "capture: {}x{} {:?} -> {} via {}",
            req.width(),
            req.height(),
            req.format(),
            req.output_path().display(),
            self.backend.name()
        );

        if let Some(dir) = req.parent_dir() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| CaptureError::DirectoryCreation { path: dir.to_path_buf(), source })?;
        }

        let opened = tokio::select! {
            r = self.acquire() => Some(r),
            _ = &mut shutdown => None,
        };
        let mut device = opened.ok_or(CaptureError::Cancelled("open"))??;

        let staged = partial_path(req.output_path());
        let mut stage = "configure";
        let session = tokio::select! {
            r = self.session(device.as_mut(), req, &staged, &mut stage) => Some(r),
            _ = &mut shutdown => None,
        };
        let result = match session {
            Some(r) => r,
            None => Err(CaptureError::Cancelled(stage)),
        };

        let released = self.bounded("stop", device.stop()).await;
        drop(device);
        if let Err(e) = &released {
            warn!("capture: releasing camera failed: {}", e);
        }

        match result {
            Ok(()) => {
                tokio::fs::rename(&staged, req.output_path()).await.map_err(|e| {
                    CaptureError::io(format_args!("move frame to {}", req.output_path().display()), e)
                })?;
                info!("capture: done");
                Ok(CaptureOutcome { path: req.output_path().to_path_buf() })
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staged).await;
                debug!("capture: failed at {}: {}", stage, e);
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<Box<dyn CameraDevice>> {
        self.backend.probe().await?;
        debug!("device: open");
        self.bounded("open", self.backend.open()).await
    }

    async fn session(
        &self,
        device: &mut dyn CameraDevice,
        req: &CaptureRequest,
        staged: &Path,
        stage: &mut &'static str,
    ) -> Result<()> {
        let cfg = StillConfig { width: req.width(), height: req.height(), format: req.format() };

        *stage = "configure";
        debug!("device: configure {}x{}", cfg.width, cfg.height);
        self.bounded("configure", device.configure(&cfg)).await?;

        *stage = "start";
        debug!("device: start");
        self.bounded("start", device.start()).await?;

        *stage = "warm-up";
        debug!("device: warm-up {:?}", self.settings.warmup);
        tokio::time::sleep(self.settings.warmup).await;

        *stage = "capture";
        debug!("device: capture");
        self.bounded("capture", device.capture_to_file(staged)).await
    }

    async fn bounded<T>(&self, step: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.settings.step_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| CaptureError::Timeout { step, timeout: limit })?,
            None => fut.await,
        }
    }
}

/// Hidden sibling the device writes into; renamed over the target on success.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(target.file_name().unwrap_or_default());
    name.push(".partial");
    target.with_file_name(name)
}
