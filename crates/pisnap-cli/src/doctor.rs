use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use pisnap_camera::{CameraBackend, CaptureRequest, CaptureRunner};
use tracing::{info, warn};

use crate::config::Resolved;

const LONG_WARMUP: Duration = Duration::from_secs(60);

/// Rejects only what a capture would reject. The warm-up runs outside the
/// per-step timeout, so the two are not compared.
pub fn check_settings(cfg: &Resolved) -> Result<()> {
    anyhow::ensure!(cfg.width >= 1 && cfg.height >= 1, "camera resolution {}x{} must be positive", cfg.width, cfg.height);
    if cfg.runner.warmup > LONG_WARMUP {
        warn!("doctor: warm-up of {:?} is unusually long", cfg.runner.warmup);
    }
    Ok(())
}

/// Tooling present, and the device can be opened and released.
pub async fn check_backend(backend: &dyn CameraBackend, limit: Option<Duration>) -> Result<()> {
    backend.probe().await.with_context(|| format!("{} tooling", backend.name()))?;

    let open = backend.open();
    let mut device = match limit {
        Some(t) => tokio::time::timeout(t, open).await.context("open timed out")?,
        None => open.await,
    }
    .with_context(|| format!("open {} camera", backend.name()))?;

    device.stop().await.context("release camera")?;
    info!("doctor: {} camera opens and releases", backend.name());
    Ok(())
}

/// Captures a small frame into `dir` under a fresh name, checks it, and
/// removes it again. Existing files in `dir` are left alone.
pub async fn self_test(runner: &CaptureRunner, dir: &Path) -> Result<u64> {
    let scratch = tempfile::Builder::new()
        .prefix(".pisnap-test-")
        .suffix(".jpg")
        .tempfile_in(dir)
        .with_context(|| format!("create test image in {}", dir.display()))?
        .into_temp_path();
    let req = CaptureRequest::new(scratch.to_path_buf(), 640, 480)?;
    runner.run(&req).await.context("test capture")?;

    let len = tokio::fs::metadata(&scratch).await.context("test image missing")?.len();
    anyhow::ensure!(len > 0, "test image is empty");
    scratch.close().context("remove test image")?;
    Ok(len)
}
