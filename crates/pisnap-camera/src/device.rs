use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::format::ImageFormat;

/// Capture parameters applied before the stream starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillConfig {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Factory for camera sessions. One backend per camera stack.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `DependencyMissing` when the camera tooling is not installed.
    async fn probe(&self) -> Result<()>;

    async fn open(&self) -> Result<Box<dyn CameraDevice>>;
}

/// An open, exclusively owned camera session.
///
/// `stop` must be safe to call in any state, including before `start` and
/// after a failed `capture_to_file`.
#[async_trait]
pub trait CameraDevice: Send {
    async fn configure(&mut self, cfg: &StillConfig) -> Result<()>;
    async fn start(&mut self) -> Result<()>;
    async fn capture_to_file(&mut self, path: &Path) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
}

/// First executable called `name` on `PATH`.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|md| md.is_file() && md.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    p.is_file()
}
