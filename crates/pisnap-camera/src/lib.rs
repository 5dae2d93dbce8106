pub mod device;
pub mod error;
pub mod format;
mod helper;
pub mod pattern;
pub mod request;
pub mod rpicam;
pub mod runner;
pub mod v4l2;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

pub use device::{CameraBackend, CameraDevice, StillConfig};
pub use error::CaptureError;
pub use format::ImageFormat;
pub use request::{resolve_output, CaptureRequest, FilenameTemplate};
pub use runner::{CaptureOutcome, CaptureRunner, RunnerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Rpicam,
    V4l2,
    TestPattern,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [Self::Rpicam, Self::V4l2, Self::TestPattern];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rpicam => "rpicam",
            Self::V4l2 => "v4l2",
            Self::TestPattern => "test-pattern",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown camera backend {s:?} (rpicam | v4l2 | test-pattern)"))
    }
}

/// Per-backend device selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    /// libcamera camera index (rpicam)
    pub camera: u32,
    /// video node (v4l2)
    pub device: PathBuf,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self { camera: 0, device: PathBuf::from(v4l2::DEFAULT_DEVICE) }
    }
}

pub fn backend(kind: BackendKind, opts: &BackendOptions) -> Box<dyn CameraBackend> {
    match kind {
        BackendKind::Rpicam => Box::new(rpicam::RpicamBackend::new(opts.camera)),
        BackendKind::V4l2 => Box::new(v4l2::V4l2Backend::new(opts.device.clone())),
        BackendKind::TestPattern => Box::new(pattern::TestPatternBackend),
    }
}
