use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Every way a single capture can fail. All variants are terminal.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot create output directory {}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend's external tooling is not installed at all.
    #[error("{tool} not found")]
    DependencyMissing {
        tool: String,
        install_hint: String,
    },

    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("camera rejected configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    CaptureIo(String),

    #[error("{step} timed out after {}s", timeout.as_secs_f32())]
    Timeout { step: &'static str, timeout: Duration },

    #[error("cancelled during {0}")]
    Cancelled(&'static str),
}

impl CaptureError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DirectoryCreation { .. } => "directory-creation",
            Self::DependencyMissing { .. } => "dependency-missing",
            Self::DeviceUnavailable(_) => "device-unavailable",
            Self::Configuration(_) => "configuration",
            Self::CaptureIo(_) => "capture-io",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Installation instructions, only for missing tooling.
    pub fn install_hint(&self) -> Option<&str> {
        match self {
            Self::DependencyMissing { install_hint, .. } => Some(install_hint),
            _ => None,
        }
    }

    pub(crate) fn io(context: impl std::fmt::Display, e: std::io::Error) -> Self {
        Self::CaptureIo(format!("{context}: {e}"))
    }
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;
