use std::path::{Path, PathBuf};

use time::format_description::OwnedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::{CaptureError, Result};
use crate::format::ImageFormat;

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FILENAME_FORMAT: &str = "capture_[year][month][day]_[hour][minute][second].jpg";

/// One still capture, as asked for on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    output_path: PathBuf,
    width: u32,
    height: u32,
    format: ImageFormat,
}

impl CaptureRequest {
    pub fn new(output_path: impl Into<PathBuf>, width: u32, height: u32) -> Result<Self> {
        let output_path = output_path.into();
        if output_path.as_os_str().is_empty() {
            return Err(CaptureError::Configuration("output path is empty".into()));
        }
        if width == 0 || height == 0 {
            return Err(CaptureError::Configuration(format!(
                "resolution must be positive, got {width}x{height}"
            )));
        }
        let format = ImageFormat::from_path(&output_path)?;
        Ok(Self { output_path, width, height, format })
    }

    pub fn with_defaults(output_path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(output_path, DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// Directory that must exist before the device is opened.
    /// `None` for a bare file name in the working directory.
    pub fn parent_dir(&self) -> Option<&Path> {
        self.output_path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}

/// Timestamped file names for captures aimed at a directory.
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    items: OwnedFormatItem,
}

impl FilenameTemplate {
    /// `pattern` uses the `time` crate's format-description syntax,
    /// e.g. `snap_[year]-[month]-[day].jpg`.
    pub fn parse(pattern: &str) -> Result<Self> {
        let items = time::format_description::parse_owned::<1>(pattern)
            .map_err(|e| CaptureError::Configuration(format!("filename_format {pattern:?}: {e}")))?;
        Ok(Self { items })
    }

    pub fn render(&self, at: OffsetDateTime) -> Result<String> {
        at.format(&self.items)
            .map_err(|e| CaptureError::Configuration(format!("filename_format: {e}")))
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        let items = format_description!("capture_[year][month][day]_[hour][minute][second].jpg");
        Self { items: OwnedFormatItem::from(items) }
    }
}

/// Resolves the user's `output` argument to a file path. Existing directories
/// and paths ending in a separator get a timestamped file name inside them.
pub fn resolve_output(output: &Path, template: &FilenameTemplate, now: OffsetDateTime) -> Result<PathBuf> {
    let names_dir = output.is_dir()
        || output
            .as_os_str()
            .to_str()
            .map(|s| s.ends_with(std::path::MAIN_SEPARATOR) || s.ends_with('/'))
            .unwrap_or(false);
    if names_dir {
        Ok(output.join(template.render(now)?))
    } else {
        Ok(output.to_path_buf())
    }
}
