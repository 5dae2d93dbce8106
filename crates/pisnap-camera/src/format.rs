use std::path::Path;

use tracing::debug;

use crate::error::{CaptureError, Result};

/// Container format of the persisted frame, picked from the output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            None | Some("jpg") | Some("jpeg") => Ok(Self::Jpeg),
            Some("png") => Ok(Self::Png),
            Some(other) => Err(CaptureError::Configuration(format!(
                "unsupported image extension .{other} (use .jpg or .png)"
            ))),
        }
    }

    /// Name understood by `rpicam-still --encoding`.
    pub fn encoding(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    fn as_image(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Writes a staged JPEG frame to `target`, re-encoding when another format is wanted.
pub async fn persist_jpeg(jpeg: Vec<u8>, target: &Path, format: ImageFormat) -> Result<()> {
    let bytes = match format {
        ImageFormat::Jpeg => jpeg,
        other => {
            debug!("persist: re-encoding staged jpeg as {:?}", other);
            tokio::task::spawn_blocking(move || reencode(&jpeg, other))
                .await
                .map_err(|e| CaptureError::CaptureIo(format!("encoder task failed: {e}")))??
        }
    };
    tokio::fs::write(target, bytes)
        .await
        .map_err(|e| CaptureError::io(format_args!("write {}", target.display()), e))
}

fn reencode(jpeg: &[u8], format: ImageFormat) -> Result<Vec<u8>> {
    let img = image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .map_err(|e| CaptureError::CaptureIo(format!("decode captured frame: {e}")))?;
    encode(&img, format)
}

pub(crate) fn encode(img: &image::DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = std::io::Cursor::new(Vec::new());
    // JPEG has no alpha channel
    let img = image::DynamicImage::ImageRgb8(img.to_rgb8());
    img.write_to(&mut out, format.as_image())
        .map_err(|e| CaptureError::CaptureIo(format!("encode {:?}: {e}", format)))?;
    Ok(out.into_inner())
}
