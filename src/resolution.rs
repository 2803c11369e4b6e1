use std::path::Path;

use tracing::warn;

use crate::storage::open_image;

/// Smallest acceptable `min(width, height)`, in pixels.
pub const DEFAULT_MIN_DIMENSION: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    Adequate { width: u32, height: u32 },
    Low { width: u32, height: u32 },
    Unreadable(String),
}

/// Reads the image header only; the pixel data is never decoded. The format
/// comes from the file content, not its name.
pub fn resolution_status(path: &Path, threshold: u32) -> ResolutionStatus {
    match open_image(path).and_then(|reader| reader.into_dimensions()) {
        Ok((width, height)) if width.min(height) < threshold => {
            ResolutionStatus::Low { width, height }
        }
        Ok((width, height)) => ResolutionStatus::Adequate { width, height },
        Err(e) => ResolutionStatus::Unreadable(e.to_string()),
    }
}

/// True when either image is below `threshold` on its shorter side.
///
/// An unreadable image suppresses the warning altogether: the check then
/// reports `false` even if the other image is small.
pub fn check_low_resolution(first: &Path, second: &Path, threshold: u32) -> bool {
    let statuses = [
        (first, resolution_status(first, threshold)),
        (second, resolution_status(second, threshold)),
    ];

    let mut low = false;
    for (path, status) in &statuses {
        match status {
            ResolutionStatus::Unreadable(reason) => {
                warn!(path = %path.display(), %reason, "could not read image dimensions");
                return false;
            }
            ResolutionStatus::Low { .. } => low = true,
            ResolutionStatus::Adequate { .. } => {}
        }
    }
    low
}
