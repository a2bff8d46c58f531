//! Input resolution: validate a PDF path, or enumerate a directory of
//! numbered images.
//!
//! The PDF magic bytes (`%PDF`) are checked before pdfium sees the file so
//! callers get a meaningful error rather than a pdfium failure.
//!
//! Numbered images (`image0.png`, `image1.png`, …) are enumerated from a
//! directory listing and sorted by their number. A missing index is reported
//! as a gap; the images after it are still processed.

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn resolve_pdf(path: &Path) -> Result<PathBuf, OcrError> {
    if !path.exists() {
        return Err(OcrError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(OcrError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(OcrError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(OcrError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// An image file whose name carries a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedImage {
    pub number: u64,
    pub path: PathBuf,
}

impl NumberedImage {
    /// File name component, used as the record filename.
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

static RE_NUMBER_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)(\d+)\.(png|jpe?g)$").unwrap());

/// List `{prefix}{N}.png|jpg|jpeg` files in `dir`, sorted by `N`.
///
/// Gaps in the sequence are logged, not treated as the end of input.
pub fn list_numbered_images(dir: &Path, prefix: &str) -> Result<Vec<NumberedImage>, OcrError> {
    if !dir.is_dir() {
        return Err(OcrError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => OcrError::Internal(format!("Failed to list '{}': {e}", dir.display())),
    })?;

    let mut images = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(caps) = RE_NUMBER_SUFFIX.captures(name) else {
            continue;
        };
        if &caps[1] != prefix {
            continue;
        }
        let Ok(number) = caps[2].parse::<u64>() else {
            continue;
        };
        images.push(NumberedImage { number, path });
    }

    images.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.path.cmp(&b.path)));

    for pair in images.windows(2) {
        if pair[1].number > pair[0].number + 1 {
            warn!(
                "Gap in numbered images: {}{} → {}{} ({} missing)",
                prefix,
                pair[0].number,
                prefix,
                pair[1].number,
                pair[1].number - pair[0].number - 1
            );
        }
    }

    debug!("Found {} numbered images in {}", images.len(), dir.display());
    Ok(images)
}

/// MIME type for an image path, by extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}
