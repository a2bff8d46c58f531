//! Error types for the specsheet-ocr library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrError`] — **Fatal**: the run cannot proceed at all (missing input
//!   file, unreadable PDF, provider not configured, sink not writable).
//!   Returned as `Err(OcrError)` from the top-level `ocr_*` functions.
//!
//! * [`ItemError`] — **Non-fatal**: the request for a single image failed
//!   (network, auth, quota, timeout). It is logged and stored inside
//!   [`crate::output::OcrOutcome::Failed`] so the item still shows up in the
//!   result set and the run moves on to the next image.
//!
//! A response that arrives but is not valid JSON is not an error at all; it
//! becomes [`crate::output::OcrOutcome::Unparsed`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the specsheet-ocr library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// An input image could not be read or decoded.
    #[error("Failed to read image '{path}': {detail}")]
    ImageReadFailed { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
If the auto-download failed, set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Remote model errors ───────────────────────────────────────────────
    /// Neither an endpoint nor a provider could be configured.
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Some items failed their remote request.
    ///
    /// Returned by [`crate::output::ResultSet::into_result`] when the caller
    /// wants to treat any failed request as an error.
    #[error("{failed}/{total} images failed during OCR")]
    PartialFailure { failed: usize, total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a page or region image.
    #[error("Failed to write image artefact '{path}': {detail}")]
    ArtifactWriteFailed { path: PathBuf, detail: String },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Result set could not be encoded for the sink.
    #[error("Failed to serialise results: {0}")]
    Serialization(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single image request.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ItemError {
    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("request failed: {detail}")]
    Request { detail: String },

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The configured per-request timeout elapsed.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response carried no message content.
    #[error("response contained no message content")]
    EmptyResponse,

    /// The image could not be encoded for the request body.
    #[error("image encoding failed: {detail}")]
    Encode { detail: String },

    /// The vision provider returned an error.
    #[error("provider error: {detail}")]
    Provider { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_display() {
        let e = OcrError::PartialFailure {
            failed: 1,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("1/10"), "got: {msg}");
    }

    #[test]
    fn file_not_found_mentions_path() {
        let e = OcrError::FileNotFound {
            path: PathBuf::from("data/sample1.pdf"),
        };
        assert!(e.to_string().contains("data/sample1.pdf"));
    }

    #[test]
    fn status_error_display() {
        let e = ItemError::Status {
            status: 429,
            body: "quota exceeded".into(),
        };
        assert!(e.to_string().contains("429"));
        assert!(e.to_string().contains("quota exceeded"));
    }

    #[test]
    fn timeout_display() {
        let e = ItemError::Timeout { secs: 30 };
        assert!(e.to_string().contains("30s"));
    }
}
