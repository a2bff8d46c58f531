//! Pipeline stages for drawing-to-record OCR.
//!
//! Each submodule implements one transformation step and is tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ segment ──▶ encode ──▶ client ──▶ parse
//! (path)    (pdfium)   (canny)     (PNG)      (HTTP)     (record)
//! ```
//!
//! 1. [`input`]   — validate a PDF path, or list a directory of numbered images
//! 2. [`render`]  — rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`segment`] — split a page into framed regions by edge detection
//! 4. [`encode`]  — PNG-encode each image for the request body
//! 5. [`client`]  — one request per image; the only stage with network I/O
//! 6. [`parse`]   — turn the response text into a parsed or unparsed record

pub mod client;
pub mod encode;
pub mod input;
pub mod parse;
pub mod render;
pub mod segment;
