//! # specsheet-ocr
//!
//! Read part numbers, quantities and serial numbers off lighting-fixture
//! specification drawings (照明器具の仕様書) with a vision chat model.
//!
//! Drawings are grids of framed boxes, one fixture per box. Sending a whole
//! page makes the model mix up fields between boxes, so each page is split
//! into its boxes first and every box is sent on its own.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Render   rasterise pages via pdfium (spawn_blocking)
//!  ├─ 2. Segment  Canny edges → outer contours → boxes in reading order
//!  ├─ 3. Encode   PNG per box
//!  ├─ 4. Request  one chat-completion call per box
//!  ├─ 5. Parse    JSON object → fields, anything else kept verbatim
//!  └─ 6. Sink     CSV or JSON, written once per run
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use specsheet_ocr::{ocr_pdf_to_file, OcrConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OcrConfig::builder()
//!         .endpoint("https://api.openai.com/v1")
//!         .api_key(std::env::var("OCR_API_KEY")?)
//!         .output_format(OutputFormat::Json)
//!         .region_dir("artifacts/regions")
//!         .build()?;
//!     let stats = ocr_pdf_to_file("drawings.pdf", "result/drawings.json", &config).await?;
//!     eprintln!("{} parsed, {} failed", stats.parsed, stats.failed);
//!     Ok(())
//! }
//! ```
//!
//! Without `endpoint`, an `edgequake-llm` provider is resolved from the
//! environment (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `specsheet-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    default_artifacts_dir, OcrConfig, OcrConfigBuilder, OutputFormat, PageSelection, SegmentConfig,
};
pub use convert::{
    ocr_images, ocr_images_to_file, ocr_images_with_client, ocr_pdf, ocr_pdf_to_file,
    ocr_pdf_with_client, split_pdf, SplitPage,
};
pub use error::{ItemError, OcrError};
pub use output::{FixtureFields, JsonRecord, OcrOutcome, OcrRecord, ResultSet, RunStats};
pub use pipeline::client::{Backend, HttpChatClient, LlmVisionClient, VisionClient};
pub use pipeline::encode::ImagePayload;
pub use pipeline::segment::{segment_image, Region};
pub use progress::{NoopProgressCallback, OcrProgressCallback, ProgressCallback};
pub use sink::{write_results, Journal};
