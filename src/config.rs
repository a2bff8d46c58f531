//! Configuration types for spec-sheet OCR runs.
//!
//! Every knob lives in [`OcrConfig`], built via [`OcrConfigBuilder`]. The
//! segmentation thresholds, endpoint, model and credential are all fields here
//! and are handed to each pipeline stage; no stage reads a global constant.

use crate::error::OcrError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model used when neither the config nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Edge-detection and noise-suppression parameters for the region segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Lower hysteresis threshold of the Canny detector. Default: 50.
    pub canny_low: f32,
    /// Upper hysteresis threshold of the Canny detector. Default: 150.
    pub canny_high: f32,
    /// Regions must be strictly wider than this many pixels. Default: 50.
    pub min_width: u32,
    /// Regions must be strictly taller than this many pixels. Default: 50.
    pub min_height: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            min_width: 50,
            min_height: 50,
        }
    }
}

/// Configuration for an OCR run.
///
/// # Example
/// ```rust
/// use specsheet_ocr::{OcrConfig, OutputFormat};
///
/// let config = OcrConfig::builder()
///     .endpoint("https://llm.example.com/v1")
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .output_format(OutputFormat::Json)
///     .build()
///     .unwrap();
/// assert_eq!(config.segment.min_width, 50);
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Split each page into detected regions before OCR. Default: true.
    ///
    /// When false, whole pages are sent to the model.
    pub split_regions: bool,

    /// Segmenter thresholds.
    pub segment: SegmentConfig,

    /// Directory for `page_{n}.png` artefacts. None keeps pages in memory only.
    pub page_dir: Option<PathBuf>,

    /// Directory for `page_{p}_part_{n}.png` artefacts. None keeps regions in memory only.
    pub region_dir: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible API, e.g. `https://host/v1/`.
    ///
    /// When set, requests go straight to `{endpoint}/chat/completions` with
    /// `api_key` as bearer credential. When None, an edgequake-llm provider is
    /// resolved instead.
    pub endpoint: Option<String>,

    /// Bearer credential for `endpoint`.
    pub api_key: Option<String>,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// edgequake-llm provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over everything else.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum tokens the model may generate per image. Default: 1000.
    pub max_tokens: usize,

    /// Sampling temperature. None leaves it to the service. Default: None.
    pub temperature: Option<f32>,

    /// Per-request timeout in seconds. None waits indefinitely. Default: None.
    pub api_timeout_secs: Option<u64>,

    /// Number of requests in flight at once. Default: 1 (sequential).
    ///
    /// Results are always ordered by image index regardless of this value.
    pub concurrency: usize,

    /// Sink format; also selects the default prompt. Default: Json.
    pub output_format: OutputFormat,

    /// Prompt template overriding the built-in one. `{filename}` is replaced
    /// with the name of the image being sent.
    pub prompt: Option<String>,

    /// Strip an outer ```` ```json ```` fence before parsing. Default: false.
    pub strip_code_fences: bool,

    /// Append each finished record as a JSON line to this file.
    pub journal: Option<PathBuf>,

    /// File name prefix of numbered images (`image0.png`, …). Default: `image`.
    pub image_prefix: String,

    /// Per-item progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            pages: PageSelection::default(),
            password: None,
            split_regions: true,
            segment: SegmentConfig::default(),
            page_dir: None,
            region_dir: None,
            endpoint: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            max_tokens: 1000,
            temperature: None,
            api_timeout_secs: None,
            concurrency: 1,
            output_format: OutputFormat::default(),
            prompt: None,
            strip_code_fences: false,
            journal: None,
            image_prefix: "image".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("dpi", &self.dpi)
            .field("pages", &self.pages)
            .field("split_regions", &self.split_regions)
            .field("segment", &self.segment)
            .field("page_dir", &self.page_dir)
            .field("region_dir", &self.region_dir)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("output_format", &self.output_format)
            .field("strip_code_fences", &self.strip_code_fences)
            .field("journal", &self.journal)
            .field("image_prefix", &self.image_prefix)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }
}

/// `artifacts/{stem}` for a PDF, where the CLI keeps page and region images
/// unless told otherwise.
pub fn default_artifacts_dir(pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    Path::new("artifacts").join(stem)
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn split_regions(mut self, v: bool) -> Self {
        self.config.split_regions = v;
        self
    }

    pub fn segment(mut self, segment: SegmentConfig) -> Self {
        self.config.segment = segment;
        self
    }

    pub fn page_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.page_dir = Some(dir.into());
        self
    }

    pub fn region_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.region_dir = Some(dir.into());
        self
    }

    /// Save pages to `dir/pages` and region crops to `dir/regions`.
    pub fn artifacts_dir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.page_dir(dir.join("pages")).region_dir(dir.join("regions"))
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn prompt(mut self, template: impl Into<String>) -> Self {
        self.config.prompt = Some(template.into());
        self
    }

    pub fn strip_code_fences(mut self, v: bool) -> Self {
        self.config.strip_code_fences = v;
        self
    }

    pub fn journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.journal = Some(path.into());
        self
    }

    pub fn image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.image_prefix = prefix.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(OcrError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.segment.canny_low > c.segment.canny_high {
            return Err(OcrError::InvalidConfig(format!(
                "Canny low threshold ({}) exceeds high threshold ({})",
                c.segment.canny_low, c.segment.canny_high
            )));
        }
        if c.model.trim().is_empty() {
            return Err(OcrError::InvalidConfig("Model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(OcrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if let Some(ref url) = c.endpoint {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(OcrError::InvalidConfig(format!(
                    "Endpoint must be an HTTP/HTTPS URL, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Result sink format.
///
/// The format also picks the built-in prompt: `Csv` asks the model for a
/// Markdown table that is stored verbatim, `Json` asks for a JSON object that
/// the aggregator parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Two columns `image_file,ocr_result`, UTF-8 with BOM.
    Csv,
    /// Array of parsed / failure records. (default)
    #[default]
    Json,
}

/// Specifies which pages of the PDF to rasterise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let c = OcrConfig::default();
        assert_eq!(c.segment.canny_low, 50.0);
        assert_eq!(c.segment.canny_high, 150.0);
        assert_eq!(c.segment.min_width, 50);
        assert_eq!(c.segment.min_height, 50);
        assert_eq!(c.model, "gpt-4o-mini");
        assert_eq!(c.max_tokens, 1000);
        assert_eq!(c.concurrency, 1);
        assert!(c.split_regions);
    }

    #[test]
    fn build_rejects_inverted_canny_thresholds() {
        let err = OcrConfig::builder()
            .segment(SegmentConfig {
                canny_low: 200.0,
                canny_high: 100.0,
                ..SegmentConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Canny"));
    }

    #[test]
    fn build_rejects_non_http_endpoint() {
        assert!(OcrConfig::builder()
            .endpoint("ftp://example.com")
            .build()
            .is_err());
    }

    #[test]
    fn build_rejects_out_of_range_dpi() {
        assert!(OcrConfig::builder().dpi(10).build().is_err());
        assert!(OcrConfig::builder().dpi(300).build().is_ok());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let c = OcrConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = OcrConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn artifacts_dir_sets_pages_and_regions() {
        let c = OcrConfig::builder()
            .artifacts_dir(default_artifacts_dir(Path::new("in/drawings.pdf")))
            .build()
            .unwrap();
        assert_eq!(c.page_dir, Some(PathBuf::from("artifacts/drawings/pages")));
        assert_eq!(c.region_dir, Some(PathBuf::from("artifacts/drawings/regions")));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(3), vec![1, 2]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }
}
