//! Result types: one [`OcrRecord`] per image, collected into a [`ResultSet`].
//!
//! The outcome of interpreting a model response is an explicit sum type,
//! [`OcrOutcome`], instead of a loosely shaped map. [`JsonRecord`] is the
//! flat shape written by the JSON sink.

use crate::error::{ItemError, OcrError};
use crate::pipeline::segment::Region;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Error text stored in failure rows for unparseable responses.
pub const PARSE_FAILED: &str = "parse failed";

const RESERVED_KEYS: &[&str] = &["filename", "processing_time", "error", "raw_output"];

/// Fields extracted from a fixture drawing.
///
/// Values are kept as raw JSON because models answer with strings, numbers
/// or lists (several part numbers on one sheet) interchangeably. A key the
/// model left out is `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureFields {
    /// Part number (品番) or public-facility model number.
    #[serde(default)]
    pub hinban: Value,
    /// Number of fixtures required.
    #[serde(default)]
    pub num_items: Value,
    /// Serial number printed on the sheet, e.g. `H402`.
    #[serde(default)]
    pub serial_num: Value,
    /// Free-form remainder (brand, colour temperature, location, …).
    #[serde(default)]
    pub other: Value,
    /// Any further keys the model produced.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FixtureFields {
    /// Split a model-produced object into known fields and extras.
    ///
    /// Keys of the JSON sink row (`filename`, `processing_time`, `error`,
    /// `raw_output`) are dropped; they are owned by the pipeline, never by the
    /// model.
    pub fn from_object(mut obj: Map<String, Value>) -> Self {
        for key in RESERVED_KEYS {
            obj.remove(*key);
        }
        let mut take = |key: &str| obj.remove(key).unwrap_or(Value::Null);
        let hinban = take("hinban");
        let num_items = take("num_items");
        let serial_num = take("serial_num");
        let other = take("other");
        Self {
            hinban,
            num_items,
            serial_num,
            other,
            extra: obj,
        }
    }
}

/// Terminal state of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OcrOutcome {
    /// The response was a JSON object.
    Parsed { fields: FixtureFields, raw: String },
    /// The response arrived but could not be interpreted.
    Unparsed { raw: String, reason: String },
    /// The request itself failed.
    Failed { error: ItemError },
}

impl OcrOutcome {
    /// Raw response text, if the model answered.
    pub fn raw(&self) -> Option<&str> {
        match self {
            OcrOutcome::Parsed { raw, .. } | OcrOutcome::Unparsed { raw, .. } => Some(raw),
            OcrOutcome::Failed { .. } => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, OcrOutcome::Parsed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, OcrOutcome::Failed { .. })
    }
}

/// The result for a single page or region image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRecord {
    /// 0-based position in document order.
    pub index: usize,
    /// Name of the image sent, e.g. `page_2_part_3.png` or `image7.png`.
    pub filename: String,
    /// 1-based source page, when the image came from a PDF.
    pub page: Option<usize>,
    /// Source rectangle, when the image is a region crop.
    pub region: Option<Region>,
    pub outcome: OcrOutcome,
    /// Wall-clock time of the request, in milliseconds.
    pub duration_ms: u64,
}

impl OcrRecord {
    /// Request time in seconds, rounded to two decimals.
    pub fn processing_time(&self) -> f64 {
        (self.duration_ms as f64 / 10.0).round() / 100.0
    }

    /// Text stored in the CSV `ocr_result` column.
    pub fn csv_text(&self) -> String {
        match &self.outcome {
            OcrOutcome::Parsed { raw, .. } | OcrOutcome::Unparsed { raw, .. } => raw.clone(),
            OcrOutcome::Failed { error } => format!("ERROR: {error}"),
        }
    }

    /// Flatten into the JSON sink shape.
    pub fn to_json_record(&self) -> JsonRecord {
        let processing_time = self.processing_time();
        match &self.outcome {
            OcrOutcome::Parsed { fields, .. } => JsonRecord::Parsed(ParsedRow {
                filename: self.filename.clone(),
                fields: fields.clone(),
                processing_time,
            }),
            OcrOutcome::Unparsed { raw, .. } => JsonRecord::Failure(FailureRow {
                filename: self.filename.clone(),
                error: PARSE_FAILED.to_string(),
                raw_output: raw.clone(),
                processing_time,
            }),
            OcrOutcome::Failed { error } => JsonRecord::Failure(FailureRow {
                filename: self.filename.clone(),
                error: error.to_string(),
                raw_output: String::new(),
                processing_time,
            }),
        }
    }
}

/// `{filename, hinban, num_items, serial_num, other, processing_time}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRow {
    pub filename: String,
    #[serde(flatten)]
    pub fields: FixtureFields,
    pub processing_time: f64,
}

/// `{filename, error, raw_output, processing_time}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRow {
    pub filename: String,
    pub error: String,
    pub raw_output: String,
    pub processing_time: f64,
}

/// One element of the JSON sink array.
///
/// `Failure` is listed first so that deserialisation only falls back to
/// `Parsed` when `error`/`raw_output` are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRecord {
    Failure(FailureRow),
    Parsed(ParsedRow),
}

impl JsonRecord {
    pub fn filename(&self) -> &str {
        match self {
            JsonRecord::Failure(r) => &r.filename,
            JsonRecord::Parsed(r) => &r.filename,
        }
    }

    pub fn processing_time(&self) -> f64 {
        match self {
            JsonRecord::Failure(r) => r.processing_time,
            JsonRecord::Parsed(r) => r.processing_time,
        }
    }
}

/// Statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Pages rasterised (0 for image-directory runs).
    pub pages: usize,
    /// Images sent to the model.
    pub total_items: usize,
    pub parsed: usize,
    pub unparsed: usize,
    pub failed: usize,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Every record of one document, in document order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    /// PDF file or image directory the records came from.
    pub source: PathBuf,
    pub records: Vec<OcrRecord>,
    pub stats: RunStats,
}

impl ResultSet {
    /// Flatten every record into the JSON sink shape.
    pub fn json_records(&self) -> Vec<JsonRecord> {
        self.records.iter().map(OcrRecord::to_json_record).collect()
    }

    /// Treat any failed request as an error.
    pub fn into_result(self) -> Result<Self, OcrError> {
        if self.stats.failed > 0 {
            return Err(OcrError::PartialFailure {
                failed: self.stats.failed,
                total: self.stats.total_items,
            });
        }
        Ok(self)
    }
}
