//! Result sinks: the whole [`ResultSet`] is serialised in a single write.
//!
//! | Format | Shape |
//! |--------|-------|
//! | CSV    | UTF-8 with BOM, header `image_file,ocr_result`, one row per image |
//! | JSON   | array of [`JsonRecord`], 4-space indent, non-ASCII kept as is |
//!
//! Files are written to a sibling `*.tmp` and renamed into place, so a reader
//! never sees a half-written result file.
//!
//! The optional [`Journal`] is the exception: it is appended to as each item
//! finishes, one JSON object per line, so an interrupted run keeps whatever
//! was already answered.

use crate::config::OutputFormat;
use crate::error::OcrError;
use crate::output::{JsonRecord, OcrRecord, ResultSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const UTF8_BOM: &str = "\u{feff}";

/// Write `results` to `path` in `format`.
pub async fn write_results(
    path: &Path,
    results: &ResultSet,
    format: OutputFormat,
) -> Result<(), OcrError> {
    let bytes = match format {
        OutputFormat::Csv => csv_bytes(results)?,
        OutputFormat::Json => json_bytes(&results.json_records())?,
    };
    write_atomic(path, &bytes).await?;
    info!(
        "Wrote {} records to {} ({} bytes)",
        results.records.len(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

/// CSV document: BOM, header, then `filename,text` per record.
pub fn csv_bytes(results: &ResultSet) -> Result<Vec<u8>, OcrError> {
    let mut buf = UTF8_BOM.as_bytes().to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        writer
            .write_record(["image_file", "ocr_result"])
            .map_err(|e| OcrError::Serialization(e.to_string()))?;
        for rec in &results.records {
            writer
                .write_record([rec.filename.as_str(), rec.csv_text().as_str()])
                .map_err(|e| OcrError::Serialization(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| OcrError::Serialization(e.to_string()))?;
    }
    Ok(buf)
}

/// Pretty JSON with a 4-space indent.
pub fn json_bytes(records: &[JsonRecord]) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut ser)
        .map_err(|e| OcrError::Serialization(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Write to `{path}.tmp`, then rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), OcrError> {
    let write_err = |e: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    debug!("Renamed {} → {}", tmp_path.display(), path.display());
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Append-only JSON Lines log of finished items.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: tokio::fs::File,
}

impl Journal {
    /// Open `path` for appending, creating it (and its parent) if needed.
    pub async fn open(path: &Path) -> Result<Self, OcrError> {
        let write_err = |e: std::io::Error| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(write_err)?;

        debug!("Journal open: {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    pub async fn append(&mut self, record: &OcrRecord) -> Result<(), OcrError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| OcrError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let write_err = |e: std::io::Error| OcrError::OutputWriteFailed {
            path: self.path.clone(),
            source: e,
        };
        self.file.write_all(&line).await.map_err(write_err)?;
        self.file.flush().await.map_err(write_err)?;
        Ok(())
    }

    /// Read back every record in a journal file.
    pub async fn read(path: &Path) -> Result<Vec<OcrRecord>, OcrError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| OcrError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(|e| OcrError::Serialization(e.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ItemError;
    use crate::output::{OcrOutcome, RunStats};
    use crate::pipeline::parse::{failed_record, parse_response, ItemMeta};
    use std::time::Duration;

    fn sample_set() -> ResultSet {
        let records = vec![
            parse_response(
                ItemMeta::new(0, "image0.png"),
                r#"{"hinban": "照明A", "num_items": "2", "serial_num": "H1", "other": ""}"#.into(),
                Duration::from_millis(1500),
                false,
            ),
            parse_response(
                ItemMeta::new(1, "image1.png"),
                "| 品番 | 個数 |\n| X, Y | \"2\" |".into(),
                Duration::from_millis(800),
                false,
            ),
            failed_record(
                ItemMeta::new(2, "image2.png"),
                ItemError::Status {
                    status: 500,
                    body: "oops".into(),
                },
                Duration::from_millis(20),
            ),
        ];
        ResultSet {
            source: PathBuf::from("split_images/1"),
            records,
            stats: RunStats::default(),
        }
    }

    #[test]
    fn csv_has_bom_header_and_quoted_rows() {
        let bytes = csv_bytes(&sample_set()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with('\u{feff}'));

        let mut reader = csv::Reader::from_reader(text.trim_start_matches('\u{feff}').as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "image_file");
        assert_eq!(&headers[1], "ocr_result");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[1][1], "| 品番 | 個数 |\n| X, Y | \"2\" |");
        assert!(rows[2][1].starts_with("ERROR:"));
    }

    #[test]
    fn json_is_indented_and_keeps_non_ascii() {
        let bytes = json_bytes(&sample_set().json_records()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n    {\n        \""));
        assert!(text.contains("照明A"));
        assert!(!text.contains("\\u"));
    }

    #[tokio::test]
    async fn json_sink_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");
        let set = sample_set();

        write_results(&path, &set, OutputFormat::Json).await.unwrap();
        assert!(!tmp_path_for(&path).exists());

        let back: Vec<JsonRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.len(), set.records.len());
        let names: Vec<&str> = back.iter().map(JsonRecord::filename).collect();
        assert_eq!(names, ["image0.png", "image1.png", "image2.png"]);
        match &back[1] {
            JsonRecord::Failure(row) => {
                assert_eq!(row.error, crate::output::PARSE_FAILED);
                assert_eq!(row.raw_output, "| 品番 | 個数 |\n| X, Y | \"2\" |");
            }
            other => panic!("expected failure row, got {other:?}"),
        }
    }

    #[test]
    fn tmp_path_keeps_extension() {
        assert_eq!(
            tmp_path_for(Path::new("/a/b/result.csv")),
            PathBuf::from("/a/b/result.csv.tmp")
        );
    }

    #[tokio::test]
    async fn journal_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let set = sample_set();

        let mut journal = Journal::open(&path).await.unwrap();
        journal.append(&set.records[0]).await.unwrap();
        drop(journal);

        let mut journal = Journal::open(&path).await.unwrap();
        journal.append(&set.records[2]).await.unwrap();

        let back = Journal::read(&path).await.unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0], set.records[0]);
        assert!(matches!(back[1].outcome, OcrOutcome::Failed { .. }));
    }
}
