//! OCR entry points: a PDF or a directory of numbered images in, an ordered
//! [`ResultSet`] out.
//!
//! Every image gets exactly one request. A failed request is logged and kept
//! as a [`OcrOutcome::Failed`] record; the run always continues to the next
//! image. Callers that want a failed request to fail the run use
//! [`ResultSet::into_result`].
//!
//! The `*_with_client` variants take any [`VisionClient`], which is how tests
//! run the whole pipeline without a network.

use crate::config::{OcrConfig, OutputFormat};
use crate::error::{ItemError, OcrError};
use crate::output::{OcrOutcome, OcrRecord, ResultSet, RunStats};
use crate::pipeline::client::{Backend, VisionClient};
use crate::pipeline::encode::ImagePayload;
use crate::pipeline::parse::{failed_record, parse_response, ItemMeta};
use crate::pipeline::render::Document;
use crate::pipeline::segment::{self, Region};
use crate::pipeline::{input, render};
use crate::prompts::prompt_for;
use crate::sink::{self, Journal};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// OCR every selected page (or every region of it) of a PDF.
///
/// # Errors
/// Only fatal problems are errors: a missing or unreadable PDF, pdfium
/// failures, an unusable provider configuration, or a journal write failure.
/// Failed requests are recorded, not returned.
pub async fn ocr_pdf(path: impl AsRef<Path>, config: &OcrConfig) -> Result<ResultSet, OcrError> {
    let pdf_path = input::resolve_pdf(path.as_ref())?;
    let client = Backend::from_config(config)?;
    ocr_pdf_with_client(&pdf_path, &client, config).await
}

/// [`ocr_pdf`] with a caller-supplied client.
pub async fn ocr_pdf_with_client<C: VisionClient>(
    path: impl AsRef<Path>,
    client: &C,
    config: &OcrConfig,
) -> Result<ResultSet, OcrError> {
    let total_start = Instant::now();
    let pdf_path = input::resolve_pdf(path.as_ref())?;
    info!("Starting OCR: {} via {}", pdf_path.display(), client.describe());

    let render_start = Instant::now();
    let doc = render::render_document(&pdf_path, config).await?;
    let pages = doc.pages.len();
    let items = prepare_pages(doc, config).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Prepared {} images from {} pages in {}ms",
        items.len(),
        pages,
        render_duration_ms
    );

    let mut results = run_items(pdf_path, items, client, config).await?;
    results.stats.pages = pages;
    results.stats.render_duration_ms = render_duration_ms;
    Ok(finish(results, total_start))
}

/// OCR `{prefix}0.png`, `{prefix}1.png`, … from a directory, in numeric order.
///
/// The prefix comes from [`OcrConfig::image_prefix`]. Images are sent as they
/// are; no segmentation is applied.
pub async fn ocr_images(dir: impl AsRef<Path>, config: &OcrConfig) -> Result<ResultSet, OcrError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(OcrError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let client = Backend::from_config(config)?;
    ocr_images_with_client(dir, &client, config).await
}

/// [`ocr_images`] with a caller-supplied client.
pub async fn ocr_images_with_client<C: VisionClient>(
    dir: impl AsRef<Path>,
    client: &C,
    config: &OcrConfig,
) -> Result<ResultSet, OcrError> {
    let total_start = Instant::now();
    let dir = dir.as_ref();
    let images = input::list_numbered_images(dir, &config.image_prefix)?;
    if images.is_empty() {
        warn!(
            "No {}N.png images found in {}",
            config.image_prefix,
            dir.display()
        );
    }
    info!(
        "Starting OCR: {} images in {} via {}",
        images.len(),
        dir.display(),
        client.describe()
    );

    let mut items = Vec::with_capacity(images.len());
    for (index, image) in images.iter().enumerate() {
        let bytes = tokio::fs::read(&image.path)
            .await
            .map_err(|e| OcrError::ImageReadFailed {
                path: image.path.clone(),
                detail: e.to_string(),
            })?;
        items.push(WorkItem {
            meta: ItemMeta::new(index, image.filename()),
            payload: Ok(ImagePayload::from_bytes(bytes, input::mime_for_path(&image.path))),
        });
    }

    let results = run_items(dir.to_path_buf(), items, client, config).await?;
    Ok(finish(results, total_start))
}

/// Run [`ocr_pdf`] and write the result set to `output_path`.
///
/// The sink format is [`OcrConfig::output_format`]; the file is replaced
/// atomically.
pub async fn ocr_pdf_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<RunStats, OcrError> {
    let results = ocr_pdf(path, config).await?;
    sink::write_results(output_path.as_ref(), &results, config.output_format).await?;
    Ok(results.stats)
}

/// Run [`ocr_images`] and write the result set to `output_path`.
pub async fn ocr_images_to_file(
    dir: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<RunStats, OcrError> {
    let results = ocr_images(dir, config).await?;
    sink::write_results(output_path.as_ref(), &results, config.output_format).await?;
    Ok(results.stats)
}

/// What [`split_pdf`] produced for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitPage {
    /// 1-based page number.
    pub page: usize,
    /// Saved page image, when [`OcrConfig::page_dir`] is set.
    pub page_path: Option<PathBuf>,
    pub regions: Vec<Region>,
    /// Saved region crops, when [`OcrConfig::region_dir`] is set.
    pub region_paths: Vec<PathBuf>,
}

/// Rasterise and segment a PDF, persisting the images without any request.
pub async fn split_pdf(path: impl AsRef<Path>, config: &OcrConfig) -> Result<Vec<SplitPage>, OcrError> {
    if config.page_dir.is_none() && config.region_dir.is_none() {
        return Err(OcrError::InvalidConfig(
            "split needs a page or region output directory".into(),
        ));
    }

    let pdf_path = input::resolve_pdf(path.as_ref())?;
    let doc = render::render_document(&pdf_path, config).await?;
    let config = config.clone();

    tokio::task::spawn_blocking(move || split_blocking(&doc, &config))
        .await
        .map_err(|e| OcrError::Internal(format!("Split task panicked: {}", e)))?
}

fn split_blocking(doc: &Document, config: &OcrConfig) -> Result<Vec<SplitPage>, OcrError> {
    let page_paths: Vec<Option<PathBuf>> = match config.page_dir {
        Some(ref dir) => render::save_pages(doc, dir)?.into_iter().map(Some).collect(),
        None => vec![None; doc.pages.len()],
    };

    doc.pages
        .iter()
        .zip(page_paths)
        .map(|(page, page_path)| {
            let regions = segment::segment_image(&page.image, &config.segment);
            let region_paths = match config.region_dir {
                Some(ref dir) => segment::save_regions(&page.image, &regions, page.number, dir)?,
                None => Vec::new(),
            };
            info!("Page {}: {} regions", page.number, regions.len());
            Ok(SplitPage {
                page: page.number,
                page_path,
                regions,
                region_paths,
            })
        })
        .collect()
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One image queued for a request.
struct WorkItem {
    meta: ItemMeta,
    /// An encoding failure is carried to the result set as a failed record.
    payload: Result<ImagePayload, ItemError>,
}

/// Turn rendered pages into work items, segmenting and persisting as
/// configured. CPU-bound, so it runs on the blocking pool.
async fn prepare_pages(doc: Document, config: &OcrConfig) -> Result<Vec<WorkItem>, OcrError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || prepare_pages_blocking(&doc, &config))
        .await
        .map_err(|e| OcrError::Internal(format!("Segment task panicked: {}", e)))?
}

fn prepare_pages_blocking(doc: &Document, config: &OcrConfig) -> Result<Vec<WorkItem>, OcrError> {
    if let Some(ref dir) = config.page_dir {
        render::save_pages(doc, dir)?;
    }

    let mut items = Vec::new();
    for page in &doc.pages {
        if !config.split_regions {
            let index = items.len();
            items.push(WorkItem {
                meta: ItemMeta {
                    index,
                    filename: page.filename(),
                    page: Some(page.number),
                    region: None,
                },
                payload: ImagePayload::png(&page.image),
            });
            continue;
        }

        let regions = segment::segment_image(&page.image, &config.segment);
        if regions.is_empty() {
            warn!("Page {}: no regions found, nothing to send", page.number);
        }
        if let Some(ref dir) = config.region_dir {
            segment::save_regions(&page.image, &regions, page.number, dir)?;
        }

        for region in regions {
            let index = items.len();
            let crop = segment::crop_region(&page.image, &region);
            items.push(WorkItem {
                meta: ItemMeta {
                    index,
                    filename: region.filename(page.number),
                    page: Some(page.number),
                    region: Some(region),
                },
                payload: ImagePayload::png(&crop),
            });
        }
    }
    Ok(items)
}

/// Send every item, at most `config.concurrency` at a time, and collect the
/// records in item order.
async fn run_items<C: VisionClient>(
    source: PathBuf,
    items: Vec<WorkItem>,
    client: &C,
    config: &OcrConfig,
) -> Result<ResultSet, OcrError> {
    let total = items.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(total);
    }

    let mut journal = match config.journal {
        Some(ref path) => Some(Journal::open(path).await?),
        None => None,
    };

    let ocr_start = Instant::now();
    let mut pending = stream::iter(
        items
            .into_iter()
            .map(|item| process_item(client, item, total, config)),
    )
    .buffer_unordered(config.concurrency.max(1));

    let mut records = Vec::with_capacity(total);
    while let Some(record) = pending.next().await {
        report(&record, total, config);
        if let Some(ref mut journal) = journal {
            journal.append(&record).await?;
        }
        records.push(record);
    }

    records.sort_by_key(|r| r.index);
    let mut stats = tally(&records);
    stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(total, total - stats.failed);
    }

    Ok(ResultSet {
        source,
        records,
        stats,
    })
}

async fn process_item<C: VisionClient>(
    client: &C,
    item: WorkItem,
    total: usize,
    config: &OcrConfig,
) -> OcrRecord {
    let WorkItem { meta, payload } = item;
    if let Some(ref cb) = config.progress_callback {
        cb.on_item_start(meta.index, total, &meta.filename);
    }

    let prompt = prompt_for(config, &meta.filename);
    let start = Instant::now();
    let response = match payload {
        Ok(ref image) => request(client, &prompt, image, config.api_timeout_secs).await,
        Err(e) => Err(e),
    };
    let elapsed = start.elapsed();

    match response {
        Ok(raw) => parse_response(meta, raw, elapsed, config.strip_code_fences),
        Err(e) => {
            warn!("{}: {}", meta.filename, e);
            failed_record(meta, e, elapsed)
        }
    }
}

async fn request<C: VisionClient>(
    client: &C,
    prompt: &str,
    image: &ImagePayload,
    timeout_secs: Option<u64>,
) -> Result<String, ItemError> {
    match timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), client.complete(prompt, image))
            .await
            .unwrap_or(Err(ItemError::Timeout { secs })),
        None => client.complete(prompt, image).await,
    }
}

fn report(record: &OcrRecord, total: usize, config: &OcrConfig) {
    match &record.outcome {
        OcrOutcome::Parsed { .. } => {
            debug!("{}: parsed in {}ms", record.filename, record.duration_ms);
        }
        OcrOutcome::Unparsed { reason, .. } => {
            // Table prompts are never expected to be JSON.
            if config.output_format == OutputFormat::Json {
                warn!("{}: response is not a JSON object ({})", record.filename, reason);
            } else {
                debug!("{}: answered in {}ms", record.filename, record.duration_ms);
            }
        }
        OcrOutcome::Failed { .. } => {}
    }

    if let Some(ref cb) = config.progress_callback {
        match &record.outcome {
            OcrOutcome::Failed { error } => {
                cb.on_item_error(record.index, total, &record.filename, &error.to_string())
            }
            _ => cb.on_item_complete(record.index, total, &record.filename),
        }
    }
}

fn tally(records: &[OcrRecord]) -> RunStats {
    let mut stats = RunStats {
        total_items: records.len(),
        ..RunStats::default()
    };
    for record in records {
        match record.outcome {
            OcrOutcome::Parsed { .. } => stats.parsed += 1,
            OcrOutcome::Unparsed { .. } => stats.unparsed += 1,
            OcrOutcome::Failed { .. } => stats.failed += 1,
        }
    }
    stats
}

fn finish(mut results: ResultSet, total_start: Instant) -> ResultSet {
    results.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    let s = &results.stats;
    info!(
        "OCR complete: {} images ({} parsed, {} unparsed, {} failed) in {:.2}s",
        s.total_items,
        s.parsed,
        s.unparsed,
        s.failed,
        s.total_duration_ms as f64 / 1000.0
    );
    results
}
