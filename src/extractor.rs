use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use walkdir::WalkDir;

use crate::database::{Database, ExtractionResult};
use crate::ocr::{OcrOptions, OcrProcessor};
use crate::pdf::{PdfProcessor, DEFAULT_MIN_TEXT_CHARS};
use crate::progress::ProgressTracker;

/// Which text sources to try, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Text layer first, OCR when there isn't one
    #[default]
    Auto,
    TextOnly,
    OcrOnly,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Auto => "auto",
            ExtractionMode::TextOnly => "text_only",
            ExtractionMode::OcrOnly => "ocr_only",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown extraction mode '{0}'")]
pub struct UnknownMode(String);

impl FromStr for ExtractionMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ExtractionMode::Auto),
            "text_only" => Ok(ExtractionMode::TextOnly),
            "ocr_only" => Ok(ExtractionMode::OcrOnly),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Where a result's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Direct,
    Ocr,
    /// OCR was needed but failed; whatever the text layer had is kept
    DirectPartial,
    Error,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::DirectPartial => "direct_partial",
            ExtractionMethod::Error => "error",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown extraction method '{0}'")]
pub struct UnknownMethod(String);

impl FromStr for ExtractionMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(ExtractionMethod::Direct),
            "ocr" => Ok(ExtractionMethod::Ocr),
            "direct_partial" => Ok(ExtractionMethod::DirectPartial),
            "error" => Ok(ExtractionMethod::Error),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub threads: usize,
    pub mode: ExtractionMode,
    pub min_text_chars: usize,
    pub full_hash: bool,
    /// Ignore cached extractions
    pub force: bool,
    pub show_progress: bool,
    pub ocr: OcrOptions,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            mode: ExtractionMode::Auto,
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            full_hash: false,
            force: false,
            show_progress: false,
            ocr: OcrOptions::default(),
        }
    }
}

const NO_OCR_TEXT: &str = "OCR completed but no text was found in the PDF. \
     The PDF might be empty or the images might not contain readable text.";

#[derive(Clone)]
pub struct PdfExtractor {
    options: ExtractorOptions,
    pdf_processor: PdfProcessor,
    ocr_processor: OcrProcessor,
    database: Option<Arc<Database>>,
}

impl PdfExtractor {
    pub fn new(options: ExtractorOptions, database: Option<Arc<Database>>) -> Self {
        Self {
            pdf_processor: PdfProcessor::new(options.min_text_chars),
            ocr_processor: OcrProcessor::new(options.ocr.clone()),
            options,
            database,
        }
    }

    /// Expand the given files and directories into a sorted list of PDFs
    pub fn find_pdf_files(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut pdf_files = Vec::new();

        for input in inputs {
            if input.is_dir() {
                for entry in WalkDir::new(input) {
                    let entry = entry?;
                    let path = entry.path();

                    if path.is_file() && is_pdf(path) {
                        pdf_files.push(path.to_path_buf());
                    }
                }
            } else if input.is_file() {
                if !is_pdf(input) {
                    warn!("{} does not have a .pdf extension", input.display());
                }
                pdf_files.push(input.clone());
            } else {
                return Err(anyhow!("No such file or directory: {}", input.display()));
            }
        }

        pdf_files.sort();
        pdf_files.dedup();
        Ok(pdf_files)
    }

    /// Process multiple PDF files concurrently
    pub async fn process_files(&self, pdf_files: Vec<PathBuf>) -> Result<Vec<ExtractionResult>> {
        let ocr_available = match self.options.mode {
            ExtractionMode::TextOnly => false,
            _ => {
                let available = self.ocr_processor.check_ocr_availability().await;
                if !available {
                    warn!("OCR tools not available - scanned PDFs will not be readable");
                }
                available
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.options.threads.max(1)));
        let progress = ProgressTracker::new(pdf_files.len(), self.options.show_progress);

        // Dropping the set aborts every task still running, which kills their
        // child processes and removes their OCR scratch directories
        let mut tasks = JoinSet::new();
        for (index, pdf_path) in pdf_files.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let progress = progress.clone();
            let extractor = self.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                let page_bar = progress.page_bar(&display_name(&pdf_path));
                let result = extractor
                    .process_single_file(&pdf_path, index + 1, ocr_available, &page_bar)
                    .await;
                page_bar.finish_and_clear();
                progress.increment();

                let result = result.unwrap_or_else(|e| {
                    error!("Processing failed for {}: {:#}", pdf_path.display(), e);
                    extractor.failed_result(&pdf_path, None, 0, Instant::now(), format!("{:#}", e))
                });
                Ok::<_, anyhow::Error>((index, result))
            });
        }

        // Wait for all tasks, then restore input order
        let mut indexed = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            indexed.push(joined??);
        }
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<_> = indexed.into_iter().map(|(_, result)| result).collect();

        let fresh: Vec<_> = results.iter().filter(|r| !r.from_cache).cloned().collect();
        if let Some(db) = &self.database {
            if !fresh.is_empty() {
                info!("Inserting {} results into database", fresh.len());
                if let Err(e) = db.batch_insert(&fresh).await {
                    warn!("Could not cache extraction results: {:#}", e);
                }
            }
        }

        progress.finish();
        Ok(results)
    }

    /// Process a single PDF file
    async fn process_single_file(
        &self,
        pdf_path: &Path,
        file_index: usize,
        ocr_available: bool,
        page_bar: &ProgressBar,
    ) -> Result<ExtractionResult> {
        let start_time = Instant::now();
        let relative_path = pdf_path.to_string_lossy().to_string();

        info!("Processing ({}): {}", file_index, relative_path);

        let metadata = tokio::fs::metadata(pdf_path)
            .await
            .with_context(|| format!("Failed to stat {}", relative_path))?;
        let file_size = metadata.len() as i64;
        let file_hash = self.calculate_file_hash(pdf_path).await?;

        if !self.options.force {
            if let Some(db) = &self.database {
                let cached = match db.find_cached(&relative_path, &file_hash, self.options.mode).await {
                    Ok(cached) => cached,
                    Err(e) => {
                        warn!("Cache lookup failed for {}: {:#}", relative_path, e);
                        None
                    }
                };
                match cached {
                    // OCR has become available since the partial text was cached
                    Some(cached)
                        if cached.extraction_method == ExtractionMethod::DirectPartial
                            && ocr_available =>
                    {
                        info!("Retrying OCR for {}", relative_path);
                    }
                    Some(mut cached) => {
                        info!("Using cached {} extraction for {}", cached.extraction_method, relative_path);
                        cached.from_cache = true;
                        return Ok(cached);
                    }
                    None => {}
                }
            }
        }

        let fail = |message: String| {
            self.failed_result(pdf_path, Some(file_hash.clone()), file_size, start_time, message)
        };

        let (text, page_count, method) = match self.options.mode {
            ExtractionMode::OcrOnly => {
                let page_count = match self.page_count(pdf_path).await {
                    Ok(count) => count,
                    Err(e) => return Ok(fail(format!("{:#}", e))),
                };
                match self.run_ocr(pdf_path, page_count, ocr_available, page_bar).await {
                    Ok(text) => {
                        info!("Used OCR only for {}", relative_path);
                        (text, page_count, ExtractionMethod::Ocr)
                    }
                    Err(e) => {
                        error!("OCR extraction failed for {}: {:#}", relative_path, e);
                        return Ok(fail(format!("OCR failed: {:#}", e)));
                    }
                }
            }
            ExtractionMode::TextOnly => match self.direct(pdf_path).await {
                Ok((text, page_count)) if !text.trim().is_empty() => {
                    (text, page_count, ExtractionMethod::Direct)
                }
                Ok(_) => {
                    return Ok(fail(
                        "No extractable text layer found and OCR is disabled".to_string(),
                    ))
                }
                Err(e) => return Ok(fail(format!("{:#}", e))),
            },
            ExtractionMode::Auto => match self.direct(pdf_path).await {
                Ok((text, page_count)) if self.pdf_processor.has_extractable_text(&text) => {
                    info!("Extracted text directly from {}", relative_path);
                    (text, page_count, ExtractionMethod::Direct)
                }
                Ok((text, page_count)) => {
                    match self.run_ocr(pdf_path, page_count, ocr_available, page_bar).await {
                        Ok(ocr_text) => {
                            info!("Used OCR for {}", relative_path);
                            (ocr_text, page_count, ExtractionMethod::Ocr)
                        }
                        Err(e) if !text.trim().is_empty() => {
                            warn!("OCR failed for {}: {:#}", relative_path, e);
                            (text, page_count, ExtractionMethod::DirectPartial)
                        }
                        Err(e) => return Ok(fail(format!("{:#}", e))),
                    }
                }
                Err(e) => {
                    // lopdf gave up; poppler may still be able to read it
                    let ocr = match self.ocr_processor.page_count_with_pdfinfo(pdf_path).await {
                        Ok(page_count) => self
                            .run_ocr(pdf_path, page_count, ocr_available, page_bar)
                            .await
                            .map(|text| (text, page_count)),
                        Err(count_e) => Err(count_e),
                    };
                    match ocr {
                        Ok((ocr_text, page_count)) => {
                            info!("Used OCR after direct extraction failed for {}", relative_path);
                            (ocr_text, page_count, ExtractionMethod::Ocr)
                        }
                        Err(ocr_e) => {
                            error!(
                                "Both direct and OCR extraction failed for {}: direct={:#}, ocr={:#}",
                                relative_path, e, ocr_e
                            );
                            return Ok(fail(format!("Direct: {:#}, OCR: {:#}", e, ocr_e)));
                        }
                    }
                }
            },
        };

        Ok(ExtractionResult {
            id: None,
            file_path: relative_path,
            file_hash: Some(file_hash),
            file_size,
            extraction_method: method,
            extracted_text: text,
            page_count,
            processing_time_seconds: start_time.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now(),
            success: true,
            error_message: None,
            mode: self.options.mode,
            from_cache: false,
        })
    }

    async fn direct(&self, pdf_path: &Path) -> Result<(String, usize)> {
        let processor = self.pdf_processor.clone();
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || processor.extract_text_direct(&path)).await?
    }

    async fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        let processor = self.pdf_processor.clone();
        let path = pdf_path.to_path_buf();
        match tokio::task::spawn_blocking(move || processor.get_page_count(&path)).await? {
            Ok(count) => Ok(count),
            Err(e) => {
                warn!("{:#}; asking pdfinfo instead", e);
                self.ocr_processor.page_count_with_pdfinfo(pdf_path).await
            }
        }
    }

    async fn run_ocr(
        &self,
        pdf_path: &Path,
        page_count: usize,
        ocr_available: bool,
        page_bar: &ProgressBar,
    ) -> Result<String> {
        if !ocr_available {
            return Err(anyhow!(
                "OCR tools not available. Please ensure Tesseract OCR and pdftoppm are installed."
            ));
        }

        let text = self
            .ocr_processor
            .extract_text_ocr(pdf_path, page_count, page_bar)
            .await?;

        if text.trim().is_empty() {
            return Err(anyhow!(NO_OCR_TEXT));
        }
        Ok(text)
    }

    fn failed_result(
        &self,
        pdf_path: &Path,
        file_hash: Option<String>,
        file_size: i64,
        start_time: Instant,
        message: String,
    ) -> ExtractionResult {
        ExtractionResult {
            id: None,
            file_path: pdf_path.to_string_lossy().to_string(),
            file_hash,
            file_size,
            extraction_method: ExtractionMethod::Error,
            extracted_text: String::new(),
            page_count: 0,
            processing_time_seconds: start_time.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now(),
            success: false,
            error_message: Some(message),
            mode: self.options.mode,
            from_cache: false,
        }
    }

    /// Calculate file hash (fast or full based on settings)
    async fn calculate_file_hash(&self, file_path: &Path) -> Result<String> {
        if self.options.full_hash {
            calculate_full_hash(file_path).await
        } else {
            calculate_fast_hash(file_path).await
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

const HASH_CHUNK: u64 = 1024;

/// Calculate fast hash (metadata + first/last chunks)
async fn calculate_fast_hash(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let metadata = tokio::fs::metadata(file_path).await?;
    let file_len = metadata.len();
    let mut hasher = Sha256::new();

    // Hash metadata
    hasher.update(file_len.to_be_bytes());
    if let Ok(modified) = metadata.modified() {
        if let Ok(duration) = modified.duration_since(std::time::UNIX_EPOCH) {
            hasher.update(duration.as_secs().to_be_bytes());
        }
    }

    // Hash first and last 1KB
    let mut file = tokio::fs::File::open(file_path).await?;
    let mut chunk = vec![0u8; file_len.min(HASH_CHUNK) as usize];
    file.read_exact(&mut chunk).await?;
    hasher.update(&chunk);

    if file_len > HASH_CHUNK {
        let tail_start = file_len.saturating_sub(HASH_CHUNK).max(HASH_CHUNK);
        let mut tail = vec![0u8; (file_len - tail_start) as usize];
        file.seek(std::io::SeekFrom::Start(tail_start)).await?;
        file.read_exact(&mut tail).await?;
        hasher.update(&tail);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Calculate full file hash
async fn calculate_full_hash(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let content = tokio::fs::read(file_path).await?;
    let hash = Sha256::digest(&content);
    Ok(format!("{:x}", hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::tests::write_pdf;

    fn text_only() -> ExtractorOptions {
        ExtractorOptions {
            mode: ExtractionMode::TextOnly,
            ..ExtractorOptions::default()
        }
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            ExtractionMethod::Direct,
            ExtractionMethod::Ocr,
            ExtractionMethod::DirectPartial,
            ExtractionMethod::Error,
        ] {
            assert_eq!(method.as_str().parse::<ExtractionMethod>().unwrap(), method);
        }
        assert!("scan".parse::<ExtractionMethod>().is_err());
    }

    #[test]
    fn finds_pdfs_in_directories_and_explicit_files() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"").unwrap();
        std::fs::write(nested.join("A.PDF"), b"").unwrap();
        std::fs::write(nested.join("notes.txt"), b"").unwrap();

        let extractor = PdfExtractor::new(text_only(), None);
        let found = extractor
            .find_pdf_files(&[dir.path().to_path_buf(), dir.path().join("b.pdf")])
            .unwrap();

        assert_eq!(found, vec![dir.path().join("b.pdf"), nested.join("A.PDF")]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let extractor = PdfExtractor::new(text_only(), None);
        assert!(extractor
            .find_pdf_files(&[PathBuf::from("/definitely/not/here.pdf")])
            .is_err());
    }

    #[tokio::test]
    async fn fast_hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");

        std::fs::write(&path, vec![7u8; 5000]).unwrap();
        let first = calculate_fast_hash(&path).await.unwrap();
        assert_eq!(first, calculate_fast_hash(&path).await.unwrap());

        let mut changed = vec![7u8; 5000];
        changed[4999] = 8;
        std::fs::write(&path, changed).unwrap();
        assert_ne!(first, calculate_fast_hash(&path).await.unwrap());

        std::fs::write(&path, b"tiny").unwrap();
        assert_eq!(calculate_fast_hash(&path).await.unwrap().len(), 64);
        assert_eq!(calculate_full_hash(&path).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn text_only_extracts_text_layer_and_reports_blank_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let text_pdf = dir.path().join("text.pdf");
        let blank_pdf = dir.path().join("blank.pdf");
        write_pdf(&text_pdf, &[&["Invoice for services, invoice number 42, paid in full"]]);
        write_pdf(&blank_pdf, &[&[]]);

        let extractor = PdfExtractor::new(text_only(), None);
        let results = extractor
            .process_files(vec![blank_pdf.clone(), text_pdf.clone()])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);

        let blank = &results[0];
        assert!(!blank.success);
        assert_eq!(blank.extraction_method, ExtractionMethod::Error);
        assert!(blank.error_message.as_deref().unwrap().contains("OCR is disabled"));

        let text = &results[1];
        assert!(text.success);
        assert_eq!(text.extraction_method, ExtractionMethod::Direct);
        assert_eq!(text.page_count, 1);
        assert!(text.extracted_text.to_lowercase().contains("invoice"));
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("text.pdf");
        write_pdf(&pdf, &[&["Invoice for services, invoice number 42, paid in full"]]);

        let db = Arc::new(Database::new(&dir.path().join("cache.db")).await.unwrap());
        db.init_schema().await.unwrap();
        let extractor = PdfExtractor::new(text_only(), Some(db.clone()));

        let first = extractor.process_files(vec![pdf.clone()]).await.unwrap();
        assert!(!first[0].from_cache);

        let second = extractor.process_files(vec![pdf.clone()]).await.unwrap();
        assert!(second[0].from_cache);
        assert_eq!(second[0].extracted_text, first[0].extracted_text);

        let forced = PdfExtractor::new(
            ExtractorOptions {
                force: true,
                ..text_only()
            },
            Some(db),
        );
        let third = forced.process_files(vec![pdf]).await.unwrap();
        assert!(!third[0].from_cache);
    }

    const SHORT_TEXT: &str = "tax due";

    /// Stand-ins for poppler and tesseract. pdftoppm writes an empty image;
    /// tesseract prints `ocr_text`.
    #[cfg(unix)]
    fn fake_tools(dir: &Path, ocr_text: &str) {
        write_tool(
            dir,
            "pdftoppm",
            "[ \"$1\" = \"-v\" ] && exit 0\nfor last; do :; done\n: > \"$last.png\"",
        );
        write_tool(
            dir,
            "tesseract",
            &format!("[ \"$1\" = \"--version\" ] && exit 0\nprintf '%s\\n' '{}'", ocr_text),
        );
        write_tool(dir, "pdfinfo", "printf 'Title: scan\\nPages:          2\\n'");
    }

    #[cfg(unix)]
    fn write_tool(dir: &Path, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn with_tools(mode: ExtractionMode, tools_dir: &Path) -> ExtractorOptions {
        ExtractorOptions {
            mode,
            ocr: OcrOptions {
                tools_dir: Some(tools_dir.to_path_buf()),
                ..OcrOptions::default()
            },
            ..ExtractorOptions::default()
        }
    }

    #[tokio::test]
    async fn auto_without_ocr_tools_keeps_short_text_and_fails_blank_pages() {
        let dir = tempfile::tempdir().unwrap();
        let no_tools = tempfile::tempdir().unwrap();
        let blank = dir.path().join("blank.pdf");
        let short = dir.path().join("short.pdf");
        write_pdf(&blank, &[&[]]);
        write_pdf(&short, &[&[SHORT_TEXT]]);

        let extractor = PdfExtractor::new(with_tools(ExtractionMode::Auto, no_tools.path()), None);
        let results = extractor
            .process_files(vec![blank, short])
            .await
            .unwrap();

        assert!(!results[0].success);
        assert_eq!(results[0].extraction_method, ExtractionMethod::Error);
        assert!(results[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("OCR tools not available"));

        assert!(results[1].success);
        assert_eq!(results[1].extraction_method, ExtractionMethod::DirectPartial);
        assert!(results[1].extracted_text.contains("tax"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn auto_uses_ocr_when_the_text_layer_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        fake_tools(tools.path(), "scanned invoice 17");
        let blank = dir.path().join("blank.pdf");
        write_pdf(&blank, &[&[]]);

        let extractor = PdfExtractor::new(with_tools(ExtractionMode::Auto, tools.path()), None);
        let results = extractor.process_files(vec![blank]).await.unwrap();

        assert!(results[0].success);
        assert_eq!(results[0].extraction_method, ExtractionMethod::Ocr);
        assert_eq!(results[0].page_count, 1);
        assert_eq!(results[0].extracted_text, "scanned invoice 17\n\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn whitespace_only_ocr_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        fake_tools(tools.path(), "   ");
        let blank = dir.path().join("blank.pdf");
        write_pdf(&blank, &[&[]]);

        let extractor = PdfExtractor::new(with_tools(ExtractionMode::Auto, tools.path()), None);
        let results = extractor.process_files(vec![blank]).await.unwrap();

        assert!(!results[0].success);
        assert_eq!(results[0].error_message.as_deref(), Some(NO_OCR_TEXT));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_pdf_is_counted_by_pdfinfo_and_ocred() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        fake_tools(tools.path(), "invoice total");
        let broken = dir.path().join("broken.pdf");
        std::fs::write(&broken, b"%PDF-1.4 not really").unwrap();

        let extractor = PdfExtractor::new(with_tools(ExtractionMode::Auto, tools.path()), None);
        let results = extractor.process_files(vec![broken]).await.unwrap();

        assert!(results[0].success);
        assert_eq!(results[0].extraction_method, ExtractionMethod::Ocr);
        assert_eq!(results[0].page_count, 2);
        assert_eq!(results[0].extracted_text.matches("invoice total").count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_is_only_reused_by_the_same_mode() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        fake_tools(tools.path(), "scanned copy");
        let pdf = dir.path().join("text.pdf");
        write_pdf(&pdf, &[&["Invoice for services, invoice number 42, paid in full"]]);

        let db = Arc::new(Database::new(&dir.path().join("cache.db")).await.unwrap());
        db.init_schema().await.unwrap();

        let text = PdfExtractor::new(text_only(), Some(db.clone()));
        let first = text.process_files(vec![pdf.clone()]).await.unwrap();
        assert_eq!(first[0].extraction_method, ExtractionMethod::Direct);

        let ocr = PdfExtractor::new(with_tools(ExtractionMode::OcrOnly, tools.path()), Some(db.clone()));
        let second = ocr.process_files(vec![pdf.clone()]).await.unwrap();
        assert!(!second[0].from_cache);
        assert_eq!(second[0].extraction_method, ExtractionMethod::Ocr);
        assert_eq!(second[0].extracted_text, "scanned copy\n\n");

        let again = ocr.process_files(vec![pdf]).await.unwrap();
        assert!(again[0].from_cache);
        assert_eq!(again[0].extraction_method, ExtractionMethod::Ocr);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn partial_text_is_retried_once_ocr_is_available() {
        let dir = tempfile::tempdir().unwrap();
        let no_tools = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        fake_tools(tools.path(), "tax due on the full scanned page");
        let pdf = dir.path().join("short.pdf");
        write_pdf(&pdf, &[&[SHORT_TEXT]]);

        let db = Arc::new(Database::new(&dir.path().join("cache.db")).await.unwrap());
        db.init_schema().await.unwrap();

        let without = PdfExtractor::new(with_tools(ExtractionMode::Auto, no_tools.path()), Some(db.clone()));
        let first = without.process_files(vec![pdf.clone()]).await.unwrap();
        assert_eq!(first[0].extraction_method, ExtractionMethod::DirectPartial);

        // Still no OCR: the partial text is as good as it gets
        let second = without.process_files(vec![pdf.clone()]).await.unwrap();
        assert!(second[0].from_cache);

        let with = PdfExtractor::new(with_tools(ExtractionMode::Auto, tools.path()), Some(db));
        let third = with.process_files(vec![pdf]).await.unwrap();
        assert!(!third[0].from_cache);
        assert_eq!(third[0].extraction_method, ExtractionMethod::Ocr);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_a_run_stops_ocr_and_removes_its_scratch_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tempfile::tempdir().unwrap();
        let marker = dir.path().join("scratch-dir");
        fake_tools(tools.path(), "unused");
        // Record where the page is being rendered, then hang
        write_tool(
            tools.path(),
            "pdftoppm",
            &format!(
                "[ \"$1\" = \"-v\" ] && exit 0\nfor last; do :; done\ndirname \"$last\" > '{}'\nexec sleep 30",
                marker.display()
            ),
        );
        let pdf = dir.path().join("scan.pdf");
        write_pdf(&pdf, &[&[]]);

        let extractor = PdfExtractor::new(with_tools(ExtractionMode::OcrOnly, tools.path()), None);
        let started = async {
            while std::fs::read_to_string(&marker).map_or(true, |s| s.trim().is_empty()) {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
        };
        tokio::select! {
            _ = extractor.process_files(vec![pdf]) => panic!("OCR should still be running"),
            _ = tokio::time::timeout(std::time::Duration::from_secs(10), started) => {}
        }

        let scratch = PathBuf::from(std::fs::read_to_string(&marker).unwrap().trim());
        let mut removed = false;
        for _ in 0..100 {
            if !scratch.exists() {
                removed = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(removed, "{} was left behind", scratch.display());
    }
}
