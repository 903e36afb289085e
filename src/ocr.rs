use anyhow::{anyhow, Context, Result};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct OcrOptions {
    /// Rasterisation resolution handed to pdftoppm
    pub dpi: u32,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`
    pub language: String,
    /// Directory holding pdftoppm, pdfinfo and tesseract; `PATH` when unset
    pub tools_dir: Option<PathBuf>,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            dpi: 300,
            language: "eng".to_string(),
            tools_dir: None,
        }
    }
}

#[derive(Clone)]
pub struct OcrProcessor {
    options: OcrOptions,
}

impl OcrProcessor {
    pub fn new(options: OcrOptions) -> Self {
        Self { options }
    }

    fn program(&self, name: &str) -> PathBuf {
        match &self.options.tools_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// OCR every page of `pdf_path`, one page at a time.
    ///
    /// Each page is rendered to PNG with pdftoppm and read back with
    /// tesseract. A page that tesseract can't read is skipped; the call only
    /// fails outright if no page could be read.
    pub async fn extract_text_ocr(
        &self,
        pdf_path: &Path,
        page_count: usize,
        progress: &ProgressBar,
    ) -> Result<String> {
        if page_count == 0 {
            return Err(anyhow!("No pages found in PDF"));
        }

        info!("Starting OCR for {} ({} pages)", pdf_path.display(), page_count);
        progress.set_length(page_count as u64);
        progress.set_position(0);

        let temp_dir = tempfile::Builder::new()
            .prefix("pdf-keyword-ocr")
            .tempdir()
            .context("Failed to create OCR scratch directory")?;

        let mut full_text = String::new();
        let mut failed_pages = 0;

        for page_num in 1..=page_count {
            progress.set_message(format!(
                "Converting page {} of {} to image...",
                page_num, page_count
            ));
            let image_path = self
                .render_page(pdf_path, page_num, temp_dir.path())
                .await?;

            progress.set_message(format!(
                "Extracting text from page {} of {}...",
                page_num, page_count
            ));
            match self.ocr_image(&image_path).await {
                Ok(page_text) => {
                    full_text.push_str(&page_text);
                    full_text.push('\n');
                }
                Err(e) => {
                    warn!("OCR failed for page {}: {:#}", page_num, e);
                    failed_pages += 1;
                }
            }

            // Pages at 300 dpi are large; don't keep them around
            if let Err(e) = tokio::fs::remove_file(&image_path).await {
                debug!("Could not remove {}: {}", image_path.display(), e);
            }
            progress.inc(1);
        }

        if failed_pages == page_count {
            return Err(anyhow!("OCR failed on all {} pages", page_count));
        }

        progress.set_message("OCR complete!");
        Ok(full_text)
    }

    /// Render a single 1-based page to `<dir>/page-<n>.png`
    async fn render_page(&self, pdf_path: &Path, page_num: usize, dir: &Path) -> Result<PathBuf> {
        let prefix = dir.join(format!("page-{}", page_num));
        let page = page_num.to_string();

        let output = Command::new(self.program("pdftoppm"))
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(self.options.dpi.to_string())
            .arg("-f")
            .arg(&page)
            .arg("-l")
            .arg(&page)
            .arg(pdf_path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run pdftoppm")?;
        check_for_command_failure("pdftoppm", &output)?;

        let image_path = prefix.with_extension("png");
        if !image_path.exists() {
            return Err(anyhow!("pdftoppm produced no image for page {}", page_num));
        }
        Ok(image_path)
    }

    /// OCR a single image file
    async fn ocr_image(&self, image_path: &Path) -> Result<String> {
        let output = Command::new(self.program("tesseract"))
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.options.language)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run tesseract")?;
        check_for_command_failure("tesseract", &output)?;

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Page count as reported by poppler's pdfinfo, for files lopdf can't open
    pub async fn page_count_with_pdfinfo(&self, pdf_path: &Path) -> Result<usize> {
        let output = Command::new(self.program("pdfinfo"))
            .arg(pdf_path)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to run pdfinfo")?;
        check_for_command_failure("pdfinfo", &output)?;

        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| anyhow!("pdfinfo did not report a page count"))
    }

    /// Check if OCR tools are available
    pub async fn check_ocr_availability(&self) -> bool {
        let tesseract_available = probe(&self.program("tesseract"), "--version").await;
        let pdftoppm_available = probe(&self.program("pdftoppm"), "-v").await;

        if !tesseract_available {
            error!("Tesseract not found. Install with: apt install tesseract-ocr");
        }

        if !pdftoppm_available {
            error!("pdftoppm not found. Install with: apt install poppler-utils");
        }

        tesseract_available && pdftoppm_available
    }
}

async fn probe(program: &Path, arg: &str) -> bool {
    Command::new(program)
        .arg(arg)
        .kill_on_drop(true)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn parse_pdfinfo_pages(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|count| count.trim().parse().ok())
}

fn check_for_command_failure(program: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} failed ({}): {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}
