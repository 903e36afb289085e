use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use pdf_keyword_estimator::extractor::{ExtractionMode, ExtractorOptions};
use pdf_keyword_estimator::ocr::OcrOptions;
use pdf_keyword_estimator::paths;
use pdf_keyword_estimator::pdf::DEFAULT_MIN_TEXT_CHARS;
use pdf_keyword_estimator::report::DEFAULT_PREVIEW_CHARS;

#[derive(Parser, Debug, Clone)]
#[command(name = "pdf-keyword-estimator")]
#[command(about = "Count weighted keywords in PDF files and total their value")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Keyword table (CSV of keyword,value)
    #[arg(long, global = true, env = "PDF_ESTIMATOR_KEYWORDS")]
    pub keywords_file: Option<PathBuf>,

    /// SQLite database caching extractions and estimate history
    #[arg(short, long, global = true, env = "PDF_ESTIMATOR_DB")]
    pub database: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Count keywords in PDFs and report their total value
    Estimate(EstimateArgs),

    /// Manage the stored keyword table
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct EstimateArgs {
    /// PDF files, or directories to search for PDFs
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Keyword and its value, e.g. -k "late fee=25" (repeatable; replaces the stored table)
    #[arg(short, long = "keyword", value_name = "KEYWORD=VALUE")]
    pub keywords: Vec<String>,

    /// Don't save -k keywords back to the keyword table
    #[arg(long)]
    pub no_save: bool,

    /// Number of files processed at once
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Skip OCR and only do direct text extraction
    #[arg(long, conflicts_with = "ocr_only")]
    pub text_only: bool,

    /// Skip direct text extraction and only use OCR
    #[arg(long)]
    pub ocr_only: bool,

    /// Text layers shorter than this many characters count as missing
    #[arg(long, default_value_t = DEFAULT_MIN_TEXT_CHARS)]
    pub min_text_chars: usize,

    /// Resolution pages are rendered at for OCR
    #[arg(long, default_value = "300")]
    pub dpi: u32,

    /// Tesseract language(s)
    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    /// Directory containing pdftoppm, pdfinfo and tesseract (default: search PATH)
    #[arg(long, env = "PDF_ESTIMATOR_OCR_TOOLS", value_name = "DIR")]
    pub ocr_tools_dir: Option<PathBuf>,

    /// Use full file hashing (slower but more accurate)
    #[arg(long)]
    pub full_hash: bool,

    /// Re-extract files even if a cached extraction exists
    #[arg(long)]
    pub force: bool,

    /// Don't read or write the database
    #[arg(long)]
    pub no_cache: bool,

    /// Export results (.xlsx, .csv or .json; a directory gets generated .xlsx names)
    #[arg(short, long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Show the start of the extracted text
    #[arg(long)]
    pub preview: bool,

    /// Characters of extracted text to show with --preview
    #[arg(long, default_value_t = DEFAULT_PREVIEW_CHARS)]
    pub preview_chars: usize,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Hide progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum KeywordAction {
    /// Show the stored keywords
    List,

    /// Add a keyword or change its value
    Set {
        keyword: String,

        #[arg(allow_hyphen_values = true)]
        value: i64,
    },

    /// Remove a keyword
    Remove { keyword: String },

    /// Remove all keywords
    Clear,
}

impl Args {
    pub fn keywords_path(&self) -> PathBuf {
        self.keywords_file
            .clone()
            .unwrap_or_else(paths::default_keywords_path)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(paths::default_database_path)
    }
}

impl EstimateArgs {
    pub fn mode(&self) -> ExtractionMode {
        if self.text_only {
            ExtractionMode::TextOnly
        } else if self.ocr_only {
            ExtractionMode::OcrOnly
        } else {
            ExtractionMode::Auto
        }
    }

    pub fn extractor_options(&self) -> ExtractorOptions {
        ExtractorOptions {
            threads: self.threads,
            mode: self.mode(),
            min_text_chars: self.min_text_chars,
            full_hash: self.full_hash,
            force: self.force,
            show_progress: !self.quiet && !self.json,
            ocr: OcrOptions {
                dpi: self.dpi,
                language: self.ocr_lang.clone(),
                tools_dir: self.ocr_tools_dir.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_flags_map_to_options() {
        let args = Args::parse_from([
            "pdf-keyword-estimator",
            "estimate",
            "a.pdf",
            "docs",
            "-k",
            "late fee=25",
            "--keyword",
            "refund=-5",
            "--ocr-only",
            "--dpi",
            "200",
            "--ocr-tools-dir",
            "/opt/poppler/bin",
            "--quiet",
        ]);

        let Command::Estimate(estimate) = args.command else {
            panic!("expected estimate");
        };
        assert_eq!(estimate.inputs, vec![PathBuf::from("a.pdf"), PathBuf::from("docs")]);
        assert_eq!(estimate.keywords, vec!["late fee=25", "refund=-5"]);

        let options = estimate.extractor_options();
        assert_eq!(options.mode, ExtractionMode::OcrOnly);
        assert_eq!(options.ocr.dpi, 200);
        assert_eq!(options.ocr.tools_dir, Some(PathBuf::from("/opt/poppler/bin")));
        assert_eq!(options.min_text_chars, DEFAULT_MIN_TEXT_CHARS);
        assert!(!options.show_progress);
    }

    #[test]
    fn text_only_and_ocr_only_conflict() {
        let parsed = Args::try_parse_from([
            "pdf-keyword-estimator",
            "estimate",
            "a.pdf",
            "--text-only",
            "--ocr-only",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn negative_keyword_values() {
        let args = Args::parse_from(["pdf-keyword-estimator", "keywords", "set", "refund", "-10"]);
        match args.command {
            Command::Keywords {
                action: KeywordAction::Set { keyword, value },
            } => {
                assert_eq!(keyword, "refund");
                assert_eq!(value, -10);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn explicit_paths_win() {
        let args = Args::parse_from([
            "pdf-keyword-estimator",
            "--keywords-file",
            "/tmp/k.csv",
            "keywords",
            "list",
        ]);
        assert_eq!(args.keywords_path(), PathBuf::from("/tmp/k.csv"));
        assert_eq!(args.database_path(), paths::default_database_path());
    }
}
