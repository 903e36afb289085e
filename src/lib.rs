//! Count weighted keywords in PDF files.
//!
//! Text comes from the PDF's text layer where there is one and from OCR
//! (pdftoppm + tesseract) where there isn't. Every keyword carries an integer
//! value; a report multiplies each case-insensitive match count by its value
//! and sums the results into a grand total.

pub mod counter;
pub mod database;
pub mod estimate;
pub mod export;
pub mod extractor;
pub mod keywords;
pub mod ocr;
pub mod paths;
pub mod pdf;
pub mod progress;
pub mod report;

pub use counter::{count_keywords, count_occurrences, KeywordCount};
pub use database::{Database, ExtractionResult};
pub use extractor::{ExtractionMethod, ExtractionMode, ExtractorOptions, PdfExtractor};
pub use keywords::{Keyword, KeywordError, KeywordStore, KeywordTable};
pub use report::EstimateReport;
