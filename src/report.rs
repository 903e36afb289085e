use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::counter::{self, KeywordCount};
use crate::extractor::ExtractionMethod;
use crate::keywords::{KeywordError, KeywordTable};

pub const GRAND_TOTAL_LABEL: &str = "GRAND TOTAL";
pub const DEFAULT_PREVIEW_CHARS: usize = 5000;

/// Weighted keyword counts for one PDF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateReport {
    pub file_path: String,
    pub extraction_method: ExtractionMethod,
    pub page_count: usize,
    /// Sorted by keyword, ignoring case.
    pub rows: Vec<KeywordCount>,
    pub grand_total: i64,
    pub timestamp: DateTime<Utc>,
}

impl EstimateReport {
    pub fn new(
        file_path: impl Into<String>,
        extraction_method: ExtractionMethod,
        page_count: usize,
        mut rows: Vec<KeywordCount>,
    ) -> Result<Self, KeywordError> {
        let grand_total = counter::grand_total(&rows)?;
        rows.sort_by_cached_key(|row| row.keyword.to_lowercase());

        Ok(Self {
            file_path: file_path.into(),
            extraction_method,
            page_count,
            rows,
            grand_total,
            timestamp: Utc::now(),
        })
    }

    /// Count `table` in `text` and build the report in one go.
    pub fn from_text(
        file_path: impl Into<String>,
        extraction_method: ExtractionMethod,
        page_count: usize,
        text: &str,
        table: &KeywordTable,
    ) -> Result<Self, KeywordError> {
        let rows = counter::count_keywords(text, table)?;
        Self::new(file_path, extraction_method, page_count, rows)
    }

    /// Plain-text results table with a trailing grand total row.
    pub fn render_table(&self) -> String {
        let headers = ["Keyword", "Count", "Value", "Subtotal"];

        let total = self.grand_total.to_string();
        let cells: Vec<[String; 4]> = self
            .rows
            .iter()
            .map(|r| {
                [
                    r.keyword.clone(),
                    r.count.to_string(),
                    r.value.to_string(),
                    r.subtotal.to_string(),
                ]
            })
            .collect();

        let mut widths = headers.map(str::len);
        for row in &cells {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        widths[0] = widths[0].max(GRAND_TOTAL_LABEL.len());
        widths[3] = widths[3].max(total.len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}",
            headers[0],
            headers[1],
            headers[2],
            headers[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        );
        let rule_len = widths.iter().sum::<usize>() + 6;
        let _ = writeln!(out, "{}", "-".repeat(rule_len));

        for row in &cells {
            let _ = writeln!(
                out,
                "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}",
                row[0],
                row[1],
                row[2],
                row[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
                w3 = widths[3],
            );
        }

        let _ = writeln!(out, "{}", "=".repeat(rule_len));
        let _ = writeln!(
            out,
            "{:<w0$}  {:>w1$}  {:>w2$}  {:>w3$}",
            GRAND_TOTAL_LABEL,
            "",
            "",
            total,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        );

        out
    }
}

/// The first `max_chars` characters of `text`, with a note when cut short.
pub fn preview(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }

    let mut shown: String = text.chars().take(max_chars).collect();
    let _ = write!(
        shown,
        "\n\n... (showing first {} characters of {} total)",
        max_chars, total
    );
    shown
}
