use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::database::{Database, ExtractionResult};
use crate::extractor::PdfExtractor;
use crate::keywords::{parse_assignment, KeywordStore, KeywordTable};
use crate::report::EstimateReport;

/// Extraction outcome for one file and, when text was found, its report.
#[derive(Debug, Serialize)]
pub struct FileOutcome {
    pub extraction: ExtractionResult,
    pub report: Option<EstimateReport>,
}

/// Keywords for this run.
///
/// `KEYWORD=VALUE` assignments replace the stored table (and are saved back
/// unless `save` is false); with none given the stored table is used.
/// Unusable entries are skipped with a warning.
pub fn resolve_keywords(assignments: &[String], store: &KeywordStore, save: bool) -> Result<KeywordTable> {
    let table = if assignments.is_empty() {
        store.load_or_default()
    } else {
        let mut rows = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            match parse_assignment(assignment) {
                Ok(row) => rows.push(row),
                Err(e) => warn!("{}", e),
            }
        }

        let (table, errors) = KeywordTable::from_rows(rows);
        for error in errors {
            warn!("{}", error);
        }

        if save && !table.is_empty() {
            store.save(&table)?;
        }
        table
    };

    if table.is_empty() {
        return Err(anyhow!("Please enter at least one keyword with a value."));
    }
    Ok(table)
}

/// Extract every PDF, then count and total `table` in each one.
pub async fn estimate_files(
    extractor: &PdfExtractor,
    pdf_files: Vec<PathBuf>,
    table: &KeywordTable,
    database: Option<&Database>,
) -> Result<Vec<FileOutcome>> {
    if pdf_files.is_empty() {
        return Err(anyhow!("Please select a PDF file first."));
    }

    let extractions = extractor.process_files(pdf_files).await?;
    let mut outcomes = Vec::with_capacity(extractions.len());

    for extraction in extractions {
        if !extraction.success {
            outcomes.push(FileOutcome {
                extraction,
                report: None,
            });
            continue;
        }

        let report = EstimateReport::from_text(
            extraction.file_path.clone(),
            extraction.extraction_method,
            extraction.page_count,
            &extraction.extracted_text,
            table,
        )?;
        info!(
            "{}: grand total {} over {} keywords",
            report.file_path,
            report.grand_total,
            report.rows.len()
        );

        if let Some(db) = database {
            if let Err(e) = db.record_estimate(&report, extraction.file_hash.as_deref()).await {
                warn!("Could not record estimate for {}: {:#}", report.file_path, e);
            }
        }

        outcomes.push(FileOutcome {
            extraction,
            report: Some(report),
        });
    }

    Ok(outcomes)
}
