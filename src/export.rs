//! Writing estimate reports to spreadsheet, CSV and JSON files.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use log::info;
use rust_xlsxwriter::{Format, FormatAlign, Workbook};
use std::path::{Path, PathBuf};

use crate::report::{EstimateReport, GRAND_TOTAL_LABEL};

const HEADERS: [&str; 4] = ["Keyword", "Count", "Value", "Subtotal"];
const SHEET_NAME: &str = "Keyword Results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Json,
}

impl ExportFormat {
    /// Pick a format from the file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("xlsx") => Some(ExportFormat::Xlsx),
            Some("csv") => Some(ExportFormat::Csv),
            Some("json") => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

/// Keep letters, digits, spaces, dashes and underscores.
pub fn sanitize_stem(stem: &str) -> String {
    stem.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// `<pdf stem>_results_<YYYYmmdd_HHMMSS>.xlsx`
pub fn default_file_name(pdf_path: Option<&Path>, now: DateTime<Local>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let stem = pdf_path
        .and_then(|p| p.file_stem())
        .map(|s| sanitize_stem(&s.to_string_lossy()))
        .unwrap_or_default();

    if stem.is_empty() {
        format!("keyword_results_{}.xlsx", stamp)
    } else {
        format!("{}_results_{}.xlsx", stem, stamp)
    }
}

/// Export every report to `target`.
///
/// A directory receives one generated spreadsheet per report; a path ending
/// in a separator is created as one. Any other path is written as-is in the
/// format its extension names, which only makes sense for a single report.
pub fn export_reports(reports: &[EstimateReport], target: &Path) -> Result<Vec<PathBuf>> {
    if reports.is_empty() {
        return Err(anyhow!("No results to export"));
    }

    let names_directory = target
        .as_os_str()
        .to_string_lossy()
        .ends_with(std::path::is_separator);
    if names_directory && !target.exists() {
        std::fs::create_dir_all(target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
    }

    if target.is_dir() {
        let now = Local::now();
        let mut written = Vec::with_capacity(reports.len());
        for report in reports {
            let mut path = target.join(default_file_name(Some(Path::new(&report.file_path)), now));
            // Two PDFs with the same stem in one batch
            let mut n = 2;
            while written.contains(&path) {
                let name = default_file_name(Some(Path::new(&report.file_path)), now);
                path = target.join(name.replace(".xlsx", &format!("_{}.xlsx", n)));
                n += 1;
            }
            write_xlsx(report, &path)?;
            written.push(path);
        }
        return Ok(written);
    }

    let format = ExportFormat::from_path(target).ok_or_else(|| {
        anyhow!(
            "Can't export to {}: use a .xlsx, .csv or .json file, or a directory",
            target.display()
        )
    })?;

    if reports.len() > 1 {
        return Err(anyhow!(
            "{} reports can't share one export file; pass a directory instead",
            reports.len()
        ));
    }

    let report = &reports[0];
    match format {
        ExportFormat::Xlsx => write_xlsx(report, target)?,
        ExportFormat::Csv => write_csv(report, target)?,
        ExportFormat::Json => write_json(report, target)?,
    }
    Ok(vec![target.to_path_buf()])
}

pub fn write_xlsx(report: &EstimateReport, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let bold = Format::new().set_bold();
    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let right = Format::new().set_align(FormatAlign::Right);
    let bold_right = Format::new().set_bold().set_align(FormatAlign::Right);

    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    let mut row = 1u32;
    for entry in &report.rows {
        worksheet.write_string(row, 0, &entry.keyword)?;
        worksheet.write_number_with_format(row, 1, entry.count as f64, &right)?;
        worksheet.write_number_with_format(row, 2, entry.value as f64, &right)?;
        worksheet.write_number_with_format(row, 3, entry.subtotal as f64, &right)?;
        row += 1;
    }

    worksheet.write_string_with_format(row, 0, GRAND_TOTAL_LABEL, &bold)?;
    worksheet.write_number_with_format(row, 3, report.grand_total as f64, &bold_right)?;

    worksheet.set_column_width(0, 30)?;
    worksheet.set_column_width(1, 12)?;
    worksheet.set_column_width(2, 12)?;
    worksheet.set_column_width(3, 15)?;

    workbook
        .save(path)
        .with_context(|| format!("Could not export to {}", path.display()))?;
    info!("Exported results to {}", path.display());
    Ok(())
}

pub fn write_csv(report: &EstimateReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Could not export to {}", path.display()))?;

    writer.write_record(HEADERS)?;
    for entry in &report.rows {
        writer.write_record([
            entry.keyword.clone(),
            entry.count.to_string(),
            entry.value.to_string(),
            entry.subtotal.to_string(),
        ])?;
    }
    writer.write_record([
        GRAND_TOTAL_LABEL.to_string(),
        String::new(),
        String::new(),
        report.grand_total.to_string(),
    ])?;
    writer.flush()?;

    info!("Exported results to {}", path.display());
    Ok(())
}

pub fn write_json(report: &EstimateReport, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)
        .with_context(|| format!("Could not export to {}", path.display()))?;

    info!("Exported results to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::KeywordCount;
    use crate::extractor::ExtractionMethod;
    use chrono::TimeZone;

    fn report(path: &str) -> EstimateReport {
        EstimateReport::new(
            path,
            ExtractionMethod::Direct,
            1,
            vec![
                KeywordCount { keyword: "invoice".into(), count: 2, value: 10, subtotal: 20 },
                KeywordCount { keyword: "fee".into(), count: 1, value: 5, subtotal: 5 },
            ],
        )
        .unwrap()
    }

    #[test]
    fn stems_are_sanitized() {
        assert_eq!(sanitize_stem(" Q3 report (final)! "), "Q3 report final");
        assert_eq!(sanitize_stem("***"), "");
    }

    #[test]
    fn default_names_carry_stem_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_file_name(Some(Path::new("/tmp/Bill #7.pdf")), now),
            "Bill 7_results_20240309_140507.xlsx"
        );
        assert_eq!(
            default_file_name(Some(Path::new("/tmp/%%.pdf")), now),
            "keyword_results_20240309_140507.xlsx"
        );
        assert_eq!(default_file_name(None, now), "keyword_results_20240309_140507.xlsx");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ExportFormat::from_path(Path::new("a.CSV")), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_path(Path::new("a.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("a.xlsx")), Some(ExportFormat::Xlsx));
        assert_eq!(ExportFormat::from_path(Path::new("a.txt")), None);
        assert_eq!(ExportFormat::from_path(Path::new("a")), None);
    }

    #[test]
    fn unknown_extension_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.txt");

        let err = export_reports(&[report("a.pdf")], &path).unwrap_err();
        assert!(err.to_string().contains(".xlsx, .csv or .json"));
        assert!(!path.exists());
    }

    #[test]
    fn trailing_separator_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = PathBuf::from(format!(
            "{}{}",
            dir.path().join("new").join("exports").display(),
            std::path::MAIN_SEPARATOR
        ));

        let written = export_reports(&[report("a.pdf")], &target).unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].exists());
        assert_eq!(written[0].parent(), Some(dir.path().join("new").join("exports").as_path()));
        assert_eq!(written[0].extension().unwrap(), "xlsx");
    }

    #[test]
    fn csv_has_sorted_rows_and_grand_total() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        export_reports(&[report("a.pdf")], &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Keyword,Count,Value,Subtotal",
                "fee,1,5,5",
                "invoice,2,10,20",
                "GRAND TOTAL,,,25",
            ]
        );
    }

    #[test]
    fn json_is_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        export_reports(&[report("a.pdf")], &path).unwrap();

        let parsed: EstimateReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.grand_total, 25);
        assert_eq!(parsed.rows.len(), 2);
    }

    #[test]
    fn directory_gets_one_workbook_per_report() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_reports(&[report("x/a.pdf"), report("y/a.pdf"), report("b.pdf")], dir.path()).unwrap();

        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists());
            assert_eq!(path.extension().unwrap(), "xlsx");
        }
        assert_ne!(written[0], written[1]);
    }

    #[test]
    fn several_reports_need_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_reports(&[report("a.pdf"), report("b.pdf")], &dir.path().join("out.xlsx"));
        assert!(err.is_err());
        assert!(export_reports(&[], dir.path()).is_err());
    }
}
