use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

use crate::extractor::{ExtractionMethod, ExtractionMode};
use crate::report::EstimateReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: Option<i64>,
    pub file_path: String,
    pub file_hash: Option<String>,
    pub file_size: i64,
    pub extraction_method: ExtractionMethod,
    pub extracted_text: String,
    pub page_count: usize,
    pub processing_time_seconds: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error_message: Option<String>,
    /// Mode the run was asked for; cached text is only reused by the same mode
    #[serde(default)]
    pub mode: ExtractionMode,
    /// Served from the local cache instead of re-extracting
    #[serde(default)]
    pub from_cache: bool,
}

pub struct Database {
    conn: Mutex<Connection>,
}

const EXTRACTION_COLUMNS: &str = "id, file_path, file_hash, file_size, extraction_method, \
     extracted_text, page_count, processing_time_seconds, timestamp, success, error_message, \
     extraction_mode";

impl Database {
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA cache_size=10000;
             PRAGMA temp_store=memory;",
        )?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pdf_extractions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                file_hash TEXT,
                file_size INTEGER,
                extraction_method TEXT NOT NULL,
                extracted_text TEXT,
                page_count INTEGER,
                processing_time_seconds REAL,
                timestamp TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                error_message TEXT,
                extraction_mode TEXT,
                UNIQUE(file_path, file_hash)
            );

            CREATE TABLE IF NOT EXISTS estimates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                file_hash TEXT,
                extraction_method TEXT NOT NULL,
                page_count INTEGER,
                keyword_count INTEGER NOT NULL,
                grand_total INTEGER NOT NULL,
                rows_json TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_file_path ON pdf_extractions(file_path);
            CREATE INDEX IF NOT EXISTS idx_extraction_method ON pdf_extractions(extraction_method);
            CREATE INDEX IF NOT EXISTS idx_timestamp ON pdf_extractions(timestamp);
            CREATE INDEX IF NOT EXISTS idx_estimates_timestamp ON estimates(timestamp);
            "#,
        )?;

        // Databases created before the mode was recorded
        if conn.prepare("SELECT extraction_mode FROM pdf_extractions LIMIT 0").is_err() {
            conn.execute_batch("ALTER TABLE pdf_extractions ADD COLUMN extraction_mode TEXT")?;
        }

        info!("Database schema initialized");
        Ok(())
    }

    pub async fn insert_result(&self, result: &ExtractionResult) -> Result<()> {
        let conn = self.conn.lock().await;
        insert_extraction(&conn, result)?;
        Ok(())
    }

    pub async fn batch_insert(&self, results: &[ExtractionResult]) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;

        for result in results {
            insert_extraction(&tx, result)?;
        }

        tx.commit()?;
        Ok(())
    }

    /// A previous successful extraction of the same file contents in the same mode
    pub async fn find_cached(
        &self,
        file_path: &str,
        file_hash: &str,
        mode: ExtractionMode,
    ) -> Result<Option<ExtractionResult>> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT {} FROM pdf_extractions
             WHERE file_path = ?1 AND file_hash = ?2 AND extraction_mode = ?3 AND success = 1",
            EXTRACTION_COLUMNS
        );
        let result = conn
            .query_row(&sql, params![file_path, file_hash, mode.as_str()], extraction_from_row)
            .optional()?;

        Ok(result)
    }

    pub async fn record_estimate(&self, report: &EstimateReport, file_hash: Option<&str>) -> Result<i64> {
        let rows_json = serde_json::to_string(&report.rows)?;
        let conn = self.conn.lock().await;

        conn.execute(
            r#"
            INSERT INTO estimates
            (file_path, file_hash, extraction_method, page_count, keyword_count,
             grand_total, rows_json, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                report.file_path,
                file_hash,
                report.extraction_method.as_str(),
                report.page_count as i64,
                report.rows.len() as i64,
                report.grand_total,
                rows_json,
                report.timestamp.to_rfc3339(),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let conn = self.conn.lock().await;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM pdf_extractions", [], |row| row.get(0))?;

        let successful: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pdf_extractions WHERE success = 1",
            [],
            |row| row.get(0),
        )?;

        let ocr: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pdf_extractions WHERE extraction_method = 'ocr'",
            [],
            |row| row.get(0),
        )?;

        let avg_time: Option<f64> = conn.query_row(
            "SELECT AVG(processing_time_seconds) FROM pdf_extractions WHERE success = 1",
            [],
            |row| row.get(0),
        )?;

        let estimates: i64 = conn.query_row("SELECT COUNT(*) FROM estimates", [], |row| row.get(0))?;

        Ok(DatabaseStats {
            total,
            successful,
            failed: total - successful,
            ocr,
            estimates,
            avg_processing_time: avg_time.unwrap_or(0.0),
        })
    }

    pub async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(
            r#"
            SELECT file_path, extraction_method,
                   substr(extracted_text, 1, 200) as preview,
                   timestamp
            FROM pdf_extractions
            WHERE extracted_text LIKE ?1 ESCAPE '\' AND success = 1
            ORDER BY timestamp DESC
            LIMIT ?2
            "#,
        )?;

        let results = stmt.query_map(params![like_pattern(query), limit as i64], |row| {
            Ok(SearchResult {
                file_path: row.get(0)?,
                extraction_method: row.get(1)?,
                preview: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?;

        let mut search_results = Vec::new();
        for result in results {
            search_results.push(result?);
        }

        Ok(search_results)
    }

    pub async fn list_extractions(&self, method: Option<&str>, include_failed: bool) -> Result<Vec<ExtractionResult>> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT {} FROM pdf_extractions
             WHERE (?1 IS NULL OR extraction_method = ?1) AND (?2 OR success = 1)
             ORDER BY file_path",
            EXTRACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![method, include_failed], extraction_from_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub async fn list_estimates(&self, limit: usize) -> Result<Vec<EstimateRecord>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, file_path, extraction_method, page_count, keyword_count, grand_total, timestamp
            FROM estimates
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(EstimateRecord {
                id: row.get(0)?,
                file_path: row.get(1)?,
                extraction_method: row.get(2)?,
                page_count: row.get(3)?,
                keyword_count: row.get(4)?,
                grand_total: row.get(5)?,
                timestamp: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Dump extractions and estimates as one JSON document
    pub async fn export_json(&self, output_path: &Path, include_text: bool) -> Result<usize> {
        let mut extractions = self.list_extractions(None, true).await?;
        if !include_text {
            for extraction in &mut extractions {
                extraction.extracted_text.clear();
            }
        }
        let estimates = self.list_estimates(usize::MAX >> 1).await?;

        let count = extractions.len();
        let document = serde_json::json!({
            "exported_at": Utc::now().to_rfc3339(),
            "extractions": extractions,
            "estimates": estimates,
        });

        let content = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(output_path, content)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(count)
    }
}

fn insert_extraction(conn: &Connection, result: &ExtractionResult) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO pdf_extractions
        (file_path, file_hash, file_size, extraction_method, extracted_text,
         page_count, processing_time_seconds, timestamp, success, error_message, extraction_mode)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            result.file_path,
            result.file_hash,
            result.file_size,
            result.extraction_method.as_str(),
            result.extracted_text,
            result.page_count as i64,
            result.processing_time_seconds,
            result.timestamp.to_rfc3339(),
            result.success,
            result.error_message,
            result.mode.as_str(),
        ],
    )
}

/// `%query%` with LIKE's own wildcards taken literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn extraction_from_row(row: &Row<'_>) -> rusqlite::Result<ExtractionResult> {
    let method: String = row.get(4)?;
    let extraction_method = method
        .parse::<ExtractionMethod>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    let timestamp: String = row.get(8)?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    let page_count: Option<i64> = row.get(6)?;

    let mode = match row.get::<_, Option<String>>(11)? {
        Some(mode) => mode
            .parse::<ExtractionMode>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
        None => ExtractionMode::default(),
    };

    Ok(ExtractionResult {
        id: row.get(0)?,
        file_path: row.get(1)?,
        file_hash: row.get(2)?,
        file_size: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
        extraction_method,
        extracted_text: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        page_count: page_count.unwrap_or(0).max(0) as usize,
        processing_time_seconds: row.get::<_, Option<f64>>(7)?.unwrap_or(0.0),
        timestamp,
        success: row.get(9)?,
        error_message: row.get(10)?,
        mode,
        from_cache: false,
    })
}

#[derive(Debug)]
pub struct DatabaseStats {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub ocr: i64,
    pub estimates: i64,
    pub avg_processing_time: f64,
}

#[derive(Debug)]
pub struct SearchResult {
    pub file_path: String,
    pub extraction_method: String,
    pub preview: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct EstimateRecord {
    pub id: i64,
    pub file_path: String,
    pub extraction_method: String,
    pub page_count: Option<i64>,
    pub keyword_count: i64,
    pub grand_total: i64,
    pub timestamp: String,
}
