use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use pdf_keyword_estimator::database::Database;
use pdf_keyword_estimator::paths;

#[derive(Parser, Debug)]
#[command(name = "pdf-keyword-query")]
#[command(about = "Query the PDF keyword estimator database")]
pub struct QueryArgs {
    /// SQLite database file
    #[arg(short, long, env = "PDF_ESTIMATOR_DB")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: QueryCommand,
}

#[derive(Parser, Debug)]
pub enum QueryCommand {
    /// Show extraction statistics
    Stats,

    /// Search extracted text
    Search {
        /// Text to search for
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List processed files
    List {
        /// Filter by extraction method (direct, ocr, direct_partial, error)
        #[arg(short, long)]
        method: Option<String>,

        /// Include failed extractions
        #[arg(long)]
        include_failed: bool,
    },

    /// Show recent estimates
    History {
        /// Maximum number of estimates
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export to JSON
    Export {
        /// Output JSON file
        output: PathBuf,

        /// Include extracted text in export
        #[arg(long)]
        include_text: bool,
    },
}

pub async fn run_query(args: QueryArgs) -> Result<()> {
    let path = args.database.unwrap_or_else(paths::default_database_path);
    let db = Database::new(&path).await?;
    db.init_schema().await?;

    match args.command {
        QueryCommand::Stats => {
            let stats = db.get_stats().await?;

            println!("PDF Keyword Estimator Database Statistics");
            println!("{}", "=".repeat(40));
            println!("Total files processed: {}", stats.total);
            println!("Successful extractions: {}", stats.successful);
            println!("Failed extractions: {}", stats.failed);
            println!("Extracted with OCR: {}", stats.ocr);
            if stats.total > 0 {
                println!("Success rate: {:.1}%", (stats.successful as f64 / stats.total as f64) * 100.0);
            }
            println!("Average processing time: {:.2}s", stats.avg_processing_time);
            println!("Estimates recorded: {}", stats.estimates);
        }

        QueryCommand::Search { query, limit } => {
            let results = db.search_text(&query, limit).await?;

            println!("Search results for '{}' (showing {} of max {}):", query, results.len(), limit);
            println!("{}", "=".repeat(60));

            for result in results {
                println!("File: {}", result.file_path);
                println!("Method: {}", result.extraction_method);
                println!("Timestamp: {}", result.timestamp);
                println!("Preview: {}...", result.preview.replace('\n', " "));
                println!("{}", "-".repeat(40));
            }
        }

        QueryCommand::List { method, include_failed } => {
            let results = db.list_extractions(method.as_deref(), include_failed).await?;

            println!("{} file(s)", results.len());
            println!("{}", "=".repeat(60));
            for result in results {
                let status = if result.success { "ok" } else { "failed" };
                println!(
                    "{:<8} {:<15} {:>4}p  {}",
                    status, result.extraction_method, result.page_count, result.file_path
                );
                if let Some(error) = result.error_message {
                    println!("         {}", error);
                }
            }
        }

        QueryCommand::History { limit } => {
            let estimates = db.list_estimates(limit).await?;

            println!("Recent estimates (showing {} of max {}):", estimates.len(), limit);
            println!("{}", "=".repeat(60));
            for estimate in estimates {
                println!(
                    "#{:<5} {}  total {:>10}  ({} keywords, {})  {}",
                    estimate.id,
                    estimate.timestamp,
                    estimate.grand_total,
                    estimate.keyword_count,
                    estimate.extraction_method,
                    estimate.file_path
                );
            }
        }

        QueryCommand::Export { output, include_text } => {
            let count = db.export_json(&output, include_text).await?;
            println!("Exported {} extraction(s) to: {}", count, output.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = QueryArgs::parse();
    run_query(args).await
}
