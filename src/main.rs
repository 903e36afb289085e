use anyhow::{anyhow, Result};
use clap::Parser;
use log::{info, warn};
use std::process::ExitCode;
use std::sync::Arc;

mod cli;

use cli::{Args, Command, EstimateArgs, KeywordAction};
use pdf_keyword_estimator::database::Database;
use pdf_keyword_estimator::estimate::{self, FileOutcome};
use pdf_keyword_estimator::export;
use pdf_keyword_estimator::extractor::PdfExtractor;
use pdf_keyword_estimator::keywords::KeywordStore;
use pdf_keyword_estimator::report;

/// Conventional exit status for a run interrupted by SIGINT
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Dropping `run` aborts in-flight extraction tasks
    tokio::select! {
        result = run(args) => result.map(|()| ExitCode::SUCCESS),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nCancelled.");
            Ok(ExitCode::from(EXIT_CANCELLED))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let store = KeywordStore::new(args.keywords_path());

    match &args.command {
        Command::Estimate(estimate_args) => run_estimate(&args, estimate_args, &store).await,
        Command::Keywords { action } => run_keywords(action, &store),
    }
}

async fn run_estimate(args: &Args, estimate_args: &EstimateArgs, store: &KeywordStore) -> Result<()> {
    info!("🦀 PDF Keyword Estimator starting...");

    let table = estimate::resolve_keywords(&estimate_args.keywords, store, !estimate_args.no_save)?;
    info!("Using {} keywords", table.len());

    let database = if estimate_args.no_cache {
        None
    } else {
        let path = args.database_path();
        info!("Database: {}", path.display());
        match Database::new(&path).await {
            Ok(db) => {
                db.init_schema().await?;
                Some(Arc::new(db))
            }
            Err(e) => {
                warn!("Continuing without database: {:#}", e);
                None
            }
        }
    };

    let extractor = PdfExtractor::new(estimate_args.extractor_options(), database.clone());
    let pdf_files = extractor.find_pdf_files(&estimate_args.inputs)?;
    info!("Found {} PDF files", pdf_files.len());

    let outcomes = estimate::estimate_files(&extractor, pdf_files, &table, database.as_deref()).await?;

    if estimate_args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print_outcomes(&outcomes, estimate_args);
    }

    let reports: Vec<_> = outcomes.iter().filter_map(|o| o.report.clone()).collect();

    if let Some(export_path) = &estimate_args.export {
        if reports.is_empty() {
            warn!("No results to export");
        } else {
            for path in export::export_reports(&reports, export_path)? {
                if !estimate_args.json {
                    println!("Results exported to: {}", path.display());
                }
            }
        }
    }

    if reports.is_empty() {
        return Err(anyhow!("No text could be extracted from any of the PDFs"));
    }
    Ok(())
}

fn print_outcomes(outcomes: &[FileOutcome], estimate_args: &EstimateArgs) {
    for outcome in outcomes {
        let extraction = &outcome.extraction;
        println!("\n📄 {}", extraction.file_path);

        let Some(report) = &outcome.report else {
            println!(
                "  ❌ {}",
                extraction.error_message.as_deref().unwrap_or("extraction failed")
            );
            continue;
        };

        println!(
            "  {} page(s), text via {}{}",
            report.page_count,
            report.extraction_method,
            if extraction.from_cache { " (cached)" } else { "" }
        );

        if estimate_args.preview {
            println!("{}", "-".repeat(60));
            println!(
                "{}",
                report::preview(&extraction.extracted_text, estimate_args.preview_chars)
            );
            println!("{}", "-".repeat(60));
        }

        println!();
        print!("{}", report.render_table());
    }

    if outcomes.len() > 1 {
        let successful: Vec<_> = outcomes.iter().filter_map(|o| o.report.as_ref()).collect();
        let failed = outcomes.len() - successful.len();
        let combined: i128 = successful.iter().map(|r| r.grand_total as i128).sum();

        println!("\n🎉 Estimation complete!");
        println!("Processed: {} PDFs", outcomes.len());
        println!("Successful: {}", successful.len());
        println!("Failed: {}", failed);
        println!("Combined total: {}", combined);
    }
}

fn run_keywords(action: &KeywordAction, store: &KeywordStore) -> Result<()> {
    match action {
        KeywordAction::List => {
            let table = store.load_or_default();
            println!("Keywords ({}):", store.path().display());
            println!("{}", "=".repeat(40));
            if table.is_empty() {
                println!("(none)");
            }
            let width = table.iter().map(|k| k.term.chars().count()).max().unwrap_or(0);
            for keyword in table.iter() {
                println!("{:<width$}  {:>8}", keyword.term, keyword.value, width = width);
            }
        }

        KeywordAction::Set { keyword, value } => {
            let keyword = keyword.trim();
            if keyword.is_empty() {
                return Err(anyhow!("Keyword must not be empty"));
            }
            let mut table = store.load_or_default();
            table.insert(keyword, *value);
            store.save(&table)?;
            println!("Set '{}' = {}", keyword, value);
        }

        KeywordAction::Remove { keyword } => {
            let mut table = store.load_or_default();
            if !table.remove(keyword.trim()) {
                return Err(anyhow!("No such keyword: '{}'", keyword));
            }
            store.save(&table)?;
            println!("Removed '{}'", keyword.trim());
        }

        KeywordAction::Clear => {
            let mut table = store.load_or_default();
            table.clear();
            store.save(&table)?;
            println!("Keywords have been cleared in: {}", store.path().display());
        }
    }

    Ok(())
}
