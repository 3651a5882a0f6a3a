//! # Redirect Rule Checker
//!
//! Validates a stored redirect rule document offline and optionally
//! evaluates sample queries against it.
//!
//! Usage:
//!   redirect_check <file>
//!   redirect_check <file> --query "red office chair" --query "best chair"

use clap::Parser;
use redirect::storage::{decode_stored_view, StorageIO};
use redirect::{normalize_query, FileStorage, RedirectManager};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "redirect_check")]
#[command(about = "Validate a stored redirect rule document", long_about = None)]
struct Cli {
    /// Path to the stored rule document
    file: PathBuf,

    /// Query to evaluate against the rules (repeatable)
    #[arg(short, long)]
    query: Vec<String>,

    /// Exit with failure if any entry was skipped
    #[arg(long)]
    strict: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let storage = match FileStorage::open(&cli.file) {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let data = match storage.load() {
        Ok(Some(data)) => data,
        Ok(None) => {
            eprintln!("✗ {} does not exist", cli.file.display());
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    let decoded = match decode_stored_view(&data) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("✗ {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("✓ {} valid rules", decoded.rules.len());
    for (key, stored) in &decoded.rules {
        println!("  - {:<30} ({}, -> {})", key, stored.match_mode, stored.url);
    }

    if !decoded.skipped.is_empty() {
        println!("✗ {} skipped entries", decoded.skipped.len());
        for entry in &decoded.skipped {
            println!("  - {:<30} {}", entry.key, entry.reason);
        }
    }

    if !cli.query.is_empty() {
        let manager = match RedirectManager::open("redirect_check", Arc::new(storage)) {
            Ok(manager) => manager,
            Err(e) => {
                eprintln!("✗ {}", e);
                return ExitCode::FAILURE;
            }
        };

        println!();
        for query in &cli.query {
            let normalized = normalize_query(query);
            match manager.lookup(&normalized) {
                Some(rule) => println!(
                    "  '{}' -> {} ({} '{}')",
                    normalized,
                    rule.redirect_target().unwrap_or("-"),
                    rule.match_mode(),
                    rule.term().phrase()
                ),
                None => println!("  '{}' -> no redirect", normalized),
            }
        }
    }

    if cli.strict && !decoded.skipped.is_empty() {
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
