//! # Redirect Server Entry Point
//!
//! Loads the redirect rules from storage, starts the scheduled reload and
//! answers queries read line by line from stdin until EOF.

use redirect::{FileStorage, RedirectConfig, RedirectManager, RedirectQueryFilter};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=================================================");
    println!("  Query Redirect - Rule Matching Service        ");
    println!("=================================================");
    println!();

    let config = RedirectConfig::from_env()?;

    println!("Loading redirect rules from {}...", config.storage_path.display());
    let storage = Arc::new(FileStorage::open(&config.storage_path)?);
    let manager = match RedirectManager::open(config.resource_id.clone(), storage) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            eprintln!("✗ Failed to load redirect rules: {}", e);
            return Err(e.into());
        }
    };

    let stats = manager.stats();
    println!("✓ Redirect manager initialized");
    println!("  - Resource: {}", stats.resource_id);
    println!("  - Rules: {}", stats.rule_count);
    println!("  - Version: {}", stats.version);
    println!();

    println!("Rules (lookup order):");
    for (key, rule) in manager.snapshot().iter() {
        println!(
            "  - {:<30} ({}, -> {})",
            key,
            rule.match_mode(),
            rule.redirect_target().unwrap_or("-")
        );
    }
    println!();

    if manager.start_scheduler(config.scheduler.clone()) {
        println!(
            "Scheduled reload every {} seconds",
            config.scheduler.refresh_interval.as_secs()
        );
    } else {
        println!("Scheduled reload disabled");
    }
    println!();

    let filter = RedirectQueryFilter::with_fields(
        Arc::clone(&manager),
        config.query_param.clone(),
        config.response_field.clone(),
    );

    println!("Enter queries, one per line (Ctrl-D to exit):");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let outcome = filter.evaluate(Some(&line));
        match outcome.redirect_target {
            Some(target) => println!("{} = {}", filter.response_field(), target),
            None => println!("(no redirect)"),
        }
    }

    manager.shutdown().await;

    println!("=================================================");
    println!("  Redirect Service Shut Down");
    println!("=================================================");

    Ok(())
}
