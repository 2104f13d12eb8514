// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! StudySnap Export Utility
//!
//! Dumps the persisted scan history straight from the SQLite store,
//! without going through the main application.

use anyhow::{bail, Context};
use clap::Parser;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "studysnap-export")]
#[command(version = "1.0.0")]
#[command(about = "Export the StudySnap scan history as JSON")]
struct Args {
    /// Path to the history database
    #[arg(short, long, default_value = "studysnap.db")]
    db: PathBuf,

    /// Storage key the history blob lives under
    #[arg(short, long, default_value = "studysnap_history")]
    key: String,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.db.exists() {
        bail!("History database not found: {:?}", args.db);
    }

    let conn = Connection::open(&args.db)
        .with_context(|| format!("Failed to open {:?}", args.db))?;

    let blob: String = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            [&args.key],
            |row| row.get(0),
        )
        .with_context(|| format!("No history stored under key '{}'", args.key))?;

    let records: serde_json::Value =
        serde_json::from_str(&blob).context("Stored history is not valid JSON")?;

    let pretty = serde_json::to_string_pretty(&records)?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, pretty)
                .with_context(|| format!("Failed to write {:?}", path))?;
            let count = records.as_array().map(|a| a.len()).unwrap_or(0);
            eprintln!("Exported {} records to {:?}", count, path);
        }
        None => println!("{}", pretty),
    }

    Ok(())
}
