// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! StudySnap: AI Study Assistant
//!
//! Photograph your notes, drop the image here, get an explanation, a
//! summary and a quiz back - all stored in a local history.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use studysnap::config::AppConfig;
use studysnap::generator::{GeminiGenerator, MaterialGenerator};
use studysnap::store::{create_record, HistoryStore, StudyRecord};
use studysnap::watcher::{is_capture_candidate, wait_for_stable, CaptureWatcher, WatchEvent};
use studysnap::{Result, StudySnapError};

/// StudySnap CLI - AI study assistant for photographed notes
#[derive(Parser, Debug)]
#[command(name = "studysnap")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version = "1.2.0")]
#[command(about = "Turn photographed notes into study material", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a single note photo and store the result
    Scan {
        /// Image to scan
        image: PathBuf,

        /// Generate material without saving it to the history
        #[arg(long)]
        dry_run: bool,
    },

    /// Watch capture directories for new note photos
    Watch {
        /// Directories to watch (overrides config)
        #[arg(short, long)]
        dir: Vec<PathBuf>,

        /// Process images already present on startup
        #[arg(long)]
        process_existing: bool,

        /// Skip the service health check on startup
        #[arg(long)]
        skip_health_check: bool,
    },

    /// Scan history operations
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show AI service and store status
    Status,

    /// Initialize a new StudySnap setup
    Init {
        /// Directory to initialize (default: current)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent scans
    List {
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Show one record in full
    Show {
        /// Record id
        id: String,
    },

    /// Export the whole history to a JSON file
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("StudySnap v1.2.0 - AI Study Assistant");
    }

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Scan { image, dry_run }) => {
            run_scan(config, image, dry_run, &cli.format).await
        }
        Some(Commands::Watch { dir, process_existing, skip_health_check }) => {
            run_watch(config, dir, process_existing, skip_health_check).await
        }
        Some(Commands::History { action }) => {
            run_history_command(config, action, &cli.format).await
        }
        Some(Commands::Config { action }) => {
            run_config_command(config, action, &cli.config).await
        }
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Init { dir, force }) => run_init(dir, force).await,
        None => {
            // Default: run watch mode
            run_watch(config, vec![], false, false).await
        }
    }
}

/// Generate study material for one image and persist the record
async fn process_image(
    path: &Path,
    generator: &dyn MaterialGenerator,
    store: &HistoryStore,
    dry_run: bool,
) -> Result<StudyRecord> {
    info!("Generating study material for {:?}", path);

    let material = generator.generate(path).await?;
    let record = create_record(material, Some(path.to_string_lossy().into_owned()));

    if dry_run {
        info!("DRY RUN: not saving record {}", record.id);
    } else {
        store.append(&record)?;
        info!("Saved study record {}", record.id);
    }

    Ok(record)
}

/// Run a one-shot scan
async fn run_scan(config: AppConfig, image: PathBuf, dry_run: bool, format: &str) -> Result<()> {
    let generator = GeminiGenerator::from_config(&config);
    let store = HistoryStore::open(&config.storage.path, &config.storage.history_key)?;

    let record = process_image(&image, &generator, &store, dry_run).await?;
    print_record(&record, format)?;

    Ok(())
}

/// Run the watch mode (capture-directory loop)
async fn run_watch(
    config: AppConfig,
    dir_overrides: Vec<PathBuf>,
    process_existing: bool,
    skip_health_check: bool,
) -> Result<()> {
    let watch_paths: Vec<PathBuf> = if dir_overrides.is_empty() {
        config.watch_paths.iter().map(PathBuf::from).collect()
    } else {
        dir_overrides
    };

    info!("Capture directories: {:?}", watch_paths);

    let generator = Arc::new(GeminiGenerator::from_config(&config));

    if !generator.has_credential() {
        warn!("No API key configured - scans will return demo material");
    } else if skip_health_check {
        warn!("Skipping Gemini health check");
    } else {
        info!("Checking Gemini availability...");
        let client = studysnap::gemini::GeminiClient::new(
            &config.ai_engine.url,
            config.ai_engine.resolve_api_key(),
            config.ai_engine.timeout_secs,
        );
        match client.health_check().await {
            Ok(()) => info!("Gemini is reachable"),
            Err(e) => {
                return Err(StudySnapError::Generation(format!(
                    "Failed to reach Gemini: {}. Check your API key and network",
                    e
                )))
            }
        }

        match client.model_available(&config.ai_engine.model).await {
            Ok(true) => info!("Model '{}' available", config.ai_engine.model),
            Ok(false) => warn!("Model '{}' not listed by the service", config.ai_engine.model),
            Err(e) => warn!("Could not list models: {}", e),
        }
    }

    let store = HistoryStore::open(&config.storage.path, &config.storage.history_key)?;
    info!("History store ready: {}", config.storage.path);

    let mut watcher = CaptureWatcher::new()?;
    for path in &watch_paths {
        watcher.watch(path)?;
    }

    // Process existing captures if requested
    if process_existing {
        info!("Processing existing captures...");
        for dir in &watch_paths {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_file() && is_capture_candidate(&path) {
                        if let Err(e) = process_image(&path, generator.as_ref(), &store, false).await {
                            error!("Failed to process {:?}: {}", path, e);
                        }
                    }
                }
            }
        }
    }

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = terminate => info!("Received SIGTERM, shutting down..."),
        }

        let _ = shutdown_tx.send(true);
    });

    info!("Watching for note photos. Press Ctrl+C to stop.");

    // Main event loop
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Some(event) = watcher.next_event(Duration::from_millis(100)) {
            match event {
                WatchEvent::CaptureCreated(path) => {
                    if is_capture_candidate(&path) {
                        let generator_clone = Arc::clone(&generator);
                        let store_clone = store.clone();

                        tokio::spawn(async move {
                            // Wait until the capture is fully written
                            if !wait_for_stable(&path, Duration::from_secs(10)).await {
                                warn!("Capture disappeared during stability check: {:?}", path);
                                return;
                            }

                            if let Err(e) =
                                process_image(&path, generator_clone.as_ref(), &store_clone, false)
                                    .await
                            {
                                error!("Failed to process {:?}: {}", path, e);
                            }
                        });
                    }
                }
                WatchEvent::Error(e) => {
                    warn!("Watch error: {}", e);
                }
            }
        }
    }

    info!("StudySnap stopped.");
    Ok(())
}

/// Print a record in the requested format
fn print_record(record: &StudyRecord, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    println!("Record {} ({})", record.id, record.date.format("%Y-%m-%d %H:%M"));
    println!("\nExplanation:\n{}", record.explanation);

    if !record.summary.is_empty() {
        println!("\nSummary:");
        for point in &record.summary {
            println!("  - {}", point);
        }
    }

    if !record.quiz.is_empty() {
        println!("\nQuiz:");
        for (i, q) in record.quiz.iter().enumerate() {
            println!("  {}. {}", i + 1, q.question);
            for (j, option) in q.options.iter().enumerate() {
                let marker = if j == q.answer { "*" } else { " " };
                println!("     {} {}) {}", marker, (b'a' + j as u8) as char, option);
            }
        }
    }

    Ok(())
}

/// Run history commands
async fn run_history_command(
    config: AppConfig,
    action: HistoryCommands,
    format: &str,
) -> Result<()> {
    let store = HistoryStore::open(&config.storage.path, &config.storage.history_key)?;

    match action {
        HistoryCommands::List { count } => {
            let records = store.list()?;
            let shown: Vec<&StudyRecord> = records.iter().take(count).collect();

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }

            println!("Scan history ({} of {} records):", shown.len(), records.len());
            for record in shown {
                println!(
                    "  {}  {}  {} quiz questions  {}",
                    record.date.format("%Y-%m-%d %H:%M"),
                    record.id,
                    record.quiz.len(),
                    record.image_uri.as_deref().unwrap_or("-")
                );
            }
        }
        HistoryCommands::Show { id } => match store.get(&id)? {
            Some(record) => print_record(&record, format)?,
            None => {
                eprintln!("No record with id {}", id);
            }
        },
        HistoryCommands::Export { output } => {
            let records = store.list()?;
            let json = serde_json::to_string_pretty(&records)?;
            std::fs::write(&output, json)?;
            println!("Exported {} records to {:?}", records.len(), output);
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing the scan history");
                return Ok(());
            }
            store.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
async fn run_config_command(
    config: AppConfig,
    action: ConfigCommands,
    config_path: &Path,
) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            let default_config = AppConfig::default();
            default_config.save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            println!("Configuration at {:?} is valid", config_path);
            println!("  Model: {}", config.ai_engine.model);
            println!("  Capture dirs: {:?}", config.watch_paths);
            println!("  History store: {}", config.storage.path);
            println!(
                "  API key: {}",
                if config.ai_engine.resolve_api_key().is_some() {
                    "configured"
                } else {
                    "missing (demo mode)"
                }
            );
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    println!("StudySnap v1.2.0 Status");
    println!("=======================");

    let api_key = config.ai_engine.resolve_api_key();

    match api_key {
        Some(_) => {
            println!("Credential: configured");

            let client = studysnap::gemini::GeminiClient::new(
                &config.ai_engine.url,
                config.ai_engine.resolve_api_key(),
                config.ai_engine.timeout_secs,
            );

            match client.health_check().await {
                Ok(()) => println!("Gemini: reachable"),
                Err(e) => println!("Gemini: error - {}", e),
            }

            match client.list_models().await {
                Ok(models) => {
                    println!("\nAvailable models:");
                    for m in &models {
                        let marker = if m.starts_with(&config.ai_engine.model) {
                            "→"
                        } else {
                            " "
                        };
                        println!("  {} {}", marker, m);
                    }
                }
                Err(e) => println!("  Error listing models: {}", e),
            }
        }
        None => {
            println!("Credential: missing - scans return demo material");
        }
    }

    match HistoryStore::open(&config.storage.path, &config.storage.history_key) {
        Ok(store) => {
            println!("\nHistory store ({}):", config.storage.path);
            println!("  Records: {}", store.count()?);
        }
        Err(e) => println!("\nHistory store: error - {}", e),
    }

    println!("\nConfiguration:");
    println!("  Model: {}", config.ai_engine.model);
    println!("  Capture dirs: {:?}", config.watch_paths);

    Ok(())
}

/// Initialize a new StudySnap setup
async fn run_init(dir: Option<PathBuf>, force: bool) -> Result<()> {
    let target = dir.unwrap_or_else(|| PathBuf::from("."));
    let config_path = target.join("config.json");

    if config_path.exists() && !force {
        return Err(StudySnapError::Config(
            "config.json already exists. Use --force to overwrite".to_string(),
        ));
    }

    // Create capture directory
    let capture_dir = target.join("captures");
    std::fs::create_dir_all(&capture_dir)?;

    let mut config = AppConfig::default();
    config.watch_paths = vec![capture_dir.to_string_lossy().to_string()];
    config.save(&config_path)?;

    println!("StudySnap initialized in {:?}", target);
    println!("\nCreated:");
    println!("  - config.json");
    println!("  - captures/");
    println!("\nNext steps:");
    println!("  1. Set GEMINI_API_KEY (or add api_key to config.json)");
    println!("  2. Scan your first notes: studysnap scan <image>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["studysnap"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_scan_command() {
        let cli = Cli::try_parse_from(["studysnap", "scan", "/tmp/notes.jpg", "--dry-run"]).unwrap();

        match cli.command {
            Some(Commands::Scan { image, dry_run }) => {
                assert!(dry_run);
                assert_eq!(image, PathBuf::from("/tmp/notes.jpg"));
            }
            _ => panic!("Expected Scan command"),
        }
    }

    #[test]
    fn test_cli_watch_command() {
        let cli = Cli::try_parse_from(["studysnap", "watch", "--dir", "/tmp/captures"]).unwrap();

        match cli.command {
            Some(Commands::Watch { dir, .. }) => {
                assert_eq!(dir, vec![PathBuf::from("/tmp/captures")]);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_cli_history_clear_requires_flag() {
        let cli = Cli::try_parse_from(["studysnap", "history", "clear", "--force"]).unwrap();

        match cli.command {
            Some(Commands::History {
                action: HistoryCommands::Clear { force },
            }) => assert!(force),
            _ => panic!("Expected History Clear command"),
        }
    }

    #[tokio::test]
    async fn test_process_image_dry_run_skips_store() {
        struct FixedGenerator;

        #[async_trait::async_trait]
        impl MaterialGenerator for FixedGenerator {
            async fn generate(&self, _image: &Path) -> Result<studysnap::generator::StudyMaterial> {
                Ok(studysnap::generator::fallback_material())
            }
        }

        let store = HistoryStore::in_memory("studysnap_history").unwrap();

        let record = process_image(Path::new("/tmp/notes.jpg"), &FixedGenerator, &store, true)
            .await
            .unwrap();
        assert_eq!(record.image_uri.as_deref(), Some("/tmp/notes.jpg"));
        assert!(store.list().unwrap().is_empty());

        let record = process_image(Path::new("/tmp/notes.jpg"), &FixedGenerator, &store, false)
            .await
            .unwrap();
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], record);
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_history_unchanged() {
        struct FailingGenerator;

        #[async_trait::async_trait]
        impl MaterialGenerator for FailingGenerator {
            async fn generate(&self, _image: &Path) -> Result<studysnap::generator::StudyMaterial> {
                Err(StudySnapError::Generation("service unreachable".to_string()))
            }
        }

        let store = HistoryStore::in_memory("studysnap_history").unwrap();

        let result = process_image(Path::new("/tmp/notes.jpg"), &FailingGenerator, &store, false).await;
        assert!(result.is_err());
        assert!(store.list().unwrap().is_empty());
    }
}
