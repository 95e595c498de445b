//! bucket-tar - Streaming S3 Bucket Archiver
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use bucket_tar::config::{ArchiveConfig, CliArgs};
use bucket_tar::progress::{print_header, print_summary, ProgressReporter};
use bucket_tar::store::{S3Store, S3StoreConfig};
use bucket_tar::ArchiveCoordinator;
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ArchiveConfig::from_args(&args).context("Invalid configuration")?;

    // Build the store client
    let store = S3Store::new(S3StoreConfig {
        bucket: config.bucket.clone(),
        region: args.region.clone(),
        endpoint: args.endpoint.clone(),
        access_key: args.access_key_id.clone(),
        secret_key: args.secret_access_key.clone(),
    })
    .context("Failed to initialize S3 client")?;

    let output_display = match &config.output {
        Some(path) => path.display().to_string(),
        None => "<stdout>".to_string(),
    };

    // Print header
    if config.show_progress {
        print_header(&config.bucket, config.worker_count, &output_display);
    }

    // Create coordinator
    let coordinator = ArchiveCoordinator::new(config.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Open the sink
    let sink: Box<dyn Write + Send> = match &config.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };

    let store: Arc<dyn bucket_tar::ObjectStore> = Arc::new(store);

    // Run the pipeline, with or without the progress display
    let result = if config.show_progress {
        let reporter = Arc::new(ProgressReporter::new());
        reporter.set_status("Listing bucket...");
        let display = Arc::clone(&reporter);
        let run = coordinator.run_with_progress(store, sink, move |progress| {
            display.update(progress);
        });

        match &run {
            Ok(stats) if stats.completed => reporter.finish("Archive completed"),
            Ok(_) => reporter.finish("Archive interrupted"),
            Err(_) => reporter.finish_and_clear(),
        }
        run
    } else {
        coordinator.run(store, sink)
    };

    match result {
        Ok(stats) => {
            if !stats.completed {
                remove_partial_output(config.output.as_deref());
                bail!("interrupted before the archive was finalized");
            }

            if config.show_progress {
                print_summary(
                    stats.entries_written,
                    stats.bytes_written,
                    stats.retries,
                    stats.duration,
                    &output_display,
                );
            }

            if stats.retries > 0 {
                info!(retries = stats.retries, "completed with transient retries");
            }

            Ok(())
        }
        Err(e) => {
            remove_partial_output(config.output.as_deref());
            Err(e).context("Archiving failed")
        }
    }
}

/// Remove a partially written output file; a truncated tar is worse than
/// no file at all
fn remove_partial_output(path: Option<&Path>) {
    if let Some(path) = path {
        if let Err(e) = std::fs::remove_file(path) {
            error!(path = %path.display(), error = %e, "failed to remove partial output");
        } else {
            eprintln!("Removed partial output '{}'", path.display());
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("bucket_tar=debug,warn")
    } else {
        EnvFilter::new("bucket_tar=info,warn")
    };

    // stdout may be carrying the archive; all diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
