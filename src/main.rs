// src/main.rs
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use plate_reads::utils::{self, AppError, StorageError};
use plate_reads::{ExtractOptions, SectionExtractor, StorageManager, Table};

/// Command Line Interface for the EnSpire plate read extractor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Plate reader CSV export to extract
    input: PathBuf,

    /// Output directory for extracted tables
    #[arg(short, long, default_value = "./output")]
    output_dir: String,

    /// Fail when a plate read repeats a row label
    #[arg(long)]
    unique_labels: bool,

    /// Print the tables as JSON to stdout instead of writing files
    #[arg(long)]
    json: bool,

    /// Log the extractor's geometry and slicing steps (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments
    let args = Args::parse();

    // 2. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging(args.verbose);
    tracing::info!("Starting extraction for args: {:?}", args);

    if !args.input.is_file() {
        return Err(AppError::Config(format!("Input file not found: {}", args.input.display())));
    }

    // 3. Extract every plate read
    let extractor = SectionExtractor::with_options(ExtractOptions {
        require_unique_labels: args.unique_labels,
    });
    let reads = extractor.extract_path(&args.input)?;
    let geometry = reads.geometry();
    tracing::info!(
        "Found {} plate reads ({} rows x {} columns)",
        reads.len(),
        geometry.row_count,
        geometry.column_count
    );
    let tables: Vec<Table> = reads.collect();

    // 4. Emit results
    if args.json {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &tables)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        writeln!(stdout)?;
        return Ok(());
    }

    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plate".to_string());

    let storage = StorageManager::new(&args.output_dir)?;
    for table in &tables {
        storage.save_table(&stem, table)?;
    }
    storage.save_metadata(&stem, &args.input, geometry, &tables)?;

    tracing::info!("Extraction finished. Saved {} tables to {}", tables.len(), args.output_dir);

    Ok(())
}
