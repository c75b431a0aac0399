use anyhow::{Context, Result};
use clap::Parser;
use mlscraper::{logging, open_sink, run_pipeline, PipelineConfig, StoreConfig};
use std::{
    fs::File,
    io::BufReader,
    path::PathBuf,
    time::Instant,
};
use tracing::{error, info};

/// Normalize scraped listings and replace the store table with them.
#[derive(Parser, Debug)]
#[command(name = "mlscraper", version)]
struct Args {
    /// YAML config; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSONL file of raw listings
    #[arg(long)]
    input: Option<PathBuf>,

    /// Target table name
    #[arg(long)]
    table: Option<String>,

    /// Write to this SQLite database
    #[arg(long, conflicts_with = "parquet_dir")]
    db: Option<PathBuf>,

    /// Write `<table>.parquet` into this directory instead
    #[arg(long)]
    parquet_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init("info,mlscraper=info");
    info!("startup");

    // ─── 2) resolve config ───────────────────────────────────────────
    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(input) = args.input {
        cfg.input_path = input;
    }
    if let Some(table) = args.table {
        cfg.table_name = table;
    }
    if let Some(path) = args.db {
        cfg.store = StoreConfig::Sqlite { path };
    }
    if let Some(dir) = args.parquet_dir {
        cfg.store = StoreConfig::Parquet { dir };
    }
    cfg.validate()?;
    info!(input = %cfg.input_path.display(), table = %cfg.table_name, store = ?cfg.store, "configured");

    // ─── 3) run ──────────────────────────────────────────────────────
    let file = File::open(&cfg.input_path)
        .with_context(|| format!("opening input {}", cfg.input_path.display()))?;
    let mut sink = open_sink(&cfg.store);

    let start = Instant::now();
    match run_pipeline(BufReader::new(file), &cfg, sink.as_mut()) {
        Ok(report) => {
            info!(
                table = %report.table,
                rows = report.rows,
                columns = report.columns,
                elapsed = ?start.elapsed(),
                "data processed and saved"
            );
            Ok(())
        }
        Err(e) => {
            error!("pipeline failed: {}", e);
            Err(e).context("processing pipeline")
        }
    }
}
