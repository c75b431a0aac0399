use anyhow::{Context, Result};
use clap::Parser;
use mlscraper::{logging, open_sink, MarketSummary, PipelineConfig, StoreConfig};
use std::path::PathBuf;
use tracing::info;

/// Print market figures from the persisted listings table.
#[derive(Parser, Debug)]
#[command(name = "summarize")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    table: Option<String>,

    #[arg(long, conflicts_with = "parquet_dir")]
    db: Option<PathBuf>,

    #[arg(long)]
    parquet_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init("warn,mlscraper=info");

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_yaml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(table) = args.table {
        cfg.table_name = table;
    }
    if let Some(path) = args.db {
        cfg.store = StoreConfig::Sqlite { path };
    }
    if let Some(dir) = args.parquet_dir {
        cfg.store = StoreConfig::Parquet { dir };
    }

    let sink = open_sink(&cfg.store);
    let batch = sink
        .read_table(&cfg.table_name)
        .with_context(|| format!("loading table {}", cfg.table_name))?;
    info!(rows = batch.num_rows(), "loaded listings");

    if batch.num_rows() == 0 {
        println!("No data available in {}.", cfg.table_name);
        return Ok(());
    }

    let summary = MarketSummary::from_batch(&batch).context("summarizing listings")?;
    print!("{}", summary.render());
    Ok(())
}
