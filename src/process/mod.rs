// src/process/mod.rs
pub mod clean;
pub mod coerce;
pub mod derive;
pub mod load;
pub mod utils;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::sink::Sink;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::io::BufRead;
use tracing::{debug, info, info_span};

pub use clean::strip_decorations;
pub use coerce::coerce_numeric;
pub use derive::derive_prices;
pub use load::{load_records, RunMetadata, COLLECTION_DATE_COLUMN, RAW_FIELDS, SOURCE_COLUMN};

/// The table-to-table steps, in the only order that works: cleaned text must
/// exist before parsing, and numbers before arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StripDecorations,
    CoerceNumeric,
    DerivePrices,
}

pub const STAGES: [Stage; 3] = [Stage::StripDecorations, Stage::CoerceNumeric, Stage::DerivePrices];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::StripDecorations => "strip_decorations",
            Stage::CoerceNumeric => "coerce_numeric",
            Stage::DerivePrices => "derive_prices",
        }
    }

    pub fn apply(self, batch: RecordBatch, config: &PipelineConfig) -> Result<RecordBatch> {
        match self {
            Stage::StripDecorations => strip_decorations(batch, &config.decorated_column),
            Stage::CoerceNumeric => coerce_numeric(batch, &config.numeric_columns),
            Stage::DerivePrices => derive_prices(batch, &config.derived_prices),
        }
    }
}

/// What a finished run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub collected_at: DateTime<Utc>,
}

/// Run every stage over a loaded table. Stops at the first failing stage.
pub fn process_table(batch: RecordBatch, config: &PipelineConfig) -> Result<RecordBatch> {
    STAGES.iter().try_fold(batch, |batch, &stage| {
        let span = info_span!("stage", stage = stage.name());
        let _enter = span.enter();

        let out = stage.apply(batch, config)?;
        debug!(rows = out.num_rows(), columns = out.num_columns(), "stage done");
        Ok(out)
    })
}

/// Load, process and persist one run with fresh metadata.
pub fn run_pipeline<R: BufRead>(
    reader: R,
    config: &PipelineConfig,
    sink: &mut dyn Sink,
) -> Result<RunReport> {
    let meta = RunMetadata::new(config.source_url.as_str());
    run_pipeline_with(reader, config, &meta, sink)
}

/// Same as [`run_pipeline`] with caller-supplied run metadata.
///
/// The sink is only called once every stage succeeded.
#[tracing::instrument(level = "info", skip_all, fields(table = %config.table_name))]
pub fn run_pipeline_with<R: BufRead>(
    reader: R,
    config: &PipelineConfig,
    meta: &RunMetadata,
    sink: &mut dyn Sink,
) -> Result<RunReport> {
    let raw = load_records(reader, meta)?;
    let processed = process_table(raw, config)?;

    sink.replace_table(&config.table_name, &processed)?;

    let report = RunReport {
        table: config.table_name.clone(),
        rows: processed.num_rows(),
        columns: processed.num_columns(),
        collected_at: meta.collected_at,
    };
    info!(rows = report.rows, columns = report.columns, "run complete");
    Ok(report)
}
