// src/sink/mod.rs

pub mod parquet;
pub mod sqlite;

use crate::config::StoreConfig;
use crate::error::Result;
use arrow::record_batch::RecordBatch;

pub use self::parquet::ParquetSink;
pub use self::sqlite::SqliteSink;

/// A tabular store that the pipeline overwrites wholesale.
pub trait Sink {
    /// Replace `table` with `batch`. Readers see either the old table or the
    /// new one, never a partial write.
    fn replace_table(&mut self, table: &str, batch: &RecordBatch) -> Result<()>;

    /// Read `table` back as a single batch.
    fn read_table(&self, table: &str) -> Result<RecordBatch>;
}

/// Open the sink described by `store`.
pub fn open_sink(store: &StoreConfig) -> Box<dyn Sink> {
    match store {
        StoreConfig::Sqlite { path } => Box::new(SqliteSink::new(path)),
        StoreConfig::Parquet { dir } => Box::new(ParquetSink::new(dir)),
    }
}
