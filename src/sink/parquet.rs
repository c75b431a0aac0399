// src/sink/parquet.rs

use crate::config::is_plain_table_name;
use crate::error::{PipelineError, Result};
use crate::sink::Sink;
use arrow::{compute::concat_batches, error::ArrowError, record_batch::RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression};
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// One `<table>.parquet` file per table under `dir`.
pub struct ParquetSink {
    dir: PathBuf,
}

impl ParquetSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.parquet", table))
    }

    /// `table_path` for names that stay inside `dir`.
    fn checked_path(&self, table: &str) -> Result<PathBuf> {
        if !is_plain_table_name(table) {
            return Err(PipelineError::persistence(
                table,
                "table name must not contain path separators",
            ));
        }
        Ok(self.table_path(table))
    }

    fn write_file(&self, tmp_path: &Path, batch: &RecordBatch) -> std::result::Result<(), parquet::errors::ParquetError> {
        let props = WriterProperties::builder()
            .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
            .set_dictionary_enabled(true)
            .build();

        let file = File::create(tmp_path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    }
}

impl Sink for ParquetSink {
    /// Write to a hidden temp file next to the target, then rename over it.
    #[tracing::instrument(level = "info", skip(self, batch), fields(dir = %self.dir.display(), rows = batch.num_rows()))]
    fn replace_table(&mut self, table: &str, batch: &RecordBatch) -> Result<()> {
        let out_path = self.checked_path(table)?;
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::persistence(table, e))?;

        let tmp_path = self.dir.join(format!(".{}.parquet.tmp", table));

        if let Err(e) = self.write_file(&tmp_path, batch) {
            let _ = fs::remove_file(&tmp_path);
            return Err(PipelineError::persistence(table, e));
        }
        fs::rename(&tmp_path, &out_path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            PipelineError::persistence(table, e)
        })?;

        info!(table, path = %out_path.display(), "replaced parquet table");
        Ok(())
    }

    fn read_table(&self, table: &str) -> Result<RecordBatch> {
        let path = self.checked_path(table)?;
        let file = File::open(&path).map_err(|e| PipelineError::persistence(table, e))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| PipelineError::persistence(table, e))?;
        let schema = builder.schema().clone();
        let reader = builder
            .build()
            .map_err(|e| PipelineError::persistence(table, e))?;

        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()
            .map_err(|e| PipelineError::persistence(table, e))?;
        let batch = concat_batches(&schema, &batches)?;
        debug!(table, rows = batch.num_rows(), "read parquet table");
        Ok(batch)
    }
}
