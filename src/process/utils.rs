use crate::error::Result;
use arrow::{
    array::ArrayRef,
    datatypes::{Field, FieldRef, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim()
    } else {
        trimmed
    }
}

/// Rebuild `batch` with column `idx` swapped for `array` under `field`.
pub fn replace_column(
    batch: &RecordBatch,
    idx: usize,
    field: Field,
    array: ArrayRef,
) -> Result<RecordBatch> {
    let mut fields: Vec<FieldRef> = batch.schema().fields().iter().cloned().collect();
    let mut cols = batch.columns().to_vec();
    fields[idx] = Arc::new(field);
    cols[idx] = array;

    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).map_err(Into::into)
}
