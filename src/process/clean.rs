use crate::error::{PipelineError, Result};
use crate::process::utils::replace_column;
use arrow::{
    array::{Array, ArrayRef, StringArray},
    compute::cast,
    datatypes::{DataType, Field},
    record_batch::RecordBatch,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{borrow::Cow, sync::Arc};
use tracing::debug;

// Only parentheses are known to wrap scraped counts, e.g. "(123)".
static DECORATIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[()]").unwrap());

/// Remove every `(` and `)` from the string column `column`. Nulls pass through.
///
/// Fails with `TypeMismatch` when the column is missing or no longer a string
/// column, which means the stage was wired after coercion.
#[tracing::instrument(level = "debug", skip(batch))]
pub fn strip_decorations(batch: RecordBatch, column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let (idx, field) = schema
        .column_with_name(column)
        .ok_or_else(|| PipelineError::missing_column(column, "a string column"))?;

    let arr = match field.data_type() {
        DataType::Utf8 => batch.column(idx).clone(),
        DataType::LargeUtf8 => cast(batch.column(idx), &DataType::Utf8)?,
        other => return Err(PipelineError::type_mismatch(column, "a string column", other)),
    };
    let sarr = arr
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PipelineError::type_mismatch(column, "a string column", arr.data_type()))?;

    let mut changed = 0usize;
    let cleaned: StringArray = sarr
        .iter()
        .map(|opt| {
            opt.map(|s| match DECORATIONS.replace_all(s, "") {
                Cow::Borrowed(b) => b.to_string(),
                Cow::Owned(o) => {
                    changed += 1;
                    o
                }
            })
        })
        .collect();
    debug!(column, changed, "stripped decorations");

    replace_column(
        &batch,
        idx,
        Field::new(column, DataType::Utf8, field.is_nullable()),
        Arc::new(cleaned) as ArrayRef,
    )
}
