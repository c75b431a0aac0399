// src/process/derive.rs

use crate::config::DerivedPrice;
use crate::error::{PipelineError, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Array},
    compute::cast,
    datatypes::{DataType, Field, FieldRef, Schema},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};
use tracing::debug;

/// Derived columns go right after `brand` and `name`. Purely cosmetic.
const DERIVED_POSITION: usize = 2;

/// Build `price.name = whole + cents / 100` for each entry and drop the inputs.
///
/// Inputs must already be numeric; text means coercion has not run yet.
#[tracing::instrument(level = "debug", skip_all, fields(derived = prices.len()))]
pub fn derive_prices(batch: RecordBatch, prices: &[DerivedPrice]) -> Result<RecordBatch> {
    let mut derived: Vec<(FieldRef, ArrayRef)> = Vec::with_capacity(prices.len());
    let mut dropped: HashSet<&str> = HashSet::new();

    for price in prices {
        let whole = numeric_column(&batch, &price.whole)?;
        let cents = numeric_column(&batch, &price.cents)?;

        // a null part only shows up outside the pipeline; count it as zero
        let values: Float64Array = whole
            .iter()
            .zip(cents.iter())
            .map(|(w, c)| Some(w.unwrap_or(0.0) + c.unwrap_or(0.0) / 100.0))
            .collect();

        derived.push((
            Arc::new(Field::new(&price.name, DataType::Float64, false)),
            Arc::new(values),
        ));
        dropped.insert(price.whole.as_str());
        dropped.insert(price.cents.as_str());
        dropped.insert(price.name.as_str());
    }

    let schema = batch.schema();
    let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len());
    let mut cols: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for (field, col) in schema.fields().iter().zip(batch.columns()) {
        if dropped.contains(field.name().as_str()) {
            continue;
        }
        fields.push(field.clone());
        cols.push(col.clone());
    }

    let at = DERIVED_POSITION.min(fields.len());
    for (offset, (field, col)) in derived.into_iter().enumerate() {
        debug!(column = %field.name(), position = at + offset, "derived price column");
        fields.insert(at + offset, field);
        cols.insert(at + offset, col);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), cols).map_err(Into::into)
}

fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let schema = batch.schema();
    let (idx, field) = schema
        .column_with_name(name)
        .ok_or_else(|| PipelineError::missing_column(name, "a numeric column"))?;
    if !field.data_type().is_numeric() {
        return Err(PipelineError::type_mismatch(
            name,
            "a numeric column",
            field.data_type(),
        ));
    }

    let arr = cast(batch.column(idx), &DataType::Float64)?;
    arr.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| PipelineError::type_mismatch(name, "a numeric column", arr.data_type()))
}
