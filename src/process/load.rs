// src/process/load.rs

use crate::error::{PipelineError, Result};
use arrow::{
    array::{ArrayRef, StringArray, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{collections::HashMap, io::BufRead, sync::Arc};
use tracing::{debug, info, warn};

/// Fields every scraped listing carries, in column order.
pub const RAW_FIELDS: [&str; 8] = [
    "brand",
    "name",
    "old_price_in_reais",
    "old_price_in_cents",
    "new_price_in_reais",
    "new_price_in_cents",
    "reviews_rating_number",
    "reviews_amount",
];

pub const COLLECTION_DATE_COLUMN: &str = "_collection_date";
pub const SOURCE_COLUMN: &str = "_source";

/// Values stamped onto every row of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub collected_at: DateTime<Utc>,
    pub source: String,
}

impl RunMetadata {
    /// Metadata for a run starting now.
    pub fn new(source: impl Into<String>) -> Self {
        Self::at(source, Utc::now())
    }

    pub fn at(source: impl Into<String>, collected_at: DateTime<Utc>) -> Self {
        Self {
            collected_at,
            source: source.into(),
        }
    }
}

/// Read a JSONL stream of raw listings into one Utf8 table, then append the
/// `_collection_date` and `_source` columns.
///
/// - the eight raw fields always come first, missing keys are null
/// - unknown keys become extra Utf8 columns in order of first appearance
/// - raw keys named like a metadata column are dropped; the run metadata wins
/// - numbers and booleans keep their JSON text; arrays and objects are rejected
/// - blank lines are skipped
#[tracing::instrument(level = "info", skip(reader, meta), fields(source = %meta.source))]
pub fn load_records<R: BufRead>(reader: R, meta: &RunMetadata) -> Result<RecordBatch> {
    let mut headers: Vec<String> = RAW_FIELDS.iter().map(|s| s.to_string()).collect();
    let mut positions: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.clone(), i))
        .collect();
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut shadowed = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| PipelineError::data_format(line_no, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }

        let record: Value = serde_json::from_str(&line)
            .map_err(|e| PipelineError::data_format(line_no, format!("invalid JSON: {}", e)))?;
        let Value::Object(fields) = record else {
            return Err(PipelineError::data_format(
                line_no,
                "expected a JSON object",
            ));
        };

        let mut row: Vec<Option<String>> = vec![None; headers.len()];
        for (key, value) in fields {
            if key == COLLECTION_DATE_COLUMN || key == SOURCE_COLUMN {
                shadowed += 1;
                continue;
            }
            let text = field_text(&key, value).map_err(|r| PipelineError::data_format(line_no, r))?;
            let col = match positions.get(&key) {
                Some(&col) => col,
                None => {
                    debug!(column = %key, line = line_no, "new raw column");
                    headers.push(key.clone());
                    positions.insert(key, headers.len() - 1);
                    headers.len() - 1
                }
            };
            if row.len() <= col {
                row.resize(col + 1, None);
            }
            row[col] = text;
        }
        rows.push(row);
    }
    if shadowed > 0 {
        warn!(shadowed, "dropped raw values named like run metadata columns");
    }

    let num_rows = rows.len();
    let mut fields = Vec::with_capacity(headers.len() + 2);
    let mut cols: Vec<ArrayRef> = Vec::with_capacity(headers.len() + 2);

    for (col, name) in headers.iter().enumerate() {
        let values: StringArray = rows
            .iter()
            .map(|row| row.get(col).and_then(|v| v.as_deref()))
            .collect();
        fields.push(Field::new(name, DataType::Utf8, true));
        cols.push(Arc::new(values));
    }

    let (meta_fields, meta_cols) = metadata_columns(meta, num_rows);
    fields.extend(meta_fields);
    cols.extend(meta_cols);

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), cols)?;
    info!(
        rows = batch.num_rows(),
        columns = batch.num_columns(),
        "loaded raw records"
    );
    Ok(batch)
}

/// Text form of one JSON field value, or the reason it is unusable.
fn field_text(key: &str, value: Value) -> std::result::Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) | Value::Object(_) => {
            Err(format!("field `{}` holds a nested value", key))
        }
    }
}

fn metadata_columns(meta: &RunMetadata, num_rows: usize) -> (Vec<Field>, Vec<ArrayRef>) {
    let ts = TimestampMicrosecondArray::from(vec![meta.collected_at.timestamp_micros(); num_rows])
        .with_timezone("UTC");
    let source = StringArray::from(vec![meta.source.as_str(); num_rows]);

    (
        vec![
            Field::new(
                COLLECTION_DATE_COLUMN,
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(SOURCE_COLUMN, DataType::Utf8, false),
        ],
        vec![Arc::new(ts), Arc::new(source)],
    )
}
