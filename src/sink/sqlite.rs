// src/sink/sqlite.rs

use crate::error::{PipelineError, Result};
use crate::sink::Sink;
use arrow::{
    array::{Array, ArrayRef, AsArray, Float64Builder, Int64Builder, StringBuilder},
    datatypes::{
        DataType, Field, Float32Type, Float64Type, Int32Type, Int64Type, Schema, TimeUnit,
        TimestampMicrosecondType,
    },
    record_batch::RecordBatch,
};
use chrono::DateTime;
use rusqlite::{
    params_from_iter,
    types::{Value, ValueRef},
    Connection, OpenFlags,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// SQLite-backed store. Each replacement runs in one transaction.
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, table: &str) -> Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::persistence(table, e))?;
        }
        Connection::open(&self.path).map_err(|e| PipelineError::persistence(table, e))
    }
}

impl Sink for SqliteSink {
    #[tracing::instrument(level = "info", skip(self, batch), fields(db = %self.path.display(), rows = batch.num_rows()))]
    fn replace_table(&mut self, table: &str, batch: &RecordBatch) -> Result<()> {
        let fail = |e: rusqlite::Error| PipelineError::persistence(table, e);

        let schema = batch.schema();
        if schema.fields().is_empty() {
            return Err(PipelineError::persistence(table, "table has no columns"));
        }
        let column_defs = schema
            .fields()
            .iter()
            .map(|f| {
                let ty = sql_type(f.data_type()).ok_or_else(|| {
                    PipelineError::persistence(
                        table,
                        format!("column `{}` has unsupported type {}", f.name(), f.data_type()),
                    )
                })?;
                Ok(format!("{} {}", quote_ident(f.name()), ty))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut conn = self.open(table)?;
        // dropped without commit → rolled back, old table stays
        let tx = conn.transaction().map_err(fail)?;
        let ident = quote_ident(table);

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {ident};\nCREATE TABLE {ident} ({});",
            column_defs.join(", ")
        ))
        .map_err(fail)?;

        {
            let placeholders: Vec<String> = (1..=column_defs.len()).map(|i| format!("?{}", i)).collect();
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {ident} VALUES ({})",
                    placeholders.join(", ")
                ))
                .map_err(fail)?;

            for row in 0..batch.num_rows() {
                let values = batch
                    .columns()
                    .iter()
                    .map(|col| cell_value(col, row))
                    .collect::<Option<Vec<Value>>>()
                    .ok_or_else(|| {
                        PipelineError::persistence(table, format!("unrepresentable value in row {}", row))
                    })?;
                stmt.execute(params_from_iter(values.iter())).map_err(fail)?;
            }
        }

        tx.commit().map_err(fail)?;
        info!(table, rows = batch.num_rows(), "replaced sqlite table");
        Ok(())
    }

    fn read_table(&self, table: &str) -> Result<RecordBatch> {
        let fail = |e: rusqlite::Error| PipelineError::persistence(table, e);
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(fail)?;
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {}", quote_ident(table)))
            .map_err(fail)?;

        let columns: Vec<(String, DataType)> = stmt
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), arrow_type(c.decl_type())))
            .collect();
        let mut builders: Vec<ColumnBuilder> =
            columns.iter().map(|(_, dt)| ColumnBuilder::new(dt)).collect();

        let mut rows = stmt.query([]).map_err(fail)?;
        while let Some(row) = rows.next().map_err(fail)? {
            for (i, builder) in builders.iter_mut().enumerate() {
                builder.push(row.get_ref(i).map_err(fail)?);
            }
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, dt)| Field::new(name, dt.clone(), true))
            .collect();
        let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        debug!(table, rows = batch.num_rows(), "read sqlite table");
        Ok(batch)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Declared SQLite type for an Arrow column, or `None` if we can't store it.
fn sql_type(dt: &DataType) -> Option<&'static str> {
    match dt {
        DataType::Utf8 | DataType::LargeUtf8 => Some("TEXT"),
        DataType::Float32 | DataType::Float64 => Some("REAL"),
        DataType::Int32 | DataType::Int64 | DataType::Boolean => Some("INTEGER"),
        DataType::Timestamp(TimeUnit::Microsecond, _) => Some("TIMESTAMP"),
        _ => None,
    }
}

/// Declared type → Arrow type for reading back. Timestamps come back as text.
fn arrow_type(decl: Option<&str>) -> DataType {
    let upper = decl.unwrap_or_default().to_ascii_uppercase();
    if upper.contains("INT") {
        DataType::Int64
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

fn cell_value(col: &ArrayRef, row: usize) -> Option<Value> {
    if col.is_null(row) {
        return Some(Value::Null);
    }
    let value = match col.data_type() {
        DataType::Utf8 => Value::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Float64 => Value::Real(col.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => Value::Real(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Int64 => Value::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::Int32 => Value::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Boolean => Value::Integer(col.as_boolean().value(row) as i64),
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let micros = col.as_primitive::<TimestampMicrosecondType>().value(row);
            let dt = DateTime::from_timestamp_micros(micros)?;
            Value::Text(dt.format(TIMESTAMP_FORMAT).to_string())
        }
        _ => return None,
    };
    Some(value)
}

enum ColumnBuilder {
    Float(Float64Builder),
    Integer(Int64Builder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn new(dt: &DataType) -> Self {
        match dt {
            DataType::Float64 => ColumnBuilder::Float(Float64Builder::new()),
            DataType::Int64 => ColumnBuilder::Integer(Int64Builder::new()),
            _ => ColumnBuilder::Text(StringBuilder::new()),
        }
    }

    fn push(&mut self, value: ValueRef<'_>) {
        match (self, value) {
            (ColumnBuilder::Float(b), ValueRef::Real(v)) => b.append_value(v),
            (ColumnBuilder::Float(b), ValueRef::Integer(v)) => b.append_value(v as f64),
            (ColumnBuilder::Float(b), _) => b.append_null(),
            (ColumnBuilder::Integer(b), ValueRef::Integer(v)) => b.append_value(v),
            (ColumnBuilder::Integer(b), ValueRef::Real(v)) => b.append_value(v as i64),
            (ColumnBuilder::Integer(b), _) => b.append_null(),
            (ColumnBuilder::Text(b), ValueRef::Text(t)) => b.append_value(String::from_utf8_lossy(t)),
            (ColumnBuilder::Text(b), ValueRef::Integer(v)) => b.append_value(v.to_string()),
            (ColumnBuilder::Text(b), ValueRef::Real(v)) => b.append_value(v.to_string()),
            (ColumnBuilder::Text(b), _) => b.append_null(),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Float(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Integer(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Text(mut b) => Arc::new(b.finish()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use arrow::array::{Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
    use tempfile::tempdir;

    fn sample(prices: Vec<f64>) -> RecordBatch {
        let n = prices.len();
        let schema = Schema::new(vec![
            Field::new("brand", DataType::Utf8, true),
            Field::new("new_price", DataType::Float64, false),
            Field::new("reviews_amount", DataType::Int64, false),
            Field::new(
                "_collection_date",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
        ]);
        let brands: Vec<Option<&str>> = (0..n).map(|i| if i == 0 { None } else { Some("Nike") }).collect();
        RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(brands)),
                Arc::new(Float64Array::from(prices)),
                Arc::new(Int64Array::from(vec![7; n])),
                Arc::new(TimestampMicrosecondArray::from(vec![1_734_199_357_000_000; n]).with_timezone("UTC")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn replace_then_read_back() -> Result<()> {
        let dir = tempdir()?;
        let mut sink = SqliteSink::new(dir.path().join("nested").join("quotes.db"));

        sink.replace_table("Items", &sample(vec![1.5, 2.5, 3.5]))?;
        let back = sink.read_table("Items")?;

        assert_eq!(back.num_rows(), 3);
        assert_eq!(back.schema().field(1).data_type(), &DataType::Float64);
        assert_eq!(back.schema().field(2).data_type(), &DataType::Int64);
        let prices = back.column(1).as_primitive::<Float64Type>();
        assert_eq!(prices.values().to_vec(), vec![1.5, 2.5, 3.5]);
        assert!(back.column(0).is_null(0));
        let ts = back.column(3).as_string::<i32>();
        assert_eq!(ts.value(0), "2024-12-14 18:02:37.000000");
        Ok(())
    }

    #[test]
    fn second_write_replaces_first() -> Result<()> {
        let dir = tempdir()?;
        let mut sink = SqliteSink::new(dir.path().join("quotes.db"));

        sink.replace_table("Items", &sample(vec![1.0, 2.0, 3.0, 4.0]))?;
        sink.replace_table("Items", &sample(vec![9.0]))?;

        let back = sink.read_table("Items")?;
        assert_eq!(back.num_rows(), 1);
        assert_eq!(back.column(1).as_primitive::<Float64Type>().value(0), 9.0);
        Ok(())
    }

    #[test]
    fn failed_write_keeps_old_table() -> Result<()> {
        let dir = tempdir()?;
        let mut sink = SqliteSink::new(dir.path().join("quotes.db"));
        sink.replace_table("Items", &sample(vec![1.0, 2.0]))?;

        // out of chrono's range: fails on insert, after the DROP ran
        let schema = Schema::new(vec![Field::new(
            "_collection_date",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        )]);
        let bad = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(TimestampMicrosecondArray::from(vec![i64::MAX]))],
        )?;
        let err = sink.replace_table("Items", &bad).unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { .. }));

        assert_eq!(sink.read_table("Items")?.num_rows(), 2);
        Ok(())
    }

    #[test]
    fn unsupported_column_type_rejected() {
        let schema = Schema::new(vec![Field::new("d", DataType::Date32, true)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(arrow::array::Date32Array::from(vec![1]))],
        )
        .unwrap();
        let mut sink = SqliteSink::new("unused.db");
        let err = sink.replace_table("Items", &batch).unwrap_err();
        assert!(err.to_string().contains("unsupported type"));
    }

    #[test]
    fn missing_table_is_a_persistence_error() -> Result<()> {
        let dir = tempdir()?;
        let mut sink = SqliteSink::new(dir.path().join("quotes.db"));
        sink.replace_table("Other", &sample(vec![1.0]))?;
        let err = sink.read_table("Items").unwrap_err();
        assert!(matches!(err, PipelineError::Persistence { ref table, .. } if table == "Items"));
        Ok(())
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("Mercado_Livre_Items"), "\"Mercado_Livre_Items\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
