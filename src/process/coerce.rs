use crate::config::{NumericColumn, NumericKind};
use crate::error::{PipelineError, Result};
use crate::process::utils::{clean_str, replace_column};
use arrow::{
    array::{Array, ArrayRef, Float64Array, Int64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Field},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, warn};

impl NumericKind {
    pub fn data_type(self) -> DataType {
        match self {
            NumericKind::Float => DataType::Float64,
            NumericKind::Integer => DataType::Int64,
        }
    }
}

/// Convert the listed columns to Float64 / Int64.
///
/// Nulls become zero first. A value that does not parse, or parses to a
/// non-finite number, also becomes zero: a listing without a discount or
/// reviews must still produce a usable row. Only a missing column or one that
/// is neither text nor numeric fails.
#[tracing::instrument(level = "debug", skip_all, fields(columns = columns.len()))]
pub fn coerce_numeric(batch: RecordBatch, columns: &[NumericColumn]) -> Result<RecordBatch> {
    let mut batch = batch;

    for target in columns {
        let schema = batch.schema();
        let (idx, field) = schema
            .column_with_name(&target.name)
            .ok_or_else(|| PipelineError::missing_column(&target.name, "a text or numeric column"))?;
        let arr = batch.column(idx);

        let (coerced, fallbacks) = match field.data_type() {
            DataType::Utf8 | DataType::LargeUtf8 => {
                let utf8 = cast(arr, &DataType::Utf8)?;
                let sarr = utf8
                    .as_any()
                    .downcast_ref::<StringArray>()
                    .ok_or_else(|| {
                        PipelineError::type_mismatch(&target.name, "a text column", utf8.data_type())
                    })?;
                parse_strings(&target.name, sarr, target.kind)
            }
            dt if dt.is_numeric() || *dt == DataType::Null => {
                (cast_numeric(arr, target.kind)?, 0)
            }
            other => {
                return Err(PipelineError::type_mismatch(
                    &target.name,
                    "a text or numeric column",
                    other,
                ))
            }
        };

        if fallbacks > 0 {
            warn!(column = %target.name, fallbacks, "unparseable values replaced with zero");
        }

        batch = replace_column(
            &batch,
            idx,
            Field::new(&target.name, target.kind.data_type(), false),
            coerced,
        )?;
    }

    Ok(batch)
}

/// Parse every value; returns the array and how many non-null values fell back to zero.
fn parse_strings(column: &str, sarr: &StringArray, kind: NumericKind) -> (ArrayRef, usize) {
    let mut fallbacks = 0usize;
    let mut note = |row: usize, raw: &str| {
        fallbacks += 1;
        debug!(column, row, raw, "not a number, using zero");
    };

    let arr: ArrayRef = match kind {
        NumericKind::Float => {
            let values = sarr.iter().enumerate().map(|(row, opt)| match opt {
                None => 0.0,
                Some(raw) => parse_float(raw).unwrap_or_else(|| {
                    note(row, raw);
                    0.0
                }),
            });
            Arc::new(Float64Array::from_iter_values(values))
        }
        NumericKind::Integer => {
            let values = sarr.iter().enumerate().map(|(row, opt)| match opt {
                None => 0,
                Some(raw) => parse_integer(raw).unwrap_or_else(|| {
                    note(row, raw);
                    0
                }),
            });
            Arc::new(Int64Array::from_iter_values(values))
        }
    };

    (arr, fallbacks)
}

fn parse_float(raw: &str) -> Option<f64> {
    clean_str(raw)
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Integral text parses directly; otherwise a finite float is truncated toward zero.
fn parse_integer(raw: &str) -> Option<i64> {
    let s = clean_str(raw);
    s.parse::<i64>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.abs() < i64::MAX as f64)
            .map(|v| v.trunc() as i64)
    })
}

/// Already-numeric input: cast, then zero-fill nulls and overflow.
fn cast_numeric(arr: &ArrayRef, kind: NumericKind) -> Result<ArrayRef> {
    let casted = cast(arr, &kind.data_type())?;
    let out: ArrayRef = match kind {
        NumericKind::Float => {
            let f = casted
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| PipelineError::type_mismatch("<cast>", "Float64", casted.data_type()))?;
            Arc::new(Float64Array::from_iter_values(
                f.iter().map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0)),
            ))
        }
        NumericKind::Integer => {
            let i = casted
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| PipelineError::type_mismatch("<cast>", "Int64", casted.data_type()))?;
            Arc::new(Int64Array::from_iter_values(i.iter().map(|v| v.unwrap_or(0))))
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use arrow::datatypes::Schema;

    fn text_batch(cols: Vec<(&str, Vec<Option<&str>>)>) -> RecordBatch {
        let fields: Vec<Field> = cols
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
            .collect();
        let arrays: Vec<ArrayRef> = cols
            .into_iter()
            .map(|(_, v)| Arc::new(StringArray::from(v)) as ArrayRef)
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    fn floats<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
        let idx = batch.schema().index_of(name).unwrap();
        batch.column(idx).as_any().downcast_ref().unwrap()
    }

    fn ints<'a>(batch: &'a RecordBatch, name: &str) -> &'a Int64Array {
        let idx = batch.schema().index_of(name).unwrap();
        batch.column(idx).as_any().downcast_ref().unwrap()
    }

    #[test]
    fn nulls_and_garbage_become_zero() {
        let input = text_batch(vec![
            ("price", vec![Some("199"), None, Some("abc"), Some(" 12.5 "), Some("NaN")]),
            ("count", vec![Some("42"), None, Some("x"), Some("7.9"), Some("")]),
        ]);
        let out = coerce_numeric(
            input,
            &[
                NumericColumn::new("price", NumericKind::Float),
                NumericColumn::new("count", NumericKind::Integer),
            ],
        )
        .unwrap();

        assert_eq!(out.schema().field(0).data_type(), &DataType::Float64);
        assert_eq!(out.schema().field(1).data_type(), &DataType::Int64);
        assert_eq!(floats(&out, "price").values().to_vec(), vec![199.0, 0.0, 0.0, 12.5, 0.0]);
        assert_eq!(ints(&out, "count").values().to_vec(), vec![42, 0, 0, 7, 0]);
        assert_eq!(out.column(0).null_count(), 0);
        assert_eq!(out.column(1).null_count(), 0);
    }

    #[test]
    fn unlisted_columns_pass_through() {
        let input = text_batch(vec![
            ("brand", vec![Some("Nike"), None]),
            ("price", vec![Some("1"), Some("2")]),
        ]);
        let brand = input.column(0).clone();
        let out = coerce_numeric(input, &[NumericColumn::new("price", NumericKind::Float)]).unwrap();
        assert_eq!(out.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(out.column(0).as_ref(), brand.as_ref());
    }

    #[test]
    fn numeric_input_is_cast_and_zero_filled() {
        let schema = Schema::new(vec![Field::new("n", DataType::Float64, true)]);
        let input = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Float64Array::from(vec![Some(3.7), None]))],
        )
        .unwrap();
        let out = coerce_numeric(input, &[NumericColumn::new("n", NumericKind::Integer)]).unwrap();
        assert_eq!(ints(&out, "n").values().to_vec(), vec![3, 0]);
    }

    #[test]
    fn missing_column_fails() {
        let input = text_batch(vec![("brand", vec![Some("Nike")])]);
        let err = coerce_numeric(input, &[NumericColumn::new("price", NumericKind::Float)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { ref column, .. } if column == "price"));
    }

    #[test]
    fn default_mapping_covers_six_columns() {
        let cfg = PipelineConfig::default();
        let cols: Vec<(&str, Vec<Option<&str>>)> = cfg
            .numeric_columns
            .iter()
            .map(|c| (c.name.as_str(), vec![Some("1")]))
            .collect();
        let out = coerce_numeric(text_batch(cols), &cfg.numeric_columns).unwrap();
        assert_eq!(ints(&out, "reviews_amount").value(0), 1);
        assert_eq!(floats(&out, "reviews_rating_number").value(0), 1.0);
    }

    #[test]
    fn integer_parsing_rules() {
        assert_eq!(parse_integer("(12)"), None);
        assert_eq!(parse_integer("-3.9"), Some(-3));
        assert_eq!(parse_integer("1e3"), Some(1000));
        assert_eq!(parse_integer("inf"), None);
        assert_eq!(parse_float("\"4.5\""), Some(4.5));
    }
}
