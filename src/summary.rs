// src/summary.rs

use crate::error::{PipelineError, Result};
use arrow::{
    array::{Array, Float64Array, StringArray},
    compute::cast,
    datatypes::DataType,
    record_batch::RecordBatch,
};
use std::{collections::BTreeMap, fmt::Write};

pub const BRAND_COLUMN: &str = "brand";
pub const NEW_PRICE_COLUMN: &str = "new_price";
pub const RATING_COLUMN: &str = "reviews_rating_number";

/// Market figures over the persisted listings table.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSummary {
    pub total_items: usize,
    pub unique_brands: usize,
    /// Mean `new_price` over every row; `None` for an empty table.
    pub average_new_price: Option<f64>,
    /// Listings per brand, most frequent first.
    pub brand_counts: Vec<(String, usize)>,
    /// Mean `new_price` per brand, ignoring rows priced at zero or less.
    pub average_price_by_brand: Vec<(String, f64)>,
    /// Mean rating per brand, ignoring unrated rows.
    pub satisfaction_by_brand: Vec<(String, f64)>,
}

impl MarketSummary {
    /// Needs `brand` (text), `new_price` and `reviews_rating_number` (numeric).
    /// Rows without a brand only count towards the totals.
    pub fn from_batch(batch: &RecordBatch) -> Result<Self> {
        let brands = text_column(batch, BRAND_COLUMN)?;
        let prices = numeric_column(batch, NEW_PRICE_COLUMN)?;
        let ratings = numeric_column(batch, RATING_COLUMN)?;

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        let mut price_sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut rating_sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut price_total = 0.0;

        for row in 0..batch.num_rows() {
            let price = if prices.is_null(row) { 0.0 } else { prices.value(row) };
            let rating = if ratings.is_null(row) { 0.0 } else { ratings.value(row) };
            price_total += price;

            if brands.is_null(row) {
                continue;
            }
            let brand = brands.value(row);
            *counts.entry(brand).or_default() += 1;
            if price > 0.0 {
                let e = price_sums.entry(brand).or_default();
                e.0 += price;
                e.1 += 1;
            }
            if rating > 0.0 {
                let e = rating_sums.entry(brand).or_default();
                e.0 += rating;
                e.1 += 1;
            }
        }

        let total_items = batch.num_rows();
        let mut brand_counts: Vec<(String, usize)> =
            counts.into_iter().map(|(b, n)| (b.to_string(), n)).collect();
        brand_counts.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(MarketSummary {
            total_items,
            unique_brands: brand_counts.len(),
            average_new_price: (total_items > 0).then(|| price_total / total_items as f64),
            brand_counts,
            average_price_by_brand: ranked_means(price_sums),
            satisfaction_by_brand: ranked_means(rating_sums),
        })
    }

    /// Plain-text report, one section per figure.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Key Performance Indicators ===");
        let _ = writeln!(out, "Total items scraped:  {}", self.total_items);
        let _ = writeln!(out, "Unique brands found:  {}", self.unique_brands);
        match self.average_new_price {
            Some(avg) => {
                let _ = writeln!(out, "Average price (R$):   {:.2}", avg);
            }
            None => {
                let _ = writeln!(out, "Average price (R$):   n/a");
            }
        }

        let _ = writeln!(out, "\n=== Brand Distribution ===");
        for (brand, n) in &self.brand_counts {
            let _ = writeln!(out, "- {:<30} {:>6}", brand, n);
        }

        let _ = writeln!(out, "\n=== Average Price by Brand (R$) ===");
        for (brand, avg) in &self.average_price_by_brand {
            let _ = writeln!(out, "- {:<30} {:>10.2}", brand, avg);
        }

        let _ = writeln!(out, "\n=== Customer Satisfaction by Brand ===");
        for (brand, avg) in &self.satisfaction_by_brand {
            let _ = writeln!(out, "- {:<30} {:>6.2}", brand, avg);
        }
        out
    }
}

/// (sum, count) per brand → mean per brand, highest first; ties keep name order.
fn ranked_means(sums: BTreeMap<&str, (f64, usize)>) -> Vec<(String, f64)> {
    let mut means: Vec<(String, f64)> = sums
        .into_iter()
        .map(|(brand, (sum, n))| (brand.to_string(), sum / n as f64))
        .collect();
    means.sort_by(|a, b| b.1.total_cmp(&a.1));
    means
}

fn text_column(batch: &RecordBatch, name: &str) -> Result<StringArray> {
    let schema = batch.schema();
    let (idx, field) = schema
        .column_with_name(name)
        .ok_or_else(|| PipelineError::missing_column(name, "a string column"))?;
    match field.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let arr = cast(batch.column(idx), &DataType::Utf8)?;
            arr.as_any()
                .downcast_ref::<StringArray>()
                .cloned()
                .ok_or_else(|| PipelineError::type_mismatch(name, "a string column", arr.data_type()))
        }
        other => Err(PipelineError::type_mismatch(name, "a string column", other)),
    }
}

fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let schema = batch.schema();
    let (idx, field) = schema
        .column_with_name(name)
        .ok_or_else(|| PipelineError::missing_column(name, "a numeric column"))?;
    if !field.data_type().is_numeric() {
        return Err(PipelineError::type_mismatch(name, "a numeric column", field.data_type()));
    }
    let arr = cast(batch.column(idx), &DataType::Float64)?;
    arr.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| PipelineError::type_mismatch(name, "a numeric column", arr.data_type()))
}
