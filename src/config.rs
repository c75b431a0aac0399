// src/config.rs

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path, path::PathBuf};

pub const DEFAULT_SOURCE_URL: &str = "https://lista.mercadolivre.com.br/tenis-corrida-masculino";
pub const DEFAULT_TABLE_NAME: &str = "Mercado_Livre_Items";
pub const DEFAULT_INPUT_PATH: &str = "data/data.jsonl";
pub const DEFAULT_DB_PATH: &str = "data/quotes.db";
pub const DEFAULT_DECORATED_COLUMN: &str = "reviews_amount";

/// Target type of a coerced column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    /// → Float64
    Float,
    /// → Int64
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub kind: NumericKind,
}

impl NumericColumn {
    pub fn new(name: &str, kind: NumericKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// `name = whole + cents / 100`; both inputs are dropped afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPrice {
    pub name: String,
    pub whole: String,
    pub cents: String,
}

impl DerivedPrice {
    pub fn new(name: &str, whole: &str, cents: &str) -> Self {
        Self {
            name: name.to_string(),
            whole: whole.to_string(),
            cents: cents.to_string(),
        }
    }
}

/// Where the final table goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    Sqlite { path: PathBuf },
    Parquet { dir: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

/// Immutable run configuration handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source_url: String,
    pub table_name: String,
    pub input_path: PathBuf,
    pub decorated_column: String,
    pub numeric_columns: Vec<NumericColumn>,
    pub derived_prices: Vec<DerivedPrice>,
    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use NumericKind::{Float, Integer};
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            input_path: PathBuf::from(DEFAULT_INPUT_PATH),
            decorated_column: DEFAULT_DECORATED_COLUMN.to_string(),
            numeric_columns: vec![
                NumericColumn::new("old_price_in_reais", Float),
                NumericColumn::new("old_price_in_cents", Float),
                NumericColumn::new("new_price_in_reais", Float),
                NumericColumn::new("new_price_in_cents", Float),
                NumericColumn::new("reviews_rating_number", Float),
                NumericColumn::new("reviews_amount", Integer),
            ],
            derived_prices: vec![
                DerivedPrice::new("old_price", "old_price_in_reais", "old_price_in_cents"),
                DerivedPrice::new("new_price", "new_price_in_reais", "new_price_in_cents"),
            ],
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file; missing keys fall back to the defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = serde_yaml::from_str(text).context("parsing YAML config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject wiring that would make a stage fail on every run.
    pub fn validate(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            bail!("table_name must not be empty");
        }
        if !is_plain_table_name(&self.table_name) {
            bail!("table_name `{}` must not contain path separators", self.table_name);
        }
        if self.decorated_column.trim().is_empty() {
            bail!("decorated_column must not be empty");
        }

        let mut seen = HashSet::new();
        for col in &self.numeric_columns {
            if !seen.insert(col.name.as_str()) {
                bail!("numeric column `{}` listed twice", col.name);
            }
        }

        let mut derived = HashSet::new();
        for price in &self.derived_prices {
            if !derived.insert(price.name.as_str()) {
                bail!("derived column `{}` listed twice", price.name);
            }
            for input in [&price.whole, &price.cents] {
                if !seen.contains(input.as_str()) {
                    bail!(
                        "derived column `{}` reads `{}`, which is not a numeric column",
                        price.name,
                        input
                    );
                }
            }
        }
        Ok(())
    }
}

/// A table name that is safe to use as a file stem.
pub fn is_plain_table_name(name: &str) -> bool {
    !name.contains(['/', '\\', '\0']) && name != "." && name != ".."
}
