pub mod config;
pub mod error;
pub mod logging;
pub mod process;
pub mod sink;
pub mod summary;

pub use config::{DerivedPrice, NumericColumn, NumericKind, PipelineConfig, StoreConfig};
pub use error::{PipelineError, Result};
pub use process::{process_table, run_pipeline, RunMetadata, RunReport};
pub use sink::{open_sink, Sink};
pub use summary::MarketSummary;
