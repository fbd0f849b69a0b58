//! Converts nested per-model land-use projections into a DuckDB star schema
//! of ensemble-aggregated transitions.

pub mod aggregate;
pub mod config;
pub mod dims;
pub mod error;
pub mod geography;
pub mod landuse;
pub mod loader;
pub mod period;
pub mod pipeline;
pub mod progress;
pub mod raw;
pub mod scenario;
pub mod schema;
pub mod validate;
pub mod views;

pub use aggregate::{aggregate, AggregatedDataset, AggregationStats, EnsembleAggregator, EnsembleStats};
pub use config::ConverterConfig;
pub use error::{ConvertError, Result, SkipReason};
pub use loader::{FactRow, FactSink, LoadStrategy, MAX_BATCH_SIZE, MAX_RECORDS};
pub use pipeline::{Converter, RunState, RunSummary};
pub use progress::{LogProgress, NoopProgress, ProgressReporter, Stage};
pub use raw::{RawDataset, SkipCounts};
pub use scenario::{resolve_scenario_key, ScenarioCatalogue, OVERALL};
pub use validate::{validate_paths, ValidatedPaths, MAX_INPUT_BYTES};
