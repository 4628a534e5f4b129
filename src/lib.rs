//! A Rust library for aggregating per-event epidemic simulation records
//! into region- and age-stratified daily time series.
//!
//! The input is a record container: a directory holding one Parquet table
//! per event kind plus shared population, geography and location tables.
//! The pipeline joins each event table against the shared dimensions,
//! stratifies by age band, reconstructs occupancy series from start/end
//! event pairs, and concatenates everything into one integer table indexed
//! by (region, date).

pub mod age;
pub mod aggregate;
pub mod config;
pub mod error;
pub mod geography;
pub mod interval;
pub mod join;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod store;
pub mod summary;

// Re-export the most common types for easier use
pub use age::AgeBands;
pub use aggregate::RegionalTable;
pub use config::{DEFAULT_AGE_BINS, PipelineConfig};
pub use error::{PipelineError, Result};
pub use geography::GeographyIndex;
pub use interval::Expansion;
pub use metadata::OutputMetadata;
pub use model::{EventKind, JoinedEvent, Person, SeriesKind};
pub use pipeline::Pipeline;
pub use store::TableStore;
