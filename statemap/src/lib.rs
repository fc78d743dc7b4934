pub mod collect;
pub mod commons;
pub mod config;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::MapError;
pub use pipeline::{RunSummary, StateMap};
