pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod intelligence;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod sinks;
pub mod sources;

pub use engine::{LabelingEngine, RunOutput, RunSummary};
pub use pipeline::run_once;
