//! crates/syllabus_core/src/pipeline/mod.rs
//!
//! The ingestion stages, in the order a run visits them.

pub mod validate;
pub mod text;
pub mod extract;
pub mod augment;
pub mod dates;
pub mod scoring;
pub mod tasks;
pub mod state;
pub mod orchestrator;

pub use orchestrator::{NoopObserver, PipelineObserver, PipelinePorts, SyllabusPipeline};
pub use state::{CompletionSummary, PipelineRun, PipelineSnapshot, PipelineStage};
