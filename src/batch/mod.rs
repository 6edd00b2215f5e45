// src/batch/mod.rs
pub mod job;
pub mod orchestrator;
pub mod pagination;

pub use job::{BatchJob, BatchStatus};
pub use orchestrator::{
    BatchOptions, BatchOrchestrator, LocalPipeline, PageOutcome, PageScraper, RemotePipeline, StopHandle,
};
