// src/extractors/mod.rs
pub mod engine;
pub mod remote;

// Re-export key extraction types for convenience
pub use engine::{ExtractOptions, ExtractionEngine, ExtractionProgress, ListScope, PageMode};
pub use remote::RemoteExtractor;
