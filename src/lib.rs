// src/lib.rs
//! Selector-driven extraction engine: capture element selections on a loaded page,
//! synthesize selectors, extract typed records from one page or a queue of URLs,
//! and export the results.

pub mod batch;
pub mod capture;
pub mod config;
pub mod export;
pub mod extractors;
pub mod loader;
pub mod model;
pub mod session;
pub mod storage;
pub mod utils;

pub use batch::{BatchJob, BatchOptions, BatchOrchestrator, BatchStatus, LocalPipeline, RemotePipeline};
pub use capture::{PointerEvent, PointerKind, SelectionEvent};
pub use config::ScraperConfig;
pub use export::{export_as, ExportFormat, ExportOutput};
pub use extractors::{ExtractionEngine, ListScope};
pub use loader::{ContentLoader, LoadOptions};
pub use model::{ExtractionType, FieldValue, ScrapeResult, ScrapedRecord, Selector, SelectorGroup};
pub use session::Workspace;
pub use utils::AppError;
