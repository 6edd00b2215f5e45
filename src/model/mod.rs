// src/model/mod.rs
pub mod record;
pub mod selector;

pub use record::{FieldValue, ScrapeResult, ScrapedRecord};
pub use selector::{ExtractionType, Selector, SelectorGroup, SelectorOrigin};
