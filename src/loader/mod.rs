// src/loader/mod.rs
pub mod client;
pub mod document;
pub mod instrument;

pub use client::{ContentLoader, LoadOptions, PageSource};
pub use document::{DocumentState, EmbeddedDocument};
