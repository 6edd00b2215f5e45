// src/capture/mod.rs
pub mod session;
pub mod synthesis;

pub use session::{
    CaptureSession, ElementHandle, EventOutcome, Highlight, PointerEvent, PointerKind, SelectionEvent,
};
pub use synthesis::{synthesize, ElementKind};
