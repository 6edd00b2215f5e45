// src/loader/document.rs
use crate::loader::instrument;
use scraper::Html;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    Empty,
    Loaded { url: String },
    Failed { url: String, reason: String },
}

/// The single active embedded document. Every replacement bumps the generation,
/// which invalidates anything bound to the previous contents.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    markup: String,
    generation: u64,
    state: DocumentState,
}

impl Default for EmbeddedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedDocument {
    pub fn new() -> Self {
        Self {
            markup: String::new(),
            generation: 0,
            state: DocumentState::Empty,
        }
    }

    pub(crate) fn replace_loaded(&mut self, url: &str, markup: String) -> u64 {
        self.markup = markup;
        self.state = DocumentState::Loaded { url: url.to_string() };
        self.bump()
    }

    pub(crate) fn replace_failed(&mut self, url: &str, reason: &str) -> u64 {
        self.markup = instrument::failure_page(url, reason);
        self.state = DocumentState::Failed {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        self.bump()
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        tracing::debug!("Embedded document replaced (generation {})", self.generation);
        self.generation
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, DocumentState::Loaded { .. })
    }

    /// Parses the current markup. Readers get their own tree; nothing shares it.
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.markup)
    }
}
