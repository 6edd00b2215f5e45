// src/session.rs
//
// The interactive surface: one embedded document, the capture session bound to it,
// and the active selector set.

use crate::capture::{CaptureSession, ElementHandle, EventOutcome, PointerEvent, SelectionEvent};
use crate::extractors::ExtractionEngine;
use crate::loader::{ContentLoader, EmbeddedDocument, LoadOptions};
use crate::model::{ScrapedRecord, Selector, SelectorGroup};
use crate::utils::error::{CaptureError, LoadError, SelectorSyntaxError};
use tokio::sync::mpsc;

pub struct Workspace {
    loader: ContentLoader,
    engine: ExtractionEngine,
    document: EmbeddedDocument,
    capture: Option<CaptureSession>,
    selection_mode: bool,
    active: Vec<Selector>,
    events: mpsc::UnboundedSender<SelectionEvent>,
}

impl Workspace {
    /// Returns the workspace and the receiving end of its selection events.
    pub fn new(loader: ContentLoader, engine: ExtractionEngine) -> (Self, mpsc::UnboundedReceiver<SelectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let workspace = Self {
            loader,
            engine,
            document: EmbeddedDocument::new(),
            capture: None,
            selection_mode: false,
            active: Vec::new(),
            events,
        };
        (workspace, rx)
    }

    /// Replaces the embedded document with `url`. Capture bound to the old document is
    /// torn down first and reinstalled on the new one when selection mode is on.
    /// On failure the document shows a failure page and the error is returned; retrying
    /// is up to the caller.
    pub async fn load_url(&mut self, url: &str, options: &LoadOptions) -> Result<&str, LoadError> {
        if let Some(capture) = self.capture.take() {
            capture.teardown();
        }

        match self.loader.load(url, options).await {
            Ok(markup) => {
                self.document.replace_loaded(url, markup);
                self.install_capture();
                Ok(self.document.markup())
            }
            Err(e) => {
                self.document.replace_failed(url, &e.to_string());
                Err(e)
            }
        }
    }

    fn install_capture(&mut self) {
        if !self.document.is_loaded() {
            return;
        }
        let mut capture = CaptureSession::attach(&self.document, self.events.clone());
        capture.set_selection_mode(self.selection_mode);
        self.capture = Some(capture);
    }

    pub fn set_selection_mode(&mut self, enabled: bool) {
        self.selection_mode = enabled;
        if let Some(capture) = self.capture.as_mut() {
            capture.set_selection_mode(enabled);
        } else if enabled {
            self.install_capture();
        }
        tracing::debug!("Selection mode {}", if enabled { "on" } else { "off" });
    }

    pub fn selection_mode(&self) -> bool {
        self.selection_mode
    }

    fn capture_mut(&mut self) -> Result<&mut CaptureSession, CaptureError> {
        self.capture.as_mut().ok_or(CaptureError::NoDocument)
    }

    /// Dispatches a raw pointer event. A click that yields a selector also adds it to
    /// the active set.
    pub fn dispatch(&mut self, event: PointerEvent) -> Result<EventOutcome, CaptureError> {
        let outcome = self.capture_mut()?.handle(event)?;
        if let Some(selector) = &outcome.selector {
            if !self.active.iter().any(|s| s.css_selector == selector.css_selector) {
                self.active.push(selector.clone());
            }
        }
        Ok(outcome)
    }

    /// The selector captured by `event`, if it was a click in selection mode.
    pub fn capture_selection(&mut self, event: PointerEvent) -> Result<Option<Selector>, CaptureError> {
        Ok(self.dispatch(event)?.selector)
    }

    pub fn locate(&self, css: &str) -> Result<Vec<ElementHandle>, CaptureError> {
        let capture = self.capture.as_ref().ok_or(CaptureError::NoDocument)?;
        Ok(capture.locate(css)?)
    }

    /// Markup with the highlight overlay, or the bare document when nothing is highlighted.
    pub fn render(&self) -> String {
        match &self.capture {
            Some(capture) => capture.render(),
            None => self.document.markup().to_string(),
        }
    }

    pub fn document(&self) -> &EmbeddedDocument {
        &self.document
    }

    pub fn active_selectors(&self) -> &[Selector] {
        &self.active
    }

    pub fn add_selector(&mut self, selector: Selector) -> Result<(), SelectorSyntaxError> {
        selector.validate()?;
        self.active.push(selector);
        Ok(())
    }

    pub fn remove_selector(&mut self, id: &str) -> bool {
        let before = self.active.len();
        self.active.retain(|s| s.id != id);
        self.active.len() != before
    }

    /// Replaces the active set with a group's selectors. Invalid ones are skipped.
    pub fn activate_group(&mut self, group: &SelectorGroup) -> usize {
        self.active = group
            .selectors
            .iter()
            .filter(|s| match s.validate() {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Group '{}': skipping selector: {}", group.name, e);
                    false
                }
            })
            .cloned()
            .collect();
        tracing::info!("Activated group '{}' ({} selectors)", group.name, self.active.len());
        self.active.len()
    }

    /// Snapshot of the active set as a new group.
    pub fn to_group(&self, name: &str) -> SelectorGroup {
        SelectorGroup::new(name, self.active.clone())
    }

    /// Runs the active selectors against the loaded document.
    pub fn extract(&self) -> Vec<ScrapedRecord> {
        if !self.document.is_loaded() {
            return Vec::new();
        }
        self.engine.extract(&self.document.parse(), &self.active)
    }
}
