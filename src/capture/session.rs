// src/capture/session.rs
use crate::capture::synthesis;
use crate::loader::instrument;
use crate::loader::EmbeddedDocument;
use crate::model::selector::parse_css;
use crate::model::Selector;
use crate::utils::error::{CaptureError, SelectorSyntaxError};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector as CssSelector};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

static ALL_ELEMENTS: Lazy<CssSelector> =
    Lazy::new(|| CssSelector::parse("*").expect("Failed to compile ALL_ELEMENTS"));

/// Position of an element in document order. Only meaningful for one document generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Over,
    Out,
    Click,
}

/// A raw pointer event from the embedding surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub target: ElementHandle,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Hover,
    Selected,
}

/// What capture tells the rest of the system. Consumers read these off the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    Hovered { generation: u64, target: ElementHandle },
    HoverCleared { generation: u64 },
    Selected { generation: u64, target: ElementHandle, selector: Selector },
    Detached { generation: u64 },
}

/// Result of dispatching one pointer event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOutcome {
    /// The host must cancel the event's default action (navigation, submit).
    pub prevent_default: bool,
    pub selector: Option<Selector>,
}

/// Interactive selection over one document generation.
#[derive(Debug)]
pub struct CaptureSession {
    markup: String,
    generation: u64,
    selection_mode: bool,
    hovered: Option<ElementHandle>,
    highlights: BTreeMap<ElementHandle, Highlight>,
    registered: Vec<Selector>,
    events: mpsc::UnboundedSender<SelectionEvent>,
}

impl CaptureSession {
    /// Binds a session to the document's current contents.
    pub fn attach(document: &EmbeddedDocument, events: mpsc::UnboundedSender<SelectionEvent>) -> Self {
        tracing::debug!("Capture attached to generation {}", document.generation());
        Self {
            markup: document.markup().to_string(),
            generation: document.generation(),
            selection_mode: false,
            hovered: None,
            highlights: BTreeMap::new(),
            registered: Vec::new(),
            events,
        }
    }

    /// Releases the session. Highlights and registrations go with it.
    pub fn teardown(self) {
        tracing::debug!("Capture detached from generation {}", self.generation);
        self.emit(SelectionEvent::Detached {
            generation: self.generation,
        });
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selection_mode(&self) -> bool {
        self.selection_mode
    }

    /// Turning selection mode off drops the hover highlight but keeps selections.
    pub fn set_selection_mode(&mut self, enabled: bool) {
        self.selection_mode = enabled;
        if !enabled {
            self.clear_hover();
        }
    }

    pub fn highlights(&self) -> &BTreeMap<ElementHandle, Highlight> {
        &self.highlights
    }

    pub fn registered(&self) -> &[Selector] {
        &self.registered
    }

    /// Handles of every element matching `css`, in document order.
    pub fn locate(&self, css: &str) -> Result<Vec<ElementHandle>, SelectorSyntaxError> {
        let query = parse_css(css)?;
        let document = Html::parse_document(&self.markup);
        Ok(document
            .select(&ALL_ELEMENTS)
            .enumerate()
            .filter(|(_, el)| query.matches(el))
            .map(|(i, _)| ElementHandle(i))
            .collect())
    }

    pub fn handle(&mut self, event: PointerEvent) -> Result<EventOutcome, CaptureError> {
        if event.generation != self.generation {
            return Err(CaptureError::StaleDocument {
                event: event.generation,
                active: self.generation,
            });
        }
        if !self.selection_mode {
            return Ok(EventOutcome::default());
        }

        let document = Html::parse_document(&self.markup);
        let element = document
            .select(&ALL_ELEMENTS)
            .nth(event.target.0)
            .ok_or(CaptureError::UnknownElement(event.target.0))?;

        match event.kind {
            PointerKind::Over => {
                if !synthesis::is_root_level(&element) {
                    self.clear_hover();
                    self.hovered = Some(event.target);
                    self.highlights.entry(event.target).or_insert(Highlight::Hover);
                    self.emit(SelectionEvent::Hovered {
                        generation: self.generation,
                        target: event.target,
                    });
                }
                Ok(EventOutcome::default())
            }
            PointerKind::Out => {
                self.clear_hover();
                Ok(EventOutcome::default())
            }
            PointerKind::Click => {
                let selector = self.register(&element, event.target)?;
                Ok(EventOutcome {
                    prevent_default: true,
                    selector: Some(selector),
                })
            }
        }
    }

    fn register(&mut self, element: &ElementRef, target: ElementHandle) -> Result<Selector, CaptureError> {
        let selector = synthesis::selector_for(element).map_err(|e| {
            tracing::warn!("Rejected selection of <{}>: {}", element.value().name(), e);
            e
        })?;

        if let Some(existing) = self.registered.iter().find(|s| s.css_selector == selector.css_selector) {
            tracing::debug!("Selector '{}' already registered", existing.css_selector);
            self.highlights.insert(target, Highlight::Selected);
            return Ok(existing.clone());
        }

        tracing::info!(
            "Captured selector '{}' as field '{}' ({})",
            selector.css_selector,
            selector.field_name,
            selector.extraction_type
        );
        self.highlights.insert(target, Highlight::Selected);
        if self.hovered == Some(target) {
            self.hovered = None;
        }
        self.registered.push(selector.clone());
        self.emit(SelectionEvent::Selected {
            generation: self.generation,
            target,
            selector: selector.clone(),
        });
        Ok(selector)
    }

    fn clear_hover(&mut self) {
        if let Some(handle) = self.hovered.take() {
            if self.highlights.get(&handle) == Some(&Highlight::Hover) {
                self.highlights.remove(&handle);
            }
            self.emit(SelectionEvent::HoverCleared {
                generation: self.generation,
            });
        }
    }

    fn emit(&self, event: SelectionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("No listener for selection events");
        }
    }

    /// Renders the document with the current highlight map applied as an overlay
    /// stylesheet. The underlying markup is never modified.
    pub fn render(&self) -> String {
        if self.highlights.is_empty() {
            return self.markup.clone();
        }
        let document = Html::parse_document(&self.markup);
        let elements: Vec<ElementRef> = document.select(&ALL_ELEMENTS).collect();

        let mut css = String::new();
        for (handle, highlight) in &self.highlights {
            let Some(element) = elements.get(handle.0) else {
                continue;
            };
            let style = match highlight {
                Highlight::Hover => "outline: 2px dashed #3b82f6 !important; cursor: crosshair;",
                Highlight::Selected => {
                    "outline: 2px solid #10b981 !important; background-color: rgba(16, 185, 129, 0.12) !important;"
                }
            };
            css.push_str(&format!("{} {{ {} }}\n", structural_path(element), style));
        }
        instrument::inject_into_head(
            &self.markup,
            &format!("<style {}=\"highlight\">\n{}</style>", instrument::INSTRUMENTATION_ATTR, css),
        )
    }
}

// `html > body > div:nth-child(2) > p:nth-child(1)`: unique within this document.
fn structural_path(element: &ElementRef) -> String {
    let mut parts = Vec::new();
    let mut current = Some(*element);
    while let Some(el) = current {
        let name = el.value().name();
        if name == "html" {
            parts.push("html".to_string());
            break;
        }
        let position = el.prev_siblings().filter_map(ElementRef::wrap).count() + 1;
        parts.push(format!("{}:nth-child({})", name, position));
        current = el.parent().and_then(ElementRef::wrap);
    }
    parts.reverse();
    parts.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head></head><body>
        <div class="card"><h1>Alpha</h1><a class="more" href="/a">Read</a></div>
        <div class="card"><h1>Beta</h1></div>
    </body></html>"#;

    fn session() -> (CaptureSession, mpsc::UnboundedReceiver<SelectionEvent>) {
        let mut doc = EmbeddedDocument::new();
        doc.replace_loaded("https://site.test", PAGE.to_string());
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = CaptureSession::attach(&doc, tx);
        session.set_selection_mode(true);
        (session, rx)
    }

    fn event(session: &CaptureSession, kind: PointerKind, target: ElementHandle) -> PointerEvent {
        PointerEvent {
            kind,
            target,
            generation: session.generation(),
        }
    }

    #[test]
    fn test_hover_skips_root_elements() {
        let (mut s, _rx) = session();
        let body = s.locate("body").unwrap()[0];
        s.handle(event(&s, PointerKind::Over, body)).unwrap();
        assert!(s.highlights().is_empty());

        let h1 = s.locate("h1").unwrap()[0];
        s.handle(event(&s, PointerKind::Over, h1)).unwrap();
        assert_eq!(s.highlights().get(&h1), Some(&Highlight::Hover));

        s.handle(event(&s, PointerKind::Out, h1)).unwrap();
        assert!(s.highlights().is_empty());
    }

    #[test]
    fn test_click_registers_and_emits() {
        let (mut s, mut rx) = session();
        let link = s.locate("a.more").unwrap()[0];
        s.handle(event(&s, PointerKind::Over, link)).unwrap();
        let outcome = s.handle(event(&s, PointerKind::Click, link)).unwrap();

        assert!(outcome.prevent_default);
        let selector = outcome.selector.unwrap();
        assert_eq!(selector.css_selector, "a.more");
        assert_eq!(selector.field_name, "Read");
        assert_eq!(s.highlights().get(&link), Some(&Highlight::Selected));
        assert_eq!(s.registered().len(), 1);

        // pointer-out does not clear a selection
        s.handle(event(&s, PointerKind::Out, link)).unwrap();
        assert_eq!(s.highlights().get(&link), Some(&Highlight::Selected));

        assert!(matches!(rx.try_recv().unwrap(), SelectionEvent::Hovered { .. }));
        match rx.try_recv().unwrap() {
            SelectionEvent::Selected { selector: sel, target, .. } => {
                assert_eq!(target, link);
                assert_eq!(sel.css_selector, "a.more");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_click_does_not_double_register() {
        let (mut s, _rx) = session();
        let headings = s.locate("h1").unwrap();
        // both h1s synthesize to h1:nth-child(1)
        for h in headings {
            s.handle(event(&s, PointerKind::Click, h)).unwrap();
        }
        assert_eq!(s.registered().len(), 1);
        assert_eq!(s.highlights().len(), 2);
    }

    #[test]
    fn test_selection_mode_off_ignores_events() {
        let (mut s, _rx) = session();
        s.set_selection_mode(false);
        let h1 = s.locate("h1").unwrap()[0];
        let outcome = s.handle(event(&s, PointerKind::Click, h1)).unwrap();
        assert!(!outcome.prevent_default);
        assert!(outcome.selector.is_none());
        assert!(s.registered().is_empty());
    }

    #[test]
    fn test_stale_and_unknown_targets() {
        let (mut s, _rx) = session();
        let stale = PointerEvent {
            kind: PointerKind::Click,
            target: ElementHandle(0),
            generation: s.generation() + 1,
        };
        assert!(matches!(s.handle(stale), Err(CaptureError::StaleDocument { .. })));

        let missing = event(&s, PointerKind::Over, ElementHandle(10_000));
        assert_eq!(s.handle(missing), Err(CaptureError::UnknownElement(10_000)));
    }

    #[test]
    fn test_render_overlays_without_touching_markup() {
        let (mut s, _rx) = session();
        let beta = s.locate("h1").unwrap()[1];
        s.handle(event(&s, PointerKind::Click, beta)).unwrap();

        let rendered = s.render();
        assert!(rendered.contains("data-scraper-instrumentation=\"highlight\""));
        assert!(rendered.contains("html > body:nth-child(2) > div:nth-child(2) > h1:nth-child(1)"));

        // the overlay path selects exactly the clicked element
        let doc = Html::parse_document(&rendered);
        let path = CssSelector::parse("html > body:nth-child(2) > div:nth-child(2) > h1:nth-child(1)").unwrap();
        let hits: Vec<_> = doc.select(&path).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text().collect::<String>(), "Beta");
    }

    #[test]
    fn test_teardown_emits_detached() {
        let (s, mut rx) = session();
        let generation = s.generation();
        s.teardown();
        assert_eq!(rx.try_recv().unwrap(), SelectionEvent::Detached { generation });
    }
}
