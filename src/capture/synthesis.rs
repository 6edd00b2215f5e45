// src/capture/synthesis.rs
//
// Deterministic selector synthesis for a single element:
//   1. `#id` when the element has a non-empty id
//   2. `tag.class1.class2` with every retained class
//   3. `tag:nth-child(k)`, k = 1 + preceding siblings with the same tag

use crate::extractors::engine::element_text;
use crate::model::selector::sanitize_field_name;
use crate::model::{ExtractionType, Selector, SelectorOrigin};
use crate::utils::error::SelectorSyntaxError;
use scraper::ElementRef;

/// Classes with this prefix belong to our own instrumentation and never end up in selectors.
pub const MARKER_CLASS_PREFIX: &str = "scraper-";

const MAX_NAME_CHARS: usize = 20;

/// Element classification used for type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Image,
    Anchor,
    Generic,
}

impl ElementKind {
    pub fn classify(element: &ElementRef) -> Self {
        match element.value().name() {
            "img" => ElementKind::Image,
            "a" => ElementKind::Anchor,
            _ => ElementKind::Generic,
        }
    }

    pub fn extraction_type(self) -> ExtractionType {
        match self {
            ElementKind::Image => ExtractionType::Image,
            ElementKind::Anchor => ExtractionType::Link,
            ElementKind::Generic => ExtractionType::Text,
        }
    }
}

/// `html`, `head` and `body` are never highlighted or captured.
pub fn is_root_level(element: &ElementRef) -> bool {
    matches!(element.value().name(), "html" | "head" | "body")
}

pub fn retained_classes<'a>(element: &ElementRef<'a>) -> Vec<&'a str> {
    element
        .value()
        .classes()
        .filter(|c| !c.starts_with(MARKER_CLASS_PREFIX))
        .collect()
}

pub fn synthesize(element: &ElementRef) -> String {
    let value = element.value();
    if let Some(id) = value.id().filter(|id| !id.trim().is_empty()) {
        return format!("#{}", escape_ident(id));
    }

    let tag = value.name();
    let classes = retained_classes(element);
    if !classes.is_empty() {
        let mut css = tag.to_string();
        for class in classes {
            css.push('.');
            css.push_str(&escape_ident(class));
        }
        return css;
    }

    let preceding = element
        .prev_siblings()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| sibling.value().name() == tag)
        .count();
    format!("{}:nth-child({})", tag, preceding + 1)
}

/// Text (≤ 20 chars) → `alt` → `title` → `id` → the selector itself.
pub fn infer_field_name(element: &ElementRef, css_selector: &str) -> String {
    let text = sanitize_field_name(&element_text(element));
    if !text.is_empty() {
        return text.chars().take(MAX_NAME_CHARS).collect::<String>().trim_end().to_string();
    }
    let value = element.value();
    ["alt", "title", "id"]
        .iter()
        .filter_map(|attr| value.attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| sanitize_field_name(css_selector))
}

/// Builds a validated `Selector` for a clicked element.
pub fn selector_for(element: &ElementRef) -> Result<Selector, SelectorSyntaxError> {
    let css = synthesize(element);
    let extraction_type = ElementKind::classify(element).extraction_type();
    let name = infer_field_name(element, &css);
    Ok(Selector::new(&css, extraction_type)?
        .named(&name)
        .with_origin(SelectorOrigin::Manual))
}

// Escapes an identifier so it survives CSS parsing. Plain identifiers are returned as-is.
fn escape_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    for (i, c) in ident.chars().enumerate() {
        if c.is_ascii_digit() && i == 0 {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}
