// src/extractors/engine.rs

use crate::model::selector::parse_css;
use crate::model::{ExtractionType, FieldValue, ScrapedRecord, Selector};
use crate::utils::error::ExtractionFieldError;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector as CssSelector};

// --- CSS Selectors (Lazy Static) ---
// Generic repeated-item containers. More than one match means the page is a list.
// `[class*='item']` is a substring match, so a wrapper like `<div class="items">`
// counts as a container too and yields an extra record built from its first
// matching descendants.
static CONTAINER_SELECTOR: Lazy<CssSelector> = Lazy::new(|| {
    CssSelector::parse("article, li, .card, .item, .product, .result, [class*='item']")
        .expect("Failed to compile CONTAINER_SELECTOR")
});

/// Where `list` fields look for matches when the page is in container mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListScope {
    /// Only matches inside the current container.
    #[default]
    Container,
    /// Every match in the document, repeated on each record.
    Document,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub list_scope: ListScope,
}

/// How the page was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    Single,
    List { containers: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionProgress {
    pub processed: usize,
    pub total: usize,
}

impl ExtractionProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f32 / self.total as f32
        }
    }
}

// A selector whose CSS compiled. Broken ones are dropped (and logged) once per run.
struct CompiledField<'s> {
    selector: &'s Selector,
    css: CssSelector,
}

/// Reads typed fields out of a parsed document. Never mutates it.
#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    options: ExtractOptions,
}

impl ExtractionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExtractOptions) -> Self {
        Self { options }
    }

    /// Decides single vs. list mode for a document.
    pub fn detect_mode(&self, document: &Html) -> PageMode {
        let containers = document.select(&CONTAINER_SELECTOR).count();
        if containers > 1 {
            PageMode::List { containers }
        } else {
            PageMode::Single
        }
    }

    pub fn extract(&self, document: &Html, selectors: &[Selector]) -> Vec<ScrapedRecord> {
        self.extract_with_progress(document, selectors, &mut |_| {})
    }

    /// Extracts records, reporting progress per container (list mode) or per field (single mode).
    pub fn extract_with_progress(
        &self,
        document: &Html,
        selectors: &[Selector],
        progress: &mut dyn FnMut(ExtractionProgress),
    ) -> Vec<ScrapedRecord> {
        let fields = compile_fields(selectors);
        if fields.is_empty() {
            tracing::debug!("No usable selectors, nothing to extract");
            progress(ExtractionProgress { processed: 0, total: 0 });
            return Vec::new();
        }

        let containers: Vec<ElementRef> = document.select(&CONTAINER_SELECTOR).collect();
        if containers.len() > 1 {
            tracing::debug!("List mode: {} containers", containers.len());
            self.extract_list(document, &containers, &fields, progress)
        } else {
            tracing::debug!("Single-record mode ({} container matches)", containers.len());
            let total = fields.len();
            let mut record = ScrapedRecord::new();
            for (i, field) in fields.iter().enumerate() {
                match extract_field(field, document.select(&field.css)) {
                    Ok(value) => record.insert(field.selector.key(), value),
                    Err(e) => tracing::debug!("{}", e),
                }
                progress(ExtractionProgress { processed: i + 1, total });
            }
            if record.is_empty() {
                Vec::new()
            } else {
                vec![record]
            }
        }
    }

    fn extract_list(
        &self,
        document: &Html,
        containers: &[ElementRef],
        fields: &[CompiledField],
        progress: &mut dyn FnMut(ExtractionProgress),
    ) -> Vec<ScrapedRecord> {
        let total = containers.len();
        let mut records = Vec::new();

        for (i, container) in containers.iter().enumerate() {
            let mut record = ScrapedRecord::new();
            let mut document_lists = Vec::new();

            for field in fields {
                let document_scoped = field.selector.extraction_type == ExtractionType::List
                    && self.options.list_scope == ListScope::Document;
                if document_scoped {
                    document_lists.push(field);
                    continue;
                }
                match extract_field(field, container.select(&field.css)) {
                    Ok(value) => record.insert(field.selector.key(), value),
                    Err(e) => tracing::trace!("Container {}: {}", i, e),
                }
            }

            // Containers are judged on their own content only.
            if !record.is_empty() {
                for field in document_lists {
                    if let Ok(value) = extract_field(field, document.select(&field.css)) {
                        record.insert(field.selector.key(), value);
                    }
                }
                records.push(record);
            }
            progress(ExtractionProgress { processed: i + 1, total });
        }

        tracing::debug!("Extracted {} records from {} containers", records.len(), total);
        records
    }
}

fn compile_fields(selectors: &[Selector]) -> Vec<CompiledField<'_>> {
    selectors
        .iter()
        .filter_map(|selector| {
            let compiled = selector.validate().and_then(|_| parse_css(&selector.css_selector));
            match compiled {
                Ok(css) => Some(CompiledField { selector, css }),
                Err(source) => {
                    let err = ExtractionFieldError::Syntax {
                        field: selector.key().to_string(),
                        source,
                    };
                    tracing::warn!("Skipping field: {}", err);
                    None
                }
            }
        })
        .collect()
}

fn extract_field<'a>(
    field: &CompiledField,
    mut matches: impl Iterator<Item = ElementRef<'a>>,
) -> Result<FieldValue, ExtractionFieldError> {
    let selector = field.selector;
    let no_match = || ExtractionFieldError::NoMatch {
        field: selector.key().to_string(),
        selector: selector.css_selector.clone(),
    };

    match selector.extraction_type {
        ExtractionType::List => {
            let items: Vec<String> = matches.map(|el| element_text(&el)).collect();
            if items.is_empty() {
                Err(no_match())
            } else {
                Ok(FieldValue::List(items))
            }
        }
        kind => {
            let element = matches.next().ok_or_else(no_match)?;
            let attribute = match kind {
                ExtractionType::Text | ExtractionType::List => {
                    return Ok(FieldValue::Scalar(element_text(&element)))
                }
                ExtractionType::Html => return Ok(FieldValue::Scalar(element.inner_html())),
                ExtractionType::Image => "src",
                ExtractionType::Link => "href",
                ExtractionType::Attribute => selector.attribute_name.as_deref().unwrap_or_default(),
            };
            element
                .value()
                .attr(attribute)
                .map(|v| FieldValue::Scalar(v.to_string()))
                .ok_or_else(|| ExtractionFieldError::MissingAttribute {
                    field: selector.key().to_string(),
                    selector: selector.css_selector.clone(),
                    attribute: attribute.to_string(),
                })
        }
    }
}

pub(crate) fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
