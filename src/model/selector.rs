// src/model/selector.rs
use crate::utils::error::SelectorSyntaxError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile WHITESPACE_RE"));

// `name=` prefix of the compact selector form. Only a bare identifier counts, so
// attribute selectors like `a[href="x"]` are never split.
static FIELD_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_\-]*)=(.+)$").expect("Failed to compile FIELD_PREFIX_RE")
});

/// How a field's value is pulled out of the matched element(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionType {
    Text,
    Html,
    Attribute,
    Image,
    Link,
    List,
}

impl ExtractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionType::Text => "text",
            ExtractionType::Html => "html",
            ExtractionType::Attribute => "attribute",
            ExtractionType::Image => "image",
            ExtractionType::Link => "link",
            ExtractionType::List => "list",
        }
    }
}

impl fmt::Display for ExtractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionType {
    type Err = SelectorSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ExtractionType::Text),
            "html" => Ok(ExtractionType::Html),
            "attribute" | "attr" => Ok(ExtractionType::Attribute),
            "image" | "img" => Ok(ExtractionType::Image),
            "link" | "href" => Ok(ExtractionType::Link),
            "list" => Ok(ExtractionType::List),
            other => Err(SelectorSyntaxError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorOrigin {
    #[default]
    Manual,
    Suggested,
}

/// A CSS query paired with what to extract and under which field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredSelector")]
pub struct Selector {
    pub id: String,
    pub css_selector: String,
    pub extraction_type: ExtractionType,
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_name: Option<String>,
    #[serde(default)]
    pub origin: SelectorOrigin,
}

/// Wire and storage shape. `id` and `fieldName` may be missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSelector {
    #[serde(default)]
    id: Option<String>,
    css_selector: String,
    extraction_type: ExtractionType,
    #[serde(default)]
    field_name: Option<String>,
    #[serde(default)]
    attribute_name: Option<String>,
    #[serde(default)]
    origin: SelectorOrigin,
}

impl From<StoredSelector> for Selector {
    fn from(stored: StoredSelector) -> Self {
        let css_selector = stored.css_selector.trim().to_string();
        let field_name = stored
            .field_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| sanitize_field_name(&css_selector));
        Self {
            id: stored
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            css_selector,
            extraction_type: stored.extraction_type,
            field_name,
            attribute_name: stored.attribute_name,
            origin: stored.origin,
        }
    }
}

impl Selector {
    /// Creates a validated selector. The field name defaults to the sanitized CSS text.
    pub fn new(css_selector: &str, extraction_type: ExtractionType) -> Result<Self, SelectorSyntaxError> {
        let css = css_selector.trim();
        if css.is_empty() {
            return Err(SelectorSyntaxError::Empty);
        }
        let selector = Self {
            id: uuid::Uuid::new_v4().to_string(),
            css_selector: css.to_string(),
            extraction_type,
            field_name: sanitize_field_name(css),
            attribute_name: None,
            origin: SelectorOrigin::Manual,
        };
        selector.validate()?;
        Ok(selector)
    }

    /// Creates an `attribute` selector for the named attribute.
    pub fn attribute(css_selector: &str, attribute_name: &str) -> Result<Self, SelectorSyntaxError> {
        let css = css_selector.trim();
        if css.is_empty() {
            return Err(SelectorSyntaxError::Empty);
        }
        let selector = Self {
            id: uuid::Uuid::new_v4().to_string(),
            css_selector: css.to_string(),
            extraction_type: ExtractionType::Attribute,
            field_name: sanitize_field_name(css),
            attribute_name: Some(attribute_name.trim().to_string()),
            origin: SelectorOrigin::Manual,
        };
        selector.validate()?;
        Ok(selector)
    }

    /// Overrides the field name. Blank names keep the default.
    pub fn named(mut self, field_name: &str) -> Self {
        let name = sanitize_field_name(field_name);
        if !name.is_empty() {
            self.field_name = name;
        }
        self
    }

    pub fn with_origin(mut self, origin: SelectorOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Checks the attribute invariant and that the CSS parses.
    /// Also used on selectors read back from storage or the wire.
    pub fn validate(&self) -> Result<(), SelectorSyntaxError> {
        if self.extraction_type == ExtractionType::Attribute
            && self.attribute_name.as_deref().map_or(true, |a| a.trim().is_empty())
        {
            return Err(SelectorSyntaxError::MissingAttributeName {
                selector: self.css_selector.clone(),
            });
        }
        parse_css(&self.css_selector).map(|_| ())
    }

    /// The record key for this selector.
    pub fn key(&self) -> &str {
        if self.field_name.is_empty() {
            &self.css_selector
        } else {
            &self.field_name
        }
    }
}

/// Parses the compact CLI form `[name=]css[@type[:attribute]]`.
impl FromStr for Selector {
    type Err = SelectorSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, rest) = match FIELD_PREFIX_RE.captures(s) {
            Some(caps) => (Some(caps[1].to_string()), caps[2].to_string()),
            None => (None, s.to_string()),
        };

        // A trailing `@type` only counts when it names a known extraction type.
        let (css, extraction_type, attribute) = match rest.rsplit_once('@') {
            Some((css, suffix)) => {
                let (type_part, attr_part) = match suffix.split_once(':') {
                    Some((t, a)) => (t, Some(a)),
                    None => (suffix, None),
                };
                match type_part.parse::<ExtractionType>() {
                    Ok(t) => (css.to_string(), t, attr_part.map(str::to_string)),
                    Err(_) => (rest.clone(), ExtractionType::Text, None),
                }
            }
            None => (rest.clone(), ExtractionType::Text, None),
        };

        let selector = match extraction_type {
            ExtractionType::Attribute => Selector::attribute(&css, attribute.as_deref().unwrap_or(""))?,
            other => Selector::new(&css, other)?,
        };
        Ok(match name {
            Some(name) => selector.named(&name),
            None => selector,
        })
    }
}

/// Parses CSS through `scraper`, turning its borrowed error into an owned one.
pub fn parse_css(css: &str) -> Result<scraper::Selector, SelectorSyntaxError> {
    scraper::Selector::parse(css).map_err(|e| SelectorSyntaxError::InvalidCss {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Trims, collapses whitespace and drops control characters.
/// `#hero` stays `#hero`; `  div.card   h1 ` becomes `div.card h1`.
pub fn sanitize_field_name(raw: &str) -> String {
    let cleaned: String = raw.chars().filter(|c| !c.is_control() || c.is_whitespace()).collect();
    WHITESPACE_RE.replace_all(cleaned.trim(), " ").into_owned()
}

/// A named, persisted bundle of selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorGroup {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub selectors: Vec<Selector>,
}

impl SelectorGroup {
    pub fn new(name: &str, selectors: Vec<Selector>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description: None,
            selectors,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}
