// src/loader/instrument.rs
//
// Makes loaded markup safe to embed: links open elsewhere and nothing inside the
// document can navigate the host.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static HEAD_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").expect("Failed to compile HEAD_OPEN_RE"));

static HTML_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<html(\s[^>]*)?>").expect("Failed to compile HTML_OPEN_RE"));

/// Marker attribute on every element the loader injects.
pub const INSTRUMENTATION_ATTR: &str = "data-scraper-instrumentation";

pub const BASE_TAG: &str = r#"<base target="_blank" data-scraper-instrumentation="base">"#;

pub const INTERCEPTOR_SCRIPT: &str = r#"<script data-scraper-instrumentation="interceptor">
document.addEventListener('click', function (e) {
  var a = e.target && e.target.closest ? e.target.closest('a') : null;
  if (a) { e.preventDefault(); }
}, true);
document.addEventListener('submit', function (e) { e.preventDefault(); }, true);
</script>"#;

static INJECTED_BASE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("head > base[target='_blank'][data-scraper-instrumentation='base']:first-child")
        .expect("Failed to compile INJECTED_BASE")
});

static INJECTED_INTERCEPTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("head > base[data-scraper-instrumentation='base'] + script[data-scraper-instrumentation='interceptor']")
        .expect("Failed to compile INJECTED_INTERCEPTOR")
});

/// First match of `re` that is not inside an HTML comment.
fn find_outside_comments<'m>(re: &Regex, markup: &'m str) -> Option<regex::Match<'m>> {
    re.find_iter(markup).find(|m| {
        let before = &markup[..m.start()];
        before.rfind("<!--") <= before.rfind("-->")
    })
}

/// Inserts `snippet` right after `<head>`, creating a head if the markup has none.
pub fn inject_into_head(markup: &str, snippet: &str) -> String {
    if let Some(m) = find_outside_comments(&HEAD_OPEN_RE, markup) {
        let mut out = String::with_capacity(markup.len() + snippet.len());
        out.push_str(&markup[..m.end()]);
        out.push_str(snippet);
        out.push_str(&markup[m.end()..]);
        return out;
    }
    if let Some(m) = find_outside_comments(&HTML_OPEN_RE, markup) {
        return format!("{}<head>{}</head>{}", &markup[..m.end()], snippet, &markup[m.end()..]);
    }
    format!("<head>{}</head>{}", snippet, markup)
}

/// True when the head opens with the loader's own base tag and interceptor script.
/// Marker text elsewhere in the page does not count.
pub fn is_instrumented(markup: &str) -> bool {
    let document = Html::parse_document(markup);
    if document.select(&INJECTED_BASE).next().is_none() {
        return false;
    }
    document
        .select(&INJECTED_INTERCEPTOR)
        .next()
        .map(|script| Some(script.text().collect::<String>().as_str()) == interceptor_body())
        .unwrap_or(false)
}

fn interceptor_body() -> Option<&'static str> {
    INTERCEPTOR_SCRIPT
        .split_once('>')
        .and_then(|(_, rest)| rest.strip_suffix("</script>"))
}

/// Adds the `<base target="_blank">` element and the click/submit interceptors.
/// Already instrumented markup is returned unchanged.
pub fn instrument(markup: &str) -> String {
    if is_instrumented(markup) {
        return markup.to_string();
    }
    inject_into_head(markup, &format!("{}{}", BASE_TAG, INTERCEPTOR_SCRIPT))
}

/// Placeholder document shown when a page could not be loaded.
pub fn failure_page(url: &str, reason: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Load failed</title></head><body>\
         <div class=\"scraper-load-error\"><h2>Could not load page</h2>\
         <p class=\"scraper-load-error-url\">{}</p><p class=\"scraper-load-error-reason\">{}</p>\
         <p>Check the address and try again.</p></div></body></html>",
        escape_html(url),
        escape_html(reason)
    )
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
