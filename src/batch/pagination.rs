// src/batch/pagination.rs
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static NEXT_LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a[rel~='next'], link[rel~='next'], .pagination a.next, a.next")
        .expect("Failed to compile NEXT_LINK_SELECTOR")
});

/// Absolute URL of the page after `page_url`, if the document advertises one.
pub fn find_next_page(document: &Html, page_url: &str) -> Option<String> {
    let base = url::Url::parse(page_url).ok()?;
    document
        .select(&NEXT_LINK_SELECTOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:"))
        .filter_map(|href| base.join(href).ok())
        .find(|next| matches!(next.scheme(), "http" | "https") && next.as_str() != base.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_next_resolved_against_page() {
        let doc = Html::parse_document(r#"<a href="?page=3" rel="next">Next</a>"#);
        assert_eq!(
            find_next_page(&doc, "https://shop.test/list?page=2").as_deref(),
            Some("https://shop.test/list?page=3")
        );
    }

    #[test]
    fn test_class_based_next_link() {
        let doc = Html::parse_document(
            r##"<nav class="pagination"><a href="#">prev</a><a class="next" href="/p/2">next</a></nav>"##,
        );
        assert_eq!(find_next_page(&doc, "https://shop.test/p/1").as_deref(), Some("https://shop.test/p/2"));
    }

    #[test]
    fn test_no_next_or_self_link() {
        let none = Html::parse_document("<p>end</p>");
        assert_eq!(find_next_page(&none, "https://shop.test/"), None);
        let selfish = Html::parse_document(r#"<a rel="next" href="/x">again</a>"#);
        assert_eq!(find_next_page(&selfish, "https://shop.test/x"), None);
    }
}
