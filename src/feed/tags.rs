use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// Collect `rel="tag"` anchors from item HTML.
///
/// Keys are the lower-cased, trimmed anchor texts, values the link
/// targets (empty when the anchor has no `href`). Anchors without text
/// are ignored; a repeated tag keeps the last target seen.
pub fn extract_rel_tags(html: &str) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if !html.contains("tag") {
        return tags;
    }

    let Ok(selector) = Selector::parse(r#"a[rel~="tag"]"#) else {
        return tags;
    };
    let doc = Html::parse_fragment(html);

    for anchor in doc.select(&selector) {
        let text = anchor.text().collect::<String>();
        let tag = text.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        let href = anchor.value().attr("href").unwrap_or_default().to_string();
        tags.insert(tag, href);
    }

    tags
}
