//! Small HTML helpers shared by the site providers.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use leadfill_shared::{LeadfillError, Result};

/// Append `query` to a search endpoint, form-encoding it (`' '` becomes `'+'`).
pub fn search_url(base: &str, query: &str) -> Result<Url> {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    Url::parse(&format!("{base}{encoded}"))
        .map_err(|e| LeadfillError::config(format!("invalid search endpoint '{base}': {e}")))
}

/// All `<a href>` targets in document order, resolved against `base`.
///
/// Search-engine redirect links (`/url?q=<target>`) are unwrapped.
pub fn links(doc: &Html, base: &Url) -> Vec<Url> {
    let link_sel = Selector::parse("a[href]").unwrap();
    let mut out = Vec::new();

    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:") {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            out.push(unwrap_redirect(resolved));
        }
    }

    out
}

fn unwrap_redirect(url: Url) -> Url {
    if url.path() == "/url" {
        if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "q" || k == "url") {
            if let Ok(inner) = Url::parse(&target) {
                return inner;
            }
        }
    }
    url
}

/// Visible text of an element with whitespace collapsed.
pub fn text_of(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `<td>` following the first `<th>` whose label contains `label`.
pub fn row_cell<'a>(doc: &'a Html, label: &str) -> Option<ElementRef<'a>> {
    let th_sel = Selector::parse("th").unwrap();
    doc.select(&th_sel)
        .find(|th| text_of(th).contains(label))
        .and_then(|th| {
            th.next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "td")
        })
}
