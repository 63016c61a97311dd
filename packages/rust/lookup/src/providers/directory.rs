//! White-pages directory provider.
//!
//! Searches the directory for the director's name and city, opens the first
//! directory entry, and reads its first `tel:` link.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use leadfill_shared::{FieldUpdates, Record, Result, fields};

use crate::html::{links, search_url};
use crate::provider::{LookupProvider, LookupQuery};
use crate::session::LookupSession;

/// URL fragment identifying a directory entry.
const ENTRY_MARKER: &str = "pagesjaunes.fr/pagesblanches";

static PHONE_NOISE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\d+]").unwrap());

pub struct DirectoryProvider {
    search_url: String,
}

impl DirectoryProvider {
    pub fn new(search_url: impl Into<String>) -> Self {
        Self {
            search_url: search_url.into(),
        }
    }
}

#[async_trait]
impl LookupProvider for DirectoryProvider {
    fn name(&self) -> &str {
        "directory"
    }

    fn target_fields(&self) -> &'static [&'static str] {
        &[fields::PHONE]
    }

    fn build_query(&self, record: &Record) -> Option<LookupQuery> {
        let given = record.get(fields::GIVEN_NAME).trim();
        let surname = record.get(fields::SURNAME).trim();
        if given.is_empty() || surname.is_empty() {
            return None;
        }

        let mut parts = vec![format!("\"{given} {surname}\"")];
        let locality = record.locality();
        if !locality.is_empty() {
            parts.push(format!("\"{locality}\""));
        }

        Some(LookupQuery::new(parts.join(" ")))
    }

    async fn lookup(
        &self,
        session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> Result<FieldUpdates> {
        let url = search_url(&self.search_url, &query.text)?;
        let results = session.fetch(&url).await?;

        let Some(entry) = first_entry(&results.body, &results.url) else {
            debug!(query = %query.text, "no directory entry in results");
            return Ok(FieldUpdates::new());
        };

        let page = session.fetch(&entry).await?;
        let phone = first_phone(&page.body).unwrap_or_default();
        Ok(FieldUpdates::new().with(fields::PHONE, phone))
    }
}

fn first_entry(body: &str, base: &Url) -> Option<Url> {
    let doc = Html::parse_document(body);
    links(&doc, base)
        .into_iter()
        .find(|u| u.as_str().contains(ENTRY_MARKER))
}

fn first_phone(body: &str) -> Option<String> {
    let doc = Html::parse_document(body);
    let sel = Selector::parse("a[href^='tel:']").unwrap();
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| PHONE_NOISE.replace_all(href.trim_start_matches("tel:"), "").into_owned())
        .find(|phone| !phone.is_empty())
}
