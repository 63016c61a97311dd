//! Company registry provider.
//!
//! Searches the registry by identifier (or name), follows the first search
//! result when the site does not redirect straight to the company page, and
//! reads the address and first director from the company sheet.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use leadfill_shared::{FieldUpdates, Record, Result, fields, split_person_name};

use crate::html::{row_cell, search_url, text_of};
use crate::provider::{LookupProvider, LookupQuery};
use crate::session::LookupSession;

/// First link of the search-results list.
const RESULT_LINK_SELECTOR: &str = "a[class*='SearchResults_link']";

const ADDRESS_LABEL: &str = "Adresse";
const DIRECTOR_LABEL: &str = "Dirigeant";

pub struct RegistryProvider {
    base_url: String,
    pacing: Duration,
}

impl RegistryProvider {
    /// `base_url` is the search endpoint the query is appended to.
    pub fn new(base_url: impl Into<String>, pacing: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            pacing,
        }
    }
}

#[async_trait]
impl LookupProvider for RegistryProvider {
    fn name(&self) -> &str {
        "registry"
    }

    fn target_fields(&self) -> &'static [&'static str] {
        &[fields::ADDRESS, fields::SURNAME, fields::GIVEN_NAME]
    }

    fn build_query(&self, record: &Record) -> Option<LookupQuery> {
        record.lookup_key().map(LookupQuery::new)
    }

    async fn lookup(
        &self,
        session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> Result<FieldUpdates> {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        let search = search_url(&self.base_url, &query.text)?;
        let mut page = session.fetch(&search).await?;

        // The registry redirects exact identifier matches straight to the sheet.
        if page.url.path() == search.path() {
            let first = first_result(&page.body, &page.url);
            match first {
                Some(url) => {
                    debug!(%url, "following first search result");
                    page = session.fetch(&url).await?;
                }
                None => warn!(query = %query.text, "no search result to follow"),
            }
        }

        Ok(extract_company(&page.body))
    }
}

fn first_result(body: &str, base: &Url) -> Option<Url> {
    let doc = Html::parse_document(body);
    let sel = Selector::parse(RESULT_LINK_SELECTOR).unwrap();
    doc.select(&sel)
        .filter_map(|el| el.value().attr("href"))
        .find_map(|href| base.join(href).ok())
}

/// Read address and director from a company sheet.
fn extract_company(body: &str) -> FieldUpdates {
    let doc = Html::parse_document(body);
    let mut updates = FieldUpdates::new();

    match row_cell(&doc, ADDRESS_LABEL).map(|td| text_of(&td)) {
        Some(address) if !address.is_empty() => updates.set(fields::ADDRESS, address),
        _ => debug!("address not found"),
    }

    let link_sel = Selector::parse("a").unwrap();
    let director = row_cell(&doc, DIRECTOR_LABEL)
        .and_then(|td| td.select(&link_sel).next().map(|a| text_of(&a)))
        .unwrap_or_default();

    if director.is_empty() {
        debug!("director not found");
    } else {
        let (surname, given_name) = split_person_name(&director);
        updates.set(fields::SURNAME, surname);
        updates.set(fields::GIVEN_NAME, given_name);
    }

    updates
}
