//! Professional-network profile provider.
//!
//! Runs a web search for the director's name and city and keeps the first
//! profile link that mentions the surname.

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use leadfill_shared::{FieldUpdates, Record, Result, fields};

use super::contains_all_tokens;
use crate::html::{links, search_url};
use crate::provider::{LookupProvider, LookupQuery};
use crate::session::LookupSession;

/// URL fragment identifying a member profile.
const PROFILE_MARKER: &str = "linkedin.com/in";

pub struct ProfessionalNetworkProvider {
    search_base_url: String,
}

impl ProfessionalNetworkProvider {
    pub fn new(search_base_url: impl Into<String>) -> Self {
        Self {
            search_base_url: search_base_url.into(),
        }
    }
}

#[async_trait]
impl LookupProvider for ProfessionalNetworkProvider {
    fn name(&self) -> &str {
        "network"
    }

    fn target_fields(&self) -> &'static [&'static str] {
        &[fields::PROFILE_URL]
    }

    fn build_query(&self, record: &Record) -> Option<LookupQuery> {
        let given = record.get(fields::GIVEN_NAME).trim();
        let surname = record.get(fields::SURNAME).trim();
        if given.is_empty() || surname.is_empty() {
            return None;
        }

        let mut parts = vec![format!("{given} {surname}")];
        let locality = record.locality();
        if !locality.is_empty() {
            parts.push(locality);
        }
        parts.push("linkedin".into());

        Some(LookupQuery::new(parts.join(" ")).requiring(surname))
    }

    async fn lookup(
        &self,
        session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> Result<FieldUpdates> {
        let url = search_url(&self.search_base_url, &query.text)?;
        let page = session.fetch(&url).await?;

        let profile = first_profile(&page.body, &page.url, query.must_contain.as_deref());
        Ok(FieldUpdates::new().with(fields::PROFILE_URL, profile.unwrap_or_default()))
    }
}

fn first_profile(body: &str, base: &Url, required: Option<&str>) -> Option<String> {
    let doc = Html::parse_document(body);
    links(&doc, base)
        .into_iter()
        .map(String::from)
        .find(|href| {
            let lower = href.to_lowercase();
            lower.contains(PROFILE_MARKER)
                && required.is_none_or(|token| contains_all_tokens(&lower, token))
        })
}
