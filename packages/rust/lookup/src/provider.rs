//! Lookup provider trait and the provider registry.
//!
//! A provider contributes a fixed set of fields to a record. It builds its own
//! query from the fields already known, runs it through the worker's session,
//! and returns the updates; it never mutates the record itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use leadfill_shared::{FieldUpdates, LeadfillError, LookupConfig, Record, Result};

use crate::providers::{DirectoryProvider, ProfessionalNetworkProvider, RegistryProvider};
use crate::session::LookupSession;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A provider-specific search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupQuery {
    /// Free-text search string, also used in progress logs.
    pub text: String,
    /// Lowercase token a result must contain to be accepted.
    pub must_contain: Option<String>,
}

impl LookupQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            must_contain: None,
        }
    }

    pub fn requiring(mut self, token: impl Into<String>) -> Self {
        self.must_contain = Some(token.into().to_lowercase());
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One external lookup applied to one record at a time.
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Human-readable provider name for tracing.
    fn name(&self) -> &str;

    /// Fields this provider may write. Anything else it returns is dropped.
    fn target_fields(&self) -> &'static [&'static str];

    /// Build the query for `record`, or `None` when the record lacks the
    /// fields this provider needs.
    fn build_query(&self, record: &Record) -> Option<LookupQuery>;

    /// Run `query` through `session`. Empty updates mean "no match".
    async fn lookup(
        &self,
        session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> Result<FieldUpdates>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Build the ordered provider list named in `[lookup] providers`.
///
/// Known names: `registry`, `network`, `directory`.
pub fn build_providers(config: &LookupConfig) -> Result<Vec<Arc<dyn LookupProvider>>> {
    config
        .providers
        .iter()
        .map(|name| -> Result<Arc<dyn LookupProvider>> {
            match name.trim() {
                "registry" => Ok(Arc::new(RegistryProvider::new(
                    &config.registry_base_url,
                    Duration::from_millis(config.pacing_ms),
                ))),
                "network" => Ok(Arc::new(ProfessionalNetworkProvider::new(
                    &config.search_base_url,
                ))),
                "directory" => Ok(Arc::new(DirectoryProvider::new(
                    &config.directory_search_url,
                ))),
                other => Err(LeadfillError::config(format!(
                    "unknown provider '{other}': expected 'registry', 'network', or 'directory'"
                ))),
            }
        })
        .collect()
}
