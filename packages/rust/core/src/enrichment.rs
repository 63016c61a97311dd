//! Per-record enrichment: apply every provider in order, isolating failures.
//!
//! A provider that errors, panics, or times out costs only its own fields on
//! that record. The record still reaches the output, and the next provider
//! still runs.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use leadfill_lookup::{LookupProvider, LookupQuery, LookupSession};
use leadfill_shared::{Chunk, EnrichmentOutcome, Record};

/// Ordered provider list plus the per-call time bound.
pub struct EnrichmentPipeline {
    providers: Vec<Arc<dyn LookupProvider>>,
    provider_timeout: Duration,
}

impl EnrichmentPipeline {
    pub fn new(providers: Vec<Arc<dyn LookupProvider>>, provider_timeout: Duration) -> Self {
        Self {
            providers,
            provider_timeout,
        }
    }

    /// Every field some provider may write, in provider order, without repeats.
    pub fn result_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = Vec::new();
        for field in self.providers.iter().flat_map(|p| p.target_fields()) {
            if !fields.contains(field) {
                fields.push(*field);
            }
        }
        fields
    }

    /// `record` with every result field emptied, whatever it carried before.
    pub fn cleared(&self, record: &Record) -> Record {
        record.with_cleared_fields(self.result_fields())
    }

    /// Enrich one record. Never fails: faults are logged and leave the
    /// provider's fields empty.
    pub async fn enrich_record(
        &self,
        session: &mut dyn LookupSession,
        index: usize,
        record: Record,
    ) -> Record {
        if !record.is_identifiable() {
            info!(index, "no identifier or name, skipping lookups");
            return self.cleared(&record);
        }

        let mut current = record;
        for provider in &self.providers {
            let targets = provider.target_fields();

            let Some(query) = provider.build_query(&current) else {
                debug!(index, provider = provider.name(), "missing query fields, skipped");
                current = current.with_blank_fields(targets.iter().copied());
                continue;
            };

            let outcome = self.apply(provider.as_ref(), session, &query).await;
            match &outcome {
                EnrichmentOutcome::Failed(error) => warn!(
                    index,
                    provider = provider.name(),
                    query = %query.text,
                    %error,
                    "lookup failed"
                ),
                other => info!(
                    index,
                    provider = provider.name(),
                    query = %query.text,
                    outcome = other.summary(),
                    "lookup"
                ),
            }

            current = match outcome {
                EnrichmentOutcome::Found(updates) => current
                    .with_updates(&updates.restricted_to(targets))
                    .with_blank_fields(targets.iter().copied()),
                EnrichmentOutcome::NotFound | EnrichmentOutcome::Failed(_) => {
                    current.with_blank_fields(targets.iter().copied())
                }
            };
        }

        current
    }

    /// Enrich a chunk sequentially through one session, preserving order.
    #[instrument(skip_all, fields(chunk = chunk.index, start = chunk.start, records = chunk.records.len()))]
    pub async fn enrich_chunk(&self, session: &mut dyn LookupSession, chunk: Chunk) -> Vec<Record> {
        let mut out = Vec::with_capacity(chunk.records.len());
        for (offset, record) in chunk.records.into_iter().enumerate() {
            out.push(self.enrich_record(session, chunk.start + offset, record).await);
        }
        out
    }

    async fn apply(
        &self,
        provider: &dyn LookupProvider,
        session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> EnrichmentOutcome {
        let call = AssertUnwindSafe(provider.lookup(session, query)).catch_unwind();

        match tokio::time::timeout(self.provider_timeout, call).await {
            Err(_) => {
                debug!(
                    provider = provider.name(),
                    timeout_ms = self.provider_timeout.as_millis() as u64,
                    "lookup timed out"
                );
                EnrichmentOutcome::NotFound
            }
            Ok(Err(panic)) => EnrichmentOutcome::Failed(panic_message(panic.as_ref())),
            Ok(Ok(Err(e))) => EnrichmentOutcome::Failed(e.to_string()),
            Ok(Ok(Ok(updates))) if updates.is_empty() => EnrichmentOutcome::NotFound,
            Ok(Ok(Ok(updates))) => EnrichmentOutcome::Found(updates),
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Behavior, FakeProvider, FakeSession, SessionLog};
    use leadfill_shared::{FieldUpdates, fields};

    const NAMES: &[&str] = &[fields::SURNAME, fields::GIVEN_NAME];
    const PROFILE: &[&str] = &[fields::PROFILE_URL];

    fn pipeline(providers: Vec<Arc<FakeProvider>>) -> EnrichmentPipeline {
        EnrichmentPipeline::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn LookupProvider>)
                .collect(),
            Duration::from_millis(200),
        )
    }

    fn session() -> FakeSession {
        FakeSession::new(Arc::new(SessionLog::default()))
    }

    #[tokio::test]
    async fn unidentifiable_record_is_skipped_without_calls() {
        let p = Arc::new(FakeProvider::new("names", NAMES, Behavior::Echo));
        let pipeline = pipeline(vec![p.clone()]);

        let record = Record::from_fields([(fields::ADDRESS, "10 Rue X, Paris")]);
        let out = pipeline.enrich_record(&mut session(), 0, record).await;

        assert!(p.calls().is_empty());
        assert_eq!(out.get(fields::ADDRESS), "10 Rue X, Paris");
        assert!(out.contains(fields::SURNAME));
        assert!(out.contains(fields::GIVEN_NAME));
    }

    #[tokio::test]
    async fn skipped_record_loses_stale_result_values() {
        let names = Arc::new(FakeProvider::new("names", NAMES, Behavior::Echo));
        let profile = Arc::new(FakeProvider::new("profile", PROFILE, Behavior::Echo));
        let pipeline = pipeline(vec![names.clone(), profile.clone()]);

        let record = Record::from_fields([
            (fields::PROFILE_URL, "https://x/in/old"),
            (fields::SURNAME, "OLD"),
            (fields::ADDRESS, "10 Rue X, Paris"),
        ]);
        let out = pipeline.enrich_record(&mut session(), 0, record).await;

        assert!(names.calls().is_empty());
        assert!(profile.calls().is_empty());
        assert_eq!(out.get(fields::PROFILE_URL), "");
        assert_eq!(out.get(fields::SURNAME), "");
        assert_eq!(out.get(fields::GIVEN_NAME), "");
        assert_eq!(out.get(fields::ADDRESS), "10 Rue X, Paris");
    }

    #[tokio::test]
    async fn providers_apply_in_order_and_last_wins() {
        let first = Arc::new(FakeProvider::new("first", NAMES, Behavior::Echo));
        let second = Arc::new(FakeProvider::new("second", &[fields::SURNAME], Behavior::Echo));
        let pipeline = pipeline(vec![first, second]);

        let out = pipeline
            .enrich_record(&mut session(), 0, Record::new("42", "Acme"))
            .await;

        assert_eq!(out.get(fields::SURNAME), "second:42");
        assert_eq!(out.get(fields::GIVEN_NAME), "first:42");
        assert_eq!(out.identifier(), "42");
    }

    #[tokio::test]
    async fn failure_only_costs_that_providers_fields() {
        let names = Arc::new(FakeProvider::new("names", NAMES, Behavior::FailFor("7")));
        let profile = Arc::new(FakeProvider::new("profile", PROFILE, Behavior::Echo));
        let pipeline = pipeline(vec![names, profile.clone()]);

        let record = Record::new("7", "Acme").with_field(fields::SURNAME, "KEPT");
        let out = pipeline.enrich_record(&mut session(), 3, record).await;

        assert_eq!(out.get(fields::SURNAME), "KEPT");
        assert_eq!(out.get(fields::GIVEN_NAME), "");
        assert!(out.contains(fields::GIVEN_NAME));
        assert_eq!(out.get(fields::PROFILE_URL), "profile:7");
        assert_eq!(profile.calls(), vec!["7"]);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let names = Arc::new(FakeProvider::new("names", NAMES, Behavior::PanicFor("1")));
        let profile = Arc::new(FakeProvider::new("profile", PROFILE, Behavior::Echo));
        let pipeline = pipeline(vec![names, profile]);

        let out = pipeline
            .enrich_record(&mut session(), 0, Record::new("1", "Acme"))
            .await;

        assert_eq!(out.get(fields::SURNAME), "");
        assert_eq!(out.get(fields::PROFILE_URL), "profile:1");
    }

    #[tokio::test]
    async fn timeout_counts_as_no_match() {
        let slow = Arc::new(FakeProvider::new(
            "slow",
            NAMES,
            Behavior::SlowFor("9", Duration::from_secs(5)),
        ));
        let pipeline =
            EnrichmentPipeline::new(vec![slow as Arc<dyn LookupProvider>], Duration::from_millis(20));

        let out = pipeline
            .enrich_record(&mut session(), 0, Record::new("9", "Acme"))
            .await;
        assert_eq!(out.get(fields::SURNAME), "");
        assert!(out.contains(fields::GIVEN_NAME));
    }

    #[tokio::test]
    async fn foreign_fields_are_dropped() {
        let rogue = Arc::new(FakeProvider::new(
            "rogue",
            PROFILE,
            Behavior::Fixed(
                FieldUpdates::new()
                    .with(fields::PROFILE_URL, "https://example.com/in/x")
                    .with(fields::PHONE, "0102030405")
                    .with(fields::IDENTIFIER, "overwritten"),
            ),
        ));
        let pipeline = pipeline(vec![rogue]);

        let out = pipeline
            .enrich_record(&mut session(), 0, Record::new("5", "Acme"))
            .await;
        assert_eq!(out.get(fields::PROFILE_URL), "https://example.com/in/x");
        assert!(!out.contains(fields::PHONE));
        assert_eq!(out.identifier(), "5");
    }

    #[tokio::test]
    async fn chunk_keeps_record_order() {
        let p = Arc::new(FakeProvider::new("names", NAMES, Behavior::Jitter));
        let pipeline = pipeline(vec![p]);

        let chunk = Chunk {
            index: 0,
            start: 10,
            records: crate::test_support::numbered_records(5),
        };
        let out = pipeline.enrich_chunk(&mut session(), chunk).await;
        let ids: Vec<&str> = out.iter().map(|r| r.identifier()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn result_fields_are_deduplicated() {
        let pipeline = pipeline(vec![
            Arc::new(FakeProvider::new("a", NAMES, Behavior::Miss)),
            Arc::new(FakeProvider::new("b", &[fields::GIVEN_NAME, fields::PHONE], Behavior::Miss)),
        ]);
        assert_eq!(
            pipeline.result_fields(),
            vec![fields::SURNAME, fields::GIVEN_NAME, fields::PHONE]
        );
    }
}
