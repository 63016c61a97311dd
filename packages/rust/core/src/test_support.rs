//! Fake sessions and providers for pipeline and pool tests.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use leadfill_lookup::{LookupProvider, LookupQuery, LookupSession, Page, SessionFactory};
use leadfill_shared::{FieldUpdates, LeadfillError, Record, Result};

/// Counters shared by every session a factory hands out.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl SessionLog {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    log: Arc<SessionLog>,
}

impl FakeSession {
    pub fn new(log: Arc<SessionLog>) -> Self {
        log.opened.fetch_add(1, Ordering::SeqCst);
        Self { log }
    }
}

#[async_trait]
impl LookupSession for FakeSession {
    async fn fetch(&mut self, url: &Url) -> Result<Page> {
        Ok(Page {
            url: url.clone(),
            status: 200,
            body: String::new(),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens [`FakeSession`]s, refusing the workers listed in `failing_workers`.
#[derive(Default)]
pub struct FakeFactory {
    pub log: Arc<SessionLog>,
    pub failing_workers: Vec<usize>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, worker: usize) -> Result<Box<dyn LookupSession>> {
        if self.failing_workers.contains(&worker) {
            return Err(LeadfillError::Session(format!(
                "worker {worker}: session could not start"
            )));
        }
        Ok(Box::new(FakeSession::new(self.log.clone())))
    }
}

/// What a [`FakeProvider`] does with a query (the query text is the record identifier).
pub enum Behavior {
    /// Write `"<provider>:<identifier>"` into every target field.
    Echo,
    /// Return these updates for every record.
    Fixed(FieldUpdates),
    /// Nothing found for any record.
    Miss,
    /// Error for this identifier, echo otherwise.
    FailFor(&'static str),
    /// Panic for this identifier, echo otherwise.
    PanicFor(&'static str),
    /// Sleep this long for this identifier, echo otherwise.
    SlowFor(&'static str, Duration),
    /// Echo after a delay that varies with the identifier.
    Jitter,
    /// Echo after `delays[identifier]` milliseconds.
    Delays(Vec<u64>),
}

pub struct FakeProvider {
    name: &'static str,
    targets: &'static [&'static str],
    behavior: Behavior,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(name: &'static str, targets: &'static [&'static str], behavior: Behavior) -> Self {
        Self {
            name,
            targets,
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Query texts this provider received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn echo(&self, query: &LookupQuery) -> FieldUpdates {
        self.targets.iter().fold(FieldUpdates::new(), |acc, field| {
            acc.with(*field, format!("{}:{}", self.name, query.text))
        })
    }
}

#[async_trait]
impl LookupProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn target_fields(&self) -> &'static [&'static str] {
        self.targets
    }

    fn build_query(&self, record: &Record) -> Option<LookupQuery> {
        record.lookup_key().map(LookupQuery::new)
    }

    async fn lookup(
        &self,
        _session: &mut dyn LookupSession,
        query: &LookupQuery,
    ) -> Result<FieldUpdates> {
        self.calls.lock().unwrap().push(query.text.clone());

        match &self.behavior {
            Behavior::Echo => Ok(self.echo(query)),
            Behavior::Fixed(updates) => Ok(updates.clone()),
            Behavior::Miss => Ok(FieldUpdates::new()),
            Behavior::FailFor(id) if query.text == *id => {
                Err(LeadfillError::Network(format!("{id}: connection reset")))
            }
            Behavior::PanicFor(id) if query.text == *id => panic!("selector exploded on {id}"),
            Behavior::SlowFor(id, delay) if query.text == *id => {
                tokio::time::sleep(*delay).await;
                Ok(self.echo(query))
            }
            Behavior::Delays(delays) => {
                let n: usize = query.text.parse().unwrap_or(0);
                let ms = delays.get(n).copied().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(self.echo(query))
            }
            Behavior::Jitter => {
                let n: u64 = query.text.parse().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis((n * 7) % 13)).await;
                Ok(self.echo(query))
            }
            _ => Ok(self.echo(query)),
        }
    }
}

/// Records `"0".."n"` named `"Company <i>"`.
pub fn numbered_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::new(i.to_string(), format!("Company {i}")))
        .collect()
}
