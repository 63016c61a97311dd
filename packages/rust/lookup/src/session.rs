//! Isolated lookup sessions.
//!
//! A session is owned by exactly one worker for the whole of its chunk and is
//! never shared. [`HttpSession`] is the production implementation: one
//! `reqwest` client (with its own cookie jar) per session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use leadfill_shared::{LeadfillError, Result, SessionConfig};

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub body: String,
}

/// One exclusive collaborator session.
#[async_trait]
pub trait LookupSession: Send {
    /// Navigate to `url` and return the resulting document.
    async fn fetch(&mut self, url: &Url) -> Result<Page>;

    /// Release the session. Called exactly once, on every exit path of a chunk.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Opens sessions for workers.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open the session owned by worker `worker`.
    async fn open(&self, worker: usize) -> Result<Box<dyn LookupSession>>;
}

// ---------------------------------------------------------------------------
// HTTP session
// ---------------------------------------------------------------------------

/// Builds an [`HttpSession`] per worker.
#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    config: SessionConfig,
}

impl HttpSessionFactory {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self, worker: usize) -> Result<Box<dyn LookupSession>> {
        Ok(Box::new(HttpSession::open(worker, &self.config)?))
    }
}

/// HTTP-backed session. Always headless; the flag is only logged.
pub struct HttpSession {
    worker: usize,
    client: Client,
    pages_fetched: usize,
}

impl HttpSession {
    /// Build a fresh client for `worker`.
    pub fn open(worker: usize, config: &SessionConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LeadfillError::Session(format!("failed to build HTTP client: {e}")))?;

        info!(worker, headless = config.headless, "lookup session opened");

        Ok(Self {
            worker,
            client,
            pages_fetched: 0,
        })
    }
}

#[async_trait]
impl LookupSession for HttpSession {
    async fn fetch(&mut self, url: &Url) -> Result<Page> {
        debug!(worker = self.worker, %url, "fetching");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| LeadfillError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadfillError::Network(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| LeadfillError::Network(format!("{url}: body read failed: {e}")))?;

        self.pages_fetched += 1;

        Ok(Page {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        info!(
            worker = self.worker,
            pages_fetched = self.pages_fetched,
            "lookup session closed"
        );
        Ok(())
    }
}
