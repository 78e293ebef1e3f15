// The simulated visitor. One GET in flight at a time per session.

use crate::error::FetchError;
use crate::network::{ACCEPT, HttpSettings, OutcomeKind, RequestId, RequestOutcome};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Url};
use rand::Rng;
use rand::seq::SliceRandom;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub bytes: u64,
}

/// Seam between the session loop and the transport.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &Url, user_agent: &str) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// reqwest-backed fetcher. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_str(&settings.accept_language)
                .map_err(|e| FetchError::Network(format!("accept-language header: {}", e)))?,
        );
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(settings.timeout())
            .default_headers(headers)
            .pool_max_idle_per_host(settings.pool_idle_per_host)
            .build()?;

        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, user_agent: &str) -> Result<FetchResponse, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .header(header::USER_AGENT, user_agent)
            .send()
            .await?;

        let status = response.status().as_u16();
        let mut bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
        }

        Ok(FetchResponse { status, bytes })
    }
}

pub struct Agent<F> {
    fetcher: Arc<F>,
    user_agents: Arc<[String]>,
    settings: HttpSettings,
}

impl<F> Clone for Agent<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            user_agents: self.user_agents.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<F: PageFetcher> Agent<F> {
    pub fn new(fetcher: Arc<F>, user_agents: Arc<[String]>, settings: HttpSettings) -> Self {
        Self {
            fetcher,
            user_agents,
            settings,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn pick_user_agent<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.user_agents
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }

    /// One logical visit. Network-level errors get a single retry.
    pub async fn visit<R: Rng + ?Sized>(
        &self,
        id: RequestId,
        page: &str,
        url: &Url,
        rng: &mut R,
    ) -> RequestOutcome {
        let user_agent = self.pick_user_agent(rng).to_string();
        let start = Instant::now();

        let mut attempts = 1u8;
        let mut result = self.fetcher.fetch(url, &user_agent).await;

        if let Err(e) = &result {
            if self.settings.retry_transient && e.is_retryable() {
                debug!("Request {} to {} failed ({}), retrying once", id.get(), page, e);
                tokio::time::sleep(self.settings.retry_backoff()).await;
                attempts += 1;
                result = self.fetcher.fetch(url, &user_agent).await;
            }
        }

        let (kind, bytes) = match result {
            Ok(resp) => (OutcomeKind::Status(resp.status), resp.bytes),
            Err(e) => (OutcomeKind::Failed(e), 0),
        };

        RequestOutcome {
            id,
            page: page.to_string(),
            url: url.to_string(),
            kind,
            elapsed: start.elapsed(),
            bytes,
            attempts,
        }
    }
}
