//! HTTP client for the toolbox service.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Url;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};

/// Default timeout for a toolbox call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum response body size (1MB).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Routes served by the toolbox, keyed by tool name.
pub fn default_routes() -> HashMap<String, String> {
    [
        ("get_balances", "/balances"),
        ("get_transactions", "/transactions"),
        ("get_exchange_rates", "/exchange-rates"),
        ("get_exchange_fees", "/exchange-fees"),
        ("get_exchange_pairs", "/exchange-pairs"),
        ("get_withdrawal_fees", "/withdrawal-fees"),
    ]
    .into_iter()
    .map(|(tool, route)| (tool.to_string(), route.to_string()))
    .collect()
}

/// Configuration for a toolbox client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub routes: HashMap<String, String>,
    /// Upper bound for any single call.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Config with the default routes and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            routes: default_routes(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_route(mut self, tool: impl Into<String>, route: impl Into<String>) -> Self {
        self.routes.insert(tool.into(), route.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Handle to the toolbox service.
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    routes: HashMap<String, String>,
    timeout: Duration,
}

impl Client {
    /// Create a client, validating the base URL.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(config.base_url));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            routes: config.routes,
            timeout: config.timeout,
        })
    }

    /// Call the route for `tool` and return the raw response body.
    ///
    /// The effective timeout is the smaller of `timeout` and the client's
    /// configured limit.
    pub async fn call(
        &self,
        tool: &str,
        params: &[(String, String)],
        timeout_after: Duration,
    ) -> Result<String> {
        let url = self.url_for(tool, params)?;
        let limit = timeout_after.min(self.timeout);
        let start = Instant::now();

        debug!(tool, %url, "calling toolbox");

        let body = timeout(limit, self.fetch(url))
            .await
            .map_err(|_| Error::Timeout(limit.as_millis() as u64))??;

        debug!(tool, bytes = body.len(), elapsed = ?start.elapsed(), "toolbox responded");
        Ok(body)
    }

    fn url_for(&self, tool: &str, params: &[(String, String)]) -> Result<Url> {
        let route = self
            .routes
            .get(tool)
            .ok_or_else(|| Error::UnknownRoute(tool.to_string()))?;

        let path = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        let mut url = self
            .base_url
            .join(&path)
            .map_err(|e| Error::InvalidUrl(format!("{route}: {e}")))?;

        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn fetch(&self, url: Url) -> Result<String> {
        let mut response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.timeout.as_millis() as u64)
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if let Some(size) = response.content_length() {
            check_size(size as usize)?;
        }

        // Chunked bodies carry no length; stop reading once the cap is passed.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
        {
            bytes.extend_from_slice(&chunk);
            check_size(bytes.len())?;
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

fn check_size(size: usize) -> Result<()> {
    if size > MAX_OUTPUT_SIZE {
        return Err(Error::OutputTooLarge {
            size,
            max: MAX_OUTPUT_SIZE,
        });
    }
    Ok(())
}
