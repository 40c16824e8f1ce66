//! Detail-page fetching. The trait is the seam tests use to serve canned HTML.

use crate::config::EnrichCfg;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Fetches the HTML body of one detail page.
pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Blocking HTTP fetcher that presents itself as a regular browser.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(cfg: &EnrichCfg) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            REFERER,
            HeaderValue::from_str(&cfg.referer).context("invalid referer header")?,
        );
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .timeout(cfg.timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport { url: url.to_string(), source };
        let resp = self.client.get(url).send().map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: url.to_string(), status: status.as_u16() });
        }
        resp.text().map_err(transport)
    }
}
