//! Page retrieval.
//!
//! One attempt per call, no retries. Every transport failure is classified
//! into a [`FetchError`] so callers decide between aborting and skipping.

use anyhow::Result;
use reqwest::blocking::{Client, ClientBuilder};
use url::Url;

use crate::config::Config;
use crate::error::FetchError;

/// Downloaded page body together with the URL it was requested from.
#[derive(Clone, Debug)]
pub struct RawPage {
    pub url: Url,
    pub body: String,
}

/// Source of pages. `Sync` so release pages can be fetched from a worker pool.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<RawPage, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = client_builder(config).build()?;
        Ok(Self { client })
    }
}

fn client_builder(config: &Config) -> ClientBuilder {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.request_timeout())
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<RawPage, FetchError> {
        tracing::debug!(%url, "fetching");

        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| classify_transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(RawPage {
            url: url.clone(),
            body,
        })
    }
}

fn classify_transport(url: &Url, err: &reqwest::Error) -> FetchError {
    let reason = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    };

    FetchError::Unreachable {
        url: url.to_string(),
        reason,
    }
}
