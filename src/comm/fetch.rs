use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use crate::comm::{DocumentSource, FetchError};
use crate::model::WatchConfig;

/// Plain unauthenticated HTTP GET of the plant document.
///
/// The client-wide timeout bounds the whole exchange, connect and body
/// included, so a silent controller can never hold the cycle longer than
/// `timeout`.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(url: String, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HttpFetcher {
            client,
            url,
            timeout,
        })
    }

    pub fn from_config(config: &WatchConfig) -> reqwest::Result<Self> {
        Self::new(config.url(), config.fetch_timeout())
    }

    #[cfg(test)]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        let url = self.url.clone();
        if err.is_timeout() {
            FetchError::Timeout {
                url,
                timeout: self.timeout,
            }
        } else if err.is_connect() {
            FetchError::Connect { url, source: err }
        } else {
            FetchError::Transport { url, source: err }
        }
    }
}

impl DocumentSource for HttpFetcher {
    fn origin(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Bytes, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|err| self.classify(err))?;

        debug!("Fetched {} bytes from {}", body.len(), self.url);

        Ok(body)
    }
}
