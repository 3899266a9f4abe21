use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

mod fetch;

pub use fetch::HttpFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("couldn't connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("transfer from {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Where the plant document comes from.
pub trait DocumentSource {
    /// Human readable origin, used in logs.
    fn origin(&self) -> &str;

    fn fetch(&self) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}
