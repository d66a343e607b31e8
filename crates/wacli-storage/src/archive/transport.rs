use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use wacli_types::{ResourceError, ResourceResult};

/// Fetches documents from the archive's REST API.
///
/// `path` is relative to the API base. Implementations stream the body;
/// a missing document is `NotFound`.
pub trait ArchiveTransport: Send + Sync {
    fn fetch(&self, path: &str) -> ResourceResult<Box<dyn Read + Send>>;
}

/// Blocking HTTP transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base: String,
}

impl HttpTransport {
    /// `timeout` bounds each request; `None` waits indefinitely.
    pub fn new(rest_base: &str, timeout: Option<Duration>) -> ResourceResult<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        builder = builder.timeout(timeout);
        let client = builder
            .build()
            .map_err(|e| ResourceError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: rest_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }
}

impl ArchiveTransport for HttpTransport {
    fn fetch(&self, path: &str) -> ResourceResult<Box<dyn Read + Send>> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| ResourceError::Transport(format!("GET {url}: {e}")))?;
        match response.status() {
            status if status.is_success() => Ok(Box::new(response)),
            StatusCode::NOT_FOUND => Err(ResourceError::NotFound(path.to_string())),
            status => Err(ResourceError::Transport(format!("GET {url}: {status}"))),
        }
    }
}
