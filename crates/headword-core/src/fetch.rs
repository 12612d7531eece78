//! Document fetching over HTTP.
//!
//! Uses async reqwest internally on a shared tokio runtime, but presents a
//! sync interface for rayon workers.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default page URL prefix; the key is appended verbatim
pub const DEFAULT_BASE_URL: &str = "https://www.oed.com/oed2/";

/// Error types for fetch operations
#[derive(Debug)]
pub enum FetchError {
    /// HTTP error with optional status code (None = transport failure)
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Failed to build the client
    Client(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Client(message) => write!(f, "HTTP client: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    /// Status code returned by the server, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            Self::Client(_) => None,
        }
    }
}

/// Fetches the document for one key.
///
/// Implementations must be shareable across worker threads. Any error means
/// the key is skipped.
pub trait Fetch: Send + Sync {
    fn fetch(&self, key: u64) -> Result<String, FetchError>;
}

impl<F> Fetch for F
where
    F: Fn(u64) -> Result<String, FetchError> + Send + Sync,
{
    fn fetch(&self, key: u64) -> Result<String, FetchError> {
        self(key)
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Settings for [`HttpFetcher`]
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: None,
        }
    }
}

/// GETs `{base_url}{key}` and returns the body text on 2xx.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.timeout)
            .pool_max_idle_per_host(16);
        if let Some(ua) = &config.user_agent {
            builder = builder.user_agent(ua.clone());
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Locator for a key
    pub fn url_for(&self, key: u64) -> String {
        page_url(&self.base_url, key)
    }
}

fn page_url(base_url: &str, key: u64) -> String {
    format!("{base_url}{key}")
}

impl Fetch for HttpFetcher {
    fn fetch(&self, key: u64) -> Result<String, FetchError> {
        let url = self.url_for(key);
        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Http {
                    status: Some(status.as_u16()),
                    message: format!(
                        "{} when getting {url}",
                        status.canonical_reason().unwrap_or("unknown status")
                    ),
                });
            }

            response
                .text()
                .await
                .map_err(|e| FetchError::from_reqwest(&e))
        })
    }
}
