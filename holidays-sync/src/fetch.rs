//! Fetch client for the remote holiday API.
//!
//! One blocking GET per country:
//!
//! ```text
//! GET <base_url>?key=<api_key>&format=json&country=<ISO>&year=<YYYY>
//! ```
//!
//! Only a 200 with a non-empty body counts as success. Nothing is cached here.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use holidays_core::{CountryCode, Settings};

use crate::error::FetchError;

/// The payload for one country, exactly as served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub country: CountryCode,
    pub year: i32,
    pub body: String,
}

/// Anything that can produce a country's raw holiday payload.
///
/// The orchestrator only talks to this trait so tests can substitute canned
/// responses for the network.
pub trait HolidaySource: Send + Sync {
    fn fetch(&self, country: &CountryCode, year: i32) -> Result<RawResponse, FetchError>;

    /// Called with fresh settings at the start of every sync.
    fn reconfigure(&self, _settings: &Settings) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientConfig {
    base_url: String,
    api_key: String,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ClientConfig {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            read_timeout: Duration::from_secs(settings.read_timeout_secs),
        }
    }
}

struct Client {
    config: ClientConfig,
    agent: ureq::Agent,
}

impl Client {
    fn build(config: ClientConfig) -> Arc<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .build();
        Arc::new(Self { config, agent })
    }
}

/// `ureq`-backed client with bounded connect and read timeouts.
///
/// The agent is rebuilt whenever [`HolidaySource::reconfigure`] sees a
/// different URL, key or timeout.
pub struct HttpFetchClient {
    client: RwLock<Arc<Client>>,
}

impl HttpFetchClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        let config = ClientConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            connect_timeout,
            read_timeout,
        };
        Self {
            client: RwLock::new(Client::build(config)),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: RwLock::new(Client::build(ClientConfig::from_settings(settings))),
        }
    }

    pub fn base_url(&self) -> String {
        self.current().config.base_url.clone()
    }

    fn current(&self) -> Arc<Client> {
        Arc::clone(&*self.client.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl HolidaySource for HttpFetchClient {
    fn fetch(&self, country: &CountryCode, year: i32) -> Result<RawResponse, FetchError> {
        if year <= 0 {
            return Err(FetchError::InvalidRequest(format!(
                "year must be positive, got {year}"
            )));
        }

        let client = self.current();
        let config = &client.config;
        tracing::debug!("GET {} country={} year={}", config.base_url, country, year);
        let response = client
            .agent
            .get(&config.base_url)
            .query("key", &config.api_key)
            .query("format", "json")
            .query("country", country.as_str())
            .query("year", &year.to_string())
            .call()
            .map_err(classify_error)?;

        let status = response.status();
        if status != 200 {
            return Err(FetchError::ServerError { status });
        }

        let body = response
            .into_string()
            .map_err(|e| FetchError::NetworkUnavailable(format!("reading body: {e}")))?;
        if body.is_empty() {
            return Err(FetchError::EmptyResponse);
        }

        Ok(RawResponse {
            country: country.clone(),
            year,
            body,
        })
    }

    fn reconfigure(&self, settings: &Settings) {
        let config = ClientConfig::from_settings(settings);
        let mut client = self.client.write().unwrap_or_else(PoisonError::into_inner);
        if client.config != config {
            tracing::debug!("fetch client reconfigured for {}", config.base_url);
            *client = Client::build(config);
        }
    }
}

fn classify_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, _) => FetchError::ServerError { status },
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                FetchError::InvalidRequest(transport_detail(&transport))
            }
            _ => FetchError::NetworkUnavailable(transport_detail(&transport)),
        },
    }
}

/// Describe a transport failure without the request URL, which carries the
/// API key in its query string.
fn transport_detail(transport: &ureq::Transport) -> String {
    let mut detail = transport.kind().to_string();
    if let Some(message) = transport.message() {
        detail.push_str(": ");
        detail.push_str(message);
    }
    if let Some(source) = std::error::Error::source(transport) {
        detail.push_str(": ");
        detail.push_str(&source.to_string());
    }
    detail
}
