//! Tellerdesk API client

pub mod auth;
pub mod bearer;
pub mod error;

use bearer::{BearerAuth, PublicRoutes, TokenSource};
use error::ClientError;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::{Client, ClientBuilder, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Tellerdesk API client
///
/// Cheap to clone; clones share the connection pool, the cookie store that
/// carries the refresh credential, and the bearer decorator.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    bearer: Option<BearerAuth>,
}

impl ApiClient {
    /// Create a new client without bearer instrumentation
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request for a path below the base URL
    ///
    /// The result can only be sent through this client, so it always passes
    /// the bearer decorator.
    pub fn request(&self, method: reqwest::Method, path: &str) -> ApiRequest {
        let url = format!("{}{}", self.base_url, path);
        ApiRequest {
            builder: self.client.request(method, url),
        }
    }

    /// Instrument and send a request, returning the raw response
    pub async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, ClientError> {
        let mut request = request.builder.build()?;
        let authorized = self
            .bearer
            .as_ref()
            .is_some_and(|bearer| bearer.apply(&mut request));
        tracing::debug!(
            method = %request.method(),
            path = request.url().path(),
            authorized,
            "Sending request"
        );
        Ok(self.client.execute(request).await?)
    }

    /// Execute a request and decode the JSON response
    ///
    /// An empty success body decodes as JSON `null`.
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.iter().all(u8::is_ascii_whitespace) {
                Ok(serde_json::from_str("null")?)
            } else {
                Ok(serde_json::from_slice(&bytes)?)
            }
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    /// Execute a request whose success body is irrelevant
    pub async fn execute_discarding(&self, request: ApiRequest) -> Result<(), ClientError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    tokens: Option<Arc<dyn TokenSource>>,
    public_routes: Option<PublicRoutes>,
    cookies: Option<Arc<dyn CookieStore>>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Attach bearer tokens from `tokens` to non-public requests
    #[must_use]
    pub fn token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Override the routes that never receive a bearer token
    #[must_use]
    pub fn public_routes(mut self, routes: PublicRoutes) -> Self {
        self.public_routes = Some(routes);
        self
    }

    /// Keep cookies in `cookies` instead of an in-memory jar
    ///
    /// Use a persistent store so the refresh credential outlives the process.
    #[must_use]
    pub fn cookie_store(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Configuration(format!("invalid base_url: {e}")))?;

        let mut client_builder = match self.cookies {
            Some(cookies) => ClientBuilder::new().cookie_provider(Arc::new(SharedCookies(cookies))),
            None => ClientBuilder::new().cookie_store(true),
        };

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| concat!("tellerdesk/", env!("CARGO_PKG_VERSION")).to_string()),
        );

        let client = client_builder.build()?;

        let bearer = self.tokens.map(|tokens| {
            BearerAuth::new(tokens).with_public_routes(self.public_routes.unwrap_or_default())
        });

        Ok(ApiClient {
            client,
            base_url,
            bearer,
        })
    }
}

/// A request that can only be sent through the [`ApiClient`] that built it
#[derive(Debug)]
#[must_use]
pub struct ApiRequest {
    builder: reqwest::RequestBuilder,
}

impl ApiRequest {
    /// Set a JSON body
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Self {
        Self {
            builder: self.builder.json(body),
        }
    }

    /// Append query parameters
    pub fn query<T: Serialize + ?Sized>(self, query: &T) -> Self {
        Self {
            builder: self.builder.query(query),
        }
    }

    /// Override the client-wide timeout for this request
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            builder: self.builder.timeout(timeout),
        }
    }
}

/// Adapts a shared trait object to `ClientBuilder::cookie_provider`
struct SharedCookies(Arc<dyn CookieStore>);

impl CookieStore for SharedCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.0.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.0.cookies(url)
    }
}
