//! Bearer token instrumentation for outgoing requests

use super::auth::paths;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Supplies the access token to attach to outgoing requests
pub trait TokenSource: Send + Sync {
    /// Currently held access token, if any
    fn access_token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn access_token(&self) -> Option<String> {
        self()
    }
}

/// Routes that must be reachable without credentials and never receive one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicRoutes {
    paths: Vec<String>,
}

impl PublicRoutes {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|path| normalize(path.as_ref()))
                .collect(),
        }
    }

    /// The unauthenticated authentication endpoints: login and the
    /// password reset / initial password flows
    pub fn authentication() -> Self {
        Self::new([
            paths::LOGIN,
            paths::RESET_PASSWORD,
            paths::RESET_FORGOTTEN_PASSWORD,
            paths::INITIAL_PASSWORD_SET,
        ])
    }

    /// Whether a request path targets one of the public routes
    ///
    /// Matching is on the path suffix, so an API root mounted under a prefix
    /// (`/api/Authentication/Login`) still matches. Case and a trailing slash
    /// are ignored.
    pub fn contains_path(&self, path: &str) -> bool {
        let path = normalize(path);
        self.paths.iter().any(|public| path.ends_with(public.as_str()))
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.contains_path(url.path())
    }
}

impl Default for PublicRoutes {
    fn default() -> Self {
        Self::authentication()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    if !trimmed.starts_with('/') {
        normalized.push('/');
    }
    normalized.push_str(&trimmed.to_ascii_lowercase());
    normalized
}

/// Request decorator attaching `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerAuth {
    tokens: Arc<dyn TokenSource>,
    public_routes: PublicRoutes,
}

impl BearerAuth {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            tokens,
            public_routes: PublicRoutes::default(),
        }
    }

    #[must_use]
    pub fn with_public_routes(mut self, public_routes: PublicRoutes) -> Self {
        self.public_routes = public_routes;
        self
    }

    pub fn public_routes(&self) -> &PublicRoutes {
        &self.public_routes
    }

    /// Instrument a request before it is sent
    ///
    /// Returns whether a credential was attached. Requests to public routes
    /// are stripped of any authorization header they already carry.
    pub fn apply(&self, request: &mut reqwest::Request) -> bool {
        if self.public_routes.matches(request.url()) {
            request.headers_mut().remove(AUTHORIZATION);
            return false;
        }

        let Some(token) = self.tokens.access_token().filter(|t| !t.is_empty()) else {
            return false;
        };

        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers_mut().insert(AUTHORIZATION, value);
                true
            }
            Err(_) => {
                tracing::warn!(
                    path = request.url().path(),
                    "Stored access token is not a valid header value, sending request without it"
                );
                false
            }
        }
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("public_routes", &self.public_routes)
            .finish_non_exhaustive()
    }
}
