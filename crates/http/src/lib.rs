//! Tellerdesk HTTP client
//!
//! A thin client for the Tellerdesk REST API. Every request goes through one
//! shared [`ApiClient`]; when it is built with a [`BearerAuth`] decorator the
//! stored access token is attached to every request except those aimed at the
//! public authentication routes.

pub mod client;
pub mod types;

pub use client::bearer::{BearerAuth, PublicRoutes, TokenSource};
pub use client::error::{ClientError, ErrorBody};
pub use client::{ApiClient, ApiClientBuilder, ApiRequest};
