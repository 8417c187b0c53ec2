//! Client-side session lifecycle for Tellerdesk
//!
//! [`SessionManager`] owns the signed-in staff member and their access token.
//! It persists both through a [`SessionStorage`], next to the refresh cookie
//! kept by [`StorageCookieJar`]. It refreshes the token before it lapses and
//! ends the session when it can no longer be kept alive.
//! [`ExpiryMonitor`] drives the periodic expiry checks; UIs follow along by
//! subscribing to [`SessionEvent`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tellerdesk_core::ClientSettings;
//! use tellerdesk_http::ApiClient;
//! use tellerdesk_session::{
//!     ExpiryMonitor, FileStorage, SessionManager, SessionStorage, StorageCookieJar, StorageTokenSource,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let settings = ClientSettings::load(None)?;
//! let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new(settings.session_file()));
//! let client = ApiClient::builder()
//!     .base_url(&settings.api_root)
//!     .token_source(Arc::new(StorageTokenSource::new(storage.clone())))
//!     .cookie_store(Arc::new(StorageCookieJar::new(storage.clone())))
//!     .build()?;
//! let manager = Arc::new(SessionManager::builder(Arc::new(client), storage)
//!     .settings(settings.session.clone())
//!     .build());
//! let _monitor = ExpiryMonitor::start(manager.clone());
//! manager.login("staff001", "password").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod events;
pub mod expiry;
pub mod manager;
pub mod monitor;
pub mod profile;
pub mod storage;
pub mod token;

pub use api::AuthApi;
pub use error::AuthError;
pub use events::{Route, SessionEvent};
pub use expiry::{ExpiryPolicy, ExpiryStatus};
pub use manager::{RefreshFlags, SessionManager, SessionManagerBuilder, SessionStatus, TickOutcome};
pub use monitor::{ExpiryMonitor, MonitorHandle};
pub use profile::{CurrentUser, StaffProfile};
pub use storage::{
    FileStorage, MemoryStorage, SessionStorage, StorageCookieJar, StorageError, StorageTokenSource,
};
