//! Session state machine
//!
//! ```text
//!                 login ok                     monitor: expiring soon
//!  Unauthenticated ───────▶ Authenticated ───────────────────────────┐
//!        ▲                   │    ▲   ▲                              │ refresh trigger
//!        │ logout / expired  │    │   └──────── refresh ok ──────────┤ (delay or banner)
//!        └───────────────────┘    │                                  ▼
//!        ▲                        └────────────────────────── RefreshPending
//!        └─────────────────── refresh failed (forced logout) ────────┘
//! ```

use crate::api::AuthApi;
use crate::error::{AuthError, fallback};
use crate::events::{Route, SessionEvent};
use crate::expiry::{ExpiryPolicy, ExpiryStatus};
use crate::profile::{CurrentUser, StaffProfile};
use crate::storage::{SESSION_KEYS, SessionStorage, StorageError, TOKEN_KEY, USER_KEY};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tellerdesk_core::{Clock, SessionSettings, SystemClock};
use tellerdesk_http::types::{
    InitialPasswordSetRequest, LoginRequest, OperationResponse, ResetForgottenPasswordRequest,
    ResetPasswordRequest,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Transient refresh bookkeeping; never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshFlags {
    /// A refresh call is in flight
    pub is_refreshing: bool,
    /// The scheduled refresh trigger has fired
    pub refresh_needed: bool,
    /// The expiry banner is showing
    pub warning_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    /// Authenticated with a refresh in flight
    RefreshPending,
}

/// What one expiry check did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No token is stored
    NoToken,
    /// The token could not be decoded; nothing was done
    Unknown,
    /// The token is comfortably valid; the warning is hidden
    Valid,
    /// The warning is showing and a refresh should be scheduled
    Warned,
    /// Inside the warning window, but a refresh is already in flight
    RefreshInFlight,
    /// The token had lapsed and the session was ended
    ForcedLogout,
}

#[derive(Debug, Default)]
struct SessionState {
    current_user: Option<CurrentUser>,
    flags: RefreshFlags,
    /// Bumped whenever a session starts or ends, so late refresh results can
    /// tell that the session they belonged to is gone
    epoch: u64,
}

/// Owns the authenticated identity and the access token lifecycle
///
/// Construct exactly one per application and share it behind an [`Arc`].
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    policy: ExpiryPolicy,
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionManagerBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the manager, hydrating the session from storage
    pub fn build(self) -> SessionManager {
        let policy = ExpiryPolicy::new(self.settings.warning_threshold());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let manager = SessionManager {
            api: self.api,
            storage: self.storage,
            clock: self.clock,
            settings: self.settings,
            policy,
            state: Mutex::new(SessionState::default()),
            events,
        };
        manager.hydrate();
        manager
    }
}

impl SessionManager {
    pub fn builder(api: Arc<dyn AuthApi>, storage: Arc<dyn SessionStorage>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            api,
            storage,
            clock: Arc::new(SystemClock),
            settings: SessionSettings::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.state().current_user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().current_user.is_some()
    }

    pub fn flags(&self) -> RefreshFlags {
        self.state().flags
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        match (&state.current_user, state.flags.is_refreshing) {
            (None, _) => SessionStatus::Unauthenticated,
            (Some(_), false) => SessionStatus::Authenticated,
            (Some(_), true) => SessionStatus::RefreshPending,
        }
    }

    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub const fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Expiry status of the held token
    pub fn expiry_status(&self) -> ExpiryStatus {
        self.state().current_user.as_ref().map_or(ExpiryStatus::Unknown, |user| {
            self.policy.classify(&user.token, self.clock.now())
        })
    }

    fn hydrate(&self) {
        let token = self.storage.get(TOKEN_KEY);
        let user = self.storage.get(USER_KEY);

        let current_user = match (token, user) {
            (Ok(None), Ok(None)) => None,
            (Ok(Some(token)), Ok(Some(user))) if !token.is_empty() => {
                match serde_json::from_str::<StaffProfile>(&user) {
                    Ok(profile) if self.policy.classify(&token, self.clock.now()).is_expired() => {
                        info!(staff_code = %profile.staff_code, "Stored session has expired");
                        None
                    }
                    Ok(profile) => Some(CurrentUser { token, profile }),
                    Err(e) => {
                        warn!(error = %e, "Stored profile is unreadable");
                        None
                    }
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to read stored session");
                None
            }
            _ => {
                warn!("Stored session is incomplete");
                None
            }
        };

        match current_user {
            Some(user) => {
                info!(staff_code = %user.staff_code(), "Restored session from storage");
                self.state().current_user = Some(user);
            }
            None => {
                if let Err(e) = self.clear_storage() {
                    warn!(error = %e, "Failed to clear stored session");
                }
            }
        }
    }

    fn persist(&self, user: &CurrentUser) -> Result<(), StorageError> {
        self.storage
            .set(USER_KEY, &serde_json::to_string(&user.profile)?)?;
        self.storage.set(TOKEN_KEY, &user.token)
    }

    fn clear_storage(&self) -> Result<(), StorageError> {
        SESSION_KEYS
            .iter()
            .map(|key| self.storage.remove(key))
            .fold(Ok(()), Result::and)
    }

    fn snapshot(&self) -> Result<Vec<(&'static str, Option<String>)>, StorageError> {
        SESSION_KEYS
            .iter()
            .map(|&key| self.storage.get(key).map(|value| (key, value)))
            .collect()
    }

    /// Put back every session key that differs from `snapshot`
    fn restore(&self, snapshot: &[(&'static str, Option<String>)]) {
        for (key, previous) in snapshot {
            if self.storage.get(key).is_ok_and(|current| current == *previous) {
                continue;
            }
            let restored = match previous {
                Some(value) => self.storage.set(key, value),
                None => self.storage.remove(key),
            };
            if let Err(e) = restored {
                warn!(key = *key, error = %e, "Failed to roll back stored session");
            }
        }
    }

    /// Sign in with an email address or staff code
    ///
    /// On success the token and profile are persisted and
    /// [`Route::Dashboard`] is announced.
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] with the server's message when the login is
    /// refused, [`AuthError::Storage`] when the session cannot be saved. No
    /// state changes on failure; a partly written session is rolled back.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let snapshot = self
            .snapshot()
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        let request = LoginRequest {
            email_or_staff_code: identifier.trim().to_string(),
            password: password.to_string(),
        };

        let response = self.api.login(&request).await.map_err(|e| {
            warn!(error = %e, "Login rejected");
            AuthError::Rejected(e.message_or(fallback::LOGIN_FAILED))
        })?;

        if response.token.is_empty() {
            warn!("Login response carried no token");
            return Err(AuthError::Rejected(fallback::LOGIN_FAILED.to_string()));
        }

        let user = CurrentUser {
            profile: StaffProfile::from_login(&response),
            token: response.token,
        };

        {
            let mut state = self.state();
            if let Err(e) = self.persist(&user) {
                warn!(error = %e, "Failed to save session, rolling back");
                self.restore(&snapshot);
                return Err(AuthError::Storage(e.to_string()));
            }
            state.current_user = Some(user.clone());
            state.flags = RefreshFlags::default();
            state.epoch += 1;
        }

        info!(staff_code = %user.staff_code(), role = ?user.role(), "Logged in");
        self.emit(SessionEvent::LoggedIn {
            staff_code: user.staff_code().to_string(),
        });
        self.emit(SessionEvent::Navigate(Route::Dashboard));
        Ok(user)
    }

    /// End the session at the user's request
    ///
    /// Tells the server first, but local cleanup happens whatever the outcome.
    /// The server call is skipped when no session is held, so repeated
    /// logouts reach the endpoint once. Local cleanup and the
    /// [`SessionEvent::LoggedOut`] event still happen every time.
    pub async fn logout(&self) {
        self.end_session(false).await;
    }

    /// End a session already known to be invalid, without telling the server
    pub async fn force_logout(&self) {
        self.end_session(true).await;
    }

    async fn end_session(&self, is_expired: bool) {
        if !is_expired && self.is_authenticated() {
            if let Err(e) = self.api.logout().await {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }
        self.clear_session(is_expired);
    }

    fn clear_session(&self, forced: bool) {
        let previous = {
            let mut state = self.state();
            state.epoch += 1;
            state.flags = RefreshFlags::default();
            if let Err(e) = self.clear_storage() {
                warn!(error = %e, "Failed to clear stored session");
            }
            state.current_user.take()
        };

        if let Some(user) = &previous {
            if forced {
                warn!(staff_code = %user.staff_code(), "Session ended without server logout");
            } else {
                info!(staff_code = %user.staff_code(), "Logged out");
            }
        }

        self.emit(SessionEvent::LoggedOut { forced });
        self.emit(SessionEvent::Navigate(Route::Login));
    }

    /// Exchange the refresh credential for a new access token
    ///
    /// Returns `Ok(None)` without doing anything when a refresh is already in
    /// flight. Only the token changes; the profile is left alone.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] without a session (or when the session
    /// ended while the call was in flight), [`AuthError::SessionExpired`] when
    /// the server refuses; the session has then been force-logged-out.
    pub async fn refresh(&self) -> Result<Option<String>, AuthError> {
        let epoch = {
            let mut state = self.state();
            if state.flags.is_refreshing {
                debug!("Refresh already in flight");
                return Ok(None);
            }
            if state.current_user.is_none() {
                return Err(AuthError::NotAuthenticated);
            }
            state.flags.is_refreshing = true;
            state.epoch
        };

        let result = self.api.refresh().await;

        let failure = {
            let mut state = self.state();
            if state.epoch != epoch {
                debug!("Session changed during refresh, discarding result");
                return Err(AuthError::NotAuthenticated);
            }

            match result {
                Ok(response) if !response.token.is_empty() => {
                    match self.storage.set(TOKEN_KEY, &response.token) {
                        Ok(()) => {
                            let was_visible = state.flags.warning_visible;
                            if let Some(user) = state.current_user.as_mut() {
                                user.token.clone_from(&response.token);
                            }
                            state.flags = RefreshFlags::default();
                            drop(state);

                            info!("Access token refreshed");
                            if was_visible {
                                self.emit(SessionEvent::WarningHidden);
                            }
                            self.emit(SessionEvent::Refreshed);
                            return Ok(Some(response.token));
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to store refreshed token");
                            fallback::SESSION_EXPIRED.to_string()
                        }
                    }
                }
                Ok(_) => {
                    warn!("Refresh response carried no token");
                    fallback::SESSION_EXPIRED.to_string()
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed");
                    e.message_or(fallback::SESSION_EXPIRED)
                }
            }
        };

        self.emit(SessionEvent::RefreshFailed {
            message: failure.clone(),
        });
        self.clear_session(true);
        Err(AuthError::SessionExpired(failure))
    }

    /// Refresh fired by the monitor once the warning delay has passed
    pub async fn run_scheduled_refresh(&self) {
        {
            let mut state = self.state();
            if state.current_user.is_none() || state.flags.is_refreshing {
                return;
            }
            state.flags.refresh_needed = true;
        }

        match self.refresh().await {
            Ok(_) => {}
            Err(AuthError::NotAuthenticated) => debug!("Scheduled refresh found no session"),
            Err(e) => debug!(error = %e, "Scheduled refresh ended the session"),
        }
    }

    /// One pass of the expiry monitor
    pub async fn check_expiry(&self) -> TickOutcome {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return TickOutcome::NoToken,
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                return TickOutcome::NoToken;
            }
        };

        match self.policy.classify(&token, self.clock.now()) {
            ExpiryStatus::Unknown => TickOutcome::Unknown,
            ExpiryStatus::Valid { .. } => {
                self.hide_warning();
                TickOutcome::Valid
            }
            ExpiryStatus::ExpiringSoon { remaining } => self.show_warning(remaining),
            ExpiryStatus::Expired => {
                warn!("Access token has expired");
                self.force_logout().await;
                TickOutcome::ForcedLogout
            }
        }
    }

    fn show_warning(&self, remaining: std::time::Duration) -> TickOutcome {
        let newly_visible = {
            let mut state = self.state();
            if state.flags.is_refreshing {
                return TickOutcome::RefreshInFlight;
            }
            let newly_visible = !state.flags.warning_visible;
            state.flags.warning_visible = true;
            newly_visible
        };

        if newly_visible {
            debug!(remaining_secs = remaining.as_secs(), "Access token expiring soon");
            self.emit(SessionEvent::WarningShown { remaining });
        }
        TickOutcome::Warned
    }

    fn hide_warning(&self) {
        let was_visible = std::mem::take(&mut self.state().flags.warning_visible);
        if was_visible {
            self.emit(SessionEvent::WarningHidden);
        }
    }

    /// The banner's "Refresh" button: refresh right away
    ///
    /// # Errors
    ///
    /// See [`SessionManager::refresh`]
    pub async fn accept_warning(&self) -> Result<Option<String>, AuthError> {
        self.refresh().await
    }

    /// The banner's "Cancel" button: hide the banner only
    ///
    /// An already scheduled refresh still fires.
    pub fn dismiss_warning(&self) {
        self.hide_warning();
    }

    /// Ask the server to send a password reset message
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] carrying the server's message
    pub async fn reset_password(&self, email: &str) -> Result<OperationResponse, AuthError> {
        let request = ResetPasswordRequest {
            email: email.trim().to_string(),
        };
        self.api.reset_password(&request).await.map_err(|e| {
            warn!(error = %e, "Password reset request failed");
            AuthError::Rejected(e.message_or(fallback::RESET_PASSWORD_FAILED))
        })
    }

    /// Replace the default password issued to a new staff member
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] carrying the server's message
    pub async fn initial_password_set(
        &self,
        staff_code: &str,
        default_password: &str,
        new_password: &str,
    ) -> Result<Value, AuthError> {
        let request = InitialPasswordSetRequest {
            staff_code: staff_code.trim().to_string(),
            default_password: default_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.api.initial_password_set(&request).await.map_err(|e| {
            warn!(error = %e, "Initial password set failed");
            AuthError::Rejected(e.message_or(fallback::INITIAL_PASSWORD_FAILED))
        })
    }

    /// Complete a password reset with the temporary password
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] carrying the server's message
    pub async fn reset_forgotten_password(
        &self,
        staff_code: &str,
        temporary_password: &str,
        new_password: &str,
    ) -> Result<OperationResponse, AuthError> {
        let request = ResetForgottenPasswordRequest {
            staff_code: staff_code.trim().to_string(),
            temporary_password: temporary_password.to_string(),
            new_password: new_password.to_string(),
        };
        self.api.reset_forgotten_password(&request).await.map_err(|e| {
            warn!(error = %e, "Forgotten password reset failed");
            AuthError::Rejected(e.message_or(fallback::RESET_FORGOTTEN_PASSWORD_FAILED))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockAuthApi;
    use crate::storage::MemoryStorage;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use chrono::{DateTime, Utc};
    use reqwest::StatusCode;
    use tellerdesk_core::ManualClock;
    use tellerdesk_http::ClientError;
    use tellerdesk_http::types::{LoginResponse, RefreshResponse};

    const NOW: i64 = 1_700_000_000;

    fn token_expiring_at(exp: i64) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"staff001","exp":{exp}}}"#));
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(DateTime::<Utc>::from_timestamp(NOW, 0).unwrap()))
    }

    fn login_response(token: &str) -> LoginResponse {
        serde_json::from_value(serde_json::json!({
            "token": token,
            "isPasswordSet": true,
            "staffCode": "staff001",
            "role": "teller",
            "staffPersonalInformation": { "firstName": "Ama" }
        }))
        .unwrap()
    }

    fn manager(api: MockAuthApi, storage: Arc<MemoryStorage>) -> SessionManager {
        SessionManager::builder(Arc::new(api), storage)
            .clock(clock())
            .build()
    }

    fn seed(storage: &MemoryStorage, token: &str) {
        storage.set(TOKEN_KEY, token).unwrap();
        storage
            .set(
                USER_KEY,
                r#"{"staffCode":"staff001","role":"teller","isPasswordSet":true}"#,
            )
            .unwrap();
    }

    fn unauthorized(message: &str) -> ClientError {
        ClientError::from_status(
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "message": message }).to_string(),
        )
    }

    /// Storage whose token writes fail, as on a full disk
    #[derive(Debug)]
    struct TokenWriteFails {
        inner: MemoryStorage,
    }

    impl TokenWriteFails {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStorage::new(),
            })
        }
    }

    impl SessionStorage for TokenWriteFails {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == TOKEN_KEY {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_login_persists_token_and_profile() {
        let token = token_expiring_at(NOW + 3600);
        let response = login_response(&token);
        let mut api = MockAuthApi::new();
        api.expect_login()
            .withf(|req| req.email_or_staff_code == "staff001" && req.password == "pw")
            .times(1)
            .returning(move |_| Ok(response.clone()));

        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(api, storage.clone());
        let mut events = manager.subscribe();

        let user = manager.login(" staff001 ", "pw").await.unwrap();
        assert_eq!(user.token, token);
        assert_eq!(user.role(), Some("teller"));
        assert_eq!(manager.status(), SessionStatus::Authenticated);

        assert_eq!(storage.get(TOKEN_KEY).unwrap(), Some(token));
        let stored: Value = serde_json::from_str(&storage.get(USER_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(stored["role"], "teller");
        assert_eq!(stored["firstName"], "Ama");

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedIn {
                staff_code: "staff001".to_string()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Navigate(Route::Dashboard)
        );
    }

    #[tokio::test]
    async fn test_login_failure_leaves_state_untouched() {
        let mut api = MockAuthApi::new();
        api.expect_login()
            .returning(|_| Err(unauthorized("Invalid staff code or password")));

        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(api, storage.clone());

        let error = manager.login("staff001", "wrong").await.unwrap_err();
        assert_eq!(
            error,
            AuthError::Rejected("Invalid staff code or password".to_string())
        );
        assert!(manager.current_user().is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_without_message_uses_fallback() {
        let mut api = MockAuthApi::new();
        api.expect_login().returning(|_| {
            Err(ClientError::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                String::new(),
            ))
        });

        let manager = manager(api, Arc::new(MemoryStorage::new()));
        let error = manager.login("staff001", "pw").await.unwrap_err();
        assert_eq!(error.to_string(), fallback::LOGIN_FAILED);
    }

    #[tokio::test]
    async fn test_login_rolls_back_when_token_write_fails() {
        let mut api = MockAuthApi::new();
        let response = login_response(&token_expiring_at(NOW + 3600));
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(response.clone()));

        let storage = TokenWriteFails::new();
        let manager = SessionManager::builder(Arc::new(api), storage.clone())
            .clock(clock())
            .build();
        let mut events = manager.subscribe();

        let error = manager.login("staff001", "pw").await.unwrap_err();
        assert!(matches!(error, AuthError::Storage(_)));
        assert!(manager.current_user().is_none());
        assert!(storage.inner.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_login_keeps_previous_session() {
        let previous = token_expiring_at(NOW + 600);
        let mut api = MockAuthApi::new();
        let response = serde_json::from_value::<LoginResponse>(serde_json::json!({
            "token": token_expiring_at(NOW + 3600),
            "isPasswordSet": true,
            "staffCode": "staff002",
            "role": "manager"
        }))
        .unwrap();
        api.expect_login()
            .times(1)
            .returning(move |_| Ok(response.clone()));

        let storage = TokenWriteFails::new();
        seed(&storage.inner, &previous);
        let stored_profile = storage.inner.get(USER_KEY).unwrap();
        let manager = SessionManager::builder(Arc::new(api), storage.clone())
            .clock(clock())
            .build();

        let error = manager.login("staff002", "pw").await.unwrap_err();
        assert!(matches!(error, AuthError::Storage(_)));

        let user = manager.current_user().unwrap();
        assert_eq!(user.staff_code(), "staff001");
        assert_eq!(user.token, previous);
        assert_eq!(storage.inner.get(TOKEN_KEY).unwrap(), Some(previous));
        assert_eq!(storage.inner.get(USER_KEY).unwrap(), stored_profile);
    }

    #[tokio::test]
    async fn test_hydrates_consistent_storage() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 3600));

        let manager = manager(MockAuthApi::new(), storage.clone());
        let user = manager.current_user().unwrap();
        assert_eq!(user.staff_code(), "staff001");
        assert!(matches!(
            manager.expiry_status(),
            ExpiryStatus::Valid { .. }
        ));
    }

    #[tokio::test]
    async fn test_hydration_rejects_inconsistent_or_expired_storage() {
        let token_only = Arc::new(MemoryStorage::new());
        token_only
            .set(TOKEN_KEY, &token_expiring_at(NOW + 3600))
            .unwrap();
        assert!(!manager(MockAuthApi::new(), token_only.clone()).is_authenticated());
        assert!(token_only.is_empty());

        let profile_only = Arc::new(MemoryStorage::new());
        profile_only
            .set(USER_KEY, r#"{"staffCode":"staff001"}"#)
            .unwrap();
        assert!(!manager(MockAuthApi::new(), profile_only.clone()).is_authenticated());
        assert!(profile_only.is_empty());

        let garbled = Arc::new(MemoryStorage::new());
        garbled.set(TOKEN_KEY, "abc").unwrap();
        garbled.set(USER_KEY, "not json").unwrap();
        assert!(!manager(MockAuthApi::new(), garbled).is_authenticated());

        let expired = Arc::new(MemoryStorage::new());
        seed(&expired, &token_expiring_at(NOW - 1));
        assert!(!manager(MockAuthApi::new(), expired.clone()).is_authenticated());
        assert!(expired.is_empty());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let mut api = MockAuthApi::new();
        api.expect_logout().times(1).returning(|| Ok(()));

        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 3600));
        let manager = manager(api, storage.clone());
        let mut events = manager.subscribe();

        for _ in 0..3 {
            manager.logout().await;
            assert!(manager.current_user().is_none());
            assert!(storage.is_empty());
        }

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut { forced: false }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Navigate(Route::Login)
        );
    }

    #[tokio::test]
    async fn test_logout_survives_network_failure() {
        let mut api = MockAuthApi::new();
        api.expect_logout()
            .times(1)
            .returning(|| Err(ClientError::Configuration("offline".to_string())));

        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 3600));
        let manager = manager(api, storage.clone());

        manager.logout().await;
        assert!(!manager.is_authenticated());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_force_logout_skips_server() {
        let mut api = MockAuthApi::new();
        api.expect_logout().never();

        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 3600));
        let manager = manager(api, storage.clone());
        let mut events = manager.subscribe();

        manager.force_logout().await;
        assert!(!manager.is_authenticated());
        assert!(storage.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut { forced: true }
        );
    }

    #[tokio::test]
    async fn test_refresh_updates_token_only() {
        let fresh = token_expiring_at(NOW + 7200);
        let returned = fresh.clone();
        let mut api = MockAuthApi::new();
        api.expect_refresh().times(1).returning(move || {
            Ok(RefreshResponse {
                token: returned.clone(),
            })
        });

        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 30));
        let manager = manager(api, storage.clone());
        let profile_before = manager.current_user().unwrap().profile;

        assert_eq!(manager.refresh().await, Ok(Some(fresh.clone())));
        let user = manager.current_user().unwrap();
        assert_eq!(user.token, fresh);
        assert_eq!(user.profile, profile_before);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), Some(fresh));
        assert_eq!(manager.flags(), RefreshFlags::default());
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let mut api = MockAuthApi::new();
        api.expect_refresh()
            .times(1)
            .returning(|| Err(unauthorized("Refresh token expired")));
        api.expect_logout().never();

        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 30));
        let manager = manager(api, storage.clone());
        let mut events = manager.subscribe();

        let error = manager.refresh().await.unwrap_err();
        assert_eq!(
            error,
            AuthError::SessionExpired("Refresh token expired".to_string())
        );
        assert!(!manager.is_authenticated());
        assert!(storage.is_empty());
        assert_eq!(manager.flags(), RefreshFlags::default());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::RefreshFailed {
                message: "Refresh token expired".to_string()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut { forced: true }
        );
    }

    #[tokio::test]
    async fn test_refresh_ends_session_when_token_cannot_be_stored() {
        let mut api = MockAuthApi::new();
        let fresh = token_expiring_at(NOW + 7200);
        api.expect_refresh()
            .times(1)
            .returning(move || Ok(RefreshResponse { token: fresh.clone() }));
        api.expect_logout().never();

        let storage = TokenWriteFails::new();
        seed(&storage.inner, &token_expiring_at(NOW + 30));
        let manager = SessionManager::builder(Arc::new(api), storage.clone())
            .clock(clock())
            .build();
        assert!(manager.is_authenticated());
        let mut events = manager.subscribe();

        assert_eq!(
            manager.refresh().await,
            Err(AuthError::SessionExpired(fallback::SESSION_EXPIRED.to_string()))
        );
        assert!(!manager.is_authenticated());
        assert!(storage.inner.is_empty());
        assert_eq!(manager.flags(), RefreshFlags::default());
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::RefreshFailed {
                message: fallback::SESSION_EXPIRED.to_string()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedOut { forced: true }
        );
    }

    #[tokio::test]
    async fn test_refresh_requires_session() {
        let mut api = MockAuthApi::new();
        api.expect_refresh().never();

        let manager = manager(api, Arc::new(MemoryStorage::new()));
        assert_eq!(manager.refresh().await, Err(AuthError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_check_expiry_transitions() {
        let storage = Arc::new(MemoryStorage::new());
        seed(&storage, &token_expiring_at(NOW + 3600));
        let clock = clock();
        let mut api = MockAuthApi::new();
        api.expect_logout().never();
        let manager = SessionManager::builder(Arc::new(api), storage.clone())
            .clock(clock.clone())
            .build();
        let mut events = manager.subscribe();

        assert_eq!(manager.check_expiry().await, TickOutcome::Valid);
        assert!(!manager.flags().warning_visible);

        clock.advance(chrono::Duration::seconds(3600 - 30));
        assert_eq!(manager.check_expiry().await, TickOutcome::Warned);
        assert!(manager.flags().warning_visible);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::WarningShown {
                remaining: std::time::Duration::from_secs(30)
            }
        );

        // Cancel hides the banner without touching anything else
        manager.dismiss_warning();
        assert_eq!(manager.flags(), RefreshFlags::default());
        assert!(manager.is_authenticated());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::WarningHidden);

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(manager.check_expiry().await, TickOutcome::ForcedLogout);
        assert!(!manager.is_authenticated());
        assert!(storage.is_empty());
        assert_eq!(manager.check_expiry().await, TickOutcome::NoToken);
    }

    #[tokio::test]
    async fn test_check_expiry_ignores_undecodable_tokens() {
        for token in ["not-a-token", "a.b", "a.b.c"] {
            let storage = Arc::new(MemoryStorage::new());
            seed(&storage, token);
            let manager = SessionManager::builder(Arc::new(MockAuthApi::new()), storage.clone())
                .clock(clock())
                .build();

            assert_eq!(manager.check_expiry().await, TickOutcome::Unknown);
            assert!(manager.is_authenticated());
            assert!(!manager.flags().warning_visible);
        }
    }

    #[tokio::test]
    async fn test_password_flows_pass_through() {
        let mut api = MockAuthApi::new();
        api.expect_reset_password()
            .withf(|req| req.email == "ama@example.org")
            .returning(|_| {
                Ok(OperationResponse {
                    success: true,
                    message: Some("Reset link sent".to_string()),
                })
            });
        api.expect_initial_password_set()
            .returning(|_| Err(unauthorized("Default password is incorrect")));
        api.expect_reset_forgotten_password().returning(|_| {
            Err(ClientError::from_status(
                StatusCode::BAD_REQUEST,
                "<html></html>".to_string(),
            ))
        });

        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(api, storage.clone());

        let response = manager.reset_password(" ama@example.org ").await.unwrap();
        assert!(response.success);

        assert_eq!(
            manager
                .initial_password_set("staff001", "Default#1", "Better#2")
                .await,
            Err(AuthError::Rejected(
                "Default password is incorrect".to_string()
            ))
        );
        assert_eq!(
            manager
                .reset_forgotten_password("staff001", "Temp#1", "Better#2")
                .await,
            Err(AuthError::Rejected(
                fallback::RESET_FORGOTTEN_PASSWORD_FAILED.to_string()
            ))
        );
        assert!(storage.is_empty());
        assert!(!manager.is_authenticated());
    }
}
