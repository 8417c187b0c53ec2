//! Shared fixtures for session integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tellerdesk_core::{ManualClock, SessionSettings};
use tellerdesk_http::ClientError;
use tellerdesk_http::types::{
    InitialPasswordSetRequest, LoginRequest, LoginResponse, OperationResponse, RefreshResponse,
    ResetForgottenPasswordRequest, ResetPasswordRequest,
};
use tellerdesk_session::storage::{TOKEN_KEY, USER_KEY};
use tellerdesk_session::{AuthApi, MemoryStorage, SessionEvent, SessionManager, SessionStorage};
use tokio::sync::{Notify, broadcast};

pub const NOW: i64 = 1_700_000_000;

pub fn token_expiring_at(exp: i64) -> String {
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"staff001","exp":{exp}}}"#));
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(NOW, 0).unwrap(),
    ))
}

pub fn seeded_storage(token: &str) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, token).unwrap();
    storage
        .set(
            USER_KEY,
            r#"{"staffCode":"staff001","role":"teller","isPasswordSet":true}"#,
        )
        .unwrap();
    storage
}

pub fn manager(
    api: Arc<FakeApi>,
    storage: Arc<MemoryStorage>,
    clock: Arc<ManualClock>,
) -> Arc<SessionManager> {
    Arc::new(
        SessionManager::builder(api, storage)
            .clock(clock)
            .settings(SessionSettings::default())
            .build(),
    )
}

/// Wait for the next event, failing the test after a minute of (virtual) time
pub async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("event channel closed")
}

/// Scriptable [`AuthApi`] that counts calls
#[derive(Debug, Default)]
pub struct FakeApi {
    pub login_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    /// Token handed out by refresh; `None` makes refresh fail with a 401
    pub refresh_token: Mutex<Option<String>>,
    /// When set, refresh waits for [`FakeApi::release`] before answering
    pub hold_refresh: AtomicBool,
    gate: Notify,
}

impl FakeApi {
    pub fn refreshing_to(token: impl Into<String>) -> Arc<Self> {
        let api = Self::default();
        *api.refresh_token.lock().unwrap() = Some(token.into());
        Arc::new(api)
    }

    pub fn failing_refresh() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

fn unauthorized(message: &str) -> ClientError {
    ClientError::from_status(
        reqwest::StatusCode::UNAUTHORIZED,
        serde_json::json!({ "message": message }).to_string(),
    )
}

#[async_trait]
impl AuthApi for FakeApi {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::from_value(serde_json::json!({
            "token": token_expiring_at(NOW + 3600),
            "isPasswordSet": true,
            "staffCode": request.email_or_staff_code,
            "role": "teller"
        }))
        .unwrap())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&self) -> Result<RefreshResponse, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_refresh.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        let token = self.refresh_token.lock().unwrap().clone();
        token
            .map(|token| RefreshResponse { token })
            .ok_or_else(|| unauthorized("Refresh token expired"))
    }

    async fn reset_password(
        &self,
        _request: &ResetPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        Ok(OperationResponse::default())
    }

    async fn initial_password_set(
        &self,
        _request: &InitialPasswordSetRequest,
    ) -> Result<Value, ClientError> {
        Ok(Value::Null)
    }

    async fn reset_forgotten_password(
        &self,
        _request: &ResetForgottenPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        Ok(OperationResponse::default())
    }
}
