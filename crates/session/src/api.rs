//! The remote calls the session manager depends on

use async_trait::async_trait;
use serde_json::Value;
use tellerdesk_http::types::{
    InitialPasswordSetRequest, LoginRequest, LoginResponse, OperationResponse, RefreshResponse,
    ResetForgottenPasswordRequest, ResetPasswordRequest,
};
use tellerdesk_http::{ApiClient, ClientError};

/// Authentication endpoints of the Tellerdesk API
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
    async fn refresh(&self) -> Result<RefreshResponse, ClientError>;
    async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
    ) -> Result<OperationResponse, ClientError>;
    async fn initial_password_set(
        &self,
        request: &InitialPasswordSetRequest,
    ) -> Result<Value, ClientError>;
    async fn reset_forgotten_password(
        &self,
        request: &ResetForgottenPasswordRequest,
    ) -> Result<OperationResponse, ClientError>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError> {
        Self::login(self, request).await
    }

    async fn logout(&self) -> Result<(), ClientError> {
        Self::logout(self).await
    }

    async fn refresh(&self) -> Result<RefreshResponse, ClientError> {
        Self::refresh(self).await
    }

    async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        Self::reset_password(self, request).await
    }

    async fn initial_password_set(
        &self,
        request: &InitialPasswordSetRequest,
    ) -> Result<Value, ClientError> {
        Self::initial_password_set(self, request).await
    }

    async fn reset_forgotten_password(
        &self,
        request: &ResetForgottenPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        Self::reset_forgotten_password(self, request).await
    }
}
