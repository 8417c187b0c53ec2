//! Authentication API client methods

use super::{ApiClient, ClientError};
use crate::types::{
    InitialPasswordSetRequest, LoginRequest, LoginResponse, OperationResponse, RefreshResponse,
    ResetForgottenPasswordRequest, ResetPasswordRequest,
};
use reqwest::Method;
use serde_json::Value;

/// Paths of the authentication endpoints, relative to the API root
pub mod paths {
    pub const LOGIN: &str = "/Authentication/Login";
    pub const LOGOUT: &str = "/Authentication/logout";
    pub const REFRESH: &str = "/Authentication/refresh";
    pub const RESET_PASSWORD: &str = "/Authentication/ResetPassword";
    pub const INITIAL_PASSWORD_SET: &str = "/Authentication/InitialPasswordSet";
    pub const RESET_FORGOTTEN_PASSWORD: &str = "/Authentication/ResetForgottenPassword";
}

impl ApiClient {
    /// Exchange an email or staff code and a password for an access token
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError> {
        let req = self.request(Method::POST, paths::LOGIN).json(request);
        self.execute(req).await
    }

    /// Invalidate the current session server-side
    pub async fn logout(&self) -> Result<(), ClientError> {
        let req = self.request(Method::POST, paths::LOGOUT);
        self.execute_discarding(req).await
    }

    /// Obtain a new access token using the refresh credential cookie
    pub async fn refresh(&self) -> Result<RefreshResponse, ClientError> {
        let req = self.request(Method::POST, paths::REFRESH);
        self.execute(req).await
    }

    /// Ask the server to send a password reset message
    pub async fn reset_password(
        &self,
        request: &ResetPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        let req = self.request(Method::POST, paths::RESET_PASSWORD).json(request);
        self.execute(req).await
    }

    /// Replace the default password issued to a new staff member
    pub async fn initial_password_set(
        &self,
        request: &InitialPasswordSetRequest,
    ) -> Result<Value, ClientError> {
        let req = self
            .request(Method::POST, paths::INITIAL_PASSWORD_SET)
            .json(request);
        self.execute(req).await
    }

    /// Complete a password reset with the temporary password
    pub async fn reset_forgotten_password(
        &self,
        request: &ResetForgottenPasswordRequest,
    ) -> Result<OperationResponse, ClientError> {
        let req = self
            .request(Method::POST, paths::RESET_FORGOTTEN_PASSWORD)
            .json(request);
        self.execute(req).await
    }
}
