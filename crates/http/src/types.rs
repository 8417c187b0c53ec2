//! Wire types of the `/Authentication` endpoints

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Login request; the identifier is either an email address or a staff code
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email_or_staff_code: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email_or_staff_code", &self.email_or_staff_code)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful login payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_password_set: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub staff_code: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub position_code: Option<String>,
    #[serde(default)]
    pub department_code: Option<String>,
    #[serde(default)]
    pub branch_code: Option<String>,
    #[serde(default)]
    pub staff_personal_information: Option<StaffPersonalInformation>,
}

/// Personal details nested in the login payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaffPersonalInformation {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    // The API spells it this way
    #[serde(rename = "martialStatus")]
    pub marital_status: Option<String>,
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub staff_image: Option<String>,
}

/// Successful refresh payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialPasswordSetRequest {
    pub staff_code: String,
    pub default_password: String,
    pub new_password: String,
}

impl fmt::Debug for InitialPasswordSetRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialPasswordSetRequest")
            .field("staff_code", &self.staff_code)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetForgottenPasswordRequest {
    pub staff_code: String,
    pub temporary_password: String,
    pub new_password: String,
}

impl fmt::Debug for ResetForgottenPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResetForgottenPasswordRequest")
            .field("staff_code", &self.staff_code)
            .finish_non_exhaustive()
    }
}

/// `{ success, message }` payload of the password flows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub success: bool,
    pub message: Option<String>,
}
