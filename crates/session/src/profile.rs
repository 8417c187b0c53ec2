//! The signed-in staff member

use serde::{Deserialize, Serialize};
use std::fmt;
use tellerdesk_http::types::LoginResponse;

/// Flattened profile persisted next to the access token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffProfile {
    pub staff_code: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_password_set: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub position_code: Option<String>,
    #[serde(default)]
    pub department_code: Option<String>,
    #[serde(default)]
    pub branch_code: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub marital_status: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub staff_image: Option<String>,
}

impl StaffProfile {
    /// Flatten a login payload, personal details included
    pub fn from_login(response: &LoginResponse) -> Self {
        let info = response
            .staff_personal_information
            .clone()
            .unwrap_or_default();

        Self {
            staff_code: response.staff_code.clone(),
            role: response.role.clone(),
            is_password_set: response.is_password_set,
            email: response.email.clone().or(info.email),
            position_code: response.position_code.clone(),
            department_code: response.department_code.clone(),
            branch_code: response.branch_code.clone(),
            first_name: info.first_name,
            last_name: info.last_name,
            gender: info.gender,
            marital_status: info.marital_status,
            date_of_birth: info.date_of_birth,
            address: info.address,
            phone: info.phone,
            staff_image: info.staff_image,
        }
    }

    /// "First Last", falling back to the staff code
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.staff_code.clone()
        } else {
            name
        }
    }
}

/// Authenticated identity: the access token plus the profile it belongs to
#[derive(Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub token: String,
    pub profile: StaffProfile,
}

impl CurrentUser {
    pub fn staff_code(&self) -> &str {
        &self.profile.staff_code
    }

    pub fn role(&self) -> Option<&str> {
        self.profile.role.as_deref()
    }

    /// Whether the staff member still has to replace their default password
    pub const fn needs_password_setup(&self) -> bool {
        !self.profile.is_password_set
    }
}

impl fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentUser")
            .field("token", &"<redacted>")
            .field("profile", &self.profile)
            .finish()
    }
}
