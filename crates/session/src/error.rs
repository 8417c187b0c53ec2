use thiserror::Error;

/// Generic messages used when the server gives no usable one
pub mod fallback {
    pub const LOGIN_FAILED: &str = "Login failed. Please check your credentials and try again.";
    pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
    pub const RESET_PASSWORD_FAILED: &str = "Could not request a password reset. Please try again.";
    pub const INITIAL_PASSWORD_FAILED: &str = "Could not set your password. Please try again.";
    pub const RESET_FORGOTTEN_PASSWORD_FAILED: &str =
        "Could not reset your password. Please try again.";
}

/// Failures surfaced to the UI
///
/// Every variant displays as a message fit to show next to a form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials or reset codes were refused, or the server was unreachable
    #[error("{0}")]
    Rejected(String),

    /// The session could not be refreshed and has been ended
    #[error("{0}")]
    SessionExpired(String),

    /// The operation needs a signed-in user
    #[error("You are not signed in.")]
    NotAuthenticated,

    /// The session could not be persisted
    #[error("Could not save your session: {0}")]
    Storage(String),
}
