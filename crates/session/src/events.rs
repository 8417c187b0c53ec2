//! Notifications published by the session manager

use std::time::Duration;

/// Where the application should take the user next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Authenticated landing area
    Dashboard,
    /// Unauthenticated landing page with the login form
    Login,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { staff_code: String },
    /// `forced` is set when the session ended without telling the server
    LoggedOut { forced: bool },
    /// The expiry banner should be shown
    WarningShown { remaining: Duration },
    WarningHidden,
    Refreshed,
    RefreshFailed { message: String },
    Navigate(Route),
}
