//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tellerdesk_core::ClientSettings;
use tellerdesk_http::ApiClient;
use tellerdesk_session::{
    ExpiryMonitor, ExpiryStatus, FileStorage, SessionEvent, SessionManager, SessionStorage,
    StorageCookieJar, StorageTokenSource,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with an email address or staff code
    Login {
        /// Email address or staff code
        identifier: String,

        /// Password (prompted for when omitted)
        #[arg(long, env = "TELLERDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show the signed-in staff member and token expiry
    Status,

    /// Exchange the refresh cookie for a new access token
    Refresh,

    /// Keep the session alive, warning before the token expires
    ///
    /// Type `r` to refresh now, `c` to hide the warning, `q` to quit.
    Watch,

    /// Ask for a password reset message
    ResetPassword {
        /// Email address on the staff record
        email: String,
    },

    /// Replace the default password of a new account
    InitialPasswordSet {
        /// Staff code of the account
        staff_code: String,

        /// Default password issued with the account
        #[arg(long)]
        default_password: Option<String>,

        /// New password
        #[arg(long)]
        new_password: Option<String>,
    },

    /// Finish a password reset with the temporary password
    ResetForgottenPassword {
        /// Staff code of the account
        staff_code: String,

        /// Temporary password from the reset message
        #[arg(long)]
        temporary_password: Option<String>,

        /// New password
        #[arg(long)]
        new_password: Option<String>,
    },

    /// Generate a default settings file
    Config {
        /// Output file path (defaults to <data-dir>/tellerdesk.json)
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub async fn execute(self, settings: ClientSettings) -> Result<()> {
        let command = match self {
            Self::Config { output } => {
                return generate_config(output, &settings);
            }
            command => command,
        };

        let session = open_session(&settings)?;

        match command {
            Self::Login {
                identifier,
                password,
            } => {
                let password = match password {
                    Some(password) => password,
                    None => prompt("Password")?,
                };
                let user = session.login(&identifier, &password).await?;
                println!("Signed in as {} ({})", user.profile.display_name(), user.staff_code());
                if user.needs_password_setup() {
                    println!(
                        "Your password has not been set yet. Run `tellerdesk initial-password-set {}`.",
                        user.staff_code()
                    );
                }
                Ok(())
            }
            Self::Logout => {
                if !session.is_authenticated() {
                    println!("Not signed in");
                    return Ok(());
                }
                session.logout().await;
                println!("Signed out");
                Ok(())
            }
            Self::Status => {
                print_status(&session);
                Ok(())
            }
            Self::Refresh => match session.refresh().await? {
                Some(_) => {
                    println!("Access token refreshed");
                    print_status(&session);
                    Ok(())
                }
                None => bail!("A refresh is already in progress"),
            },
            Self::Watch => watch(Arc::new(session)).await,
            Self::ResetPassword { email } => {
                let response = session.reset_password(&email).await?;
                println!(
                    "{}",
                    response
                        .message
                        .unwrap_or_else(|| "Password reset requested".to_string())
                );
                Ok(())
            }
            Self::InitialPasswordSet {
                staff_code,
                default_password,
                new_password,
            } => {
                let default_password = or_prompt(default_password, "Default password")?;
                let new_password = or_prompt(new_password, "New password")?;
                session
                    .initial_password_set(&staff_code, &default_password, &new_password)
                    .await?;
                println!("Password set. You can now sign in with the new password.");
                Ok(())
            }
            Self::ResetForgottenPassword {
                staff_code,
                temporary_password,
                new_password,
            } => {
                let temporary_password = or_prompt(temporary_password, "Temporary password")?;
                let new_password = or_prompt(new_password, "New password")?;
                let response = session
                    .reset_forgotten_password(&staff_code, &temporary_password, &new_password)
                    .await?;
                println!(
                    "{}",
                    response
                        .message
                        .unwrap_or_else(|| "Password changed".to_string())
                );
                Ok(())
            }
            Self::Config { .. } => Ok(()),
        }
    }
}

/// Wire the file-backed storage and cookie jar, the bearer-instrumented client and the manager
fn open_session(settings: &ClientSettings) -> Result<SessionManager> {
    let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new(settings.session_file()));

    let client = ApiClient::builder()
        .base_url(&settings.api_root)
        .timeout(settings.request_timeout())
        .token_source(Arc::new(StorageTokenSource::new(storage.clone())))
        .cookie_store(Arc::new(StorageCookieJar::new(storage.clone())))
        .build()
        .context("Failed to build API client")?;

    Ok(SessionManager::builder(Arc::new(client), storage)
        .settings(settings.session.clone())
        .build())
}

fn generate_config(output: Option<PathBuf>, settings: &ClientSettings) -> Result<()> {
    let path = output.unwrap_or_else(|| settings.data_dir.join("tellerdesk.json"));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    config::generate_default_config(&path)?;
    println!("Generated settings at: {}", path.display());
    Ok(())
}

fn print_status(session: &SessionManager) {
    let Some(user) = session.current_user() else {
        println!("Not signed in");
        return;
    };

    println!("Signed in as {} ({})", user.profile.display_name(), user.staff_code());
    if let Some(role) = user.role() {
        println!("Role:   {role}");
    }
    if let Some(branch) = &user.profile.branch_code {
        println!("Branch: {branch}");
    }

    match session.expiry_status() {
        ExpiryStatus::Valid { remaining } => {
            println!("Token:  valid for {}", format_remaining(remaining));
        }
        ExpiryStatus::ExpiringSoon { remaining } => {
            println!("Token:  expires in {}", format_remaining(remaining));
        }
        ExpiryStatus::Expired => println!("Token:  expired"),
        ExpiryStatus::Unknown => println!("Token:  expiry unknown"),
    }
}

fn format_remaining(remaining: std::time::Duration) -> String {
    let secs = remaining.as_secs();
    match (secs / 3600, (secs % 3600) / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s}s"),
        (h, m, _) => format!("{h}h {m}m"),
    }
}

async fn watch(session: Arc<SessionManager>) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not signed in");
    }

    let mut events = session.subscribe();
    let monitor = ExpiryMonitor::start(session.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    println!("Watching session. Type r to refresh, c to hide the warning, q to quit.");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::WarningShown { remaining }) => {
                    println!(
                        "Your session expires in {}. [r] Refresh  [c] Cancel",
                        format_remaining(remaining)
                    );
                }
                Ok(SessionEvent::WarningHidden) => {}
                Ok(SessionEvent::Refreshed) => println!("Session refreshed"),
                Ok(SessionEvent::RefreshFailed { message }) => println!("{message}"),
                Ok(SessionEvent::LoggedOut { .. }) => {
                    println!("Signed out");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match line.trim() {
                    "r" => {
                        // Failures arrive as events
                        let _ = session.accept_warning().await;
                    }
                    "c" => session.dismiss_warning(),
                    "q" => break,
                    "" => {}
                    other => println!("Unknown input `{other}`"),
                },
                None => stdin_open = false,
            },
        }
    }

    monitor.shutdown().await;
    Ok(())
}

fn or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("{label} is required");
    }
    Ok(value)
}
