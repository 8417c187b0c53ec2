//! Durable client-side session storage
//!
//! The session is persisted as string entries: the raw access token under
//! [`TOKEN_KEY`], the JSON-encoded staff profile under [`USER_KEY`], and the
//! server's cookies (the refresh credential) under [`COOKIES_KEY`].

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tellerdesk_http::TokenSource;
use thiserror::Error;

/// Key of the persisted access token
pub const TOKEN_KEY: &str = "token";

/// Key of the persisted profile record
pub const USER_KEY: &str = "user";

/// Key of the persisted cookie jar
pub const COOKIES_KEY: &str = "cookies";

/// Every key belonging to one session; written and cleared together
pub const SESSION_KEYS: [&str; 3] = [USER_KEY, TOKEN_KEY, COOKIES_KEY];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// String key/value store that survives restarts
pub trait SessionStorage: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON object file
///
/// Every mutation rewrites the whole file through a temporary sibling and a
/// rename, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        write_private(&tmp, &serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if mutate(&mut entries) {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    std::fs::write(path, contents)
}

impl SessionStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

/// Feeds the stored access token to the HTTP client's bearer decorator
#[derive(Debug, Clone)]
pub struct StorageTokenSource {
    storage: Arc<dyn SessionStorage>,
}

impl StorageTokenSource {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }
}

impl TokenSource for StorageTokenSource {
    fn access_token(&self) -> Option<String> {
        match self.storage.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read access token from storage");
                None
            }
        }
    }
}

/// One `Set-Cookie` line and the response URL it arrived with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCookie {
    host: String,
    name: String,
    url: String,
    set_cookie: String,
}

/// Cookie store kept in [`SessionStorage`] next to the token
///
/// The refresh credential arrives as an HTTP-only cookie, so it has to be
/// persisted with the session for a later process to refresh. Domain, path
/// and expiry matching are left to reqwest's [`Jar`], rebuilt on every lookup.
#[derive(Debug, Clone)]
pub struct StorageCookieJar {
    storage: Arc<dyn SessionStorage>,
}

impl StorageCookieJar {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    fn load(&self) -> Vec<StoredCookie> {
        match self.storage.get(COOKIES_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Stored cookies are unreadable, ignoring them");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored cookies");
                Vec::new()
            }
        }
    }
}

fn cookie_name(set_cookie: &str) -> Option<&str> {
    let (name, _) = set_cookie.split(';').next()?.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

impl CookieStore for StorageCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let host = url.host_str().unwrap_or_default();
        let mut stored = self.load();
        let mut changed = false;

        for header in cookie_headers {
            let Some((set_cookie, name)) = header
                .to_str()
                .ok()
                .and_then(|value| Some((value, cookie_name(value)?)))
            else {
                continue;
            };

            stored.retain(|cookie| cookie.host != host || cookie.name != name);
            stored.push(StoredCookie {
                host: host.to_string(),
                name: name.to_string(),
                url: url.to_string(),
                set_cookie: set_cookie.to_string(),
            });
            changed = true;
        }

        if !changed {
            return;
        }
        let saved = serde_json::to_string(&stored)
            .map_err(StorageError::from)
            .and_then(|raw| self.storage.set(COOKIES_KEY, &raw));
        if let Err(e) = saved {
            tracing::warn!(error = %e, "Failed to persist cookies");
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let stored = self.load();
        if stored.is_empty() {
            return None;
        }

        let jar = Jar::default();
        for cookie in &stored {
            if let Ok(origin) = Url::parse(&cookie.url) {
                jar.add_cookie_str(&cookie.set_cookie, &origin);
            }
        }
        jar.cookies(url)
    }
}
