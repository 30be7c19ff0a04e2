//! Bearer credential resolution
//!
//! Sources are consulted in a fixed order and the first one that yields a
//! value wins:
//!
//! 1. the caller's session context (live, authoritative)
//! 2. the ambient cookie store
//! 3. the persistent key-value store
//!
//! Cookie and store values can outlive a logout/login cycle in the same
//! session, so they never override a context credential. Failures in any
//! source are logged and treated as "nothing found".

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// Where a credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialSource {
    Context,
    Cookie,
    PersistentStore,
}

/// A bearer credential
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl Credential {
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    /// Credential held by the in-memory session
    pub fn from_context(value: impl Into<String>) -> Self {
        Self::new(value, CredentialSource::Context)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Ambient cookie store
pub trait CookieSource: Send + Sync {
    /// Raw `name=value; name2=value2` cookie string, if any.
    fn cookie_string(&self) -> Option<String>;
}

/// Fixed cookie string
#[derive(Debug, Clone, Default)]
pub struct StaticCookies(pub Option<String>);

impl StaticCookies {
    pub fn new(cookies: impl Into<String>) -> Self {
        Self(Some(cookies.into()))
    }
}

impl CookieSource for StaticCookies {
    fn cookie_string(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Persistent local key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON object on disk, one key per entry
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| SyncError::Store(format!("{}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| SyncError::Store(format!("{}: {}", self.path.display(), e)))
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::Store(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .map_err(|e| SyncError::Store(format!("{}: {}", self.path.display(), e)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

/// Resolves the credential to present on a request
///
/// Nothing is cached: every call re-reads its sources.
#[derive(Clone)]
pub struct CredentialResolver {
    cookie_name: String,
    csrf_cookie_name: String,
    store_key: String,
    cookies: Option<Arc<dyn CookieSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl CredentialResolver {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            cookie_name: config.credential_cookie.clone(),
            csrf_cookie_name: config.csrf_cookie.clone(),
            store_key: config.credential_store_key.clone(),
            cookies: None,
            store: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Arc<dyn CookieSource>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Resolve a credential, preferring the one supplied by the session context.
    pub fn resolve(&self, context_credential: Option<&Credential>) -> Option<Credential> {
        if let Some(credential) = context_credential.filter(|c| !c.value().is_empty()) {
            return Some(credential.clone());
        }

        if let Some(value) = self.from_cookies() {
            debug!("Credential resolved from cookie");
            return Some(Credential::new(value, CredentialSource::Cookie));
        }

        if let Some(value) = self.from_store() {
            debug!("Credential resolved from persistent store");
            return Some(Credential::new(value, CredentialSource::PersistentStore));
        }

        None
    }

    /// CSRF token from the cookie store, if one is set.
    pub fn csrf_token(&self) -> Option<String> {
        let cookies = self.cookies.as_ref()?.cookie_string()?;
        read_cookie(&cookies, &self.csrf_cookie_name)
    }

    fn from_cookies(&self) -> Option<String> {
        let cookies = self.cookies.as_ref()?.cookie_string()?;
        let raw = read_cookie(&cookies, &self.cookie_name)?;
        token_from_cookie_value(&raw)
    }

    fn from_store(&self) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(&self.store_key) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read credential from persistent store");
                None
            }
        }
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("cookie_name", &self.cookie_name)
            .field("store_key", &self.store_key)
            .field("has_cookies", &self.cookies.is_some())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

/// Read a cookie value by name.
///
/// Tries a direct match on `name=` at a cookie boundary first, then a
/// split-and-scan pass that tolerates stray whitespace and empty segments.
pub fn read_cookie(cookies: &str, name: &str) -> Option<String> {
    direct_match(cookies, name)
        .or_else(|| split_scan(cookies, name))
        .filter(|v| !v.is_empty())
}

fn direct_match(cookies: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let mut offset = 0;
    while let Some(pos) = cookies[offset..].find(&needle) {
        let start = offset + pos;
        let at_boundary = start == 0
            || cookies[..start]
                .trim_end_matches(' ')
                .ends_with(';');
        if at_boundary {
            let value_start = start + needle.len();
            let rest = &cookies[value_start..];
            let value = rest.split(';').next().unwrap_or_default();
            return Some(value.trim().to_string());
        }
        offset = start + needle.len();
    }
    None
}

fn split_scan(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
}

#[derive(Deserialize)]
struct StructuredToken {
    #[serde(alias = "access_token", alias = "accessToken")]
    token: String,
}

/// Extract the bearer value from a raw cookie value.
///
/// Values may be percent-encoded and may carry a JSON object with a
/// `token`/`access_token` field.
fn token_from_cookie_value(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    let decoded = decoded.trim().trim_matches('"');

    if decoded.starts_with('{') {
        return match serde_json::from_str::<StructuredToken>(decoded) {
            Ok(structured) if !structured.token.is_empty() => Some(structured.token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Credential cookie is not a valid token object");
                None
            }
        };
    }

    let decoded = decoded.strip_prefix("Bearer ").unwrap_or(decoded);
    (!decoded.is_empty()).then(|| decoded.to_string())
}
