//! Authentication descriptors and credential resolution

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Message returned whenever a request carries no usable authentication
pub const NO_AUTH_FOUND: &str = "no auth found";

/// BMC address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host {
    pub host: String,
}

impl Host {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

/// Inline credentials supplied by the caller
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectAuthn {
    pub host: Host,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for DirectAuthn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectAuthn")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Reference to credentials held by a [`CredentialStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuthn {
    pub host: Host,
}

/// Authentication descriptor attached to a request
///
/// Exactly one variant is populated. A variant whose payload is `None`
/// is treated the same as no descriptor at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authn {
    DirectAuthn(Option<DirectAuthn>),
    StoredAuthn(Option<StoredAuthn>),
}

impl Authn {
    pub fn direct(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Authn::DirectAuthn(Some(DirectAuthn {
            host: Host::new(host),
            username: username.into(),
            password: password.into(),
        }))
    }

    pub fn stored(host: impl Into<String>) -> Self {
        Authn::StoredAuthn(Some(StoredAuthn {
            host: Host::new(host),
        }))
    }
}

/// Username and password for a BMC session
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Host and credentials extracted from a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAuth {
    pub host: String,
    pub credentials: Credentials,
}

/// Extract host, username and password from an inline descriptor
///
/// Fields are returned verbatim; empty usernames or passwords are not
/// rejected here. Anything other than a populated `DirectAuthn` yields
/// `Unauthenticated` with the message [`NO_AUTH_FOUND`].
pub fn parse_auth(authn: Option<&Authn>) -> Result<ResolvedAuth> {
    match authn {
        Some(Authn::DirectAuthn(Some(direct))) => Ok(ResolvedAuth {
            host: direct.host.host.clone(),
            credentials: Credentials::new(direct.username.clone(), direct.password.clone()),
        }),
        _ => Err(Error::unauthenticated(NO_AUTH_FOUND)),
    }
}

/// Lookup of stored BMC credentials keyed by host
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Option<Credentials>>;
}

/// One entry of a credentials file
#[derive(Clone, Deserialize)]
pub struct CredentialEntry {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// In-memory credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: HashMap<String, Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CredentialEntry>) -> Self {
        let mut store = Self::new();
        for entry in entries {
            store.insert(entry.host, Credentials::new(entry.username, entry.password));
        }
        store
    }

    pub fn insert(&mut self, host: impl Into<String>, credentials: Credentials) {
        self.entries.insert(host.into(), credentials);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn lookup(&self, host: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.get(host).cloned())
    }
}

/// Resolves a request's descriptor into usable credentials
///
/// Inline credentials go through [`parse_auth`]; stored references are
/// looked up in the configured store.
#[derive(Clone, Default)]
pub struct AuthResolver {
    store: Option<Arc<dyn CredentialStore>>,
}

impl AuthResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn resolve(&self, authn: Option<&Authn>) -> Result<ResolvedAuth> {
        let host = match authn {
            Some(Authn::StoredAuthn(Some(stored))) => &stored.host.host,
            other => return parse_auth(other),
        };

        let store = self
            .store
            .as_ref()
            .ok_or_else(|| Error::unauthenticated("no credential store configured"))?;

        let credentials = store.lookup(host).await?.ok_or_else(|| {
            Error::unauthenticated(format!("no stored credentials for host {}", host))
        })?;

        Ok(ResolvedAuth {
            host: host.clone(),
            credentials,
        })
    }
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("store", &self.store.is_some())
            .finish()
    }
}
