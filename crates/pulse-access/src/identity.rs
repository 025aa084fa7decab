//! Requester identity resolution through a pluggable user directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Resolved requester profile. `id` is the opaque, platform-assigned user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

/// Raw profile as returned by an [`IdentityDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub display_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("identity '{0}' was not found")]
    NotFound(String),
    #[error("identity directory unreachable: {0}")]
    Unreachable(String),
}

/// External user directory, e.g. the chat platform's user profile API.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_profile(&self, id: &str) -> Result<Profile, LookupError>;
}

/// Resolves requester ids into [`Identity`] values. Nothing is cached: each
/// call is a fresh directory round trip.
#[derive(Clone)]
pub struct IdentityResolver {
    directory: Arc<dyn IdentityDirectory>,
}

impl IdentityResolver {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    pub async fn resolve(&self, id: &str) -> Result<Identity, LookupError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LookupError::NotFound(String::new()));
        }
        let profile = self.directory.get_profile(id).await?;
        Ok(Identity {
            id: id.to_string(),
            display_name: profile.display_name,
            email: profile
                .email
                .map(|email| email.trim().to_string())
                .filter(|email| !email.is_empty()),
        })
    }
}

/// In-memory directory for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityDirectory {
    profiles: BTreeMap<String, Profile>,
    unreachable: bool,
}

impl StaticIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory whose every lookup fails as unreachable.
    pub fn unreachable() -> Self {
        Self {
            profiles: BTreeMap::new(),
            unreachable: true,
        }
    }

    pub fn with_profile(mut self, id: &str, display_name: &str, email: Option<&str>) -> Self {
        self.profiles.insert(
            id.to_string(),
            Profile {
                display_name: display_name.to_string(),
                email: email.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn get_profile(&self, id: &str) -> Result<Profile, LookupError> {
        if self.unreachable {
            return Err(LookupError::Unreachable(
                "static directory configured as unreachable".to_string(),
            ));
        }
        self.profiles
            .get(id)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(id.to_string()))
    }
}
