//! Layered access decisions: static overrides first, then the email table.

use std::sync::Arc;

use crate::{IdentityResolver, PermissionStore, StaticOverride};

/// A single authorization question.
///
/// `capability: None` asks whether the requester may run any non-admin
/// capability at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessQuery {
    pub requester_id: String,
    pub capability: Option<String>,
    pub require_admin: bool,
}

impl AccessQuery {
    pub fn capability(requester_id: &str, capability: &str) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            capability: Some(capability.to_string()),
            require_admin: false,
        }
    }

    pub fn any_capability(requester_id: &str) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            capability: None,
            require_admin: false,
        }
    }

    pub fn admin(requester_id: &str) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            capability: None,
            require_admin: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow { reason_code: String },
    Deny { reason_code: String },
}

impl AccessDecision {
    fn allow(reason_code: &str) -> Self {
        Self::Allow {
            reason_code: reason_code.to_string(),
        }
    }

    fn deny(reason_code: &str) -> Self {
        Self::Deny {
            reason_code: reason_code.to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn reason_code(&self) -> &str {
        match self {
            Self::Allow { reason_code } | Self::Deny { reason_code } => reason_code,
        }
    }
}

pub struct AccessController {
    store: Arc<PermissionStore>,
    resolver: IdentityResolver,
    overrides: StaticOverride,
    bootstrap_identity_id: Option<String>,
}

impl AccessController {
    pub fn new(
        store: Arc<PermissionStore>,
        resolver: IdentityResolver,
        overrides: StaticOverride,
    ) -> Self {
        Self {
            store,
            resolver,
            overrides,
            bootstrap_identity_id: None,
        }
    }

    /// Grants `id` access whenever its identity cannot produce an email.
    pub fn with_bootstrap_identity(mut self, id: Option<String>) -> Self {
        self.bootstrap_identity_id = id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self
    }

    pub fn permission_store(&self) -> &Arc<PermissionStore> {
        &self.store
    }

    pub fn identity_resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub async fn check(&self, query: &AccessQuery) -> bool {
        self.decide(query).await.is_allowed()
    }

    pub async fn decide(&self, query: &AccessQuery) -> AccessDecision {
        let decision = self.evaluate(query).await;
        let capability = query.capability.as_deref().unwrap_or("*");
        if decision.is_allowed() {
            tracing::debug!(
                requester = %query.requester_id,
                capability,
                require_admin = query.require_admin,
                reason_code = decision.reason_code(),
                "access allowed"
            );
        } else {
            tracing::info!(
                requester = %query.requester_id,
                capability,
                require_admin = query.require_admin,
                reason_code = decision.reason_code(),
                "access denied"
            );
        }
        decision
    }

    async fn evaluate(&self, query: &AccessQuery) -> AccessDecision {
        let requester_id = query.requester_id.trim();
        if requester_id.is_empty() {
            return AccessDecision::deny("deny_requester_missing");
        }
        let capability = query.capability.as_deref().map(str::trim);
        if capability.is_some_and(str::is_empty) {
            return AccessDecision::deny("deny_capability_blank");
        }

        if query.require_admin && self.overrides.is_admin(requester_id) {
            return AccessDecision::allow("allow_static_admin");
        }
        if let Some(capability) = capability {
            if self.overrides.grants(capability, requester_id) {
                return AccessDecision::allow("allow_static_capability");
            }
        }

        let email = match self.resolver.resolve(requester_id).await {
            Ok(identity) => identity.email,
            Err(error) => {
                tracing::warn!(
                    requester = requester_id,
                    error = %error,
                    "identity lookup failed during access check"
                );
                None
            }
        };
        let Some(email) = email else {
            if self.is_bootstrap_identity(requester_id) {
                return AccessDecision::allow("allow_bootstrap_identity");
            }
            return AccessDecision::deny("deny_email_unresolved");
        };

        let table = self.store.current();
        if query.require_admin {
            return if table.is_admin(&email) {
                AccessDecision::allow("allow_table_admin")
            } else {
                AccessDecision::deny("deny_not_admin")
            };
        }
        match capability {
            None if table.grants_any_capability(&email) => {
                AccessDecision::allow("allow_table_any_capability")
            }
            None => AccessDecision::deny("deny_no_capability"),
            Some(capability) if table.grants(capability, &email) => {
                AccessDecision::allow("allow_table_capability")
            }
            Some(_) => AccessDecision::deny("deny_not_in_table"),
        }
    }

    fn is_bootstrap_identity(&self, requester_id: &str) -> bool {
        self.bootstrap_identity_id.as_deref() == Some(requester_id)
    }
}
