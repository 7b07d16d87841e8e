//! Role registry and scope guards.
//!
//! Scopes have the shape `resource:action`. Resources are ASCII
//! alphanumerics, `-` and `_`; actions additionally allow `*`. Matching is
//! exact: a role holding `meetings:*` does not satisfy `meetings:read`.

use crate::authn::types::Claims;
use crate::errors::AaaError;
use parking_lot::RwLock;
use std::collections::HashMap;

// =============================================================================
// Scopes and roles
// =============================================================================

/// Check that `scope` is a well-formed `resource:action` string.
///
/// # Errors
///
/// `AaaError::Configuration` naming the offending scope.
pub fn validate_scope(scope: &str) -> Result<(), AaaError> {
    let valid = scope.split_once(':').is_some_and(|(resource, action)| {
        !resource.is_empty()
            && !action.is_empty()
            && resource.chars().all(is_scope_char)
            && action.chars().all(|c| is_scope_char(c) || c == '*')
    });

    if valid {
        Ok(())
    } else {
        Err(AaaError::Configuration(format!(
            "Invalid scope '{scope}': expected 'resource:action'"
        )))
    }
}

fn is_scope_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// A named set of scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    name: String,
    scopes: Vec<String>,
}

impl Role {
    /// # Errors
    ///
    /// `AaaError::Configuration` for a blank name or a malformed scope.
    pub fn new<I, S>(name: impl Into<String>, scopes: I) -> Result<Self, AaaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AaaError::Configuration("Role name must not be empty".to_string()));
        }

        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        for scope in &scopes {
            validate_scope(scope)?;
        }

        Ok(Self { name, scopes })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

// =============================================================================
// Enforcer
// =============================================================================

/// Thread-safe role registry.
#[derive(Debug, Default)]
pub struct RbacEnforcer {
    roles: RwLock<HashMap<String, Role>>,
}

impl RbacEnforcer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `role`.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` if a role with the same name exists.
    pub fn register_role(&self, role: Role) -> Result<(), AaaError> {
        let mut roles = self.roles.write();
        if roles.contains_key(role.name()) {
            return Err(AaaError::Configuration(format!(
                "Role '{}' is already registered",
                role.name()
            )));
        }

        tracing::debug!(target: "aaa.authz.rbac", role = %role.name(), scopes = role.scopes.len(), "Role registered");
        roles.insert(role.name.clone(), role);
        Ok(())
    }

    /// Scopes granted by `role`.
    ///
    /// # Errors
    ///
    /// `AaaError::Configuration` if the role is not registered.
    pub fn role_scopes(&self, role: &str) -> Result<Vec<String>, AaaError> {
        self.roles
            .read()
            .get(role)
            .map(|r| r.scopes.clone())
            .ok_or_else(|| AaaError::Configuration(format!("Role '{role}' is not registered")))
    }

    /// False for unknown roles.
    #[must_use]
    pub fn has_scope(&self, role: &str, scope: &str) -> bool {
        self.with_role(role, |r| r.scopes.iter().any(|s| s == scope))
    }

    /// False for unknown roles and for an empty candidate list.
    #[must_use]
    pub fn has_any_scope(&self, role: &str, scopes: &[&str]) -> bool {
        self.with_role(role, |r| scopes.iter().any(|want| r.scopes.iter().any(|s| s == want)))
    }

    /// False for unknown roles; true for an empty requirement list on a
    /// known role.
    #[must_use]
    pub fn has_all_scopes(&self, role: &str, scopes: &[&str]) -> bool {
        self.with_role(role, |r| scopes.iter().all(|want| r.scopes.iter().any(|s| s == want)))
    }

    /// Token scopes followed by scopes granted through the token's
    /// registered roles, without duplicates. Unregistered roles grant nothing.
    #[must_use]
    pub fn effective_scopes(&self, claims: &Claims) -> Vec<String> {
        let roles = self.roles.read();
        let granted = claims
            .roles
            .iter()
            .filter_map(|name| roles.get(name))
            .flat_map(|role| role.scopes.iter());

        let mut scopes: Vec<String> = Vec::new();
        for scope in claims.scope.iter().chain(granted) {
            if !scopes.contains(scope) {
                scopes.push(scope.clone());
            }
        }
        scopes
    }

    fn with_role(&self, role: &str, check: impl FnOnce(&Role) -> bool) -> bool {
        self.roles.read().get(role).is_some_and(check)
    }
}

// =============================================================================
// Claims guards
// =============================================================================

/// # Errors
///
/// `AaaError::InsufficientScope` if the token lacks `scope`.
pub fn require_scope(claims: &Claims, scope: &str) -> Result<(), AaaError> {
    if claims.has_scope(scope) {
        Ok(())
    } else {
        Err(insufficient(claims, scope.to_string()))
    }
}

/// # Errors
///
/// `AaaError::InsufficientScope` if the token holds none of `scopes`.
pub fn require_any_scope(claims: &Claims, scopes: &[&str]) -> Result<(), AaaError> {
    if scopes.iter().any(|s| claims.has_scope(s)) {
        Ok(())
    } else {
        Err(insufficient(claims, scopes.join(" | ")))
    }
}

/// # Errors
///
/// `AaaError::InsufficientScope` naming the scopes the token lacks.
pub fn require_all_scopes(claims: &Claims, scopes: &[&str]) -> Result<(), AaaError> {
    let missing: Vec<&str> = scopes
        .iter()
        .copied()
        .filter(|s| !claims.has_scope(s))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(insufficient(claims, missing.join(" ")))
    }
}

/// # Errors
///
/// `AaaError::MissingRole` if the token does not carry `role`.
pub fn require_role(claims: &Claims, role: &str) -> Result<(), AaaError> {
    if claims.has_role(role) {
        Ok(())
    } else {
        tracing::debug!(target: "aaa.authz.rbac", required = %role, "Missing role");
        Err(AaaError::MissingRole(role.to_string()))
    }
}

fn insufficient(claims: &Claims, required: String) -> AaaError {
    tracing::debug!(target: "aaa.authz.rbac", required = %required, "Insufficient scope");
    AaaError::InsufficientScope {
        required,
        provided: claims.scope.clone(),
    }
}
