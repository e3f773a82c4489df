//! Caller identity and the pure authorization policy check.

use thiserror::Error;

use signalbox_core::PrincipalId;

/// A named permission (e.g. `"accounts.index"`). `"*"` grants everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn wildcard() -> Self {
        Self("*".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == "*"
    }
}

/// A resolved caller identity for authorization decisions.
///
/// Construction is decoupled from storage and transport: the hosting process
/// derives permissions from its own claims/policy source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(principal_id: PrincipalId, permissions: Vec<Permission>) -> Self {
        Self {
            principal_id,
            permissions,
        }
    }

    /// An all-permission principal for trusted internal callers.
    pub fn system() -> Self {
        Self::new(PrincipalId::new(), vec![Permission::wildcard()])
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal against a required permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_permission_grants() {
        let principal = Principal::new(
            PrincipalId::new(),
            vec![Permission::new("accounts.index")],
        );
        assert!(authorize(&principal, &Permission::new("accounts.index")).is_ok());
    }

    #[test]
    fn wildcard_grants_everything() {
        let principal = Principal::system();
        assert!(authorize(&principal, &Permission::new("anything.at.all")).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let principal = Principal::new(PrincipalId::new(), vec![]);
        let err = authorize(&principal, &Permission::new("accounts.index")).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("accounts.index".to_string()));
    }
}
