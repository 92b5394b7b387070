//! Identity provider seam
//!
//! The engine never owns credentials; the host application constructs an
//! identity source and injects it. `AuthContext` is the plain default:
//! explicitly constructed, shareable, no global state, so tests can run
//! several independent sessions.

use std::sync::{Arc, RwLock};

use crate::types::UserIdentity;

/// Read access to the caller's credentials and identity.
///
/// The bearer token is read once per handshake; changing it while connected
/// takes effect only after the session is torn down and re-established.
pub trait IdentityProvider: Send + Sync {
    fn token(&self) -> Option<String>;
    fn current_user(&self) -> Option<UserIdentity>;

    fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

#[derive(Debug, Default)]
struct AuthState {
    token: Option<String>,
    user: Option<UserIdentity>,
}

/// Default injectable identity source
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    state: Arc<RwLock<AuthState>>,
}

impl AuthContext {
    /// Anonymous context: no token, no identity
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Authenticated context
    pub fn authenticated(token: impl Into<String>, user: UserIdentity) -> Self {
        let ctx = Self::default();
        ctx.set_token(Some(token.into()));
        ctx.set_user(Some(user));
        ctx
    }

    pub fn set_token(&self, token: Option<String>) {
        self.state.write().expect("auth state poisoned").token = token;
    }

    pub fn set_user(&self, user: Option<UserIdentity>) {
        self.state.write().expect("auth state poisoned").user = user;
    }

    /// Drop both token and identity
    pub fn clear(&self) {
        let mut state = self.state.write().expect("auth state poisoned");
        state.token = None;
        state.user = None;
    }
}

impl IdentityProvider for AuthContext {
    fn token(&self) -> Option<String> {
        self.state.read().expect("auth state poisoned").token.clone()
    }

    fn current_user(&self) -> Option<UserIdentity> {
        self.state.read().expect("auth state poisoned").user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_context() {
        let ctx = AuthContext::anonymous();
        assert!(!ctx.is_authenticated());
        assert!(ctx.token().is_none());
        assert!(ctx.current_user().is_none());
    }

    #[test]
    fn test_authenticated_context() {
        let ctx = AuthContext::authenticated(
            "tok",
            UserIdentity {
                nickname: Some("ada".to_string()),
                email: Some("ada@example.com".to_string()),
            },
        );
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_clear() {
        let ctx = AuthContext::authenticated("tok", UserIdentity::default());
        ctx.clear();
        assert!(!ctx.is_authenticated());
        assert!(ctx.current_user().is_none());
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = AuthContext::authenticated("a", UserIdentity::default());
        let b = AuthContext::anonymous();
        assert!(a.is_authenticated());
        assert!(!b.is_authenticated());
    }
}
