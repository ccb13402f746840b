//! Bearer token validation.
//!
//! JWT issuance is out of scope — this crate only
//! consumes token validity and revocation state. `TokenValidator` is the
//! seam a real deployment plugs its identity provider into.

use crate::error::{Result, ServerError};
use async_trait::async_trait;
use sync_core::{OrgId, UserId};

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub org_id: OrgId,
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, bearer_token: &str) -> Result<AuthContext>;
}

/// Presence-only validator: accepts any non-empty bearer token and derives
/// the user/org from it verbatim. Stands in for a real JWT/OIDC validator
/// until one is wired in.
pub struct StubTokenValidator;

#[async_trait]
impl TokenValidator for StubTokenValidator {
    async fn validate(&self, bearer_token: &str) -> Result<AuthContext> {
        if bearer_token.trim().is_empty() {
            return Err(ServerError::Unauthorized("missing bearer token".into()));
        }
        // token shape: "<user_id>:<org_id>" in the stub implementation.
        let (user, org) = bearer_token
            .split_once(':')
            .ok_or_else(|| ServerError::Unauthorized("malformed stub token".into()))?;
        Ok(AuthContext {
            user_id: UserId::new(user),
            org_id: OrgId::new(org),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_validator_rejects_empty_token() {
        let result = StubTokenValidator.validate("").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stub_validator_parses_user_and_org() {
        let ctx = StubTokenValidator.validate("user-1:org-1").await.unwrap();
        assert_eq!(ctx.user_id.as_str(), "user-1");
        assert_eq!(ctx.org_id.as_str(), "org-1");
    }
}
