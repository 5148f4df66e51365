//! Identity hook for persistent user references.
//!
//! VoteChaos does not run a login system. Clients claim a
//! `persistentUserRef` (the id their login provider gave them) and the
//! server asks an [`IdentityVerifier`] whether to trust the claim before
//! using it for host authorization, scoring and dashboard queries.

use std::future::Future;

use votechaos_protocol::UserRef;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity rejected: {0}")]
    Rejected(String),
}

/// Validates a claimed user reference.
///
/// # Example
///
/// ```rust
/// use votechaos::{IdentityError, IdentityVerifier};
/// use votechaos_protocol::UserRef;
///
/// /// Only accepts refs issued by one tenant.
/// struct TenantVerifier;
///
/// impl IdentityVerifier for TenantVerifier {
///     async fn verify(&self, claimed: &UserRef) -> Result<UserRef, IdentityError> {
///         if claimed.as_str().starts_with("acme:") {
///             Ok(claimed.clone())
///         } else {
///             Err(IdentityError::Rejected("unknown tenant".into()))
///         }
///     }
/// }
/// ```
pub trait IdentityVerifier: Send + Sync + 'static {
    /// Returns the verified user reference, which may be a canonical form of
    /// `claimed`.
    fn verify(
        &self,
        claimed: &UserRef,
    ) -> impl Future<Output = Result<UserRef, IdentityError>> + Send;
}

/// Accepts any non-blank reference as is. For development and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustingVerifier;

impl IdentityVerifier for TrustingVerifier {
    async fn verify(&self, claimed: &UserRef) -> Result<UserRef, IdentityError> {
        let trimmed = claimed.as_str().trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Rejected("user ref is blank".into()));
        }
        Ok(UserRef::new(trimmed))
    }
}
