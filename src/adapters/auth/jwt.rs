//! HMAC JWT implementation of the `TokenValidator` port.
//!
//! Tokens are issued by the account service with a shared secret. The user
//! id is read from `sub`, falling back to the legacy `id` claim.

use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use crate::domain::foundation::UserId;
use crate::ports::{AuthError, TokenValidator};

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,

    #[serde(default)]
    id: Option<String>,
}

/// Validates HS256/HS384/HS512 bearer tokens.
pub struct JwtTokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    pub fn new(secret: &Secret<String>, issuer: Option<&str>, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = leeway_secs;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => {
                tracing::debug!(error = %e, "Token validation failed");
                AuthError::InvalidToken
            }
        })?;

        let subject = data.claims.sub.or(data.claims.id).ok_or_else(|| {
            tracing::warn!("Token carries no user id claim");
            AuthError::InvalidToken
        })?;

        UserId::new(subject).map_err(|_| AuthError::InvalidToken)
    }
}

impl std::fmt::Debug for JwtTokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}
