//! Authentication configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;

use super::error::ValidationError;
use super::server::Environment;

/// Bearer token settings (HS256 JWTs issued by the account service).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC key used to verify token signatures
    pub jwt_secret: Secret<String>,

    /// Expected `iss` claim, if tokens carry one
    #[serde(default)]
    pub issuer: Option<String>,

    /// Clock skew tolerated on `exp`, in seconds
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

impl AuthConfig {
    /// Validate authentication configuration
    ///
    /// Production requires a secret of at least 32 bytes.
    pub fn validate(&self, environment: &Environment) -> Result<(), ValidationError> {
        let secret = self.jwt_secret.expose_secret();
        if secret.is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        if *environment == Environment::Production && secret.len() < 32 {
            return Err(ValidationError::WeakJwtSecret);
        }
        Ok(())
    }
}

fn default_leeway() -> u64 {
    30
}
