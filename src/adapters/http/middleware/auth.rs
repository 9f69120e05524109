//! Authentication middleware and extractors for axum.
//!
//! - `auth_middleware` - validates a bearer token and injects the user id
//! - `RequireAuth` - extractor that requires an authenticated user
//! - `OptionalAuth` - extractor for routes that also accept other identity
//!
//! Browsers cannot set headers on a WebSocket handshake, so the token is
//! also accepted as a `token` query parameter. The header wins when both
//! are present.
//!
//! ```text
//! Request → auth_middleware → injects UserId into extensions
//!                                      ↓
//!                              Handler → RequireAuth reads it back
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::foundation::UserId;
use crate::ports::{AuthError, TokenValidator};

/// Auth middleware state - wraps the token validator.
pub type AuthState = Arc<dyn TokenValidator>;

/// Validates the bearer token, if any, and injects the user id.
///
/// A missing token passes through untouched; handlers decide with
/// [`RequireAuth`] or [`OptionalAuth`]. A present but invalid token is
/// rejected with 401.
pub async fn auth_middleware(State(validator): State<AuthState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(&request) else {
        return next.run(request).await;
    };

    match validator.validate(&token).await {
        Ok(user_id) => {
            request.extensions_mut().insert(user_id);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected bearer token");
            let message = match e {
                AuthError::TokenExpired => "Token expired",
                AuthError::InvalidToken => "Invalid token",
                AuthError::MissingToken => "Authentication failed",
            };
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": message,
                    "code": "AUTH_ERROR"
                })),
            )
                .into_response()
        }
    }
}

fn bearer_token(request: &Request) -> Option<String> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));
    if let Some(token) = header {
        return Some(token.to_string());
    }

    request.uri().query().and_then(|query| {
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, value)| *key == "token" && !value.is_empty())
            .map(|(_, value)| value.to_string())
    })
}

/// Extractor that requires an authenticated user.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserId>()
            .cloned()
            .map(RequireAuth)
            .ok_or(AuthRejection::Unauthenticated)
    }
}

/// Extractor for optional authentication.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<UserId>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parts.extensions.get::<UserId>().cloned()))
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// No valid authentication token was provided.
    Unauthenticated,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthRejection::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "code": "UNAUTHENTICATED"
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    struct FixedValidator;

    #[async_trait]
    impl TokenValidator for FixedValidator {
        async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
            match token {
                "good" => Ok(UserId::new("alice").unwrap()),
                "old" => Err(AuthError::TokenExpired),
                _ => Err(AuthError::InvalidToken),
            }
        }
    }

    async fn whoami(RequireAuth(user): RequireAuth) -> String {
        user.to_string()
    }

    async fn maybe(OptionalAuth(user): OptionalAuth) -> String {
        user.map(|u| u.to_string()).unwrap_or_else(|| "guest".to_string())
    }

    fn app() -> Router {
        let validator: AuthState = Arc::new(FixedValidator);
        Router::new()
            .route("/me", get(whoami))
            .route("/maybe", get(maybe))
            .layer(middleware::from_fn_with_state(validator, auth_middleware))
    }

    async fn call(uri: &str, header: Option<&str>) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri(uri);
        if let Some(value) = header {
            request = request.header("Authorization", value);
        }
        let response = app().oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn header_token_identifies_the_user() {
        assert_eq!(call("/me", Some("Bearer good")).await, (StatusCode::OK, "alice".to_string()));
    }

    #[tokio::test]
    async fn query_token_identifies_the_user() {
        assert_eq!(call("/me?token=good", None).await, (StatusCode::OK, "alice".to_string()));
    }

    #[tokio::test]
    async fn missing_token_is_rejected_only_where_required() {
        assert_eq!(call("/me", None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(call("/maybe", None).await, (StatusCode::OK, "guest".to_string()));
    }

    #[tokio::test]
    async fn invalid_or_expired_token_is_unauthorized() {
        assert_eq!(call("/maybe", Some("Bearer bad")).await.0, StatusCode::UNAUTHORIZED);
        let (status, body) = call("/maybe?token=old", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Token expired"));
    }
}
