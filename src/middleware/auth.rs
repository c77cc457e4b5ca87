// ABOUTME: Bearer-token authentication for API requests
// ABOUTME: Resolves the Authorization header into the authenticated user's ID
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use tracing::debug;

use crate::auth::AuthManager;
use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// Identity established for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Authenticated user ID
    pub user_id: String,
}

/// Authenticates API requests from their headers
#[derive(Clone)]
pub struct AuthMiddleware {
    auth_manager: AuthManager,
}

impl AuthMiddleware {
    /// Create middleware validating tokens with `auth_manager`
    #[must_use]
    pub const fn new(auth_manager: AuthManager) -> Self {
        Self { auth_manager }
    }

    /// Token manager used for validation
    #[must_use]
    pub const fn auth_manager(&self) -> &AuthManager {
        &self.auth_manager
    }

    /// Authenticate a request from its `Authorization` header
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when the header is missing, `AuthInvalid` when it
    /// is not a bearer token or the token fails validation, and `AuthExpired`
    /// for an expired token
    #[tracing::instrument(skip(self, headers), fields(user_id = tracing::field::Empty))]
    pub fn authenticate(&self, headers: &HeaderMap) -> AppResult<AuthUser> {
        let header = headers
            .get(AUTHORIZATION)
            .ok_or_else(AppError::auth_required)?
            .to_str()
            .map_err(|_| AppError::auth_invalid("Authorization header is not valid text"))?;

        let token = bearer_token(header)
            .ok_or_else(|| AppError::auth_invalid("Authorization header must use the Bearer scheme"))?;

        let claims = self.auth_manager.validate_token(token)?;
        tracing::Span::current().record("user_id", claims.sub.as_str());
        debug!("Request authenticated");

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerResources>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &Arc<ServerResources>,
    ) -> Result<Self, Self::Rejection> {
        resources.auth_middleware.authenticate(&parts.headers)
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use axum::http::HeaderValue;

    fn middleware() -> AuthMiddleware {
        AuthMiddleware::new(AuthManager::new(b"middleware-test-secret-xyz", 1))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer   "), None);
    }

    #[test]
    fn test_missing_header_requires_auth() {
        let err = middleware().authenticate(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthRequired);
    }

    #[test]
    fn test_valid_token_yields_user() {
        let mw = middleware();
        let token = mw.auth_manager().generate_token("user-42").unwrap();
        let user = mw
            .authenticate(&headers_with(&format!("Bearer {token}")))
            .unwrap();
        assert_eq!(user.user_id, "user-42");
    }

    #[test]
    fn test_wrong_scheme_is_invalid() {
        let err = middleware()
            .authenticate(&headers_with("Token abc"))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthInvalid);
    }
}
