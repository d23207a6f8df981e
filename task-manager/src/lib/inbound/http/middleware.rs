use std::str::FromStr;

use auth::JwtError;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::handlers::ApiError;
use crate::domain::user::models::Principal;
use crate::domain::user::models::Role;
use crate::domain::user::models::Username;
use crate::inbound::http::router::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// Verifies the bearer token and stores the caller as a [`Principal`]
/// request extension for the protected handlers.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(req.headers())?;

    let claims = state.authenticator.validate_token(token).map_err(|e| {
        tracing::warn!(error = %e, "Token rejected");
        match e {
            JwtError::TokenExpired => ApiError::Unauthorized("Token has expired".to_string()),
            _ => ApiError::Unauthorized("Invalid token".to_string()),
        }
    })?;

    let principal = principal_from_claims(&claims)?;
    tracing::debug!(
        username = %principal.username(),
        role = %principal.role(),
        "Caller authenticated"
    );

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

fn principal_from_claims(claims: &auth::Claims) -> Result<Principal, ApiError> {
    let invalid = |reason: String| {
        tracing::warn!(reason = %reason, "Token carries unusable claims");
        ApiError::Unauthorized("Invalid token".to_string())
    };

    let username =
        Username::new(claims.username().to_string()).map_err(|e| invalid(e.to_string()))?;
    let role = Role::from_str(&claims.role).map_err(|e| invalid(e.to_string()))?;

    Ok(Principal::new(username, role))
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".to_string()))?
        .trim();

    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::Unauthorized(
                "Invalid Authorization header format. Expected: Bearer <token>".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extracts_token_with_surrounding_whitespace() {
        let headers = headers(" Bearer abc.def.ghi ");
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_rejects_missing_or_malformed_header() {
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
        assert!(extract_bearer_token(&headers("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_bearer_token(&headers("Bearer ")).is_err());
    }

    #[test]
    fn test_rejects_unknown_role_claim() {
        let claims = auth::Claims::for_user("alice", "superuser", chrono::Duration::hours(1));
        assert!(principal_from_claims(&claims).is_err());

        let claims = auth::Claims::for_user("alice", "admin", chrono::Duration::hours(1));
        let principal = principal_from_claims(&claims).unwrap();
        assert_eq!(principal.role(), Role::Admin);
        assert_eq!(principal.username().as_str(), "alice");
    }
}
