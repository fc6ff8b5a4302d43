//! HTTP Basic authentication guard.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::AppError;
use crate::state::AppState;

/// Passes when Basic auth is disabled or the request carries the configured
/// credentials. Rejects with 401 and a `WWW-Authenticate` challenge otherwise.
///
/// Mounted on the whole router with
/// `axum::middleware::from_extractor_with_state`, so individual handlers do
/// not need to name it.
#[derive(Debug, Clone, Copy)]
pub struct RequireAuth;

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let config = &state.config;
        if !config.basic_auth {
            return Ok(RequireAuth);
        }

        let (user, password) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_basic)
            .ok_or(AppError::Unauthorized)?;

        if user == config.auth_user && password == config.auth_password {
            Ok(RequireAuth)
        } else {
            tracing::warn!(user = %user, "Rejected Basic auth credentials");
            Err(AppError::Unauthorized)
        }
    }
}

/// Decode an `Authorization: Basic <base64(user:password)>` header value.
fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_basic_credentials() {
        let header = format!("Basic {}", STANDARD.encode("bacuser:gram:negative"));
        assert_eq!(
            decode_basic(&header),
            Some(("bacuser".to_string(), "gram:negative".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(decode_basic("Bearer abc"), None);
        assert_eq!(decode_basic("Basic !!!"), None);
        let no_colon = format!("Basic {}", STANDARD.encode("bacuser"));
        assert_eq!(decode_basic(&no_colon), None);
    }
}
