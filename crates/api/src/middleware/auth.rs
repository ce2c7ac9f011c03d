//! JWT authentication for operator routes.
//!
//! Tokens are issued by the operator console; this service only verifies
//! them. The `sub` claim carries the numeric operator id.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use pushcast_common::error::AppError;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the operator id
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated operator extracted from the bearer token.
///
/// ```ignore
/// async fn handler(auth: AuthOperator) -> impl IntoResponse {
///     // auth.operator_id is recorded as the push author
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthOperator {
    pub operator_id: i64,
    pub claims: Claims,
}

/// Encode a JWT token for an operator.
///
/// The API itself never issues tokens. This is the signing half of
/// `decode_jwt`, kept public for the issuing side and for route tests.
pub fn encode_jwt(operator_id: i64, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: operator_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Resolve an `Authorization` header value to an operator.
fn authenticate(header: Option<&str>, secret: &str) -> Result<AuthOperator, AppError> {
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Auth("Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string())
        })?;

    let claims = decode_jwt(token, secret)?;
    let operator_id = claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Auth("Invalid operator id in token".to_string()))?;

    Ok(AuthOperator {
        operator_id,
        claims,
    })
}

impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok());

        authenticate(header, &state.config.jwt_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-unit-tests";

    #[test]
    fn test_encode_decode_jwt() {
        let token = encode_jwt(17, TEST_SECRET, 24).unwrap();
        let claims = decode_jwt(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.sub, "17");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let token = encode_jwt(17, TEST_SECRET, 24).unwrap();
        assert!(decode_jwt(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_expired_jwt_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "17".to_string(),
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        assert!(decode_jwt(&token, TEST_SECRET).is_err());
    }

    #[test]
    fn test_authenticate_header() {
        let token = encode_jwt(99, TEST_SECRET, 1).unwrap();
        let header = format!("Bearer {}", token);

        let operator = authenticate(Some(&header), TEST_SECRET).unwrap();
        assert_eq!(operator.operator_id, 99);

        assert!(matches!(
            authenticate(None, TEST_SECRET),
            Err(AppError::Auth(_))
        ));
        assert!(matches!(
            authenticate(Some(&token), TEST_SECRET),
            Err(AppError::Auth(_))
        ));
    }

    #[test]
    fn test_non_numeric_subject_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "alice".to_string(),
            exp: (now + Duration::hours(1)).timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let header = format!("Bearer {}", token);
        assert!(matches!(
            authenticate(Some(&header), TEST_SECRET),
            Err(AppError::Auth(_))
        ));
    }
}
