//! Password hashing and bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. A successful login hands out an HS256 JWT whose
//! `sub` is the user id; [`AuthUser`] pulls it back out of the `Authorization: Bearer` header on
//! every contacts request.

use std::sync::{Arc, LazyLock};

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::AppError,
    handlers::{run_blocking, AppState},
    models::User,
    store,
};

const TOKEN_MISSING: &str = "User is not authorized or token is missing";
const TOKEN_INVALID: &str = "User is not authorized";
const TOKEN_EXPIRED: &str = "Token has expired, log in again";

/// Hash a password using Argon2id. Returns a PHC-format string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a PHC-format hash string.
pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("invalid password hash: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("not-a-real-password").ok());

/// Runs one verification against a throwaway hash so an unknown email costs as much as a
/// wrong password.
pub fn burn_verification(password: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl: TimeDelta) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> jsonwebtoken::errors::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        match jsonwebtoken::decode::<Claims>(token.trim(), &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(error) => {
                debug!(%error, "rejected bearer token");
                match error.kind() {
                    ErrorKind::ExpiredSignature => Err(AppError::Unauthorized(TOKEN_EXPIRED)),
                    _ => Err(AppError::Unauthorized(TOKEN_INVALID)),
                }
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return None;
    }
    Some(token.trim())
}

/// The stored user behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized(TOKEN_MISSING))?;
        let claims = state.tokens.verify(token)?;

        let conn = state.conn.clone();
        let user = run_blocking(move || store::find_user_by_id(&conn, &claims.sub))
            .await?
            .ok_or(AppError::Unauthorized(TOKEN_INVALID))?;
        Ok(AuthUser {
            id: user.id,
            username: user.username,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "u1".into(),
            username: "ada".into(),
            email: "ada@x.com".into(),
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
        assert!(verify_password("hunter2", "not a hash").is_err());
    }

    #[test]
    fn dummy_hash_is_usable() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(!verify_password("hunter2", hash).unwrap());
        burn_verification("hunter2");
    }

    #[test]
    fn issued_token_verifies_with_same_secret_only() {
        let keys = TokenKeys::new(b"secret", TimeDelta::minutes(5));
        let token = keys.issue(&user()).unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "ada@x.com");

        let other = TokenKeys::new(b"other", TimeDelta::minutes(5));
        assert!(matches!(
            other.verify(&token),
            Err(AppError::Unauthorized(TOKEN_INVALID))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = TokenKeys::new(b"secret", TimeDelta::minutes(-5));
        let token = keys.issue(&user()).unwrap();
        assert!(matches!(
            keys.verify(&token),
            Err(AppError::Unauthorized(TOKEN_EXPIRED))
        ));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));
    }
}
