//! Bearer-token authentication.
//!
//! Tokens are compact HS256 JWTs carrying the caller's email plus the
//! standard `iat`/`exp` claims. Verification is stateless: there is no
//! session store, refresh token or revocation list.

use std::{convert::Infallible, time::Duration};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{ApiError, AuthError, Config, Result};

type HmacSha256 = Hmac<Sha256>;

const BEARER_PREFIX: &str = "Bearer ";
const ALGORITHM: &str = "HS256";

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity of the caller
    pub email: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    #[serde(default)]
    typ: String,
}

/// Signs and verifies bearer tokens, and checks the admin login.
#[derive(Clone)]
pub struct TokenAuthority {
    secret: Vec<u8>,
    lifetime: Duration,
    admin_email: String,
    admin_password: String,
}

impl TokenAuthority {
    pub fn new(secret: impl Into<Vec<u8>>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
            admin_email: String::new(),
            admin_password: String::new(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut authority = Self::new(config.jwt_secret.as_bytes(), config.token_lifetime()?);
        authority.admin_email = config.admin_email.clone();
        authority.admin_password = config.admin_password.clone();
        Ok(authority)
    }

    fn mac(&self) -> std::result::Result<HmacSha256, AuthError> {
        // HMAC takes keys of any length; the error arm is unreachable.
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidSignature)
    }

    /// Issues a token for `email` valid from now for the configured lifetime.
    pub fn issue(&self, email: &str) -> std::result::Result<String, AuthError> {
        self.issue_at(email, Utc::now().timestamp())
    }

    /// Issues a token as if signed at `issued_at` (seconds since the epoch).
    pub fn issue_at(&self, email: &str, issued_at: i64) -> std::result::Result<String, AuthError> {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            email: email.to_string(),
            iat: issued_at,
            exp: issued_at.saturating_add(lifetime),
        };
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let header = serde_json::to_vec(&header).map_err(|_| AuthError::MalformedToken)?;
        let payload = serde_json::to_vec(&claims).map_err(|_| AuthError::MalformedToken)?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verifies signature and expiry and returns the embedded claims.
    pub fn verify_token(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };

        let header: TokenHeader = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::MalformedToken)?;
        let signed_len = token.len() - signature_len(token);
        let mut mac = self.mac()?;
        mac.update(token[..signed_len].as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let claims: Claims = decode_segment(payload)?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    /// Full check of an `Authorization` header value.
    pub fn verify_header(&self, header: Option<&str>) -> std::result::Result<Claims, AuthError> {
        let header = header.ok_or(AuthError::MissingHeader)?;
        let token = extract_token_from_header(header)?;
        self.verify_token(token)
    }

    /// Checks the admin credentials and issues a token on success.
    pub fn login(&self, email: &str, password: &str) -> std::result::Result<String, AuthError> {
        if self.admin_email.is_empty()
            || email != self.admin_email
            || password != self.admin_password
        {
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(email)
    }
}

/// Length of the `.signature` suffix, including the dot.
fn signature_len(token: &str) -> usize {
    token.rfind('.').map_or(0, |dot| token.len() - dot)
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
) -> std::result::Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)
}

/// Returns the token after the `Bearer ` prefix.
pub fn extract_token_from_header(header: &str) -> std::result::Result<&str, AuthError> {
    match header.strip_prefix(BEARER_PREFIX) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

fn authorization_header(parts: &Parts) -> std::result::Result<Option<&str>, AuthError> {
    parts
        .headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::MalformedHeader))
        .transpose()
}

/// Extractor for handlers that must run only for authenticated callers.
///
/// Rejects with 401 before the handler body runs; otherwise hands the
/// verified claims to the handler.
#[derive(Debug, Clone)]
pub struct RequireAuth(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    TokenAuthority: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let authority = TokenAuthority::from_ref(state);
        authorization_header(parts)
            .and_then(|header| authority.verify_header(header))
            .map(RequireAuth)
            .map_err(|e| {
                debug!("Rejecting {} {}: {}", parts.method, parts.uri.path(), e);
                ApiError::Unauthorized("Unauthorized".to_string())
            })
    }
}

/// Extractor for public handlers whose output depends on who is asking.
/// Any invalid credential reads as anonymous.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<Claims>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalAuth
where
    TokenAuthority: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let authority = TokenAuthority::from_ref(state);
        let claims = authorization_header(parts)
            .and_then(|header| authority.verify_header(header))
            .map_err(|e| debug!("Treating request as anonymous: {}", e))
            .ok();
        Ok(OptionalAuth(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        let mut authority = TokenAuthority::new("test-secret", Duration::from_secs(3600));
        authority.admin_email = "admin@example.com".into();
        authority.admin_password = "hunter2".into();
        authority
    }

    #[test]
    fn valid_token_yields_identity() {
        let authority = authority();
        let token = authority.issue("admin@example.com").unwrap();
        let claims = authority
            .verify_header(Some(&format!("Bearer {}", token)))
            .unwrap();
        assert_eq!(claims.email, "admin@example.com");
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        let authority = authority();
        let token = authority.issue("a@b.c").unwrap();

        assert_eq!(authority.verify_header(None), Err(AuthError::MissingHeader));
        assert_eq!(
            authority.verify_header(Some(&token)),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            authority.verify_header(Some(&format!("bearer {}", token))),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            authority.verify_header(Some("Bearer ")),
            Err(AuthError::MalformedHeader)
        );
        assert_eq!(
            authority.verify_header(Some("Bearer not.a-token")),
            Err(AuthError::MalformedToken)
        );
    }

    #[test]
    fn expired_token_is_rejected() {
        let authority = authority();
        let two_hours_ago = Utc::now().timestamp() - 7200;
        let token = authority.issue_at("a@b.c", two_hours_ago).unwrap();
        assert_eq!(authority.verify_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let authority = authority();
        let token = authority.issue("user@example.com").unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();

        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                email: "admin@example.com".into(),
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );
        parts[1] = &forged;
        let forged_token = parts.join(".");

        assert_eq!(
            authority.verify_token(&forged_token),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let other = TokenAuthority::new("other-secret", Duration::from_secs(3600));
        let token = other.issue("a@b.c").unwrap();
        assert_eq!(
            authority().verify_token(&token),
            Err(AuthError::InvalidSignature)
        );
    }

    #[test]
    fn unsigned_algorithm_is_rejected() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"email":"a@b.c","iat":0,"exp":9999999999}"#);
        let token = format!("{}.{}.", header, payload);
        assert_eq!(
            authority().verify_token(&token),
            Err(AuthError::UnsupportedAlgorithm("none".into()))
        );
    }

    #[test]
    fn huge_lifetime_saturates_instead_of_expiring() {
        let authority = TokenAuthority::new("s", Duration::from_secs(u64::MAX));
        let token = authority.issue("a@b.c").unwrap();
        let claims = authority.verify_token(&token).unwrap();
        assert_eq!(claims.exp, i64::MAX);
    }

    #[test]
    fn login_checks_admin_credentials() {
        let authority = authority();
        assert_eq!(
            authority.login("admin@example.com", "wrong"),
            Err(AuthError::InvalidCredentials)
        );
        let token = authority.login("admin@example.com", "hunter2").unwrap();
        assert_eq!(
            authority.verify_token(&token).unwrap().email,
            "admin@example.com"
        );
    }
}
