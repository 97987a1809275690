//! Access/refresh bearer tokens: HMAC-SHA256-signed JWTs carrying
//! `(sub, exp, iat, jti)`. `jti` is the value the blacklist keys on for
//! per-token revocation.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub jti: Uuid,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Mints and verifies tokens against one server-held secret.
#[derive(Clone)]
pub struct TokenAuthority {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenAuthority {
    pub fn new(secret: impl Into<String>, access_ttl_minutes: i64, refresh_ttl_days: i64) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::days(refresh_ttl_days),
        }
    }

    pub fn issue_access(&self, user_id: Uuid) -> IssuedToken {
        self.issue(user_id, TokenKind::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> IssuedToken {
        self.issue(user_id, TokenKind::Refresh, self.refresh_ttl)
    }

    fn issue(&self, user_id: Uuid, kind: TokenKind, ttl: Duration) -> IssuedToken {
        let now = Utc::now();
        let expires_at = now + ttl;
        let jti = Uuid::new_v4();
        let claims = Claims {
            sub: user_id,
            jti,
            kind,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .expect("HMAC signing does not fail");

        IssuedToken {
            token,
            jti,
            expires_at,
        }
    }

    /// Decode and check signature/expiry only. Blacklist consultation is
    /// the caller's job — this type has no access to the blacklist store.
    pub fn verify(&self, token: &str, expected_kind: TokenKind) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
            other => AuthError::Malformed(other.to_string()),
        })?;

        if data.claims.kind != expected_kind {
            return Err(AuthError::Malformed("unexpected token kind".into()));
        }
        Ok(data.claims)
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }
}
