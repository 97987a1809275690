//! Revocation store: per-token keys (`token_blacklist:<jti>`) and
//! per-user mass-revocation keys (`token_blacklist:user:<user_id>`),
//! both TTL'd so entries self-expire once the token they cover could no
//! longer be valid anyway.
//!
//! Reads **fail open**: if the store is unreachable, verification
//! proceeds as if nothing were revoked, and a warning is logged — an
//! outage must not lock every session out. Writes **fail closed**: a
//! revocation that can't be durably recorded is reported as an error,
//! since silently pretending a logout succeeded is worse than surfacing
//! the failure.

use std::time::Duration;

use fred::prelude::*;
use uuid::Uuid;

use crate::error::AuthError;

fn token_key(jti: Uuid) -> String {
    format!("token_blacklist:{jti}")
}

fn user_key(user_id: Uuid) -> String {
    format!("token_blacklist:user:{user_id}")
}

pub struct Blacklist {
    client: Client,
}

impl Blacklist {
    pub async fn connect(redis_url: &str) -> Result<Self, AuthError> {
        let config = Config::from_url(redis_url)
            .map_err(|e| AuthError::Hashing(format!("redis config: {e}")))?;
        let client = Builder::from_config(config)
            .build()
            .map_err(|e| AuthError::Hashing(format!("redis client: {e}")))?;
        client
            .init()
            .await
            .map_err(|e| AuthError::Hashing(format!("redis connect: {e}")))?;
        Ok(Self { client })
    }

    /// Revoke a single token for the remainder of its natural lifetime.
    pub async fn revoke_token(&self, jti: Uuid, remaining_lifetime: Duration) -> Result<(), AuthError> {
        self.client
            .set(
                token_key(jti),
                "revoked",
                Some(Expiration::EX(remaining_lifetime.as_secs() as i64)),
                None,
                false,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to write token revocation");
                AuthError::BlacklistUnavailable
            })
    }

    /// Revoke every token a user currently holds by stamping a
    /// user-level marker with TTL equal to the refresh token lifetime —
    /// long enough to outlive any access *or* refresh token issued
    /// before the logout.
    pub async fn revoke_all_for_user(&self, user_id: Uuid, refresh_ttl: Duration) -> Result<(), AuthError> {
        self.client
            .set(
                user_key(user_id),
                "all_revoked",
                Some(Expiration::EX(refresh_ttl.as_secs() as i64)),
                None,
                false,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to write mass revocation");
                AuthError::BlacklistUnavailable
            })
    }

    pub async fn is_token_revoked(&self, jti: Uuid) -> bool {
        match self.client.exists::<i64, _>(token_key(jti)).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(error = %e, "blacklist unreachable, failing open for read");
                false
            }
        }
    }

    pub async fn is_user_revoked(&self, user_id: Uuid) -> bool {
        match self.client.exists::<i64, _>(user_key(user_id)).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(error = %e, "blacklist unreachable, failing open for read");
                false
            }
        }
    }
}
