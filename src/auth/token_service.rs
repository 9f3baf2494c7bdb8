use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use super::token_store::{ConsumeOutcome, FamilyRecord, RotateOutcome, SingleUseRecord, TokenStore};
use super::AuthError;
use crate::clock::SharedClock;
use crate::config::SecurityConfig;

/// Claims embedded in a stateless access token. Role and permissions are
/// captured at issuance time; later grants only take effect on the next
/// issuance, bounded by the short TTL.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub username: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Purpose tag on a single-use token. Prevents a password-reset token from
/// being replayed against the email-verification endpoint and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerify,
}

#[derive(Debug)]
pub struct RotatedRefresh {
    pub principal_id: Uuid,
    pub refresh_token: String,
    pub generation: u32,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("token generation failed: {0}")]
    Generation(String),
    #[error("JWT secret is not configured")]
    MissingSecret,
}

impl From<IssueError> for crate::error::ApiError {
    fn from(err: IssueError) -> Self {
        tracing::error!("token issuance failed: {}", err);
        crate::error::ApiError::internal_server_error(
            "An error occurred while processing your request",
        )
    }
}

/// Issues, verifies and rotates tokens. Access tokens are stateless JWTs;
/// refresh and single-use tokens are opaque 256-bit secrets whose SHA-256
/// digests live in the [`TokenStore`].
pub struct TokenService {
    security: SecurityConfig,
    clock: SharedClock,
    store: Arc<dyn TokenStore>,
}

impl TokenService {
    pub fn new(security: SecurityConfig, clock: SharedClock, store: Arc<dyn TokenStore>) -> Self {
        Self { security, clock, store }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.security.access_token_ttl_mins * 60
    }

    fn refresh_ttl(&self) -> Duration {
        Duration::days(self.security.refresh_token_ttl_days)
    }

    // ---- Access tokens -----------------------------------------------------

    pub fn issue_access_token(
        &self,
        principal_id: Uuid,
        username: &str,
        role: &str,
        permissions: Vec<String>,
    ) -> Result<String, IssueError> {
        if self.security.jwt_secret.is_empty() {
            return Err(IssueError::MissingSecret);
        }

        let now = self.clock.now();
        let claims = AccessClaims {
            sub: principal_id,
            username: username.to_string(),
            role: role.to_string(),
            permissions,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.security.access_token_ttl_mins)).timestamp(),
        };

        let key = EncodingKey::from_secret(self.security.jwt_secret.as_bytes());
        encode(&Header::default(), &claims, &key)
            .map_err(|e| IssueError::Generation(e.to_string()))
    }

    /// Pure signature + expiry check; no store lookup, no locking.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let key = DecodingKey::from_secret(self.security.jwt_secret.as_bytes());
        // Expiry is checked against the injected clock below, not the
        // library's wall clock.
        let mut validation = Validation::default();
        validation.validate_exp = false;

        let data = decode::<AccessClaims>(token, &key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                _ => AuthError::Malformed,
            }
        })?;

        if data.claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(data.claims)
    }

    // ---- Refresh tokens ----------------------------------------------------

    /// Start a new token family for a fresh login. The family id stays
    /// stable across rotations; the secret changes every rotation.
    pub async fn issue_refresh_token(&self, principal_id: Uuid) -> String {
        let family_id = Uuid::new_v4();
        let secret = random_secret();
        let now = self.clock.now();

        self.store
            .create_family(
                family_id,
                FamilyRecord {
                    principal_id,
                    current_secret_hash: hash_secret(&secret),
                    generation: 0,
                    issued_at: now,
                    expires_at: now + self.refresh_ttl(),
                    revoked: false,
                },
            )
            .await;

        encode_refresh(family_id, &secret)
    }

    /// Single-use rotation: the check of the presented generation and the
    /// advance to the next one happen inside one store operation. Replay of
    /// an already-rotated token revokes the whole family and surfaces
    /// [`AuthError::AlreadyRotated`] so the caller forces re-authentication.
    pub async fn rotate_refresh_token(&self, token: &str) -> Result<RotatedRefresh, AuthError> {
        let (family_id, secret) = decode_refresh(token).ok_or(AuthError::Malformed)?;
        let next_secret = random_secret();
        let now = self.clock.now();

        let outcome = self
            .store
            .rotate_family(
                family_id,
                &hash_secret(&secret),
                hash_secret(&next_secret),
                now + self.refresh_ttl(),
                now,
            )
            .await;

        match outcome {
            RotateOutcome::Rotated { principal_id, generation } => Ok(RotatedRefresh {
                principal_id,
                refresh_token: encode_refresh(family_id, &next_secret),
                generation,
            }),
            RotateOutcome::Replayed { principal_id } => {
                tracing::warn!(
                    target: "audit",
                    principal_id = %principal_id,
                    family_id = %family_id,
                    "refresh token replay detected; family revoked"
                );
                Err(AuthError::AlreadyRotated)
            }
            RotateOutcome::Revoked => Err(AuthError::AlreadyRotated),
            RotateOutcome::Expired => Err(AuthError::Expired),
            RotateOutcome::Unknown => Err(AuthError::Unknown),
        }
    }

    /// Invalidate all outstanding refresh tokens for a principal. Used on
    /// logout, password reset and detected replay.
    pub async fn revoke_family(&self, principal_id: Uuid) {
        self.store.revoke_families(principal_id).await;
    }

    // ---- Single-use tokens -------------------------------------------------

    pub async fn issue_single_use_token(
        &self,
        principal_id: Uuid,
        purpose: TokenPurpose,
        ttl: Duration,
    ) -> String {
        let secret = random_secret();
        self.store
            .put_single_use(
                hash_secret(&secret),
                SingleUseRecord {
                    principal_id,
                    purpose,
                    expires_at: self.clock.now() + ttl,
                    consumed: false,
                },
            )
            .await;
        secret
    }

    pub async fn consume_single_use_token(
        &self,
        token: &str,
        purpose: TokenPurpose,
    ) -> Result<Uuid, AuthError> {
        let outcome = self
            .store
            .consume_single_use(&hash_secret(token), purpose, self.clock.now())
            .await;

        match outcome {
            ConsumeOutcome::Consumed { principal_id } => Ok(principal_id),
            ConsumeOutcome::Expired => Err(AuthError::Expired),
            ConsumeOutcome::AlreadyConsumed => Err(AuthError::AlreadyConsumed),
            ConsumeOutcome::WrongPurpose => Err(AuthError::WrongPurpose),
            ConsumeOutcome::Unknown => Err(AuthError::Unknown),
        }
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    format!("{:x}", digest)
}

fn encode_refresh(family_id: Uuid, secret: &str) -> String {
    format!("{}.{}", family_id.simple(), secret)
}

fn decode_refresh(token: &str) -> Option<(Uuid, String)> {
    let (family, secret) = token.split_once('.')?;
    let family_id = Uuid::parse_str(family).ok()?;
    if secret.is_empty() {
        return None;
    }
    Some((family_id, secret.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::auth::token_store::MemoryTokenStore;
    use crate::clock::test_clock::ManualClock;
    use crate::config::AppConfig;

    fn service() -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()));
        let security = AppConfig::development().security;
        let service =
            TokenService::new(security, clock.clone(), Arc::new(MemoryTokenStore::new()));
        (service, clock)
    }

    #[test]
    fn access_token_round_trips_principal_identity() {
        let (service, _clock) = service();
        let id = Uuid::new_v4();
        let token = service
            .issue_access_token(id, "testuser", "teacher", vec!["activity:view".into()])
            .unwrap();

        let claims = service.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "testuser");
        assert_eq!(claims.role, "teacher");
        assert_eq!(claims.permissions, vec!["activity:view".to_string()]);
    }

    #[test]
    fn access_token_expires_by_clock_not_lookup() {
        let (service, clock) = service();
        let token = service
            .issue_access_token(Uuid::new_v4(), "testuser", "parent", vec![])
            .unwrap();

        clock.advance(Duration::minutes(31));
        assert_eq!(service.verify_access_token(&token), Err(AuthError::Expired));
    }

    #[test]
    fn tampered_access_token_fails_signature_check() {
        let (service, _clock) = service();
        let token = service
            .issue_access_token(Uuid::new_v4(), "testuser", "parent", vec![])
            .unwrap();

        let mut forged = token.clone();
        forged.truncate(token.len() - 2);
        forged.push_str("xx");
        assert!(matches!(
            service.verify_access_token(&forged),
            Err(AuthError::SignatureInvalid) | Err(AuthError::Malformed)
        ));

        assert_eq!(service.verify_access_token("not-a-jwt"), Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn rotation_succeeds_exactly_once_and_replay_kills_the_family() {
        let (service, _clock) = service();
        let principal_id = Uuid::new_v4();
        let original = service.issue_refresh_token(principal_id).await;

        let rotated = service.rotate_refresh_token(&original).await.unwrap();
        assert_eq!(rotated.principal_id, principal_id);
        assert_eq!(rotated.generation, 1);

        // Replay of the original token: theft assumed, family revoked.
        assert_eq!(
            service.rotate_refresh_token(&original).await.unwrap_err(),
            AuthError::AlreadyRotated
        );

        // The legitimately rotated token is dead too.
        assert_eq!(
            service.rotate_refresh_token(&rotated.refresh_token).await.unwrap_err(),
            AuthError::AlreadyRotated
        );
    }

    #[tokio::test]
    async fn revocation_does_not_lock_out_a_fresh_login() {
        let (service, _clock) = service();
        let principal_id = Uuid::new_v4();

        let first = service.issue_refresh_token(principal_id).await;
        service.revoke_family(principal_id).await;
        assert_eq!(
            service.rotate_refresh_token(&first).await.unwrap_err(),
            AuthError::AlreadyRotated
        );

        // A new login starts a new family, unaffected by the revocation.
        let second = service.issue_refresh_token(principal_id).await;
        assert!(service.rotate_refresh_token(&second).await.is_ok());
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected_without_rotation() {
        let (service, clock) = service();
        let token = service.issue_refresh_token(Uuid::new_v4()).await;

        clock.advance(Duration::days(8));
        assert_eq!(service.rotate_refresh_token(&token).await.unwrap_err(), AuthError::Expired);
    }

    #[tokio::test]
    async fn garbage_refresh_tokens_are_malformed_or_unknown() {
        let (service, _clock) = service();
        assert_eq!(
            service.rotate_refresh_token("no-dot-here").await.unwrap_err(),
            AuthError::Malformed
        );
        let phantom = encode_refresh(Uuid::new_v4(), "never-issued");
        assert_eq!(service.rotate_refresh_token(&phantom).await.unwrap_err(), AuthError::Unknown);
    }

    #[tokio::test]
    async fn single_use_token_is_consumed_exactly_once() {
        let (service, _clock) = service();
        let principal_id = Uuid::new_v4();
        let token = service
            .issue_single_use_token(principal_id, TokenPurpose::PasswordReset, Duration::minutes(30))
            .await;

        assert_eq!(
            service.consume_single_use_token(&token, TokenPurpose::PasswordReset).await.unwrap(),
            principal_id
        );
        assert_eq!(
            service
                .consume_single_use_token(&token, TokenPurpose::PasswordReset)
                .await
                .unwrap_err(),
            AuthError::AlreadyConsumed
        );
    }

    #[tokio::test]
    async fn cross_purpose_consumption_is_rejected() {
        let (service, _clock) = service();
        let token = service
            .issue_single_use_token(Uuid::new_v4(), TokenPurpose::EmailVerify, Duration::hours(24))
            .await;

        assert_eq!(
            service
                .consume_single_use_token(&token, TokenPurpose::PasswordReset)
                .await
                .unwrap_err(),
            AuthError::WrongPurpose
        );
        // Still consumable for its real purpose.
        assert!(service.consume_single_use_token(&token, TokenPurpose::EmailVerify).await.is_ok());
    }

    #[tokio::test]
    async fn expired_single_use_token_keeps_reporting_expiry() {
        let (service, clock) = service();
        let token = service
            .issue_single_use_token(Uuid::new_v4(), TokenPurpose::EmailVerify, Duration::hours(1))
            .await;

        clock.advance(Duration::hours(2));
        for _ in 0..2 {
            // Retry must say "expired", never "already used".
            assert_eq!(
                service
                    .consume_single_use_token(&token, TokenPurpose::EmailVerify)
                    .await
                    .unwrap_err(),
                AuthError::Expired
            );
        }
    }
}
