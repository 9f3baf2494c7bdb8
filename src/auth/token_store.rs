use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::token_service::TokenPurpose;

/// Outcome of an atomic compare-and-rotate on a refresh-token family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// Presented secret matched the current generation; family advanced.
    Rotated { principal_id: Uuid, generation: u32 },
    /// Presented secret belongs to a past generation. The family has been
    /// revoked as a side effect (token theft assumed).
    Replayed { principal_id: Uuid },
    Expired,
    Revoked,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Consumed { principal_id: Uuid },
    Expired,
    AlreadyConsumed,
    WrongPurpose,
    Unknown,
}

/// State held per refresh-token family. Only the hash of the current
/// generation's secret is stored; the secret itself lives on the client.
#[derive(Debug, Clone)]
pub struct FamilyRecord {
    pub principal_id: Uuid,
    pub current_secret_hash: String,
    pub generation: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct SingleUseRecord {
    pub principal_id: Uuid,
    pub purpose: TokenPurpose,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Storage for refresh-token families and single-use tokens.
///
/// Rotation and consumption must be atomic: the "is this still valid" check
/// and the state advance happen as one operation, so two concurrent calls
/// presenting the same token can never both succeed. The in-memory
/// implementation gets this from a single mutex; a multi-instance
/// deployment would back this trait with a transactional KV store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_family(&self, family_id: Uuid, record: FamilyRecord);

    /// Compare-and-rotate. On a secret-hash match the family advances to
    /// `next_secret_hash` with an incremented generation and new expiry;
    /// on a mismatch the whole family is revoked.
    async fn rotate_family(
        &self,
        family_id: Uuid,
        presented_hash: &str,
        next_secret_hash: String,
        next_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RotateOutcome;

    /// Revoke every outstanding family for a principal (logout, password
    /// reset, replay response).
    async fn revoke_families(&self, principal_id: Uuid);

    async fn put_single_use(&self, secret_hash: String, record: SingleUseRecord);

    /// Consume exactly once. Expiry is checked before the consumed flag so
    /// a retried expired token keeps reporting expiry; consumed records are
    /// tombstoned, never resurrected.
    async fn consume_single_use(
        &self,
        secret_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> ConsumeOutcome;
}

/// Process-local store. Suitable for a single-instance deployment and for
/// tests; both maps sit behind mutexes so every operation is linearizable.
#[derive(Default)]
pub struct MemoryTokenStore {
    families: Mutex<HashMap<Uuid, FamilyRecord>>,
    single_use: Mutex<HashMap<String, SingleUseRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_family(&self, family_id: Uuid, record: FamilyRecord) {
        self.families.lock().unwrap().insert(family_id, record);
    }

    async fn rotate_family(
        &self,
        family_id: Uuid,
        presented_hash: &str,
        next_secret_hash: String,
        next_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RotateOutcome {
        let mut families = self.families.lock().unwrap();
        let family = match families.get_mut(&family_id) {
            Some(family) => family,
            None => return RotateOutcome::Unknown,
        };

        if family.revoked {
            return RotateOutcome::Revoked;
        }
        if family.current_secret_hash != presented_hash {
            // A past generation resurfaced: assume theft, kill the family.
            family.revoked = true;
            return RotateOutcome::Replayed { principal_id: family.principal_id };
        }
        if now >= family.expires_at {
            return RotateOutcome::Expired;
        }

        family.current_secret_hash = next_secret_hash;
        family.generation += 1;
        family.expires_at = next_expires_at;
        RotateOutcome::Rotated { principal_id: family.principal_id, generation: family.generation }
    }

    async fn revoke_families(&self, principal_id: Uuid) {
        let mut families = self.families.lock().unwrap();
        for family in families.values_mut() {
            if family.principal_id == principal_id {
                family.revoked = true;
            }
        }
    }

    async fn put_single_use(&self, secret_hash: String, record: SingleUseRecord) {
        self.single_use.lock().unwrap().insert(secret_hash, record);
    }

    async fn consume_single_use(
        &self,
        secret_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> ConsumeOutcome {
        let mut tokens = self.single_use.lock().unwrap();
        let record = match tokens.get_mut(secret_hash) {
            Some(record) => record,
            None => return ConsumeOutcome::Unknown,
        };

        if record.purpose != purpose {
            return ConsumeOutcome::WrongPurpose;
        }
        if now >= record.expires_at {
            return ConsumeOutcome::Expired;
        }
        if record.consumed {
            return ConsumeOutcome::AlreadyConsumed;
        }

        record.consumed = true;
        ConsumeOutcome::Consumed { principal_id: record.principal_id }
    }
}
