//! Persistence for registration bindings, so that a restarted registrar can
//! rehydrate active registrations instead of forcing every endpoint to
//! re-REGISTER immediately.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(feature = "postgres")]
use sqlx::PgPool;
#[cfg(feature = "postgres")]
use tracing::error;

/// A single Contact binding for an Address of Record, as persisted.
#[derive(Debug, Clone)]
pub struct StoredBinding {
    pub aor: String,
    pub contact: String,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub call_id: Option<String>,
    pub cseq: Option<u32>,
}

/// Repository for registration bindings, mirroring the CDR repository
/// trait's shape so the registrar can swap a Postgres-backed store for an
/// in-memory one without touching call sites.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn upsert(&self, binding: StoredBinding) -> Result<(), String>;
    async fn remove(&self, aor: &str, contact: &str) -> Result<(), String>;
    async fn remove_all(&self, aor: &str) -> Result<(), String>;
    async fn bindings_for(&self, aor: &str) -> Result<Vec<StoredBinding>, String>;
    async fn all_bindings(&self) -> Result<Vec<StoredBinding>, String>;
    async fn purge_expired(&self) -> Result<u64, String>;
}

/// Keyed by AoR, each with 0..N contact bindings — the shape the registrar
/// already uses in memory, just behind the trait so it can be swapped out.
#[derive(Default)]
pub struct InMemoryRegistryStore {
    bindings: RwLock<HashMap<String, Vec<StoredBinding>>>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn upsert(&self, binding: StoredBinding) -> Result<(), String> {
        let mut map = self.bindings.write().await;
        let entries = map.entry(binding.aor.clone()).or_default();
        entries.retain(|b| b.contact != binding.contact);
        entries.push(binding);
        Ok(())
    }

    async fn remove(&self, aor: &str, contact: &str) -> Result<(), String> {
        let mut map = self.bindings.write().await;
        if let Some(entries) = map.get_mut(aor) {
            entries.retain(|b| b.contact != contact);
            if entries.is_empty() {
                map.remove(aor);
            }
        }
        Ok(())
    }

    async fn remove_all(&self, aor: &str) -> Result<(), String> {
        self.bindings.write().await.remove(aor);
        Ok(())
    }

    async fn bindings_for(&self, aor: &str) -> Result<Vec<StoredBinding>, String> {
        Ok(self.bindings.read().await.get(aor).cloned().unwrap_or_default())
    }

    async fn all_bindings(&self) -> Result<Vec<StoredBinding>, String> {
        Ok(self.bindings.read().await.values().flatten().cloned().collect())
    }

    async fn purge_expired(&self) -> Result<u64, String> {
        let mut map = self.bindings.write().await;
        let now = Utc::now();
        let mut removed = 0u64;
        let mut empty_aors = Vec::new();
        for (aor, entries) in map.iter_mut() {
            let before = entries.len();
            entries.retain(|b| b.expires_at > now);
            removed += (before - entries.len()) as u64;
            if entries.is_empty() {
                empty_aors.push(aor.clone());
            }
        }
        for aor in empty_aors {
            map.remove(&aor);
        }
        if removed > 0 {
            debug!(removed, "purged expired bindings");
        }
        Ok(removed)
    }
}

#[cfg(feature = "postgres")]
pub struct PgRegistryStore {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PgRegistryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn upsert(&self, binding: StoredBinding) -> Result<(), String> {
        sqlx::query!(
            r#"
            INSERT INTO sip_bindings (aor, contact, expires_at, user_agent, call_id, cseq)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (aor, contact) DO UPDATE SET
                expires_at = EXCLUDED.expires_at,
                user_agent = EXCLUDED.user_agent,
                call_id = EXCLUDED.call_id,
                cseq = EXCLUDED.cseq
            "#,
            binding.aor,
            binding.contact,
            binding.expires_at,
            binding.user_agent,
            binding.call_id,
            binding.cseq.map(|c| c as i64),
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to upsert binding: {}", e);
            format!("database error: {}", e)
        })?;
        Ok(())
    }

    async fn remove(&self, aor: &str, contact: &str) -> Result<(), String> {
        sqlx::query!("DELETE FROM sip_bindings WHERE aor = $1 AND contact = $2", aor, contact)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("database error: {}", e))?;
        Ok(())
    }

    async fn remove_all(&self, aor: &str) -> Result<(), String> {
        sqlx::query!("DELETE FROM sip_bindings WHERE aor = $1", aor)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("database error: {}", e))?;
        Ok(())
    }

    async fn bindings_for(&self, aor: &str) -> Result<Vec<StoredBinding>, String> {
        let rows = sqlx::query!(
            "SELECT aor, contact, expires_at, user_agent, call_id, cseq FROM sip_bindings WHERE aor = $1",
            aor
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("database error: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|r| StoredBinding {
                aor: r.aor,
                contact: r.contact,
                expires_at: r.expires_at,
                user_agent: r.user_agent,
                call_id: r.call_id,
                cseq: r.cseq.map(|c| c as u32),
            })
            .collect())
    }

    async fn all_bindings(&self) -> Result<Vec<StoredBinding>, String> {
        let rows = sqlx::query!("SELECT aor, contact, expires_at, user_agent, call_id, cseq FROM sip_bindings")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("database error: {}", e))?;

        Ok(rows
            .into_iter()
            .map(|r| StoredBinding {
                aor: r.aor,
                contact: r.contact,
                expires_at: r.expires_at,
                user_agent: r.user_agent,
                call_id: r.call_id,
                cseq: r.cseq.map(|c| c as u32),
            })
            .collect())
    }

    async fn purge_expired(&self) -> Result<u64, String> {
        let result = sqlx::query!("DELETE FROM sip_bindings WHERE expires_at <= now()")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("database error: {}", e))?;
        Ok(result.rows_affected())
    }
}

pub fn shared_in_memory() -> Arc<dyn RegistryStore> {
    Arc::new(InMemoryRegistryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn binding(aor: &str, contact: &str, secs: i64) -> StoredBinding {
        StoredBinding {
            aor: aor.to_string(),
            contact: contact.to_string(),
            expires_at: Utc::now() + Duration::seconds(secs),
            user_agent: None,
            call_id: None,
            cseq: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_same_contact() {
        let store = InMemoryRegistryStore::new();
        store.upsert(binding("sip:alice@example.com", "sip:alice@10.0.0.1:5060", 3600)).await.unwrap();
        store.upsert(binding("sip:alice@example.com", "sip:alice@10.0.0.1:5060", 60)).await.unwrap();

        let bindings = store.bindings_for("sip:alice@example.com").await.unwrap();
        assert_eq!(bindings.len(), 1);
    }

    #[tokio::test]
    async fn remove_all_clears_every_contact() {
        let store = InMemoryRegistryStore::new();
        store.upsert(binding("sip:bob@example.com", "sip:bob@10.0.0.2:5060", 3600)).await.unwrap();
        store.upsert(binding("sip:bob@example.com", "sip:bob@10.0.0.3:5060", 3600)).await.unwrap();

        store.remove_all("sip:bob@example.com").await.unwrap();
        assert!(store.bindings_for("sip:bob@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_expired_removes_only_stale_bindings() {
        let store = InMemoryRegistryStore::new();
        store.upsert(binding("sip:carol@example.com", "sip:carol@10.0.0.4:5060", -5)).await.unwrap();
        store.upsert(binding("sip:carol@example.com", "sip:carol@10.0.0.5:5060", 3600)).await.unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        let remaining = store.bindings_for("sip:carol@example.com").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].contact, "sip:carol@10.0.0.5:5060");
    }
}
