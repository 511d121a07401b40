//! In-memory snapshot of tenant and secret state.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::RwLock;
use time::OffsetDateTime;

use cfgsync_core::{DirectoryError, ResourceDirectory, SecretRecord, TenantRecord, Tier};

/// Format: (namespace, name)
pub type SnapshotKey = (String, String);

fn key(namespace: &str, name: &str) -> SnapshotKey {
    (namespace.to_string(), name.to_string())
}

/// Eventually-consistent copy of the resources the agent cares about.
///
/// Readers get clones, so a lookup never holds a map guard across an
/// await point. The directory is read-only from the orchestrator's side;
/// only the watcher mutates it.
#[derive(Debug, Default)]
pub struct SnapshotDirectory {
    tenants: DashMap<SnapshotKey, TenantRecord>,
    secrets: DashMap<SnapshotKey, SecretRecord>,
    last_synced: RwLock<Option<OffsetDateTime>>,
}

impl SnapshotDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a tenant, keyed by its metadata.
    pub fn upsert_tenant(&self, tenant: TenantRecord) {
        let k = key(&tenant.metadata.namespace, &tenant.metadata.name);
        self.tenants.insert(k, tenant);
    }

    pub fn remove_tenant(&self, namespace: &str, name: &str) -> Option<TenantRecord> {
        self.tenants.remove(&key(namespace, name)).map(|(_, v)| v)
    }

    /// Inserts or replaces a secret, keyed by its namespace and name.
    pub fn upsert_secret(&self, secret: SecretRecord) {
        let k = key(&secret.namespace, &secret.name);
        self.secrets.insert(k, secret);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) -> Option<SecretRecord> {
        self.secrets.remove(&key(namespace, name)).map(|(_, v)| v)
    }

    /// Synchronous lookup of a cached tenant.
    pub fn tenant(&self, namespace: &str, name: &str) -> Option<TenantRecord> {
        self.tenants
            .get(&key(namespace, name))
            .map(|entry| entry.value().clone())
    }

    /// Synchronous lookup of a cached secret.
    pub fn secret(&self, namespace: &str, name: &str) -> Option<SecretRecord> {
        self.secrets
            .get(&key(namespace, name))
            .map(|entry| entry.value().clone())
    }

    /// Drops every cached record.
    pub fn clear(&self) {
        self.tenants.clear();
        self.secrets.clear();
    }

    /// Number of cached tenants and secrets.
    pub fn len(&self) -> usize {
        self.tenants.len() + self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a completed sync pass.
    pub fn mark_synced(&self) {
        if let Ok(mut guard) = self.last_synced.write() {
            *guard = Some(OffsetDateTime::now_utc());
        }
    }

    /// When the watcher last completed a pass, if ever.
    pub fn last_synced(&self) -> Option<OffsetDateTime> {
        self.last_synced.read().ok().and_then(|guard| *guard)
    }
}

#[async_trait]
impl ResourceDirectory for SnapshotDirectory {
    fn tier(&self) -> Tier {
        Tier::Cached
    }

    async fn get_tenant(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        Ok(self.tenant(namespace, name))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretRecord>, DirectoryError> {
        Ok(self.secret(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsync_core::TenantIdentity;

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let snapshot = SnapshotDirectory::new();
        assert!(snapshot.is_empty());

        snapshot.upsert_tenant(TenantRecord::new("ns", "store").with_configuration("store-env"));
        snapshot.upsert_secret(SecretRecord::new("ns", "store-env").with_entry("config.env", "A=1"));
        assert_eq!(snapshot.len(), 2);

        let tenant = snapshot.get_tenant("ns", "store").await.unwrap().unwrap();
        assert_eq!(tenant.configuration_name(), Some("store-env"));
        assert!(snapshot.get_tenant("other", "store").await.unwrap().is_none());

        let source = snapshot
            .resolve(&TenantIdentity::new("ns", "store"))
            .await
            .unwrap();
        assert_eq!(source.secret.name, "store-env");
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let snapshot = SnapshotDirectory::new();
        snapshot.upsert_tenant(TenantRecord::new("ns", "store"));
        snapshot.upsert_tenant(TenantRecord::new("ns", "store").with_configuration("v2"));
        assert_eq!(snapshot.len(), 1);
        let tenant = snapshot.get_tenant("ns", "store").await.unwrap().unwrap();
        assert_eq!(tenant.configuration_name(), Some("v2"));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let snapshot = SnapshotDirectory::new();
        snapshot.upsert_tenant(TenantRecord::new("ns", "store"));
        snapshot.upsert_secret(SecretRecord::new("ns", "store-env"));

        assert!(snapshot.remove_secret("ns", "store-env").is_some());
        assert!(snapshot.remove_secret("ns", "store-env").is_none());
        assert!(snapshot.get_secret("ns", "store-env").await.unwrap().is_none());

        snapshot.clear();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn test_sync_marker() {
        let snapshot = SnapshotDirectory::new();
        assert!(snapshot.last_synced().is_none());
        snapshot.mark_synced();
        assert!(snapshot.last_synced().is_some());
    }

    #[test]
    fn test_tier_is_cached() {
        assert_eq!(SnapshotDirectory::new().tier(), Tier::Cached);
    }
}
