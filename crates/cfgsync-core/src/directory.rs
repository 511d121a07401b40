//! Resource directory seam.
//!
//! A directory answers tenant and secret lookups. The cached variant reads
//! a local snapshot and never blocks on the network; the live variant
//! performs an authoritative round trip to the control plane. Both resolve
//! a tenant's configuration source the same way, so the orchestrator is
//! written once against this trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DirectoryError, ReconcileError};
use crate::types::{SecretRecord, TenantConfigSource, TenantIdentity, TenantRecord, Tier};

#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Which tier this directory serves. Used to tag errors.
    fn tier(&self) -> Tier;

    /// Looks up a tenant. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot answer.
    async fn get_tenant(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError>;

    /// Looks up a secret. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backend cannot answer.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretRecord>, DirectoryError>;

    /// Resolves the tenant and its configuration secret.
    ///
    /// # Errors
    ///
    /// - `TenantNotFound` if the tenant is unknown to this directory
    /// - `ConfigurationUnset` if the tenant declares no configuration
    /// - `SecretNotFound` if the referenced secret is missing
    /// - the tier's backend error if a lookup itself fails
    async fn resolve(
        &self,
        identity: &TenantIdentity,
    ) -> Result<TenantConfigSource, ReconcileError> {
        let tier = self.tier();

        let tenant = self
            .get_tenant(&identity.namespace, &identity.name)
            .await
            .map_err(|e| ReconcileError::from_directory(tier, e))?
            .ok_or_else(|| {
                ReconcileError::tenant_not_found(tier, &identity.namespace, &identity.name)
            })?;

        let secret_name = tenant.configuration_name().ok_or_else(|| {
            ReconcileError::configuration_unset(tier, &identity.namespace, &identity.name)
        })?;

        let secret = self
            .get_secret(&identity.namespace, secret_name)
            .await
            .map_err(|e| ReconcileError::from_directory(tier, e))?
            .ok_or_else(|| ReconcileError::secret_not_found(tier, &identity.namespace, secret_name))?;

        Ok(TenantConfigSource { tenant, secret })
    }
}

/// Type alias for a shareable directory.
pub type DynDirectory = Arc<dyn ResourceDirectory>;
