//! Background task keeping the snapshot warm.
//!
//! Polls an authoritative directory for the bound tenant and its
//! configuration secret and mirrors the answer into a
//! [`SnapshotDirectory`]. Failures leave the snapshot as it was and are
//! retried on the next tick. A refresher built with
//! [`SnapshotRefresher::until_synced`] stops after its first successful
//! pass instead of polling forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use cfgsync_core::{DirectoryError, DynDirectory, TenantIdentity};

use crate::snapshot::SnapshotDirectory;

pub struct SnapshotRefresher {
    source: DynDirectory,
    snapshot: Arc<SnapshotDirectory>,
    tenant: TenantIdentity,
    interval: Duration,
    until_synced: bool,
}

impl SnapshotRefresher {
    pub fn new(
        source: DynDirectory,
        snapshot: Arc<SnapshotDirectory>,
        tenant: TenantIdentity,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            snapshot,
            tenant,
            interval,
            until_synced: false,
        }
    }

    /// Stop once a pass succeeds. Failed passes are still retried every
    /// interval.
    #[must_use]
    pub fn until_synced(mut self) -> Self {
        self.until_synced = true;
        self
    }

    /// Runs one sync pass.
    ///
    /// # Errors
    ///
    /// Returns the source directory's error; the snapshot is not modified
    /// in that case.
    pub async fn sync_once(&self) -> Result<(), DirectoryError> {
        let ns = &self.tenant.namespace;
        let fetched = self.source.get_tenant(ns, &self.tenant.name).await?;
        let previous_secret = self
            .snapshot
            .tenant(ns, &self.tenant.name)
            .and_then(|t| t.configuration_name().map(str::to_string));

        let Some(tenant) = fetched else {
            self.snapshot.remove_tenant(ns, &self.tenant.name);
            if let Some(old) = previous_secret {
                self.snapshot.remove_secret(ns, &old);
            }
            tracing::debug!(tenant = %self.tenant, "tenant absent upstream; dropped from snapshot");
            self.snapshot.mark_synced();
            return Ok(());
        };

        let current_secret = tenant.configuration_name().map(str::to_string);
        if let Some(secret_name) = &current_secret {
            match self.source.get_secret(ns, secret_name).await? {
                Some(secret) => self.snapshot.upsert_secret(secret),
                None => {
                    self.snapshot.remove_secret(ns, secret_name);
                }
            }
        }
        if let Some(old) = previous_secret.filter(|old| current_secret.as_ref() != Some(old)) {
            self.snapshot.remove_secret(ns, &old);
        }

        self.snapshot.upsert_tenant(tenant);
        self.snapshot.mark_synced();
        tracing::debug!(tenant = %self.tenant, "snapshot refreshed");
        Ok(())
    }

    /// Starts polling in the background. The first pass runs immediately.
    pub fn spawn(self) -> RefresherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sync_once().await {
                            Ok(()) if self.until_synced => {
                                tracing::info!(tenant = %self.tenant, "initial snapshot sync complete");
                                break;
                            }
                            Ok(()) => {}
                            Err(e) => {
                                tracing::warn!(
                                    tenant = %self.tenant,
                                    error = %e,
                                    "snapshot refresh failed, keeping previous state"
                                );
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("snapshot refresher stopped");
        });

        RefresherHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running [`SnapshotRefresher`].
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stops the refresher and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}
