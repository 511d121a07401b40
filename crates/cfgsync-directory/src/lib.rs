//! Resource directories for cfgsync.
//!
//! Two implementations of `cfgsync_core::ResourceDirectory`:
//!
//! - [`SnapshotDirectory`]: the cached tier, an in-memory snapshot of the
//!   tenant and its secret, fed by a background watcher. Lookups never
//!   touch the network.
//! - [`ApiDirectory`]: the live tier, a synchronous read against the
//!   control plane's REST API.
//!
//! ```text
//! reconcile → local file → SnapshotDirectory (DashMap) → ApiDirectory (HTTP)
//!                              ↑
//!                      SnapshotRefresher (polls ApiDirectory)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cfgsync_directory::{ApiDirectory, ApiDirectoryConfig, SnapshotDirectory, SnapshotRefresher};
//!
//! let live = Arc::new(ApiDirectory::new(ApiDirectoryConfig::default())?);
//! let snapshot = Arc::new(SnapshotDirectory::new());
//! let refresher = SnapshotRefresher::new(live.clone(), snapshot.clone(), tenant, interval).spawn();
//! ```

pub mod api;
pub mod refresher;
pub mod snapshot;

pub use api::{ApiDirectory, ApiDirectoryConfig};
pub use refresher::{RefresherHandle, SnapshotRefresher};
pub use snapshot::SnapshotDirectory;

// Re-export the directory trait for convenience
pub use cfgsync_core::{DirectoryError, DynDirectory, ResourceDirectory};
