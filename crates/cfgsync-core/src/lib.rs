//! # cfgsync-core
//!
//! Tiered reconciliation of a node-local configuration artifact against the
//! canonical configuration held by the cluster control plane.
//!
//! ## Overview
//!
//! A caller asks "does the local artifact hash to `H`?" and [`reconcile`]
//! answers with escalating cost and authority:
//!
//! 1. the persisted artifact on disk ([`ArtifactStore`]),
//! 2. a locally cached snapshot of cluster state ([`ResourceDirectory`] with
//!    [`Tier::Cached`]),
//! 3. a live read against the control plane ([`ResourceDirectory`] with
//!    [`Tier::Live`]).
//!
//! The first tier whose digest matches wins; a matching cached or live
//! artifact is written through to disk atomically so the next poll is a
//! local match.
//!
//! This crate defines the seams and the orchestrator. Concrete directories
//! live in `cfgsync-directory`.
//!
//! ## Example
//!
//! ```ignore
//! use cfgsync_core::{Digest, ReconcileContext, reconcile};
//!
//! async fn check(ctx: &ReconcileContext, requested: &str) -> Result<(), cfgsync_core::ReconcileError> {
//!     let digest = Digest::parse(requested)?;
//!     let outcome = reconcile(ctx, &digest).await?;
//!     tracing::info!(verdict = %outcome.verdict, "config checked");
//!     Ok(())
//! }
//! ```

pub mod directory;
mod error;
pub mod materializer;
pub mod reconcile;
pub mod store;
mod types;

pub use directory::{DynDirectory, ResourceDirectory};
pub use error::{DirectoryError, ErrorCategory, MaterializeError, ReconcileError, StoreError};
pub use materializer::{
    DynMaterializer, EnvFileMaterializer, Materialized, Materializer, ROOT_PASSWORD_KEY,
    ROOT_USER_KEY,
};
pub use reconcile::{ReconcileContext, reconcile, reconcile_until};
pub use store::{ArtifactStore, DynArtifactStore, FsArtifactStore, read_local};
pub use types::{
    ConfigArtifact, Digest, EnvVar, LocalObjectReference, ObjectMeta, Pool, ReconcileOutcome,
    SecretRecord, TenantConfigSource, TenantIdentity, TenantRecord, TenantSpec, Tier, Verdict,
};
