//! Tiered reconciliation of the local configuration artifact.
//!
//! Each request walks `CheckLocal -> CheckCached -> CheckLive -> Done`,
//! stopping at the first tier whose digest equals the requested one. Tiers
//! are strictly sequential so the cheapest check always gets the chance to
//! short-circuit. A resolver failure ends the request: escalating past
//! missing resource state would not produce a different answer.

use std::time::Duration;

use tokio::time::Instant;
use tracing::instrument;

use crate::directory::{DynDirectory, ResourceDirectory};
use crate::error::ReconcileError;
use crate::materializer::{DynMaterializer, Materializer};
use crate::store::{DynArtifactStore, read_local};
use crate::types::{ConfigArtifact, Digest, ReconcileOutcome, TenantIdentity, Verdict};

/// Default budget for the live tier.
pub const DEFAULT_LIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators for one agent, passed explicitly into every request.
#[derive(Clone)]
pub struct ReconcileContext {
    pub tenant: TenantIdentity,
    pub cached: DynDirectory,
    pub live: DynDirectory,
    pub store: DynArtifactStore,
    pub materializer: DynMaterializer,
    pub live_timeout: Duration,
}

impl ReconcileContext {
    pub fn new(
        tenant: TenantIdentity,
        cached: DynDirectory,
        live: DynDirectory,
        store: DynArtifactStore,
        materializer: DynMaterializer,
    ) -> Self {
        Self {
            tenant,
            cached,
            live,
            store,
            materializer,
            live_timeout: DEFAULT_LIVE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_live_timeout(mut self, timeout: Duration) -> Self {
        self.live_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ReconcileContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileContext")
            .field("tenant", &self.tenant)
            .field("artifact", &self.store.path())
            .field("live_timeout", &self.live_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Stage {
    CheckLocal,
    CheckCached,
    CheckLive,
    Done { verdict: Verdict, wrote: bool },
}

enum TierCheck {
    Match(ConfigArtifact),
    Miss(Digest),
}

/// Reconciles against `requested` with only the context's live timeout as
/// the bound on the control-plane call.
///
/// # Errors
///
/// See [`reconcile_until`].
pub async fn reconcile(
    ctx: &ReconcileContext,
    requested: &Digest,
) -> Result<ReconcileOutcome, ReconcileError> {
    reconcile_until(ctx, requested, Instant::now() + ctx.live_timeout).await
}

/// Reconciles the local artifact against `requested`.
///
/// The live tier is bounded by the earlier of `deadline` and the context's
/// live timeout.
///
/// # Errors
///
/// - `LocalRead` if the local artifact cannot be read (no escalation)
/// - the cached or live tier's resolution error (no further escalation)
/// - `LiveCallTimedOut` if the live tier exceeds its budget
/// - `Unresolvable` if the live canonical digest differs from `requested`
/// - `WriteError` if a match was found but could not be persisted
#[instrument(skip_all, fields(tenant = %ctx.tenant, requested = %requested))]
pub async fn reconcile_until(
    ctx: &ReconcileContext,
    requested: &Digest,
    deadline: Instant,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut stage = Stage::CheckLocal;

    loop {
        tracing::debug!(stage = ?stage, "reconcile stage");
        stage = match stage {
            Stage::CheckLocal => {
                let (_, local) = read_local(ctx.store.as_ref()).await?;
                if local == *requested {
                    Stage::Done {
                        verdict: Verdict::LocalMatch,
                        wrote: false,
                    }
                } else {
                    tracing::debug!(local = %local, "local digest differs");
                    Stage::CheckCached
                }
            }
            Stage::CheckCached => match check_tier(ctx, ctx.cached.as_ref(), requested).await? {
                TierCheck::Match(artifact) => {
                    write_through(ctx, &artifact).await?;
                    Stage::Done {
                        verdict: Verdict::CachedMatch,
                        wrote: true,
                    }
                }
                TierCheck::Miss(cached) => {
                    tracing::debug!(cached = %cached, "cached digest differs");
                    Stage::CheckLive
                }
            },
            Stage::CheckLive => {
                let now = Instant::now();
                let budget = ctx.live_timeout.min(deadline.saturating_duration_since(now));
                let check = tokio::time::timeout_at(
                    now + budget,
                    check_tier(ctx, ctx.live.as_ref(), requested),
                )
                .await
                .map_err(|_| ReconcileError::LiveCallTimedOut { timeout: budget })??;

                match check {
                    TierCheck::Match(artifact) => {
                        write_through(ctx, &artifact).await?;
                        Stage::Done {
                            verdict: Verdict::LiveMatch,
                            wrote: true,
                        }
                    }
                    TierCheck::Miss(canonical) => {
                        return Err(ReconcileError::Unresolvable {
                            requested: requested.clone(),
                            canonical,
                        });
                    }
                }
            }
            Stage::Done { verdict, wrote } => {
                tracing::info!(verdict = %verdict, wrote, "configuration reconciled");
                return Ok(ReconcileOutcome {
                    verdict,
                    digest: requested.clone(),
                    wrote,
                });
            }
        };
    }
}

/// Resolves and renders the canonical artifact at one tier.
async fn check_tier(
    ctx: &ReconcileContext,
    directory: &dyn ResourceDirectory,
    requested: &Digest,
) -> Result<TierCheck, ReconcileError> {
    let tier = directory.tier();
    let source = directory.resolve(&ctx.tenant).await?;
    let rendered = ctx.materializer.materialize(&source).map_err(|source_err| {
        ReconcileError::SecretMalformed {
            tier,
            namespace: source.secret.namespace.clone(),
            name: source.secret.name.clone(),
            source: source_err,
        }
    })?;
    if !rendered.has_credentials() {
        return Err(ReconcileError::CredentialsIncomplete {
            tier,
            root_user: rendered.root_user_present,
            root_password: rendered.root_password_present,
        });
    }

    let digest = rendered.artifact.digest();
    if digest == *requested {
        Ok(TierCheck::Match(rendered.artifact))
    } else {
        Ok(TierCheck::Miss(digest))
    }
}

async fn write_through(
    ctx: &ReconcileContext,
    artifact: &ConfigArtifact,
) -> Result<(), ReconcileError> {
    ctx.store.write_atomic(artifact).await?;
    Ok(())
}
