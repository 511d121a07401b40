use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cfgsync_core::{
    ConfigArtifact, DirectoryError, EnvFileMaterializer, FsArtifactStore, Materializer,
    ReconcileContext, ResourceDirectory, SecretRecord, TenantConfigSource, TenantIdentity,
    TenantRecord, Tier,
};
use cfgsync_directory::{SnapshotDirectory, SnapshotRefresher};
use cfgsync_server::{AppConfig, AppState, ServerBuilder, build_app};
use serde_json::Value;
use tokio::task::JoinHandle;

const NS: &str = "tenant-ns";
const TENANT: &str = "store";
const SECRET: &str = "store-env";

/// Snapshot-backed stand-in for the control plane.
#[derive(Default)]
struct LiveDirectory(SnapshotDirectory);

#[async_trait]
impl ResourceDirectory for LiveDirectory {
    fn tier(&self) -> Tier {
        Tier::Live
    }

    async fn get_tenant(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        Ok(self.0.tenant(namespace, name))
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretRecord>, DirectoryError> {
        Ok(self.0.secret(namespace, name))
    }
}

fn tenant() -> TenantRecord {
    TenantRecord::new(NS, TENANT).with_configuration(SECRET)
}

fn secret(password: &str) -> SecretRecord {
    SecretRecord::new(NS, SECRET).with_entry(
        "config.env",
        format!("export MINIO_ROOT_USER=\"admin\"\nexport MINIO_ROOT_PASSWORD=\"{password}\"\n"),
    )
}

fn render(password: &str) -> ConfigArtifact {
    EnvFileMaterializer::default()
        .materialize(&TenantConfigSource {
            tenant: tenant(),
            secret: secret(password),
        })
        .unwrap()
        .artifact
}

struct Harness {
    cached: Arc<SnapshotDirectory>,
    live: Arc<LiveDirectory>,
    state: AppState,
}

fn harness(config_file: &Path) -> Harness {
    let cached = Arc::new(SnapshotDirectory::new());
    let live = Arc::new(LiveDirectory::default());
    let ctx = ReconcileContext::new(
        TenantIdentity::new(NS, TENANT),
        cached.clone(),
        live.clone(),
        Arc::new(FsArtifactStore::new(config_file)),
        Arc::new(EnvFileMaterializer::default()),
    );
    let state = AppState::new(ctx, AppConfig::default().request_timeout())
        .with_snapshot(cached.clone());
    Harness {
        cached,
        live,
        state,
    }
}

async fn start_server(state: AppState) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(state, &AppConfig::default());

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

async fn check(client: &reqwest::Client, base: &str, digest: &str) -> (u16, Value) {
    let resp = client
        .post(format!("{base}/sidecar/v1/config?c={digest}"))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_and_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir.path().join("config.env"));
    let (base, shutdown_tx, handle) = start_server(h.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "syncing");

    h.cached.mark_synced();
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");

    let resp = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir.path().join("config.env"));
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    let generated = resp.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(generated.len(), 36);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn local_match_leaves_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    let artifact = render("secret");
    std::fs::write(&path, artifact.as_bytes()).unwrap();

    let h = harness(&path);
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let digest = artifact.digest();
    let (status, body) = check(&client, &base, digest.as_str()).await;
    assert_eq!(status, 200);
    assert_eq!(body["verdict"], "local_match");
    assert_eq!(body["digest"], digest.as_str());
    assert_eq!(body["wrote"], false);

    // Uppercase hex is accepted and normalised.
    let (status, body) = check(&client, &base, &digest.as_str().to_ascii_uppercase()).await;
    assert_eq!(status, 200);
    assert_eq!(body["digest"], digest.as_str());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn cached_match_writes_through() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    std::fs::write(&path, "export STALE=\"1\"\n").unwrap();

    let h = harness(&path);
    h.cached.upsert_tenant(tenant());
    h.cached.upsert_secret(secret("secret"));
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let artifact = render("secret");
    let (status, body) = check(&client, &base, artifact.digest().as_str()).await;
    assert_eq!(status, 200);
    assert_eq!(body["verdict"], "cached_match");
    assert_eq!(body["wrote"], true);
    assert_eq!(std::fs::read(&path).unwrap(), artifact.as_bytes());

    // The next poll is answered locally.
    let (status, body) = check(&client, &base, artifact.digest().as_str()).await;
    assert_eq!(status, 200);
    assert_eq!(body["verdict"], "local_match");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn live_match_when_snapshot_is_stale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    std::fs::write(&path, render("old").as_bytes()).unwrap();

    let h = harness(&path);
    h.cached.upsert_tenant(tenant());
    h.cached.upsert_secret(secret("old"));
    h.live.0.upsert_tenant(tenant());
    h.live.0.upsert_secret(secret("rotated"));
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let artifact = render("rotated");
    let (status, body) = check(&client, &base, artifact.digest().as_str()).await;
    assert_eq!(status, 200);
    assert_eq!(body["verdict"], "live_match");
    assert_eq!(body["wrote"], true);
    assert_eq!(std::fs::read(&path).unwrap(), artifact.as_bytes());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn unresolvable_reports_canonical_digest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    let current = render("secret");
    std::fs::write(&path, current.as_bytes()).unwrap();

    let h = harness(&path);
    h.cached.upsert_tenant(tenant());
    h.cached.upsert_secret(secret("secret"));
    h.live.0.upsert_tenant(tenant());
    h.live.0.upsert_secret(secret("secret"));
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let bogus = render("never-deployed").digest();
    let (status, body) = check(&client, &base, bogus.as_str()).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "unresolvable");
    assert_eq!(body["error"]["category"], "mismatch");
    assert_eq!(body["requested_digest"], bogus.as_str());
    assert_eq!(body["canonical_digest"], current.digest().as_str());
    assert_eq!(std::fs::read(&path).unwrap(), current.as_bytes());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn request_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    let h = harness(&path);
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let (status, body) = check(&client, &base, "not-a-digest").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "invalid_digest");
    assert_eq!(body["error"]["category"], "validation");

    let resp = client
        .post(format!("{base}/sidecar/v1/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    // No local artifact yet: the request fails without escalating.
    let digest = render("secret").digest();
    let (status, body) = check(&client, &base, digest.as_str()).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "local_read_error");
    assert!(!path.exists());

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn cached_tier_errors_are_not_escalated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.env");
    std::fs::write(&path, "export STALE=\"1\"\n").unwrap();

    let h = harness(&path);
    h.cached.upsert_tenant(TenantRecord::new(NS, TENANT));
    h.live.0.upsert_tenant(tenant());
    h.live.0.upsert_secret(secret("secret"));
    let (base, shutdown_tx, handle) = start_server(h.state).await;
    let client = reqwest::Client::new();

    let (status, body) = check(&client, &base, render("secret").digest().as_str()).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "configuration_unset");
    assert_eq!(body["error"]["category"], "resource_state");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn shutdown_stops_refresher_before_server_exits() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    let dir = tempfile::tempdir().unwrap();
    let h = harness(&dir.path().join("config.env"));
    h.live.0.upsert_tenant(tenant());
    h.live.0.upsert_secret(secret("secret"));

    let refresher = SnapshotRefresher::new(
        h.live.clone(),
        h.cached.clone(),
        TenantIdentity::new(NS, TENANT),
        Duration::from_millis(10),
    )
    .spawn();

    let stopped = Arc::new(AtomicBool::new(false));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = {
        let stopped = stopped.clone();
        async move {
            let _ = rx.await;
            refresher.shutdown().await;
            stopped.store(true, Ordering::SeqCst);
        }
    };

    let server = ServerBuilder::new(h.state)
        .with_addr((std::net::Ipv4Addr::LOCALHOST, 0).into())
        .build();
    let running = tokio::spawn(server.run_with_shutdown(shutdown));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.cached.last_synced().is_some());
    assert!(h.cached.secret(NS, SECRET).is_some());

    let _ = tx.send(());
    running.await.unwrap().unwrap();
    assert!(stopped.load(Ordering::SeqCst));
}
