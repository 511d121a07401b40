use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Tenant binding and local artifact
    #[serde(default)]
    pub agent: AgentConfig,
    /// Live directory (control plane API)
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    /// Cached directory refresh
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub materializer: MaterializerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        // Agent validations
        if self.agent.namespace.trim().is_empty() {
            return Err("agent.namespace must be set".into());
        }
        if self.agent.tenant.trim().is_empty() {
            return Err("agent.tenant must be set".into());
        }
        if self.agent.config_file.as_os_str().is_empty() {
            return Err("agent.config_file must not be empty".into());
        }
        if self.agent.live_timeout_ms == 0 {
            return Err("agent.live_timeout_ms must be > 0".into());
        }
        if self.agent.live_timeout_ms > self.server.request_timeout_ms {
            return Err("agent.live_timeout_ms must be <= server.request_timeout_ms".into());
        }
        // Control plane validations
        let url = self.control_plane.url.to_ascii_lowercase();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("control_plane.url must be an http(s) URL".into());
        }
        if self.control_plane.timeout_ms == 0 {
            return Err("control_plane.timeout_ms must be > 0".into());
        }
        // Also the retry interval for the initial sync when polling is off
        if self.snapshot.refresh_interval_ms == 0 {
            return Err("snapshot.refresh_interval_ms must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.server.request_timeout_ms)
    }

    pub fn live_timeout(&self) -> Duration {
        Duration::from_millis(self.agent.live_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a whole request, including the live tier.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    4444
}
fn default_request_timeout_ms() -> u64 {
    60_000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Namespace of the bound tenant
    #[serde(default)]
    pub namespace: String,
    /// Name of the bound tenant
    #[serde(default)]
    pub tenant: String,
    /// Local configuration artifact the storage process reads
    #[serde(default = "default_config_file")]
    pub config_file: PathBuf,
    #[serde(default = "default_live_timeout_ms")]
    pub live_timeout_ms: u64,
}

fn default_config_file() -> PathBuf {
    PathBuf::from("/tmp/minio-config/config.env")
}
fn default_live_timeout_ms() -> u64 {
    10_000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            tenant: String::new(),
            config_file: default_config_file(),
            live_timeout_ms: default_live_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_control_plane_url")]
    pub url: String,
    /// Bearer token file, re-read on each call
    #[serde(default = "default_token_file")]
    pub token_file: Option<PathBuf>,
    /// Extra PEM CA bundle
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_tenant_group")]
    pub tenant_group: String,
    #[serde(default = "default_tenant_version")]
    pub tenant_version: String,
    #[serde(default = "default_control_plane_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_control_plane_url() -> String {
    "https://kubernetes.default.svc".into()
}
fn default_token_file() -> Option<PathBuf> {
    Some(PathBuf::from(
        "/var/run/secrets/kubernetes.io/serviceaccount/token",
    ))
}
fn default_tenant_group() -> String {
    "minio.min.io".into()
}
fn default_tenant_version() -> String {
    "v2".into()
}
fn default_control_plane_timeout_ms() -> u64 {
    10_000
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: default_control_plane_url(),
            token_file: default_token_file(),
            ca_file: None,
            tenant_group: default_tenant_group(),
            tenant_version: default_tenant_version(),
            timeout_ms: default_control_plane_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Poll the control plane to keep the cached tier warm
    #[serde(default = "default_snapshot_enabled")]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_snapshot_enabled() -> bool {
    true
}
fn default_refresh_interval_ms() -> u64 {
    30_000
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_snapshot_enabled(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializerConfig {
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
}

fn default_cluster_domain() -> String {
    "cluster.local".into()
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            cluster_domain: default_cluster_domain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("cfgsync.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., CFGSYNC__AGENT__TENANT=store
        builder = builder.add_source(
            Environment::with_prefix("CFGSYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
