//! Rendering of the canonical configuration artifact.
//!
//! The artifact is the env file the storage process sources at startup:
//! one `export KEY="VALUE"` line per setting, sorted by key so that the
//! same tenant and secret state always renders byte-identical output.
//! Values are escaped so a POSIX shell sourcing the file sees exactly the
//! value the secret holds.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::MaterializeError;
use crate::types::{ConfigArtifact, TenantConfigSource, TenantRecord};

/// Secret key holding the tenant's env file.
pub const CONFIG_ENV_KEY: &str = "config.env";

pub const ROOT_USER_KEY: &str = "MINIO_ROOT_USER";
pub const ROOT_PASSWORD_KEY: &str = "MINIO_ROOT_PASSWORD";
const LEGACY_ACCESS_KEY: &str = "MINIO_ACCESS_KEY";
const LEGACY_SECRET_KEY: &str = "MINIO_SECRET_KEY";

/// Server arguments derived from the tenant's pools.
pub const SERVER_ARGS_KEY: &str = "MINIO_ARGS";

/// A rendered artifact plus the credential checks the orchestrator needs.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub artifact: ConfigArtifact,
    pub root_user_present: bool,
    pub root_password_present: bool,
}

impl Materialized {
    /// Both root credentials were found.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.root_user_present && self.root_password_present
    }
}

/// Turns tenant and secret state into the canonical configuration bytes.
pub trait Materializer: Send + Sync {
    fn materialize(&self, source: &TenantConfigSource) -> Result<Materialized, MaterializeError>;
}

/// Type alias for a shareable materializer.
pub type DynMaterializer = Arc<dyn Materializer>;

/// Renders the storage process env file.
#[derive(Debug, Clone)]
pub struct EnvFileMaterializer {
    cluster_domain: String,
}

impl Default for EnvFileMaterializer {
    fn default() -> Self {
        Self::new("cluster.local")
    }
}

impl EnvFileMaterializer {
    #[must_use]
    pub fn new(cluster_domain: impl Into<String>) -> Self {
        Self {
            cluster_domain: cluster_domain.into(),
        }
    }

    /// Ellipsis endpoints, one per pool.
    fn server_args(&self, tenant: &TenantRecord) -> Option<String> {
        let name = &tenant.metadata.name;
        let namespace = &tenant.metadata.namespace;
        let scheme = if tenant.spec.request_auto_cert.unwrap_or(true) {
            "https"
        } else {
            "http"
        };

        let endpoints: Vec<String> = tenant
            .spec
            .pools
            .iter()
            .enumerate()
            .filter(|(_, pool)| pool.servers > 0 && pool.volumes_per_server > 0)
            .map(|(index, pool)| {
                let pool_name = if pool.name.is_empty() {
                    format!("pool-{index}")
                } else {
                    pool.name.clone()
                };
                format!(
                    "{scheme}://{name}-{pool_name}-{{0...{}}}.{name}-hl.{namespace}.svc.{}/export{{0...{}}}",
                    pool.servers - 1,
                    self.cluster_domain,
                    pool.volumes_per_server - 1,
                )
            })
            .collect();

        (!endpoints.is_empty()).then(|| endpoints.join(" "))
    }
}

impl Materializer for EnvFileMaterializer {
    fn materialize(&self, source: &TenantConfigSource) -> Result<Materialized, MaterializeError> {
        let mut vars: BTreeMap<String, String> = BTreeMap::new();

        for env in &source.tenant.spec.env {
            if let Some(value) = &env.value {
                vars.insert(env.name.clone(), value.clone());
            }
        }

        if let Some(args) = self.server_args(&source.tenant) {
            vars.insert(SERVER_ARGS_KEY.to_string(), args);
        }

        // Secret settings take precedence over tenant-declared ones.
        if let Some(raw) = source.secret.get(CONFIG_ENV_KEY) {
            let contents =
                std::str::from_utf8(raw).map_err(|_| MaterializeError::InvalidUtf8 {
                    key: CONFIG_ENV_KEY.to_string(),
                })?;
            vars.extend(parse_env_file(contents));
        }

        normalize_legacy(&mut vars, LEGACY_ACCESS_KEY, ROOT_USER_KEY);
        normalize_legacy(&mut vars, LEGACY_SECRET_KEY, ROOT_PASSWORD_KEY);

        let root_user_present = vars.get(ROOT_USER_KEY).is_some_and(|v| !v.is_empty());
        let root_password_present = vars.get(ROOT_PASSWORD_KEY).is_some_and(|v| !v.is_empty());

        Ok(Materialized {
            artifact: ConfigArtifact::from(render_env_file(&vars)),
            root_user_present,
            root_password_present,
        })
    }
}

fn normalize_legacy(vars: &mut BTreeMap<String, String>, legacy: &str, current: &str) {
    if let Some(value) = vars.remove(legacy) {
        vars.entry(current.to_string()).or_insert(value);
    }
}

/// Parses `export KEY="VALUE"` / `KEY=VALUE` lines.
///
/// Blank lines, comments and lines without `=` are skipped. A single layer
/// of matching quotes around the value is removed; inside double quotes the
/// backslash escapes written by the renderer are undone.
pub fn parse_env_file(contents: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()));
    }
    vars
}

fn unquote(value: &str) -> String {
    let quoted = |q: char| value.len() >= 2 && value.starts_with(q) && value.ends_with(q);
    if quoted('\'') {
        return value[1..value.len() - 1].to_string();
    }
    if !quoted('"') {
        return value.to_string();
    }

    let inner = &value[1..value.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) if is_escaped(next) => out.push(next),
                Some(next) => {
                    out.push(c);
                    out.push(next);
                }
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Characters with special meaning inside a double-quoted shell string.
fn is_escaped(c: char) -> bool {
    matches!(c, '"' | '\\' | '$' | '`')
}

fn render_env_file(vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        out.push_str("export ");
        out.push_str(key);
        out.push_str("=\"");
        for c in value.chars() {
            if is_escaped(c) {
                out.push('\\');
            }
            out.push(c);
        }
        out.push_str("\"\n");
    }
    out
}
