//! Data types shared by the directories, the store and the orchestrator.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::ReconcileError;

/// Length of a hex-encoded SHA-256 digest.
pub const DIGEST_HEX_LEN: usize = 64;

// ==================== Digest ====================

/// Lowercase hex SHA-256 of a configuration artifact.
///
/// Two artifacts with equal digests are interchangeable for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Hashes `bytes` with SHA-256.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parses a caller-supplied digest.
    ///
    /// Uppercase hex is accepted and normalised.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidDigest` unless `value` is exactly
    /// 64 hexadecimal characters.
    pub fn parse(value: &str) -> Result<Self, ReconcileError> {
        let valid = value.len() == DIGEST_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(ReconcileError::invalid_digest(value));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = ReconcileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

// ==================== ConfigArtifact ====================

/// The fully rendered configuration for one tenant.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ConfigArtifact(Vec<u8>);

impl ConfigArtifact {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Content digest of the artifact.
    #[must_use]
    pub fn digest(&self) -> Digest {
        Digest::of(&self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Artifacts carry root credentials; never print their content.
impl fmt::Debug for ConfigArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigArtifact")
            .field("len", &self.0.len())
            .field("digest", &self.digest().as_str())
            .finish()
    }
}

impl From<Vec<u8>> for ConfigArtifact {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<String> for ConfigArtifact {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&str> for ConfigArtifact {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

// ==================== Resource state ====================

/// The tenant this agent is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub namespace: String,
    pub name: String,
}

impl TenantIdentity {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TenantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Name and namespace of a control-plane object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Reference to an object in the same namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

/// Environment variable declared on the tenant.
///
/// Only literal values are rendered; `valueFrom` references resolve inside
/// the pod and are ignored here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A server pool of the tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(default)]
    pub name: String,
    pub servers: u32,
    pub volumes_per_server: u32,
}

/// The subset of the tenant specification the materializer consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Secret holding the tenant's `config.env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pools: Vec<Pool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_auto_cert: Option<bool>,
}

/// Tenant resource as seen by the directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: TenantSpec,
}

impl TenantRecord {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
            },
            spec: TenantSpec::default(),
        }
    }

    /// Sets the configuration secret reference.
    #[must_use]
    pub fn with_configuration(mut self, secret_name: impl Into<String>) -> Self {
        self.spec.configuration = Some(LocalObjectReference {
            name: secret_name.into(),
        });
        self
    }

    /// Adds a literal environment variable.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.push(EnvVar {
            name: name.into(),
            value: Some(value.into()),
        });
        self
    }

    /// Adds a server pool.
    #[must_use]
    pub fn with_pool(mut self, name: impl Into<String>, servers: u32, volumes: u32) -> Self {
        self.spec.pools.push(Pool {
            name: name.into(),
            servers,
            volumes_per_server: volumes,
        });
        self
    }

    /// Name of the configuration secret, if one is declared.
    #[must_use]
    pub fn configuration_name(&self) -> Option<&str> {
        self.spec
            .configuration
            .as_ref()
            .map(|r| r.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

/// Secret resource with decoded values.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretRecord {
    pub namespace: String,
    pub name: String,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl SecretRecord {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(Vec::as_slice)
    }
}

impl fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretRecord")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Everything the materializer needs to render a tenant's configuration.
#[derive(Debug, Clone)]
pub struct TenantConfigSource {
    pub tenant: TenantRecord,
    pub secret: SecretRecord,
}

// ==================== Verdicts ====================

/// Source of configuration truth, ordered by cost and authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Local,
    Cached,
    Live,
}

impl Tier {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cached => "cached",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful reconciliation verdict.
///
/// The unresolvable case is `ReconcileError::Unresolvable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    LocalMatch,
    CachedMatch,
    LiveMatch,
}

impl Verdict {
    /// The tier that produced this verdict.
    #[must_use]
    pub fn tier(&self) -> Tier {
        match self {
            Self::LocalMatch => Tier::Local,
            Self::CachedMatch => Tier::Cached,
            Self::LiveMatch => Tier::Live,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalMatch => "local_match",
            Self::CachedMatch => "cached_match",
            Self::LiveMatch => "live_match",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one reconciliation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub verdict: Verdict,
    pub digest: Digest,
    /// Whether the local artifact was replaced.
    pub wrote: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_of_known_value() {
        assert_eq!(
            Digest::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(Digest::of(b"abc").as_str().len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_digest_parse() {
        let upper = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";
        let parsed = Digest::parse(upper).unwrap();
        assert_eq!(parsed, Digest::of(b""));

        assert!(Digest::parse("abc123").unwrap_err().is_invalid_digest());
        assert!(Digest::parse(&"g".repeat(64)).is_err());
        assert!(Digest::parse(&"a".repeat(65)).is_err());
        assert!(Digest::parse("").is_err());
    }

    #[test]
    fn test_digest_serde_validates() {
        let json = format!("\"{}\"", Digest::of(b"x"));
        let back: Digest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Digest::of(b"x"));
        assert!(serde_json::from_str::<Digest>("\"nope\"").is_err());
    }

    #[test]
    fn test_artifact_debug_hides_content() {
        let artifact = ConfigArtifact::from("export MINIO_ROOT_PASSWORD=\"hunter2\"\n");
        let printed = format!("{artifact:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("len"));
    }

    #[test]
    fn test_tenant_record_deserializes_camel_case() {
        let json = serde_json::json!({
            "metadata": {"name": "store", "namespace": "tenant-ns"},
            "spec": {
                "configuration": {"name": "store-env"},
                "env": [{"name": "MINIO_BROWSER", "value": "off"}, {"name": "FROM_REF"}],
                "pools": [{"name": "pool-0", "servers": 4, "volumesPerServer": 2}],
                "requestAutoCert": false,
                "image": "ignored"
            }
        });
        let tenant: TenantRecord = serde_json::from_value(json).unwrap();
        assert_eq!(tenant.configuration_name(), Some("store-env"));
        assert_eq!(tenant.spec.env.len(), 2);
        assert_eq!(tenant.spec.env[1].value, None);
        assert_eq!(tenant.spec.pools[0].volumes_per_server, 2);
        assert_eq!(tenant.spec.request_auto_cert, Some(false));
    }

    #[test]
    fn test_empty_configuration_name_is_unset() {
        let tenant = TenantRecord::new("ns", "t").with_configuration("");
        assert_eq!(tenant.configuration_name(), None);
    }

    #[test]
    fn test_verdict_labels() {
        assert_eq!(Verdict::CachedMatch.to_string(), "cached_match");
        assert_eq!(Verdict::LiveMatch.tier(), Tier::Live);
        assert_eq!(
            serde_json::to_value(Verdict::LocalMatch).unwrap(),
            serde_json::json!("local_match")
        );
    }
}
