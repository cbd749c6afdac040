//! Target capability snapshot and the provider seam used to probe it.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{
    CertificateKeyPair, CipherSuite, ExtensionType, MatrixError, MatrixResult, NamedGroup,
    ProtocolVersion, SigHash,
};

/// What the target under test supports. Read-only once the run context
/// holds it; every domain generator reads from the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCapabilities {
    #[serde(default)]
    pub versions: BTreeSet<ProtocolVersion>,
    /// TLS 1.2 and older suites.
    #[serde(default)]
    pub cipher_suites: BTreeSet<CipherSuite>,
    #[serde(default)]
    pub tls13_cipher_suites: BTreeSet<CipherSuite>,
    #[serde(default)]
    pub named_groups: BTreeSet<NamedGroup>,
    #[serde(default)]
    pub tls13_named_groups: BTreeSet<NamedGroup>,
    #[serde(default)]
    pub signature_algorithms: BTreeSet<SigHash>,
    #[serde(default)]
    pub extensions: BTreeSet<ExtensionType>,
    /// Certificates the tester may present.
    #[serde(default)]
    pub certificates: Vec<CertificateKeyPair>,
}

impl TargetCapabilities {
    pub fn supports_version(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(&version)
    }

    pub fn supports_extension(&self, ext: ExtensionType) -> bool {
        self.extensions.contains(&ext)
    }

    /// Suites for the requested protocol generation, in code-point order.
    pub fn suites_for(&self, tls13: bool) -> impl Iterator<Item = CipherSuite> + '_ {
        if tls13 {
            self.tls13_cipher_suites.iter().copied()
        } else {
            self.cipher_suites.iter().copied()
        }
    }

    pub fn load_json(path: &Path) -> MatrixResult<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            MatrixError::Capabilities(format!("invalid capability file {}: {e}", path.display()))
        })
    }
}

/// Identifies the peer to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

impl TargetSpec {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Probes a target once per run.
pub trait CapabilityProvider: Send + Sync {
    fn capabilities_of(&self, target: &TargetSpec) -> MatrixResult<TargetCapabilities>;
}

/// Serves a fixed snapshot, either in memory or from a JSON file on each probe.
#[derive(Debug, Clone)]
pub enum StaticCapabilityProvider {
    Snapshot(TargetCapabilities),
    File(PathBuf),
}

impl CapabilityProvider for StaticCapabilityProvider {
    fn capabilities_of(&self, target: &TargetSpec) -> MatrixResult<TargetCapabilities> {
        let caps = match self {
            Self::Snapshot(caps) => caps.clone(),
            Self::File(path) => TargetCapabilities::load_json(path)?,
        };
        if caps.cipher_suites.is_empty() && caps.tls13_cipher_suites.is_empty() {
            return Err(MatrixError::Capabilities(format!(
                "target {}:{} reports no cipher suites",
                target.host, target.port
            )));
        }
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_snapshot_parses_names() {
        let raw = r#"{
            "versions": ["tls12", "tls13"],
            "cipher_suites": [
                "TLS_RSA_WITH_AES_128_CBC_SHA",
                "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"
            ],
            "tls13_cipher_suites": ["TLS_AES_128_GCM_SHA256"],
            "named_groups": ["secp256r1", "x25519"],
            "signature_algorithms": [{"signature": "rsa_pss_rsae", "hash": "sha256"}],
            "extensions": ["extended_master_secret", "encrypt_then_mac"],
            "certificates": [{"label": "rsa2048", "key_type": "rsa", "key_size": 2048}]
        }"#;
        let caps: TargetCapabilities = serde_json::from_str(raw).expect("parse");
        assert_eq!(caps.cipher_suites.len(), 2);
        assert!(caps.named_groups.contains(&NamedGroup::X25519));
        assert!(caps.supports_extension(ExtensionType::EncryptThenMac));
        assert!(caps.supports_version(ProtocolVersion::Tls13));
    }

    #[test]
    fn static_provider_rejects_empty_snapshot() {
        let provider = StaticCapabilityProvider::Snapshot(TargetCapabilities::default());
        let err = provider
            .capabilities_of(&TargetSpec::new("localhost", 4433))
            .expect_err("empty snapshot");
        assert!(matches!(err, MatrixError::Capabilities(_)));
    }
}
