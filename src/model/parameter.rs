//! Parameter identifiers and the values a parameter can take.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{
    AlertDescription, CertificateKeyPair, CipherSuite, CorruptionTarget, ExtensionType,
    NamedGroup, ProtocolVersion, SigHash,
};

/// A protocol dimension varied across test variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    CipherSuite,
    MirroredCipherSuite,
    NamedGroup,
    SigHashAlgorithm,
    Certificate,
    ProtocolVersion,
    Alert,
    RecordLength,
    TcpFragmentation,
    AppMsgLength,
    MacBitmask,
    CiphertextBitmask,
    AuthTagBitmask,
    PaddingBitmask,
    PrfBitmask,
    SignatureBitmask,
    BitPosition,
    GreaseCipherSuite,
    GreaseExtension,
    GreaseNamedGroup,
    IncludeRenegotiationExtension,
    IncludeExtendedMasterSecretExtension,
    IncludePaddingExtension,
    IncludeEncryptThenMacExtension,
    IncludeHeartbeatExtension,
    IncludeSessionTicketExtension,
    IncludeAlpnExtension,
    IncludeGreaseNamedGroups,
    AdditionalPaddingLength,
    CompressionMethod,
    MaxFragmentLength,
    HelloRetryCookie,
}

impl ParameterType {
    pub const ALL: [Self; 32] = [
        Self::CipherSuite,
        Self::MirroredCipherSuite,
        Self::NamedGroup,
        Self::SigHashAlgorithm,
        Self::Certificate,
        Self::ProtocolVersion,
        Self::Alert,
        Self::RecordLength,
        Self::TcpFragmentation,
        Self::AppMsgLength,
        Self::MacBitmask,
        Self::CiphertextBitmask,
        Self::AuthTagBitmask,
        Self::PaddingBitmask,
        Self::PrfBitmask,
        Self::SignatureBitmask,
        Self::BitPosition,
        Self::GreaseCipherSuite,
        Self::GreaseExtension,
        Self::GreaseNamedGroup,
        Self::IncludeRenegotiationExtension,
        Self::IncludeExtendedMasterSecretExtension,
        Self::IncludePaddingExtension,
        Self::IncludeEncryptThenMacExtension,
        Self::IncludeHeartbeatExtension,
        Self::IncludeSessionTicketExtension,
        Self::IncludeAlpnExtension,
        Self::IncludeGreaseNamedGroups,
        Self::AdditionalPaddingLength,
        Self::CompressionMethod,
        Self::MaxFragmentLength,
        Self::HelloRetryCookie,
    ];

    pub fn is_bitmask(self) -> bool {
        self.corruption_target().is_some()
    }

    pub fn corruption_target(self) -> Option<CorruptionTarget> {
        match self {
            Self::MacBitmask => Some(CorruptionTarget::Mac),
            Self::CiphertextBitmask => Some(CorruptionTarget::Ciphertext),
            Self::AuthTagBitmask => Some(CorruptionTarget::AuthTag),
            Self::PaddingBitmask => Some(CorruptionTarget::Padding),
            Self::PrfBitmask => Some(CorruptionTarget::PrfOutput),
            Self::SignatureBitmask => Some(CorruptionTarget::Signature),
            _ => None,
        }
    }

    /// Extension toggled by an `INCLUDE_*_EXTENSION` parameter.
    pub fn toggled_extension(self) -> Option<ExtensionType> {
        match self {
            Self::IncludeRenegotiationExtension => Some(ExtensionType::RenegotiationInfo),
            Self::IncludeExtendedMasterSecretExtension => Some(ExtensionType::ExtendedMasterSecret),
            Self::IncludePaddingExtension => Some(ExtensionType::Padding),
            Self::IncludeEncryptThenMacExtension => Some(ExtensionType::EncryptThenMac),
            Self::IncludeHeartbeatExtension => Some(ExtensionType::Heartbeat),
            Self::IncludeSessionTicketExtension => Some(ExtensionType::SessionTicket),
            Self::IncludeAlpnExtension => Some(ExtensionType::Alpn),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        // serde's SCREAMING_SNAKE_CASE form is the canonical name.
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{self:?}"))
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Identifies one parameter inside a model. Linked parameters (the bit
/// position of a bitmask) are scoped by the type that owns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterId {
    pub ty: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParameterType>,
}

impl ParameterId {
    pub const fn new(ty: ParameterType) -> Self {
        Self { ty, parent: None }
    }

    pub const fn linked(ty: ParameterType, parent: ParameterType) -> Self {
        Self {
            ty,
            parent: Some(parent),
        }
    }
}

impl From<ParameterType> for ParameterId {
    fn from(ty: ParameterType) -> Self {
        Self::new(ty)
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "{}[{}]", self.ty, parent),
            None => write!(f, "{}", self.ty),
        }
    }
}

/// One candidate or selected value. `Absent` is the "no value applicable"
/// sentinel (e.g. no signature scheme for a TLS 1.3 test that leaves it
/// optional).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Absent,
    CipherSuite(CipherSuite),
    NamedGroup(NamedGroup),
    SigHash(SigHash),
    Version(ProtocolVersion),
    Extension(ExtensionType),
    Alert(AlertDescription),
    Certificate(CertificateKeyPair),
    Number(u16),
    Flag(bool),
}

impl ParameterValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_cipher_suite(&self) -> Option<CipherSuite> {
        match self {
            Self::CipherSuite(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_named_group(&self) -> Option<NamedGroup> {
        match self {
            Self::NamedGroup(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_sig_hash(&self) -> Option<SigHash> {
        match self {
            Self::SigHash(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_certificate(&self) -> Option<&CertificateKeyPair> {
        match self {
            Self::Certificate(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u16> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("null"),
            Self::CipherSuite(v) => write!(f, "{v}"),
            Self::NamedGroup(v) => write!(f, "{v}"),
            Self::SigHash(v) => write!(f, "{v}"),
            Self::Version(v) => f.write_str(v.name()),
            Self::Extension(v) => write!(f, "{v}"),
            Self::Alert(v) => write!(f, "{v:?}"),
            Self::Certificate(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmask_types_are_detected_by_corruption_target() {
        let bitmasks: Vec<_> = ParameterType::ALL
            .into_iter()
            .filter(|ty| ty.is_bitmask())
            .collect();
        assert_eq!(bitmasks.len(), 6);
        assert!(!ParameterType::BitPosition.is_bitmask());
    }

    #[test]
    fn names_use_screaming_snake_case() {
        assert_eq!(ParameterType::CipherSuite.name(), "CIPHER_SUITE");
        assert_eq!(
            ParameterId::linked(ParameterType::BitPosition, ParameterType::MacBitmask).to_string(),
            "BIT_POSITION[MAC_BITMASK]"
        );
    }
}
