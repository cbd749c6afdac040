//! TLS vocabulary used by the parameter model: cipher suites with their
//! resolved algorithm properties, groups, signature schemes, versions,
//! extensions, alerts and certificates.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{MatrixError, MatrixResult};

/// GREASE code points reserved by RFC 8701 for cipher suites, groups,
/// extensions and versions.
pub const GREASE_VALUES: [u16; 16] = [
    0x0A0A, 0x1A1A, 0x2A2A, 0x3A3A, 0x4A4A, 0x5A5A, 0x6A6A, 0x7A7A, 0x8A8A, 0x9A9A, 0xAAAA, 0xBABA,
    0xCACA, 0xDADA, 0xEAEA, 0xFAFA,
];

pub fn is_grease(value: u16) -> bool {
    (value & 0x0F0F) == 0x0A0A && (value >> 8) == (value & 0x00FF)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl ProtocolVersion {
    pub fn code(self) -> u16 {
        match self {
            Self::Ssl3 => 0x0300,
            Self::Tls10 => 0x0301,
            Self::Tls11 => 0x0302,
            Self::Tls12 => 0x0303,
            Self::Tls13 => 0x0304,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ssl3 => "SSL3",
            Self::Tls10 => "TLS10",
            Self::Tls11 => "TLS11",
            Self::Tls12 => "TLS12",
            Self::Tls13 => "TLS13",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExchangeAlgorithm {
    Rsa,
    DheRsa,
    DheDss,
    DhRsa,
    DhDss,
    EcdheRsa,
    EcdheEcdsa,
    EcdhRsa,
    EcdhEcdsa,
    DhAnon,
    EcdhAnon,
    /// TLS 1.3 suites do not fix a key exchange.
    Tls13,
}

impl KeyExchangeAlgorithm {
    pub fn is_ecdh(self) -> bool {
        matches!(
            self,
            Self::EcdheRsa | Self::EcdheEcdsa | Self::EcdhRsa | Self::EcdhEcdsa | Self::EcdhAnon
        )
    }

    pub fn is_ephemeral(self) -> bool {
        matches!(
            self,
            Self::DheRsa
                | Self::DheDss
                | Self::EcdheRsa
                | Self::EcdheEcdsa
                | Self::DhAnon
                | Self::EcdhAnon
                | Self::Tls13
        )
    }

    pub fn uses_server_key_exchange(self) -> bool {
        self.is_ephemeral() && self != Self::Tls13
    }

    pub fn key_exchange_type(self) -> KeyExchangeType {
        match self {
            Self::Rsa => KeyExchangeType::Rsa,
            Self::DheRsa | Self::DheDss | Self::DhRsa | Self::DhDss | Self::DhAnon => {
                KeyExchangeType::Dh
            }
            Self::EcdheRsa
            | Self::EcdheEcdsa
            | Self::EcdhRsa
            | Self::EcdhEcdsa
            | Self::EcdhAnon => KeyExchangeType::Ecdh,
            Self::Tls13 => KeyExchangeType::All13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExchangeType {
    Rsa,
    Dh,
    Ecdh,
    /// Every TLS 1.2 key exchange.
    All12,
    /// Every TLS 1.3 suite.
    All13,
}

/// Key-exchange families a test is able to run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExchangeRequirement {
    pub supported: BTreeSet<KeyExchangeType>,
    /// Only suites that send a ServerKeyExchange message qualify.
    #[serde(default)]
    pub requires_server_key_exchange: bool,
}

impl Default for KeyExchangeRequirement {
    fn default() -> Self {
        Self::new([KeyExchangeType::All12])
    }
}

impl KeyExchangeRequirement {
    pub fn new(types: impl IntoIterator<Item = KeyExchangeType>) -> Self {
        Self {
            supported: types.into_iter().collect(),
            requires_server_key_exchange: false,
        }
    }

    pub fn tls13() -> Self {
        Self::new([KeyExchangeType::All13])
    }

    pub fn requiring_server_key_exchange(mut self) -> Self {
        self.requires_server_key_exchange = true;
        self
    }

    pub fn supports(&self, ty: KeyExchangeType) -> bool {
        if self.supported.contains(&ty) {
            return true;
        }
        matches!(
            ty,
            KeyExchangeType::Rsa | KeyExchangeType::Dh | KeyExchangeType::Ecdh
        ) && self.supported.contains(&KeyExchangeType::All12)
    }

    pub fn supports_tls12(&self) -> bool {
        [KeyExchangeType::Rsa, KeyExchangeType::Dh, KeyExchangeType::Ecdh]
            .into_iter()
            .any(|ty| self.supports(ty))
    }

    pub fn is_tls13(&self) -> bool {
        self.supports(KeyExchangeType::All13)
    }

    pub fn target_version(&self) -> ProtocolVersion {
        if self.is_tls13() {
            ProtocolVersion::Tls13
        } else {
            ProtocolVersion::Tls12
        }
    }

    /// Unresolvable suites are never compatible.
    pub fn compatible_with(&self, suite: CipherSuite) -> bool {
        let Ok(info) = suite.info() else {
            return false;
        };
        if info.kx == KeyExchangeAlgorithm::Tls13 {
            return self.is_tls13();
        }
        self.supports(info.kx.key_exchange_type())
            && (!self.requires_server_key_exchange || info.kx.uses_server_key_exchange())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherType {
    Stream,
    Block,
    Aead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HkdfAlgorithm {
    Sha256,
    Sha384,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateKeyType {
    Rsa,
    Ecdsa,
    Ecdh,
    Dss,
    Dh,
}

/// Resolved properties of a known cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuiteInfo {
    pub id: u16,
    pub name: &'static str,
    pub kx: KeyExchangeAlgorithm,
    pub cipher: CipherType,
    pub block_size: u8,
    pub mac_len: u8,
}

macro_rules! suite {
    ($id:expr, $name:expr, $kx:ident, $cipher:ident, $block:expr, $mac:expr) => {
        CipherSuiteInfo {
            id: $id,
            name: $name,
            kx: KeyExchangeAlgorithm::$kx,
            cipher: CipherType::$cipher,
            block_size: $block,
            mac_len: $mac,
        }
    };
}

const CIPHER_SUITES: &[CipherSuiteInfo] = &[
    suite!(0x000A, "TLS_RSA_WITH_3DES_EDE_CBC_SHA", Rsa, Block, 8, 20),
    suite!(0x002F, "TLS_RSA_WITH_AES_128_CBC_SHA", Rsa, Block, 16, 20),
    suite!(0x0033, "TLS_DHE_RSA_WITH_AES_128_CBC_SHA", DheRsa, Block, 16, 20),
    suite!(0x0032, "TLS_DHE_DSS_WITH_AES_128_CBC_SHA", DheDss, Block, 16, 20),
    suite!(0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA", Rsa, Block, 16, 20),
    suite!(0x003C, "TLS_RSA_WITH_AES_128_CBC_SHA256", Rsa, Block, 16, 32),
    suite!(0x0034, "TLS_DH_anon_WITH_AES_128_CBC_SHA", DhAnon, Block, 16, 20),
    suite!(0x0030, "TLS_DH_DSS_WITH_AES_128_CBC_SHA", DhDss, Block, 16, 20),
    suite!(0x0031, "TLS_DH_RSA_WITH_AES_128_CBC_SHA", DhRsa, Block, 16, 20),
    suite!(0x009C, "TLS_RSA_WITH_AES_128_GCM_SHA256", Rsa, Aead, 0, 0),
    suite!(0x009E, "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256", DheRsa, Aead, 0, 0),
    suite!(0xC004, "TLS_ECDH_ECDSA_WITH_AES_128_CBC_SHA", EcdhEcdsa, Block, 16, 20),
    suite!(0xC00E, "TLS_ECDH_RSA_WITH_AES_128_CBC_SHA", EcdhRsa, Block, 16, 20),
    suite!(0xC011, "TLS_ECDHE_RSA_WITH_RC4_128_SHA", EcdheRsa, Stream, 0, 20),
    suite!(0xC013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA", EcdheRsa, Block, 16, 20),
    suite!(0xC018, "TLS_ECDH_anon_WITH_AES_128_CBC_SHA", EcdhAnon, Block, 16, 20),
    suite!(0xC027, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256", EcdheRsa, Block, 16, 32),
    suite!(0xC02B, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256", EcdheEcdsa, Aead, 0, 0),
    suite!(0xC02F, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256", EcdheRsa, Aead, 0, 0),
    suite!(0xC030, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384", EcdheRsa, Aead, 0, 0),
    suite!(0xC0AE, "TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8", EcdheEcdsa, Aead, 0, 0),
    suite!(0xCCA8, "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256", EcdheRsa, Aead, 0, 0),
    suite!(0x1301, "TLS_AES_128_GCM_SHA256", Tls13, Aead, 0, 0),
    suite!(0x1302, "TLS_AES_256_GCM_SHA384", Tls13, Aead, 0, 0),
    suite!(0x1303, "TLS_CHACHA20_POLY1305_SHA256", Tls13, Aead, 0, 0),
    suite!(0x1305, "TLS_AES_128_CCM_8_SHA256", Tls13, Aead, 0, 0),
];

/// A cipher suite code point. Properties resolve through a static table;
/// GREASE and unknown code points fail to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub const TLS_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x002F);
    pub const TLS_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0x009C);
    pub const TLS_DHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0x0033);
    pub const TLS_ECDH_ECDSA_WITH_AES_128_CBC_SHA: Self = Self(0xC004);
    pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA: Self = Self(0xC013);
    pub const TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256: Self = Self(0xC027);
    pub const TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256: Self = Self(0xC02F);
    pub const TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256: Self = Self(0xC02B);
    pub const TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8: Self = Self(0xC0AE);
    pub const TLS_AES_128_GCM_SHA256: Self = Self(0x1301);
    pub const TLS_AES_256_GCM_SHA384: Self = Self(0x1302);
    pub const TLS_AES_128_CCM_8_SHA256: Self = Self(0x1305);

    pub fn info(self) -> MatrixResult<&'static CipherSuiteInfo> {
        CIPHER_SUITES
            .iter()
            .find(|info| info.id == self.0)
            .ok_or_else(|| {
                MatrixError::Resolve(format!("no algorithm data for cipher suite {self}"))
            })
    }

    pub fn is_grease(self) -> bool {
        is_grease(self.0)
    }

    pub fn grease_values() -> impl Iterator<Item = Self> {
        GREASE_VALUES.into_iter().map(Self)
    }

    pub fn is_tls13(self) -> bool {
        self.info()
            .map(|info| info.kx == KeyExchangeAlgorithm::Tls13)
            .unwrap_or(false)
    }

    pub fn key_exchange(self) -> MatrixResult<KeyExchangeAlgorithm> {
        Ok(self.info()?.kx)
    }

    pub fn is_ephemeral(self) -> MatrixResult<bool> {
        Ok(self.info()?.kx.is_ephemeral())
    }

    pub fn cipher_type(self) -> MatrixResult<CipherType> {
        Ok(self.info()?.cipher)
    }

    pub fn block_size(self) -> MatrixResult<Option<u8>> {
        let info = self.info()?;
        Ok((info.cipher == CipherType::Block).then_some(info.block_size))
    }

    /// Record MAC length under `version`; zero for AEAD suites and TLS 1.3.
    pub fn mac_len(self, version: ProtocolVersion) -> MatrixResult<u8> {
        let info = self.info()?;
        if version == ProtocolVersion::Tls13 || info.cipher == CipherType::Aead {
            return Ok(0);
        }
        Ok(info.mac_len)
    }

    pub fn uses_padding(self, version: ProtocolVersion) -> MatrixResult<bool> {
        Ok(version != ProtocolVersion::Tls13 && self.info()?.cipher == CipherType::Block)
    }

    pub fn hkdf(self) -> MatrixResult<HkdfAlgorithm> {
        let info = self.info()?;
        Ok(if info.name.ends_with("SHA384") {
            HkdfAlgorithm::Sha384
        } else {
            HkdfAlgorithm::Sha256
        })
    }

    pub fn auth_tag_len(self) -> u8 {
        match self.info() {
            Ok(info) if info.name.contains("CCM_8") => 8,
            _ => 16,
        }
    }

    /// Key type the server certificate must carry for this suite.
    pub fn cert_key_type(self) -> MatrixResult<CertificateKeyType> {
        match self.info()?.kx {
            KeyExchangeAlgorithm::Rsa
            | KeyExchangeAlgorithm::DheRsa
            | KeyExchangeAlgorithm::EcdheRsa => Ok(CertificateKeyType::Rsa),
            KeyExchangeAlgorithm::DheDss => Ok(CertificateKeyType::Dss),
            KeyExchangeAlgorithm::DhRsa | KeyExchangeAlgorithm::DhDss => Ok(CertificateKeyType::Dh),
            KeyExchangeAlgorithm::EcdhRsa | KeyExchangeAlgorithm::EcdhEcdsa => {
                Ok(CertificateKeyType::Ecdh)
            }
            KeyExchangeAlgorithm::EcdheEcdsa => Ok(CertificateKeyType::Ecdsa),
            KeyExchangeAlgorithm::DhAnon | KeyExchangeAlgorithm::EcdhAnon => Err(
                MatrixError::Resolve(format!("anonymous cipher suite {self} needs no certificate")),
            ),
            KeyExchangeAlgorithm::Tls13 => Err(MatrixError::Resolve(format!(
                "TLS 1.3 cipher suite {self} does not determine a certificate key type"
            ))),
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.info() {
            Ok(info) => f.write_str(info.name),
            Err(_) if self.is_grease() => write!(f, "GREASE_0x{:04X}", self.0),
            Err(_) => write!(f, "0x{:04X}", self.0),
        }
    }
}

impl FromStr for CipherSuite {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(info) = CIPHER_SUITES.iter().find(|info| info.name == s) {
            return Ok(Self(info.id));
        }
        let hex = s.strip_prefix("GREASE_").unwrap_or(s);
        parse_hex_u16(hex)
            .map(Self)
            .ok_or_else(|| MatrixError::InvalidArgument(format!("unknown cipher suite {s:?}")))
    }
}

impl TryFrom<String> for CipherSuite {
    type Error = MatrixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CipherSuite> for String {
    fn from(value: CipherSuite) -> Self {
        value.to_string()
    }
}

const NAMED_GROUPS: &[(u16, &str)] = &[
    (23, "secp256r1"),
    (24, "secp384r1"),
    (25, "secp521r1"),
    (29, "x25519"),
    (30, "x448"),
    (256, "ffdhe2048"),
    (257, "ffdhe3072"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const SECP256R1: Self = Self(23);
    pub const SECP384R1: Self = Self(24);
    pub const X25519: Self = Self(29);
    pub const FFDHE2048: Self = Self(256);

    pub fn name(self) -> Option<&'static str> {
        NAMED_GROUPS
            .iter()
            .find(|(id, _)| *id == self.0)
            .map(|(_, name)| *name)
    }

    pub fn is_ecdh_group(self) -> bool {
        matches!(self.0, 23..=30)
    }

    pub fn is_ffdhe(self) -> bool {
        matches!(self.0, 256..=260)
    }

    pub fn is_grease(self) -> bool {
        is_grease(self.0)
    }

    pub fn grease_values() -> impl Iterator<Item = Self> {
        GREASE_VALUES.into_iter().map(Self)
    }
}

impl fmt::Display for NamedGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.is_grease() => write!(f, "GREASE_0x{:04X}", self.0),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

impl TryFrom<String> for NamedGroup {
    type Error = MatrixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some((id, _)) = NAMED_GROUPS.iter().find(|(_, name)| *name == value) {
            return Ok(Self(*id));
        }
        let hex = value.strip_prefix("GREASE_").unwrap_or(&value);
        parse_hex_u16(hex)
            .map(Self)
            .ok_or_else(|| MatrixError::InvalidArgument(format!("unknown named group {value:?}")))
    }
}

impl From<NamedGroup> for String {
    fn from(value: NamedGroup) -> Self {
        value.to_string()
    }
}

fn parse_hex_u16(s: &str) -> Option<u16> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u16::from_str_radix(digits, 16).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    Anonymous,
    RsaPkcs1,
    RsaPssRsae,
    RsaPssPss,
    Ecdsa,
    Dsa,
    Ed25519,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SigHash {
    pub signature: SignatureAlgorithm,
    pub hash: HashAlgorithm,
}

impl SigHash {
    pub const fn new(signature: SignatureAlgorithm, hash: HashAlgorithm) -> Self {
        Self { signature, hash }
    }

    pub fn is_rsa(self) -> bool {
        matches!(
            self.signature,
            SignatureAlgorithm::RsaPkcs1
                | SignatureAlgorithm::RsaPssRsae
                | SignatureAlgorithm::RsaPssPss
        )
    }

    pub fn is_pss(self) -> bool {
        matches!(
            self.signature,
            SignatureAlgorithm::RsaPssRsae | SignatureAlgorithm::RsaPssPss
        )
    }

    /// Whether the scheme may be negotiated under `version`.
    pub fn allowed_in(self, version: ProtocolVersion) -> bool {
        if version != ProtocolVersion::Tls13 {
            return self.signature != SignatureAlgorithm::Anonymous;
        }
        !matches!(
            self.signature,
            SignatureAlgorithm::RsaPkcs1 | SignatureAlgorithm::Dsa | SignatureAlgorithm::Anonymous
        ) && self.hash != HashAlgorithm::Sha1
    }

    /// `None` for schemes that need no certificate.
    pub fn required_key_type(self) -> MatrixResult<Option<CertificateKeyType>> {
        match self.signature {
            SignatureAlgorithm::RsaPkcs1
            | SignatureAlgorithm::RsaPssRsae
            | SignatureAlgorithm::RsaPssPss => Ok(Some(CertificateKeyType::Rsa)),
            SignatureAlgorithm::Ecdsa => Ok(Some(CertificateKeyType::Ecdsa)),
            SignatureAlgorithm::Dsa => Ok(Some(CertificateKeyType::Dss)),
            SignatureAlgorithm::Anonymous => Ok(None),
            SignatureAlgorithm::Ed25519 => Err(MatrixError::Resolve(
                "no certificate key type modeled for ed25519".to_string(),
            )),
        }
    }
}

impl fmt::Display for SigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sig = match self.signature {
            SignatureAlgorithm::Anonymous => "ANONYMOUS",
            SignatureAlgorithm::RsaPkcs1 => "RSA",
            SignatureAlgorithm::RsaPssRsae => "RSA_PSS_RSAE",
            SignatureAlgorithm::RsaPssPss => "RSA_PSS_PSS",
            SignatureAlgorithm::Ecdsa => "ECDSA",
            SignatureAlgorithm::Dsa => "DSA",
            SignatureAlgorithm::Ed25519 => "ED25519",
        };
        let hash = match self.hash {
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
        };
        write!(f, "{sig}_{hash}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionType {
    ServerName,
    MaxFragmentLength,
    StatusRequest,
    SupportedGroups,
    EcPointFormats,
    SignatureAlgorithms,
    Heartbeat,
    Alpn,
    Padding,
    EncryptThenMac,
    ExtendedMasterSecret,
    SessionTicket,
    PreSharedKey,
    SupportedVersions,
    Cookie,
    PskKeyExchangeModes,
    KeyShare,
    RenegotiationInfo,
    Grease(u16),
}

impl ExtensionType {
    pub fn code(self) -> u16 {
        match self {
            Self::ServerName => 0,
            Self::MaxFragmentLength => 1,
            Self::StatusRequest => 5,
            Self::SupportedGroups => 10,
            Self::EcPointFormats => 11,
            Self::SignatureAlgorithms => 13,
            Self::Heartbeat => 15,
            Self::Alpn => 16,
            Self::Padding => 21,
            Self::EncryptThenMac => 22,
            Self::ExtendedMasterSecret => 23,
            Self::SessionTicket => 35,
            Self::PreSharedKey => 41,
            Self::SupportedVersions => 43,
            Self::Cookie => 44,
            Self::PskKeyExchangeModes => 45,
            Self::KeyShare => 51,
            Self::RenegotiationInfo => 0xFF01,
            Self::Grease(value) => value,
        }
    }

    pub fn is_grease(self) -> bool {
        matches!(self, Self::Grease(_))
    }

    pub fn grease_values() -> impl Iterator<Item = Self> {
        GREASE_VALUES.into_iter().map(Self::Grease)
    }
}

impl fmt::Display for ExtensionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grease(value) => write!(f, "GREASE_0x{value:04X}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    RecordOverflow,
    HandshakeFailure,
    BadCertificate,
    IllegalParameter,
    DecodeError,
    DecryptError,
    ProtocolVersion,
    InsufficientSecurity,
    InternalError,
    UserCanceled,
    MissingExtension,
    UnsupportedExtension,
    UnrecognizedName,
}

impl AlertDescription {
    pub const ALL: [Self; 16] = [
        Self::CloseNotify,
        Self::UnexpectedMessage,
        Self::BadRecordMac,
        Self::RecordOverflow,
        Self::HandshakeFailure,
        Self::BadCertificate,
        Self::IllegalParameter,
        Self::DecodeError,
        Self::DecryptError,
        Self::ProtocolVersion,
        Self::InsufficientSecurity,
        Self::InternalError,
        Self::UserCanceled,
        Self::MissingExtension,
        Self::UnsupportedExtension,
        Self::UnrecognizedName,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::CloseNotify => 0,
            Self::UnexpectedMessage => 10,
            Self::BadRecordMac => 20,
            Self::RecordOverflow => 22,
            Self::HandshakeFailure => 40,
            Self::BadCertificate => 42,
            Self::IllegalParameter => 47,
            Self::DecodeError => 50,
            Self::DecryptError => 51,
            Self::ProtocolVersion => 70,
            Self::InsufficientSecurity => 71,
            Self::InternalError => 80,
            Self::UserCanceled => 90,
            Self::MissingExtension => 109,
            Self::UnsupportedExtension => 110,
            Self::UnrecognizedName => 112,
        }
    }
}

/// A certificate and key the tester can present.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CertificateKeyPair {
    pub label: String,
    pub key_type: CertificateKeyType,
    /// Public key size in bits.
    pub key_size: u16,
}

impl CertificateKeyPair {
    pub fn new(label: impl Into<String>, key_type: CertificateKeyType, key_size: u16) -> Self {
        Self {
            label: label.into(),
            key_type,
            key_size,
        }
    }

    /// Estimated encoded signature size in bytes.
    ///
    /// ECDSA and DSA signatures are DER sequences of two integers of the
    /// group order size; DSA keys of 2048 bits and more use a 256-bit
    /// subgroup, smaller ones a 160-bit subgroup.
    pub fn signature_size(&self) -> MatrixResult<usize> {
        let bytes = |bits: usize| bits.div_ceil(8);
        match self.key_type {
            CertificateKeyType::Rsa => Ok(bytes(self.key_size as usize)),
            CertificateKeyType::Ecdsa | CertificateKeyType::Ecdh => {
                Ok(2 * bytes(self.key_size as usize) + 8)
            }
            CertificateKeyType::Dss => {
                let q_bits = if self.key_size >= 2048 { 256 } else { 160 };
                Ok(2 * bytes(q_bits) + 8)
            }
            CertificateKeyType::Dh => Err(MatrixError::Resolve(format!(
                "certificate {} carries a DH key and cannot sign",
                self.label
            ))),
        }
    }
}

impl fmt::Display for CertificateKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?}/{})", self.label, self.key_type, self.key_size)
    }
}
