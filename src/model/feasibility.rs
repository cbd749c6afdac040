//! Composite feasibility checks: each projects one or more constrained
//! domains through a classification and tests the resulting set.
//!
//! Candidates the algorithm resolver cannot classify (GREASE, unknown code
//! points) are excluded one by one and never abort the check.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::fmt;

use crate::{
    CertificateKeyPair, CertificateKeyType, CipherSuite, CipherType, DerivationScope, HashAlgorithm,
    MatrixResult, ParameterCatalog, ParameterType, ParameterValue, SigHash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "check", content = "parameter", rename_all = "snake_case")]
pub enum FeasibilityCheck {
    StaticEcdhSuiteModeled,
    StaticSuiteModeled,
    EphemeralSuiteModeled,
    EcdhSuiteModeled,
    NonEcdhSuiteModeled,
    NullSigHashModeled,
    NullModeled(ParameterType),
    MultipleBlockSizesModeled,
    MultipleMacSizesModeled,
    MultipleHkdfSizesModeled,
    MultipleTagSizesModeled,
    UnpaddedSuitesModeled,
    MultipleSignatureKeyTypesModeled,
    MultipleCertificateKeyTypesModeled,
    SuitesWithDifferentCertRequirementsModeled,
    PssModeled,
    RsaKeyMightNotSufficeForPss,
    RsaKeyBelow1024Modeled,
    RsaWithSha384Or512Modeled,
    SignatureLengthConstraintApplicable,
}

impl FeasibilityCheck {
    /// Checks that look at the "no value" sentinel instead of discarding it.
    pub fn is_about_sentinel(self) -> bool {
        matches!(self, Self::NullSigHashModeled | Self::NullModeled(_))
    }

    pub fn evaluate(
        self,
        scope: &DerivationScope,
        catalog: &ParameterCatalog,
    ) -> MatrixResult<bool> {
        let version = scope.target_version();
        let live = match self {
            Self::StaticEcdhSuiteModeled => any_resolved(suites(scope, catalog)?, |s| {
                Ok(!s.is_ephemeral()? && s.key_exchange()?.is_ecdh())
            }),
            Self::StaticSuiteModeled => {
                any_resolved(suites(scope, catalog)?, |s| Ok(!s.is_ephemeral()?))
            }
            Self::EphemeralSuiteModeled => {
                any_resolved(suites(scope, catalog)?, |s| s.is_ephemeral())
            }
            Self::EcdhSuiteModeled => {
                let suites = suites(scope, catalog)?;
                // Every TLS 1.3 group is an (EC)DHE share.
                (scope.is_tls13() && !suites.is_empty())
                    || any_resolved(suites, |s| Ok(s.key_exchange()?.is_ecdh()))
            }
            Self::NonEcdhSuiteModeled => {
                any_resolved(suites(scope, catalog)?, |s| Ok(!s.key_exchange()?.is_ecdh()))
            }
            Self::NullSigHashModeled => domain(scope, catalog, ParameterType::SigHashAlgorithm)?
                .iter()
                .any(ParameterValue::is_absent),
            Self::NullModeled(ty) => domain(scope, catalog, ty)?
                .iter()
                .any(ParameterValue::is_absent),
            Self::MultipleBlockSizesModeled => {
                classify(suites(scope, catalog)?, |s| {
                    Ok(match s.cipher_type()? {
                        CipherType::Block => s.block_size()?,
                        _ => None,
                    })
                })
                .into_iter()
                .flatten()
                .count()
                    > 1
            }
            Self::MultipleMacSizesModeled => {
                classify(suites(scope, catalog)?, |s| s.mac_len(version))
                    .into_iter()
                    .filter(|len| *len > 0)
                    .count()
                    > 1
            }
            Self::MultipleHkdfSizesModeled => {
                classify(suites(scope, catalog)?, |s| s.hkdf()).len() > 1
            }
            Self::MultipleTagSizesModeled => {
                classify(suites(scope, catalog)?, |s| Ok(s.auth_tag_len())).len() > 1
            }
            Self::UnpaddedSuitesModeled => any_resolved(suites(scope, catalog)?, |s| {
                Ok(!s.uses_padding(version)? || s.cipher_type()? == CipherType::Aead)
            }),
            Self::MultipleSignatureKeyTypesModeled => {
                classify(sig_hashes(scope, catalog)?, |sh| sh.required_key_type())
                    .into_iter()
                    .flatten()
                    .count()
                    > 1
            }
            Self::MultipleCertificateKeyTypesModeled => {
                classify(certificates(scope, catalog)?, |c| Ok(c.key_type)).len() > 1
            }
            Self::SuitesWithDifferentCertRequirementsModeled => {
                classify(suites(scope, catalog)?, |s| s.cert_key_type()).len() > 1
            }
            Self::PssModeled => sig_hashes(scope, catalog)?.iter().any(|sh| sh.is_pss()),
            Self::RsaKeyMightNotSufficeForPss => {
                let pss_sha512 = sig_hashes(scope, catalog)?
                    .iter()
                    .any(|sh| sh.is_pss() && sh.hash == HashAlgorithm::Sha512);
                let certs = certificates(scope, catalog)?;
                rsa_key_below(&certs, 1024) || (pss_sha512 && rsa_key_below(&certs, 2048))
            }
            Self::RsaKeyBelow1024Modeled => rsa_key_below(&certificates(scope, catalog)?, 1024),
            Self::RsaWithSha384Or512Modeled => sig_hashes(scope, catalog)?.iter().any(|sh| {
                sh.is_rsa() && matches!(sh.hash, HashAlgorithm::Sha384 | HashAlgorithm::Sha512)
            }),
            Self::SignatureLengthConstraintApplicable => {
                let max_position = domain(scope, catalog, ParameterType::SignatureBitmask)?
                    .iter()
                    .filter_map(ParameterValue::as_number)
                    .max()
                    .unwrap_or(0);
                classify(certificates(scope, catalog)?, CertificateKeyPair::signature_size)
                    .into_iter()
                    .any(|size| usize::from(max_position) >= size)
            }
        };
        Ok(live)
    }
}

impl fmt::Display for FeasibilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullModeled(ty) => write!(f, "null_modeled({ty})"),
            other => write!(f, "{other:?}"),
        }
    }
}

fn domain(
    scope: &DerivationScope,
    catalog: &ParameterCatalog,
    ty: ParameterType,
) -> MatrixResult<Vec<ParameterValue>> {
    catalog.constrained_domain_for(ty.into(), scope)
}

fn suites(scope: &DerivationScope, catalog: &ParameterCatalog) -> MatrixResult<Vec<CipherSuite>> {
    Ok(domain(scope, catalog, ParameterType::CipherSuite)?
        .iter()
        .filter_map(ParameterValue::as_cipher_suite)
        .collect())
}

/// Signature schemes with the sentinel removed.
fn sig_hashes(scope: &DerivationScope, catalog: &ParameterCatalog) -> MatrixResult<Vec<SigHash>> {
    Ok(domain(scope, catalog, ParameterType::SigHashAlgorithm)?
        .iter()
        .filter_map(ParameterValue::as_sig_hash)
        .collect())
}

fn certificates(
    scope: &DerivationScope,
    catalog: &ParameterCatalog,
) -> MatrixResult<Vec<CertificateKeyPair>> {
    Ok(domain(scope, catalog, ParameterType::Certificate)?
        .iter()
        .filter_map(ParameterValue::as_certificate)
        .cloned()
        .collect())
}

fn rsa_key_below(certs: &[CertificateKeyPair], bits: u16) -> bool {
    certs
        .iter()
        .any(|c| c.key_type == CertificateKeyType::Rsa && c.key_size < bits)
}

/// Projects every candidate through `f`; candidates `f` fails on are
/// logged and left out.
pub fn classify<T, R>(
    items: impl IntoIterator<Item = T>,
    f: impl Fn(&T) -> MatrixResult<R>,
) -> BTreeSet<R>
where
    T: fmt::Display,
    R: Ord,
{
    items
        .into_iter()
        .filter_map(|item| match f(&item) {
            Ok(class) => Some(class),
            Err(err) => {
                tracing::debug!(candidate = %item, "excluded from feasibility check: {err}");
                None
            }
        })
        .collect()
}

fn any_resolved<T: fmt::Display>(
    items: impl IntoIterator<Item = T>,
    f: impl Fn(&T) -> MatrixResult<bool>,
) -> bool {
    classify(items, f).contains(&true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        NamedGroup, ProtocolVersion, SignatureAlgorithm, TargetCapabilities, TestDeclaration,
        TestEndpoint,
    };
    use std::sync::Arc;

    fn scope_with(suites: &[CipherSuite], decl: TestDeclaration) -> DerivationScope {
        let mut caps = TargetCapabilities::default();
        caps.versions = [ProtocolVersion::Tls12].into();
        caps.cipher_suites = suites.iter().copied().collect();
        caps.named_groups = [NamedGroup::SECP256R1].into();
        caps.signature_algorithms = [
            SigHash::new(SignatureAlgorithm::RsaPkcs1, HashAlgorithm::Sha256),
            SigHash::new(SignatureAlgorithm::RsaPssRsae, HashAlgorithm::Sha512),
        ]
        .into();
        caps.certificates = vec![
            CertificateKeyPair::new("rsa1024", CertificateKeyType::Rsa, 1024),
            CertificateKeyPair::new("rsa2048", CertificateKeyType::Rsa, 2048),
        ];
        DerivationScope::new(Arc::new(decl), Arc::new(caps))
    }

    fn catalog() -> ParameterCatalog {
        ParameterCatalog::standard().expect("catalog")
    }

    #[test]
    fn static_and_ephemeral_checks_follow_modeled_suites() {
        let decl = || TestDeclaration::new("kx", TestEndpoint::Server);
        let ephemeral_only = scope_with(&[CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA], decl());
        assert!(!FeasibilityCheck::StaticSuiteModeled
            .evaluate(&ephemeral_only, &catalog())
            .unwrap());
        assert!(FeasibilityCheck::EphemeralSuiteModeled
            .evaluate(&ephemeral_only, &catalog())
            .unwrap());

        let mixed = scope_with(
            &[
                CipherSuite::TLS_ECDH_ECDSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
            ],
            decl(),
        );
        assert!(FeasibilityCheck::StaticEcdhSuiteModeled.evaluate(&mixed, &catalog()).unwrap());
        assert!(FeasibilityCheck::SuitesWithDifferentCertRequirementsModeled
            .evaluate(&mixed, &catalog())
            .unwrap());
    }

    #[test]
    fn grease_candidates_are_excluded_not_fatal() {
        let decl = TestDeclaration::new("grease", TestEndpoint::Server).explicit(
            ParameterType::CipherSuite,
            vec![
                ParameterValue::CipherSuite(CipherSuite(0x0A0A)),
                ParameterValue::CipherSuite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA),
            ],
        );
        let scope = scope_with(&[CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], decl);
        let catalog = catalog();
        assert!(FeasibilityCheck::StaticSuiteModeled.evaluate(&scope, &catalog).unwrap());
        assert!(!FeasibilityCheck::SuitesWithDifferentCertRequirementsModeled
            .evaluate(&scope, &catalog)
            .unwrap());
        assert!(!FeasibilityCheck::MultipleHkdfSizesModeled.evaluate(&scope, &catalog).unwrap());
    }

    #[test]
    fn size_checks_count_distinct_classes() {
        let decl = TestDeclaration::new("sizes", TestEndpoint::Server);
        let scope = scope_with(
            &[
                CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
                CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8,
                CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            ],
            decl,
        );
        let catalog = catalog();
        assert!(FeasibilityCheck::MultipleMacSizesModeled.evaluate(&scope, &catalog).unwrap());
        assert!(!FeasibilityCheck::MultipleBlockSizesModeled.evaluate(&scope, &catalog).unwrap());
        assert!(FeasibilityCheck::MultipleTagSizesModeled.evaluate(&scope, &catalog).unwrap());
        assert!(FeasibilityCheck::UnpaddedSuitesModeled.evaluate(&scope, &catalog).unwrap());
    }

    #[test]
    fn sentinel_checks_see_absent_values() {
        let decl = TestDeclaration::new("null", TestEndpoint::Server);
        let scope = scope_with(&[CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA], decl);
        let catalog = catalog();
        assert!(FeasibilityCheck::NullSigHashModeled.is_about_sentinel());
        assert!(FeasibilityCheck::NullSigHashModeled.evaluate(&scope, &catalog).unwrap());
        assert!(FeasibilityCheck::NullModeled(ParameterType::NamedGroup)
            .evaluate(&scope, &catalog)
            .unwrap());
    }

    #[test]
    fn rsa_key_size_checks() {
        let decl = TestDeclaration::new("pss", TestEndpoint::Server);
        let scope = scope_with(&[CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA], decl);
        let catalog = catalog();
        assert!(FeasibilityCheck::PssModeled.evaluate(&scope, &catalog).unwrap());
        assert!(!FeasibilityCheck::RsaKeyBelow1024Modeled.evaluate(&scope, &catalog).unwrap());
        assert!(FeasibilityCheck::RsaKeyMightNotSufficeForPss.evaluate(&scope, &catalog).unwrap());
        assert!(FeasibilityCheck::RsaWithSha384Or512Modeled.evaluate(&scope, &catalog).unwrap());
        assert!(!FeasibilityCheck::MultipleSignatureKeyTypesModeled
            .evaluate(&scope, &catalog)
            .unwrap());
        // 1024-bit RSA signs 128 bytes; the bitmask reaches byte 255.
        assert!(FeasibilityCheck::SignatureLengthConstraintApplicable
            .evaluate(&scope, &catalog)
            .unwrap());
    }
}
