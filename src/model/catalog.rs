//! Static parameter catalog: one entry per parameter type with its domain
//! generator, config applier and linked type.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    AlertDescription, CertificateKeyPair, CertificateKeyType, CipherSuite, Corruption,
    DerivationScope, ExtensionType, MatrixError, MatrixResult, NamedGroup, ParameterCombination,
    ParameterId, ParameterType, ParameterValue, Peer, ProtocolVersion, TlsConfig,
};

pub type DomainGenerator = fn(&DerivationScope) -> MatrixResult<Vec<ParameterValue>>;
pub type ConfigApplier = fn(&mut TlsConfig, &ParameterValue, &ApplyContext<'_>) -> MatrixResult<()>;

/// What `apply` and `post_process` may look at besides the value.
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext<'a> {
    pub id: ParameterId,
    /// Peer the tester plays; offers are written on its side.
    pub tester: Peer,
    pub combination: &'a ParameterCombination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    Negotiated,
    Record,
    Bitmask,
    Position,
    Grease,
    ExtensionToggle,
    Mirrored,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Negotiated => "negotiated",
            Self::Record => "record",
            Self::Bitmask => "bitmask",
            Self::Position => "position",
            Self::Grease => "grease",
            Self::ExtensionToggle => "extension_toggle",
            Self::Mirrored => "mirrored",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub ty: ParameterType,
    pub kind: ParameterKind,
    /// Dependent type expanded alongside this one (bitmask -> BIT_POSITION).
    pub linked: Option<ParameterType>,
    /// Type whose domain this one reuses; mirrored parameters apply nothing.
    pub mirrors: Option<ParameterType>,
    /// An empty domain disables the test instead of skipping the parameter.
    pub required: bool,
    pub generate: DomainGenerator,
    pub apply: ConfigApplier,
    /// Runs after every parameter of the combination has been applied.
    pub post_process: Option<ConfigApplier>,
}

impl ParameterSpec {
    fn new(
        ty: ParameterType,
        kind: ParameterKind,
        generate: DomainGenerator,
        apply: ConfigApplier,
    ) -> Self {
        Self {
            ty,
            kind,
            linked: None,
            mirrors: None,
            required: false,
            generate,
            apply,
            post_process: None,
        }
    }

    fn linked(mut self, ty: ParameterType) -> Self {
        self.linked = Some(ty);
        self
    }

    fn mirrors(mut self, ty: ParameterType) -> Self {
        self.mirrors = Some(ty);
        self
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn post_process(mut self, f: ConfigApplier) -> Self {
        self.post_process = Some(f);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ParameterCatalog {
    specs: BTreeMap<ParameterType, ParameterSpec>,
}

impl ParameterCatalog {
    pub fn standard() -> MatrixResult<Self> {
        Self::build(standard_specs())
    }

    /// Validates the link table: every bitmask has a BIT_POSITION link and
    /// every link or mirror points at a registered type.
    pub fn build(specs: Vec<ParameterSpec>) -> MatrixResult<Self> {
        let mut table = BTreeMap::new();
        for spec in specs {
            let ty = spec.ty;
            if table.insert(ty, spec).is_some() {
                return Err(MatrixError::Modeling(format!("parameter type {ty} registered twice")));
            }
        }
        for spec in table.values() {
            if spec.ty.is_bitmask() && spec.linked != Some(ParameterType::BitPosition) {
                return Err(MatrixError::Modeling(format!(
                    "bitmask parameter {} has no BIT_POSITION link",
                    spec.ty
                )));
            }
            for target in spec.linked.iter().chain(spec.mirrors.iter()) {
                if !table.contains_key(target) {
                    return Err(MatrixError::Modeling(format!(
                        "parameter {} refers to unregistered type {target}",
                        spec.ty
                    )));
                }
            }
            if let Some(mirrored) = spec.mirrors
                && table.get(&mirrored).is_some_and(|m| m.mirrors.is_some())
            {
                return Err(MatrixError::Modeling(format!(
                    "parameter {} mirrors another mirrored type {mirrored}",
                    spec.ty
                )));
            }
        }
        Ok(Self { specs: table })
    }

    pub fn spec(&self, ty: ParameterType) -> MatrixResult<&ParameterSpec> {
        self.specs
            .get(&ty)
            .ok_or_else(|| {
                MatrixError::Modeling(format!("parameter type {ty} is not in the catalog"))
            })
    }

    pub fn specs(&self) -> impl Iterator<Item = &ParameterSpec> + '_ {
        self.specs.values()
    }

    pub fn linked_type(&self, ty: ParameterType) -> MatrixResult<Option<ParameterType>> {
        Ok(self.spec(ty)?.linked)
    }

    /// Candidate values before value filters. Explicit overrides win over
    /// the generator; duplicates are dropped keeping first occurrence.
    pub fn domain_for(
        &self,
        id: ParameterId,
        scope: &DerivationScope,
    ) -> MatrixResult<Vec<ParameterValue>> {
        let spec = self.spec(id.ty)?;
        let raw = match (id.parent, scope.explicit_values(id.ty)) {
            (None, Some(values)) => values.to_vec(),
            _ => {
                let source = match spec.mirrors {
                    Some(mirrored) => self.spec(mirrored)?,
                    None => spec,
                };
                (source.generate)(scope)?
            }
        };
        let mut seen = BTreeSet::new();
        Ok(raw.into_iter().filter(|v| seen.insert(v.clone())).collect())
    }

    /// Domain after the scope's value filters for the type.
    pub fn constrained_domain_for(
        &self,
        id: ParameterId,
        scope: &DerivationScope,
    ) -> MatrixResult<Vec<ParameterValue>> {
        let mut values = self.domain_for(id, scope)?;
        for filter in scope.value_filters(id.ty) {
            let before = values.len();
            values.retain(|v| filter.allows(v));
            if values.len() != before {
                tracing::debug!(
                    test = scope.test_id(),
                    parameter = %id,
                    filter = %filter.name,
                    removed = before - values.len(),
                    "value filter shrank domain"
                );
            }
        }
        Ok(values)
    }

    pub fn apply_to(
        &self,
        config: &mut TlsConfig,
        value: &ParameterValue,
        ctx: &ApplyContext<'_>,
    ) -> MatrixResult<()> {
        (self.spec(ctx.id.ty)?.apply)(config, value, ctx)
    }

    pub fn post_process(
        &self,
        config: &mut TlsConfig,
        value: &ParameterValue,
        ctx: &ApplyContext<'_>,
    ) -> MatrixResult<()> {
        match self.spec(ctx.id.ty)?.post_process {
            Some(f) => f(config, value, ctx),
            None => Ok(()),
        }
    }
}

fn standard_specs() -> Vec<ParameterSpec> {
    use ParameterKind as K;
    use ParameterType as T;

    let mut specs = vec![
        ParameterSpec::new(T::CipherSuite, K::Negotiated, gen_cipher_suites, apply_cipher_suite)
            .required(),
        ParameterSpec::new(T::MirroredCipherSuite, K::Mirrored, gen_cipher_suites, apply_nothing)
            .mirrors(T::CipherSuite),
        ParameterSpec::new(T::NamedGroup, K::Negotiated, gen_named_groups, apply_named_group),
        ParameterSpec::new(T::SigHashAlgorithm, K::Negotiated, gen_sig_hashes, apply_sig_hash),
        ParameterSpec::new(T::Certificate, K::Negotiated, gen_certificates, apply_certificate),
        ParameterSpec::new(T::ProtocolVersion, K::Record, gen_versions, apply_record_version),
        ParameterSpec::new(T::Alert, K::Record, gen_alerts, apply_alert),
        ParameterSpec::new(T::RecordLength, K::Record, gen_record_lengths, apply_record_length),
        ParameterSpec::new(T::TcpFragmentation, K::Record, gen_flags, apply_tcp_fragmentation),
        ParameterSpec::new(T::AppMsgLength, K::Record, gen_app_msg_lengths, apply_app_msg_length),
        ParameterSpec::new(T::MacBitmask, K::Bitmask, gen_mac_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::CiphertextBitmask, K::Bitmask, gen_ciphertext_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::AuthTagBitmask, K::Bitmask, gen_auth_tag_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::PaddingBitmask, K::Bitmask, gen_padding_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::PrfBitmask, K::Bitmask, gen_prf_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::SignatureBitmask, K::Bitmask, gen_signature_bytes, apply_bitmask)
            .linked(T::BitPosition),
        ParameterSpec::new(T::BitPosition, K::Position, gen_bit_positions, apply_nothing),
        ParameterSpec::new(T::GreaseCipherSuite, K::Grease, gen_grease_suites, apply_nothing)
            .post_process(add_grease_suite),
        ParameterSpec::new(
            T::GreaseExtension,
            K::Grease,
            gen_grease_extensions,
            apply_grease_extension,
        ),
        ParameterSpec::new(T::GreaseNamedGroup, K::Grease, gen_grease_groups, apply_nothing)
            .post_process(add_grease_group),
        ParameterSpec::new(
            T::IncludeGreaseNamedGroups,
            K::ExtensionToggle,
            gen_flags,
            apply_nothing,
        )
        .post_process(add_all_grease_groups),
        ParameterSpec::new(
            T::AdditionalPaddingLength,
            K::Record,
            gen_additional_padding,
            apply_additional_padding,
        ),
        ParameterSpec::new(
            T::CompressionMethod,
            K::Negotiated,
            gen_compression_methods,
            apply_compression,
        ),
        ParameterSpec::new(
            T::MaxFragmentLength,
            K::Negotiated,
            gen_max_fragment_lengths,
            apply_max_fragment_length,
        ),
        ParameterSpec::new(T::HelloRetryCookie, K::Negotiated, gen_flags, apply_hello_retry_cookie),
    ];
    specs.extend(
        ParameterType::ALL
            .into_iter()
            .filter(|ty| ty.toggled_extension().is_some())
            .map(|ty| {
                ParameterSpec::new(
                    ty,
                    K::ExtensionToggle,
                    gen_extension_toggle_for(ty),
                    apply_extension_toggle,
                )
            }),
    );
    specs.sort_by_key(|s| s.ty);
    specs
}

fn mismatch(ctx: &ApplyContext<'_>, value: &ParameterValue) -> MatrixError {
    MatrixError::Modeling(format!("value {value} does not fit parameter {}", ctx.id))
}

fn numbers(values: impl IntoIterator<Item = u16>) -> Vec<ParameterValue> {
    values.into_iter().map(ParameterValue::Number).collect()
}

/// Capability suites for the scope's protocol generation that satisfy the
/// key-exchange requirement.
pub fn compatible_cipher_suites(scope: &DerivationScope) -> Vec<CipherSuite> {
    let kx = scope.key_exchange();
    scope
        .capabilities()
        .suites_for(scope.is_tls13())
        .filter(|suite| kx.compatible_with(*suite))
        .collect()
}

/// Suites the model will actually vary over: the constrained
/// CIPHER_SUITE domain when modeled, else every compatible suite.
fn modeled_suites(scope: &DerivationScope) -> Vec<CipherSuite> {
    if let Some(values) = scope.explicit_values(ParameterType::CipherSuite) {
        return values.iter().filter_map(ParameterValue::as_cipher_suite).collect();
    }
    compatible_cipher_suites(scope)
        .into_iter()
        .filter(|suite| {
            let value = ParameterValue::CipherSuite(*suite);
            scope
                .value_filters(ParameterType::CipherSuite)
                .all(|f| f.allows(&value))
        })
        .collect()
}

fn gen_cipher_suites(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(compatible_cipher_suites(scope)
        .into_iter()
        .map(ParameterValue::CipherSuite)
        .collect())
}

fn gen_named_groups(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let caps = scope.capabilities();
    if scope.is_tls13() {
        return Ok(caps
            .tls13_named_groups
            .iter()
            .copied()
            .map(ParameterValue::NamedGroup)
            .collect());
    }
    let mut ecdh = false;
    let mut non_ecdh = false;
    for suite in modeled_suites(scope) {
        match suite.key_exchange() {
            Ok(kx) if kx.is_ecdh() => ecdh = true,
            Ok(_) => non_ecdh = true,
            Err(err) => tracing::debug!(%suite, "skipping suite for group domain: {err}"),
        }
    }
    let mut values: Vec<_> = if ecdh {
        caps.named_groups
            .iter()
            .copied()
            .filter(|g| g.is_ecdh_group())
            .map(ParameterValue::NamedGroup)
            .collect()
    } else {
        Vec::new()
    };
    if non_ecdh {
        values.push(ParameterValue::Absent);
    }
    Ok(values)
}

fn gen_sig_hashes(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let version = scope.target_version();
    let mut values: Vec<_> = scope
        .capabilities()
        .signature_algorithms
        .iter()
        .copied()
        .filter(|sh| sh.allowed_in(version))
        .map(ParameterValue::SigHash)
        .collect();
    // Static key exchange signs nothing during the handshake.
    if version != ProtocolVersion::Tls13
        && modeled_suites(scope)
            .into_iter()
            .any(|s| s.key_exchange().is_ok_and(|kx| !kx.uses_server_key_exchange()))
    {
        values.push(ParameterValue::Absent);
    }
    Ok(values)
}

fn gen_certificates(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let wanted: BTreeSet<CertificateKeyType> = if scope.is_tls13() {
        [CertificateKeyType::Rsa, CertificateKeyType::Ecdsa].into()
    } else {
        modeled_suites(scope)
            .into_iter()
            .filter_map(|suite| match suite.cert_key_type() {
                Ok(key_type) => Some(key_type),
                Err(err) => {
                    tracing::debug!(%suite, "no certificate requirement: {err}");
                    None
                }
            })
            .collect()
    };
    Ok(scope
        .capabilities()
        .certificates
        .iter()
        .filter(|cert| wanted.contains(&cert.key_type))
        .cloned()
        .map(ParameterValue::Certificate)
        .collect())
}

fn gen_versions(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(scope
        .capabilities()
        .versions
        .iter()
        .copied()
        .map(ParameterValue::Version)
        .collect())
}

fn gen_alerts(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(AlertDescription::ALL.into_iter().map(ParameterValue::Alert).collect())
}

fn gen_record_lengths(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers([1, 50, 111, 16384]))
}

fn gen_app_msg_lengths(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers([1, 16, 100]))
}

fn gen_flags(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(vec![ParameterValue::Flag(false), ParameterValue::Flag(true)])
}

fn gen_extension_toggle_for(ty: ParameterType) -> DomainGenerator {
    match ty {
        ParameterType::IncludeRenegotiationExtension => {
            |s| extension_toggle(s, ExtensionType::RenegotiationInfo)
        }
        ParameterType::IncludeExtendedMasterSecretExtension => {
            |s| extension_toggle(s, ExtensionType::ExtendedMasterSecret)
        }
        ParameterType::IncludePaddingExtension => |s| extension_toggle(s, ExtensionType::Padding),
        ParameterType::IncludeEncryptThenMacExtension => {
            |s| extension_toggle(s, ExtensionType::EncryptThenMac)
        }
        ParameterType::IncludeHeartbeatExtension => {
            |s| extension_toggle(s, ExtensionType::Heartbeat)
        }
        ParameterType::IncludeSessionTicketExtension => {
            |s| extension_toggle(s, ExtensionType::SessionTicket)
        }
        ParameterType::IncludeAlpnExtension => |s| extension_toggle(s, ExtensionType::Alpn),
        _ => gen_flags,
    }
}

/// Both states when the target supports the extension, otherwise only "off".
fn extension_toggle(
    scope: &DerivationScope,
    ext: ExtensionType,
) -> MatrixResult<Vec<ParameterValue>> {
    if scope.capabilities().supports_extension(ext) {
        Ok(vec![ParameterValue::Flag(false), ParameterValue::Flag(true)])
    } else {
        Ok(vec![ParameterValue::Flag(false)])
    }
}

fn gen_mac_bytes(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let version = scope.target_version();
    let max = modeled_suites(scope)
        .into_iter()
        .filter_map(|s| s.mac_len(version).ok())
        .max()
        .unwrap_or(0);
    Ok(numbers(0..u16::from(max)))
}

fn gen_auth_tag_bytes(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let max = modeled_suites(scope)
        .into_iter()
        .filter(|s| s.cipher_type().is_ok_and(|c| c == crate::CipherType::Aead))
        .map(CipherSuite::auth_tag_len)
        .max()
        .unwrap_or(0);
    Ok(numbers(0..u16::from(max)))
}

fn gen_ciphertext_bytes(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers(0..16))
}

fn gen_padding_bytes(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    let version = scope.target_version();
    let min_block = modeled_suites(scope)
        .into_iter()
        .filter(|s| s.uses_padding(version).unwrap_or(false))
        .filter_map(|s| s.block_size().ok().flatten())
        .min()
        .unwrap_or(0);
    Ok(numbers(0..u16::from(min_block)))
}

fn gen_prf_bytes(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    // verify_data is 12 bytes in TLS 1.2.
    Ok(numbers(0..12))
}

fn gen_signature_bytes(scope: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    // Bounded by the largest signature; shorter ones are handled by a
    // signature-length constraint.
    let largest = scope
        .capabilities()
        .certificates
        .iter()
        .filter_map(|c: &CertificateKeyPair| c.signature_size().ok())
        .max()
        .unwrap_or(32);
    Ok(numbers(
        [0u16, 8, 16, 31, 64, 255]
            .into_iter()
            .filter(|pos| usize::from(*pos) < largest),
    ))
}

fn gen_bit_positions(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers(0..8))
}

fn gen_grease_suites(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(CipherSuite::grease_values().map(ParameterValue::CipherSuite).collect())
}

fn gen_grease_extensions(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(ExtensionType::grease_values().map(ParameterValue::Extension).collect())
}

fn gen_grease_groups(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(NamedGroup::grease_values().map(ParameterValue::NamedGroup).collect())
}

fn gen_additional_padding(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers([5, 100, 1000]))
}

fn gen_compression_methods(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers([1, 64, 255]))
}

fn gen_max_fragment_lengths(_: &DerivationScope) -> MatrixResult<Vec<ParameterValue>> {
    Ok(numbers([1, 2, 3, 4]))
}

fn apply_nothing(_: &mut TlsConfig, _: &ParameterValue, _: &ApplyContext<'_>) -> MatrixResult<()> {
    Ok(())
}

fn apply_cipher_suite(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let suite = value.as_cipher_suite().ok_or_else(|| mismatch(ctx, value))?;
    config.offer_mut(ctx.tester).cipher_suites = vec![suite];
    config.selected_cipher_suite = Some(suite);
    Ok(())
}

fn apply_named_group(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    if value.is_absent() {
        return Ok(());
    }
    let group = value.as_named_group().ok_or_else(|| mismatch(ctx, value))?;
    config.offer_mut(ctx.tester).named_groups = vec![group];
    config.selected_named_group = Some(group);
    Ok(())
}

fn apply_sig_hash(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    if value.is_absent() {
        config.selected_signature = None;
        return Ok(());
    }
    let sig_hash = value.as_sig_hash().ok_or_else(|| mismatch(ctx, value))?;
    config.offer_mut(ctx.tester).signature_algorithms = vec![sig_hash];
    config.selected_signature = Some(sig_hash);
    Ok(())
}

fn apply_certificate(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let cert = value.as_certificate().ok_or_else(|| mismatch(ctx, value))?;
    config.certificate = Some(cert.clone());
    Ok(())
}

fn apply_record_version(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    match value {
        ParameterValue::Version(v) => {
            config.record_version = Some(*v);
            Ok(())
        }
        other => Err(mismatch(ctx, other)),
    }
}

fn apply_alert(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    match value {
        ParameterValue::Alert(alert) => {
            config.alert = Some(*alert);
            Ok(())
        }
        other => Err(mismatch(ctx, other)),
    }
}

fn apply_record_length(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    config.max_record_length = Some(value.as_number().ok_or_else(|| mismatch(ctx, value))?);
    Ok(())
}

fn apply_tcp_fragmentation(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    config.tcp_fragmentation = value.as_flag().ok_or_else(|| mismatch(ctx, value))?;
    Ok(())
}

fn apply_app_msg_length(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    config.app_message_length = Some(value.as_number().ok_or_else(|| mismatch(ctx, value))?);
    Ok(())
}

fn apply_bitmask(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let byte = value.as_number().ok_or_else(|| mismatch(ctx, value))?;
    let target = ctx
        .id
        .ty
        .corruption_target()
        .ok_or_else(|| mismatch(ctx, value))?;
    let position_id = ParameterId::linked(ParameterType::BitPosition, ctx.id.ty);
    let bit = ctx
        .combination
        .value(position_id)
        .and_then(ParameterValue::as_number)
        .ok_or_else(|| {
            MatrixError::Modeling(format!("{} has no {position_id} in the combination", ctx.id))
        })?;
    let bit = u8::try_from(bit)
        .ok()
        .filter(|b| *b < 8)
        .ok_or_else(|| MatrixError::Modeling(format!("bit position {bit} out of range")))?;
    config.corruptions.push(Corruption { target, byte, bit });
    Ok(())
}

fn apply_grease_extension(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    match value {
        ParameterValue::Extension(ext) if ext.is_grease() => {
            config.set_extension(ctx.tester, *ext, true);
            Ok(())
        }
        other => Err(mismatch(ctx, other)),
    }
}

fn apply_extension_toggle(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let enabled = value.as_flag().ok_or_else(|| mismatch(ctx, value))?;
    let ext = ctx.id.ty.toggled_extension().ok_or_else(|| mismatch(ctx, value))?;
    config.set_extension(ctx.tester, ext, enabled);
    Ok(())
}

fn apply_additional_padding(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    config.additional_padding = Some(value.as_number().ok_or_else(|| mismatch(ctx, value))?);
    Ok(())
}

fn apply_compression(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let method = value.as_number().and_then(|n| u8::try_from(n).ok());
    config.compression_method = Some(method.ok_or_else(|| mismatch(ctx, value))?);
    Ok(())
}

fn apply_max_fragment_length(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let code = value.as_number().and_then(|n| u8::try_from(n).ok());
    config.max_fragment_length = Some(code.ok_or_else(|| mismatch(ctx, value))?);
    config.set_extension(ctx.tester, ExtensionType::MaxFragmentLength, true);
    Ok(())
}

fn apply_hello_retry_cookie(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    config.hello_retry_cookie = value.as_flag().ok_or_else(|| mismatch(ctx, value))?;
    Ok(())
}

fn add_grease_suite(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let suite = value
        .as_cipher_suite()
        .filter(|s| s.is_grease())
        .ok_or_else(|| mismatch(ctx, value))?;
    config.offer_mut(ctx.tester).cipher_suites.insert(0, suite);
    Ok(())
}

fn add_grease_group(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    let group = value
        .as_named_group()
        .filter(|g| g.is_grease())
        .ok_or_else(|| mismatch(ctx, value))?;
    config.offer_mut(ctx.tester).named_groups.insert(0, group);
    Ok(())
}

fn add_all_grease_groups(
    config: &mut TlsConfig,
    value: &ParameterValue,
    ctx: &ApplyContext<'_>,
) -> MatrixResult<()> {
    if value.as_flag().ok_or_else(|| mismatch(ctx, value))? {
        let groups = &mut config.offer_mut(ctx.tester).named_groups;
        for grease in NamedGroup::grease_values() {
            if !groups.contains(&grease) {
                groups.push(grease);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        KeyExchangeRequirement, KeyExchangeType, TargetCapabilities, TestDeclaration, TestEndpoint,
    };
    use std::sync::Arc;

    fn caps() -> TargetCapabilities {
        let mut caps = TargetCapabilities::default();
        caps.versions = [ProtocolVersion::Tls12].into();
        caps.cipher_suites = [
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ]
        .into();
        caps.named_groups =
            [NamedGroup::SECP256R1, NamedGroup::X25519, NamedGroup::FFDHE2048].into();
        caps.extensions = [ExtensionType::EncryptThenMac].into();
        caps
    }

    fn scope(decl: TestDeclaration) -> DerivationScope {
        DerivationScope::new(Arc::new(decl), Arc::new(caps()))
    }

    #[test]
    fn standard_catalog_links_every_bitmask() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        for ty in ParameterType::ALL {
            let linked = catalog.linked_type(ty).expect("registered");
            assert_eq!(linked.is_some(), ty.is_bitmask(), "{ty}");
        }
    }

    #[test]
    fn bitmask_without_link_is_rejected() {
        let mut specs = standard_specs();
        for spec in &mut specs {
            if spec.ty == ParameterType::MacBitmask {
                spec.linked = None;
            }
        }
        let err = ParameterCatalog::build(specs).expect_err("missing link");
        assert!(err.is_modeling());
    }

    #[test]
    fn cipher_suite_domain_follows_key_exchange_requirement() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let decl = TestDeclaration::new("kx", TestEndpoint::Server)
            .key_exchange(KeyExchangeRequirement::new([KeyExchangeType::Ecdh]));
        let domain = catalog
            .domain_for(ParameterType::CipherSuite.into(), &scope(decl))
            .expect("domain");
        assert_eq!(domain.len(), 2);
        assert!(!domain.contains(&ParameterValue::CipherSuite(
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA
        )));
    }

    #[test]
    fn explicit_values_override_generator_and_filters_apply() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let decl = TestDeclaration::new("len", TestEndpoint::Server)
            .explicit(
                ParameterType::RecordLength,
                vec![
                    ParameterValue::Number(7),
                    ParameterValue::Number(7),
                    ParameterValue::Number(9),
                ],
            )
            .filter(ParameterType::RecordLength, "odd-only-9", |v| v.as_number() == Some(9));
        let scope = scope(decl);
        let id = ParameterType::RecordLength.into();
        assert_eq!(catalog.domain_for(id, &scope).expect("domain").len(), 2);
        assert_eq!(
            catalog.constrained_domain_for(id, &scope).expect("domain"),
            vec![ParameterValue::Number(9)]
        );
    }

    #[test]
    fn named_group_domain_includes_sentinel_for_static_suites() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(TestDeclaration::new("g", TestEndpoint::Server));
        let domain = catalog
            .domain_for(ParameterType::NamedGroup.into(), &scope)
            .expect("domain");
        assert!(domain.contains(&ParameterValue::Absent));
        assert!(domain.contains(&ParameterValue::NamedGroup(NamedGroup::X25519)));
        assert!(!domain.contains(&ParameterValue::NamedGroup(NamedGroup::FFDHE2048)));
    }

    #[test]
    fn extension_toggle_reflects_target_support() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(TestDeclaration::new("ext", TestEndpoint::Server));
        let etm = catalog
            .domain_for(ParameterType::IncludeEncryptThenMacExtension.into(), &scope)
            .expect("domain");
        let hb = catalog
            .domain_for(ParameterType::IncludeHeartbeatExtension.into(), &scope)
            .expect("domain");
        assert_eq!(etm.len(), 2);
        assert_eq!(hb, vec![ParameterValue::Flag(false)]);
    }

    #[test]
    fn mirrored_type_reuses_mirrored_domain() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(TestDeclaration::new("m", TestEndpoint::Client));
        assert_eq!(
            catalog.domain_for(ParameterType::MirroredCipherSuite.into(), &scope).expect("domain"),
            catalog.domain_for(ParameterType::CipherSuite.into(), &scope).expect("domain"),
        );
    }

    #[test]
    fn mac_bitmask_domain_spans_longest_mac() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(TestDeclaration::new("mac", TestEndpoint::Server));
        let domain = catalog
            .domain_for(ParameterType::MacBitmask.into(), &scope)
            .expect("domain");
        assert_eq!(domain.len(), 32);
    }
}
