//! Test declarations and the per-test derivation scope built from them.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::{
    Constraint, ExpansionStrategy, KeyExchangeRequirement, MatrixError, MatrixResult,
    ParameterType, ParameterValue, ProtocolVersion, TargetCapabilities, TestEndpoint,
};

/// Base parameter set a test starts from before includes and excludes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Empty,
    #[default]
    Generic,
    Certificate,
}

impl ModelType {
    pub fn base_types(self) -> &'static [ParameterType] {
        match self {
            Self::Empty => &[],
            Self::Generic => &[
                ParameterType::CipherSuite,
                ParameterType::NamedGroup,
                ParameterType::SigHashAlgorithm,
                ParameterType::RecordLength,
                ParameterType::TcpFragmentation,
            ],
            Self::Certificate => &[
                ParameterType::CipherSuite,
                ParameterType::NamedGroup,
                ParameterType::SigHashAlgorithm,
                ParameterType::RecordLength,
                ParameterType::TcpFragmentation,
                ParameterType::Certificate,
            ],
        }
    }
}

/// Serializable half of a test declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDeclaration {
    pub test_id: String,
    #[serde(default)]
    pub description: String,
    pub endpoint: TestEndpoint,
    #[serde(default)]
    pub key_exchange: KeyExchangeRequirement,
    #[serde(default)]
    pub model: ModelType,
    #[serde(default)]
    pub include: BTreeSet<ParameterType>,
    #[serde(default)]
    pub exclude: BTreeSet<ParameterType>,
    /// Manual overrides replacing a type's generated domain.
    #[serde(default)]
    pub explicit_values: BTreeMap<ParameterType, Vec<ParameterValue>>,
    #[serde(default)]
    pub expansion: ExpansionStrategy,
    /// Coverage strength requested from the solver; the run default applies when unset.
    #[serde(default)]
    pub strength: Option<usize>,
}

pub type ValuePredicate = Arc<dyn Fn(&ParameterValue) -> bool + Send + Sync>;

/// Shrinks one type's domain before it reaches the solver.
#[derive(Clone)]
pub struct ValueFilter {
    pub ty: ParameterType,
    pub name: String,
    predicate: ValuePredicate,
}

impl ValueFilter {
    pub fn new(
        ty: ParameterType,
        name: impl Into<String>,
        predicate: impl Fn(&ParameterValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            ty,
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn allows(&self, value: &ParameterValue) -> bool {
        (self.predicate)(value)
    }
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFilter")
            .field("ty", &self.ty)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Everything a test states about its parameters, registered up front.
#[derive(Debug, Clone)]
pub struct TestDeclaration {
    pub scope: ScopeDeclaration,
    pub value_filters: Vec<ValueFilter>,
    pub constraints: Vec<Constraint>,
}

impl TestDeclaration {
    pub fn new(test_id: impl Into<String>, endpoint: TestEndpoint) -> Self {
        Self::from_scope(ScopeDeclaration {
            test_id: test_id.into(),
            description: String::new(),
            endpoint,
            key_exchange: KeyExchangeRequirement::default(),
            model: ModelType::Generic,
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
            explicit_values: BTreeMap::new(),
            expansion: ExpansionStrategy::None,
            strength: None,
        })
    }

    pub fn from_scope(scope: ScopeDeclaration) -> Self {
        Self {
            scope,
            value_filters: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn test_id(&self) -> &str {
        &self.scope.test_id
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.scope.description = description.into();
        self
    }

    pub fn model(mut self, model: ModelType) -> Self {
        self.scope.model = model;
        self
    }

    pub fn key_exchange(mut self, requirement: KeyExchangeRequirement) -> Self {
        self.scope.key_exchange = requirement;
        self
    }

    pub fn include(mut self, ty: ParameterType) -> Self {
        self.scope.include.insert(ty);
        self
    }

    pub fn exclude(mut self, ty: ParameterType) -> Self {
        self.scope.exclude.insert(ty);
        self
    }

    pub fn explicit(mut self, ty: ParameterType, values: Vec<ParameterValue>) -> Self {
        self.scope.explicit_values.insert(ty, values);
        self
    }

    pub fn filter(
        mut self,
        ty: ParameterType,
        name: impl Into<String>,
        predicate: impl Fn(&ParameterValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.value_filters.push(ValueFilter::new(ty, name, predicate));
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn expansion(mut self, strategy: ExpansionStrategy) -> Self {
        self.scope.expansion = strategy;
        self
    }

    pub fn strength(mut self, strength: usize) -> Self {
        self.scope.strength = Some(strength);
        self
    }

    pub fn validate(&self) -> MatrixResult<()> {
        if self.scope.test_id.trim().is_empty() {
            return Err(MatrixError::Modeling("test id must not be empty".to_string()));
        }
        if self.scope.include.contains(&ParameterType::BitPosition) {
            return Err(MatrixError::Modeling(format!(
                "{}: BIT_POSITION is linked to bitmask types and cannot be included directly",
                self.scope.test_id
            )));
        }
        if self.scope.key_exchange.supported.is_empty() {
            return Err(MatrixError::Modeling(format!(
                "{}: key exchange requirement lists no supported types",
                self.scope.test_id
            )));
        }
        if self.scope.strength == Some(0) {
            return Err(MatrixError::Modeling(format!(
                "{}: coverage strength must be at least 1",
                self.scope.test_id
            )));
        }
        Ok(())
    }
}

/// Restrictions for one logical test plus the capability snapshot.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct DerivationScope {
    declaration: Arc<TestDeclaration>,
    capabilities: Arc<TargetCapabilities>,
    model_types: BTreeSet<ParameterType>,
}

impl DerivationScope {
    pub fn new(declaration: Arc<TestDeclaration>, capabilities: Arc<TargetCapabilities>) -> Self {
        let scope = &declaration.scope;
        let model_types = scope
            .model
            .base_types()
            .iter()
            .copied()
            .chain(scope.include.iter().copied())
            .filter(|ty| !scope.exclude.contains(ty) && *ty != ParameterType::BitPosition)
            .collect();
        Self {
            declaration,
            capabilities,
            model_types,
        }
    }

    pub fn declaration(&self) -> &TestDeclaration {
        &self.declaration
    }

    pub fn test_id(&self) -> &str {
        self.declaration.test_id()
    }

    pub fn endpoint(&self) -> TestEndpoint {
        self.declaration.scope.endpoint
    }

    pub fn key_exchange(&self) -> &KeyExchangeRequirement {
        &self.declaration.scope.key_exchange
    }

    pub fn is_tls13(&self) -> bool {
        self.key_exchange().is_tls13()
    }

    pub fn target_version(&self) -> ProtocolVersion {
        self.key_exchange().target_version()
    }

    pub fn capabilities(&self) -> &TargetCapabilities {
        &self.capabilities
    }

    pub fn capabilities_arc(&self) -> Arc<TargetCapabilities> {
        Arc::clone(&self.capabilities)
    }

    /// Included (base + include) minus excluded types, in catalog order.
    pub fn model_types(&self) -> &BTreeSet<ParameterType> {
        &self.model_types
    }

    pub fn is_modeled(&self, ty: ParameterType) -> bool {
        self.model_types.contains(&ty)
    }

    pub fn explicit_values(&self, ty: ParameterType) -> Option<&[ParameterValue]> {
        self.declaration
            .scope
            .explicit_values
            .get(&ty)
            .map(Vec::as_slice)
    }

    pub fn value_filters(&self, ty: ParameterType) -> impl Iterator<Item = &ValueFilter> + '_ {
        self.declaration
            .value_filters
            .iter()
            .filter(move |f| f.ty == ty)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.declaration.constraints
    }

    pub fn expansion(&self) -> ExpansionStrategy {
        self.declaration.scope.expansion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_types_are_base_plus_include_minus_exclude() {
        let decl = TestDeclaration::new("alert.close_notify", TestEndpoint::Server)
            .include(ParameterType::Alert)
            .exclude(ParameterType::TcpFragmentation);
        let scope = DerivationScope::new(Arc::new(decl), Arc::new(TargetCapabilities::default()));

        assert!(scope.is_modeled(ParameterType::Alert));
        assert!(scope.is_modeled(ParameterType::CipherSuite));
        assert!(!scope.is_modeled(ParameterType::TcpFragmentation));
        assert_eq!(scope.model_types().len(), 5);
    }

    #[test]
    fn declaring_bit_position_directly_is_a_modeling_error() {
        let decl =
            TestDeclaration::new("bad", TestEndpoint::Client).include(ParameterType::BitPosition);
        assert!(decl.validate().unwrap_err().is_modeling());
    }

    #[test]
    fn scope_declaration_deserializes_with_defaults() {
        let raw = r#"{
            "test_id": "record.length",
            "endpoint": "server",
            "include": ["MAC_BITMASK"],
            "explicit_values": {"RECORD_LENGTH": [{"kind": "number", "value": 50}]}
        }"#;
        let scope: ScopeDeclaration = serde_json::from_str(raw).expect("parse");
        assert_eq!(scope.model, ModelType::Generic);
        assert_eq!(scope.expansion, ExpansionStrategy::None);
        assert!(scope.include.contains(&ParameterType::MacBitmask));
        assert_eq!(
            scope.explicit_values[&ParameterType::RecordLength],
            vec![ParameterValue::Number(50)]
        );
    }
}
