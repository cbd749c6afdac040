//! Derivation parameters and the two-phase application of a combination
//! onto a protocol configuration.

use serde::{Deserialize, Serialize};

use std::fmt;

use crate::{
    ApplyContext, DerivationScope, MatrixError, MatrixResult, ParameterCatalog,
    ParameterCombination, ParameterId, ParameterValue, TlsConfig,
};

/// An identifier plus the value chosen for it. The value is written once:
/// `select` consumes an unselected parameter and refuses a selected one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationParameter {
    id: ParameterId,
    selected: Option<ParameterValue>,
}

impl DerivationParameter {
    pub fn new(id: impl Into<ParameterId>) -> Self {
        Self {
            id: id.into(),
            selected: None,
        }
    }

    pub fn select(self, value: ParameterValue) -> MatrixResult<Self> {
        if let Some(existing) = &self.selected {
            return Err(MatrixError::Modeling(format!(
                "{} already selected {existing}, refusing {value}",
                self.id
            )));
        }
        Ok(Self {
            id: self.id,
            selected: Some(value),
        })
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn selected(&self) -> Option<&ParameterValue> {
        self.selected.as_ref()
    }

    /// Candidate values for this parameter in `scope`, value filters applied.
    pub fn candidates(
        &self,
        catalog: &ParameterCatalog,
        scope: &DerivationScope,
    ) -> MatrixResult<Vec<ParameterValue>> {
        catalog.constrained_domain_for(self.id, scope)
    }

    fn selected_or_err(&self) -> MatrixResult<&ParameterValue> {
        self.selected
            .as_ref()
            .ok_or_else(|| MatrixError::Modeling(format!("{} has no selected value", self.id)))
    }
}

impl fmt::Display for DerivationParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selected {
            Some(value) => write!(f, "{}={value}", self.id),
            None => write!(f, "{}=<unselected>", self.id),
        }
    }
}

/// Applies every parameter of `combination` to a copy of `base`, then runs
/// the post-processing pass in the same order. `base` is left untouched.
pub fn derive_config(
    base: &TlsConfig,
    combination: &ParameterCombination,
    scope: &DerivationScope,
    catalog: &ParameterCatalog,
) -> MatrixResult<TlsConfig> {
    let mut config = base.clone();
    let tester = scope.endpoint().tester();
    for param in combination.parameters() {
        let ctx = ApplyContext {
            id: param.id(),
            tester,
            combination,
        };
        catalog.apply_to(&mut config, param.selected_or_err()?, &ctx)?;
    }
    for param in combination.parameters() {
        let ctx = ApplyContext {
            id: param.id(),
            tester,
            combination,
        };
        catalog.post_process(&mut config, param.selected_or_err()?, &ctx)?;
    }
    Ok(config)
}
