//! Per-test parameter model handed to the solver, and the consumer that
//! turns solver tuples back into parameter combinations.

use serde::Serialize;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{
    Constraint, DerivationParameter, DerivationScope, MatrixError, MatrixResult, ParameterCatalog,
    ParameterId, ParameterType, ParameterValue,
};

/// One value per dimension of a `ParameterModel`, in dimension order.
pub type SolverTuple = Vec<ParameterValue>;

/// Identifier -> selected parameter, exactly one per identifier. Ordered by
/// identifier, so the string form does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterCombination {
    params: BTreeMap<ParameterId, DerivationParameter>,
}

impl ParameterCombination {
    pub fn from_parameters(
        params: impl IntoIterator<Item = DerivationParameter>,
    ) -> MatrixResult<Self> {
        let mut map = BTreeMap::new();
        for param in params {
            if param.selected().is_none() {
                return Err(MatrixError::Modeling(format!(
                    "{} has no selected value",
                    param.id()
                )));
            }
            let id = param.id();
            if map.insert(id, param).is_some() {
                return Err(MatrixError::Modeling(format!("{id} appears twice in one combination")));
            }
        }
        Ok(Self { params: map })
    }

    pub fn get(&self, id: ParameterId) -> Option<&DerivationParameter> {
        self.params.get(&id)
    }

    pub fn value(&self, id: ParameterId) -> Option<&ParameterValue> {
        self.get(id).and_then(DerivationParameter::selected)
    }

    pub fn value_of(&self, ty: ParameterType) -> Option<&ParameterValue> {
        self.value(ParameterId::new(ty))
    }

    pub fn parameters(&self) -> impl Iterator<Item = &DerivationParameter> + '_ {
        self.params.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParameterId> + '_ {
        self.params.keys().copied()
    }

    pub fn types(&self) -> BTreeSet<ParameterType> {
        self.params.keys().map(|id| id.ty).collect()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl fmt::Display for ParameterCombination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for param in self.params.values() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{param}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    pub id: ParameterId,
    pub domain: Vec<ParameterValue>,
}

/// Domains and live constraints for one test, or the reason it is disabled.
#[derive(Debug, Clone)]
pub struct ParameterModel {
    pub test_id: String,
    pub dimensions: Vec<Dimension>,
    pub constraints: Vec<Constraint>,
    pub strength: usize,
    pub disabled: Option<String>,
}

impl ParameterModel {
    pub fn build(
        scope: &DerivationScope,
        catalog: &ParameterCatalog,
        default_strength: usize,
    ) -> MatrixResult<Self> {
        scope.declaration().validate()?;
        let mut model = Self {
            test_id: scope.test_id().to_string(),
            dimensions: Vec::new(),
            constraints: Vec::new(),
            strength: 1,
            disabled: None,
        };

        for &ty in scope.model_types() {
            let spec = catalog.spec(ty)?;
            let id = ParameterId::new(ty);
            let domain = catalog.constrained_domain_for(id, scope)?;
            if domain.is_empty() {
                if spec.required {
                    let reason = format!("no {ty} value is applicable to this target and test");
                    tracing::info!(test = scope.test_id(), "{reason}");
                    model.disabled = Some(reason);
                    model.dimensions.clear();
                    return Ok(model);
                }
                tracing::debug!(test = scope.test_id(), parameter = %id, "not modelable, skipped");
                continue;
            }

            let mut dims = vec![Dimension { id, domain }];
            if let Some(linked) = spec.linked {
                let linked_id = ParameterId::linked(linked, ty);
                let linked_domain = catalog.constrained_domain_for(linked_id, scope)?;
                if linked_domain.is_empty() {
                    tracing::debug!(
                        test = scope.test_id(),
                        parameter = %id,
                        "linked {linked_id} has no values, skipped"
                    );
                    continue;
                }
                dims.push(Dimension {
                    id: linked_id,
                    domain: linked_domain,
                });
            }
            model.dimensions.extend(dims);
        }

        model.constraints =
            crate::select_feasible(scope.constraints(), scope, catalog, &model.ids())?;
        let requested = scope
            .declaration()
            .scope
            .strength
            .unwrap_or(default_strength)
            .max(1);
        model.strength = requested.min(model.dimensions.len().max(1));
        Ok(model)
    }

    pub fn ids(&self) -> BTreeSet<ParameterId> {
        self.dimensions.iter().map(|d| d.id).collect()
    }

    pub fn position(&self, id: ParameterId) -> Option<usize> {
        self.dimensions.iter().position(|d| d.id == id)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.is_some()
    }

    /// Size of the unconstrained Cartesian product, saturating.
    pub fn exhaustive_size(&self) -> u128 {
        self.dimensions
            .iter()
            .fold(1u128, |acc, d| acc.saturating_mul(d.domain.len() as u128))
    }

    /// Whether `tuple` violates any live constraint.
    pub fn violates(&self, tuple: &[ParameterValue]) -> Option<&Constraint> {
        self.constraints.iter().find(|c| {
            let projected: Option<Vec<&ParameterValue>> = c
                .affected
                .iter()
                .map(|id| self.position(*id).map(|pos| &tuple[pos]))
                .collect();
            projected.is_some_and(|values| c.forbids(&values))
        })
    }
}

/// Validates solver tuples against the model and builds combinations.
pub struct CombinationConsumer<'a> {
    model: &'a ParameterModel,
}

impl<'a> CombinationConsumer<'a> {
    pub fn new(model: &'a ParameterModel) -> Self {
        Self { model }
    }

    pub fn consume(&self, tuples: Vec<SolverTuple>) -> MatrixResult<Vec<ParameterCombination>> {
        let model = self.model;
        let mut out = Vec::with_capacity(tuples.len());
        for (row, tuple) in tuples.into_iter().enumerate() {
            if tuple.len() != model.dimensions.len() {
                return Err(MatrixError::Modeling(format!(
                    "{}: solver tuple {row} has {} values for {} parameters",
                    model.test_id,
                    tuple.len(),
                    model.dimensions.len()
                )));
            }
            if let Some(constraint) = model.violates(&tuple) {
                return Err(MatrixError::Modeling(format!(
                    "{}: solver tuple {row} violates constraint {}",
                    model.test_id, constraint.name
                )));
            }
            let mut params = Vec::with_capacity(tuple.len());
            for (dim, value) in model.dimensions.iter().zip(tuple) {
                if !dim.domain.contains(&value) {
                    return Err(MatrixError::Modeling(format!(
                        "{}: solver tuple {row} assigns {value} outside the domain of {}",
                        model.test_id, dim.id
                    )));
                }
                params.push(DerivationParameter::new(dim.id).select(value)?);
            }
            out.push(ParameterCombination::from_parameters(params)?);
        }
        Ok(out)
    }
}
