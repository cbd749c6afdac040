//! `tlsmatrix catalog` and `tlsmatrix plan`: inspect the parameter catalog
//! and the model a declaration produces against a capability snapshot.

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::sync::Arc;

use crate::{
    CombinationSolver, Config, DerivationScope, ExhaustiveSolver, MatrixError, MatrixResult,
    ParameterCatalog, ParameterModel, ScopeDeclaration, TargetCapabilities, TestDeclaration,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub parameter: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirrors: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogListing {
    pub entries: Vec<CatalogEntry>,
}

impl CatalogListing {
    pub fn pretty(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!("{:<32} {}", e.parameter, e.kind));
            if let Some(linked) = &e.linked {
                out.push_str(&format!(" linked={linked}"));
            }
            if let Some(mirrors) = &e.mirrors {
                out.push_str(&format!(" mirrors={mirrors}"));
            }
            if e.required {
                out.push_str(" required");
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

pub fn catalog_listing(catalog: &ParameterCatalog) -> CatalogListing {
    CatalogListing {
        entries: catalog
            .specs()
            .map(|spec| CatalogEntry {
                parameter: spec.ty.name(),
                kind: spec.kind.as_str().to_string(),
                linked: spec.linked.map(|t| t.name()),
                mirrors: spec.mirrors.map(|t| t.name()),
                required: spec.required,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedDimension {
    pub parameter: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    #[serde(rename = "testId")]
    pub test_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
    pub dimensions: Vec<PlannedDimension>,
    pub constraints: Vec<String>,
    pub strength: usize,
    /// Unconstrained product size, as a string since it may exceed u64.
    pub exhaustive: String,
    /// Tuples left after constraints, capped by `max_combinations`.
    pub combinations: usize,
}

impl PlanReport {
    pub fn pretty(&self) -> String {
        let mut out = format!("test={} strength={}\n", self.test_id, self.strength);
        if let Some(reason) = &self.disabled {
            out.push_str(&format!("disabled: {reason}\n"));
            return out.trim_end().to_string();
        }
        for dim in &self.dimensions {
            out.push_str(&format!(
                "{} ({}): {}\n",
                dim.parameter,
                dim.values.len(),
                dim.values.join(", ")
            ));
        }
        for name in &self.constraints {
            out.push_str(&format!("constraint: {name}\n"));
        }
        out.push_str(&format!(
            "combinations: {} of {} exhaustive\n",
            self.combinations, self.exhaustive
        ));
        out.trim_end().to_string()
    }
}

/// Builds the model for the scope declared in `declaration_path` against
/// the capability snapshot in `capabilities_path`.
pub fn plan_command(
    config: &Config,
    catalog: &ParameterCatalog,
    capabilities_path: &Path,
    declaration_path: &Path,
) -> MatrixResult<PlanReport> {
    let capabilities = TargetCapabilities::load_json(capabilities_path)?;
    let raw = std::fs::read_to_string(declaration_path).map_err(|err| {
        MatrixError::InvalidArgument(format!(
            "failed to read declaration {}: {err}",
            declaration_path.display()
        ))
    })?;
    let scope_decl: ScopeDeclaration = serde_json::from_str(&raw)?;
    let declaration = Arc::new(TestDeclaration::from_scope(scope_decl));
    let scope = DerivationScope::new(declaration, Arc::new(capabilities));
    plan(&scope, catalog, config.strength, config.max_combinations)
}

pub fn plan(
    scope: &DerivationScope,
    catalog: &ParameterCatalog,
    strength: usize,
    max_combinations: usize,
) -> MatrixResult<PlanReport> {
    let model = ParameterModel::build(scope, catalog, strength)?;
    let combinations = if model.is_disabled() {
        0
    } else {
        ExhaustiveSolver.solve(&model, max_combinations.max(1))?.len()
    };
    Ok(PlanReport {
        test_id: model.test_id.clone(),
        disabled: model.disabled.clone(),
        dimensions: model
            .dimensions
            .iter()
            .map(|d| PlannedDimension {
                parameter: d.id.to_string(),
                values: d.domain.iter().map(ToString::to_string).collect(),
            })
            .collect(),
        constraints: model.constraints.iter().map(|c| c.name.clone()).collect(),
        strength: model.strength,
        exhaustive: model.exhaustive_size().to_string(),
        combinations,
    })
}
