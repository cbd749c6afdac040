//! Conditional constraints between parameters and the liveness filter
//! applied before they reach the solver.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::{
    DerivationScope, FeasibilityCheck, MatrixError, MatrixResult, ParameterCatalog, ParameterId,
    ParameterValue,
};

/// `true` means the tuple (ordered like `Constraint::affected`) is forbidden.
pub type ForbidPredicate = Arc<dyn Fn(&[&ParameterValue]) -> bool + Send + Sync>;

/// How liveness is decided for a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feasibility {
    /// Live iff the product of the affected domains holds both a forbidden
    /// and a permitted tuple.
    Partition,
    /// Live iff the composite check holds for the scope.
    Check(FeasibilityCheck),
    Always,
}

#[derive(Clone)]
pub struct Constraint {
    pub name: String,
    pub affected: Vec<ParameterId>,
    pub feasibility: Feasibility,
    /// Keep the "no value" sentinel in the partition.
    pub sentinel: bool,
    forbids: ForbidPredicate,
}

impl Constraint {
    pub fn new<I, P>(
        name: impl Into<String>,
        affected: I,
        forbids: impl Fn(&[&ParameterValue]) -> bool + Send + Sync + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParameterId>,
    {
        Self {
            name: name.into(),
            affected: affected.into_iter().map(Into::into).collect(),
            feasibility: Feasibility::Partition,
            sentinel: false,
            forbids: Arc::new(forbids),
        }
    }

    pub fn when(mut self, check: FeasibilityCheck) -> Self {
        self.feasibility = Feasibility::Check(check);
        self.sentinel |= check.is_about_sentinel();
        self
    }

    /// The constraint talks about absent values, e.g. "no sig-hash".
    pub fn about_sentinel(mut self) -> Self {
        self.sentinel = true;
        self
    }

    pub fn always_live(mut self) -> Self {
        self.feasibility = Feasibility::Always;
        self
    }

    pub fn forbids(&self, values: &[&ParameterValue]) -> bool {
        (self.forbids)(values)
    }

    /// Whether the constraint can forbid anything in this scope. Only live
    /// constraints may be handed to the solver.
    pub fn is_live(
        &self,
        scope: &DerivationScope,
        catalog: &ParameterCatalog,
    ) -> MatrixResult<bool> {
        match self.feasibility {
            Feasibility::Always => Ok(true),
            Feasibility::Check(check) => check.evaluate(scope, catalog),
            Feasibility::Partition => {
                let mut domains = Vec::with_capacity(self.affected.len());
                for id in &self.affected {
                    let mut values = catalog.constrained_domain_for(*id, scope)?;
                    if !self.sentinel {
                        values.retain(|v| !v.is_absent());
                    }
                    domains.push(values);
                }
                Ok(partition_is_split(&domains, |tuple| self.forbids(tuple)))
            }
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("affected", &self.affected)
            .field("feasibility", &self.feasibility)
            .field("sentinel", &self.sentinel)
            .finish_non_exhaustive()
    }
}

/// Walks the product of `domains` until one forbidden and one permitted
/// tuple have been seen.
fn partition_is_split(
    domains: &[Vec<ParameterValue>],
    forbids: impl Fn(&[&ParameterValue]) -> bool,
) -> bool {
    if domains.is_empty() || domains.iter().any(Vec::is_empty) {
        return false;
    }
    let mut cursor = vec![0usize; domains.len()];
    let (mut forbidden, mut permitted) = (false, false);
    loop {
        let tuple: Vec<&ParameterValue> = cursor
            .iter()
            .zip(domains)
            .map(|(idx, domain)| &domain[*idx])
            .collect();
        if forbids(&tuple) {
            forbidden = true;
        } else {
            permitted = true;
        }
        if forbidden && permitted {
            return true;
        }
        // Odometer increment, last position fastest.
        let mut pos = domains.len();
        loop {
            if pos == 0 {
                return false;
            }
            pos -= 1;
            cursor[pos] += 1;
            if cursor[pos] < domains[pos].len() {
                break;
            }
            cursor[pos] = 0;
        }
    }
}

/// Keeps the live constraints whose affected parameters are all modeled.
/// Dropped constraints are logged.
pub fn select_feasible(
    constraints: &[Constraint],
    scope: &DerivationScope,
    catalog: &ParameterCatalog,
    modeled: &BTreeSet<ParameterId>,
) -> MatrixResult<Vec<Constraint>> {
    let mut kept = Vec::new();
    for constraint in constraints {
        if constraint.affected.is_empty() {
            return Err(MatrixError::Modeling(format!(
                "{}: constraint {} affects no parameters",
                scope.test_id(),
                constraint.name
            )));
        }
        if let Some(missing) = constraint.affected.iter().find(|id| !modeled.contains(*id)) {
            tracing::info!(
                test = scope.test_id(),
                constraint = %constraint.name,
                "dropping constraint: {missing} is not modeled"
            );
            continue;
        }
        if constraint.is_live(scope, catalog)? {
            kept.push(constraint.clone());
        } else {
            tracing::info!(
                test = scope.test_id(),
                constraint = %constraint.name,
                "dropping infeasible constraint"
            );
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CipherSuite, ParameterType, TargetCapabilities, TestDeclaration, TestEndpoint,
    };

    fn scope(suites: &[CipherSuite]) -> DerivationScope {
        let mut caps = TargetCapabilities::default();
        caps.cipher_suites = suites.iter().copied().collect();
        DerivationScope::new(
            Arc::new(TestDeclaration::new("constraint", TestEndpoint::Server)),
            Arc::new(caps),
        )
    }

    fn no_ephemeral_suites() -> Constraint {
        Constraint::new("static-only", [ParameterType::CipherSuite], |values| {
            values[0]
                .as_cipher_suite()
                .and_then(|s| s.is_ephemeral().ok())
                .unwrap_or(false)
        })
    }

    #[test]
    fn partition_liveness_requires_both_sides() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let constraint = no_ephemeral_suites();

        let all_ephemeral = scope(&[
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA,
        ]);
        assert!(!constraint.is_live(&all_ephemeral, &catalog).unwrap());

        let mixed = scope(&[
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
        ]);
        assert!(constraint.is_live(&mixed, &catalog).unwrap());
    }

    #[test]
    fn infeasible_and_unmodeled_constraints_are_dropped() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(&[CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA]);
        let modeled: BTreeSet<ParameterId> = [ParameterType::CipherSuite.into()].into();
        let unmodeled = Constraint::new("alert", [ParameterType::Alert], |_| true).always_live();

        let kept = select_feasible(&[no_ephemeral_suites(), unmodeled], &scope, &catalog, &modeled)
            .expect("select");
        assert!(kept.is_empty());
    }

    #[test]
    fn check_based_constraint_uses_composite_check() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(&[
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
        ]);
        let constraint =
            Constraint::new("static needs no group", [ParameterType::CipherSuite], |_| false)
                .when(FeasibilityCheck::StaticSuiteModeled);
        assert!(constraint.is_live(&scope, &catalog).unwrap());
    }

    fn ephemeral_without_sig_hash() -> Constraint {
        Constraint::new(
            "ephemeral needs sig-hash",
            [ParameterType::CipherSuite, ParameterType::SigHashAlgorithm],
            |values| {
                let ephemeral = values[0]
                    .as_cipher_suite()
                    .and_then(|s| s.is_ephemeral().ok())
                    .unwrap_or(false);
                ephemeral && values[1].is_absent()
            },
        )
    }

    #[test]
    fn sentinel_constraints_keep_absent_values_in_the_partition() {
        let catalog = ParameterCatalog::standard().expect("catalog");
        let scope = scope(&[
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
        ]);
        let modeled: BTreeSet<ParameterId> = [
            ParameterType::CipherSuite.into(),
            ParameterType::SigHashAlgorithm.into(),
        ]
        .into();

        assert!(!ephemeral_without_sig_hash().is_live(&scope, &catalog).unwrap());

        let kept = select_feasible(
            &[ephemeral_without_sig_hash().about_sentinel()],
            &scope,
            &catalog,
            &modeled,
        )
        .expect("select");
        assert_eq!(kept.len(), 1);
        let forbidden =
            ParameterValue::CipherSuite(CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA);
        assert!(kept[0].forbids(&[&forbidden, &ParameterValue::Absent]));
    }

    #[test]
    fn sentinel_checks_mark_the_constraint() {
        let plain = Constraint::new("c", [ParameterType::CipherSuite], |_| false)
            .when(FeasibilityCheck::StaticSuiteModeled);
        assert!(!plain.sentinel);
        let null = Constraint::new("c", [ParameterType::SigHashAlgorithm], |_| false)
            .when(FeasibilityCheck::NullSigHashModeled);
        assert!(null.sentinel);
    }

    #[test]
    fn partition_walks_multi_parameter_products() {
        let a = vec![ParameterValue::Number(1), ParameterValue::Number(2)];
        let b = vec![ParameterValue::Flag(false), ParameterValue::Flag(true)];
        let only_last = |t: &[&ParameterValue]| {
            *t[0] == ParameterValue::Number(2) && *t[1] == ParameterValue::Flag(true)
        };
        assert!(partition_is_split(&[a.clone(), b.clone()], only_last));
        assert!(!partition_is_split(&[a, b], |_| true));
        assert!(!partition_is_split(&[Vec::new()], |_| true));
    }
}
