//! Covering-array solver seam and an exhaustive reference solver.

use crate::{MatrixError, MatrixResult, ParameterModel, ParameterValue, SolverTuple};

/// Turns a parameter model into value tuples in dimension order. Every
/// returned tuple must satisfy the model's constraints.
pub trait CombinationSolver: Send + Sync {
    fn solve(&self, model: &ParameterModel, max: usize) -> MatrixResult<Vec<SolverTuple>>;
}

/// Full constrained Cartesian product, capped at `max` tuples. Covers any
/// strength; meant for small models and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExhaustiveSolver;

impl CombinationSolver for ExhaustiveSolver {
    fn solve(&self, model: &ParameterModel, max: usize) -> MatrixResult<Vec<SolverTuple>> {
        if max == 0 {
            return Err(MatrixError::InvalidArgument(
                "combination cap must be at least 1".to_string(),
            ));
        }
        if model.dimensions.iter().any(|d| d.domain.is_empty()) {
            return Err(MatrixError::Modeling(format!(
                "{}: model contains an empty dimension",
                model.test_id
            )));
        }
        let domains: Vec<&[ParameterValue]> =
            model.dimensions.iter().map(|d| d.domain.as_slice()).collect();

        let mut out = Vec::new();
        let mut cursor = vec![0usize; domains.len()];
        loop {
            let tuple: SolverTuple = cursor
                .iter()
                .zip(&domains)
                .map(|(&i, domain)| domain[i].clone())
                .collect();
            if model.violates(&tuple).is_none() {
                out.push(tuple);
                if out.len() >= max {
                    tracing::warn!(
                        test = %model.test_id,
                        "combination cap of {max} reached, remaining tuples dropped"
                    );
                    break;
                }
            }

            // Odometer step; the rightmost dimension moves fastest.
            let mut pos = domains.len();
            loop {
                if pos == 0 {
                    return Ok(out);
                }
                pos -= 1;
                cursor[pos] += 1;
                if cursor[pos] < domains[pos].len() {
                    break;
                }
                cursor[pos] = 0;
            }
        }
        Ok(out)
    }
}
