//! Explicit table of the tests a run may execute.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{ComplianceTest, MatrixError, MatrixResult, TestDeclaration};

/// Test id -> test, built by plain registration at startup.
#[derive(Default, Clone)]
pub struct TestRegistry {
    tests: BTreeMap<String, Arc<dyn ComplianceTest>>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test; its declaration must be valid and its id unused.
    pub fn register(&mut self, test: Arc<dyn ComplianceTest>) -> MatrixResult<()> {
        let declaration = test.declaration();
        declaration.validate()?;
        let id = declaration.test_id().to_string();
        if self.tests.contains_key(&id) {
            return Err(MatrixError::InvalidArgument(format!(
                "test {id} is registered twice"
            )));
        }
        self.tests.insert(id, test);
        Ok(())
    }

    pub fn with(mut self, test: Arc<dyn ComplianceTest>) -> MatrixResult<Self> {
        self.register(test)?;
        Ok(self)
    }

    pub fn get(&self, test_id: &str) -> Option<Arc<dyn ComplianceTest>> {
        self.tests.get(test_id).cloned()
    }

    pub fn declaration(&self, test_id: &str) -> Option<Arc<TestDeclaration>> {
        self.tests.get(test_id).map(|t| t.declaration())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.tests.keys().map(String::as_str)
    }

    /// Tests in id order.
    pub fn tests(&self) -> impl Iterator<Item = &Arc<dyn ComplianceTest>> + '_ {
        self.tests.values()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}
