//! Drives one logical test from declaration to finalized verdict, and a
//! whole registry on a bounded pool.

use std::sync::Arc;

use crate::{
    CauseKind, CheckResult, CombinationConsumer, CombinationSolver, ConcreteVariant,
    DerivationScope, ExecutableTemplate, Expansion, KeyExchangeAlgorithm, MatrixError,
    MatrixResult, OutcomeCause, OutcomeIdentity, ParameterCatalog, ParameterCombination,
    ParameterModel, Peer, RawOutcome, RunContext, RunSummary, RunnerSettings, TestDeclaration,
    TestEndpoint, TestRegistry, TestVerdict, Timing, TlsConfig, VariantCheck, VariantExecutor,
    VariantScheduler, WorkflowTrace,
};

/// A compliance test: a declared scope, a template builder and a validator.
pub trait ComplianceTest: Send + Sync {
    fn declaration(&self) -> Arc<TestDeclaration>;

    /// Builds the template for one combination. `config` already has every
    /// parameter of `combination` applied.
    fn build(
        &self,
        helper: &TestHelper<'_>,
        config: TlsConfig,
        combination: &ParameterCombination,
    ) -> MatrixResult<ExecutableTemplate>;

    fn validate(&self, check: &mut VariantCheck<'_>) -> CheckResult;
}

/// Role-aware helpers handed to `ComplianceTest::build`.
#[derive(Debug, Clone, Copy)]
pub struct TestHelper<'a> {
    scope: &'a DerivationScope,
}

impl<'a> TestHelper<'a> {
    pub fn new(scope: &'a DerivationScope) -> Self {
        Self { scope }
    }

    pub fn scope(&self) -> &DerivationScope {
        self.scope
    }

    pub fn endpoint(&self) -> TestEndpoint {
        self.scope.endpoint()
    }

    pub fn tester(&self) -> Peer {
        self.scope.endpoint().tester()
    }

    /// Tester offer filled from the capability snapshot: compatible suites,
    /// the groups and signature algorithms of the target version, and the
    /// first certificate.
    pub fn base_config(&self) -> TlsConfig {
        let version = self.scope.target_version();
        let caps = self.scope.capabilities();
        let mut config = TlsConfig::new(version);
        let offer = config.offer_mut(self.tester());
        offer.cipher_suites = crate::compatible_cipher_suites(self.scope);
        offer.named_groups = if self.scope.is_tls13() {
            caps.tls13_named_groups.iter().copied().collect()
        } else {
            caps.named_groups.iter().copied().collect()
        };
        offer.signature_algorithms = caps
            .signature_algorithms
            .iter()
            .copied()
            .filter(|s| s.allowed_in(version))
            .collect();
        config.certificate = caps.certificates.first().cloned();
        config
    }

    /// Key exchange the handshake will run with: the selected suite, else
    /// the tester's first offered suite.
    pub fn key_exchange(&self, config: &TlsConfig) -> MatrixResult<KeyExchangeAlgorithm> {
        let suite = config
            .selected_cipher_suite
            .or_else(|| config.offer(self.tester()).cipher_suites.first().copied())
            .ok_or_else(|| {
                MatrixError::Modeling(format!(
                    "{}: no cipher suite selected or offered",
                    self.scope.test_id()
                ))
            })?;
        suite.key_exchange()
    }

    pub fn handshake_trace(&self, config: &TlsConfig) -> MatrixResult<WorkflowTrace> {
        Ok(WorkflowTrace::handshake(self.endpoint(), self.key_exchange(config)?))
    }

    /// Template running a complete handshake with `config`.
    pub fn handshake(&self, config: TlsConfig) -> MatrixResult<ExecutableTemplate> {
        let trace = self.handshake_trace(&config)?;
        Ok(ExecutableTemplate { config, trace })
    }
}

enum Prepared {
    Disabled(String),
    Variants(Vec<ConcreteVariant>),
}

pub struct TestRunner {
    catalog: Arc<ParameterCatalog>,
    solver: Arc<dyn CombinationSolver>,
    scheduler: VariantScheduler,
    context: Arc<RunContext>,
    settings: RunnerSettings,
}

impl TestRunner {
    pub fn new(
        context: Arc<RunContext>,
        executor: Arc<dyn VariantExecutor>,
        solver: Arc<dyn CombinationSolver>,
        settings: RunnerSettings,
    ) -> MatrixResult<Self> {
        Ok(Self::with_catalog(
            Arc::new(ParameterCatalog::standard()?),
            context,
            executor,
            solver,
            settings,
        ))
    }

    pub fn with_catalog(
        catalog: Arc<ParameterCatalog>,
        context: Arc<RunContext>,
        executor: Arc<dyn VariantExecutor>,
        solver: Arc<dyn CombinationSolver>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            catalog,
            solver,
            scheduler: VariantScheduler::new(executor, settings.schedule),
            context,
            settings,
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.context
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    /// Runs one test and returns the verdict the context holds for it. A
    /// test that is already finalized is not run again.
    pub fn run_test(&self, test: &dyn ComplianceTest) -> TestVerdict {
        let declaration = test.declaration();
        let test_id = declaration.test_id().to_string();
        if let Some(existing) = self.context.verdict(&test_id) {
            return existing;
        }
        if !self.context.test_started(&test_id) {
            tracing::debug!(test = %test_id, "already running; waiting for its verdict");
            if let Some(verdict) = self.context.await_verdict(&test_id) {
                return verdict;
            }
        }

        let scope = DerivationScope::new(declaration, self.context.capabilities_arc());
        let verdict = match self.prepare(test, &scope) {
            Ok(Prepared::Disabled(reason)) => {
                tracing::info!(test = %test_id, "disabled: {reason}");
                TestVerdict::disabled(&test_id, reason)
            }
            Ok(Prepared::Variants(variants)) => {
                tracing::info!(test = %test_id, variants = variants.len(), "executing");
                let outcomes = self
                    .scheduler
                    .run(variants, &|check: &mut VariantCheck<'_>| test.validate(check));
                crate::aggregate(&test_id, outcomes)
            }
            Err(err) => {
                tracing::error!(test = %test_id, "aborted before execution: {err}");
                modeling_failure(&test_id, &err)
            }
        };
        tracing::info!(test = %test_id, status = %verdict.status, "finalized");
        self.context.finalize(verdict.clone());
        self.context.verdict(&test_id).unwrap_or(verdict)
    }

    fn prepare(
        &self,
        test: &dyn ComplianceTest,
        scope: &DerivationScope,
    ) -> MatrixResult<Prepared> {
        let model = ParameterModel::build(scope, &self.catalog, self.settings.strength)?;
        if let Some(reason) = model.disabled {
            return Ok(Prepared::Disabled(reason));
        }
        tracing::debug!(
            test = scope.test_id(),
            dimensions = model.dimensions.len(),
            constraints = model.constraints.len(),
            strength = model.strength,
            "model built"
        );

        let tuples = self.solver.solve(&model, self.settings.max_combinations)?;
        let combinations = CombinationConsumer::new(&model).consume(tuples)?;
        if combinations.is_empty() {
            return Ok(Prepared::Disabled(
                "no parameter combination satisfies the constraints".to_string(),
            ));
        }

        let helper = TestHelper::new(scope);
        let base = helper.base_config();
        let mut variants = Vec::new();
        let mut not_applicable = None;
        for combination in combinations {
            let config = crate::derive_config(&base, &combination, scope, &self.catalog)?;
            let template = test.build(&helper, config, &combination)?;
            match crate::expand(&template, Arc::new(combination), scope, variants.len())? {
                Expansion::Variants(expanded) => variants.extend(expanded),
                Expansion::NotApplicable { reason } => {
                    not_applicable.get_or_insert(reason);
                }
            }
        }
        if variants.is_empty() {
            return Ok(Prepared::Disabled(not_applicable.unwrap_or_default()));
        }
        Ok(Prepared::Variants(variants))
    }

    /// Runs every registered test on `test_jobs` workers and returns the
    /// run summary.
    pub fn run_all(&self, registry: &TestRegistry) -> RunSummary {
        let jobs = self.settings.test_jobs.clamp(1, registry.len().max(1));
        let (tx, rx) = crossbeam_channel::unbounded::<Arc<dyn ComplianceTest>>();
        for test in registry.tests() {
            let _ = tx.send(Arc::clone(test));
        }
        drop(tx);

        std::thread::scope(|s| {
            for _ in 0..jobs {
                let rx = rx.clone();
                s.spawn(move || {
                    for test in rx.iter() {
                        self.run_test(test.as_ref());
                    }
                });
            }
        });
        self.context.summary()
    }
}

fn modeling_failure(test_id: &str, err: &MatrixError) -> TestVerdict {
    let identity = OutcomeIdentity::new(test_id, "").annotate("modeling");
    let outcome = RawOutcome::errored(
        &identity,
        0,
        OutcomeCause::new(CauseKind::Modeling, err.to_string()),
        Timing::instant(),
    );
    crate::aggregate(test_id, vec![outcome])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CipherSuite, ExecutionFault, ExecutionRecord, ExhaustiveSolver, ModelType, ParameterType,
        ParameterValue, ProtocolVersion, TargetCapabilities, TargetSpec, TestStatus,
    };

    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AsPlanned;

    impl VariantExecutor for AsPlanned {
        fn execute(
            &self,
            trace: &WorkflowTrace,
            _config: &TlsConfig,
        ) -> Result<ExecutionRecord, ExecutionFault> {
            Ok(ExecutionRecord::as_planned(trace))
        }
    }

    struct Slow(AtomicUsize);

    impl VariantExecutor for Slow {
        fn execute(
            &self,
            trace: &WorkflowTrace,
            _config: &TlsConfig,
        ) -> Result<ExecutionRecord, ExecutionFault> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(50));
            Ok(ExecutionRecord::as_planned(trace))
        }
    }

    fn caps() -> TargetCapabilities {
        let mut caps = TargetCapabilities::default();
        caps.versions = [ProtocolVersion::Tls12].into();
        caps.cipher_suites = [
            CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA,
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        ]
        .into();
        caps
    }

    fn runner() -> TestRunner {
        let context = Arc::new(RunContext::with_capabilities(
            TargetSpec::new("localhost", 4433),
            caps(),
            None,
        ));
        TestRunner::new(
            context,
            Arc::new(AsPlanned),
            Arc::new(ExhaustiveSolver),
            RunnerSettings::default(),
        )
        .expect("runner")
    }

    struct Handshake(Arc<TestDeclaration>);

    /// Disables every variant whose suite is not ephemeral.
    struct EphemeralOnly(Arc<TestDeclaration>);

    impl ComplianceTest for EphemeralOnly {
        fn declaration(&self) -> Arc<TestDeclaration> {
            Arc::clone(&self.0)
        }

        fn build(
            &self,
            helper: &TestHelper<'_>,
            config: TlsConfig,
            _combination: &ParameterCombination,
        ) -> MatrixResult<ExecutableTemplate> {
            helper.handshake(config)
        }

        fn validate(&self, check: &mut VariantCheck<'_>) -> CheckResult {
            let ephemeral = check
                .config()
                .selected_cipher_suite
                .is_some_and(|s| s.is_ephemeral().unwrap_or(false));
            if !ephemeral {
                check.disable("static key exchange is out of scope");
            }
            check.executed_as_planned()
        }
    }

    impl ComplianceTest for Handshake {
        fn declaration(&self) -> Arc<TestDeclaration> {
            Arc::clone(&self.0)
        }

        fn build(
            &self,
            helper: &TestHelper<'_>,
            config: TlsConfig,
            _combination: &ParameterCombination,
        ) -> MatrixResult<ExecutableTemplate> {
            helper.handshake(config)
        }

        fn validate(&self, check: &mut VariantCheck<'_>) -> CheckResult {
            check.executed_as_planned()
        }
    }

    #[test]
    fn base_config_fills_tester_side_only() {
        let decl = Arc::new(TestDeclaration::new("helper", TestEndpoint::Client));
        let scope = DerivationScope::new(decl, Arc::new(caps()));
        let config = TestHelper::new(&scope).base_config();
        assert_eq!(config.server.cipher_suites.len(), 2);
        assert!(config.client.cipher_suites.is_empty());
    }

    #[test]
    fn cipher_suite_model_runs_one_variant_per_suite() {
        let runner = runner();
        let decl = TestDeclaration::new("suites", TestEndpoint::Server)
            .model(ModelType::Empty)
            .include(ParameterType::CipherSuite);
        let verdict = runner.run_test(&Handshake(Arc::new(decl)));
        assert_eq!(verdict.status, TestStatus::Succeeded);
        assert_eq!(verdict.outcomes.len(), 2);
        assert_eq!(runner.context().counters().succeeded, 1);
    }

    #[test]
    fn bad_explicit_value_fails_before_execution() {
        let runner = runner();
        let decl = TestDeclaration::new("broken", TestEndpoint::Server)
            .model(ModelType::Empty)
            .include(ParameterType::CipherSuite)
            .explicit(
                ParameterType::CipherSuite,
                vec![ParameterValue::CipherSuite(CipherSuite(0x0A0A))],
            );
        let verdict = runner.run_test(&Handshake(Arc::new(decl)));
        assert_eq!(verdict.status, TestStatus::Failed);
        let cause = verdict.failure_cause().expect("cause");
        assert_eq!(cause.kind, CauseKind::Modeling);
    }

    #[test]
    fn disabled_variants_count_only_when_nothing_else_ran() {
        let runner = runner();
        let mixed = TestDeclaration::new("mixed", TestEndpoint::Server)
            .model(ModelType::Empty)
            .include(ParameterType::CipherSuite);
        let verdict = runner.run_test(&EphemeralOnly(Arc::new(mixed)));
        assert_eq!(verdict.status, TestStatus::Succeeded);
        assert_eq!(verdict.count(crate::OutcomeStatus::Disabled), 1);

        let static_only = TestDeclaration::new("static", TestEndpoint::Server)
            .model(ModelType::Empty)
            .include(ParameterType::CipherSuite)
            .explicit(
                ParameterType::CipherSuite,
                vec![ParameterValue::CipherSuite(CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA)],
            );
        let verdict = runner.run_test(&EphemeralOnly(Arc::new(static_only)));
        assert_eq!(verdict.status, TestStatus::Disabled);
        assert_eq!(
            verdict.disabled_reason.as_deref(),
            Some("static key exchange is out of scope")
        );
    }

    #[test]
    fn concurrent_callers_share_one_execution() {
        let executor = Arc::new(Slow(AtomicUsize::new(0)));
        let context = Arc::new(RunContext::with_capabilities(
            TargetSpec::new("localhost", 4433),
            caps(),
            None,
        ));
        let runner = TestRunner::new(
            context,
            executor.clone(),
            Arc::new(ExhaustiveSolver),
            RunnerSettings::default(),
        )
        .expect("runner");
        let test = Handshake(Arc::new(
            TestDeclaration::new("shared", TestEndpoint::Server)
                .model(ModelType::Empty)
                .include(ParameterType::CipherSuite),
        ));

        let (a, b) = std::thread::scope(|scope| {
            let first = scope.spawn(|| runner.run_test(&test));
            let second = scope.spawn(|| runner.run_test(&test));
            (
                first.join().expect("first caller"),
                second.join().expect("second caller"),
            )
        });
        assert_eq!(a, b);
        assert_eq!(executor.0.load(Ordering::SeqCst), 2);
        assert_eq!(runner.context().counters().started, 1);
    }

    #[test]
    fn unsupported_key_exchange_is_disabled() {
        let runner = runner();
        let decl = TestDeclaration::new("tls13", TestEndpoint::Server)
            .key_exchange(crate::KeyExchangeRequirement::tls13());
        let verdict = runner.run_test(&Handshake(Arc::new(decl)));
        assert_eq!(verdict.status, TestStatus::Disabled);
        assert!(verdict.disabled_reason.is_some());
    }
}
