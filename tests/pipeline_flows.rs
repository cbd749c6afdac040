use std::path::PathBuf;
use std::sync::Arc;

use tlsmatrix::{
    AlertDescription, CauseKind, CheckResult, CipherSuite, Config, ExecutableTemplate,
    ExecutionFault, ExecutionRecord, ExhaustiveSolver, ExpansionStrategy, JsonLinesSink,
    KeyExchangeRequirement, KeyExchangeType, Message, MatrixResult, ModelType, ParameterCatalog,
    ParameterCombination, ParameterType, ParameterValue, RunContextCell, RunnerSettings,
    ScheduleOrder, ScheduleSettings, StaticCapabilityProvider, TargetSpec, TestDeclaration,
    TestEndpoint, TestHelper, TestRegistry, TestRunner, TestStatus, TlsConfig, VariantCheck,
    VariantExecutor, VerdictSink, WorkflowTrace, ComplianceTest, plan_command,
};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn temp_dir(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("tlsmatrix-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp dir");
    root
}

/// Stands in for a real peer: rejects corrupted records, closes the socket
/// early for one suite and resets the connection for DHE.
struct ScriptedPeer;

impl VariantExecutor for ScriptedPeer {
    fn execute(
        &self,
        trace: &WorkflowTrace,
        config: &TlsConfig,
    ) -> Result<ExecutionRecord, ExecutionFault> {
        if config
            .client
            .cipher_suites
            .contains(&CipherSuite::TLS_DHE_RSA_WITH_AES_128_CBC_SHA)
        {
            return Err(ExecutionFault("connection reset by peer".to_string()));
        }
        if !config.corruptions.is_empty() {
            return Ok(ExecutionRecord {
                received: vec![Message::Alert {
                    fatal: true,
                    description: Some(AlertDescription::BadRecordMac),
                }],
                ..ExecutionRecord::default()
            });
        }
        let mut record = ExecutionRecord::as_planned(trace);
        let ecdsa_gcm = CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256;
        if config.server.cipher_suites == vec![ecdsa_gcm] {
            record.socket_closed = true;
        }
        Ok(record)
    }
}

#[derive(Clone, Copy)]
enum Expect {
    Handshake,
    Rejection,
}

struct ScriptedTest {
    declaration: Arc<TestDeclaration>,
    expect: Expect,
}

impl ScriptedTest {
    fn new(declaration: TestDeclaration, expect: Expect) -> Arc<dyn ComplianceTest> {
        Arc::new(Self {
            declaration: Arc::new(declaration),
            expect,
        })
    }
}

impl ComplianceTest for ScriptedTest {
    fn declaration(&self) -> Arc<TestDeclaration> {
        Arc::clone(&self.declaration)
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
        match self.expect {
            Expect::Handshake => {
                if check.record().socket_closed {
                    check.mark_partial("socket closed without close_notify");
                }
                check.executed_as_planned()
            }
            Expect::Rejection => check.rejected(),
        }
    }
}

fn registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    let tests = [
        ScriptedTest::new(
            TestDeclaration::new("server.handshake", TestEndpoint::Server)
                .key_exchange(KeyExchangeRequirement::new([
                    KeyExchangeType::Rsa,
                    KeyExchangeType::Ecdh,
                ]))
                .exclude(ParameterType::RecordLength)
                .exclude(ParameterType::TcpFragmentation),
            Expect::Handshake,
        ),
        ScriptedTest::new(
            TestDeclaration::new("client.each_ecdh_suite", TestEndpoint::Client)
                .key_exchange(KeyExchangeRequirement::new([KeyExchangeType::Ecdh]))
                .model(ModelType::Empty)
                .include(ParameterType::RecordLength)
                .expansion(ExpansionStrategy::ReplaceSupported),
            Expect::Handshake,
        ),
        ScriptedTest::new(
            TestDeclaration::new("server.record.mac_bitflip", TestEndpoint::Server)
                .model(ModelType::Empty)
                .include(ParameterType::MacBitmask)
                .explicit(
                    ParameterType::MacBitmask,
                    vec![ParameterValue::Number(0), ParameterValue::Number(5)],
                )
                .include(ParameterType::CipherSuite)
                .explicit(
                    ParameterType::CipherSuite,
                    vec![ParameterValue::CipherSuite(
                        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA,
                    )],
                ),
            Expect::Rejection,
        ),
        ScriptedTest::new(
            TestDeclaration::new("server.tls13.handshake", TestEndpoint::Server)
                .key_exchange(KeyExchangeRequirement::tls13()),
            Expect::Handshake,
        ),
        ScriptedTest::new(
            TestDeclaration::new("server.dhe.handshake", TestEndpoint::Server)
                .key_exchange(KeyExchangeRequirement::new([KeyExchangeType::Dh]))
                .model(ModelType::Empty)
                .include(ParameterType::CipherSuite),
            Expect::Handshake,
        ),
    ];
    for test in tests {
        registry.register(test).expect("register");
    }
    registry
}

fn settings() -> RunnerSettings {
    RunnerSettings {
        strength: 2,
        max_combinations: 1_000,
        test_jobs: 2,
        schedule: ScheduleSettings {
            parallelism: 4,
            variant_timeout: std::time::Duration::from_secs(10),
            order: ScheduleOrder::Shuffled { seed: 1337 },
        },
    }
}

#[test]
fn full_run_reports_every_verdict_once() {
    let dir = temp_dir("run");
    let sink = Arc::new(JsonLinesSink::create(&dir.join("verdicts.jsonl")).expect("sink"));
    let cell = RunContextCell::new(
        TargetSpec::new("localhost", 4433),
        Arc::new(StaticCapabilityProvider::File(fixture_path("capabilities.json"))),
        Some(sink.clone() as Arc<dyn VerdictSink>),
    );
    let context = cell.get().expect("context");
    let runner = TestRunner::new(
        context.clone(),
        Arc::new(ScriptedPeer),
        Arc::new(ExhaustiveSolver),
        settings(),
    )
    .expect("runner");

    let registry = registry();
    let summary = runner.run_all(&registry);

    let status = |id: &str| context.verdict(id).expect("verdict").status;
    assert_eq!(status("server.handshake"), TestStatus::Succeeded);
    assert_eq!(status("client.each_ecdh_suite"), TestStatus::PartiallySucceeded);
    assert_eq!(status("server.record.mac_bitflip"), TestStatus::Succeeded);
    assert_eq!(status("server.tls13.handshake"), TestStatus::Disabled);
    assert_eq!(status("server.dhe.handshake"), TestStatus::Failed);

    let each_suite = context.verdict("client.each_ecdh_suite").expect("verdict");
    // 4 record lengths times 3 ECDH suites.
    assert_eq!(each_suite.outcomes.len(), 12);

    let bitflip = context.verdict("server.record.mac_bitflip").expect("verdict");
    assert_eq!(bitflip.outcomes.len(), 16);

    let dhe = context.verdict("server.dhe.handshake").expect("verdict");
    assert_eq!(dhe.failure_cause().map(|c| c.kind), Some(CauseKind::Executor));

    let tls13 = context.verdict("server.tls13.handshake").expect("verdict");
    assert!(tls13.disabled_reason.as_deref().is_some_and(|r| !r.is_empty()));

    assert_eq!(summary.counters.started, 5);
    assert_eq!(summary.counters.succeeded, 2);
    assert_eq!(summary.counters.partially_succeeded, 1);
    assert_eq!(summary.counters.failed, 1);
    assert_eq!(summary.counters.disabled, 1);
    assert!(!summary.is_success());

    let lines = std::fs::read_to_string(sink.path()).expect("read sink");
    assert_eq!(lines.lines().count(), 5);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn rerunning_a_finalized_test_changes_nothing() {
    let cell = RunContextCell::new(
        TargetSpec::new("localhost", 4433),
        Arc::new(StaticCapabilityProvider::File(fixture_path("capabilities.json"))),
        None,
    );
    let context = cell.get().expect("context");
    let runner = TestRunner::new(
        context.clone(),
        Arc::new(ScriptedPeer),
        Arc::new(ExhaustiveSolver),
        settings(),
    )
    .expect("runner");
    let registry = registry();
    let test = registry.get("server.dhe.handshake").expect("registered");

    let first = runner.run_test(test.as_ref());
    let counters = context.counters();
    let second = runner.run_test(test.as_ref());
    assert_eq!(first, second);
    assert_eq!(context.counters(), counters);
}

#[test]
fn identical_runs_produce_identical_identities() {
    let run = || {
        let cell = RunContextCell::new(
            TargetSpec::new("localhost", 4433),
            Arc::new(StaticCapabilityProvider::File(fixture_path("capabilities.json"))),
            None,
        );
        let runner = TestRunner::new(
            cell.get().expect("context"),
            Arc::new(ScriptedPeer),
            Arc::new(ExhaustiveSolver),
            settings(),
        )
        .expect("runner");
        let registry = registry();
        let test = registry.get("client.each_ecdh_suite").expect("registered");
        runner.run_test(test.as_ref())
    };
    let a = run();
    let b = run();
    assert_eq!(a.identity, b.identity);
    let ids = |v: &tlsmatrix::TestVerdict| {
        v.outcomes
            .iter()
            .map(|o| o.id().to_string())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&a), ids(&b));
}

#[test]
fn plan_reads_declaration_and_snapshot() {
    let catalog = ParameterCatalog::standard().expect("catalog");
    let report = plan_command(
        &Config::default(),
        &catalog,
        &fixture_path("capabilities.json"),
        &fixture_path("mac_bitflip.json"),
    )
    .expect("plan");

    assert_eq!(report.test_id, "server.record.mac_bitflip");
    assert!(report.disabled.is_none());
    let params: Vec<_> = report.dimensions.iter().map(|d| d.parameter.as_str()).collect();
    assert!(params.contains(&"CIPHER_SUITE"));
    assert!(params.contains(&"MAC_BITMASK"));
    assert!(params.contains(&"BIT_POSITION[MAC_BITMASK]"));
    assert_eq!(report.exhaustive, "80");
    assert_eq!(report.combinations, 80);
}
