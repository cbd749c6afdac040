//! Run-wide state shared by every test: the capability snapshot, the
//! verdict registry and the counters.

use parking_lot::{Condvar, Mutex};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::{
    CapabilityProvider, Counter, MatrixResult, RunCounters, RunSummary, TargetCapabilities,
    TargetSpec, TestVerdict, VerdictSink,
};

#[derive(Debug, Default)]
struct RunState {
    verdicts: BTreeMap<String, TestVerdict>,
    /// Insertion order of `verdicts`.
    order: Vec<String>,
    in_flight: BTreeSet<String>,
    counters: RunCounters,
}

/// Result of a `finalize` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    Recorded,
    /// The test already had a verdict; the call changed nothing.
    AlreadyFinalized,
}

/// Handle owned by the run driver and passed to every test. The capability
/// snapshot is immutable after construction; everything else sits behind
/// one lock.
pub struct RunContext {
    run_id: String,
    target: TargetSpec,
    started_at: String,
    capabilities: Arc<TargetCapabilities>,
    sink: Option<Arc<dyn VerdictSink>>,
    state: Mutex<RunState>,
    finalized: Condvar,
}

impl RunContext {
    /// Probes the target once through `provider`.
    pub fn probe(
        target: TargetSpec,
        provider: &dyn CapabilityProvider,
        sink: Option<Arc<dyn VerdictSink>>,
    ) -> MatrixResult<Self> {
        let capabilities = provider.capabilities_of(&target)?;
        tracing::info!(
            target = %format!("{}:{}", target.host, target.port),
            suites = capabilities.cipher_suites.len(),
            tls13_suites = capabilities.tls13_cipher_suites.len(),
            "capabilities probed"
        );
        Ok(Self::with_capabilities(target, capabilities, sink))
    }

    pub fn with_capabilities(
        target: TargetSpec,
        capabilities: TargetCapabilities,
        sink: Option<Arc<dyn VerdictSink>>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target,
            started_at: crate::wall_time_iso_utc(),
            capabilities: Arc::new(capabilities),
            sink,
            state: Mutex::new(RunState::default()),
            finalized: Condvar::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn capabilities(&self) -> &TargetCapabilities {
        &self.capabilities
    }

    pub fn capabilities_arc(&self) -> Arc<TargetCapabilities> {
        Arc::clone(&self.capabilities)
    }

    /// Marks `test_id` as running. Returns false if it was already running
    /// or finalized; the started counter moves only once per test.
    pub fn test_started(&self, test_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.verdicts.contains_key(test_id) || !state.in_flight.insert(test_id.to_string()) {
            return false;
        }
        state.counters.bump(Counter::Started);
        true
    }

    pub fn increment_counter(&self, counter: Counter) {
        self.state.lock().counters.bump(counter);
    }

    /// Registers the verdict for its test. Only the first call per test id
    /// has an effect; later calls are logged and ignored. The sink sees
    /// each test once.
    pub fn finalize(&self, verdict: TestVerdict) -> Finalization {
        {
            let mut state = self.state.lock();
            if let Some(existing) = state.verdicts.get(&verdict.test_id) {
                if existing.status != verdict.status || existing.identity != verdict.identity {
                    tracing::warn!(
                        test = %verdict.test_id,
                        kept = %existing.status,
                        ignored = %verdict.status,
                        "conflicting verdict for finalized test ignored"
                    );
                } else {
                    tracing::debug!(test = %verdict.test_id, "repeated finalize ignored");
                }
                return Finalization::AlreadyFinalized;
            }
            state.in_flight.remove(&verdict.test_id);
            if let Some(counter) = Counter::for_status(verdict.status) {
                state.counters.bump(counter);
            }
            state.order.push(verdict.test_id.clone());
            state.verdicts.insert(verdict.test_id.clone(), verdict.clone());
        }
        self.finalized.notify_all();

        if let Some(sink) = &self.sink
            && let Err(err) = sink.record(&verdict)
        {
            tracing::error!(test = %verdict.test_id, "verdict sink failed: {err}");
        }
        Finalization::Recorded
    }

    pub fn verdict(&self, test_id: &str) -> Option<TestVerdict> {
        self.state.lock().verdicts.get(test_id).cloned()
    }

    /// Blocks while `test_id` is running and returns its verdict. Returns
    /// `None` right away if the test is neither running nor finalized.
    pub fn await_verdict(&self, test_id: &str) -> Option<TestVerdict> {
        let mut state = self.state.lock();
        loop {
            if let Some(verdict) = state.verdicts.get(test_id) {
                return Some(verdict.clone());
            }
            if !state.in_flight.contains(test_id) {
                return None;
            }
            self.finalized.wait(&mut state);
        }
    }

    pub fn is_finalized(&self, test_id: &str) -> bool {
        self.state.lock().verdicts.contains_key(test_id)
    }

    pub fn counters(&self) -> RunCounters {
        self.state.lock().counters
    }

    /// Snapshot of the run so far, verdicts in finalization order.
    pub fn summary(&self) -> RunSummary {
        let state = self.state.lock();
        RunSummary {
            run_id: self.run_id.clone(),
            target: format!("{}:{}", self.target.host, self.target.port),
            started_at: self.started_at.clone(),
            finished_at: crate::wall_time_iso_utc(),
            counters: state.counters,
            verdicts: state
                .order
                .iter()
                .filter_map(|id| state.verdicts.get(id).cloned())
                .collect(),
        }
    }
}

/// Builds the run context on first access. The capability probe runs at
/// most once even under concurrent first calls; a failed probe is retried
/// by the next caller.
pub struct RunContextCell {
    target: TargetSpec,
    provider: Arc<dyn CapabilityProvider>,
    sink: Option<Arc<dyn VerdictSink>>,
    slot: Mutex<Option<Arc<RunContext>>>,
}

impl RunContextCell {
    pub fn new(
        target: TargetSpec,
        provider: Arc<dyn CapabilityProvider>,
        sink: Option<Arc<dyn VerdictSink>>,
    ) -> Self {
        Self {
            target,
            provider,
            sink,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> MatrixResult<Arc<RunContext>> {
        let mut slot = self.slot.lock();
        if let Some(ctx) = slot.as_ref() {
            return Ok(Arc::clone(ctx));
        }
        let ctx = Arc::new(RunContext::probe(
            self.target.clone(),
            self.provider.as_ref(),
            self.sink.clone(),
        )?);
        *slot = Some(Arc::clone(&ctx));
        Ok(ctx)
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CipherSuite, MemorySink, StaticCapabilityProvider, TestStatus};

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn caps() -> TargetCapabilities {
        let mut caps = TargetCapabilities::default();
        caps.cipher_suites = [CipherSuite::TLS_RSA_WITH_AES_128_CBC_SHA].into();
        caps
    }

    struct CountingProvider(AtomicUsize);

    impl CapabilityProvider for CountingProvider {
        fn capabilities_of(&self, _target: &TargetSpec) -> MatrixResult<TargetCapabilities> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(caps())
        }
    }

    #[test]
    fn await_verdict_blocks_until_the_running_test_finalizes() {
        let ctx = RunContext::with_capabilities(TargetSpec::new("localhost", 4433), caps(), None);
        assert!(ctx.await_verdict("never").is_none());

        assert!(ctx.test_started("slow"));
        let verdict = std::thread::scope(|scope| {
            let waiter = scope.spawn(|| ctx.await_verdict("slow"));
            std::thread::sleep(std::time::Duration::from_millis(20));
            ctx.finalize(TestVerdict::disabled("slow", "done elsewhere"));
            waiter.join().expect("waiter thread")
        });
        assert_eq!(verdict.map(|v| v.status), Some(TestStatus::Disabled));
    }

    #[test]
    fn finalize_is_idempotent_and_first_wins() {
        let sink = Arc::new(MemorySink::new());
        let ctx = RunContext::with_capabilities(
            TargetSpec::new("localhost", 4433),
            caps(),
            Some(sink.clone() as Arc<dyn VerdictSink>),
        );
        assert!(ctx.test_started("t"));
        assert!(!ctx.test_started("t"));

        let first = TestVerdict::disabled("t", "not applicable");
        assert_eq!(ctx.finalize(first.clone()), Finalization::Recorded);
        assert_eq!(ctx.finalize(first.clone()), Finalization::AlreadyFinalized);

        let mut conflicting = first.clone();
        conflicting.status = TestStatus::Failed;
        assert_eq!(ctx.finalize(conflicting), Finalization::AlreadyFinalized);

        assert_eq!(ctx.verdict("t"), Some(first));
        assert_eq!(sink.verdicts().len(), 1);
        let counters = ctx.counters();
        assert_eq!((counters.started, counters.disabled, counters.failed), (1, 1, 0));
    }

    #[test]
    fn concurrent_finalize_records_each_test_once() {
        let sink = Arc::new(MemorySink::new());
        let ctx = Arc::new(RunContext::with_capabilities(
            TargetSpec::new("localhost", 4433),
            caps(),
            Some(sink.clone() as Arc<dyn VerdictSink>),
        ));
        std::thread::scope(|s| {
            for worker in 0..8 {
                let ctx = Arc::clone(&ctx);
                s.spawn(move || {
                    for test in 0..16 {
                        let id = format!("test-{test}");
                        ctx.test_started(&id);
                        ctx.finalize(TestVerdict::disabled(id, format!("worker {worker}")));
                    }
                });
            }
        });
        let counters = ctx.counters();
        assert_eq!(counters.started, 16);
        assert_eq!(counters.disabled, 16);
        assert_eq!(sink.verdicts().len(), 16);
        assert_eq!(ctx.summary().verdicts.len(), 16);
    }

    #[test]
    fn cell_probes_once() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let cell = RunContextCell::new(TargetSpec::new("localhost", 4433), provider.clone(), None);
        assert!(!cell.is_initialized());
        let a = cell.get().expect("first");
        let b = cell.get().expect("second");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_probe_leaves_cell_empty() {
        let cell = RunContextCell::new(
            TargetSpec::new("localhost", 4433),
            Arc::new(StaticCapabilityProvider::Snapshot(TargetCapabilities::default())),
            None,
        );
        assert!(cell.get().is_err());
        assert!(!cell.is_initialized());
    }
}
