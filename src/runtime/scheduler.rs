//! Bounded, order-independent dispatch of one test's variants.

use crossbeam_channel::RecvTimeoutError;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};
use serde::{Deserialize, Serialize};

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    CauseKind, CheckResult, ConcreteVariant, ExecutionFault, ExecutionRecord, OutcomeCause,
    OutcomeIdentity, OutcomeParts, OutcomeStatus, RawOutcome, Timing, VariantCheck,
    VariantExecutor,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleOrder {
    #[default]
    Fifo,
    Shuffled { seed: u64 },
}

/// Seeded dispatch queue; the same seed always yields the same order.
#[derive(Debug)]
pub struct DispatchQueue<T> {
    order: ScheduleOrder,
    queue: VecDeque<T>,
    rng: ChaCha20Rng,
}

impl<T> DispatchQueue<T> {
    pub fn new(order: ScheduleOrder) -> Self {
        let seed = match order {
            ScheduleOrder::Fifo => 0,
            ScheduleOrder::Shuffled { seed } => seed,
        };
        let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
        let mut seed32 = [0u8; 32];
        seed32.copy_from_slice(&seed_bytes[..32]);
        Self {
            order,
            queue: VecDeque::new(),
            rng: ChaCha20Rng::from_seed(seed32),
        }
    }

    pub fn enqueue(&mut self, item: T) {
        self.queue.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn pop_next(&mut self) -> Option<T> {
        if self.queue.is_empty() {
            return None;
        }
        let idx = match self.order {
            ScheduleOrder::Fifo => 0usize,
            ScheduleOrder::Shuffled { .. } => (self.rng.next_u64() as usize) % self.queue.len(),
        };
        self.queue.remove(idx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Upper bound on variants in flight; clamped to the variant count.
    pub parallelism: usize,
    pub variant_timeout: Duration,
    pub order: ScheduleOrder,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            parallelism: 4,
            variant_timeout: Duration::from_secs(60),
            order: ScheduleOrder::Fifo,
        }
    }
}

/// Test-supplied validation of one executed variant.
pub type Validator<'v> = dyn Fn(&mut VariantCheck<'_>) -> CheckResult + Sync + 'v;

pub struct VariantScheduler {
    executor: Arc<dyn VariantExecutor>,
    settings: ScheduleSettings,
}

impl VariantScheduler {
    pub fn new(executor: Arc<dyn VariantExecutor>, settings: ScheduleSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> ScheduleSettings {
        self.settings
    }

    /// Runs every variant and returns one outcome per variant, ordered by
    /// variant index. A fault in one variant never affects its siblings.
    pub fn run(&self, variants: Vec<ConcreteVariant>, validate: &Validator<'_>) -> Vec<RawOutcome> {
        if variants.is_empty() {
            return Vec::new();
        }
        let mut queue = DispatchQueue::new(self.settings.order);
        for variant in variants {
            queue.enqueue(variant);
        }
        let workers = self.settings.parallelism.clamp(1, queue.len());

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<ConcreteVariant>();
        let (out_tx, out_rx) = crossbeam_channel::unbounded::<RawOutcome>();
        while let Some(variant) = queue.pop_next() {
            // Receiver is alive until the scope below ends.
            let _ = job_tx.send(variant);
        }
        drop(job_tx);

        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                s.spawn(move || {
                    for variant in job_rx.iter() {
                        let outcome = self.run_one(&variant, validate);
                        let _ = out_tx.send(outcome);
                    }
                });
            }
        });
        drop(out_tx);

        let mut outcomes: Vec<RawOutcome> = out_rx.iter().collect();
        outcomes.sort_by_key(RawOutcome::variant);
        outcomes
    }

    fn run_one(&self, variant: &ConcreteVariant, validate: &Validator<'_>) -> RawOutcome {
        let identity = identity_for(variant);
        let started_at = crate::wall_time_iso_utc();
        let t0 = Instant::now();
        tracing::debug!(variant = %variant.label(), "dispatching");

        let executed = self.execute_with_timeout(variant);
        let timing = |t0: Instant, started_at: String| Timing {
            started_at,
            finished_at: crate::wall_time_iso_utc(),
            duration_ms: t0.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
        };

        let record = match executed {
            Ok(record) => record,
            Err(cause) => {
                tracing::warn!(variant = %variant.label(), "variant errored: {}", cause.message);
                return RawOutcome::errored(&identity, variant.index, cause, timing(t0, started_at));
            }
        };

        let mut check = VariantCheck::new(variant, &record);
        let verdict = panic::catch_unwind(AssertUnwindSafe(|| validate(&mut check)));
        let partial = check.partial_note().map(str::to_string);
        let disabled = check.disabled_reason().map(str::to_string);
        let unspecified = check.is_unspecified();
        let timing = timing(t0, started_at);

        let parts = match (verdict, &record.transport_fault) {
            (Err(payload), _) => {
                let cause = OutcomeCause::new(
                    CauseKind::Panic,
                    format!("validator panicked: {}", panic_message(payload.as_ref())),
                );
                return RawOutcome::errored(&identity, variant.index, cause, timing);
            }
            (Ok(_), Some(fault)) => {
                tracing::warn!(variant = %variant.label(), "transport fault: {fault}");
                let cause = OutcomeCause::new(CauseKind::Transport, fault.clone());
                return RawOutcome::errored(&identity, variant.index, cause, timing);
            }
            (Ok(Err(failure)), None) => OutcomeParts {
                status: OutcomeStatus::Failed,
                cause: Some(OutcomeCause::new(CauseKind::Assertion, failure.0)),
                note: None,
                diagnostics: record.diagnostics.clone(),
            },
            (Ok(Ok(())), None) => match disabled {
                Some(reason) => OutcomeParts {
                    status: OutcomeStatus::Disabled,
                    cause: Some(OutcomeCause::new(CauseKind::Disabled, reason)),
                    note: None,
                    diagnostics: record.diagnostics.clone(),
                },
                None => OutcomeParts {
                    status: if unspecified {
                        OutcomeStatus::NotSpecified
                    } else if partial.is_some() {
                        OutcomeStatus::PartiallySucceeded
                    } else {
                        OutcomeStatus::Succeeded
                    },
                    cause: None,
                    note: partial,
                    diagnostics: record.diagnostics.clone(),
                },
            },
        };
        RawOutcome::new(&identity, variant.index, parts, timing)
    }

    /// Runs the executor on its own thread so a hung peer cannot hold a
    /// worker past the timeout. The abandoned thread is left to finish.
    fn execute_with_timeout(
        &self,
        variant: &ConcreteVariant,
    ) -> Result<ExecutionRecord, OutcomeCause> {
        let (tx, rx) = crossbeam_channel::bounded::<Result<ExecutionRecord, ExecutionFault>>(1);
        let executor = Arc::clone(&self.executor);
        let trace = variant.trace.clone();
        let config = variant.config.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("variant-{}", variant.index))
            .spawn(move || {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&trace, &config)))
                        .unwrap_or_else(|payload| {
                            Err(ExecutionFault(format!(
                                "executor panicked: {}",
                                panic_message(payload.as_ref())
                            )))
                        });
                let _ = tx.send(result);
            });
        if let Err(err) = spawned {
            return Err(OutcomeCause::new(
                CauseKind::Executor,
                format!("failed to start executor thread: {err}"),
            ));
        }

        match rx.recv_timeout(self.settings.variant_timeout) {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(fault)) => {
                let kind = if fault.0.starts_with("executor panicked") {
                    CauseKind::Panic
                } else {
                    CauseKind::Executor
                };
                Err(OutcomeCause::new(kind, fault.0))
            }
            Err(RecvTimeoutError::Timeout) => Err(OutcomeCause::new(
                CauseKind::Timeout,
                format!(
                    "variant did not finish within {}ms",
                    self.settings.variant_timeout.as_millis()
                ),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(OutcomeCause::new(
                CauseKind::Executor,
                "executor thread exited without a result",
            )),
        }
    }
}

/// Identity of a variant's outcome: test, capability annotation and the
/// combination string. Value-identical variants hash identically.
pub fn identity_for(variant: &ConcreteVariant) -> OutcomeIdentity {
    let identity = OutcomeIdentity::new(variant.test_id.clone(), variant.combination.to_string());
    match variant.capability {
        Some(suite) => identity.annotate(format!("capability={suite}")),
        None => identity,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
