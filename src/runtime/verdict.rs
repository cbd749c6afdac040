//! Variant outcomes and their reduction into one verdict per test.

use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Succeeded,
    /// The validator accepted a relaxed result and said so explicitly.
    PartiallySucceeded,
    Failed,
    /// Infrastructure fault: timeout, executor error, panic, transport fault.
    Errored,
    Disabled,
    NotSpecified,
}

impl OutcomeStatus {
    /// Position in the precedence order; errored variants rank with failures.
    fn rank(self) -> u8 {
        match self {
            Self::Failed | Self::Errored => 4,
            Self::PartiallySucceeded => 3,
            Self::Succeeded => 2,
            Self::Disabled => 1,
            Self::NotSpecified => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Disabled,
    NotSpecified,
}

impl TestStatus {
    pub fn is_failure(self) -> bool {
        self == Self::Failed
    }
}

impl From<OutcomeStatus> for TestStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Succeeded => Self::Succeeded,
            OutcomeStatus::PartiallySucceeded => Self::PartiallySucceeded,
            OutcomeStatus::Failed | OutcomeStatus::Errored => Self::Failed,
            OutcomeStatus::Disabled => Self::Disabled,
            OutcomeStatus::NotSpecified => Self::NotSpecified,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Succeeded => "SUCCEEDED",
            Self::PartiallySucceeded => "PARTIALLY_SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Disabled => "DISABLED",
            Self::NotSpecified => "NOT_SPECIFIED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CauseKind {
    Assertion,
    Timeout,
    Panic,
    Transport,
    Executor,
    Modeling,
    /// The validator judged the variant inapplicable.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCause {
    pub kind: CauseKind,
    pub message: String,
}

impl OutcomeCause {
    pub fn new(kind: CauseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Inputs of the outcome identity hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeIdentity {
    pub test_id: String,
    /// Extra diagnostic labels attached by the test.
    pub annotations: Vec<String>,
    pub combination: String,
}

impl OutcomeIdentity {
    pub fn new(test_id: impl Into<String>, combination: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            annotations: Vec::new(),
            combination: combination.into(),
        }
    }

    pub fn annotate(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    /// Content hash; identical inputs give identical ids regardless of
    /// when or where the variant ran.
    pub fn hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.test_id.as_bytes());
        hasher.update(&[0]);
        for annotation in &self.annotations {
            hasher.update(annotation.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(&[0]);
        hasher.update(self.combination.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Result of one concrete variant. Built once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    id: String,
    #[serde(rename = "testId")]
    test_id: String,
    variant: usize,
    combination: String,
    status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cause: Option<OutcomeCause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    #[serde(rename = "startedAt")]
    started_at: String,
    #[serde(rename = "finishedAt")]
    finished_at: String,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<String>,
}

/// Wall-clock bounds of one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

impl Timing {
    /// Zero-length timing stamped now, for outcomes that never ran.
    pub fn instant() -> Self {
        let now = crate::wall_time_iso_utc();
        Self {
            started_at: now.clone(),
            finished_at: now,
            duration_ms: 0,
        }
    }
}

pub struct OutcomeParts {
    pub status: OutcomeStatus,
    pub cause: Option<OutcomeCause>,
    pub note: Option<String>,
    pub diagnostics: Vec<String>,
}

impl RawOutcome {
    pub fn new(
        identity: &OutcomeIdentity,
        variant: usize,
        parts: OutcomeParts,
        timing: Timing,
    ) -> Self {
        Self {
            id: identity.hash(),
            test_id: identity.test_id.clone(),
            variant,
            combination: identity.combination.clone(),
            status: parts.status,
            cause: parts.cause,
            note: parts.note,
            started_at: timing.started_at,
            finished_at: timing.finished_at,
            duration_ms: timing.duration_ms,
            diagnostics: parts.diagnostics,
        }
    }

    pub fn errored(
        identity: &OutcomeIdentity,
        variant: usize,
        cause: OutcomeCause,
        timing: Timing,
    ) -> Self {
        Self::new(
            identity,
            variant,
            OutcomeParts {
                status: OutcomeStatus::Errored,
                cause: Some(cause),
                note: None,
                diagnostics: Vec::new(),
            },
            timing,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn test_id(&self) -> &str {
        &self.test_id
    }

    pub fn variant(&self) -> usize {
        self.variant
    }

    pub fn combination(&self) -> &str {
        &self.combination
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn cause(&self) -> Option<&OutcomeCause> {
        self.cause.as_ref()
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn finished_at(&self) -> &str {
        &self.finished_at
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVerdict {
    #[serde(rename = "testId")]
    pub test_id: String,
    pub status: TestStatus,
    /// Hash over the sorted outcome ids.
    pub identity: String,
    #[serde(rename = "disabledReason", default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    pub outcomes: Vec<RawOutcome>,
}

impl TestVerdict {
    pub fn disabled(test_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let test_id = test_id.into();
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = "No reason".to_string();
        }
        Self {
            identity: identity_of(&test_id, &[]),
            test_id,
            status: TestStatus::Disabled,
            disabled_reason: Some(reason),
            outcomes: Vec::new(),
        }
    }

    /// First failing outcome carrying a cause.
    pub fn failure_cause(&self) -> Option<&OutcomeCause> {
        self.outcomes
            .iter()
            .filter(|o| TestStatus::from(o.status()).is_failure())
            .find_map(RawOutcome::cause)
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status() == status).count()
    }
}

fn identity_of(test_id: &str, outcomes: &[RawOutcome]) -> String {
    let mut ids: Vec<&str> = outcomes.iter().map(RawOutcome::id).collect();
    ids.sort_unstable();
    let mut hasher = blake3::Hasher::new();
    hasher.update(test_id.as_bytes());
    for id in ids {
        hasher.update(&[0]);
        hasher.update(id.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Reduces variant outcomes to one verdict. Pure: the result depends only
/// on the set of outcomes, not their order.
///
/// Precedence is FAILED > PARTIALLY_SUCCEEDED > SUCCEEDED > DISABLED >
/// NOT_SPECIFIED with errored outcomes counted as failed. A test whose
/// variants all report nothing specific counts as succeeded.
pub fn aggregate(test_id: &str, mut outcomes: Vec<RawOutcome>) -> TestVerdict {
    outcomes.sort_by(|a, b| a.variant.cmp(&b.variant).then_with(|| a.id.cmp(&b.id)));
    let top = outcomes
        .iter()
        .map(RawOutcome::status)
        .max_by_key(|s| s.rank())
        .unwrap_or(OutcomeStatus::NotSpecified);
    let status = match top {
        OutcomeStatus::NotSpecified if !outcomes.is_empty() => TestStatus::Succeeded,
        other => TestStatus::from(other),
    };
    let disabled_reason = (status == TestStatus::Disabled).then(|| {
        outcomes
            .iter()
            .find_map(|o| o.cause().map(|c| c.message.clone()))
            .unwrap_or_else(|| "No reason".to_string())
    });
    TestVerdict {
        identity: identity_of(test_id, &outcomes),
        test_id: test_id.to_string(),
        status,
        disabled_reason,
        outcomes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(variant: usize, status: OutcomeStatus) -> RawOutcome {
        let identity = OutcomeIdentity::new("t", format!("RECORD_LENGTH={variant}"));
        let cause = matches!(status, OutcomeStatus::Failed | OutcomeStatus::Errored)
            .then(|| OutcomeCause::new(CauseKind::Assertion, "expected alert"));
        RawOutcome::new(
            &identity,
            variant,
            OutcomeParts {
                status,
                cause,
                note: None,
                diagnostics: Vec::new(),
            },
            Timing::instant(),
        )
    }

    fn statuses(list: &[OutcomeStatus]) -> Vec<RawOutcome> {
        list.iter().enumerate().map(|(i, s)| outcome(i, *s)).collect()
    }

    #[test]
    fn failure_dominates() {
        use OutcomeStatus::*;
        let verdict = aggregate(
            "t",
            statuses(&[Failed, Succeeded, Succeeded, Disabled, Succeeded]),
        );
        assert_eq!(verdict.status, TestStatus::Failed);
        assert!(verdict.failure_cause().is_some());
    }

    #[test]
    fn explicit_partial_success_is_kept() {
        use OutcomeStatus::*;
        let verdict = aggregate("t", statuses(&[Succeeded, PartiallySucceeded, Succeeded]));
        assert_eq!(verdict.status, TestStatus::PartiallySucceeded);
    }

    #[test]
    fn errored_outcomes_fail_without_dropping_siblings() {
        use OutcomeStatus::*;
        let verdict = aggregate("t", statuses(&[Succeeded, Errored, Succeeded]));
        assert_eq!(verdict.status, TestStatus::Failed);
        assert_eq!(verdict.outcomes.len(), 3);
        assert_eq!(verdict.count(Succeeded), 2);
    }

    #[test]
    fn unspecified_outcomes_count_as_success() {
        use OutcomeStatus::*;
        assert_eq!(aggregate("t", statuses(&[NotSpecified])).status, TestStatus::Succeeded);
        assert_eq!(aggregate("t", Vec::new()).status, TestStatus::NotSpecified);
    }

    #[test]
    fn verdict_identity_ignores_arrival_order() {
        use OutcomeStatus::*;
        let mut outcomes = statuses(&[Succeeded, Failed, Succeeded]);
        let forward = aggregate("t", outcomes.clone());
        outcomes.reverse();
        let backward = aggregate("t", outcomes);
        assert_eq!(forward.identity, backward.identity);
        assert_eq!(forward, backward);
    }

    #[test]
    fn value_identical_variants_hash_identically() {
        let a = OutcomeIdentity::new("t", "CIPHER_SUITE=TLS_AES_128_GCM_SHA256").annotate("retry");
        let b = OutcomeIdentity::new("t", "CIPHER_SUITE=TLS_AES_128_GCM_SHA256").annotate("retry");
        assert_eq!(a.hash(), b.hash());
        let plain = OutcomeIdentity::new("t", "CIPHER_SUITE=TLS_AES_128_GCM_SHA256");
        assert_ne!(a.hash(), plain.hash());
    }

    #[test]
    fn disabled_verdict_always_has_reason() {
        let verdict = TestVerdict::disabled("t", "");
        assert_eq!(verdict.status, TestStatus::Disabled);
        assert_eq!(verdict.disabled_reason.as_deref(), Some("No reason"));
    }
}
