//! Executor seam and the per-variant validation handle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConcreteVariant, Direction, Message, ParameterCombination, TlsConfig, WorkflowTrace};

/// What the executor observed while running one trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default)]
    pub sent: Vec<Message>,
    #[serde(default)]
    pub received: Vec<Message>,
    #[serde(rename = "executedAsPlanned")]
    pub executed_as_planned: bool,
    #[serde(rename = "socketClosed", default)]
    pub socket_closed: bool,
    /// Set when the transport raised an exception during the run.
    #[serde(rename = "transportFault", default, skip_serializing_if = "Option::is_none")]
    pub transport_fault: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ExecutionRecord {
    /// Everything in the trace was exchanged as scripted.
    pub fn as_planned(trace: &WorkflowTrace) -> Self {
        let mut record = Self {
            executed_as_planned: true,
            ..Self::default()
        };
        for (direction, message) in trace.messages() {
            match direction {
                Direction::Send => record.sent.push(message.clone()),
                Direction::Receive => record.received.push(message.clone()),
            }
        }
        record
    }

    pub fn received_fatal_alert(&self) -> bool {
        self.received
            .iter()
            .any(|m| matches!(m, Message::Alert { fatal: true, .. }))
    }
}

/// The executor itself failed; no record exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ExecutionFault(pub String);

/// Runs one concrete trace against the already-connected peer.
pub trait VariantExecutor: Send + Sync {
    fn execute(
        &self,
        trace: &WorkflowTrace,
        config: &TlsConfig,
    ) -> Result<ExecutionRecord, ExecutionFault>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct AssertionFailure(pub String);

pub type CheckResult = Result<(), AssertionFailure>;

/// Handed to a test's validator together with the record of its variant.
pub struct VariantCheck<'a> {
    variant: &'a ConcreteVariant,
    record: &'a ExecutionRecord,
    partial: Option<String>,
    disabled: Option<String>,
    unspecified: bool,
}

impl<'a> VariantCheck<'a> {
    pub fn new(variant: &'a ConcreteVariant, record: &'a ExecutionRecord) -> Self {
        Self {
            variant,
            record,
            partial: None,
            disabled: None,
            unspecified: false,
        }
    }

    pub fn variant(&self) -> &ConcreteVariant {
        self.variant
    }

    pub fn config(&self) -> &TlsConfig {
        &self.variant.config
    }

    pub fn trace(&self) -> &WorkflowTrace {
        &self.variant.trace
    }

    pub fn combination(&self) -> &ParameterCombination {
        &self.variant.combination
    }

    pub fn record(&self) -> &ExecutionRecord {
        self.record
    }

    /// Accept the variant with a relaxed result; the note explains why.
    pub fn mark_partial(&mut self, note: impl Into<String>) {
        self.partial = Some(note.into());
    }

    pub fn partial_note(&self) -> Option<&str> {
        self.partial.as_deref()
    }

    /// The variant does not apply to this peer, e.g. it negotiated
    /// something the test cannot judge. Assertion failures still win.
    pub fn disable(&mut self, reason: impl Into<String>) {
        self.disabled = Some(reason.into());
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.as_deref()
    }

    /// Leave the result open for the aggregator.
    pub fn leave_unspecified(&mut self) {
        self.unspecified = true;
    }

    pub fn is_unspecified(&self) -> bool {
        self.unspecified
    }

    pub fn ensure(&self, holds: bool, message: impl Into<String>) -> CheckResult {
        if holds {
            Ok(())
        } else {
            Err(AssertionFailure(message.into()))
        }
    }

    pub fn executed_as_planned(&self) -> CheckResult {
        self.ensure(
            self.record.executed_as_planned,
            "workflow was not executed as planned",
        )
    }

    pub fn received_fatal_alert(&self) -> CheckResult {
        self.ensure(self.record.received_fatal_alert(), "no fatal alert received")
    }

    /// The peer rejected the variant: either a fatal alert or a closed socket.
    pub fn rejected(&self) -> CheckResult {
        self.ensure(
            self.record.received_fatal_alert() || self.record.socket_closed,
            "peer neither sent a fatal alert nor closed the connection",
        )
    }
}
