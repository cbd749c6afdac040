//! Run summary, verdict sinks and renderers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::{MatrixError, MatrixResult, TestStatus, TestVerdict};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    Pretty,
    Json,
    Junit,
}

impl clap::ValueEnum for Reporter {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Pretty, Self::Json, Self::Junit]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Pretty => clap::builder::PossibleValue::new("pretty"),
            Self::Json => clap::builder::PossibleValue::new("json"),
            Self::Junit => clap::builder::PossibleValue::new("junit"),
        })
    }
}

/// Named run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    Started,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Disabled,
}

impl Counter {
    /// Counter bumped when a test finalizes with `status`.
    pub fn for_status(status: TestStatus) -> Option<Self> {
        match status {
            TestStatus::Succeeded => Some(Self::Succeeded),
            TestStatus::PartiallySucceeded => Some(Self::PartiallySucceeded),
            TestStatus::Failed => Some(Self::Failed),
            TestStatus::Disabled => Some(Self::Disabled),
            TestStatus::NotSpecified => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub started: u64,
    pub succeeded: u64,
    #[serde(rename = "partiallySucceeded")]
    pub partially_succeeded: u64,
    pub failed: u64,
    pub disabled: u64,
}

impl RunCounters {
    pub fn bump(&mut self, counter: Counter) {
        let slot = match counter {
            Counter::Started => &mut self.started,
            Counter::Succeeded => &mut self.succeeded,
            Counter::PartiallySucceeded => &mut self.partially_succeeded,
            Counter::Failed => &mut self.failed,
            Counter::Disabled => &mut self.disabled,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn finished(&self) -> u64 {
        self.succeeded + self.partially_succeeded + self.failed + self.disabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(rename = "runId")]
    pub run_id: String,
    pub target: String,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "finishedAt")]
    pub finished_at: String,
    pub counters: RunCounters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verdicts: Vec<TestVerdict>,
}

impl RunSummary {
    /// Rebuilds a summary from recorded verdicts, e.g. a JSON-lines file.
    pub fn from_verdicts(
        run_id: impl Into<String>,
        target: impl Into<String>,
        verdicts: Vec<TestVerdict>,
    ) -> Self {
        let mut counters = RunCounters::default();
        for verdict in &verdicts {
            counters.bump(Counter::Started);
            if let Some(counter) = Counter::for_status(verdict.status) {
                counters.bump(counter);
            }
        }
        let started_at = verdicts
            .iter()
            .flat_map(|v| v.outcomes.iter().map(|o| o.started_at()))
            .min()
            .unwrap_or_default()
            .to_string();
        let finished_at = verdicts
            .iter()
            .flat_map(|v| v.outcomes.iter().map(|o| o.finished_at()))
            .max()
            .unwrap_or_default()
            .to_string();
        Self {
            run_id: run_id.into(),
            target: target.into(),
            started_at,
            finished_at,
            counters,
            verdicts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.counters.failed == 0
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("runId={} target={}\n", self.run_id, self.target));
        out.push_str(&format!(
            "tests: started={} succeeded={} partial={} failed={} disabled={}\n",
            self.counters.started,
            self.counters.succeeded,
            self.counters.partially_succeeded,
            self.counters.failed,
            self.counters.disabled
        ));
        for verdict in &self.verdicts {
            out.push_str(&format!("- {} {}", verdict.status, verdict.test_id));
            if let Some(reason) = &verdict.disabled_reason {
                out.push_str(&format!(": {reason}"));
            } else if let Some(cause) = verdict.failure_cause() {
                out.push_str(&format!(": {}", cause.message));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

/// Receives each test verdict exactly once, when the test finalizes.
pub trait VerdictSink: Send + Sync {
    fn record(&self, verdict: &TestVerdict) -> MatrixResult<()>;
}

/// Keeps every verdict in memory, in finalization order.
#[derive(Debug, Default)]
pub struct MemorySink {
    verdicts: Mutex<Vec<TestVerdict>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verdicts(&self) -> Vec<TestVerdict> {
        self.verdicts.lock().clone()
    }
}

impl VerdictSink for MemorySink {
    fn record(&self, verdict: &TestVerdict) -> MatrixResult<()> {
        self.verdicts.lock().push(verdict.clone());
        Ok(())
    }
}

/// Appends one JSON object per verdict to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> MatrixResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VerdictSink for JsonLinesSink {
    fn record(&self, verdict: &TestVerdict) -> MatrixResult<()> {
        let mut line = serde_json::to_vec(verdict)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Reads a file written by `JsonLinesSink`. Blank lines are skipped.
pub fn read_verdict_lines(path: &Path) -> MatrixResult<Vec<TestVerdict>> {
    let raw = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let verdict = serde_json::from_str(line).map_err(|err| {
            MatrixError::InvalidArgument(format!("{}:{}: {err}", path.display(), idx + 1))
        })?;
        out.push(verdict);
    }
    Ok(out)
}

pub fn render_junit_xml(summary: &RunSummary) -> String {
    let tests = summary.verdicts.len();
    let failures = summary
        .verdicts
        .iter()
        .filter(|v| v.status == TestStatus::Failed)
        .count();
    let skipped = summary
        .verdicts
        .iter()
        .filter(|v| v.status == TestStatus::Disabled)
        .count();

    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push('\n');
    out.push_str(&format!(
        r#"<testsuite name="{}" tests="{tests}" failures="{failures}" skipped="{skipped}">"#,
        xml_escape(&summary.target)
    ));
    out.push('\n');
    for verdict in &summary.verdicts {
        let name = xml_escape(&verdict.test_id);
        match verdict.status {
            TestStatus::Failed => {
                let message = verdict
                    .failure_cause()
                    .map(|c| c.message.as_str())
                    .unwrap_or("failed");
                out.push_str(&format!(r#"<testcase classname="tlsmatrix" name="{name}">"#));
                out.push_str(&format!(
                    r#"<failure message="{}"/></testcase>"#,
                    xml_escape(message)
                ));
            }
            TestStatus::Disabled => {
                let reason = verdict.disabled_reason.as_deref().unwrap_or("No reason");
                out.push_str(&format!(r#"<testcase classname="tlsmatrix" name="{name}">"#));
                out.push_str(&format!(r#"<skipped message="{}"/></testcase>"#, xml_escape(reason)));
            }
            _ => out.push_str(&format!(r#"<testcase classname="tlsmatrix" name="{name}"/>"#)),
        }
        out.push('\n');
    }
    out.push_str("</testsuite>\n");
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> RunSummary {
        let mut counters = RunCounters::default();
        counters.bump(Counter::Started);
        counters.bump(Counter::Started);
        counters.bump(Counter::Disabled);
        RunSummary {
            run_id: "run".into(),
            target: "localhost:4433".into(),
            started_at: "2026-01-01T00:00:00Z".into(),
            finished_at: "2026-01-01T00:00:01Z".into(),
            counters,
            verdicts: vec![TestVerdict::disabled("a<b", "")],
        }
    }

    #[test]
    fn pretty_lists_disabled_reason() {
        let text = summary().pretty();
        assert!(text.contains("started=2"));
        assert!(text.contains("- DISABLED a<b: No reason"));
    }

    #[test]
    fn junit_escapes_names_and_marks_skips() {
        let xml = render_junit_xml(&summary());
        assert!(xml.contains(r#"name="a&lt;b""#));
        assert!(xml.contains(r#"skipped="1""#));
    }

    #[test]
    fn json_lines_sink_appends_one_line_per_verdict() {
        let dir = std::env::temp_dir().join(format!("tlsmatrix-sink-{}", uuid::Uuid::new_v4()));
        let path = dir.join("verdicts.jsonl");
        let sink = JsonLinesSink::create(&path).expect("sink");
        sink.record(&TestVerdict::disabled("one", "n/a")).expect("record");
        sink.record(&TestVerdict::disabled("two", "n/a")).expect("record");

        let back = read_verdict_lines(sink.path()).expect("read");
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].test_id, "two");

        let summary = RunSummary::from_verdicts("replayed", "localhost:4433", back);
        assert_eq!(summary.counters.started, 2);
        assert_eq!(summary.counters.disabled, 2);
        assert!(summary.is_success());
        let _ = std::fs::remove_dir_all(dir);
    }
}
