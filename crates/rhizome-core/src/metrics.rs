//! Metrics recorder: timing of backend operations and final graph totals
//!
//! A side channel only. Nothing recorded here is read back by extraction,
//! resolution or merging.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Operation;
use crate::error::BackendError;
use crate::graph::Graph;
use crate::run::RunInfo;
use crate::scanner::LanguageTag;

/// How a single backend operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

impl Outcome {
    #[must_use]
    pub fn of<T>(result: &Result<T, BackendError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) if e.is_timeout() => Self::Timeout,
            Err(_) => Self::Failure,
        }
    }
}

/// Final state of a language's contribution to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageStatus {
    /// Every file extracted and every callable resolved
    Complete,
    /// Some work was lost to errors or the run deadline
    Partial,
    /// The backend was demoted after repeated timeouts
    Degraded,
    /// No backend could be started
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageReport {
    pub status: LanguageStatus,
    pub files: usize,
    pub entities: usize,
}

/// Non-fatal conditions surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Warning {
    LanguageDegraded { language: LanguageTag, reason: String },
    BackendUnavailable { language: LanguageTag, reason: String },
    LanguagePartial { language: LanguageTag, reason: String },
}

/// Counts and latency distribution for one (operation, language) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationStats {
    pub operation: Operation,
    pub language: LanguageTag,
    pub count: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub entities: usize,
    pub edges: usize,
    pub orphans: usize,
    pub unresolved_edges: usize,
}

impl Totals {
    #[must_use]
    pub fn of(graph: &Graph) -> Self {
        Self {
            entities: graph.entities().len(),
            edges: graph.edges().len(),
            orphans: graph.orphans().count(),
            unresolved_edges: graph.edges().iter().filter(|e| e.is_external()).count(),
        }
    }
}

/// The metrics record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub run: RunInfo,
    pub operations: Vec<OperationStats>,
    pub totals: Totals,
    pub languages: BTreeMap<LanguageTag, LanguageReport>,
    pub warnings: Vec<Warning>,
    /// SHA-256 of the serialized graph
    pub fingerprint: String,
}

impl Metrics {
    #[must_use]
    pub fn language(&self, language: &LanguageTag) -> Option<&LanguageReport> {
        self.languages.get(language)
    }

    #[must_use]
    pub fn operation(&self, operation: Operation, language: &LanguageTag) -> Option<&OperationStats> {
        self.operations
            .iter()
            .find(|s| s.operation == operation && &s.language == language)
    }

    /// Whether a language-degraded warning was raised for `language`
    #[must_use]
    pub fn is_degraded(&self, language: &LanguageTag) -> bool {
        self.warnings.iter().any(
            |w| matches!(w, Warning::LanguageDegraded { language: l, .. } if l == language),
        )
    }
}

#[derive(Debug, Default)]
struct Samples {
    latencies_ms: Vec<f64>,
    failures: u64,
    timeouts: u64,
}

#[derive(Debug, Default)]
struct RecorderState {
    samples: BTreeMap<(Operation, LanguageTag), Samples>,
    languages: BTreeMap<LanguageTag, LanguageReport>,
    warnings: Vec<Warning>,
}

/// Thread-safe collector shared by every backend handle of a run
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    state: Mutex<RecorderState>,
}

impl MetricsRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record one timed backend operation
    pub fn record(
        &self,
        operation: Operation,
        language: &LanguageTag,
        elapsed: Duration,
        outcome: Outcome,
    ) {
        let mut state = self.lock();
        let samples = state
            .samples
            .entry((operation, language.clone()))
            .or_default();
        samples.latencies_ms.push(elapsed.as_secs_f64() * 1000.0);
        match outcome {
            Outcome::Success => {}
            Outcome::Failure => samples.failures += 1,
            Outcome::Timeout => samples.timeouts += 1,
        }
    }

    pub fn warn(&self, warning: Warning) {
        self.lock().warnings.push(warning);
    }

    /// Warnings recorded so far
    #[must_use]
    pub fn warnings(&self) -> Vec<Warning> {
        self.lock().warnings.clone()
    }

    pub fn set_language(&self, language: LanguageTag, report: LanguageReport) {
        self.lock().languages.insert(language, report);
    }

    /// Number of operations recorded so far for a pair
    #[must_use]
    pub fn count(&self, operation: Operation, language: &LanguageTag) -> usize {
        self.lock()
            .samples
            .get(&(operation, language.clone()))
            .map_or(0, |s| s.latencies_ms.len())
    }

    /// Summarize everything recorded, with the final graph's totals
    #[must_use]
    pub fn finish(&self, graph: &Graph, run: RunInfo, fingerprint: String) -> Metrics {
        let state = self.lock();
        let operations = state
            .samples
            .iter()
            .map(|((operation, language), samples)| {
                let mut sorted = samples.latencies_ms.clone();
                sorted.sort_by(f64::total_cmp);
                OperationStats {
                    operation: *operation,
                    language: language.clone(),
                    count: sorted.len() as u64,
                    failures: samples.failures,
                    timeouts: samples.timeouts,
                    p50_ms: percentile(&sorted, 50.0),
                    p90_ms: percentile(&sorted, 90.0),
                    p99_ms: percentile(&sorted, 99.0),
                    max_ms: sorted.last().copied().unwrap_or(0.0),
                }
            })
            .collect();

        Metrics {
            run,
            operations,
            totals: Totals::of(graph),
            languages: state.languages.clone(),
            warnings: state.warnings.clone(),
            fingerprint,
        }
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python() -> LanguageTag {
        LanguageTag::new("python")
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 50.0), 50.0);
        assert_eq!(percentile(&sorted, 90.0), 90.0);
        assert_eq!(percentile(&sorted, 99.0), 99.0);
        assert_eq!(percentile(&[], 99.0), 0.0);
        assert_eq!(percentile(&[4.0], 50.0), 4.0);
    }

    #[test]
    fn test_record_aggregates_per_operation_and_language() {
        let recorder = MetricsRecorder::new();
        let rust = LanguageTag::new("rust");
        for ms in [10, 20, 30, 40] {
            recorder.record(
                Operation::Definition,
                &python(),
                Duration::from_millis(ms),
                Outcome::Success,
            );
        }
        recorder.record(
            Operation::Definition,
            &python(),
            Duration::from_millis(500),
            Outcome::Timeout,
        );
        recorder.record(
            Operation::DocumentSymbols,
            &rust,
            Duration::from_millis(5),
            Outcome::Failure,
        );

        let metrics = recorder.finish(&Graph::default(), RunInfo::new("/r"), String::new());

        let def = metrics.operation(Operation::Definition, &python());
        assert!(def.is_some_and(|s| s.count == 5 && s.timeouts == 1 && s.failures == 0));
        assert!(def.is_some_and(|s| s.p50_ms == 30.0 && s.max_ms == 500.0));

        let symbols = metrics.operation(Operation::DocumentSymbols, &rust);
        assert!(symbols.is_some_and(|s| s.count == 1 && s.failures == 1));
        assert_eq!(recorder.count(Operation::OutgoingCalls, &rust), 0);
    }

    #[test]
    fn test_warnings_and_language_reports_are_carried() {
        let recorder = MetricsRecorder::new();
        recorder.warn(Warning::LanguageDegraded {
            language: python(),
            reason: "timeouts".into(),
        });
        recorder.set_language(
            python(),
            LanguageReport {
                status: LanguageStatus::Degraded,
                files: 3,
                entities: 0,
            },
        );

        let metrics = recorder.finish(&Graph::default(), RunInfo::new("/r"), String::new());
        assert!(metrics.is_degraded(&python()));
        assert!(!metrics.is_degraded(&LanguageTag::new("go")));
        assert_eq!(
            metrics.language(&python()).map(|r| r.status),
            Some(LanguageStatus::Degraded)
        );
        assert_eq!(metrics.totals, Totals::default());
    }

    #[test]
    fn test_outcome_of_result() {
        let ok: Result<(), BackendError> = Ok(());
        let timeout: Result<(), BackendError> = Err(BackendError::Timeout {
            operation: Operation::Definition,
            timeout: Duration::from_secs(1),
        });
        let cancelled: Result<(), BackendError> = Err(BackendError::Cancelled);
        assert_eq!(Outcome::of(&ok), Outcome::Success);
        assert_eq!(Outcome::of(&timeout), Outcome::Timeout);
        assert_eq!(Outcome::of(&cancelled), Outcome::Failure);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() -> anyhow::Result<()> {
        let json = serde_json::to_string(&Warning::BackendUnavailable {
            language: LanguageTag::new("go"),
            reason: "no gopls".into(),
        })?;
        assert!(json.contains("\"kind\":\"backend-unavailable\""));
        assert!(json.contains("\"language\":\"go\""));
        Ok(())
    }
}
