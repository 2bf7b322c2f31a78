//! Phase Timeline
//!
//! Records when each phase of a run starts and finishes so the driver can
//! log a duration summary at the end.

use std::time::{Duration, Instant};

use crate::error::Result;

/// What happened to a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Started,
    Completed,
    Failed,
}

/// A single recorded event.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Phase label, e.g. `dispatch` or `chunk1/process`.
    pub phase: String,
    pub event: PhaseEvent,
    pub timestamp: Instant,
}

/// Start, end and outcome of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpan {
    pub phase: String,
    pub start: Duration,
    pub end: Duration,
    pub failed: bool,
}

impl PhaseSpan {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Phase events of one driver invocation, in the order they happened.
#[derive(Debug, Clone)]
pub struct PhaseTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl PhaseTimeline {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record(&mut self, phase: impl Into<String>, event: PhaseEvent) {
        self.events.push(TimelineEvent {
            phase: phase.into(),
            event,
            timestamp: Instant::now(),
        });
    }

    /// Runs `f` between a `Started` and a `Completed`/`Failed` event.
    pub fn track<T, F>(&mut self, phase: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let phase = phase.into();
        self.record(phase.clone(), PhaseEvent::Started);
        let result = f();
        let event = if result.is_ok() {
            PhaseEvent::Completed
        } else {
            PhaseEvent::Failed
        };
        self.record(phase, event);
        result
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finished phases ordered by start time. A phase that never finished
    /// is left out.
    pub fn spans(&self) -> Vec<PhaseSpan> {
        let mut open: Vec<(String, Duration)> = Vec::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let offset = event.timestamp.duration_since(self.start_time);
            match event.event {
                PhaseEvent::Started => open.push((event.phase.clone(), offset)),
                PhaseEvent::Completed | PhaseEvent::Failed => {
                    if let Some(index) = open.iter().rposition(|(phase, _)| *phase == event.phase) {
                        let (phase, start) = open.remove(index);
                        spans.push(PhaseSpan {
                            phase,
                            start,
                            end: offset,
                            failed: event.event == PhaseEvent::Failed,
                        });
                    }
                }
            }
        }

        spans.sort_by_key(|span| span.start);
        spans
    }

    /// One line per finished phase with a bar scaled to the total run time.
    pub fn summary(&self) -> String {
        let spans = self.spans();
        let total = self.elapsed().as_millis().max(1);
        let width = spans.iter().map(|s| s.phase.len()).max().unwrap_or(0).max(5);
        let scale = 40.0 / total as f64;

        let mut output = String::from("Phase timeline:\n");
        for span in &spans {
            let start_pos = (span.start.as_millis() as f64 * scale) as usize;
            let length = ((span.duration().as_millis() as f64) * scale).max(1.0) as usize;
            output.push_str(&format!(
                "  {:width$} |{}{}| {} ms{}\n",
                span.phase,
                " ".repeat(start_pos),
                "#".repeat(length),
                span.duration().as_millis(),
                if span.failed { " (failed)" } else { "" },
                width = width,
            ));
        }
        output.push_str(&format!("  Total: {} ms", total));
        output
    }
}

impl Default for PhaseTimeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppRunnerError;
    use std::thread;

    #[test]
    fn test_track_records_outcome() {
        let mut timeline = PhaseTimeline::new();
        let value = timeline.track("dispatch", || Ok(3)).unwrap();
        assert_eq!(value, 3);

        let err = timeline
            .track("chunk1/process", || -> Result<()> {
                Err(AppRunnerError::Resolve("boom".into()))
            })
            .unwrap_err();
        assert_eq!(err.kind(), "ResolveError");

        let events: Vec<PhaseEvent> = timeline.events().iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                PhaseEvent::Started,
                PhaseEvent::Completed,
                PhaseEvent::Started,
                PhaseEvent::Failed
            ]
        );
    }

    #[test]
    fn test_spans_in_start_order() {
        let mut timeline = PhaseTimeline::new();
        timeline.record("dispatch", PhaseEvent::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.record("dispatch", PhaseEvent::Completed);
        timeline.record("chunk1/inputs", PhaseEvent::Started);
        timeline.record("chunk1/inputs", PhaseEvent::Failed);
        timeline.record("chunk2/inputs", PhaseEvent::Started);

        let spans = timeline.spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].phase, "dispatch");
        assert!(spans[0].duration() >= Duration::from_millis(20));
        assert!(!spans[0].failed);
        assert!(spans[1].failed);
    }

    #[test]
    fn test_summary_lists_phases() {
        let mut timeline = PhaseTimeline::new();
        timeline.track("dispatch", || Ok(())).unwrap();
        let _ = timeline.track("chunk1/outputs", || -> Result<()> {
            Err(AppRunnerError::RegisterFailed("x".into()))
        });

        let summary = timeline.summary();
        assert!(summary.starts_with("Phase timeline:"));
        assert!(summary.contains("dispatch"));
        assert!(summary.contains("chunk1/outputs"));
        assert!(summary.contains("(failed)"));
        assert!(summary.contains("Total:"));
    }

    #[test]
    fn test_empty_summary() {
        let timeline = PhaseTimeline::default();
        assert!(timeline.spans().is_empty());
        assert!(timeline.summary().contains("Total:"));
    }
}
