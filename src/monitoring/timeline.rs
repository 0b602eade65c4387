//! Execution Timeline
//!
//! Derives per-step timings from an execution's step records for reports
//! and the ASCII Gantt chart printed by `procflow show`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::execution::record::{StepExecutionRecord, StepExecutionStatus, WorkflowExecution};

/// One dispatched step placed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub step_id: String,
    pub status: StepExecutionStatus,
    /// The step suspended the execution
    pub blocking: bool,
    /// Start relative to the execution start
    pub offset_ms: f64,
    pub duration_ms: f64,
}

impl TimelineEntry {
    fn end_ms(&self) -> f64 {
        self.offset_ms + self.duration_ms
    }
}

/// Timeline of an execution, in dispatch order.
///
/// Steps visited more than once appear once per visit. A resumed execution
/// shows the pause as a gap between the blocking step and the next one.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTimeline {
    entries: Vec<TimelineEntry>,
}

impl ExecutionTimeline {
    pub fn from_execution(execution: &WorkflowExecution) -> Self {
        Self::from_records(execution.started_at, &execution.step_executions)
    }

    /// Builds a timeline from step records, measuring offsets from `origin`.
    pub fn from_records(origin: DateTime<Utc>, records: &[StepExecutionRecord]) -> Self {
        let entries = records
            .iter()
            .map(|record| {
                let offset = (record.started_at - origin)
                    .num_microseconds()
                    .unwrap_or(0)
                    .max(0) as f64
                    / 1000.0;
                TimelineEntry {
                    step_id: record.step_id.clone(),
                    status: record.status,
                    blocking: record.blocking,
                    offset_ms: offset,
                    duration_ms: record.duration_ms.max(0.0),
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Milliseconds from the execution start to the end of the last step.
    pub fn total_ms(&self) -> f64 {
        self.entries
            .iter()
            .map(TimelineEntry::end_ms)
            .fold(0.0, f64::max)
    }

    /// Generates an ASCII Gantt chart representation.
    ///
    /// Each dispatch is shown as a bar indicating when it ran relative to
    /// the total execution time. Failed steps are drawn with `x`, blocking
    /// ones end in `|`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = self.total_ms();
        if self.entries.is_empty() || total_time <= 0.0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time;

        for entry in &self.entries {
            let start_pos = ((entry.offset_ms * scale) as usize).min(49);
            let width = ((entry.duration_ms * scale).max(1.0) as usize).min(50 - start_pos);

            let fill = match entry.status {
                StepExecutionStatus::Succeeded => "#",
                StepExecutionStatus::Failed => "x",
            };
            let mut bar = " ".repeat(start_pos);
            bar.push_str(&fill.repeat(width));
            if entry.blocking {
                bar.pop();
                bar.push('|');
            }

            output.push_str(&format!(
                "{:12} |{:50}| ({:.1} ms)\n",
                truncate(&entry.step_id, 12),
                bar,
                entry.duration_ms
            ));
        }

        output.push_str(&format!("\nTotal: {:.1} ms\n", total_time));
        output
    }

    /// Returns time spent per step in milliseconds, summed over visits.
    pub fn get_durations(&self) -> HashMap<String, f64> {
        let mut durations: HashMap<String, f64> = HashMap::new();
        for entry in &self.entries {
            *durations.entry(entry.step_id.clone()).or_insert(0.0) += entry.duration_ms;
        }
        durations
    }
}

/// Truncates a string to a maximum number of characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
