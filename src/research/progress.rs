//! Progress events published while a run executes

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::types::{ResearchReport, SubagentResult, TaskGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Nothing published yet
    #[default]
    Idle,
    Decomposing,
    Executing,
    Validating,
    Synthesizing,
    Complete,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Idle => "idle",
            ExecutionStatus::Decomposing => "decomposing",
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Validating => "validating",
            ExecutionStatus::Synthesizing => "synthesizing",
            ExecutionStatus::Complete => "complete",
            ExecutionStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One progress event. Optional payloads are only set by the stage that owns them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub progress: f64,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_graph: Option<TaskGraph>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub completed_tasks: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_result: Option<SubagentResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub manuscript: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Box<ResearchReport>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionUpdate {
    pub fn new(status: ExecutionStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            task_graph: None,
            current_task: None,
            completed_tasks: Vec::new(),
            partial_result: None,
            manuscript: None,
            report: None,
            error: None,
        }
    }
}

pub type ProgressSender = UnboundedSender<ExecutionUpdate>;

/// Forwards updates to an optional observer, never letting progress go backwards
#[derive(Debug, Default)]
pub struct ProgressReporter {
    sender: Option<ProgressSender>,
    last: f64,
}

impl ProgressReporter {
    pub fn new(sender: Option<ProgressSender>) -> Self {
        Self { sender, last: 0.0 }
    }

    pub fn emit(&mut self, mut update: ExecutionUpdate) {
        update.progress = update.progress.clamp(0.0, 1.0).max(self.last);
        self.last = update.progress;

        if let Some(sender) = &self.sender {
            // A dropped receiver just means nobody is watching
            let _ = sender.send(update);
        }
    }

    pub fn last_progress(&self) -> f64 {
        self.last
    }
}

/// Waypoint for a stage. Executing interpolates 0.2..0.7 over finished tasks.
pub fn execution_progress(status: ExecutionStatus, completed: usize, total: usize) -> f64 {
    match status {
        ExecutionStatus::Idle | ExecutionStatus::Error => 0.0,
        ExecutionStatus::Decomposing => 0.1,
        ExecutionStatus::Executing if total == 0 => 0.2,
        ExecutionStatus::Executing => 0.2 + 0.5 * (completed.min(total) as f64 / total as f64),
        ExecutionStatus::Validating => 0.75,
        ExecutionStatus::Synthesizing => 0.9,
        ExecutionStatus::Complete => 1.0,
    }
}
