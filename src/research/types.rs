//! Data model shared by every stage of a research run

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use crate::reasoning::TraceEntry;

/// The caller's input; immutable for the whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchQuestion {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_context: Option<String>,
}

impl ResearchQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            auxiliary_context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.auxiliary_context = context.filter(|c| !c.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Parse a model-supplied priority; anything unrecognised is `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One atomic unit of research
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Sequential id: T1, T2, ...
    pub id: String,

    pub title: String,

    pub description: String,

    /// Ids of tasks that must complete first (deduplicated)
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub priority: Priority,

    pub token_budget: u32,
}

/// The decomposed question; never edited once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGraph {
    pub run_id: String,
    pub root_question: String,
    pub tasks: Vec<Task>,
}

impl TaskGraph {
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Results for this graph's tasks, in graph order
    pub fn in_order<'a>(
        &self,
        results: &'a BTreeMap<String, SubagentResult>,
    ) -> Vec<&'a SubagentResult> {
        self.tasks
            .iter()
            .filter_map(|t| results.get(&t.id))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Factual,
    Inferred,
    #[default]
    Reasoned,
}

impl SourceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "factual" => Some(SourceType::Factual),
            "inferred" => Some(SourceType::Inferred),
            "reasoned" => Some(SourceType::Reasoned),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Factual => write!(f, "factual"),
            SourceType::Inferred => write!(f, "inferred"),
            SourceType::Reasoned => write!(f, "reasoned"),
        }
    }
}

/// What one subagent produced for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentResult {
    pub task_id: String,
    pub title: String,
    pub output: String,
    pub assumptions: Vec<String>,
    /// Always within [0, 1]
    pub confidence: f64,
    pub source_type: SourceType,
    pub execution_time_ms: u64,
    pub trace: Vec<TraceEntry>,
    /// Set when the deterministic fallback stood in for the service
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationFlag {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub task_id: String,
    pub is_valid: bool,
    pub flags: Vec<ValidationFlag>,
    /// Within [0, 0.3] when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_downgrade: Option<f64>,
}

impl ValidationResult {
    pub fn passing(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            is_valid: true,
            flags: Vec::new(),
            confidence_downgrade: None,
        }
    }
}

/// Heuristic disagreement between two task outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub task_a: String,
    pub task_b: String,
    pub terms: (String, String),
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub id: String,
    pub label: String,
}

/// Terminal artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchReport {
    pub run_id: String,
    pub question: String,
    pub manuscript_html: String,
    pub assumptions: Vec<String>,
    pub confidence: f64,
    pub sources: Vec<SourceReference>,
    pub execution_time_ms: u64,
    pub tasks: BTreeMap<String, SubagentResult>,
    pub validation_results: Vec<ValidationResult>,
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
}

/// Sort key that orders T2 before T10
pub fn natural_task_key(id: &str) -> (String, u64, String) {
    let digits_at = id.find(|c: char| c.is_ascii_digit()).unwrap_or(id.len());
    let (prefix, rest) = id.split_at(digits_at);
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    let number = digits.parse().unwrap_or(0);
    (prefix.to_string(), number, id.to_string())
}

/// Opaque run id: "0x" plus four upper-case hex digits
pub fn generate_run_id() -> String {
    format!("0x{:04X}", rand::random::<u16>())
}

/// Deduplicate strings keeping first-seen order, capped at `limit`
pub fn dedup_preserving_order<I>(items: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .take(limit)
        .collect()
}
