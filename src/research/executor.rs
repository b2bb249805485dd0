use crate::config::StagesConfig;
use crate::error::{ParserError, StageError};
use crate::reasoning::{parse_structured, parse_trace, ReasoningClient, TraceEntry, TraceKind};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};

use super::types::{SourceType, SubagentResult, Task};

const EXECUTE_PROMPT: &str = include_str!("../../prompts/execute.md");

pub const SYSTEM_PROMPT: &str = "You are a diligent research agent. Answer thoroughly but \
concisely. Always return valid JSON.";

const MAX_ASSUMPTIONS: usize = 6;
const UPSTREAM_EXCERPT_CHARS: usize = 400;

const FALLBACK_CONFIDENCE: f64 = 0.72;
const FALLBACK_EXECUTION_MS: u64 = 1500;
const FALLBACK_ASSUMPTIONS: [&str; 3] = [
    "Historical patterns remain relevant for future predictions",
    "Available data sources are representative of the broader context",
    "Stakeholder behavior follows rational actor models",
];

/// What a subagent knows beyond its own task
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub root_question: String,
    pub auxiliary_context: Option<String>,
    /// (task id, title, output excerpt) of completed dependencies
    pub upstream: Vec<(String, String, String)>,
}

impl TaskContext {
    pub fn new(root_question: impl Into<String>, auxiliary_context: Option<String>) -> Self {
        Self {
            root_question: root_question.into(),
            auxiliary_context,
            upstream: Vec::new(),
        }
    }

    /// Copy of this context carrying excerpts of the given dependency results
    pub fn with_upstream<'a, I>(&self, results: I) -> Self
    where
        I: IntoIterator<Item = &'a SubagentResult>,
    {
        let upstream = results
            .into_iter()
            .map(|r| {
                (
                    r.task_id.clone(),
                    r.title.clone(),
                    truncate_chars(&r.output, UPSTREAM_EXCERPT_CHARS),
                )
            })
            .collect();

        Self {
            root_question: self.root_question.clone(),
            auxiliary_context: self.auxiliary_context.clone(),
            upstream,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    #[serde(default)]
    output: Value,
    #[serde(default)]
    assumptions: Value,
    #[serde(default)]
    confidence: Value,
    #[serde(default)]
    source_type: Value,
}

/// Run one task through the reasoning service. Never fails: any service or
/// parse error yields the fallback result.
pub async fn execute_task(
    client: &ReasoningClient,
    stages: &StagesConfig,
    task: &Task,
    context: &TaskContext,
) -> SubagentResult {
    let started = Instant::now();

    match try_execute(client, stages, task, context, started).await {
        Ok(result) => {
            debug!(
                "Task {} finished in {}ms (confidence {:.2})",
                task.id, result.execution_time_ms, result.confidence
            );
            result
        }
        Err(e) => {
            warn!("Subagent for task {} failed: {}. Using fallback result", task.id, e);
            fallback_result(task, &context.root_question)
        }
    }
}

async fn try_execute(
    client: &ReasoningClient,
    stages: &StagesConfig,
    task: &Task,
    context: &TaskContext,
    started: Instant,
) -> Result<SubagentResult, StageError> {
    let started_at = Utc::now();
    let prompt = build_prompt(task, context);
    let completion = client
        .complete(
            SYSTEM_PROMPT,
            &prompt,
            stages.execute_temperature,
            task.token_budget,
        )
        .await?;

    let raw: RawFinding = parse_structured(&completion.text)?;

    let output = raw
        .output
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ParserError::Unparsable {
            attempts: 1,
            reason: "response has no output text".to_string(),
        })?
        .to_string();

    let confidence = raw
        .confidence
        .as_f64()
        .filter(|c| c.is_finite())
        .ok_or_else(|| ParserError::Unparsable {
            attempts: 1,
            reason: format!("confidence is not a number: {}", raw.confidence),
        })?
        .clamp(0.0, 1.0);

    let assumptions: Vec<String> = match &raw.assumptions {
        Value::Array(items) => items
            .iter()
            .filter_map(|a| a.as_str())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .take(MAX_ASSUMPTIONS)
            .map(str::to_string)
            .collect(),
        other => {
            return Err(ParserError::Unparsable {
                attempts: 1,
                reason: format!("assumptions is not a list: {}", other),
            }
            .into())
        }
    };

    let source_type = match raw.source_type.as_str().and_then(SourceType::parse) {
        Some(st) => st,
        None => {
            warn!(
                "Task {} returned invalid sourceType {}, treating as reasoned",
                task.id, raw.source_type
            );
            SourceType::Reasoned
        }
    };

    let mut trace = completion
        .thinking
        .as_deref()
        .map(parse_trace)
        .unwrap_or_default();
    if trace.is_empty() {
        trace = vec![
            TraceEntry::new(
                started_at,
                TraceKind::Thought,
                format!("Beginning execution of task {}: {}", task.id, task.description),
            ),
            TraceEntry::new(
                started_at + ChronoDuration::milliseconds(500),
                TraceKind::Action,
                "Analyzing context and formulating response",
            ),
            TraceEntry::new(
                Utc::now(),
                TraceKind::Validate,
                format!("Task complete. Confidence: p={:.2}", confidence),
            ),
        ];
    }

    Ok(SubagentResult {
        task_id: task.id.clone(),
        title: task.title.clone(),
        output,
        assumptions,
        confidence,
        source_type,
        execution_time_ms: started.elapsed().as_millis() as u64,
        trace,
        fallback: false,
    })
}

fn build_prompt(task: &Task, context: &TaskContext) -> String {
    let aux = match &context.auxiliary_context {
        Some(ctx) => format!("CONTEXT: {}\n", ctx),
        None => String::new(),
    };

    let upstream = if context.upstream.is_empty() {
        String::new()
    } else {
        let mut section = String::from("FINDINGS FROM PREREQUISITE TASKS:\n");
        for (id, title, excerpt) in &context.upstream {
            section.push_str(&format!("- [{}] {}: {}\n", id, title, excerpt));
        }
        section
    };

    EXECUTE_PROMPT
        .replace("{{TASK_TITLE}}", &task.title)
        .replace("{{TASK_DESCRIPTION}}", &task.description)
        .replace("{{QUESTION}}", &context.root_question)
        .replace("{{CONTEXT}}", &aux)
        .replace("{{UPSTREAM}}", &upstream)
        .replace("{{TOKEN_BUDGET}}", &task.token_budget.to_string())
}

/// Deterministic stand-in used when the service cannot produce a finding
pub fn fallback_result(task: &Task, root_question: &str) -> SubagentResult {
    let now = Utc::now();
    let step = |n: i64| now + ChronoDuration::milliseconds(100 * n);

    SubagentResult {
        task_id: task.id.clone(),
        title: task.title.clone(),
        output: format!(
            "Analysis of \"{}\" within the context of \"{}\".\n\n\
Key findings include the identification of primary factors, stakeholder impacts, and potential future trends. \
The analysis suggests moderate confidence in the conclusions due to the complexity of interrelated variables.\n\n\
Note: This is a fallback response. For more detailed analysis, check the reasoning service configuration.",
            task.description, root_question
        ),
        assumptions: FALLBACK_ASSUMPTIONS.iter().map(|a| a.to_string()).collect(),
        confidence: FALLBACK_CONFIDENCE,
        source_type: SourceType::Reasoned,
        execution_time_ms: FALLBACK_EXECUTION_MS,
        trace: vec![
            TraceEntry::new(
                now,
                TraceKind::Thought,
                format!("Initializing analysis for task {}: {}", task.id, task.description),
            ),
            TraceEntry::new(
                step(1),
                TraceKind::Action,
                "Retrieving relevant context and establishing analytical framework",
            ),
            TraceEntry::new(
                step(2),
                TraceKind::Thought,
                "Evaluating key variables and their interdependencies",
            ),
            TraceEntry::new(
                step(3),
                TraceKind::Validate,
                format!(
                    "Confidence assessment: p={:.2} - Multiple assumptions required",
                    FALLBACK_CONFIDENCE
                ),
            ),
        ],
        fallback: true,
    }
}

/// Truncate to at most `max` characters, on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
