//! Turns a research question into a validated task graph.
//!
//! The model's JSON is never trusted directly: fields are coerced one by one,
//! the graph is checked for duplicates, cycles and dangling references, and any
//! failure falls back to a fixed five-task template.

use crate::config::StageSettings;
use crate::error::{GraphError, StageError};
use crate::reasoning::{parse_structured, ReasoningClient};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::graph::validate_graph;
use super::types::{generate_run_id, Priority, ResearchQuestion, Task, TaskGraph};

const DECOMPOSE_PROMPT: &str = include_str!("../../prompts/decompose.md");

pub const SYSTEM_PROMPT: &str = "You are a research strategist. Your output is ONLY valid JSON. \
Never add markdown formatting or explanations.";

const MIN_TOKEN_BUDGET: u64 = 500;
const DEFAULT_TOKEN_BUDGET: u32 = 2000;
const EXPECTED_TASKS: std::ops::RangeInclusive<usize> = 4..=7;

/// Task as the model wrote it; every field is checked before use
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTask {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Value,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    dependencies: Value,
    #[serde(default)]
    priority: Value,
    #[serde(default, alias = "tokenBudget")]
    estimated_tokens: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDecomposition {
    Wrapped { tasks: Vec<RawTask> },
    Bare(Vec<RawTask>),
}

impl RawDecomposition {
    fn into_tasks(self) -> Vec<RawTask> {
        match self {
            RawDecomposition::Wrapped { tasks } => tasks,
            RawDecomposition::Bare(tasks) => tasks,
        }
    }
}

/// Decompose a question. Never fails: errors fall back to the template graph.
pub async fn decompose(
    client: &ReasoningClient,
    settings: &StageSettings,
    question: &ResearchQuestion,
) -> TaskGraph {
    match try_decompose(client, settings, question).await {
        Ok(tasks) => {
            info!("Decomposed question into {} tasks", tasks.len());
            TaskGraph {
                run_id: generate_run_id(),
                root_question: question.text.clone(),
                tasks,
            }
        }
        Err(e) => {
            warn!("Decomposition failed: {}. Using fallback task template", e);
            fallback_graph(&question.text)
        }
    }
}

async fn try_decompose(
    client: &ReasoningClient,
    settings: &StageSettings,
    question: &ResearchQuestion,
) -> Result<Vec<Task>, StageError> {
    let prompt = build_prompt(question);
    let response = client
        .complete(
            SYSTEM_PROMPT,
            &prompt,
            settings.temperature,
            settings.max_tokens,
        )
        .await?;

    tasks_from_response(&response.text)
}

fn build_prompt(question: &ResearchQuestion) -> String {
    let context = match &question.auxiliary_context {
        Some(ctx) => format!("\nAdditional context from the requester:\n{}\n", ctx),
        None => String::new(),
    };

    DECOMPOSE_PROMPT
        .replace("{{QUESTION}}", &question.text)
        .replace("{{CONTEXT}}", &context)
}

/// Parse and validate the model's answer into tasks
pub fn tasks_from_response(text: &str) -> Result<Vec<Task>, StageError> {
    let raw: RawDecomposition = parse_structured(text)?;
    Ok(validate_tasks(raw.into_tasks())?)
}

/// Coerce raw tasks into typed ones, then check the graph structure.
///
/// Missing id/title/description is fatal. Priority, token budget and
/// malformed or repeated dependencies are repaired instead of rejected;
/// a task depending on itself is a cycle and fails validation.
pub fn validate_tasks(raw: Vec<RawTask>) -> Result<Vec<Task>, GraphError> {
    if raw.is_empty() {
        return Err(GraphError::NoTasks);
    }

    if !EXPECTED_TASKS.contains(&raw.len()) {
        warn!("Unexpected task count: {}, using anyway", raw.len());
    }

    let tasks = raw
        .into_iter()
        .enumerate()
        .map(|(index, raw)| coerce_task(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    validate_graph(&tasks)?;
    Ok(tasks)
}

fn coerce_task(index: usize, raw: RawTask) -> Result<Task, GraphError> {
    let label = format!("task #{}", index + 1);
    let id = required_string(&raw.id, "id", &label)?;
    let title = required_string(&raw.title, "title", &id)?;
    let description = required_string(&raw.description, "description", &id)?;

    let mut dependencies: Vec<String> = Vec::new();
    match &raw.dependencies {
        Value::Array(items) => {
            for dep in items.iter().filter_map(|d| d.as_str()).map(str::trim) {
                if !dep.is_empty() && !dependencies.iter().any(|d| d == dep) {
                    dependencies.push(dep.to_string());
                }
            }
        }
        Value::Null => {}
        other => debug!("Task {} has malformed dependencies {}, using none", id, other),
    }

    let priority = match raw.priority.as_str().and_then(Priority::parse) {
        Some(p) => p,
        None => {
            debug!("Task {} has invalid priority {}, using medium", id, raw.priority);
            Priority::Medium
        }
    };

    let token_budget = raw
        .estimated_tokens
        .as_f64()
        .filter(|n| n.is_finite() && *n >= MIN_TOKEN_BUDGET as f64)
        .map(|n| n.min(u32::MAX as f64) as u32)
        .unwrap_or(DEFAULT_TOKEN_BUDGET);

    Ok(Task {
        id,
        title,
        description,
        dependencies,
        priority,
        token_budget,
    })
}

fn required_string(value: &Value, field: &'static str, task: &str) -> Result<String, GraphError> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GraphError::MissingField {
            field,
            task: task.to_string(),
        })
}

/// Deterministic five-task plan used whenever decomposition fails
pub fn fallback_graph(question: &str) -> TaskGraph {
    let task = |id: &str, title: &str, description: String, deps: &[&str], priority, budget| Task {
        id: id.to_string(),
        title: title.to_string(),
        description,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        priority,
        token_budget: budget,
    };

    TaskGraph {
        run_id: generate_run_id(),
        root_question: question.to_string(),
        tasks: vec![
            task(
                "T1",
                "Define Core Concepts",
                format!(
                    "Identify and define key terminology and foundational concepts related to: {}",
                    question
                ),
                &[],
                Priority::High,
                2000,
            ),
            task(
                "T2",
                "Analyze Historical Context",
                format!("Review historical data and precedents relevant to: {}", question),
                &["T1"],
                Priority::High,
                2500,
            ),
            task(
                "T3",
                "Evaluate Current State",
                format!(
                    "Assess present-day conditions and factors impacting: {}",
                    question
                ),
                &["T1"],
                Priority::High,
                2500,
            ),
            task(
                "T4",
                "Identify Key Stakeholders",
                format!(
                    "Map out primary actors, organizations, and entities involved in: {}",
                    question
                ),
                &["T1"],
                Priority::Medium,
                2000,
            ),
            task(
                "T5",
                "Synthesize Findings",
                format!(
                    "Integrate all research into coherent conclusions addressing: {}",
                    question
                ),
                &["T2", "T3", "T4"],
                Priority::High,
                3000,
            ),
        ],
    }
}
