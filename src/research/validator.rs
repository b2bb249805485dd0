//! Adversarial review of subagent findings plus the heuristics that turn
//! review flags into a single confidence figure.

use crate::config::StageSettings;
use crate::error::StageError;
use crate::reasoning::{parse_structured, ReasoningClient};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

use super::executor::truncate_chars;
use super::types::{Contradiction, Severity, SubagentResult, ValidationFlag, ValidationResult};

const VALIDATE_PROMPT: &str = include_str!("../../prompts/validate.md");

pub const SYSTEM_PROMPT: &str = "You are a critical logic validator and peer reviewer. \
Find flaws relentlessly. Return ONLY valid JSON.";

const OUTPUT_EXCERPT_CHARS: usize = 500;
const MAX_DOWNGRADE: f64 = 0.3;
const LOW_CONFIDENCE: f64 = 0.6;
const LOW_CONFIDENCE_DOWNGRADE: f64 = 0.1;

const OPPOSING_TERMS: [(&str, &str); 6] = [
    ("increase", "decrease"),
    ("positive", "negative"),
    ("high", "low"),
    ("growth", "decline"),
    ("benefit", "harm"),
    ("support", "oppose"),
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValidation {
    #[serde(default)]
    task_id: Value,
    #[serde(default)]
    is_valid: Value,
    #[serde(default)]
    flags: Value,
    #[serde(default)]
    confidence_downgrade: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValidations {
    Bare(Vec<RawValidation>),
    Wrapped { validations: Vec<RawValidation> },
}

/// Review all results in one batched call.
///
/// Returns exactly one entry per input result, in input order. Never fails:
/// service or parse errors yield `fallback_validation`.
pub async fn validate(
    client: &ReasoningClient,
    settings: &StageSettings,
    results: &[SubagentResult],
    root_question: &str,
) -> Vec<ValidationResult> {
    if results.is_empty() {
        return Vec::new();
    }

    match try_validate(client, settings, results, root_question).await {
        Ok(validations) => {
            let flagged = validations.iter().filter(|v| !v.flags.is_empty()).count();
            info!("Validated {} results, {} flagged", validations.len(), flagged);
            validations
        }
        Err(e) => {
            warn!("Validation failed: {}. Using fallback validation", e);
            fallback_validation(results)
        }
    }
}

async fn try_validate(
    client: &ReasoningClient,
    settings: &StageSettings,
    results: &[SubagentResult],
    root_question: &str,
) -> Result<Vec<ValidationResult>, StageError> {
    let prompt = build_prompt(results, root_question);
    let completion = client
        .complete(
            SYSTEM_PROMPT,
            &prompt,
            settings.temperature,
            settings.max_tokens,
        )
        .await?;

    let raw: RawValidations = parse_structured(&completion.text)?;
    Ok(reconcile(results, raw))
}

fn build_prompt(results: &[SubagentResult], root_question: &str) -> String {
    let simplified: Vec<Value> = results
        .iter()
        .map(|r| {
            json!({
                "taskId": r.task_id,
                "output": truncate_chars(&r.output, OUTPUT_EXCERPT_CHARS),
                "confidence": r.confidence,
                "sourceType": r.source_type,
                "assumptions": r.assumptions,
            })
        })
        .collect();
    let rendered = serde_json::to_string_pretty(&simplified).unwrap_or_default();

    VALIDATE_PROMPT
        .replace("{{QUESTION}}", root_question)
        .replace("{{RESULTS}}", &rendered)
}

/// Align the reviewer's answer with the input results and repair bad fields
fn reconcile(results: &[SubagentResult], raw: RawValidations) -> Vec<ValidationResult> {
    let raw = match raw {
        RawValidations::Bare(v) => v,
        RawValidations::Wrapped { validations } => validations,
    };

    let mut by_task: HashMap<String, RawValidation> = HashMap::new();
    for entry in raw {
        if let Some(id) = entry.task_id.as_str().map(str::trim) {
            by_task.entry(id.to_string()).or_insert(entry);
        }
    }

    results
        .iter()
        .map(|result| match by_task.remove(&result.task_id) {
            Some(entry) => ValidationResult {
                task_id: result.task_id.clone(),
                is_valid: entry.is_valid.as_bool().unwrap_or(true),
                flags: coerce_flags(&entry.flags),
                confidence_downgrade: entry
                    .confidence_downgrade
                    .as_f64()
                    .filter(|d| d.is_finite())
                    .map(|d| d.clamp(0.0, MAX_DOWNGRADE)),
            },
            None => ValidationResult::passing(result.task_id.clone()),
        })
        .collect()
}

fn coerce_flags(value: &Value) -> Vec<ValidationFlag> {
    let Value::Array(items) = value else {
        return Vec::new();
    };

    items
        .iter()
        .map(|flag| ValidationFlag {
            severity: flag["severity"]
                .as_str()
                .and_then(Severity::parse)
                .unwrap_or(Severity::Warning),
            message: flag["message"]
                .as_str()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or("Unspecified issue")
                .to_string(),
            suggestion: flag["suggestion"]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
        .collect()
}

/// Local review used when the service is unavailable: only low confidence is flagged
pub fn fallback_validation(results: &[SubagentResult]) -> Vec<ValidationResult> {
    results
        .iter()
        .map(|r| {
            if r.confidence < LOW_CONFIDENCE {
                ValidationResult {
                    task_id: r.task_id.clone(),
                    is_valid: true,
                    flags: vec![ValidationFlag {
                        severity: Severity::Warning,
                        message: "Low confidence score detected".to_string(),
                        suggestion: Some(
                            "Consider gathering more data or refining the analysis".to_string(),
                        ),
                    }],
                    confidence_downgrade: Some(LOW_CONFIDENCE_DOWNGRADE),
                }
            } else {
                ValidationResult::passing(r.task_id.clone())
            }
        })
        .collect()
}

/// Pairs of outputs using opposing terms while discussing a shared subject.
///
/// A shared subject means at least one common word longer than five characters.
pub fn detect_contradictions(results: &[SubagentResult]) -> Vec<Contradiction> {
    let lowered: Vec<String> = results.iter().map(|r| r.output.to_lowercase()).collect();
    let long_words: Vec<HashSet<&str>> = lowered
        .iter()
        .map(|text| {
            text.split_whitespace()
                .filter(|w| w.chars().count() > 5)
                .collect()
        })
        .collect();

    let mut found = Vec::new();
    for i in 0..results.len() {
        for j in (i + 1)..results.len() {
            let (a, b) = (&lowered[i], &lowered[j]);
            if long_words[i].is_disjoint(&long_words[j]) {
                continue;
            }

            for (term1, term2) in OPPOSING_TERMS {
                let opposed = (a.contains(term1) && b.contains(term2))
                    || (a.contains(term2) && b.contains(term1));
                if opposed {
                    found.push(Contradiction {
                        task_a: results[i].task_id.clone(),
                        task_b: results[j].task_id.clone(),
                        terms: (term1.to_string(), term2.to_string()),
                        description: format!(
                            "Potential contradiction: \"{}\" vs \"{}\" in related contexts",
                            term1, term2
                        ),
                    });
                }
            }
        }
    }
    found
}

/// Weighted mean of downgraded confidences; heavily flagged results weigh less
pub fn calculate_validated_confidence<'a, I>(results: I, validations: &[ValidationResult]) -> f64
where
    I: IntoIterator<Item = &'a SubagentResult>,
{
    let by_task: HashMap<&str, &ValidationResult> = validations
        .iter()
        .map(|v| (v.task_id.as_str(), v))
        .collect();

    let mut total = 0.0;
    let mut total_weight = 0.0;
    for result in results {
        let validation = by_task.get(result.task_id.as_str());
        let downgrade = validation
            .and_then(|v| v.confidence_downgrade)
            .unwrap_or(0.0);
        let flags = validation.map(|v| v.flags.len()).unwrap_or(0);
        let weight = (1.0 - flags as f64 * 0.1).max(0.5);

        total += (result.confidence - downgrade).clamp(0.0, 1.0) * weight;
        total_weight += weight;
    }

    // Empty input leaves total_weight at zero
    if total_weight > 0.0 {
        total / total_weight
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::provider::testing::ScriptedBackend;
    use crate::provider::Completion;
    use crate::research::types::SourceType;
    use std::sync::Arc;

    fn result(id: &str, output: &str, confidence: f64) -> SubagentResult {
        SubagentResult {
            task_id: id.to_string(),
            title: format!("Task {}", id),
            output: output.to_string(),
            assumptions: vec![],
            confidence,
            source_type: SourceType::Inferred,
            execution_time_ms: 10,
            trace: vec![],
            fallback: false,
        }
    }

    fn client(backend: Arc<ScriptedBackend>) -> ReasoningClient {
        let retry = RetryConfig {
            max_retries: 0,
            backoff_base_ms: 1,
        };
        ReasoningClient::new(backend, retry, 1)
    }

    fn settings() -> StageSettings {
        StageSettings {
            temperature: 0.2,
            max_tokens: 3000,
        }
    }

    #[tokio::test]
    async fn test_response_reconciled_with_inputs() {
        let backend = ScriptedBackend::new(|_| {
            Ok(Completion::text(
                r#"[
                    {"taskId": "T2", "isValid": false, "flags": [
                        {"severity": "catastrophic", "suggestion": "Cite data"},
                        {"severity": "critical", "message": "Circular"}
                    ], "confidenceDowngrade": 0.9},
                    {"taskId": "T9", "isValid": false, "flags": []}
                ]"#,
            ))
        });
        let results = vec![result("T1", "a", 0.9), result("T2", "b", 0.8)];
        let validations = validate(&client(backend), &settings(), &results, "Q").await;

        assert_eq!(validations.len(), 2);
        assert_eq!(validations[0], ValidationResult::passing("T1"));

        let t2 = &validations[1];
        assert!(!t2.is_valid);
        assert_eq!(t2.confidence_downgrade, Some(0.3));
        assert_eq!(t2.flags[0].severity, Severity::Warning);
        assert_eq!(t2.flags[0].message, "Unspecified issue");
        assert_eq!(t2.flags[0].suggestion.as_deref(), Some("Cite data"));
        assert_eq!(t2.flags[1].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_prompt_truncates_outputs() {
        let backend = ScriptedBackend::new(|_| Ok(Completion::text("[]")));
        let long = "x".repeat(2000);
        let results = vec![result("T1", &long, 0.9)];
        validate(&client(backend.clone()), &settings(), &results, "Q").await;

        let prompt = &backend.requests()[0].user_prompt;
        assert!(prompt.contains("ROOT QUESTION: Q"));
        assert!(!prompt.contains(&"x".repeat(501)));
    }

    #[tokio::test]
    async fn test_service_failure_uses_fallback() {
        let results = vec![result("T1", "a", 0.9), result("T2", "b", 0.5)];
        let validations =
            validate(&client(ScriptedBackend::failing()), &settings(), &results, "Q").await;
        assert_eq!(validations, fallback_validation(&results));
    }

    #[tokio::test]
    async fn test_no_results_no_call() {
        let backend = ScriptedBackend::new(|_| Ok(Completion::text("[]")));
        let validations = validate(&client(backend.clone()), &settings(), &[], "Q").await;
        assert!(validations.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_fallback_flags_only_low_confidence() {
        let results = vec![result("T1", "a", 0.59), result("T2", "b", 0.6)];
        let validations = fallback_validation(&results);

        assert_eq!(validations[0].flags.len(), 1);
        assert_eq!(validations[0].flags[0].severity, Severity::Warning);
        assert_eq!(validations[0].flags[0].message, "Low confidence score detected");
        assert_eq!(validations[0].confidence_downgrade, Some(0.1));
        assert!(validations[0].is_valid);

        assert_eq!(validations[1], ValidationResult::passing("T2"));
    }

    #[test]
    fn test_contradiction_requires_shared_subject() {
        let results = vec![
            result("T1", "Reactor deployment will increase steadily", 0.8),
            result("T2", "Reactor deployment will decrease sharply", 0.8),
            result("T3", "Costs decrease", 0.8),
        ];
        let found = detect_contradictions(&results);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task_a, "T1");
        assert_eq!(found[0].task_b, "T2");
        assert_eq!(
            found[0].terms,
            ("increase".to_string(), "decrease".to_string())
        );
    }

    #[test]
    fn test_validated_confidence() {
        assert_eq!(calculate_validated_confidence(Vec::<SubagentResult>::new().iter(), &[]), 0.0);

        let results = vec![result("T1", "a", 0.9), result("T2", "b", 0.5)];
        let validations = vec![
            ValidationResult::passing("T1"),
            ValidationResult {
                task_id: "T2".to_string(),
                is_valid: false,
                flags: vec![
                    ValidationFlag {
                        severity: Severity::Error,
                        message: "m".to_string(),
                        suggestion: None,
                    };
                    6
                ],
                confidence_downgrade: Some(0.3),
            },
        ];

        // T1: 0.9 * 1.0, T2: 0.2 * 0.5
        let expected = (0.9 + 0.2 * 0.5) / 1.5;
        let got = calculate_validated_confidence(&results, &validations);
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn test_downgrade_cannot_push_below_zero() {
        let results = vec![result("T1", "a", 0.1)];
        let validations = vec![ValidationResult {
            task_id: "T1".to_string(),
            is_valid: false,
            flags: vec![],
            confidence_downgrade: Some(0.3),
        }];
        assert_eq!(calculate_validated_confidence(&results, &validations), 0.0);
    }
}
