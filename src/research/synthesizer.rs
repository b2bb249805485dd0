use crate::config::StageSettings;
use crate::error::{ParserError, StageError};
use crate::reasoning::{parse_structured, ReasoningClient};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

use super::executor::truncate_chars;
use super::types::{
    dedup_preserving_order, Contradiction, ResearchReport, SourceReference, SubagentResult,
    TaskGraph, ValidationResult,
};
use super::validator::calculate_validated_confidence;

const SYNTHESIZE_PROMPT: &str = include_str!("../../prompts/synthesize.md");

pub const SYSTEM_PROMPT: &str = "You are an academic writer preparing a formal research report. \
Return ONLY valid JSON with an HTML-formatted manuscript.";

const OUTPUT_EXCERPT_CHARS: usize = 400;
const MAX_ASSUMPTIONS: usize = 10;
const FALLBACK_ASSUMPTIONS: usize = 6;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSynthesis {
    #[serde(default)]
    manuscript: Value,
    #[serde(default)]
    assumptions: Value,
    #[serde(default)]
    overall_confidence: Value,
}

/// Everything synthesis needs besides the client
pub struct SynthesisInput<'a> {
    pub graph: &'a TaskGraph,
    pub results: &'a BTreeMap<String, SubagentResult>,
    pub validations: Vec<ValidationResult>,
    pub contradictions: Vec<Contradiction>,
}

/// Produce the final report. Never fails: errors yield the templated manuscript.
pub async fn synthesize(
    client: &ReasoningClient,
    settings: &StageSettings,
    input: SynthesisInput<'_>,
) -> ResearchReport {
    let started = Instant::now();
    let ordered = input.graph.in_order(input.results);
    let collected = dedup_preserving_order(
        ordered.iter().flat_map(|r| r.assumptions.iter().cloned()),
        MAX_ASSUMPTIONS,
    );

    let (manuscript_html, assumptions, confidence, sources) =
        match try_synthesize(client, settings, input.graph, &ordered).await {
            Ok(raw) => {
                let model_assumptions = string_list(&raw.assumptions);
                let assumptions = dedup_preserving_order(
                    model_assumptions.into_iter().chain(collected.iter().cloned()),
                    MAX_ASSUMPTIONS,
                );

                let confidence = raw
                    .overall_confidence
                    .as_f64()
                    .filter(|c| c.is_finite() && *c > 0.0)
                    .unwrap_or_else(|| {
                        calculate_validated_confidence(ordered.iter().copied(), &input.validations)
                    })
                    .clamp(0.0, 1.0);

                let manuscript = raw
                    .manuscript
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_default();
                let sources = extract_source_references(&manuscript);
                info!(
                    "Synthesized manuscript with {} sources (confidence {:.2})",
                    sources.len(),
                    confidence
                );
                (manuscript, assumptions, confidence, sources)
            }
            Err(e) => {
                warn!("Synthesis failed: {}. Using fallback manuscript", e);
                let confidence =
                    calculate_validated_confidence(ordered.iter().copied(), &input.validations)
                        .clamp(0.0, 1.0);
                let manuscript = fallback_manuscript(&input.graph.root_question, &ordered);
                let assumptions = collected.iter().take(FALLBACK_ASSUMPTIONS).cloned().collect();
                (manuscript, assumptions, confidence, Vec::new())
            }
        };

    ResearchReport {
        run_id: input.graph.run_id.clone(),
        question: input.graph.root_question.clone(),
        manuscript_html,
        assumptions,
        confidence,
        sources,
        execution_time_ms: started.elapsed().as_millis() as u64,
        tasks: input.results.clone(),
        validation_results: input.validations,
        contradictions: input.contradictions,
    }
}

async fn try_synthesize(
    client: &ReasoningClient,
    settings: &StageSettings,
    graph: &TaskGraph,
    ordered: &[&SubagentResult],
) -> Result<RawSynthesis, StageError> {
    let findings: Vec<Value> = ordered
        .iter()
        .map(|r| {
            json!({
                "taskId": r.task_id,
                "output": truncate_chars(&r.output, OUTPUT_EXCERPT_CHARS),
                "confidence": r.confidence,
                "sourceType": r.source_type,
            })
        })
        .collect();
    let prompt = SYNTHESIZE_PROMPT
        .replace("{{QUESTION}}", &graph.root_question)
        .replace(
            "{{FINDINGS}}",
            &serde_json::to_string_pretty(&findings).unwrap_or_default(),
        );

    let completion = client
        .complete(
            SYSTEM_PROMPT,
            &prompt,
            settings.temperature,
            settings.max_tokens,
        )
        .await?;

    let raw: RawSynthesis = parse_structured(&completion.text)?;
    if raw.manuscript.as_str().map_or(true, |m| m.trim().is_empty()) {
        return Err(ParserError::Unparsable {
            attempts: 1,
            reason: "response has no manuscript".to_string(),
        }
        .into());
    }
    Ok(raw)
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|a| a.as_str())
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Each distinct bracketed number, in order of first appearance
pub fn extract_source_references(manuscript: &str) -> Vec<SourceReference> {
    static CITATION: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(pattern) = CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]").ok()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    pattern
        .captures_iter(manuscript)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|n| seen.insert(n.clone()))
        .map(|n| SourceReference {
            id: format!("REF-{}", n),
            label: format!("Source [{}]", n),
        })
        .collect()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Templated manuscript built from the results alone
pub fn fallback_manuscript(question: &str, results: &[&SubagentResult]) -> String {
    let question = escape_html(question);

    let findings: Vec<String> = results
        .iter()
        .map(|r| {
            format!(
                "<h3>{}: {}</h3>\n<p>{}</p>\n<p><em>Confidence: {:.0}% | Source: {}</em></p>",
                escape_html(&r.task_id),
                escape_html(&r.title),
                escape_html(&r.output),
                r.confidence * 100.0,
                r.source_type
            )
        })
        .collect();

    let (low, high) = results.iter().fold((f64::MAX, f64::MIN), |(lo, hi), r| {
        (lo.min(r.confidence), hi.max(r.confidence))
    });
    let range = if results.is_empty() {
        "n/a".to_string()
    } else {
        format!("{:.2} - {:.2}", low, high)
    };

    format!(
        r#"<h1>Research Report: {question}</h1>

<h2>Executive Summary</h2>
<p>This report presents findings from a multi-stage analysis of "{question}". The research was conducted through a series of specialized subagent analyses, each focusing on distinct aspects of the inquiry.</p>

<h2>Methodology</h2>
<p>The analysis employed a decomposed approach, breaking the research question into {count} atomic tasks. Each task was executed by an isolated subagent with specific domain focus. Results were validated through adversarial peer review before synthesis.</p>

<h2>Key Findings</h2>
{findings}

<h2>Conclusions</h2>
<p>The synthesized findings suggest a nuanced understanding of the research question. While confidence varies across individual components (range: {range}), the overall coherence of the analysis supports the primary conclusions.</p>

<h2>What Could Be Wrong</h2>
<p>Several limitations should be noted: (1) Analysis relies on reasoning rather than primary data collection, (2) Temporal factors may shift conclusions, (3) Additional domain expertise could reveal overlooked factors.</p>
"#,
        question = question,
        count = results.len(),
        findings = findings.join("\n"),
        range = range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::provider::testing::ScriptedBackend;
    use crate::provider::Completion;
    use crate::research::decomposer::fallback_graph;
    use crate::research::executor::fallback_result;
    use std::sync::Arc;

    fn client(backend: Arc<ScriptedBackend>) -> ReasoningClient {
        let retry = RetryConfig {
            max_retries: 0,
            backoff_base_ms: 1,
        };
        ReasoningClient::new(backend, retry, 1)
    }

    fn settings() -> StageSettings {
        StageSettings {
            temperature: 0.3,
            max_tokens: 4000,
        }
    }

    fn results_for(graph: &TaskGraph) -> BTreeMap<String, SubagentResult> {
        graph
            .tasks
            .iter()
            .map(|t| (t.id.clone(), fallback_result(t, &graph.root_question)))
            .collect()
    }

    #[test]
    fn test_extract_source_references() {
        let refs = extract_source_references("Evidence [1] and [2], also [1] again.");
        assert_eq!(
            refs,
            vec![
                SourceReference {
                    id: "REF-1".to_string(),
                    label: "Source [1]".to_string()
                },
                SourceReference {
                    id: "REF-2".to_string(),
                    label: "Source [2]".to_string()
                },
            ]
        );
        assert!(extract_source_references("no citations [a]").is_empty());
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<b>"R&D" isn't</b>"#),
            "&lt;b&gt;&quot;R&amp;D&quot; isn&#39;t&lt;/b&gt;"
        );
    }

    #[tokio::test]
    async fn test_model_manuscript_used() {
        let backend = ScriptedBackend::new(|_| {
            Ok(Completion::text(
                r#"{"manuscript": "<h1>SMRs</h1><p>Costs fall [1] and rise [3].</p>", "assumptions": ["Model assumption", "Historical patterns remain relevant for future predictions"], "overallConfidence": 0.81}"#,
            ))
        });
        let graph = fallback_graph("Are SMRs viable?");
        let results = results_for(&graph);

        let report = synthesize(
            &client(backend.clone()),
            &settings(),
            SynthesisInput {
                graph: &graph,
                results: &results,
                validations: vec![],
                contradictions: vec![],
            },
        )
        .await;

        assert_eq!(report.run_id, graph.run_id);
        assert!(report.manuscript_html.starts_with("<h1>SMRs</h1>"));
        assert_eq!(report.confidence, 0.81);
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.sources[1].id, "REF-3");
        assert_eq!(report.assumptions[0], "Model assumption");
        // model and collected assumptions deduplicated
        assert_eq!(report.assumptions.len(), 4);
        assert_eq!(report.tasks.len(), 5);

        let prompt = &backend.requests()[0].user_prompt;
        assert!(prompt.find("\"T1\"").unwrap() < prompt.find("\"T5\"").unwrap());
    }

    #[tokio::test]
    async fn test_zero_confidence_recomputed() {
        let backend = ScriptedBackend::new(|_| {
            Ok(Completion::text(
                r#"{"manuscript": "<p>x</p>", "assumptions": [], "overallConfidence": 0}"#,
            ))
        });
        let graph = fallback_graph("Q");
        let results = results_for(&graph);

        let report = synthesize(
            &client(backend),
            &settings(),
            SynthesisInput {
                graph: &graph,
                results: &results,
                validations: vec![],
                contradictions: vec![],
            },
        )
        .await;

        assert!((report.confidence - 0.72).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_manuscript_on_failure() {
        let graph = fallback_graph("Is <script> safe?");
        let results = results_for(&graph);

        let report = synthesize(
            &client(ScriptedBackend::failing()),
            &settings(),
            SynthesisInput {
                graph: &graph,
                results: &results,
                validations: vec![],
                contradictions: vec![],
            },
        )
        .await;

        let html = &report.manuscript_html;
        assert!(html.contains("<h1>Research Report: Is &lt;script&gt; safe?</h1>"));
        assert!(html.contains("<h2>Executive Summary</h2>"));
        assert!(html.contains("into 5 atomic tasks"));
        assert!(html.contains("<h3>T3: Evaluate Current State</h3>"));
        assert!(html.contains("range: 0.72 - 0.72"));
        assert!(html.contains("<h2>What Could Be Wrong</h2>"));
        assert!(!html.contains("<script>"));
        assert_eq!(report.assumptions.len(), 3);
        assert!(report.sources.is_empty());
        assert!((report.confidence - 0.72).abs() < 1e-9);
    }
}
