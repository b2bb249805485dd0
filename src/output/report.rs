use crate::error::OutputError;
use crate::research::{natural_task_key, ResearchReport, SubagentResult, ValidationResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Render a finished report as Markdown.
///
/// Deterministic for a given report: tasks are listed in natural id order and
/// no wall-clock time is embedded.
pub fn format_manuscript_as_markdown(report: &ResearchReport) -> String {
    let mut content = String::new();

    // Header
    content.push_str(&format!("# {}\n\n", report.question));
    content.push_str(&format!("**Run ID:** {}  \n", report.run_id));
    content.push_str(&format!(
        "**Overall Confidence:** {:.1}%  \n",
        report.confidence * 100.0
    ));
    content.push_str(&format!(
        "**Execution Time:** {:.1}s\n",
        report.execution_time_ms as f64 / 1000.0
    ));
    content.push_str("\n---\n\n");

    content.push_str("## Manuscript\n\n");
    content.push_str(&report.manuscript_html);
    content.push_str("\n\n---\n\n");

    content.push_str("## Key Assumptions\n\n");
    if report.assumptions.is_empty() {
        content.push_str("*None recorded*\n");
    } else {
        for assumption in &report.assumptions {
            content.push_str(&format!("- {}\n", assumption));
        }
    }
    content.push_str("\n---\n\n");

    content.push_str("## Potential Contradictions\n\n");
    if report.contradictions.is_empty() {
        content.push_str("*None detected*\n");
    } else {
        for c in &report.contradictions {
            content.push_str(&format!(
                "- **{} / {}:** {}\n",
                c.task_a, c.task_b, c.description
            ));
        }
    }
    content.push_str("\n---\n\n");

    if !report.sources.is_empty() {
        content.push_str("## Sources\n\n");
        for source in &report.sources {
            content.push_str(&format!("- `{}` {}\n", source.id, source.label));
        }
        content.push_str("\n---\n\n");
    }

    content.push_str("## Task Details\n\n");
    let mut tasks: Vec<&SubagentResult> = report.tasks.values().collect();
    tasks.sort_by_key(|r| natural_task_key(&r.task_id));

    let sections: Vec<String> = tasks
        .iter()
        .map(|result| {
            let validation = report
                .validation_results
                .iter()
                .find(|v| v.task_id == result.task_id);
            task_section(result, validation)
        })
        .collect();
    if sections.is_empty() {
        content.push_str("*No tasks executed*\n");
    } else {
        content.push_str(&sections.join("\n---\n\n"));
    }

    content.push_str("\n---\n\n*Generated by axiom*\n");
    content
}

fn task_section(result: &SubagentResult, validation: Option<&ValidationResult>) -> String {
    let title = if result.title.is_empty() {
        "Task Analysis"
    } else {
        result.title.as_str()
    };

    let mut section = format!("### {}: {}\n\n", result.task_id, title);
    section.push_str(result.output.trim());
    section.push_str("\n\n");
    section.push_str(&format!(
        "- **Confidence:** {:.1}%\n",
        result.confidence * 100.0
    ));
    section.push_str(&format!("- **Source Type:** {}\n", result.source_type));
    section.push_str(&format!(
        "- **Execution Time:** {}ms\n",
        result.execution_time_ms
    ));
    if result.fallback {
        section.push_str("- **Note:** fallback result, the reasoning service was unavailable\n");
    }

    if let Some(validation) = validation.filter(|v| !v.flags.is_empty()) {
        section.push_str("\n**Review Flags:**\n");
        for flag in &validation.flags {
            section.push_str(&format!("- [{}] {}", flag.severity, flag.message));
            if let Some(suggestion) = &flag.suggestion {
                section.push_str(&format!(" ({})", suggestion));
            }
            section.push('\n');
        }
    }

    section
}

/// Write `<runId>.md` and `<runId>.json` into `report_dir`; returns the Markdown path
pub fn write_report(report_dir: &Path, report: &ResearchReport) -> Result<PathBuf, OutputError> {
    fs::create_dir_all(report_dir).map_err(OutputError::CreateDir)?;

    let md_path = report_dir.join(format!("{}.md", report.run_id));
    fs::write(&md_path, format_manuscript_as_markdown(report)).map_err(OutputError::WriteReport)?;

    // Full report as JSON for downstream tooling
    let json_path = report_dir.join(format!("{}.json", report.run_id));
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&json_path, json).map_err(OutputError::WriteReport)?;

    Ok(md_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::TraceKind;
    use crate::research::{Contradiction, Severity, SourceType, TraceEntry, ValidationFlag};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn result(id: &str, confidence: f64) -> SubagentResult {
        SubagentResult {
            task_id: id.to_string(),
            title: format!("Task {}", id),
            output: format!("Output of {}", id),
            assumptions: vec![],
            confidence,
            source_type: SourceType::Factual,
            execution_time_ms: 1234,
            trace: vec![TraceEntry::new(
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                TraceKind::Thought,
                "start",
            )],
            fallback: false,
        }
    }

    fn report() -> ResearchReport {
        let mut tasks = BTreeMap::new();
        for (id, c) in [("T10", 0.5), ("T2", 0.9), ("T1", 0.8)] {
            tasks.insert(id.to_string(), result(id, c));
        }

        ResearchReport {
            run_id: "0x1A2B".to_string(),
            question: "Will SMRs be cost competitive?".to_string(),
            manuscript_html: "<h1>SMRs</h1><p>Maybe [1].</p>".to_string(),
            assumptions: vec!["Rates stay flat".to_string()],
            confidence: 0.734,
            sources: vec![],
            execution_time_ms: 4200,
            tasks,
            validation_results: vec![ValidationResult {
                task_id: "T2".to_string(),
                is_valid: false,
                flags: vec![ValidationFlag {
                    severity: Severity::Error,
                    message: "Unsupported claim".to_string(),
                    suggestion: Some("Cite a source".to_string()),
                }],
                confidence_downgrade: Some(0.1),
            }],
            contradictions: vec![Contradiction {
                task_a: "T1".to_string(),
                task_b: "T2".to_string(),
                terms: ("high".to_string(), "low".to_string()),
                description: "Potential contradiction: \"high\" vs \"low\" in related contexts"
                    .to_string(),
            }],
        }
    }

    #[test]
    fn test_markdown_sections() {
        let md = format_manuscript_as_markdown(&report());

        assert!(md.starts_with("# Will SMRs be cost competitive?\n"));
        assert!(md.contains("**Run ID:** 0x1A2B"));
        assert!(md.contains("**Overall Confidence:** 73.4%"));
        assert!(md.contains("<h1>SMRs</h1><p>Maybe [1].</p>"));
        assert!(md.contains("- Rates stay flat"));
        assert!(md.contains("- **T1 / T2:** Potential contradiction"));
        assert!(md.contains("- [error] Unsupported claim (Cite a source)"));
        assert!(md.contains("- **Execution Time:** 1234ms"));

        for id in ["T1", "T2", "T10"] {
            assert!(md.contains(&format!("### {}: Task {}", id, id)));
        }
    }

    #[test]
    fn test_markdown_orders_tasks_naturally() {
        let md = format_manuscript_as_markdown(&report());
        let t1 = md.find("### T1:").unwrap();
        let t2 = md.find("### T2:").unwrap();
        let t10 = md.find("### T10:").unwrap();
        assert!(t1 < t2 && t2 < t10);
    }

    #[test]
    fn test_manuscript_embedded_verbatim() {
        let mut r = report();
        r.manuscript_html = "\n  <pre>\n  indented\n</pre>\n\n".to_string();
        let md = format_manuscript_as_markdown(&r);
        assert!(md.contains("## Manuscript\n\n\n  <pre>\n  indented\n</pre>\n\n\n\n---"));
    }

    #[test]
    fn test_markdown_is_deterministic() {
        let r = report();
        assert_eq!(
            format_manuscript_as_markdown(&r),
            format_manuscript_as_markdown(&r)
        );
    }

    #[test]
    fn test_write_report_creates_both_files() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("reports");
        let r = report();

        let md_path = write_report(&out, &r).unwrap();
        assert_eq!(md_path, out.join("0x1A2B.md"));
        assert!(md_path.exists());

        let json = fs::read_to_string(out.join("0x1A2B.json")).unwrap();
        let parsed: ResearchReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_id, r.run_id);
        assert_eq!(parsed.tasks.len(), 3);
        assert_eq!(parsed.contradictions, r.contradictions);
    }
}
