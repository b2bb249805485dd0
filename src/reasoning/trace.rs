use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Spacing between synthetic timestamps of consecutive trace lines
const TRACE_STEP_MS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceKind {
    Thought,
    Action,
    Validate,
    Error,
}

impl std::fmt::Display for TraceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceKind::Thought => write!(f, "THOUGHT"),
            TraceKind::Action => write!(f, "ACTION"),
            TraceKind::Validate => write!(f, "VALIDATE"),
            TraceKind::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of a subagent's reasoning trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: TraceKind,
    pub text: String,
}

impl TraceEntry {
    pub fn new(timestamp: DateTime<Utc>, kind: TraceKind, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            text: text.into(),
        }
    }
}

/// Classify a single line of thinking text by keyword
pub fn classify_line(line: &str) -> TraceKind {
    let lower = line.to_lowercase();

    if lower.starts_with("action:") || lower.starts_with('>') || lower.contains("search") {
        TraceKind::Action
    } else if lower.starts_with("validate:")
        || lower.contains("verify")
        || lower.contains("confidence")
    {
        TraceKind::Validate
    } else if lower.starts_with("error:")
        || lower.contains("fail")
        || lower.contains("error")
        || lower.contains("unable")
    {
        TraceKind::Error
    } else {
        TraceKind::Thought
    }
}

/// Turn raw thinking text into trace entries stamped from now.
///
/// Returns an empty trace for blank input; callers supply their own fallback.
pub fn parse_trace(thinking: &str) -> Vec<TraceEntry> {
    parse_trace_at(thinking, Utc::now())
}

pub fn parse_trace_at(thinking: &str, base: DateTime<Utc>) -> Vec<TraceEntry> {
    thinking
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            TraceEntry::new(
                base + Duration::milliseconds(index as i64 * TRACE_STEP_MS),
                classify_line(line),
                line,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_thinking_yields_empty_trace() {
        assert!(parse_trace("").is_empty());
        assert!(parse_trace("  \n\n \t").is_empty());
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_line("> querying market data"), TraceKind::Action);
        assert_eq!(classify_line("Search for SMR deployments"), TraceKind::Action);
        assert_eq!(classify_line("Let me verify the cost figures"), TraceKind::Validate);
        assert_eq!(classify_line("Confidence is moderate"), TraceKind::Validate);
        assert_eq!(classify_line("Unable to find 2023 data"), TraceKind::Error);
        assert_eq!(classify_line("The lookup failed"), TraceKind::Error);
        assert_eq!(classify_line("Consider the regulatory angle"), TraceKind::Thought);
    }

    #[test]
    fn test_timestamps_increase_monotonically() {
        let base = Utc::now();
        let trace = parse_trace_at("first\n\nsecond\nthird", base);

        assert_eq!(trace.len(), 3);
        assert_eq!(trace[0].timestamp, base);
        assert!(trace.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(trace[1].text, "second");
    }

    #[test]
    fn test_kind_serializes_uppercase() {
        let json = serde_json::to_string(&TraceKind::Validate).unwrap();
        assert_eq!(json, "\"VALIDATE\"");
    }
}
