//! Recovery of structured JSON from loosely formatted model output

use crate::error::ParserError;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use tracing::debug;

/// Repair passes tried after the direct decode fails
const MAX_REPAIR_ATTEMPTS: usize = 2;

/// Decode `text` into `T`, repairing common wrapping on failure.
///
/// Order: direct decode, then with Markdown fences stripped, then each
/// balanced `{...}` or `[...]` span of the fence-stripped text in turn until
/// one decodes. A citation like `[1]` ahead of the payload is skipped.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, ParserError> {
    let mut last_error = match serde_json::from_str::<T>(text.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    let stripped = strip_code_fences(text);
    match serde_json::from_str::<T>(&stripped) {
        Ok(value) => {
            debug!("Recovered structured output after stripping fences");
            return Ok(value);
        }
        Err(e) => last_error = e.to_string(),
    }

    let mut spans = balanced_spans(&stripped).peekable();
    if spans.peek().is_none() {
        last_error = "no balanced JSON object or array found".to_string();
    }
    for span in spans {
        match serde_json::from_str::<T>(span) {
            Ok(value) => {
                debug!("Recovered structured output from an embedded span");
                return Ok(value);
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(ParserError::Unparsable {
        attempts: MAX_REPAIR_ATTEMPTS + 1,
        reason: last_error,
    })
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*").ok())
        .as_ref()
}

/// Remove every Markdown code fence marker, keeping the fenced content
pub fn strip_code_fences(s: &str) -> String {
    match fence_regex() {
        Some(re) => re.replace_all(s, "").trim().to_string(),
        None => s.replace("```", "").trim().to_string(),
    }
}

/// Every balanced JSON object or array, ordered by where it opens, respecting
/// string literals. Spans may nest.
fn balanced_spans<'a>(s: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let bytes = s.as_bytes();
    let mut search_from = 0;

    std::iter::from_fn(move || {
        while let Some(offset) = s[search_from..].find(['{', '[']) {
            let start = search_from + offset;
            search_from = start + 1;
            if let Some(end) = balanced_end(bytes, start) {
                return Some(&s[start..end]);
            }
        }
        None
    })
}

/// Byte index just past the bracket that closes the one at `start`
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
