//! Parsing of model-generated questions into the shared `Question` shape.

use coach_core::model::{TagName, option_label};
use serde_json::Value;

use crate::error::BackendError;

/// A question as returned by the text backend, before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuestion {
    pub stem: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub tags: Vec<TagName>,
    pub explanation: String,
}

fn invalid(reason: impl Into<String>) -> BackendError {
    BackendError::InvalidResponse(reason.into())
}

/// Pull the JSON object out of a model reply: a fenced block if present,
/// otherwise the outermost braces.
fn extract_json(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        let body_start = after.find('\n').map_or(0, |i| i + 1);
        let header = after[..body_start].trim();
        if header.is_empty() || header.eq_ignore_ascii_case("json") {
            let body = &after[body_start..];
            if let Some(end) = body.find("```") {
                return Some(body[..end].trim());
            }
        }
    }
    let open = raw.find('{')?;
    let close = raw.rfind('}')?;
    (close > open).then(|| &raw[open..=close])
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Options in order along with their letter keys.
fn parse_options(value: &Value) -> Result<Vec<(String, String)>, BackendError> {
    match value {
        Value::Object(map) => {
            let mut entries = map
                .iter()
                .map(|(key, v)| {
                    text_of(v)
                        .map(|text| (key.trim().to_ascii_uppercase(), text))
                        .ok_or_else(|| invalid(format!("option {key} is not text")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(entries)
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                text_of(v)
                    .map(|text| (option_label(i).to_string(), text))
                    .ok_or_else(|| invalid(format!("option {i} is not text")))
            })
            .collect(),
        _ => Err(invalid("options must be an object or an array")),
    }
}

fn parse_correct(value: &Value, options: &[(String, String)]) -> Result<usize, BackendError> {
    let index = match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| invalid("correct must be a non-negative index"))?,
        Value::String(s) => {
            let wanted = s.trim().trim_end_matches(['.', ')']).to_ascii_uppercase();
            options
                .iter()
                .position(|(key, _)| *key == wanted)
                .ok_or_else(|| invalid(format!("correct {s:?} names no option")))?
        }
        _ => return Err(invalid("correct must be a letter or an index")),
    };
    if index >= options.len() {
        return Err(invalid(format!(
            "correct index {index} out of range for {} options",
            options.len()
        )));
    }
    Ok(index)
}

fn parse_tags(value: Option<&Value>, fallback: &[TagName]) -> Vec<TagName> {
    let parsed: Vec<TagName> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(text_of)
            .filter_map(|t| TagName::new(t).ok())
            .collect(),
        Some(Value::String(s)) => TagName::new(s.as_str()).into_iter().collect(),
        _ => Vec::new(),
    };
    if parsed.is_empty() {
        fallback.to_vec()
    } else {
        parsed
    }
}

/// Parse a model reply into a `GeneratedQuestion`.
///
/// Missing or empty tags fall back to `fallback_tags`.
///
/// # Errors
///
/// Returns `BackendError::InvalidResponse` when no JSON object can be found,
/// a required field is missing, or the answer does not name an option.
pub fn parse_generated_question(
    raw: &str,
    fallback_tags: &[TagName],
) -> Result<GeneratedQuestion, BackendError> {
    let json = extract_json(raw).ok_or_else(|| invalid("no JSON object in response"))?;
    let value: Value = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| invalid("response is not a JSON object"))?;

    let field = |name: &str| {
        object
            .get(name)
            .ok_or_else(|| invalid(format!("missing field {name}")))
    };

    let stem = text_of(field("question")?)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("question must be non-empty text"))?;
    let options = parse_options(field("options")?)?;
    if options.len() < coach_core::model::MIN_OPTIONS {
        return Err(invalid("too few options"));
    }
    let correct_index = parse_correct(field("correct")?, &options)?;
    let explanation = text_of(field("explanation")?)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("explanation must be non-empty text"))?;
    let tags = parse_tags(object.get("tags"), fallback_tags);
    if tags.is_empty() {
        return Err(invalid("question has no tags"));
    }

    Ok(GeneratedQuestion {
        stem,
        options: options.into_iter().map(|(_, text)| text).collect(),
        correct_index,
        tags,
        explanation,
    })
}
