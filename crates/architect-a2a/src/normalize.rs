//! Response normalization — one text value out of either agent reply shape
//!
//! Agent runtimes answer `message/send` with either a task carrying
//! artifacts or a bare message. Which one is decided by which fields are
//! present. Structured sections are pulled out of the text on a
//! best-effort basis and simply omitted when their markers are missing.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static HEADING: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").ok());

static BOLD_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\*\*([^*]+?):?\*\*:?\s*(.*)$").ok());

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^```\s*([A-Za-z0-9_-]*)").ok());

/// Bold labels rank below every markdown heading.
const LABEL_LEVEL: usize = 7;

const TEMPLATE_LANGUAGES: &[&str] = &["", "yaml", "yml", "json", "cloudformation"];

/// Text plus optional sections extracted from an agent reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<String>,
    /// Message of a JSON-RPC `error` member, when the runtime sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NormalizedResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Normalize a raw agent reply. Never fails and never touches `raw`.
pub fn normalize(raw: &Value) -> NormalizedResponse {
    let text = extract_text(raw);
    let error = raw.get("error").map(|e| {
        e.get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())
    });

    NormalizedResponse {
        template: extract_template(&text),
        overview: extract_section(&text, &["overview"]),
        review: extract_section(&text, &["well-architected", "review"]),
        cost: extract_section(&text, &["cost"]),
        error,
        text,
    }
}

/// Text of an artifact-shaped or message-shaped reply; `""` for anything else.
pub fn extract_text(raw: &Value) -> String {
    let payload = raw.get("result").unwrap_or(raw);

    if let Some(artifacts) = payload.get("artifacts").and_then(Value::as_array) {
        let mut found = false;
        let joined: Vec<String> = artifacts
            .iter()
            .map(|artifact| {
                let texts = text_parts(artifact.get("parts"));
                found |= !texts.is_empty();
                texts.concat()
            })
            .collect();
        if found {
            return joined.join("\n");
        }
    }

    let parts = payload
        .get("parts")
        .or_else(|| payload.pointer("/status/message/parts"));
    text_parts(parts).join("\n")
}

fn text_parts(parts: Option<&Value>) -> Vec<&str> {
    parts
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| {
                    let kind = part.get("kind").or_else(|| part.get("type"));
                    kind.and_then(Value::as_str) == Some("text")
                })
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// First fenced block that looks like a CloudFormation template.
pub fn extract_template(text: &str) -> Option<String> {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let Some(caps) = FENCE.as_ref().and_then(|re| re.captures(line.trim_start())) else {
            continue;
        };
        let language = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();

        let mut block = Vec::new();
        for inner in lines.by_ref() {
            if inner.trim_start().starts_with("```") {
                break;
            }
            block.push(inner);
        }

        if !TEMPLATE_LANGUAGES.contains(&language.as_str()) {
            continue;
        }
        let block = block.join("\n");
        if looks_like_template(&block) {
            return Some(block.trim().to_string());
        }
    }
    None
}

fn looks_like_template(block: &str) -> bool {
    block.contains("AWSTemplateFormatVersion")
        || block
            .lines()
            .any(|l| l.starts_with("Resources:") || l.trim_start().starts_with("\"Resources\""))
}

/// Body of the first heading or bold label whose title mentions a keyword.
///
/// Runs up to the next heading of the same or a higher level. Fenced code
/// is kept in the body but never treated as a heading.
pub fn extract_section(text: &str, keywords: &[&str]) -> Option<String> {
    let mut in_fence = false;
    let mut open: Option<(usize, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }

        let marker = if in_fence || trimmed.starts_with("```") {
            None
        } else {
            heading(trimmed)
        };

        if let Some((level, body)) = open.as_mut() {
            match marker {
                Some((next_level, _, _)) if next_level <= *level => return finish(body),
                _ => body.push(line),
            }
            continue;
        }

        if let Some((level, title, rest)) = marker {
            let title = title.to_ascii_lowercase();
            if keywords.iter().any(|k| title.contains(k)) {
                let mut body = Vec::new();
                if !rest.is_empty() {
                    body.push(rest);
                }
                open = Some((level, body));
            }
        }
    }

    open.and_then(|(_, body)| finish(&body))
}

/// `(level, title, inline rest)` of a heading or bold label line.
fn heading(line: &str) -> Option<(usize, &str, &str)> {
    if let Some(caps) = HEADING.as_ref().and_then(|re| re.captures(line)) {
        let level = caps.get(1)?.as_str().len();
        return Some((level, caps.get(2)?.as_str(), ""));
    }
    let caps = BOLD_LABEL.as_ref()?.captures(line)?;
    Some((LABEL_LEVEL, caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

fn finish(body: &[&str]) -> Option<String> {
    let body = body.join("\n");
    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}
