//! Turns raw provider text into a `GeneratedPost`. Providers are asked for
//! JSON but do not always comply, so parsing degrades in steps: strict JSON,
//! the outermost `{...}` slice, field-level regexes, then a plain markdown
//! reading of the answer.

use ab_core::{ArticleRecord, Error, GeneratedPost, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::prompt::truncate_chars;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap();
    static ref TITLE_FIELD: Regex = Regex::new(r#""title"\s*:\s*"((?:[^"\\]|\\.)*)""#).unwrap();
    static ref CONTENT_FIELD: Regex = Regex::new(r#"(?s)"content"\s*:\s*"((?:[^"\\]|\\.)*)"#).unwrap();
    static ref TAGS_FIELD: Regex = Regex::new(r#"(?s)"tags"\s*:\s*\[(.*?)\]"#).unwrap();
    static ref QUOTED: Regex = Regex::new(r#""((?:[^"\\]|\\.)*)""#).unwrap();
    static ref HEADING: Regex = Regex::new(r"(?m)^[ \t]*(?:#{1,3}[ \t]+|\*\*)?(?:Title:[ \t]*)?(.+?)(?:\*\*)?[ \t]*$").unwrap();
}

const META_DESCRIPTION_CHARS: usize = 160;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPost {
    title: Option<String>,
    content: Option<String>,
    tags: Option<Value>,
    categories: Option<Value>,
    keywords: Option<Value>,
    meta_description: Option<String>,
    relevant_to_niche: Option<bool>,
}

/// Builds a post from a provider answer. Fails only when no body can be
/// recovered or the provider marked the article as off-topic.
pub fn parse_post(raw: &str, article: &ArticleRecord, provider: &str) -> Result<GeneratedPost> {
    let (fields, degraded) = match parse_json(raw) {
        Some(fields) => (fields, false),
        None => {
            warn!("⚠️ {} answer for {} was not valid JSON, extracting fields", provider, article.url);
            (extract_fields(raw)?, true)
        }
    };

    if fields.relevant_to_niche == Some(false) {
        return Err(Error::Generation(format!("{} marked the article as off-topic", provider)));
    }

    let content = fields.content.as_deref().map(str::trim).unwrap_or_default();
    if content.is_empty() {
        return Err(Error::Generation(format!("{} returned no content", provider)));
    }

    let title = fields
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(article.title.as_str())
        .to_string();

    let meta_description = fields
        .meta_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let fallback = if article.summary.trim().is_empty() {
                article.body_text()
            } else {
                article.summary.as_str()
            };
            truncate_chars(fallback.trim(), META_DESCRIPTION_CHARS).trim().to_string()
        });

    Ok(GeneratedPost {
        article: article.clone(),
        title,
        content: content.to_string(),
        tags: string_list(fields.tags.as_ref()),
        categories: string_list(fields.categories.as_ref()),
        keywords: string_list(fields.keywords.as_ref()),
        meta_description,
        image: None,
        degraded,
        provider: provider.to_string(),
    })
}

/// True when the answer parses as the requested JSON object without any
/// heuristics.
pub fn is_structured(raw: &str) -> bool {
    parse_json(raw).is_some()
}

fn parse_json(raw: &str) -> Option<RawPost> {
    let trimmed = raw.trim();
    let fenced = FENCE.captures(trimmed).and_then(|c| c.get(1)).map(|m| m.as_str().trim());

    for candidate in [Some(trimmed), fenced, outer_object(trimmed)].into_iter().flatten() {
        if let Ok(post) = serde_json::from_str::<RawPost>(candidate) {
            return Some(post);
        }
    }
    None
}

fn outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn extract_fields(raw: &str) -> Result<RawPost> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::Generation("empty answer".to_string()));
    }

    if let Some(content) = CONTENT_FIELD.captures(text).and_then(|c| c.get(1)) {
        let title = TITLE_FIELD
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str()));
        let tags = TAGS_FIELD.captures(text).and_then(|c| c.get(1)).map(|m| {
            Value::Array(
                QUOTED
                    .captures_iter(m.as_str())
                    .filter_map(|c| c.get(1))
                    .map(|t| Value::String(unescape(t.as_str())))
                    .collect(),
            )
        });
        return Ok(RawPost {
            title,
            content: Some(unescape(content.as_str())),
            tags,
            ..RawPost::default()
        });
    }

    // Broken JSON without a recoverable body.
    if text.starts_with('{') || text.starts_with("```") {
        return Err(Error::Generation("answer looks like JSON but has no content field".to_string()));
    }

    // Plain markdown: the first line is the title when it looks like one.
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    let rest = lines.collect::<Vec<_>>().join("\n");
    let looks_like_title =
        first.trim_start().starts_with('#') || first.trim_start().starts_with("Title:") || first.trim_start().starts_with("**");

    if looks_like_title && !rest.trim().is_empty() {
        let title = HEADING
            .captures(first)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());
        Ok(RawPost {
            title,
            content: Some(rest.trim().to_string()),
            ..RawPost::default()
        })
    } else {
        Ok(RawPost {
            content: Some(text.to_string()),
            ..RawPost::default()
        })
    }
}

/// JSON string unescaping that survives answers cut off mid-escape.
fn unescape(escaped: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", escaped)).unwrap_or_else(|_| {
        escaped
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
            .trim_end_matches('\\')
            .to_string()
    })
}

/// Accepts `["a", "b"]` or `"a, b"`.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
