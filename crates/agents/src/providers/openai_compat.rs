//! Response parsing shared by OpenAI-compatible chat completion APIs.

use crate::model::Usage;

/// Visible assistant text from a chat completion payload.
///
/// Reads `choices[0].message.content`, drops `<think>` reasoning and trims.
/// Returns `None` when nothing visible is left.
#[must_use]
pub fn extract_text(payload: &serde_json::Value) -> Option<String> {
    let content = payload["choices"][0]["message"]["content"].as_str()?;
    let (visible, _thinking) = strip_think_tags(content);
    let visible = visible.trim();
    (!visible.is_empty()).then(|| visible.to_string())
}

/// Token usage from the payload's `usage` object (zeros when absent).
#[must_use]
pub fn parse_usage(payload: &serde_json::Value) -> Usage {
    let usage = &payload["usage"];
    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| usage[*k].as_u64())
            .map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
    };
    Usage {
        input_tokens: field(&["prompt_tokens", "input_tokens"]),
        output_tokens: field(&["completion_tokens", "output_tokens"]),
    }
}

/// Strip `<think>...</think>` tags from content, returning `(visible, thinking)`.
///
/// Reasoning models embed chain-of-thought inside `<think>` tags in the
/// `content` field. An unclosed `<think>` turns the rest into reasoning.
#[must_use]
pub fn strip_think_tags(content: &str) -> (String, String) {
    let mut visible = String::new();
    let mut thinking = String::new();
    let mut remaining = content;

    loop {
        match remaining.find("<think>") {
            Some(start) => {
                visible.push_str(&remaining[..start]);
                let after_open = &remaining[start + "<think>".len()..];
                match after_open.find("</think>") {
                    Some(end) => {
                        thinking.push_str(&after_open[..end]);
                        remaining = &after_open[end + "</think>".len()..];
                    },
                    None => {
                        thinking.push_str(after_open);
                        break;
                    },
                }
            },
            None => {
                visible.push_str(remaining);
                break;
            },
        }
    }

    (
        visible.trim_start().to_string(),
        thinking.trim_start().to_string(),
    )
}
