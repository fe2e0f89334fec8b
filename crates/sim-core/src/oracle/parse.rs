//! Reply Extraction
//!
//! Models wrap JSON in prose or code fences. Candidates are tried in order:
//! fenced block, first balanced object, whole text.

use serde::de::DeserializeOwned;

/// Returns the body of the first ``` fenced block, if any.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip an optional language tag on the fence line
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Returns the first balanced `{...}` span, respecting JSON strings.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Candidate JSON spans in priority order, deduplicated.
pub fn candidates(text: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::with_capacity(3);
    for candidate in [fenced_block(text), balanced_object(text), Some(text.trim())]
        .into_iter()
        .flatten()
    {
        if !candidate.is_empty() && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Decodes the first candidate that deserializes as `T`.
pub fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let mut last_error = String::from("reply contained no JSON");
    for candidate in candidates(text) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::request::ReactReply;

    #[test]
    fn test_plain_json() {
        let reply: ReactReply = parse_reply(r#"{"reaction":"Battle"}"#).unwrap();
        assert_eq!(reply.reaction, "Battle");
    }

    #[test]
    fn test_fenced_json() {
        let text = "Sure, here you go:\n```json\n{\"reaction\": \"Escape\", \"thinking\": \"run\"}\n```\nGood luck.";
        let reply: ReactReply = parse_reply(text).unwrap();
        assert_eq!(reply.reaction, "Escape");
        assert_eq!(reply.thinking, "run");
    }

    #[test]
    fn test_object_inside_prose_with_braces_in_strings() {
        let text = r#"I think {"reaction": "Accept", "thinking": "a } brace"} is best"#;
        let reply: ReactReply = parse_reply(text).unwrap();
        assert_eq!(reply.thinking, "a } brace");
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_reply::<ReactReply>("no idea").is_err());
        assert!(parse_reply::<ReactReply>("{\"unrelated\": 1}").is_err());
        assert!(parse_reply::<ReactReply>("{ unbalanced").is_err());
    }
}
