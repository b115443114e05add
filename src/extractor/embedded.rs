//! Locating a JSON payload embedded in free-form backend prose.
//!
//! Convention: the payload sits in a fenced block opened at the start of a
//! line with ```` ```json ```` (any case) or a bare ```` ``` ```` whose body
//! starts with `{`, and closed with ```` ``` ````. The first qualifying block
//! wins.
//!
//! The payload ends where the JSON value ends, not at the first backtick run,
//! so string values may carry fenced code of their own.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Deserializer, Value};

fn opening_fence() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```[ \t]*(?P<lang>[A-Za-z0-9_-]*)[ \t]*\r?\n")
            .expect("opening fence pattern is valid")
    })
}

fn closing_fence() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*```[ \t]*\r?$").expect("closing fence pattern is valid")
    })
}

/// Body of the first fenced JSON block, if any
pub fn find_payload(text: &str) -> Option<&str> {
    let mut cursor = 0;

    while let Some(caps) = opening_fence().captures_at(text, cursor) {
        let opening = caps.get(0)?;
        let lang = caps.name("lang").map_or("", |m| m.as_str());
        let body = &text[opening.end()..];

        if let Some(payload) = block_payload(lang, body) {
            return Some(payload);
        }

        // Skip the rest of this block so its closing fence is not read as an opening
        let close = closing_fence().find(body)?;
        cursor = opening.end() + close.end();
    }

    None
}

fn block_payload<'a>(lang: &str, body: &'a str) -> Option<&'a str> {
    let labeled = lang.eq_ignore_ascii_case("json");
    if !labeled && !lang.is_empty() {
        return None;
    }

    let candidate = body.trim_start();
    if candidate.starts_with('{') {
        let mut values = Deserializer::from_str(candidate).into_iter::<Value>();
        if let Some(Ok(_)) = values.next() {
            let end = values.byte_offset();
            if candidate[end..].trim_start().starts_with("```") {
                return Some(&candidate[..end]);
            }
        }
    }

    // A labeled block that does not hold one clean value is still the
    // payload; parsing it later reports what is wrong
    if labeled {
        closing_fence().find(body).map(|close| body[..close.start()].trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_json_fence_in_prose() {
        let text = "Here is the result:\n```json\n{\"title\": \"x\"}\n```\nHope it helps.";
        assert_eq!(find_payload(text), Some("{\"title\": \"x\"}"));
    }

    #[test]
    fn test_skips_non_json_fences() {
        let text = "```markdown\n# not it\n```\n\n```JSON\n{\"a\": 1}\n```";
        assert_eq!(find_payload(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_bare_fence_with_object_accepted() {
        let text = "```\n{\"a\": 1}\n```";
        assert_eq!(find_payload(text), Some("{\"a\": 1}"));
        assert_eq!(find_payload("```\nplain\n```"), None);
    }

    #[test]
    fn test_first_block_wins() {
        let text = "```json\n{\"n\": 1}\n```\n```json\n{\"n\": 2}\n```";
        assert_eq!(find_payload(text), Some("{\"n\": 1}"));
    }

    #[test]
    fn test_code_block_inside_string_value() {
        let payload = r#"{"title":"T","sections":[{"heading":"H","content":"Run:\n```\ncargo run\n```"}]}"#;
        let text = format!("Result:\n```json\n{}\n```\n", payload);
        assert_eq!(find_payload(&text), Some(payload));

        let pretty = "```json\n{\n  \"content\": \"```\"\n}\n```";
        assert_eq!(find_payload(pretty), Some("{\n  \"content\": \"```\"\n}"));
    }

    #[test]
    fn test_inline_backticks_in_prose_are_not_fences() {
        let text = "Wrap ```inline``` here\n```json\n{\"a\": 1}\n```";
        assert_eq!(find_payload(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_broken_labeled_block_is_returned_for_reporting() {
        let text = "```json\n{\"a\": \n```";
        assert_eq!(find_payload(text), Some("{\"a\":"));
    }

    #[test]
    fn test_absent_or_unterminated() {
        assert_eq!(find_payload("{\"title\": \"naked json\"}"), None);
        assert_eq!(find_payload("```json\n{\"a\": 1}\n"), None);
    }
}
