//! PyON to JSON normalization.
//!
//! The Folding@home command server answers `slot-info` and `queue-info`
//! with Python-literal documents:
//!
//! ```text
//! PyON 1 slots
//! [{"id": "00", "status": "RUNNING", "idle": False}]
//! ---
//! ```
//!
//! [`normalize_pyon`] rewrites such a reply into
//! `{"slots": [{"id": "00", "status": "RUNNING", "idle": false}]}`.
//! Literals are rewritten only outside string values, so a slot description
//! containing the word `True` is left alone.

use serde_json::Value;

use crate::error::DecodeError;

/// Block names that become top-level keys.
const KNOWN_BLOCKS: &[&str] = &["slots", "units"];

/// Trailer the server prints before its prompt.
const TRAILER: &str = "---";

/// Rewrites one PyON reply frame into a JSON object document.
///
/// Already normalized input is returned unchanged (modulo surrounding
/// whitespace), so applying this twice is the same as applying it once.
pub fn normalize_pyon(raw: &str) -> String {
    let body = strip_trailer(raw);
    let rewritten = rewrite_tokens(body);
    let trimmed = rewritten.trim();

    if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        format!("{{\n{trimmed}\n}}")
    }
}

/// Normalizes a frame and parses it as JSON.
pub fn decode_pyon(frame: &[u8]) -> Result<Value, DecodeError> {
    let text = String::from_utf8_lossy(frame);
    let json = normalize_pyon(&text);
    Ok(serde_json::from_str(&json)?)
}

/// Drops the `---` trailer and any prompt character left on the frame.
fn strip_trailer(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_suffix('>') {
        text = rest.trim_end();
    }
    if let Some(rest) = text.strip_suffix(TRAILER) {
        text = rest;
    }
    text.trim()
}

/// Single pass over the text, tracking whether we are inside a string.
fn rewrite_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut rest = text;
    let mut in_string = false;

    while let Some(c) = rest.chars().next() {
        if in_string {
            match c {
                '\\' => {
                    // Copy the escape and the escaped character untouched.
                    let len = rest
                        .char_indices()
                        .nth(2)
                        .map(|(i, _)| i)
                        .unwrap_or(rest.len());
                    out.push_str(&rest[..len]);
                    rest = &rest[len..];
                    continue;
                }
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            rest = &rest[1..];
        } else if let Some(after) = rest.strip_prefix("\\n") {
            out.push('\n');
            rest = after;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            let word = &rest[..len];
            rest = &rest[len..];

            if word == "PyON" {
                if let Some((key, after)) = block_header(rest) {
                    out.push('"');
                    out.push_str(key);
                    out.push_str("\":");
                    rest = after;
                    continue;
                }
            }
            out.push_str(literal(word));
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

/// Parses the remainder of a `PyON <version> <name>` header line.
///
/// Returns the block name and the text after the header line, or `None` if
/// the name is not one of [`KNOWN_BLOCKS`].
fn block_header(rest: &str) -> Option<(&'static str, &str)> {
    // The header line may end in a real newline or an escaped one.
    let line_end = [rest.find('\n'), rest.find("\\n")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    let mut fields = rest[..line_end].split_whitespace();
    let version = fields.next()?;
    if !version.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let name = fields.next()?;
    if fields.next().is_some() {
        return None;
    }
    let key = KNOWN_BLOCKS.iter().copied().find(|block| *block == name)?;
    Some((key, &rest[line_end..]))
}

fn literal(word: &str) -> &str {
    match word {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOTS_FRAME: &str = "\nPyON 1 slots\n[\n  {\n    \"id\": \"00\",\n    \"status\": \"RUNNING\",\n    \"description\": \"cpu:15\",\n    \"options\": {},\n    \"reason\": \"\",\n    \"idle\": False\n  }\n]\n---\n";

    #[test]
    fn test_slots_frame_becomes_json() {
        let value = decode_pyon(SLOTS_FRAME.as_bytes()).unwrap();
        assert_eq!(value["slots"][0]["id"], "00");
        assert_eq!(value["slots"][0]["idle"], false);
    }

    #[test]
    fn test_units_header() {
        let value = decode_pyon(b"PyON 1 units\n[{\"id\": \"01\", \"slot\": \"00\"}]\n---\n").unwrap();
        assert_eq!(value["units"][0]["slot"], "00");
    }

    #[test]
    fn test_literals_replaced_outside_strings() {
        let out = normalize_pyon("PyON 1 slots\n[{\"a\": True, \"b\": False, \"c\": None}]\n---\n");
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["slots"][0]["a"], true);
        assert_eq!(value["slots"][0]["b"], false);
        assert!(value["slots"][0]["c"].is_null());
    }

    #[test]
    fn test_literals_inside_strings_untouched() {
        let out = normalize_pyon(
            "PyON 1 slots\n[{\"description\": \"True False None PyON 1 units\", \"idle\": True}]\n---",
        );
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["slots"][0]["description"], "True False None PyON 1 units");
        assert_eq!(value["slots"][0]["idle"], true);
    }

    #[test]
    fn test_identifiers_containing_literals_untouched() {
        let out = normalize_pyon("PyON 1 slots\n[{\"x\": 1}]\nTrueish\n");
        assert!(out.contains("Trueish"));
    }

    #[test]
    fn test_escaped_quote_keeps_string_state() {
        let out = normalize_pyon("PyON 1 slots\n[{\"d\": \"say \\\"True\\\"\", \"idle\": False}]\n---\n");
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["slots"][0]["d"], "say \"True\"");
        assert_eq!(value["slots"][0]["idle"], false);
    }

    #[test]
    fn test_escaped_newlines_outside_strings_are_unescaped() {
        let out = normalize_pyon("PyON 1 units\\n[]\\n---");
        let value: Value = serde_json::from_str(&out).unwrap();
        assert!(value["units"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_escaped_newlines_inside_strings_survive() {
        let out = normalize_pyon("PyON 1 units\n[{\"error\": \"line1\\nline2\"}]\n---\n");
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["units"][0]["error"], "line1\nline2");
    }

    #[test]
    fn test_trailer_and_prompt_removed() {
        let out = normalize_pyon("PyON 1 units\n[]\n---\n> ");
        assert!(!out.contains("---"));
        assert!(!out.contains('>'));
        assert!(serde_json::from_str::<Value>(&out).is_ok());
    }

    #[test]
    fn test_unknown_header_left_alone() {
        let out = normalize_pyon("PyON 1 options\n{}\n---\n");
        assert!(out.contains("PyON 1 options"));
        assert!(serde_json::from_str::<Value>(&out).is_err());
    }

    #[test]
    fn test_idempotent() {
        for input in [
            SLOTS_FRAME,
            "PyON 1 units\n[{\"id\": \"01\", \"ok\": True}]\n---\n",
            "{\"slots\": []}",
            "",
        ] {
            let once = normalize_pyon(input);
            assert_eq!(normalize_pyon(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn test_already_normalized_json_passes_through() {
        let json = r#"{"slots": [{"id": "00", "idle": false}]}"#;
        assert_eq!(normalize_pyon(json), json);
    }

    #[test]
    fn test_non_utf8_frame_is_tolerated() {
        let mut frame = b"PyON 1 slots\n[{\"description\": \"".to_vec();
        frame.push(0xff);
        frame.extend_from_slice(b"\"}]\n---\n");
        let value = decode_pyon(&frame).unwrap();
        assert!(value["slots"][0]["description"].is_string());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(decode_pyon(b"not pyon at all ["), Err(DecodeError::Json(_))));
    }
}
