//! JSON repair for model output: strip code fences, fix single-quoted keys
//! and values, and as a last resort slice out the outermost object.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

static OPENING_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?P<pre>[:,\[{])\s*'"#).unwrap());
static CLOSING_QUOTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"'\s*(?P<post>[,\]}:])"#).unwrap());

/// Parse `text` as JSON, repairing the common ways models mangle it.
/// Returns `None` when nothing parseable can be recovered.
pub fn repair_and_parse(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str(text) {
        return Some(v);
    }

    let cleaned = strip_code_fences(text.trim());
    if let Ok(v) = serde_json::from_str(&cleaned) {
        return Some(v);
    }

    // single quotes around keys/values
    let requoted = OPENING_QUOTE.replace_all(&cleaned, r#"$pre "#.to_string() + "\"");
    let requoted = CLOSING_QUOTE.replace_all(&requoted, "\"$post");
    if let Ok(v) = serde_json::from_str(&requoted) {
        return Some(v);
    }

    // outermost `{…}` slice
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str(&cleaned[start..=end]) {
                return Some(v);
            }
        }
    }

    let preview: String = text.chars().take(200).collect();
    warn!(raw = %preview, "JSON repair failed");
    None
}

fn strip_code_fences(text: &str) -> String {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
        if let Some(rest) = cleaned.strip_prefix("json") {
            cleaned = rest;
        }
        if let Some(rest) = cleaned.strip_suffix("```") {
            cleaned = rest;
        }
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_passes_through() {
        let v = repair_and_parse(r#"{"vendor": "Siemens"}"#).unwrap();
        assert_eq!(v, json!({"vendor": "Siemens"}));
    }

    #[test]
    fn strips_code_fences_with_language_tag() {
        let text = "```json\n{\"vendor\": \"ABB\"}\n```";
        let v = repair_and_parse(text).unwrap();
        assert_eq!(v["vendor"], "ABB");
    }

    #[test]
    fn fixes_single_quoted_values() {
        let text = r#"{"vendor": 'Allen-Bradley', "part_number": '100-C09D10'}"#;
        let v = repair_and_parse(text).unwrap();
        assert_eq!(v["vendor"], "Allen-Bradley");
        assert_eq!(v["part_number"], "100-C09D10");
    }

    #[test]
    fn slices_object_out_of_surrounding_prose() {
        let text = "Here is what I found:\n{\"vendor\": \"Eaton\"}\nHope that helps!";
        let v = repair_and_parse(text).unwrap();
        assert_eq!(v["vendor"], "Eaton");
    }

    #[test]
    fn hopeless_input_returns_none() {
        assert!(repair_and_parse("I could not read the nameplate.").is_none());
    }
}
