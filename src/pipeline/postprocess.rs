//! Post-processing: recover the JSON object from the extraction reply.
//!
//! Even when told "return ONLY the JSON", models occasionally wrap the
//! object in ` ```json ... ``` ` fences or add a sentence before or after
//! it. These rules strip that packaging without touching the object itself.
//!
//! ## Rule Order
//!
//! 1. Strip invisible Unicode (BOM, zero-width spaces) that breaks `serde_json`
//! 2. Strip outer markdown fences
//! 3. Cut to the outermost `{ ... }` span, dropping surrounding prose

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all rules to the raw reply and return the JSON candidate.
pub fn extract_json_text(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = strip_code_fences(&s);
    outermost_object(&s).to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

// ── Rule 2: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 3: Cut to the outermost object ──────────────────────────────────────

fn outermost_object(input: &str) -> &str {
    match (input.find('{'), input.rfind('}')) {
        (Some(start), Some(end)) if start < end => &input[start..=end],
        _ => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_unchanged() {
        let s = r#"{"pagewise_line_items":[],"total_item_count":0}"#;
        assert_eq!(extract_json_text(s), s);
    }

    #[test]
    fn strips_json_fence() {
        let s = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_text(s), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence_with_crlf() {
        let s = "```\r\n{\"a\": 1}\r\n```\r\n";
        assert_eq!(extract_json_text(s), "{\"a\": 1}");
    }

    #[test]
    fn drops_surrounding_prose() {
        let s = "Here is the extracted data:\n{\"a\": {\"b\": 2}}\nLet me know if you need more.";
        assert_eq!(extract_json_text(s), "{\"a\": {\"b\": 2}}");
    }

    #[test]
    fn removes_bom() {
        assert_eq!(extract_json_text("\u{FEFF}{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn no_object_returns_trimmed_input() {
        assert_eq!(extract_json_text("  sorry, I cannot read this  "), "sorry, I cannot read this");
    }
}
