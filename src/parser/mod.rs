//! Parsing of model responses: tagged code blocks and the two-part
//! reflection format (one JSON line, then tagged code).

use std::sync::OnceLock;

use regex::Regex;

pub const OPEN_TAG: &str = "<execute_script>";
pub const CLOSE_TAG: &str = "</execute_script>";

/// Placeholder used when the reflection JSON parses but carries no feedback.
const NO_FEEDBACK: &str = "No feedback provided.";

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<execute_script>(.*?)</execute_script>").expect("valid tag regex")
    })
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_-]*\s*|\s*```$").expect("valid fence regex"))
}

fn brace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*?\}").expect("valid brace regex"))
}

/// Outcome of searching raw model text for a tagged code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Code(String),
    EmptyBlock,
    NoTags,
}

/// Searches `text` for a `<execute_script>` block. Content is trimmed;
/// whitespace-only content counts as an empty block, not as code.
pub fn extract_code(text: &str) -> Extraction {
    match tag_re().captures(text) {
        None => Extraction::NoTags,
        Some(caps) => {
            let code = caps[1].trim();
            if code.is_empty() {
                Extraction::EmptyBlock
            } else {
                Extraction::Code(code.to_string())
            }
        }
    }
}

/// Strips leading/trailing Markdown fences (with or without a language hint)
/// and wraps the remainder in script tags unless they are already present.
/// Idempotent.
pub fn ensure_script_tags(text: &str) -> String {
    let stripped = fence_re().replace_all(text.trim(), "");
    let stripped = stripped.trim();
    if stripped.contains(OPEN_TAG) {
        stripped.to_string()
    } else {
        format!("{OPEN_TAG}\n{stripped}\n{CLOSE_TAG}")
    }
}

/// Parses the reflector's two-part response into (feedback, tagged code).
///
/// Feedback: line 1 as JSON; on failure the first `{...}` span anywhere in
/// the content (non-greedy, spanning newlines); on failure a synthesized
/// diagnostic. Code: tag search over the whole content, independent of the
/// JSON outcome; absent code becomes an empty tagged block so the executor
/// reports it as present-but-empty downstream.
pub fn parse_reflection(content: &str) -> (String, String) {
    let first_line = content.trim().lines().next().unwrap_or("").trim();
    let parsed: serde_json::Value = match serde_json::from_str(first_line) {
        Ok(value) => value,
        Err(line_err) => match brace_re().find(content) {
            // First brace pair wins, even when the code block holds a brace
            // literal before the real JSON. Kept for wire compatibility.
            Some(m) => serde_json::from_str(m.as_str()).unwrap_or_else(|scan_err| {
                serde_json::json!({ "feedback": format!("Failed to parse JSON: {scan_err}") })
            }),
            None => serde_json::json!({ "feedback": format!("Failed to find JSON: {line_err}") }),
        },
    };

    let body = match extract_code(content) {
        Extraction::Code(code) => code,
        Extraction::EmptyBlock | Extraction::NoTags => String::new(),
    };
    let tagged = ensure_script_tags(&body);

    let feedback = parsed
        .get("feedback")
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
        .unwrap_or_else(|| NO_FEEDBACK.to_string())
        .trim()
        .to_string();

    (feedback, tagged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(code: &str) -> String {
        format!("{OPEN_TAG}\n{code}\n{CLOSE_TAG}")
    }

    #[test]
    fn extracts_code_between_tags() {
        let text = "<execute_script>print(\"hi\")</execute_script>";
        assert_eq!(
            extract_code(text),
            Extraction::Code("print(\"hi\")".to_string())
        );
    }

    #[test]
    fn extracts_and_trims_multiline_code() {
        let text = "prose before\n<execute_script>\n  let x = 1 + 1;\n</execute_script>\nafter";
        assert_eq!(
            extract_code(text),
            Extraction::Code("let x = 1 + 1;".to_string())
        );
    }

    #[test]
    fn whitespace_only_block_is_empty() {
        assert_eq!(
            extract_code("<execute_script>   \n   </execute_script>"),
            Extraction::EmptyBlock
        );
    }

    #[test]
    fn missing_tags_reported() {
        assert_eq!(extract_code("let x = 1;"), Extraction::NoTags);
    }

    #[test]
    fn ensure_tags_wraps_bare_code() {
        assert_eq!(ensure_script_tags("let x = 1;"), tagged("let x = 1;"));
    }

    #[test]
    fn ensure_tags_strips_fences_with_language_hint() {
        assert_eq!(
            ensure_script_tags("```rhai\nlet x = 1;\n```"),
            tagged("let x = 1;")
        );
    }

    #[test]
    fn ensure_tags_is_idempotent() {
        let inputs = [
            "let x = 1;",
            "```\nlet x = 1;\n```",
            "<execute_script>\nlet x = 1;\n</execute_script>",
            "",
        ];
        for input in inputs {
            let once = ensure_script_tags(input);
            assert_eq!(ensure_script_tags(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn parses_well_formed_reflection() {
        let content = format!("{{\"feedback\": \"ok\"}}\n{}", tagged("let c = 1;"));
        let (feedback, code) = parse_reflection(&content);
        assert_eq!(feedback, "ok");
        assert_eq!(code, tagged("let c = 1;"));
    }

    #[test]
    fn bad_first_line_still_extracts_code_with_diagnostic() {
        let content = format!("not json\n{}", tagged("let c = 1;"));
        let (feedback, code) = parse_reflection(&content);
        assert!(feedback.contains("Failed to find JSON"));
        assert!(!feedback.is_empty());
        assert_eq!(code, tagged("let c = 1;"));
    }

    #[test]
    fn falls_back_to_first_brace_span_anywhere() {
        let content = format!(
            "Here is my critique.\n{{\"feedback\": \"needs a legend\"}}\n{}",
            tagged("let c = 1;")
        );
        let (feedback, _) = parse_reflection(&content);
        assert_eq!(feedback, "needs a legend");
    }

    #[test]
    fn brace_literal_in_code_shadows_later_json() {
        // Inherited wire-format ambiguity: the first {...} span wins even if
        // it is a map literal inside the code block.
        let content = format!(
            "oops\n{}\n{{\"feedback\": \"real one\"}}",
            tagged("let m = #{a: 1};")
        );
        let (feedback, _) = parse_reflection(&content);
        assert!(feedback.contains("Failed to parse JSON"));
    }

    #[test]
    fn missing_feedback_key_uses_placeholder() {
        let content = format!("{{\"comment\": \"x\"}}\n{}", tagged("let c = 1;"));
        let (feedback, _) = parse_reflection(&content);
        assert_eq!(feedback, "No feedback provided.");
    }

    #[test]
    fn missing_code_becomes_empty_tagged_block() {
        let (feedback, code) = parse_reflection("{\"feedback\": \"no code though\"}");
        assert_eq!(feedback, "no code though");
        assert_eq!(extract_code(&code), Extraction::EmptyBlock);
    }

    #[test]
    fn feedback_is_trimmed() {
        let content = format!("{{\"feedback\": \"  padded  \"}}\n{}", tagged("let c = 1;"));
        let (feedback, _) = parse_reflection(&content);
        assert_eq!(feedback, "padded");
    }
}
