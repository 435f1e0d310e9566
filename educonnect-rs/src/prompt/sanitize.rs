//! Strip markdown the transcript and the synthesizer can't render.

use std::sync::LazyLock;

use regex::Regex;

/// A fence line: markers at the start of a line with an optional language
/// tag, up to and including the line break.
static FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^```[A-Za-z0-9_+.#-]*[ \t]*\r?\n").expect("valid fence regex")
});

/// Remove code-fence markers and `**` emphasis, then trim.
///
/// Only the markers go; the text between them stays. A whole fence line is
/// dropped with its line break. Fences inside a line (```` ```Science``` ````)
/// are bare markers, so neither the word nor the following line break is
/// mistaken for a language tag.
pub fn sanitize_reply(raw: &str) -> String {
    let without_fence_lines = FENCE_LINE.replace_all(raw, "");
    without_fence_lines
        .replace("```", "")
        .replace("**", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_fence_and_bold() {
        assert_eq!(
            sanitize_reply("We offer **Math** and ```Science```."),
            "We offer Math and Science."
        );
    }

    #[test]
    fn test_inline_fence_before_line_break_keeps_break() {
        assert_eq!(
            sanitize_reply("We offer ```Science```\nand Math."),
            "We offer Science\nand Math."
        );
    }

    #[test]
    fn test_fenced_block_with_language_tag() {
        let raw = "Here is an example:\n```python\nprint('hi')\n```\nTry it!";
        assert_eq!(sanitize_reply(raw), "Here is an example:\nprint('hi')\nTry it!");
    }

    #[test]
    fn test_fenced_block_without_tag() {
        assert_eq!(sanitize_reply("```\n2 + 2 = 4\n```"), "2 + 2 = 4");
    }

    #[test]
    fn test_single_asterisk_and_backtick_survive() {
        assert_eq!(sanitize_reply("  *note* use `x`  "), "*note* use `x`");
    }

    #[test]
    fn test_plain_text_only_trimmed() {
        assert_eq!(sanitize_reply("\n  Photosynthesis converts light.  \n"), "Photosynthesis converts light.");
    }

    #[test]
    fn test_markers_only_becomes_empty() {
        assert_eq!(sanitize_reply("** ``` **"), "");
    }
}
