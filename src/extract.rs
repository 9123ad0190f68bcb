use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Highlight, HighlightCategory, Position};

/// A stateless pattern scanner over one message's text.
///
/// Implementations must report positions as byte offsets into `text` so that
/// the validator can slice the verbatim span back out. Extractors never
/// overlap-resolve; overlapping candidates from different extractors are all
/// retained and deduplication is left to downstream consumers.
pub trait SpanExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn scan(&self, text: &str, message_index: usize) -> Vec<Highlight>;
}

fn highlight_at(
    content: &str,
    category: HighlightCategory,
    confidence_score: f32,
    tags: &[&str],
    message_index: usize,
    start_offset: usize,
    end_offset: usize,
) -> Highlight {
    Highlight {
        content: content.to_string(),
        category,
        confidence_score,
        tags: tags.iter().map(|t| t.to_string()).collect(),
        notes: None,
        position: Position {
            message_index,
            start_offset,
            end_offset,
        },
    }
}

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").unwrap());

/// Finds fenced code regions (matched triple-backtick delimiters, non-greedy,
/// spanning newlines).
pub struct CodeExtractor;

impl SpanExtractor for CodeExtractor {
    fn name(&self) -> &'static str {
        "code"
    }

    fn scan(&self, text: &str, message_index: usize) -> Vec<Highlight> {
        FENCED_CODE
            .find_iter(text)
            .map(|m| {
                highlight_at(
                    m.as_str(),
                    HighlightCategory::Code,
                    0.9,
                    &["code"],
                    message_index,
                    m.start(),
                    m.end(),
                )
            })
            .collect()
    }
}

static ACTION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\b(?:todo|task|action|next step|future|plan)\b\s*:?\s*(.+)$").unwrap()
});

/// Finds imperative markers (bulleted, line-leading, or trailing a sentence
/// on the same line); the highlight is the remainder of the line after the
/// marker and its optional colon.
pub struct ActionItemExtractor;

impl SpanExtractor for ActionItemExtractor {
    fn name(&self) -> &'static str {
        "action_item"
    }

    fn scan(&self, text: &str, message_index: usize) -> Vec<Highlight> {
        ACTION_LINE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| {
                highlight_at(
                    m.as_str(),
                    HighlightCategory::ActionItem,
                    0.8,
                    &["action", "todo"],
                    message_index,
                    m.start(),
                    m.end(),
                )
            })
            .collect()
    }
}

static QUESTION_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?\n]+\?").unwrap());

/// Finds maximal runs of text up to and including a `?` with no earlier
/// sentence terminator. Only spans whose trimmed length is strictly between
/// 10 and 200 characters are kept.
///
/// Multiple questions on one line produce one span each, but a question
/// containing an embedded `.` or `!` is truncated at that terminator; this
/// imprecision is inherited from the greedy up-to-`?` heuristic.
pub struct QuestionExtractor;

impl SpanExtractor for QuestionExtractor {
    fn name(&self) -> &'static str {
        "question"
    }

    fn scan(&self, text: &str, message_index: usize) -> Vec<Highlight> {
        QUESTION_SPAN
            .find_iter(text)
            .filter(|m| {
                let len = m.as_str().trim().chars().count();
                len > 10 && len < 200
            })
            .map(|m| {
                highlight_at(
                    m.as_str(),
                    HighlightCategory::Question,
                    0.7,
                    &["question"],
                    message_index,
                    m.start(),
                    m.end(),
                )
            })
            .collect()
    }
}

/// The fixed extractor set for the deterministic fallback path, in the order
/// their output is merged per message.
pub fn fallback_extractors() -> Vec<Box<dyn SpanExtractor>> {
    vec![
        Box::new(CodeExtractor),
        Box::new(ActionItemExtractor),
        Box::new(QuestionExtractor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_extractor_fenced_block() {
        let text = "```print(1)```";
        let highlights = CodeExtractor.scan(text, 0);
        assert_eq!(highlights.len(), 1);
        let h = &highlights[0];
        assert_eq!(h.category, HighlightCategory::Code);
        assert_eq!(h.confidence_score, 0.9);
        assert!(h.tags.contains(&"code".to_string()));
        assert_eq!(h.content, "```print(1)```");
        assert_eq!(h.position.start_offset, 0);
        assert_eq!(h.position.end_offset, text.len());
    }

    #[test]
    fn test_code_extractor_multiline_non_greedy() {
        let text = "before\n```rust\nfn main() {}\n```\nmiddle\n```\nlet x = 1;\n```";
        let highlights = CodeExtractor.scan(text, 2);
        assert_eq!(highlights.len(), 2);
        assert!(highlights[0].content.contains("fn main"));
        assert!(highlights[1].content.contains("let x = 1;"));
        assert_eq!(highlights[0].position.message_index, 2);
    }

    #[test]
    fn test_code_extractor_unclosed_fence_ignored() {
        let highlights = CodeExtractor.scan("```fn dangling()", 0);
        assert!(highlights.is_empty());
    }

    #[test]
    fn test_action_item_extractor() {
        let text = "intro\nTODO: read more.\n- next step: ship it";
        let highlights = ActionItemExtractor.scan(text, 1);
        assert_eq!(highlights.len(), 2);
        assert_eq!(highlights[0].content, "read more.");
        assert_eq!(highlights[0].category, HighlightCategory::ActionItem);
        assert_eq!(highlights[0].confidence_score, 0.8);
        assert!(highlights[0].tags.contains(&"action".to_string()));
        assert!(highlights[0].tags.contains(&"todo".to_string()));
        assert_eq!(highlights[1].content, "ship it");
    }

    #[test]
    fn test_action_item_marker_after_sentence() {
        let text = "A closure is a function bundled with its lexical scope. TODO: read more.";
        let highlights = ActionItemExtractor.scan(text, 0);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].content, "read more.");
    }

    #[test]
    fn test_action_item_position_covers_remainder() {
        let text = "TODO: call the vendor";
        let highlights = ActionItemExtractor.scan(text, 0);
        assert_eq!(highlights.len(), 1);
        let p = highlights[0].position;
        assert_eq!(&text[p.start_offset..p.end_offset], "call the vendor");
    }

    #[test]
    fn test_question_extractor_bounds() {
        let highlights = QuestionExtractor.scan("What is a closure?", 0);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].content, "What is a closure?");
        assert_eq!(highlights[0].confidence_score, 0.7);

        // 10 chars trimmed: not strictly greater than 10, rejected.
        assert!(QuestionExtractor.scan("Why is it?", 0).is_empty());
        // Far too long, rejected.
        let long = format!("{}?", "y".repeat(220));
        assert!(QuestionExtractor.scan(&long, 0).is_empty());
    }

    #[test]
    fn test_question_extractor_stops_at_terminator() {
        let text = "This ends here. But would this part work?";
        let highlights = QuestionExtractor.scan(text, 0);
        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].content.trim(), "But would this part work?");
    }

    #[test]
    fn test_question_extractor_multiple_questions_per_line() {
        let text = "Should we use tokio here? Or is std::thread enough for now?";
        let highlights = QuestionExtractor.scan(text, 0);
        assert_eq!(highlights.len(), 2);
    }

    #[test]
    fn test_fallback_extractor_order() {
        let names: Vec<_> = fallback_extractors().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["code", "action_item", "question"]);
    }
}
