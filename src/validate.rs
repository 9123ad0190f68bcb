use std::collections::HashSet;
use tracing::debug;

use crate::models::{Conversation, Highlight};

pub struct HighlightValidator;

impl HighlightValidator {
    /// Check that a highlight's claimed text matches the verbatim substring
    /// at its recorded position.
    ///
    /// A predicate, not a throwing check: out-of-range indices, inverted or
    /// overlong offsets and offsets that fall inside a UTF-8 sequence all
    /// return false. Comparison is on trimmed text, matching how message
    /// boundaries are trimmed during reconstruction.
    pub fn validate(highlight: &Highlight, conversation: &Conversation) -> bool {
        let Some(message) = conversation.messages.get(highlight.position.message_index) else {
            return false;
        };

        let start = highlight.position.start_offset;
        let end = highlight.position.end_offset;
        if start >= end || end > message.text.len() {
            return false;
        }

        let Some(span) = message.text.get(start..end) else {
            return false;
        };

        span.trim() == highlight.content.trim()
    }

    /// Augment tags from fixed content signatures, deduplicate them, and
    /// clamp the confidence score into [0.0, 1.0]. Idempotent.
    pub fn enhance(highlight: &mut Highlight) {
        let content = &highlight.content;
        let lower = content.to_lowercase();
        let mut extra: Vec<&str> = Vec::new();

        if content.contains("```") {
            extra.push("code");
        }
        if content.contains("http") {
            extra.push("link");
        }
        if content.contains('?') {
            extra.push("question");
        }
        if lower.contains("todo") || lower.contains("task") {
            extra.push("todo");
        }

        for tag in extra {
            highlight.tags.push(tag.to_string());
        }
        dedup_tags(&mut highlight.tags);

        highlight.confidence_score = highlight.confidence_score.clamp(0.0, 1.0);
    }

    /// Order-preserving batch pass: invalid highlights are dropped, survivors
    /// are enhanced.
    pub fn validate_and_enhance(
        highlights: Vec<Highlight>,
        conversation: &Conversation,
    ) -> Vec<Highlight> {
        let mut accepted = Vec::with_capacity(highlights.len());
        for mut highlight in highlights {
            if !Self::validate(&highlight, conversation) {
                debug!(
                    message_index = highlight.position.message_index,
                    start = highlight.position.start_offset,
                    end = highlight.position.end_offset,
                    "dropping highlight with mismatched position"
                );
                continue;
            }
            Self::enhance(&mut highlight);
            accepted.push(highlight);
        }
        accepted
    }
}

fn dedup_tags(tags: &mut Vec<String>) {
    let mut seen = HashSet::new();
    tags.retain(|tag| seen.insert(tag.clone()));
}
