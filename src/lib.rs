//! Reconstruction of loosely structured AI-assistant transcripts and
//! extraction of ranked highlights with verifiable source positions.
//!
//! Data flows one way: raw text → [`detect`] → [`reconstruct`] →
//! [`Conversation`] → [`Classifier`] → validated [`AnalysisResult`].

pub mod classify;
pub mod config;
pub mod detect;
pub mod extract;
pub mod models;
pub mod oracle;
pub mod reconstruct;
pub mod validate;

pub use classify::{Classifier, ExtractionScope};
pub use config::{Config, get_config};
pub use detect::detect;
pub use models::{
    AnalysisResult, Conversation, Highlight, HighlightCategory, Message, Position, Role, SourceId,
};
pub use reconstruct::{reconstruct, reconstruct_as};
pub use validate::HighlightValidator;

/// Run the whole pipeline over raw transcript text.
pub async fn analyze(raw_text: &str, classifier: &Classifier) -> (Conversation, AnalysisResult) {
    let conversation = reconstruct(raw_text);
    let result = classifier.classify(&conversation).await;
    (conversation, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_analyze_end_to_end() {
        let raw = "User: What is a closure?\nAssistant: A closure captures its scope. TODO: read more.";
        let (conversation, result) = analyze(raw, &Classifier::new()).await;
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(result.highlights.len(), 2);

        // Round-trip position integrity over everything the pipeline accepted.
        for h in &result.highlights {
            let message = &conversation.messages[h.position.message_index];
            let span = &message.text[h.position.start_offset..h.position.end_offset];
            assert_eq!(span.trim(), h.content.trim());
            assert!(h.confidence_score >= 0.0 && h.confidence_score <= 1.0);
        }
    }
}
