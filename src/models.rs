use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Speaker of a single utterance.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Short display name for output (User, AI, Sys)
    pub fn short_name(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "AI",
            Role::System => "Sys",
        }
    }
}

/// Recognized transcript dialects. `Custom` is the catch-all for input with
/// no dialect fingerprint.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    ChatGpt,
    Claude,
    Gemini,
    Copilot,
    Custom,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::ChatGpt,
        SourceId::Claude,
        SourceId::Gemini,
        SourceId::Copilot,
        SourceId::Custom,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::ChatGpt => "ChatGPT",
            SourceId::Claude => "Claude",
            SourceId::Gemini => "Gemini",
            SourceId::Copilot => "Copilot",
            SourceId::Custom => "Custom",
        }
    }
}

/// One utterance of a reconstructed conversation.
///
/// `text` is verbatim, trimmed only at message-boundary time; internal
/// newlines are preserved. Empty accumulations are dropped during
/// reconstruction, so `text` is never empty inside a [`Conversation`].
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: None,
            metadata: HashMap::new(),
        }
    }
}

/// A reconstructed dialogue. Message order is the order of appearance in the
/// raw input and is never changed after construction.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub title: String,
    pub source: SourceId,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Conversation {
    pub fn role_count(&self, role: Role) -> usize {
        self.messages.iter().filter(|m| m.role == role).count()
    }

    /// All message text joined with newlines, for whole-transcript scans.
    pub fn full_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Semantic category of an extracted span.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HighlightCategory {
    Code,
    Insight,
    ActionItem,
    Resource,
    Question,
    Other,
}

impl HighlightCategory {
    /// Lenient parse for labels coming back from the oracle. Unknown labels
    /// map to `Other` rather than invalidating the whole response.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "code" => HighlightCategory::Code,
            "insight" => HighlightCategory::Insight,
            "action_item" | "action item" | "action" => HighlightCategory::ActionItem,
            "resource" => HighlightCategory::Resource,
            "question" => HighlightCategory::Question,
            _ => HighlightCategory::Other,
        }
    }
}

/// Back-reference into the source conversation's message list. Offsets are
/// byte offsets into `Message::text`; the validator enforces
/// `0 <= start_offset < end_offset <= text.len()` and char-boundary safety.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub message_index: usize,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// One extracted span of interest.
///
/// Produced transiently by extractors or the oracle; only instances that
/// survive [`crate::validate::HighlightValidator::validate`] reach callers.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Highlight {
    pub content: String,
    pub category: HighlightCategory,
    pub confidence_score: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub position: Position,
}

/// The classifier's output bundle. Produced once per conversation and never
/// mutated; re-invoking the pipeline recomputes it.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AnalysisResult {
    pub highlights: Vec<Highlight>,
    pub summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
}
