use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::detect::detect;
use crate::models::{Conversation, Message, Role, SourceId};

/// One role-prefix rule: a line matching `pattern` opens a new message with
/// `role`, seeded with the first capture group (the prefix-stripped rest).
struct RolePattern {
    role: Role,
    pattern: Regex,
}

impl RolePattern {
    fn new(role: Role, pattern: &str) -> Self {
        Self {
            role,
            pattern: Regex::new(pattern).unwrap(),
        }
    }
}

static CHATGPT_PATTERNS: Lazy<Vec<RolePattern>> = Lazy::new(|| {
    vec![
        RolePattern::new(Role::User, r"(?i)^\s*(?:you|user)\s*:\s*(.*)$"),
        RolePattern::new(Role::Assistant, r"(?i)^\s*(?:chatgpt|gpt|assistant)\s*:\s*(.*)$"),
        RolePattern::new(Role::System, r"(?i)^\s*system\s*:\s*(.*)$"),
    ]
});

static CLAUDE_PATTERNS: Lazy<Vec<RolePattern>> = Lazy::new(|| {
    vec![
        RolePattern::new(Role::User, r"(?i)^\s*(?:human|user|h)\s*:\s*(.*)$"),
        RolePattern::new(Role::Assistant, r"(?i)^\s*(?:claude|assistant|a)\s*:\s*(.*)$"),
        RolePattern::new(Role::System, r"(?i)^\s*system\s*:\s*(.*)$"),
    ]
});

static GEMINI_PATTERNS: Lazy<Vec<RolePattern>> = Lazy::new(|| {
    vec![
        RolePattern::new(Role::User, r"(?i)^\s*(?:you|user)\s*:\s*(.*)$"),
        RolePattern::new(
            Role::Assistant,
            r"(?i)^\s*(?:gemini|bard|model|assistant)\s*:\s*(.*)$",
        ),
        RolePattern::new(Role::System, r"(?i)^\s*system\s*:\s*(.*)$"),
    ]
});

static COPILOT_PATTERNS: Lazy<Vec<RolePattern>> = Lazy::new(|| {
    vec![
        RolePattern::new(Role::User, r"(?i)^\s*(?:you|user)\s*:\s*(.*)$"),
        RolePattern::new(Role::Assistant, r"(?i)^\s*(?:copilot|assistant)\s*:\s*(.*)$"),
        RolePattern::new(Role::System, r"(?i)^\s*system\s*:\s*(.*)$"),
    ]
});

/// Generic fallback patterns. Unlike the branded dialects these accept a
/// leading list bullet and a wider set of role aliases; the user-like,
/// assistant-like and system-like sets are tested in this fixed order and
/// the first hit wins.
static GENERIC_PATTERNS: Lazy<Vec<RolePattern>> = Lazy::new(|| {
    vec![
        RolePattern::new(
            Role::User,
            r"(?i)^\s*(?:[-*•]\s*)?(?:user|you|me|human|q)\s*[:>]\s*(.*)$",
        ),
        RolePattern::new(
            Role::Assistant,
            r"(?i)^\s*(?:[-*•]\s*)?(?:assistant|ai|bot|claude|chatgpt|gemini|copilot|a)\s*[:>]\s*(.*)$",
        ),
        RolePattern::new(
            Role::System,
            r"(?i)^\s*(?:[-*•]\s*)?(?:system|note)\s*[:>]\s*(.*)$",
        ),
    ]
});

fn patterns_for(source: SourceId) -> &'static [RolePattern] {
    match source {
        SourceId::ChatGpt => &CHATGPT_PATTERNS,
        SourceId::Claude => &CLAUDE_PATTERNS,
        SourceId::Gemini => &GEMINI_PATTERNS,
        SourceId::Copilot => &COPILOT_PATTERNS,
        SourceId::Custom => &GENERIC_PATTERNS,
    }
}

/// Local accumulator for one reconstruction pass. Speaker defaults to the
/// user until the first role prefix appears.
struct ReconstructState {
    role: Role,
    buffer: String,
}

impl ReconstructState {
    fn new() -> Self {
        Self {
            role: Role::User,
            buffer: String::new(),
        }
    }

    /// Emit the accumulated buffer as a message if it trims to something
    /// non-empty; empty accumulations are dropped, not emitted.
    fn flush(&mut self, messages: &mut Vec<Message>) {
        let text = strip_control_chars(&self.buffer);
        let text = text.trim();
        if !text.is_empty() {
            messages.push(Message::new(self.role, text));
        }
        self.buffer.clear();
    }
}

/// Downstream renderers consume message text as plain strings; control
/// characters other than newline and tab are dropped at flush time.
fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

fn match_role_prefix<'a>(line: &'a str, patterns: &[RolePattern]) -> Option<(Role, &'a str)> {
    for rp in patterns {
        if let Some(caps) = rp.pattern.captures(line) {
            let rest = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            return Some((rp.role, rest));
        }
    }
    None
}

/// Single-pass line scan: flush the running buffer whenever a role prefix
/// opens a new speaker turn, otherwise append the raw line (internal
/// newlines preserved).
fn reconstruct_messages(raw_text: &str, patterns: &[RolePattern]) -> Vec<Message> {
    let mut messages = Vec::new();
    let mut state = ReconstructState::new();

    for line in raw_text.lines() {
        match match_role_prefix(line, patterns) {
            Some((role, rest)) => {
                state.flush(&mut messages);
                state.role = role;
                state.buffer = rest.trim().to_string();
            }
            None => {
                if !state.buffer.is_empty() {
                    state.buffer.push('\n');
                }
                state.buffer.push_str(line);
            }
        }
    }
    state.flush(&mut messages);

    messages
}

/// First line of the opening user message, if it stays under 100 characters;
/// otherwise a dialect-specific generic title.
fn derive_title(messages: &[Message], source: SourceId) -> String {
    if let Some(first) = messages.first()
        && first.role == Role::User
    {
        let line = first.text.lines().next().unwrap_or("").trim();
        if !line.is_empty() && line.chars().count() < 100 {
            return line.to_string();
        }
    }
    format!("{} Conversation", source.display_name())
}

/// Fixed keyword/pattern families scanned over the whole raw input. Each
/// matching family contributes its tag name at most once.
static TAG_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "code",
            Regex::new(r"(?i)```|\bcode\b|\bfunction\b|\bsnippet\b").unwrap(),
        ),
        (
            "api",
            Regex::new(r"(?i)\bapi\b|\bendpoint\b|\brest\b|\bgraphql\b").unwrap(),
        ),
        (
            "database",
            Regex::new(r"(?i)\bdatabase\b|\bsql\b|\bpostgres(?:ql)?\b|\bmysql\b|\bmongodb\b|\bredis\b")
                .unwrap(),
        ),
        (
            "frontend",
            Regex::new(r"(?i)\bfrontend\b|\breact\b|\bvue\b|\bangular\b|\bcss\b|\bhtml\b").unwrap(),
        ),
        (
            "backend",
            Regex::new(r"(?i)\bbackend\b|\bserver\b|\bnode\.?js\b|\bmicroservice\b").unwrap(),
        ),
        (
            "deployment",
            Regex::new(r"(?i)\bdeploy(?:ment|ing)?\b|\bdocker\b|\bkubernetes\b|\bterraform\b|\bci/cd\b")
                .unwrap(),
        ),
    ]
});

fn extract_tags(raw_text: &str) -> Vec<String> {
    TAG_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(raw_text))
        .map(|(tag, _)| tag.to_string())
        .collect()
}

const TECHNICAL_KEYWORDS: &[&str] = &[
    "code", "bug", "error", "function", "implement", "debug", "compile", "api",
];
const DESIGN_KEYWORDS: &[&str] = &[
    "design",
    "layout",
    "mockup",
    "wireframe",
    "typography",
    "user experience",
];
const BUSINESS_KEYWORDS: &[&str] = &[
    "revenue",
    "customer",
    "market",
    "strategy",
    "budget",
    "stakeholder",
];
const LEARNING_KEYWORDS: &[&str] = &[
    "learn", "explain", "tutorial", "understand", "what is", "how does",
];

fn matches_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lower.contains(kw))
}

/// Four keyword families checked in priority order over the concatenated
/// lower-cased message text; first match wins.
fn derive_category(messages: &[Message]) -> String {
    let lower = messages
        .iter()
        .map(|m| m.text.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    for (name, keywords) in [
        ("technical", TECHNICAL_KEYWORDS),
        ("design", DESIGN_KEYWORDS),
        ("business", BUSINESS_KEYWORDS),
        ("learning", LEARNING_KEYWORDS),
    ] {
        if matches_any(&lower, keywords) {
            return name.to_string();
        }
    }
    "general".to_string()
}

/// Reconstruct a conversation from raw text, detecting the dialect first.
pub fn reconstruct(raw_text: &str) -> Conversation {
    reconstruct_as(raw_text, detect(raw_text))
}

/// Reconstruct a conversation using the given dialect's role-prefix rules.
///
/// Never fails: malformed or empty input yields a conversation with zero
/// messages, a generic title and the "general" category.
pub fn reconstruct_as(raw_text: &str, source: SourceId) -> Conversation {
    let messages = reconstruct_messages(raw_text, patterns_for(source));
    let title = derive_title(&messages, source);
    let tags = extract_tags(raw_text);
    let category = derive_category(&messages);

    Conversation {
        title,
        source,
        messages,
        metadata: HashMap::new(),
        tags,
        category: Some(category),
    }
}
