use anyhow::{Result, anyhow};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::extract::fallback_extractors;
use crate::models::{AnalysisResult, Conversation, Highlight, HighlightCategory, Role};
use crate::oracle::{ClassificationOracle, OllamaOracle, OracleRequest};
use crate::validate::HighlightValidator;

/// Which messages the fallback extractors scan.
///
/// `AssistantOnly` assumes only assistant replies carry reusable content;
/// the default scans every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionScope {
    #[default]
    AllMessages,
    AssistantOnly,
}

const CLASSIFY_SYSTEM: &str = "You classify AI-assistant conversation transcripts. \
Respond with a single JSON object and nothing else.";

const CLASSIFY_INSTRUCTIONS: &str = r#"Analyze the transcript above. Respond with one JSON object:
{
  "summary": string,
  "key_topics": [string],
  "highlights": [{
    "content": string,
    "category": "code" | "insight" | "action_item" | "resource" | "question" | "other",
    "confidence_score": number,
    "tags": [string],
    "notes": string or null,
    "message_index": integer,
    "start_offset": integer,
    "end_offset": integer
  }],
  "action_items": [string],
  "resources": [string],
  "questions": [string]
}
"content" must be the verbatim span found at [start_offset, end_offset) of
message [message_index]; offsets are byte offsets into that message's text."#;

const REFINE_SYSTEM: &str = "You refine conversation highlights. \
Respond with a single JSON object and nothing else.";

const REFINE_INSTRUCTIONS: &str = r#"For each highlight above, optionally refine its
category, tags and notes. Never change content or positions. Respond with:
{
  "refinements": [{
    "index": integer,
    "category": string or null,
    "tags": [string] or null,
    "notes": string or null
  }]
}"#;

/// Shape the oracle's JSON response is validated against at the boundary.
/// Highlight entries are parsed per-item leniently; everything else that
/// fails to deserialize invalidates the whole response.
#[derive(Debug, Deserialize)]
struct OracleAnalysis {
    summary: Option<String>,
    key_topics: Option<Vec<String>>,
    #[serde(default)]
    highlights: Vec<serde_json::Value>,
    action_items: Option<Vec<String>>,
    resources: Option<Vec<String>>,
    questions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OracleHighlight {
    content: String,
    category: Option<String>,
    confidence_score: Option<f32>,
    #[serde(default)]
    tags: Vec<String>,
    notes: Option<String>,
    message_index: usize,
    start_offset: usize,
    end_offset: usize,
}

#[derive(Debug, Deserialize)]
struct RefinementResponse {
    refinements: Vec<Refinement>,
}

#[derive(Debug, Deserialize)]
struct Refinement {
    index: usize,
    category: Option<String>,
    tags: Option<Vec<String>>,
    notes: Option<String>,
}

/// Keyword families for fallback key-topic derivation, scanned over the
/// whole lower-cased transcript.
const TOPIC_FAMILIES: &[(&str, &[&str])] = &[
    (
        "Frontend Development",
        &["frontend", "react", "vue", "angular", "css", "html"],
    ),
    (
        "Backend Development",
        &["backend", "server", "api", "endpoint"],
    ),
    (
        "Database",
        &["database", "sql", "postgres", "mysql", "mongodb"],
    ),
    (
        "Deployment & DevOps",
        &["deploy", "docker", "kubernetes", "terraform", "ci/cd"],
    ),
    ("Testing", &["test", "assertion", "coverage", "regression"]),
    (
        "Security",
        &["security", "auth", "encryption", "vulnerability"],
    ),
];

/// Orchestrates highlight extraction: delegates to an optional external
/// oracle and falls back to the deterministic span extractors. Both paths
/// run every candidate through the validator before it reaches a caller.
pub struct Classifier {
    oracle: Option<Box<dyn ClassificationOracle>>,
    scope: ExtractionScope,
    temperature: f32,
    max_tokens: u32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    /// A deterministic-only classifier scanning all messages.
    pub fn new() -> Self {
        Self {
            oracle: None,
            scope: ExtractionScope::default(),
            temperature: 0.2,
            max_tokens: 2048,
        }
    }

    pub fn with_oracle(mut self, oracle: Box<dyn ClassificationOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_scope(mut self, scope: ExtractionScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Wire up the whole classifier from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let scope = if config.extraction.assistant_only {
            ExtractionScope::AssistantOnly
        } else {
            ExtractionScope::AllMessages
        };
        let mut classifier = Self::new().with_scope(scope).with_sampling(
            config.oracle.temperature,
            config.oracle.max_tokens,
        );
        if config.oracle.enabled {
            classifier = classifier.with_oracle(Box::new(OllamaOracle::new(
                &config.oracle.endpoint,
                &config.oracle.model,
                config.oracle.timeout_secs,
            )));
        }
        classifier
    }

    /// Classify a conversation.
    ///
    /// Total: any oracle transport failure, timeout or schema mismatch is
    /// recovered locally by the deterministic path. Identical input and
    /// oracle behavior produce identical output.
    pub async fn classify(&self, conversation: &Conversation) -> AnalysisResult {
        if let Some(oracle) = &self.oracle {
            match self.classify_with_oracle(oracle.as_ref(), conversation).await {
                Ok(result) => return result,
                Err(e) => warn!("oracle classification failed, falling back: {e:#}"),
            }
        }
        self.classify_fallback(conversation)
    }

    async fn classify_with_oracle(
        &self,
        oracle: &dyn ClassificationOracle,
        conversation: &Conversation,
    ) -> Result<AnalysisResult> {
        let request = OracleRequest {
            system: CLASSIFY_SYSTEM.to_string(),
            prompt: build_classify_prompt(conversation),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = oracle.complete(&request).await?;
        let analysis = parse_oracle_response(&response)?;

        let candidates: Vec<Highlight> = analysis
            .highlights
            .iter()
            .filter_map(|value| serde_json::from_value::<OracleHighlight>(value.clone()).ok())
            .map(|h| Highlight {
                content: h.content,
                category: h
                    .category
                    .as_deref()
                    .map(HighlightCategory::parse_lenient)
                    .unwrap_or(HighlightCategory::Other),
                confidence_score: h.confidence_score.unwrap_or(0.5),
                tags: h.tags,
                notes: h.notes,
                position: crate::models::Position {
                    message_index: h.message_index,
                    start_offset: h.start_offset,
                    end_offset: h.end_offset,
                },
            })
            .collect();

        let highlights = HighlightValidator::validate_and_enhance(candidates, conversation);

        // Oracle-supplied summary and lists win; the category-derived lists
        // are recomputed from accepted highlights only when omitted.
        let action_items = analysis
            .action_items
            .unwrap_or_else(|| contents_for(&highlights, HighlightCategory::ActionItem));
        let resources = analysis
            .resources
            .unwrap_or_else(|| contents_for(&highlights, HighlightCategory::Resource));
        let questions = analysis
            .questions
            .unwrap_or_else(|| contents_for(&highlights, HighlightCategory::Question));

        Ok(AnalysisResult {
            highlights,
            summary: analysis.summary.unwrap_or_default(),
            key_topics: analysis.key_topics.unwrap_or_default(),
            action_items,
            resources,
            questions,
        })
    }

    /// Deterministic, oracle-free path. Always produces a result; the worst
    /// outcome is an empty highlight set with a generic summary.
    pub fn classify_fallback(&self, conversation: &Conversation) -> AnalysisResult {
        let extractors = fallback_extractors();
        let mut candidates = Vec::new();

        for (index, message) in conversation.messages.iter().enumerate() {
            if self.scope == ExtractionScope::AssistantOnly && message.role != Role::Assistant {
                continue;
            }
            for extractor in &extractors {
                candidates.extend(extractor.scan(&message.text, index));
            }
        }

        let highlights = HighlightValidator::validate_and_enhance(candidates, conversation);

        AnalysisResult {
            summary: summarize(conversation),
            key_topics: derive_key_topics(conversation),
            action_items: contents_for(&highlights, HighlightCategory::ActionItem),
            resources: contents_for(&highlights, HighlightCategory::Resource),
            questions: contents_for(&highlights, HighlightCategory::Question),
            highlights,
        }
    }

    /// Ask the oracle to refine tags, notes and categories of existing
    /// highlights. Positions and content never change; any failure leaves the
    /// input untouched. Confidence scores are reclamped on every path.
    pub async fn enhance_highlights(&self, highlights: Vec<Highlight>) -> Vec<Highlight> {
        let mut highlights = highlights;

        if let Some(oracle) = &self.oracle
            && !highlights.is_empty()
        {
            match self.refine_with_oracle(oracle.as_ref(), &highlights).await {
                Ok(refinements) => apply_refinements(&mut highlights, refinements),
                Err(e) => debug!("highlight refinement skipped: {e:#}"),
            }
        }

        for highlight in &mut highlights {
            highlight.confidence_score = highlight.confidence_score.clamp(0.0, 1.0);
        }
        highlights
    }

    async fn refine_with_oracle(
        &self,
        oracle: &dyn ClassificationOracle,
        highlights: &[Highlight],
    ) -> Result<Vec<Refinement>> {
        let mut prompt = String::new();
        for (index, highlight) in highlights.iter().enumerate() {
            prompt.push_str(&format!(
                "[{index}] category={:?} tags={:?}\n{}\n\n",
                highlight.category, highlight.tags, highlight.content
            ));
        }
        prompt.push_str(REFINE_INSTRUCTIONS);

        let request = OracleRequest {
            system: REFINE_SYSTEM.to_string(),
            prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = oracle.complete(&request).await?;
        let payload = extract_json_payload(&response)
            .ok_or_else(|| anyhow!("no JSON object in refinement response"))?;
        let parsed: RefinementResponse = serde_json::from_str(payload)
            .map_err(|e| anyhow!("refinement response did not match the expected shape: {e}"))?;
        Ok(parsed.refinements)
    }
}

/// Role-labeled, index-ordered transcript plus the fixed instruction
/// template.
fn build_classify_prompt(conversation: &Conversation) -> String {
    let mut prompt = format!(
        "Source: {}\nCategory: {}\n\n",
        conversation.source.display_name(),
        conversation.category.as_deref().unwrap_or("general"),
    );
    for (index, message) in conversation.messages.iter().enumerate() {
        prompt.push_str(&format!(
            "[{index}] {}: {}\n",
            match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            },
            message.text
        ));
    }
    prompt.push('\n');
    prompt.push_str(CLASSIFY_INSTRUCTIONS);
    prompt
}

/// Locate the JSON object inside an oracle reply that may wrap it in prose
/// or markdown fences.
fn extract_json_payload(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// Schema validation at the boundary: either a typed [`OracleAnalysis`] or an
/// explicit error consumed by the fallback branch. The shape is never
/// assumed.
fn parse_oracle_response(response: &str) -> Result<OracleAnalysis> {
    let payload = extract_json_payload(response)
        .ok_or_else(|| anyhow!("no JSON object in oracle response"))?;
    serde_json::from_str(payload)
        .map_err(|e| anyhow!("oracle response did not match the expected shape: {e}"))
}

fn apply_refinements(highlights: &mut [Highlight], refinements: Vec<Refinement>) {
    for refinement in refinements {
        let Some(highlight) = highlights.get_mut(refinement.index) else {
            continue;
        };
        if let Some(category) = refinement.category.as_deref() {
            highlight.category = HighlightCategory::parse_lenient(category);
        }
        if let Some(tags) = refinement.tags {
            highlight.tags = tags;
        }
        if let Some(notes) = refinement.notes {
            highlight.notes = Some(notes);
        }
    }
}

fn contents_for(highlights: &[Highlight], category: HighlightCategory) -> Vec<String> {
    highlights
        .iter()
        .filter(|h| h.category == category)
        .map(|h| h.content.clone())
        .collect()
}

fn summarize(conversation: &Conversation) -> String {
    format!(
        "Conversation about '{}' with {} user turns and {} assistant turns",
        conversation.title,
        conversation.role_count(Role::User),
        conversation.role_count(Role::Assistant),
    )
}

fn derive_key_topics(conversation: &Conversation) -> Vec<String> {
    let lower = conversation.full_text().to_lowercase();
    let topics: Vec<String> = TOPIC_FAMILIES
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(topic, _)| topic.to_string())
        .collect();

    if topics.is_empty() {
        vec!["General Discussion".to_string()]
    } else {
        topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::reconstruct::reconstruct;

    fn result_json(result: &AnalysisResult) -> serde_json::Value {
        serde_json::to_value(result).unwrap()
    }

    #[tokio::test]
    async fn test_closure_scenario_deterministic() {
        let raw = "User: What is a closure?\nAssistant: A closure is a function bundled with its lexical scope. TODO: read more.";
        let conversation = reconstruct(raw);
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Assistant);

        let result = Classifier::new().classify(&conversation).await;

        let questions: Vec<_> = result
            .highlights
            .iter()
            .filter(|h| h.category == HighlightCategory::Question)
            .collect();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].content, "What is a closure?");

        let actions: Vec<_> = result
            .highlights
            .iter()
            .filter(|h| h.category == HighlightCategory::ActionItem)
            .collect();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].content, "read more.");

        assert_eq!(result.key_topics, vec!["General Discussion".to_string()]);
        assert_eq!(result.questions, vec!["What is a closure?".to_string()]);
        assert_eq!(result.action_items, vec!["read more.".to_string()]);
    }

    #[tokio::test]
    async fn test_fenced_code_only_message() {
        let conversation = reconstruct("```print(1)```");
        let result = Classifier::new().classify(&conversation).await;
        assert_eq!(result.highlights.len(), 1);
        let h = &result.highlights[0];
        assert_eq!(h.category, HighlightCategory::Code);
        assert_eq!(h.confidence_score, 0.9);
        assert!(h.tags.contains(&"code".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_oracle_response_matches_fallback() {
        let raw = "User: What is a closure?\nAssistant: Scope bundling. TODO: read more.";
        let conversation = reconstruct(raw);

        let fallback = Classifier::new().classify(&conversation).await;
        let with_bad_oracle = Classifier::new()
            .with_oracle(Box::new(MockOracle::new("that is not structured data")))
            .classify(&conversation)
            .await;

        assert_eq!(result_json(&with_bad_oracle), result_json(&fallback));
    }

    #[tokio::test]
    async fn test_failing_oracle_matches_fallback() {
        let conversation = reconstruct("User: hello there friend\nAssistant: TODO: reply later");
        let fallback = Classifier::new().classify(&conversation).await;
        let with_failing = Classifier::new()
            .with_oracle(Box::new(MockOracle::failing()))
            .classify(&conversation)
            .await;
        assert_eq!(result_json(&with_failing), result_json(&fallback));
    }

    #[tokio::test]
    async fn test_oracle_happy_path_validates_positions() {
        let conversation = reconstruct("User: alpha beta");
        // messages[0].text == "alpha beta"
        let response = r#"```json
{
  "summary": "an oracle summary",
  "key_topics": ["Greek Letters"],
  "highlights": [
    {"content": "alpha", "category": "insight", "confidence_score": 1.7,
     "tags": [], "notes": null,
     "message_index": 0, "start_offset": 0, "end_offset": 5},
    {"content": "beta", "category": "insight", "confidence_score": 0.9,
     "tags": [], "notes": null,
     "message_index": 0, "start_offset": 0, "end_offset": 99}
  ]
}
```"#;
        let result = Classifier::new()
            .with_oracle(Box::new(MockOracle::new(response)))
            .classify(&conversation)
            .await;

        assert_eq!(result.summary, "an oracle summary");
        assert_eq!(result.key_topics, vec!["Greek Letters".to_string()]);
        // Second highlight has end_offset beyond the message: dropped.
        assert_eq!(result.highlights.len(), 1);
        assert_eq!(result.highlights[0].content, "alpha");
        // Score came back out of range and was clamped by enhancement.
        assert_eq!(result.highlights[0].confidence_score, 1.0);
        // Lists were omitted by the oracle: recomputed from accepted highlights.
        assert!(result.action_items.is_empty());
        assert!(result.questions.is_empty());
    }

    #[tokio::test]
    async fn test_oracle_supplied_lists_are_kept() {
        let conversation = reconstruct("User: alpha beta");
        let response = r#"{"summary": "s", "highlights": [],
            "action_items": ["do the thing"], "resources": ["https://docs.rs"],
            "questions": ["why though?"]}"#;
        let result = Classifier::new()
            .with_oracle(Box::new(MockOracle::new(response)))
            .classify(&conversation)
            .await;
        assert_eq!(result.action_items, vec!["do the thing".to_string()]);
        assert_eq!(result.resources, vec!["https://docs.rs".to_string()]);
        assert_eq!(result.questions, vec!["why though?".to_string()]);
        // key_topics missing from the response: defaults to empty.
        assert!(result.key_topics.is_empty());
    }

    #[tokio::test]
    async fn test_assistant_only_scope_skips_user_messages() {
        let raw = "User: What is a closure?\nAssistant: Scope bundling.";
        let conversation = reconstruct(raw);
        let result = Classifier::new()
            .with_scope(ExtractionScope::AssistantOnly)
            .classify(&conversation)
            .await;
        assert!(result.highlights.is_empty());
        assert!(result.questions.is_empty());
    }

    #[tokio::test]
    async fn test_summary_format() {
        let conversation = reconstruct("User: short title\nAssistant: ok\nUser: more");
        let result = Classifier::new().classify(&conversation).await;
        assert_eq!(
            result.summary,
            "Conversation about 'short title' with 2 user turns and 1 assistant turns"
        );
    }

    #[tokio::test]
    async fn test_key_topics_from_families() {
        let raw = "User: deploy the docker image\nAssistant: kubernetes rollout and security audit";
        let conversation = reconstruct(raw);
        let result = Classifier::new().classify(&conversation).await;
        assert!(result.key_topics.contains(&"Deployment & DevOps".to_string()));
        assert!(result.key_topics.contains(&"Security".to_string()));
        assert!(!result.key_topics.contains(&"General Discussion".to_string()));
    }

    #[tokio::test]
    async fn test_empty_conversation_generic_result() {
        let conversation = reconstruct("");
        let result = Classifier::new().classify(&conversation).await;
        assert!(result.highlights.is_empty());
        assert_eq!(result.key_topics, vec!["General Discussion".to_string()]);
        assert_eq!(
            result.summary,
            "Conversation about 'Custom Conversation' with 0 user turns and 0 assistant turns"
        );
    }

    #[tokio::test]
    async fn test_enhance_without_oracle_clamps_scores() {
        let h = crate::models::Highlight {
            content: "alpha".to_string(),
            category: HighlightCategory::Insight,
            confidence_score: 2.0,
            tags: vec![],
            notes: None,
            position: crate::models::Position {
                message_index: 0,
                start_offset: 0,
                end_offset: 5,
            },
        };
        let enhanced = Classifier::new().enhance_highlights(vec![h]).await;
        assert_eq!(enhanced[0].confidence_score, 1.0);
    }

    #[tokio::test]
    async fn test_enhance_with_oracle_refines_in_place() {
        let h = crate::models::Highlight {
            content: "read the guide".to_string(),
            category: HighlightCategory::Other,
            confidence_score: 0.6,
            tags: vec!["misc".to_string()],
            notes: None,
            position: crate::models::Position {
                message_index: 0,
                start_offset: 0,
                end_offset: 14,
            },
        };
        let response = r#"{"refinements": [
            {"index": 0, "category": "resource", "tags": ["docs"], "notes": "external guide"}
        ]}"#;
        let classifier = Classifier::new().with_oracle(Box::new(MockOracle::new(response)));
        let enhanced = classifier.enhance_highlights(vec![h.clone()]).await;
        assert_eq!(enhanced[0].category, HighlightCategory::Resource);
        assert_eq!(enhanced[0].tags, vec!["docs".to_string()]);
        assert_eq!(enhanced[0].notes.as_deref(), Some("external guide"));
        // Position and content never move.
        assert_eq!(enhanced[0].position, h.position);
        assert_eq!(enhanced[0].content, h.content);
    }

    #[tokio::test]
    async fn test_enhance_with_garbled_oracle_is_noop() {
        let h = crate::models::Highlight {
            content: "read the guide".to_string(),
            category: HighlightCategory::Other,
            confidence_score: 0.6,
            tags: vec!["misc".to_string()],
            notes: None,
            position: crate::models::Position {
                message_index: 0,
                start_offset: 0,
                end_offset: 14,
            },
        };
        let classifier = Classifier::new().with_oracle(Box::new(MockOracle::new("not json at all")));
        let enhanced = classifier.enhance_highlights(vec![h.clone()]).await;
        assert_eq!(enhanced[0].category, h.category);
        assert_eq!(enhanced[0].tags, h.tags);
        assert!(enhanced[0].notes.is_none());
    }
}
