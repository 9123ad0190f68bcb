use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SourceId;

/// Ordered dialect fingerprint table. Earlier entries take priority on
/// ambiguous input, so the registration order here is part of the contract.
static DIALECT_FINGERPRINTS: Lazy<Vec<(SourceId, Vec<Regex>)>> = Lazy::new(|| {
    vec![
        (
            SourceId::ChatGpt,
            vec![
                Regex::new(r"(?i)chatgpt").unwrap(),
                Regex::new(r"(?i)\bgpt-[345o]").unwrap(),
                Regex::new(r"(?i)\bopenai\b").unwrap(),
            ],
        ),
        (
            SourceId::Claude,
            vec![
                Regex::new(r"(?i)\bclaude\b").unwrap(),
                Regex::new(r"(?i)\banthropic\b").unwrap(),
                // Claude transcript exports lead turns with a Human: marker.
                Regex::new(r"(?im)^\s*human\s*:").unwrap(),
            ],
        ),
        (
            SourceId::Gemini,
            vec![
                Regex::new(r"(?i)\bgemini\b").unwrap(),
                Regex::new(r"(?i)\bbard\b").unwrap(),
            ],
        ),
        (
            SourceId::Copilot,
            vec![Regex::new(r"(?i)\bcopilot\b").unwrap()],
        ),
    ]
});

/// Identify the transcript dialect of `raw_text`.
///
/// Total function: any input, including the empty string, maps to one of the
/// five [`SourceId`] variants. No fingerprint match means [`SourceId::Custom`].
pub fn detect(raw_text: &str) -> SourceId {
    for (source, fingerprints) in DIALECT_FINGERPRINTS.iter() {
        if fingerprints.iter().any(|p| p.is_match(raw_text)) {
            return *source;
        }
    }
    SourceId::Custom
}
