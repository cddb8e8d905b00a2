//! LLM-backed semantic classifier, the second stage of the matcher.
//!
//! The classifier is a single-shot call with a bounded timeout: given an
//! utterance fragment and the closed candidate list, pick one candidate or
//! answer "none". The response is validated against the candidate set, so
//! an invented entity name can never enter a session.

use async_trait::async_trait;
use carecall_common::config::LlmConfig;
use carecall_common::{CallError, Entity};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// What the classifier chose, if anything.
#[derive(Debug, Clone)]
pub struct LlmSelection {
    /// Canonical name of the chosen candidate, already validated.
    pub choice: Option<String>,
    pub confidence: f32,
}

#[async_trait]
pub trait LlmClassifier: Send + Sync {
    async fn classify(
        &self,
        fragment: &str,
        candidates: &[Entity],
    ) -> Result<LlmSelection, CallError>;
}

const SYSTEM_PROMPT: &str = "You match a phone caller's words to one option from a fixed list. \
The words come from speech recognition and may be garbled. \
Reply with only a JSON object: {\"choice\": \"<exact option text or none>\", \"confidence\": <0.0-1.0>}. \
Never invent an option that is not in the list.";

/// Confidence assigned when the model picks a candidate but reports none.
const FALLBACK_CONFIDENCE: f32 = 0.9;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[derive(Deserialize)]
struct SelectionJson {
    choice: Option<String>,
    confidence: Option<f32>,
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint.
pub struct HttpLlmClassifier {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmClassifier {
    /// Returns `Ok(None)` when no endpoint is configured; the matcher then
    /// degrades to fuzzy-only resolution. A client that cannot be built
    /// with the configured timeout is a startup error, not a silent
    /// fallback to an unbounded one.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>, CallError> {
        if config.endpoint.trim().is_empty() {
            return Ok(None);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CallError::Config(format!("LLM http client: {}", e)))?;
        Ok(Some(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        }))
    }

    fn build_user_prompt(fragment: &str, candidates: &[Entity]) -> String {
        let mut prompt = format!("Caller said: \"{}\"\n\nOptions:\n", fragment);
        for entity in candidates {
            prompt.push_str("- ");
            prompt.push_str(&entity.canonical_name);
            prompt.push('\n');
        }
        prompt
    }
}

#[async_trait]
impl LlmClassifier for HttpLlmClassifier {
    async fn classify(
        &self,
        fragment: &str,
        candidates: &[Entity],
    ) -> Result<LlmSelection, CallError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::build_user_prompt(fragment, candidates),
                },
            ],
            temperature: 0.0,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CallError::Llm(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CallError::Llm(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Llm(format!("response parse failed: {}", e)))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| CallError::Llm("empty completion".to_string()))?;

        debug!(raw = content, "LLM classifier raw response");
        Ok(parse_selection(content, candidates))
    }
}

/// Parse the model output and validate it against the candidate list.
/// Anything unparseable or outside the closed set becomes "none".
fn parse_selection(raw: &str, candidates: &[Entity]) -> LlmSelection {
    let json_slice = extract_json_object(raw).unwrap_or(raw);

    let parsed: SelectionJson = match serde_json::from_str(json_slice) {
        Ok(p) => p,
        Err(_) => {
            warn!("LLM classifier returned non-JSON output; treating as none");
            return LlmSelection {
                choice: None,
                confidence: 0.0,
            };
        }
    };

    let choice = parsed
        .choice
        .as_deref()
        .filter(|c| !c.trim().is_empty() && !c.trim().eq_ignore_ascii_case("none"))
        .and_then(|c| {
            candidates
                .iter()
                .find(|e| e.canonical_name.eq_ignore_ascii_case(c.trim()))
                .map(|e| e.canonical_name.clone())
        });

    if choice.is_none() && parsed.choice.is_some() {
        warn!(
            claimed = parsed.choice.as_deref().unwrap_or(""),
            "LLM classifier named an unknown entity; rejected"
        );
    }

    let confidence = match choice {
        Some(_) => parsed
            .confidence
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(FALLBACK_CONFIDENCE),
        None => 0.0,
    };

    LlmSelection { choice, confidence }
}

/// Models wrap JSON in prose or code fences often enough that we cut out
/// the first balanced object before parsing.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in raw[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecall_common::EntityKind;

    fn candidates() -> Vec<Entity> {
        vec![
            Entity {
                canonical_name: "Dr. Smith".into(),
                aliases: vec!["dr. smith".into()],
                kind: EntityKind::Provider,
            },
            Entity {
                canonical_name: "Dr. Smythe".into(),
                aliases: vec!["dr. smythe".into()],
                kind: EntityKind::Provider,
            },
        ]
    }

    #[test]
    fn classifier_is_disabled_without_an_endpoint() {
        let classifier = HttpLlmClassifier::from_config(&LlmConfig::default()).unwrap();
        assert!(classifier.is_none());

        let config = LlmConfig {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            ..LlmConfig::default()
        };
        assert!(HttpLlmClassifier::from_config(&config).unwrap().is_some());
    }

    #[test]
    fn valid_choice_is_accepted() {
        let sel = parse_selection(
            r#"{"choice": "Dr. Smith", "confidence": 0.82}"#,
            &candidates(),
        );
        assert_eq!(sel.choice.as_deref(), Some("Dr. Smith"));
        assert!((sel.confidence - 0.82).abs() < f32::EPSILON);
    }

    #[test]
    fn invented_entity_is_rejected() {
        let sel = parse_selection(
            r#"{"choice": "Dr. House", "confidence": 0.99}"#,
            &candidates(),
        );
        assert!(sel.choice.is_none());
        assert_eq!(sel.confidence, 0.0);
    }

    #[test]
    fn none_answer_is_respected() {
        let sel = parse_selection(r#"{"choice": "none"}"#, &candidates());
        assert!(sel.choice.is_none());
    }

    #[test]
    fn json_is_extracted_from_fenced_output() {
        let raw = "Sure!\n```json\n{\"choice\": \"Dr. Smythe\"}\n```";
        let sel = parse_selection(raw, &candidates());
        assert_eq!(sel.choice.as_deref(), Some("Dr. Smythe"));
        assert!((sel.confidence - FALLBACK_CONFIDENCE).abs() < f32::EPSILON);
    }

    #[test]
    fn garbage_output_becomes_none() {
        let sel = parse_selection("I think the caller wants Dr. Smith", &candidates());
        assert!(sel.choice.is_none());
    }
}
