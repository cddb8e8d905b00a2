//! Engine configuration, read once at startup from a TOML file.
//!
//! Covers the entity catalog (providers, appointment windows, urgency
//! categories, symptom categories, call intents), confidence thresholds,
//! the retry policy, LLM endpoint settings, session retention, and the
//! listen address. Nothing here is re-read per call.

use crate::error::CallError;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_high_confidence() -> f32 {
    0.85
}

fn default_low_confidence() -> f32 {
    0.55
}

fn default_ambiguity_delta() -> f32 {
    0.08
}

fn default_max_candidates() -> usize {
    3
}

fn default_max_retries() -> u32 {
    2
}

fn default_escalation_keywords() -> Vec<String> {
    ["operator", "human", "emergency", "911", "real person"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_llm_timeout_secs() -> u64 {
    6
}

fn default_llm_model() -> String {
    "qwen3:4b".to_string()
}

fn default_retention_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_listen_addr() -> String {
    // Localhost only; the telephony webhook relay runs on the same host.
    "127.0.0.1:7870".to_string()
}

/// One catalog entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// An appointment window template: a catalog entry plus bookable capacity
/// for the built-in schedule backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowDef {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_window_capacity")]
    pub capacity: u32,
}

fn default_window_capacity() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub providers: Vec<EntityDef>,
    #[serde(default)]
    pub windows: Vec<WindowDef>,
    #[serde(default)]
    pub urgency_levels: Vec<EntityDef>,
    #[serde(default)]
    pub symptoms: Vec<EntityDef>,
    #[serde(default)]
    pub intents: Vec<EntityDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Fuzzy score at or above which a match is accepted outright.
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f32,
    /// Fuzzy score below which a fragment is considered unresolvable.
    #[serde(default = "default_low_confidence")]
    pub low_confidence: f32,
    /// Two candidates within this score delta count as ambiguous.
    #[serde(default = "default_ambiguity_delta")]
    pub ambiguity_delta: f32,
    /// How many fuzzy candidates to keep for clarification prompts.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            high_confidence: default_high_confidence(),
            low_confidence: default_low_confidence(),
            ambiguity_delta: default_ambiguity_delta(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Re-prompts allowed per slot before the call escalates to a human.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Keywords that short-circuit any state straight to escalation.
    #[serde(default = "default_escalation_keywords")]
    pub escalation_keywords: Vec<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            escalation_keywords: default_escalation_keywords(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint. Empty disables the LLM
    /// fallback; matching then degrades to fuzzy-only.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: default_llm_model(),
            api_key: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long terminated or idle sessions stay in memory.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl EngineConfig {
    /// Load and validate the config file. Any catalog or threshold problem
    /// is fatal here, before the daemon accepts calls.
    pub fn load(path: &Path) -> Result<Self, CallError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if self.catalog.providers.is_empty() {
            return Err(CallError::EmptyCatalog("provider".into()));
        }
        if self.catalog.windows.is_empty() {
            return Err(CallError::EmptyCatalog("time_slot".into()));
        }
        if self.catalog.urgency_levels.is_empty() {
            return Err(CallError::EmptyCatalog("urgency_level".into()));
        }
        if self.catalog.symptoms.is_empty() {
            return Err(CallError::EmptyCatalog("symptom".into()));
        }
        if self.catalog.intents.is_empty() {
            return Err(CallError::EmptyCatalog("call_intent".into()));
        }

        let m = &self.matching;
        if !(0.0..=1.0).contains(&m.low_confidence)
            || !(0.0..=1.0).contains(&m.high_confidence)
            || m.low_confidence >= m.high_confidence
        {
            return Err(CallError::Config(format!(
                "confidence thresholds must satisfy 0 <= low < high <= 1 (low={}, high={})",
                m.low_confidence, m.high_confidence
            )));
        }
        if self.dialogue.max_retries == 0 {
            return Err(CallError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
