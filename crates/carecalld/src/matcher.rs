//! Two-stage utterance matcher: deterministic fuzzy scoring first, LLM
//! disambiguation only when the fuzzy stage is unsure.
//!
//! The fuzzy stage is cheap and explainable and absorbs most transcription
//! noise; the LLM stage handles compound or loosely phrased fragments but
//! can only pick from the closed candidate set. Which stage produced a
//! result is recorded on the `MatchResult` for auditability.

use crate::catalog::EntityCatalog;
use crate::llm::LlmClassifier;
use carecall_common::config::MatchingConfig;
use carecall_common::{Entity, EntityKind, MatchMethod, MatchResult, ScoredCandidate};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Disfluencies and glue words stripped before scoring. Applied to aliases
/// and fragments alike, so both sides shrink consistently.
static FILLER_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "uh", "uhh", "um", "umm", "er", "err", "ah", "hmm", "like", "well", "please", "so",
        "just", "i", "me", "my", "want", "wanna", "need", "would", "to", "the", "a", "an",
        "for", "with", "see", "get", "think", "maybe",
    ]
    .into_iter()
    .collect()
});

/// Lowercase, strip punctuation, drop filler words.
pub fn normalize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|word| !FILLER_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Multi-clause fragments go to the LLM stage even when one candidate
/// scores acceptably, because the fuzzy score cannot tell which clause it
/// matched.
fn is_compound(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    lower.contains(" and ") || lower.contains(" or ") || lower.contains(" but ") || lower.contains(',')
}

/// Score one normalized fragment against one alias. A whole alias appearing
/// inside the fragment is an exact mention (the caller said more words than
/// the alias, which is the normal case on a phone call); otherwise fall
/// back to Jaro-Winkler similarity.
fn alias_score(fragment: &str, alias: &str) -> f32 {
    if alias.is_empty() {
        return 0.0;
    }
    if fragment == alias {
        return 1.0;
    }
    let padded_fragment = format!(" {} ", fragment);
    let padded_alias = format!(" {} ", alias);
    if padded_fragment.contains(&padded_alias) {
        return 1.0;
    }
    strsim::jaro_winkler(fragment, alias) as f32
}

pub struct Matcher {
    catalog: Arc<EntityCatalog>,
    config: MatchingConfig,
    llm: Option<Arc<dyn LlmClassifier>>,
}

impl Matcher {
    pub fn new(
        catalog: Arc<EntityCatalog>,
        config: MatchingConfig,
        llm: Option<Arc<dyn LlmClassifier>>,
    ) -> Self {
        Self {
            catalog,
            config,
            llm,
        }
    }

    /// Resolve an utterance fragment against all entities of one kind.
    pub async fn match_fragment(&self, raw: &str, kind: EntityKind) -> MatchResult {
        let fragment = normalize(raw);
        if fragment.is_empty() {
            return MatchResult::none(Vec::new());
        }

        let mut scored: Vec<ScoredCandidate> = self
            .catalog
            .lookup_candidates(kind)
            .iter()
            .map(|entity| {
                let score = entity
                    .aliases
                    .iter()
                    .map(|alias| alias_score(&fragment, &normalize(alias)))
                    .fold(0.0f32, f32::max);
                ScoredCandidate {
                    entity: entity.clone(),
                    score,
                }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let best = match scored.first() {
            Some(best) => best.clone(),
            None => return MatchResult::none(Vec::new()),
        };
        let candidates = self.shortlist(&scored);

        let ambiguous = scored
            .get(1)
            .map(|runner| best.score - runner.score <= self.config.ambiguity_delta)
            .unwrap_or(false);

        // An exact alias mention is definitive even when the catalog holds
        // near-identical names; Jaro-Winkler's prefix boost would otherwise
        // flag "Dr. Smith" as ambiguous with "Dr. Smythe".
        let accepted = best.score >= 1.0
            || (best.score >= self.config.high_confidence && !ambiguous);

        if accepted {
            debug!(
                fragment = %fragment,
                entity = %best.entity.canonical_name,
                score = best.score,
                "fuzzy match accepted"
            );
            return MatchResult {
                resolved: Some(best.entity),
                confidence: best.score,
                method: MatchMethod::Fuzzy,
                candidates,
            };
        }

        if best.score >= self.config.low_confidence && (ambiguous || is_compound(raw)) {
            return self.classify_with_llm(raw, best, candidates).await;
        }

        MatchResult::none(candidates)
    }

    /// LLM stage. Failure degrades to the best fuzzy result (already known
    /// to be above the low threshold); a turn never hangs or crashes on a
    /// failed classification.
    async fn classify_with_llm(
        &self,
        raw: &str,
        best: ScoredCandidate,
        candidates: Vec<ScoredCandidate>,
    ) -> MatchResult {
        let llm = match &self.llm {
            Some(llm) => llm,
            None => return self.degrade_to_fuzzy(best, candidates),
        };

        let candidate_entities: Vec<Entity> =
            candidates.iter().map(|c| c.entity.clone()).collect();

        match llm.classify(raw, &candidate_entities).await {
            Ok(selection) => match selection.choice {
                Some(canonical) => {
                    let resolved = candidate_entities
                        .into_iter()
                        .find(|e| e.canonical_name == canonical);
                    match resolved {
                        Some(entity) => MatchResult {
                            resolved: Some(entity),
                            confidence: selection.confidence,
                            method: MatchMethod::Llm,
                            candidates,
                        },
                        // Classifier validation guarantees this branch is
                        // unreachable, but never panic on a live call.
                        None => MatchResult::none(candidates),
                    }
                }
                None => MatchResult::none(candidates),
            },
            Err(e) => {
                warn!(error = %e, "LLM classification failed; degrading to fuzzy result");
                self.degrade_to_fuzzy(best, candidates)
            }
        }
    }

    fn degrade_to_fuzzy(
        &self,
        best: ScoredCandidate,
        candidates: Vec<ScoredCandidate>,
    ) -> MatchResult {
        MatchResult {
            resolved: Some(best.entity),
            confidence: best.score,
            method: MatchMethod::Fuzzy,
            candidates,
        }
    }

    /// Top-N candidates for clarification prompts and the LLM stage. Kept
    /// even below the low threshold so an unresolved result still carries
    /// the closest names; zero scores have no signal and are dropped.
    fn shortlist(&self, scored: &[ScoredCandidate]) -> Vec<ScoredCandidate> {
        scored
            .iter()
            .filter(|c| c.score > 0.0)
            .take(self.config.max_candidates)
            .cloned()
            .collect()
    }
}

static YES_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "yes", "yeah", "yep", "yup", "correct", "right", "sure", "ok", "okay", "confirm",
        "confirmed", "absolutely", "exactly",
    ]
    .into_iter()
    .collect()
});

static NO_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "no", "nope", "nah", "wrong", "incorrect", "change", "not", "actually", "cancel",
    ]
    .into_iter()
    .collect()
});

/// Dedicated boolean matcher for the confirmation stage. Keyword-driven and
/// deliberately conservative: a mixed answer resolves to neither.
pub fn match_yes_no(raw: &str) -> Option<bool> {
    let lower = raw.to_lowercase();
    let words: HashSet<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let has_yes = words.iter().any(|w| YES_WORDS.contains(w));
    let has_no = words.iter().any(|w| NO_WORDS.contains(w));

    match (has_yes, has_no) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmSelection;
    use async_trait::async_trait;
    use carecall_common::config::{CatalogConfig, EntityDef, WindowDef};
    use carecall_common::CallError;

    struct FixedLlm {
        choice: Option<String>,
        confidence: f32,
    }

    #[async_trait]
    impl LlmClassifier for FixedLlm {
        async fn classify(
            &self,
            _fragment: &str,
            _candidates: &[Entity],
        ) -> Result<LlmSelection, CallError> {
            Ok(LlmSelection {
                choice: self.choice.clone(),
                confidence: self.confidence,
            })
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmClassifier for FailingLlm {
        async fn classify(
            &self,
            _fragment: &str,
            _candidates: &[Entity],
        ) -> Result<LlmSelection, CallError> {
            Err(CallError::Llm("timed out".into()))
        }
    }

    fn catalog() -> Arc<EntityCatalog> {
        let config = CatalogConfig {
            providers: vec![
                EntityDef {
                    name: "Dr. Smith".into(),
                    aliases: vec!["doctor smith".into(), "smith".into()],
                },
                EntityDef {
                    name: "Dr. Smythe".into(),
                    aliases: vec!["doctor smythe".into(), "smythe".into()],
                },
                EntityDef {
                    name: "Dr. Patel".into(),
                    aliases: vec!["doctor patel".into(), "patel".into()],
                },
            ],
            windows: vec![WindowDef {
                name: "tuesday morning".into(),
                aliases: vec!["tuesday am".into()],
                capacity: 1,
            }],
            urgency_levels: vec![EntityDef {
                name: "high".into(),
                aliases: vec!["urgent".into()],
            }],
            symptoms: vec![EntityDef {
                name: "fever".into(),
                aliases: vec!["temperature".into()],
            }],
            intents: vec![EntityDef {
                name: "scheduling".into(),
                aliases: vec!["appointment".into()],
            }],
        };
        Arc::new(EntityCatalog::from_config(&config).unwrap())
    }

    fn matcher(llm: Option<Arc<dyn LlmClassifier>>) -> Matcher {
        Matcher::new(catalog(), MatchingConfig::default(), llm)
    }

    #[test]
    fn normalize_strips_fillers_and_punctuation() {
        assert_eq!(normalize("Uhh, I need to see Dr. Smith!"), "dr smith");
        assert_eq!(normalize("..."), "");
    }

    #[tokio::test]
    async fn exact_alias_resolves_with_fuzzy_method() {
        let m = matcher(None);
        let result = m
            .match_fragment("I need to see Dr. Smith", EntityKind::Provider)
            .await;
        assert_eq!(
            result.resolved.as_ref().map(|e| e.canonical_name.as_str()),
            Some("Dr. Smith")
        );
        assert_eq!(result.method, MatchMethod::Fuzzy);
        assert!(result.confidence >= 0.85);
    }

    #[tokio::test]
    async fn gibberish_resolves_to_none() {
        let m = matcher(None);
        let result = m.match_fragment("xylophone quartz", EntityKind::Provider).await;
        assert!(result.resolved.is_none());
        assert_eq!(result.method, MatchMethod::None);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn empty_utterance_resolves_to_none() {
        let m = matcher(None);
        let result = m.match_fragment("   ", EntityKind::Provider).await;
        assert!(result.resolved.is_none());
    }

    #[tokio::test]
    async fn unresolved_fragments_keep_their_closest_candidates() {
        let config = MatchingConfig {
            low_confidence: 0.85,
            high_confidence: 0.95,
            ..MatchingConfig::default()
        };
        let m = Matcher::new(catalog(), config, None);
        // "pat" scores against Patel but under the low threshold.
        let result = m.match_fragment("pat xx", EntityKind::Provider).await;
        assert!(result.resolved.is_none());
        assert_eq!(result.method, MatchMethod::None);
        assert_eq!(
            result.candidates.first().map(|c| c.entity.canonical_name.as_str()),
            Some("Dr. Patel")
        );
    }

    #[tokio::test]
    async fn ambiguous_fragment_is_settled_by_llm() {
        let llm: Arc<dyn LlmClassifier> = Arc::new(FixedLlm {
            choice: Some("Dr. Smith".into()),
            confidence: 0.9,
        });
        let m = matcher(Some(llm));
        // "doc smyth" lands between Smith and Smythe, below the high
        // threshold and within the ambiguity delta.
        let result = m.match_fragment("uhh doc smyth", EntityKind::Provider).await;
        assert_eq!(
            result.resolved.as_ref().map(|e| e.canonical_name.as_str()),
            Some("Dr. Smith")
        );
        assert_eq!(result.method, MatchMethod::Llm);
    }

    #[tokio::test]
    async fn llm_none_answer_leaves_fragment_unresolved() {
        let llm: Arc<dyn LlmClassifier> = Arc::new(FixedLlm {
            choice: None,
            confidence: 0.0,
        });
        let m = matcher(Some(llm));
        let result = m.match_fragment("uhh doc smyth", EntityKind::Provider).await;
        assert!(result.resolved.is_none());
        assert!(!result.candidates.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_best_fuzzy() {
        let m = matcher(Some(Arc::new(FailingLlm)));
        let result = m.match_fragment("uhh doc smyth", EntityKind::Provider).await;
        assert!(result.resolved.is_some());
        assert_eq!(result.method, MatchMethod::Fuzzy);
    }

    #[tokio::test]
    async fn compound_fragment_goes_to_llm() {
        let llm: Arc<dyn LlmClassifier> = Arc::new(FixedLlm {
            choice: Some("Dr. Patel".into()),
            confidence: 0.88,
        });
        let m = matcher(Some(llm));
        let result = m
            .match_fragment("doctor patil or someone else", EntityKind::Provider)
            .await;
        assert_eq!(result.method, MatchMethod::Llm);
        assert_eq!(
            result.resolved.as_ref().map(|e| e.canonical_name.as_str()),
            Some("Dr. Patel")
        );
    }

    #[test]
    fn yes_no_matcher_handles_variants() {
        assert_eq!(match_yes_no("yes please"), Some(true));
        assert_eq!(match_yes_no("Yeah that's right"), Some(true));
        assert_eq!(match_yes_no("no, change it"), Some(false));
        assert_eq!(match_yes_no("hmm not sure"), None);
        assert_eq!(match_yes_no("banana"), None);
    }
}
