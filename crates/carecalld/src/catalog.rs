//! Entity catalog: the closed registry of everything the matcher may ever
//! resolve to.
//!
//! Loaded once from configuration at process start, read-only afterwards.
//! An empty catalog for any kind is a startup-fatal configuration error.

use carecall_common::config::{CatalogConfig, EntityDef};
use carecall_common::{CallError, Entity, EntityKind};
use std::collections::HashMap;

#[derive(Debug)]
pub struct EntityCatalog {
    entries: HashMap<EntityKind, Vec<Entity>>,
}

impl EntityCatalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CallError> {
        let mut entries: HashMap<EntityKind, Vec<Entity>> = HashMap::new();

        entries.insert(
            EntityKind::Provider,
            build_entities(&config.providers, EntityKind::Provider),
        );
        let windows: Vec<EntityDef> = config
            .windows
            .iter()
            .map(|w| EntityDef {
                name: w.name.clone(),
                aliases: w.aliases.clone(),
            })
            .collect();
        entries.insert(
            EntityKind::TimeSlot,
            build_entities(&windows, EntityKind::TimeSlot),
        );
        entries.insert(
            EntityKind::UrgencyLevel,
            build_entities(&config.urgency_levels, EntityKind::UrgencyLevel),
        );
        entries.insert(
            EntityKind::Symptom,
            build_entities(&config.symptoms, EntityKind::Symptom),
        );
        entries.insert(
            EntityKind::CallIntent,
            build_entities(&config.intents, EntityKind::CallIntent),
        );

        for (kind, list) in &entries {
            if list.is_empty() {
                return Err(CallError::EmptyCatalog(kind.to_string()));
            }
        }

        Ok(Self { entries })
    }

    /// All known entities of one kind. Order follows the config file, so
    /// clarification prompts list options the way the clinic wrote them.
    pub fn lookup_candidates(&self, kind: EntityKind) -> &[Entity] {
        self.entries.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Canonical names of one kind, for prompts that enumerate options.
    pub fn canonical_names(&self, kind: EntityKind) -> Vec<&str> {
        self.lookup_candidates(kind)
            .iter()
            .map(|e| e.canonical_name.as_str())
            .collect()
    }
}

/// Aliases are lowercased and deduplicated; the canonical name always
/// doubles as an alias so exact mentions score 1.0.
fn build_entities(defs: &[EntityDef], kind: EntityKind) -> Vec<Entity> {
    defs.iter()
        .map(|def| {
            let mut aliases: Vec<String> = Vec::new();
            let mut seen: Vec<String> = Vec::new();
            for raw in std::iter::once(&def.name).chain(def.aliases.iter()) {
                let lower = raw.trim().to_lowercase();
                if lower.is_empty() || seen.contains(&lower) {
                    continue;
                }
                seen.push(lower.clone());
                aliases.push(lower);
            }
            Entity {
                canonical_name: def.name.clone(),
                aliases,
                kind,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecall_common::config::WindowDef;

    fn sample_config() -> CatalogConfig {
        CatalogConfig {
            providers: vec![EntityDef {
                name: "Dr. Smith".into(),
                aliases: vec!["doctor smith".into(), "Doctor Smith".into(), "smith".into()],
            }],
            windows: vec![WindowDef {
                name: "tuesday morning".into(),
                aliases: vec![],
                capacity: 1,
            }],
            urgency_levels: vec![EntityDef {
                name: "high".into(),
                aliases: vec!["urgent".into()],
            }],
            symptoms: vec![EntityDef {
                name: "fever".into(),
                aliases: vec![],
            }],
            intents: vec![EntityDef {
                name: "scheduling".into(),
                aliases: vec!["appointment".into()],
            }],
        }
    }

    #[test]
    fn aliases_are_lowercased_and_deduplicated() {
        let catalog = EntityCatalog::from_config(&sample_config()).unwrap();
        let providers = catalog.lookup_candidates(EntityKind::Provider);
        assert_eq!(providers.len(), 1);
        assert_eq!(
            providers[0].aliases,
            vec!["dr. smith", "doctor smith", "smith"]
        );
    }

    #[test]
    fn empty_kind_fails_at_load() {
        let mut config = sample_config();
        config.symptoms.clear();
        let err = EntityCatalog::from_config(&config).unwrap_err();
        assert!(matches!(err, CallError::EmptyCatalog(_)));
    }
}
