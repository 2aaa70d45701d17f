use indexmap::IndexMap;

use super::Capability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capability: Capability,
}

impl ModelSpec {
    pub fn new(name: &str, provider: &str, capability: Capability) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            capability,
        }
    }
}

// The first entry for a provider and capability is that provider's default.
const BUILTIN_MODELS: &[(&str, &str, Capability)] = &[
    ("gemini-2.5-flash", "gemini", Capability::Text),
    ("gemini-2.5-pro", "gemini", Capability::Text),
    ("gemini-2.5-flash-image", "gemini", Capability::Image),
    ("gemini-2.5-flash-preview-tts", "gemini", Capability::Audio),
    ("text-embedding-004", "gemini", Capability::Embedding),
    ("gemini-embedding-001", "gemini", Capability::Embedding),
    ("dryrun-text-1", "dryrun", Capability::Text),
    ("dryrun-image-1", "dryrun", Capability::Image),
    ("dryrun-audio-1", "dryrun", Capability::Audio),
    ("dryrun-embed-1", "dryrun", Capability::Embedding),
];

/// Known models keyed by name, in registration order.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    by_name: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::from_specs(
            BUILTIN_MODELS
                .iter()
                .map(|(name, provider, capability)| ModelSpec::new(name, provider, *capability)),
        )
    }
}

impl ModelRegistry {
    pub fn from_specs(specs: impl IntoIterator<Item = ModelSpec>) -> Self {
        Self {
            by_name: specs
                .into_iter()
                .map(|spec| (spec.name.clone(), spec))
                .collect(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&ModelSpec> {
        self.by_name.get(name.trim())
    }

    pub fn default_for(&self, provider: &str, capability: Capability) -> Option<&ModelSpec> {
        self.by_name
            .values()
            .find(|spec| spec.provider == provider && spec.capability == capability)
    }

    /// `name`, but only when it is registered for exactly this provider and job.
    pub fn serving(
        &self,
        name: &str,
        provider: &str,
        capability: Capability,
    ) -> Option<&ModelSpec> {
        self.lookup(name)
            .filter(|spec| spec.provider == provider && spec.capability == capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Capability; 4] = [
        Capability::Text,
        Capability::Image,
        Capability::Audio,
        Capability::Embedding,
    ];

    #[test]
    fn both_providers_have_a_default_for_every_capability() {
        let registry = ModelRegistry::default();
        for provider in ["gemini", "dryrun"] {
            for capability in ALL {
                assert!(
                    registry.default_for(provider, capability).is_some(),
                    "{provider} lacks {capability}"
                );
            }
        }
        assert_eq!(
            registry
                .default_for("gemini", Capability::Embedding)
                .map(|spec| spec.name.as_str()),
            Some("text-embedding-004")
        );
    }

    #[test]
    fn serving_checks_provider_and_capability() {
        let registry = ModelRegistry::default();
        assert!(registry.serving("gemini-2.5-pro", "gemini", Capability::Text).is_some());
        assert!(registry.serving("gemini-2.5-pro", "gemini", Capability::Image).is_none());
        assert!(registry.serving("gemini-2.5-pro", "dryrun", Capability::Text).is_none());
        assert!(registry.serving("nope", "gemini", Capability::Text).is_none());
    }
}
