use thiserror::Error;

use super::registry::{ModelRegistry, ModelSpec};
use super::Capability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    /// Set when a requested override could not be honoured.
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no {capability} model is registered for provider '{provider}'")]
pub struct NoModelAvailable {
    pub capability: Capability,
    pub provider: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    /// Honours `requested` when the registry says it serves `capability` on
    /// `provider`; otherwise uses the provider default and explains why.
    pub fn select(
        &self,
        requested: Option<&str>,
        capability: Capability,
        provider: &str,
    ) -> Result<ModelSelection, NoModelAvailable> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());
        if let Some(model) =
            requested.and_then(|name| self.registry.serving(name, provider, capability))
        {
            return Ok(ModelSelection {
                model: model.clone(),
                fallback_reason: None,
            });
        }

        let model = self
            .registry
            .default_for(provider, capability)
            .ok_or_else(|| NoModelAvailable {
                capability,
                provider: provider.to_string(),
            })?;
        Ok(ModelSelection {
            model: model.clone(),
            fallback_reason: requested.map(|name| {
                format!("model '{name}' cannot serve {capability} on provider '{provider}'")
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_a_valid_override() -> Result<(), NoModelAvailable> {
        let selection =
            ModelSelector::default().select(Some("gemini-2.5-pro"), Capability::Text, "gemini")?;
        assert_eq!(selection.model.name, "gemini-2.5-pro");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn override_for_another_provider_falls_back() -> Result<(), NoModelAvailable> {
        let selection =
            ModelSelector::default().select(Some("gemini-2.5-flash"), Capability::Text, "dryrun")?;
        assert_eq!(selection.model.name, "dryrun-text-1");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("model 'gemini-2.5-flash' cannot serve text on provider 'dryrun'")
        );
        Ok(())
    }

    #[test]
    fn blank_override_is_no_override() -> Result<(), NoModelAvailable> {
        let selection = ModelSelector::default().select(Some("  "), Capability::Image, "dryrun")?;
        assert_eq!(selection.model.name, "dryrun-image-1");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn unknown_provider_has_no_models() {
        let registry = ModelRegistry::from_specs([ModelSpec::new("t", "gemini", Capability::Text)]);
        let err = ModelSelector::new(registry).select(None, Capability::Audio, "gemini");
        assert_eq!(
            err.map(|selection| selection.model.name),
            Err(NoModelAvailable {
                capability: Capability::Audio,
                provider: "gemini".to_string(),
            })
        );
    }
}
