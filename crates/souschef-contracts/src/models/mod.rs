mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec};
pub use selectors::{ModelSelection, ModelSelector, NoModelAvailable};

/// The job a model is picked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Text,
    Image,
    Audio,
    Embedding,
}

impl Capability {
    pub fn label(self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Image => "image",
            Capability::Audio => "audio",
            Capability::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
