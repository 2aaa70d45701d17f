use thiserror::Error;

/// Field-level validation failure raised by the preference collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failure reported by a content provider for a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("API key rejected: {0}")]
    InvalidCredential(String),
    #[error("content blocked by provider safety filters: {0}")]
    Unsafe(String),
    #[error("provider request failed: {0}")]
    Transient(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// User-facing outcome of a failed submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(#[from] FieldError),
    #[error("add a Gemini API key first (`souschef key set <KEY>`)")]
    MissingCredential,
    #[error("the API key was rejected: {0}")]
    InvalidCredential(String),
    #[error("human verification expired; run `souschef verify` and try again")]
    VerificationRequired,
    #[error("that request was flagged as unsafe content; try different preferences")]
    Unsafe(String),
    #[error("the service is overloaded, please try again later ({attempts} attempt(s): {detail})")]
    Overloaded { attempts: usize, detail: String },
    #[error("another generation is still running")]
    Busy,
}

impl GenerationError {
    pub fn from_provider(err: ProviderError, attempts: usize) -> Self {
        match err {
            ProviderError::MissingCredential => Self::MissingCredential,
            ProviderError::InvalidCredential(detail) => Self::InvalidCredential(detail),
            ProviderError::Unsafe(detail) => Self::Unsafe(detail),
            ProviderError::Transient(detail) => Self::Overloaded { attempts, detail },
        }
    }

    /// Stable short label used in activity events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::VerificationRequired => "verification_required",
            Self::Unsafe(_) => "unsafe",
            Self::Overloaded { .. } => "overloaded",
            Self::Busy => "busy",
        }
    }
}
