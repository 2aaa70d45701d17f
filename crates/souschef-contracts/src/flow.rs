use crate::errors::GenerationError;

/// Per-generator UI state: `Idle -> Submitting -> {Success, Failed} -> Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GeneratorState {
    #[default]
    Idle,
    Submitting,
    Success,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct GeneratorFlow {
    state: GeneratorState,
}

impl GeneratorFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    /// Starts a submission. Only one may be outstanding; a failed or
    /// finished generator accepts a new one straight away.
    pub fn begin(&mut self) -> Result<(), GenerationError> {
        if self.state == GeneratorState::Submitting {
            return Err(GenerationError::Busy);
        }
        self.state = GeneratorState::Submitting;
        Ok(())
    }

    pub fn succeed(&mut self) {
        self.state = GeneratorState::Success;
    }

    pub fn fail(&mut self, err: &GenerationError) {
        self.state = GeneratorState::Failed(err.to_string());
    }

    /// "Generate another": drops the result and returns to the form.
    pub fn reset(&mut self) {
        self.state = GeneratorState::Idle;
    }

    pub fn is_submitting(&self) -> bool {
        self.state == GeneratorState::Submitting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_second_submission_while_outstanding() {
        let mut flow = GeneratorFlow::new();
        assert!(flow.begin().is_ok());
        assert_eq!(flow.begin(), Err(GenerationError::Busy));
        flow.succeed();
        assert_eq!(flow.state(), &GeneratorState::Success);
        flow.reset();
        assert_eq!(flow.state(), &GeneratorState::Idle);
    }

    #[test]
    fn failure_does_not_lock_the_form() {
        let mut flow = GeneratorFlow::new();
        flow.begin().ok();
        flow.fail(&GenerationError::MissingCredential);
        assert!(matches!(flow.state(), GeneratorState::Failed(_)));
        assert!(flow.begin().is_ok());
        assert!(flow.is_submitting());
    }
}
