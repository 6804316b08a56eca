/// Error type for rule authoring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("No event selected")]
    NoSelectedEvent,
    #[error("Rule text is empty")]
    EmptyRule,
    #[error("A rule change is already being submitted")]
    AlreadySubmitted,
    #[error("No tab selected")]
    NoSelectedTab,
    #[error("Rule store failed: {0}")]
    Submit(String),
}
