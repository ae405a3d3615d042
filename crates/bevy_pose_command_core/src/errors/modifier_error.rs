use thiserror::Error;

/// Failure reported by a pose modifier. The modifier's contribution is skipped for the frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ModifierError(pub String);

impl ModifierError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
