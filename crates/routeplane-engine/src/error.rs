use routeplane_common::FieldErrors;
use thiserror::Error;

/// Errors returned alongside changes and problems
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Some GlobalConfiguration listeners were dropped
    #[error("{0}")]
    InvalidListeners(FieldErrors),
}

impl ConfigurationError {
    pub fn field_errors(&self) -> &FieldErrors {
        match self {
            ConfigurationError::InvalidListeners(errs) => errs,
        }
    }
}
