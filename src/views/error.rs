//! View error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    /// Template loading or rendering failed
    #[error("Template error: {0}")]
    TemplateError(String),
}
