use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Invalid trigger status: {0}")]
    InvalidTriggerStatus(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
