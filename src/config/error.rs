use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration option {option} out of range: {reason}")]
    OutOfRange { option: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn out_of_range(option: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::OutOfRange {
            option,
            reason: reason.into(),
        }
    }
}
