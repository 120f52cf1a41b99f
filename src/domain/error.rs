//! Domain error types.

/// Failure inside an indicator computation. Never escapes the regime
/// classifier; it collapses the result to the unknown regime instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("{indicator} period must be at least 1")]
    ZeroPeriod { indicator: String },

    #[error("{indicator} received a non-finite input at bar {index}")]
    NonFiniteInput { indicator: String, index: usize },
}

/// Top-level error type for regimetrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error("execution error: {reason}")]
    Execution { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        TraderError::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Validation { .. } => 3,
            TraderError::Data { .. } => 4,
            TraderError::Execution { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
