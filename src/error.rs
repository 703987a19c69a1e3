//! Error taxonomy for configuration, loading, input and generation failures

use std::fmt;
use serde::Serialize;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Every way a chat operation can fail
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// A setting is missing or out of range. Fatal at startup.
    #[error("Configuration error for {parameter}: {message}")]
    Config {
        /// Offending setting
        parameter: String,
        /// What is wrong with it
        message: String,
    },

    /// Artifacts could not be fetched, parsed or placed on the device
    #[error("Failed to load model '{model_id}': {message}")]
    ModelLoad {
        /// Identifier that was attempted
        model_id: String,
        /// Full cause chain, flattened
        message: String,
        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },

    /// User input rejected before reaching the model
    #[error("Invalid input: {0}")]
    InvalidInput(InputRejection),

    /// A request is already in flight on this session
    #[error("Session is busy with another request")]
    Busy,

    /// Encoding, sampling or decoding failed
    #[error("{kind} failure: {message}")]
    Generation {
        /// Which fallback applies
        kind: FailureKind,
        /// Runtime error text
        message: String,
    },
}

/// Why the validator refused a piece of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputRejection {
    /// Nothing left after trimming whitespace and control characters
    Empty,
    /// Raw input longer than the configured character limit
    TooLong {
        /// Characters received
        chars: usize,
        /// Configured limit
        max: usize,
    },
}

impl fmt::Display for InputRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputRejection::Empty => write!(f, "input is empty"),
            InputRejection::TooLong { chars, max } => {
                write!(f, "input has {} characters, limit is {}", chars, max)
            }
        }
    }
}

/// Failure kinds the fallback policy knows how to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No model could be loaded
    ModelLoad,
    /// Sampling or decoding failed
    Generation,
    /// The compute device faulted
    Device,
}

impl FailureKind {
    /// Tag written to the event log
    pub fn event_name(&self) -> &'static str {
        match self {
            FailureKind::ModelLoad => "MODEL_LOAD_ERROR",
            FailureKind::Generation => "GENERATION_ERROR",
            FailureKind::Device => "DEVICE_ERROR",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ModelLoad => write!(f, "Model load"),
            FailureKind::Generation => write!(f, "Generation"),
            FailureKind::Device => write!(f, "Device"),
        }
    }
}

impl ChatError {
    pub(crate) fn config(parameter: &str, message: impl Into<String>) -> Self {
        ChatError::Config {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn model_load(model_id: &str, err: impl Into<anyhow::Error>) -> Self {
        let err = err.into();
        ChatError::ModelLoad {
            model_id: model_id.to_string(),
            message: format!("{:#}", err),
            source: err,
        }
    }

    pub(crate) fn generation(kind: FailureKind, message: impl Into<String>) -> Self {
        ChatError::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Short corrective text suitable for showing to the person typing
    pub fn user_message(&self) -> String {
        match self {
            ChatError::InvalidInput(InputRejection::Empty) => {
                "Please provide a valid input.".to_string()
            }
            ChatError::InvalidInput(InputRejection::TooLong { max, .. }) => {
                format!("Please keep messages under {} characters.", max)
            }
            ChatError::Busy => {
                "Still working on your previous message. Please wait a moment.".to_string()
            }
            ChatError::ModelLoad { .. } => crate::fallback::MODEL_LOAD_FALLBACK.to_string(),
            other => other.to_string(),
        }
    }
}

/// Classification helpers used to decide how far an error may travel
pub trait ErrorExt {
    /// Errors that must stop startup
    fn is_fatal(&self) -> bool;
    /// Errors a session absorbs without crashing
    fn is_recoverable(&self) -> bool;
    /// The fallback category for this error, if it has one
    fn failure_kind(&self) -> Option<FailureKind>;
}

impl ErrorExt for ChatError {
    fn is_fatal(&self) -> bool {
        matches!(self, ChatError::Config { .. } | ChatError::ModelLoad { .. })
    }

    fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ChatError::ModelLoad { .. } => Some(FailureKind::ModelLoad),
            ChatError::Generation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ChatError::generation(FailureKind::Device, "CUDA out of memory");
        assert_eq!(error.to_string(), "Device failure: CUDA out of memory");

        let error = ChatError::config("temperature", "must be in (0, 1]");
        assert_eq!(
            error.to_string(),
            "Configuration error for temperature: must be in (0, 1]"
        );
    }

    #[test]
    fn test_error_classification() {
        let load = ChatError::model_load("missing/model", anyhow::anyhow!("404"));
        assert!(load.is_fatal());
        assert_eq!(load.failure_kind(), Some(FailureKind::ModelLoad));

        assert!(ChatError::Busy.is_recoverable());
        assert_eq!(ChatError::Busy.failure_kind(), None);

        let invalid = ChatError::InvalidInput(InputRejection::Empty);
        assert!(invalid.is_recoverable());
        assert_eq!(invalid.user_message(), "Please provide a valid input.");
    }

    #[test]
    fn test_model_load_keeps_source() {
        use std::error::Error as _;
        let err = ChatError::model_load("x", anyhow::anyhow!("artifact unreachable"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("artifact unreachable"));
        assert_eq!(err.user_message(), crate::fallback::MODEL_LOAD_FALLBACK);
    }
}
