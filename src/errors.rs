use std::time::Duration;

/// All error types that can occur while syncing with a bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A bridge transport operation failed (connection refused, HTTP error,
    /// malformed body). Reported by the host's `BridgeClient`.
    #[error("bridge {action} error: {message}")]
    Transport { action: String, message: String },

    /// A command had a shape the normalizer does not recognize.
    #[error("unrecognized command shape: {0}")]
    UnrecognizedCommand(String),

    /// A command object carried no applicable attribute.
    #[error("empty command; no attributes set")]
    EmptyCommand,

    /// A color command was sent to a device without a matching capability.
    #[error("device {id} does not support {representation}")]
    UnsupportedColor { id: String, representation: String },

    /// The engine's first poll failed during startup.
    #[error("engine start failed: {0}")]
    StartFailed(String),

    /// The configured poll interval is below the supported floor.
    #[error("poll interval {0:?} is below the 500ms floor")]
    IntervalTooShort(Duration),
}

impl Error {
    /// Create a new transport error.
    pub fn transport(action: &str, message: impl ToString) -> Self {
        Error::Transport {
            action: action.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a new unsupported-color error.
    pub fn unsupported_color(id: &str, representation: &str) -> Self {
        Error::UnsupportedColor {
            id: id.to_string(),
            representation: representation.to_string(),
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
