//! Debugger service errors

/// Failure talking to the debugger service
#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    #[error("No credentials available for {0}")]
    NotLoggedIn(String),

    #[error("Access denied ({status}): {message}")]
    AccessDenied { status: u16, message: String },

    /// Returned by hanging gets when the wait token no longer matches
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Debugger service returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Debugger service returned no response")]
    NoResponse,

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl DebuggerError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => DebuggerError::AccessDenied { status, message },
            409 => DebuggerError::Conflict(message),
            408 | 504 => DebuggerError::Timeout,
            _ => DebuggerError::Status { status, message },
        }
    }

    /// Timeouts and conflicts are normal outcomes of a hanging list call
    pub fn is_expected_poll_outcome(&self) -> bool {
        matches!(self, DebuggerError::Timeout | DebuggerError::Conflict(_))
    }
}

impl From<reqwest::Error> for DebuggerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DebuggerError::Timeout
        } else if err.is_decode() {
            DebuggerError::Transport(format!("decode: {}", err))
        } else if let Some(status) = err.status() {
            DebuggerError::from_status(status.as_u16(), err.to_string())
        } else {
            DebuggerError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DebuggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(DebuggerError::from_status(401, "x"), DebuggerError::AccessDenied { status: 401, .. }));
        assert!(matches!(DebuggerError::from_status(403, "x"), DebuggerError::AccessDenied { status: 403, .. }));
        assert!(matches!(DebuggerError::from_status(409, "x"), DebuggerError::Conflict(_)));
        assert!(matches!(DebuggerError::from_status(504, "x"), DebuggerError::Timeout));
        assert!(matches!(DebuggerError::from_status(500, "x"), DebuggerError::Status { status: 500, .. }));
    }

    #[test]
    fn test_expected_poll_outcomes() {
        assert!(DebuggerError::Timeout.is_expected_poll_outcome());
        assert!(DebuggerError::Conflict("stale".into()).is_expected_poll_outcome());
        assert!(!DebuggerError::NoResponse.is_expected_poll_outcome());
        assert!(!DebuggerError::NotLoggedIn("a@b".into()).is_expected_poll_outcome());
    }
}
