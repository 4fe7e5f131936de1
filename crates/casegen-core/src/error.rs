//! Error types for CaseGen Core

use std::time::Duration;
use thiserror::Error;

/// Main error type for CaseGen operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("ACP protocol error: {0}")]
    Acp(#[from] AcpError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// ACP-specific errors
///
/// The variants fall into four groups that callers must be able to tell
/// apart: the connection died (`Transport`, `ProcessNotRunning`), the agent
/// said no (`Agent`), the call was made out of sequence (usage errors), and
/// the call ran out of time (`Timeout`).
#[derive(Error, Debug, Clone)]
pub enum AcpError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Agent process is not running")]
    ProcessNotRunning,

    #[error("Malformed frame: {0}")]
    Protocol(String),

    #[error("Request timeout: {method} got no response within {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("Agent error {code}: {message}")]
    Agent {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Connection is not initialized")]
    NotInitialized,

    #[error("Connection is already initialized")]
    AlreadyInitialized,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session is closed: {0}")]
    SessionClosed(String),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("A prompt turn is already in flight for session {0}")]
    PromptInFlight(String),

    #[error("Session {session_id} cannot {operation} while {state}")]
    InvalidSessionState {
        session_id: String,
        state: String,
        operation: &'static str,
    },

    #[error("Capability not supported: {0}")]
    CapabilityNotSupported(String),
}

impl AcpError {
    /// The connection is gone; every session on it is closed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::ProcessNotRunning)
    }

    /// The agent answered the call with a JSON-RPC error.
    pub fn is_agent_error(&self) -> bool {
        matches!(self, Self::Agent { .. })
    }

    /// The call was rejected locally without contacting the agent.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::AlreadyInitialized
                | Self::SessionNotFound(_)
                | Self::SessionClosed(_)
                | Self::SessionAlreadyExists(_)
                | Self::PromptInFlight(_)
                | Self::InvalidSessionState { .. }
                | Self::CapabilityNotSupported(_)
        )
    }

    /// Unknown and closed sessions are both "not found" for callers.
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::SessionClosed(_))
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Agent executable not found: {0}")]
    AgentNotFound(String),
}

impl Error {
    /// Borrow the ACP error, if this is one.
    pub fn as_acp(&self) -> Option<&AcpError> {
        match self {
            Error::Acp(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        self.as_acp().is_some_and(AcpError::is_transport)
    }

    pub fn is_agent_error(&self) -> bool {
        self.as_acp().is_some_and(AcpError::is_agent_error)
    }

    pub fn is_usage_error(&self) -> bool {
        self.as_acp().is_some_and(AcpError::is_usage_error)
    }

    pub fn is_session_not_found(&self) -> bool {
        self.as_acp().is_some_and(AcpError::is_session_not_found)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Acp(AcpError::Timeout { .. }))
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport: Error = AcpError::Transport("agent exited".into()).into();
        assert!(transport.is_transport());
        assert!(!transport.is_agent_error());
        assert!(!transport.is_usage_error());

        let agent: Error = AcpError::Agent {
            code: -32000,
            message: "model unavailable".into(),
            data: None,
        }
        .into();
        assert!(agent.is_agent_error());
        assert!(!agent.is_transport());

        let usage: Error = AcpError::NotInitialized.into();
        assert!(usage.is_usage_error());

        let io: Error = std::io::Error::other("boom").into();
        assert!(!io.is_transport());
        assert!(io.as_acp().is_none());
    }

    #[test]
    fn test_closed_session_reads_as_not_found() {
        assert!(AcpError::SessionClosed("s1".into()).is_session_not_found());
        assert!(AcpError::SessionNotFound("s1".into()).is_session_not_found());
        assert!(!AcpError::PromptInFlight("s1".into()).is_session_not_found());
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err: Error = AcpError::ProcessNotRunning.into();
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"ACP protocol error: Agent process is not running\"");
    }
}
