//! Core ACP traits for agent communication
//!
//! - `AgentConnection` - An active, initialized connection to an agent
//! - `AgentClient` - Callback interface for requests the agent sends us

use super::session::Session;
use crate::error::Result;
use crate::types::{
    ClientCapabilities, ConfigOptionId, ContentBlock, InitializeResult, JsonRpcError, McpServer,
    ModelId, PermissionOutcome, PlanEntry, RequestPermissionParams, SessionConfigOption,
    SessionModeId, StopReason, ToolCallContent, ToolCallKind, ToolCallStatus,
};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::debug;

// ============================================================================
// Prompt
// ============================================================================

/// Prompt message to send to agent
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub content: Vec<ContentBlock>,
}

impl PromptMessage {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self { content }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)])
    }

    pub fn with_block(mut self, block: ContentBlock) -> Self {
        self.content.push(block);
        self
    }
}

/// An error the agent returned for a prompt turn
#[derive(Debug, Clone, PartialEq)]
pub struct AgentFailure {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// How a prompt turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The agent finished the turn
    Completed { stop_reason: StopReason },
    /// The turn was cancelled by the client
    Cancelled,
    /// The agent answered the prompt with an error
    Failed(AgentFailure),
}

impl TurnOutcome {
    pub fn from_stop_reason(stop_reason: StopReason) -> Self {
        match stop_reason {
            StopReason::Cancelled => Self::Cancelled,
            other => Self::Completed { stop_reason: other },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Prompt response from agent
#[derive(Debug, Clone, PartialEq)]
pub struct PromptResult {
    pub session_id: String,
    pub outcome: TurnOutcome,
}

// ============================================================================
// Events
// ============================================================================

/// Typed events published to listeners, each tagged with its session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TextDelta {
        session_id: String,
        text: String,
    },
    ThoughtDelta {
        session_id: String,
        text: String,
    },
    ToolStarted {
        session_id: String,
        tool_call_id: String,
        title: String,
        kind: ToolCallKind,
    },
    ToolUpdated {
        session_id: String,
        tool_call_id: String,
        status: ToolCallStatus,
    },
    ToolResult {
        session_id: String,
        tool_call_id: String,
        status: ToolCallStatus,
        content: Vec<ToolCallContent>,
    },
    PlanUpdated {
        session_id: String,
        entries: Vec<PlanEntry>,
    },
    CommandsUpdated {
        session_id: String,
        commands: Vec<String>,
    },
    TurnComplete {
        session_id: String,
        outcome: TurnOutcome,
    },
    ConfigChanged {
        session_id: String,
        options: Vec<SessionConfigOption>,
    },
    ModeChanged {
        session_id: String,
        mode_id: SessionModeId,
    },
    ModelChanged {
        session_id: String,
        model_id: ModelId,
    },
    SessionReady {
        session_id: String,
    },
    SessionClosed {
        session_id: String,
        reason: String,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::TextDelta { session_id, .. }
            | Self::ThoughtDelta { session_id, .. }
            | Self::ToolStarted { session_id, .. }
            | Self::ToolUpdated { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::PlanUpdated { session_id, .. }
            | Self::CommandsUpdated { session_id, .. }
            | Self::TurnComplete { session_id, .. }
            | Self::ConfigChanged { session_id, .. }
            | Self::ModeChanged { session_id, .. }
            | Self::ModelChanged { session_id, .. }
            | Self::SessionReady { session_id }
            | Self::SessionClosed { session_id, .. } => session_id,
        }
    }
}

// ============================================================================
// Agent Connection Trait
// ============================================================================

/// An active connection to an agent.
///
/// Session-scoped calls on unknown ids fail with `SessionNotFound`, on closed
/// ids with `SessionClosed`, without contacting the agent.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Handshake; must be called exactly once before anything else
    async fn initialize(&self, capabilities: ClientCapabilities) -> Result<InitializeResult>;

    /// Create a new session
    async fn new_session(&self, cwd: &Path, mcp_servers: Vec<McpServer>) -> Result<Session>;

    /// Load an existing session, replaying its history
    async fn load_session(
        &self,
        session_id: &str,
        cwd: &Path,
        mcp_servers: Vec<McpServer>,
    ) -> Result<Session>;

    /// Run one prompt turn
    async fn prompt(&self, session_id: &str, message: PromptMessage) -> Result<PromptResult>;

    /// Cancel the in-flight turn of a session
    async fn cancel(&self, session_id: &str) -> Result<()>;

    /// Set the model for a session
    async fn set_model(&self, session_id: &str, model_id: ModelId) -> Result<Session>;

    /// Set the mode for a session
    async fn set_mode(&self, session_id: &str, mode_id: SessionModeId) -> Result<Session>;

    /// Set a config option for a session
    async fn set_config_option(
        &self,
        session_id: &str,
        config_id: ConfigOptionId,
        value: String,
    ) -> Result<Session>;

    /// Close a session
    async fn close_session(&self, session_id: &str) -> Result<()>;

    /// Snapshot of a session's state
    fn session(&self, session_id: &str) -> Option<Session>;

    /// Subscribe to session events
    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent>;

    /// Stop the agent; every session becomes closed
    async fn disconnect(&self) -> Result<()>;
}

// ============================================================================
// Agent Client Trait (Callback Interface)
// ============================================================================

/// Callback interface for handling requests from the agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Answer `session/request_permission`.
    ///
    /// Defaults to picking the first allow option, or cancelling when the
    /// agent offered none.
    async fn request_permission(&self, params: RequestPermissionParams) -> Result<PermissionOutcome> {
        let outcome = params
            .options
            .iter()
            .find(|option| option.kind.is_allow())
            .map(|option| PermissionOutcome::Selected {
                option_id: option.option_id.clone(),
            })
            .unwrap_or(PermissionOutcome::Cancelled);
        debug!(
            "Permission request for session {}: {:?}",
            params.session_id, outcome
        );
        Ok(outcome)
    }

    /// Handle any other agent request.
    async fn handle_request(
        &self,
        method: &str,
        _params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        Err(JsonRpcError::method_not_found(method))
    }
}

/// Client that approves every permission request and supports nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl AgentClient for AutoApprove {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PermissionOption, PermissionOptionKind};

    fn option(id: &str, kind: PermissionOptionKind) -> PermissionOption {
        PermissionOption {
            option_id: id.into(),
            name: id.into(),
            kind,
        }
    }

    #[tokio::test]
    async fn test_auto_approve_picks_first_allow_option() {
        let params = RequestPermissionParams {
            session_id: "s1".into(),
            tool_call: None,
            options: vec![
                option("reject", PermissionOptionKind::RejectOnce),
                option("always", PermissionOptionKind::AllowAlways),
                option("once", PermissionOptionKind::AllowOnce),
            ],
        };
        let outcome = AutoApprove.request_permission(params).await.unwrap();
        assert_eq!(
            outcome,
            PermissionOutcome::Selected {
                option_id: "always".into()
            }
        );
    }

    #[tokio::test]
    async fn test_auto_approve_cancels_without_allow_option() {
        let params = RequestPermissionParams {
            session_id: "s1".into(),
            tool_call: None,
            options: vec![option("reject", PermissionOptionKind::RejectAlways)],
        };
        let outcome = AutoApprove.request_permission(params).await.unwrap();
        assert_eq!(outcome, PermissionOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_agent_request_is_method_not_found() {
        let err = AutoApprove
            .handle_request("fs/read_text_file", None)
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::types::error_codes::METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not supported: fs/read_text_file");
    }

    #[test]
    fn test_turn_outcome_from_stop_reason() {
        assert_eq!(
            TurnOutcome::from_stop_reason(StopReason::Cancelled),
            TurnOutcome::Cancelled
        );
        assert!(TurnOutcome::from_stop_reason(StopReason::EndTurn).is_success());
    }

    #[test]
    fn test_prompt_message_builder() {
        let msg = PromptMessage::text("Hello").with_block(ContentBlock::ResourceLink {
            uri: "file:///tmp/a.md".into(),
            name: "a.md".into(),
        });
        assert_eq!(msg.content.len(), 2);
        assert_eq!(msg.content[0].as_text(), Some("Hello"));
    }

    #[test]
    fn test_event_session_id() {
        let event = SessionEvent::SessionReady {
            session_id: "s9".into(),
        };
        assert_eq!(event.session_id(), "s9");
    }
}
