//! ACP (Agent Client Protocol) type definitions
//!
//! Based on the ACP specification at https://agentclientprotocol.com

use super::{ContentBlock, PlanEntry};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// ACP Protocol version supported by this client
pub const ACP_PROTOCOL_VERSION: u32 = 1;

/// JSON-RPC protocol version tag
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Model identifier in `provider/model-name` form
    ModelId
);

string_id!(
    /// Unique identifier for a session mode
    SessionModeId
);

string_id!(
    /// Unique identifier for a config option
    ConfigOptionId
);

impl ModelId {
    /// Provider half of a `provider/model-name` id.
    pub fn provider(&self) -> Option<&str> {
        self.0.split_once('/').map(|(provider, _)| provider)
    }

    /// Model half of a `provider/model-name` id, or the whole id when it
    /// carries no provider.
    pub fn model_name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }
}

/// JSON-RPC request id. Ours are always numeric; agents may use strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Str(String),
}

impl RequestId {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Str(_) => None,
        }
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Str(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// JSON-RPC envelopes
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not supported: {}", method),
        )
    }

    pub fn invalid_params(reason: impl fmt::Display) -> Self {
        Self::new(error_codes::INVALID_PARAMS, reason.to_string())
    }

    pub fn internal(reason: impl fmt::Display) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, reason.to_string())
    }
}

// ============================================================================
// initialize
// ============================================================================

/// Client information sent during initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "casegen".to_string(),
            title: Some("CaseGen".to_string()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client capabilities declared during initialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    #[serde(default)]
    pub fs: FileSystemCapability,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemCapability {
    #[serde(default)]
    pub read_text_file: bool,
    #[serde(default)]
    pub write_text_file: bool,
}

/// Initialize request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: u32,
    pub client_info: ClientInfo,
    pub client_capabilities: ClientCapabilities,
}

/// Initialize response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: u32,
    #[serde(default)]
    pub agent_info: Option<AgentInfo>,
    #[serde(default)]
    pub agent_capabilities: AgentCapabilities,
    #[serde(default)]
    pub auth_methods: Vec<serde_json::Value>,
}

/// Agent information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub version: String,
}

/// Agent capabilities received during initialization
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    #[serde(default)]
    pub load_session: bool,
    #[serde(default)]
    pub prompt_capabilities: PromptCapabilities,
    #[serde(default)]
    pub mcp_capabilities: McpCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptCapabilities {
    #[serde(default)]
    pub image: bool,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub embedded_context: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct McpCapabilities {
    #[serde(default)]
    pub http: bool,
    #[serde(default)]
    pub sse: bool,
}

// ============================================================================
// MCP Server Types (for session creation)
// ============================================================================

/// Name/value pair used for MCP server env vars and headers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvVariable {
    pub name: String,
    pub value: String,
}

/// MCP server configuration for ACP sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServer {
    /// Stdio-based MCP server
    Stdio {
        name: String,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Vec<EnvVariable>,
    },
    /// HTTP-based MCP server
    Http {
        name: String,
        url: String,
        #[serde(default)]
        headers: Vec<EnvVariable>,
    },
    /// SSE-based MCP server
    Sse {
        name: String,
        url: String,
        #[serde(default)]
        headers: Vec<EnvVariable>,
    },
}

impl McpServer {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Stdio {
            name: name.into(),
            command: command.into(),
            args,
            env: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Stdio { name, .. } | Self::Http { name, .. } | Self::Sse { name, .. } => name,
        }
    }
}

// ============================================================================
// session/new, session/load
// ============================================================================

/// Session/new request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNewParams {
    pub cwd: String,
    /// Always present on the wire, `[]` when empty
    pub mcp_servers: Vec<McpServer>,
}

/// Session/load request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoadParams {
    pub session_id: String,
    pub cwd: String,
    pub mcp_servers: Vec<McpServer>,
}

/// Result of session/new and session/load
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetupResult {
    /// Required for session/new, usually absent for session/load
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub models: Option<SessionModelState>,
    #[serde(default)]
    pub modes: Option<SessionModeState>,
    #[serde(default)]
    pub config_options: Option<Vec<SessionConfigOption>>,
}

/// Models block of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModelState {
    pub current_model_id: ModelId,
    #[serde(default)]
    pub available_models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_id: ModelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Modes block of a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModeState {
    pub current_mode_id: SessionModeId,
    #[serde(default)]
    pub available_modes: Vec<SessionMode>,
}

/// A session mode (e.g., "build", "plan")
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMode {
    #[serde(alias = "modeId")]
    pub id: SessionModeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Category of a config option
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOptionCategory {
    Model,
    Mode,
    ThoughtLevel,
    #[serde(other)]
    Other,
}

/// Type tag of a config option
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigOptionKind {
    #[default]
    Select,
    #[serde(other)]
    Unsupported,
}

/// A configuration option declared by the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfigOption {
    pub id: ConfigOptionId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: ConfigOptionCategory,
    #[serde(rename = "type", default)]
    pub kind: ConfigOptionKind,
    pub current_value: String,
    #[serde(default)]
    pub options: Vec<ConfigOptionValue>,
}

/// One selectable value of a config option
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigOptionValue {
    pub value: String,
    #[serde(alias = "label", default)]
    pub name: String,
}

// ============================================================================
// set_model / set_mode / set_config_option / close / cancel
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModelParams {
    pub session_id: String,
    pub model_id: ModelId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeParams {
    pub session_id: String,
    pub mode_id: SessionModeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConfigOptionParams {
    pub session_id: String,
    pub config_id: ConfigOptionId,
    pub value: String,
}

/// Params for requests that only name a session (cancel, close)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdParams {
    pub session_id: String,
}

/// Result of the selection-changing calls; every block is a full replacement
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse {
    #[serde(default)]
    pub current_model_id: Option<ModelId>,
    #[serde(default)]
    pub current_mode_id: Option<SessionModeId>,
    #[serde(default)]
    pub models: Option<SessionModelState>,
    #[serde(default)]
    pub modes: Option<SessionModeState>,
    #[serde(default)]
    pub config_options: Option<Vec<SessionConfigOption>>,
}

// ============================================================================
// session/prompt
// ============================================================================

/// Session/prompt request parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPromptParams {
    pub session_id: String,
    pub prompt: Vec<ContentBlock>,
}

/// Prompt response (completion)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    MaxTurnRequests,
    Refusal,
    Cancelled,
    /// Any stop reason this client does not know; the turn still completed
    #[serde(other)]
    Other,
}

// ============================================================================
// session/update
// ============================================================================

/// Session update notification
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateNotification {
    pub session_id: String,
    pub update: SessionUpdate,
}

impl<'de> Deserialize<'de> for SessionUpdateNotification {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        // ACP shape:
        // { "sessionId": "...", "update": { "sessionUpdate": "...", ... } }
        if value.get("update").is_some() {
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Wrapped {
                session_id: String,
                update: SessionUpdate,
            }

            let wrapped: Wrapped = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Self {
                session_id: wrapped.session_id,
                update: wrapped.update,
            })
        } else {
            // Some agents flatten the union at the top level:
            // { "sessionId": "...", "sessionUpdate": "...", ... }
            #[derive(Deserialize)]
            #[serde(rename_all = "camelCase")]
            struct Flat {
                session_id: String,
                #[serde(flatten)]
                update: SessionUpdate,
            }

            let flat: Flat = serde_json::from_value(value).map_err(de::Error::custom)?;
            Ok(Self {
                session_id: flat.session_id,
                update: flat.update,
            })
        }
    }
}

/// Session update types (union)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    AgentMessageChunk {
        content: ContentBlock,
    },
    UserMessageChunk {
        content: ContentBlock,
    },
    #[serde(alias = "thought_chunk")]
    AgentThoughtChunk {
        content: ContentBlock,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        kind: ToolCallKind,
        #[serde(default)]
        status: ToolCallStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_input: Option<serde_json::Value>,
    },
    #[serde(rename_all = "camelCase")]
    ToolCallUpdate {
        tool_call_id: String,
        #[serde(default)]
        status: Option<ToolCallStatus>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<Vec<ToolCallContent>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<serde_json::Value>,
    },
    Plan {
        entries: Vec<PlanEntry>,
    },
    #[serde(rename_all = "camelCase")]
    AvailableCommandsUpdate {
        available_commands: Vec<AvailableCommand>,
    },
    #[serde(rename_all = "camelCase")]
    CurrentModeUpdate {
        #[serde(alias = "modeId")]
        current_mode_id: SessionModeId,
    },
    #[serde(rename_all = "camelCase")]
    ConfigOptionsUpdate {
        config_options: Vec<SessionConfigOption>,
    },
}

impl SessionUpdate {
    /// Wire tag of this update
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentMessageChunk { .. } => "agent_message_chunk",
            Self::UserMessageChunk { .. } => "user_message_chunk",
            Self::AgentThoughtChunk { .. } => "agent_thought_chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolCallUpdate { .. } => "tool_call_update",
            Self::Plan { .. } => "plan",
            Self::AvailableCommandsUpdate { .. } => "available_commands_update",
            Self::CurrentModeUpdate { .. } => "current_mode_update",
            Self::ConfigOptionsUpdate { .. } => "config_options_update",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Think,
    Fetch,
    SwitchMode,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    Content {
        content: ContentBlock,
    },
    #[serde(rename_all = "camelCase")]
    Diff {
        path: String,
        #[serde(default)]
        old_text: Option<String>,
        new_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Terminal {
        terminal_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableCommand {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Params of the top-level `config_options_update` notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOptionsUpdateParams {
    pub session_id: String,
    pub config_options: Vec<SessionConfigOption>,
}

/// Params of the top-level `current_mode_update` notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentModeUpdateParams {
    pub session_id: String,
    #[serde(alias = "modeId")]
    pub current_mode_id: SessionModeId,
}

// ============================================================================
// session/request_permission (agent -> client)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionParams {
    pub session_id: String,
    #[serde(default)]
    pub tool_call: Option<serde_json::Value>,
    #[serde(default)]
    pub options: Vec<PermissionOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    pub option_id: String,
    #[serde(default)]
    pub name: String,
    pub kind: PermissionOptionKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
    #[serde(other)]
    Other,
}

impl PermissionOptionKind {
    pub fn is_allow(self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// Client's answer to a permission request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    #[serde(rename_all = "camelCase")]
    Selected { option_id: String },
    Cancelled,
}

/// Wire result wrapping a [`PermissionOutcome`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPermissionResult {
    pub outcome: PermissionOutcome,
}

/// Environment overrides as carried in launch configuration
pub type EnvMap = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_model_id_provider_split() {
        let id = ModelId::new("github-copilot/GPT-5-mini");
        assert_eq!(id.provider(), Some("github-copilot"));
        assert_eq!(id.model_name(), "GPT-5-mini");

        let bare = ModelId::new("local");
        assert_eq!(bare.provider(), None);
        assert_eq!(bare.model_name(), "local");
    }

    #[test]
    fn test_session_new_params_always_carry_mcp_servers() {
        let params = SessionNewParams {
            cwd: "/work".into(),
            mcp_servers: Vec::new(),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"cwd": "/work", "mcpServers": []})
        );
    }

    #[test]
    fn test_initialize_params_wire_shape() {
        let params = InitializeParams {
            protocol_version: ACP_PROTOCOL_VERSION,
            client_info: ClientInfo {
                name: "casegen".into(),
                title: None,
                version: "0.1.0".into(),
            },
            client_capabilities: ClientCapabilities::default(),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "protocolVersion": 1,
                "clientInfo": {"name": "casegen", "version": "0.1.0"},
                "clientCapabilities": {
                    "fs": {"readTextFile": false, "writeTextFile": false},
                    "terminal": false
                }
            })
        );
    }

    #[test]
    fn test_setup_result_parses_models_modes_and_config() {
        let result: SessionSetupResult = serde_json::from_value(json!({
            "sessionId": "ses_1",
            "models": {
                "currentModelId": "a/b",
                "availableModels": [{"modelId": "a/b", "name": "B"}, {"modelId": "a/c", "name": "C"}]
            },
            "modes": {
                "currentModeId": "build",
                "availableModes": [{"id": "build", "name": "Build"}, {"id": "plan", "name": "Plan"}]
            },
            "configOptions": [{
                "id": "effort",
                "name": "Thinking",
                "category": "thought_level",
                "type": "select",
                "currentValue": "low",
                "options": [{"value": "low", "name": "Low"}, {"value": "high", "label": "High"}]
            }]
        }))
        .unwrap();

        assert_eq!(result.session_id.as_deref(), Some("ses_1"));
        let models = result.models.unwrap();
        assert_eq!(models.current_model_id.as_str(), "a/b");
        assert_eq!(models.available_models.len(), 2);
        assert_eq!(result.modes.unwrap().available_modes[1].id.as_str(), "plan");
        let options = result.config_options.unwrap();
        assert_eq!(options[0].category, ConfigOptionCategory::ThoughtLevel);
        assert_eq!(options[0].kind, ConfigOptionKind::Select);
        assert_eq!(options[0].options[1].name, "High");
    }

    #[test]
    fn test_unknown_config_category_is_tolerated() {
        let option: SessionConfigOption = serde_json::from_value(json!({
            "id": "x",
            "category": "sandbox",
            "currentValue": "on"
        }))
        .unwrap();
        assert_eq!(option.category, ConfigOptionCategory::Other);
    }

    #[test]
    fn test_session_update_wrapped_and_flat_shapes() {
        let wrapped: SessionUpdateNotification = serde_json::from_value(json!({
            "sessionId": "s1",
            "update": {"sessionUpdate": "agent_message_chunk", "content": {"type": "text", "text": "Hi"}}
        }))
        .unwrap();
        let flat: SessionUpdateNotification = serde_json::from_value(json!({
            "sessionId": "s1",
            "sessionUpdate": "agent_message_chunk",
            "content": {"type": "text", "text": "Hi"}
        }))
        .unwrap();
        assert_eq!(wrapped, flat);
        assert_eq!(wrapped.update.kind(), "agent_message_chunk");
    }

    #[test]
    fn test_thought_chunk_alias() {
        let update: SessionUpdate = serde_json::from_value(json!({
            "sessionUpdate": "thought_chunk",
            "content": {"type": "text", "text": "hmm"}
        }))
        .unwrap();
        assert!(matches!(update, SessionUpdate::AgentThoughtChunk { .. }));
    }

    #[test]
    fn test_tool_call_update_with_content() {
        let update: SessionUpdate = serde_json::from_value(json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": "call_1",
            "status": "completed",
            "content": [
                {"type": "content", "content": {"type": "text", "text": "ok"}},
                {"type": "diff", "path": "/a.md", "newText": "x"}
            ]
        }))
        .unwrap();
        match update {
            SessionUpdate::ToolCallUpdate { status, content, .. } => {
                assert_eq!(status, Some(ToolCallStatus::Completed));
                assert_eq!(content.unwrap().len(), 2);
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_update_kind_fails_to_parse() {
        let result = serde_json::from_value::<SessionUpdate>(json!({"sessionUpdate": "usage_update"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_permission_outcome_wire_shape() {
        let result = RequestPermissionResult {
            outcome: PermissionOutcome::Selected {
                option_id: "allow".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"outcome": {"outcome": "selected", "optionId": "allow"}})
        );
    }
}
