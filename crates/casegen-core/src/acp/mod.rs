//! ACP (Agent Client Protocol) implementation
//!
//! This module implements the client side of the ACP protocol for talking to
//! a coding agent via JSON-RPC 2.0 over its stdin/stdout, one message per line.
//!
//! # Architecture
//!
//! The layers stack bottom-up:
//!
//! - `Transport` - Child process lifecycle and line framing
//! - `protocol` - JSON-RPC envelope encode/decode and typed notifications
//! - `RpcClient` - Request/response correlation and inbound dispatch
//! - `AcpConnection` - The `AgentConnection` implementation that enforces
//!   the connection and session lifecycles
//! - `SessionManager` - Per-session state and the event stream
//!
//! Agent-initiated requests are answered through an `AgentClient` delegate.

mod codec;
mod connection;
pub mod protocol;
mod rpc;
mod session;
pub mod traits;
mod transport;

#[cfg(test)]
mod test_support;

// Re-export core traits
pub use traits::{
    AgentClient, AgentConnection, AgentFailure, AutoApprove, PromptMessage, PromptResult,
    SessionEvent, TurnOutcome,
};

// Re-export implementations
pub use codec::{FrameCodec, DEFAULT_MAX_FRAME_BYTES};
pub use connection::{AcpConnection, ConnectionOptions, ConnectionState};
pub use protocol::{AgentNotification, Envelope};
pub use rpc::{DisconnectHandler, NotificationHandler, RpcClient, Subscription};
pub use session::{
    HistoryEntry, HistoryRole, Session, SessionManager, SessionState, ToolCallRecord,
};
pub use transport::{
    DiagnosticPolicy, Inbound, InboundReceiver, TracingObserver, Transport, TransportEvent,
    TransportObserver, TransportOptions,
};
