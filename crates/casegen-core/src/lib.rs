//! CaseGen Core Library
//!
//! This crate provides the core functionality for CaseGen, including:
//! - ACP (Agent Client Protocol) transport, JSON-RPC correlation and session management
//! - Client configuration and agent discovery
//! - Reference selection and test-case prompt construction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     casegen-core                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  acp/          - Transport, codec, RPC, sessions            │
//! │  rag/          - Reference selection, prompt building       │
//! │  types/        - Shared wire type definitions               │
//! │  config.rs     - Client configuration                       │
//! │  error.rs      - Error types                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod acp;
pub mod config;
pub mod error;
pub mod rag;
pub mod types;

// Re-export commonly used types
pub use error::{AcpError, ConfigError, Error, Result};
pub use types::*;

// Re-export ACP traits and implementations
pub use acp::{
    // Traits
    AgentClient, AgentConnection,
    // Turn results and events
    AgentFailure, PromptMessage, PromptResult, SessionEvent, TurnOutcome,
    // Implementations
    AcpConnection, AutoApprove, ConnectionOptions, ConnectionState, RpcClient, Session,
    SessionManager, SessionState, Transport, TransportObserver, TracingObserver,
};

pub use config::{AgentCommand, ClientConfig};
