//! ACP Connection implementation
//!
//! This module implements the `AgentConnection` trait on top of the
//! correlating [`RpcClient`]. It enforces the connection and session
//! lifecycles locally, so out-of-sequence calls fail without touching the
//! transport.

use super::protocol::{self, methods, AgentNotification};
use super::rpc::{RpcClient, Subscription};
use super::session::{Session, SessionManager, SessionState};
use super::traits::{
    AgentClient, AgentConnection, AgentFailure, PromptMessage, PromptResult, SessionEvent,
    TurnOutcome,
};
use super::transport::{InboundReceiver, Transport, TransportObserver, TracingObserver};
use crate::config::ClientConfig;
use crate::error::{AcpError, Error, Result};
use crate::types::{
    error_codes, AgentCapabilities, AgentInfo, ClientCapabilities, ClientInfo, ConfigOptionId,
    InitializeParams, InitializeResult, JsonRpcNotification, McpServer, ModelId, PromptResponse,
    SelectionResponse, SessionIdParams, SessionLoadParams, SessionModeId, SessionNewParams,
    SessionPromptParams, SessionSetupResult, SetConfigOptionParams, SetModeParams, SetModelParams,
    ACP_PROTOCOL_VERSION,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unstarted,
    Initializing,
    Initialized,
    Closed,
}

/// Knobs for an [`AcpConnection`]
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub client_info: ClientInfo,
    /// Timeout for every request except `session/prompt`
    pub call_timeout: Option<Duration>,
    pub prompt_timeout: Option<Duration>,
    pub cancel_on_timeout: bool,
    pub event_capacity: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            client_info: ClientInfo::default(),
            call_timeout: None,
            prompt_timeout: None,
            cancel_on_timeout: false,
            event_capacity: 256,
        }
    }
}

impl From<&ClientConfig> for ConnectionOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            client_info: config.client_info.clone(),
            call_timeout: config.call_timeout(),
            prompt_timeout: config.prompt_timeout(),
            cancel_on_timeout: config.cancel_on_timeout,
            event_capacity: config.event_capacity,
        }
    }
}

/// The selection a set_* call asked for
enum Selection {
    Model(ModelId),
    Mode(SessionModeId),
    ConfigOption(ConfigOptionId, String),
}

/// Returns a session from `PromptInFlight` to `Active` when the turn ends,
/// including when the prompt future is dropped before the agent answers.
struct TurnGuard {
    sessions: Arc<SessionManager>,
    session_id: String,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        // Closed sessions stay closed; everything else is ready for the next turn.
        if let Err(e) = self
            .sessions
            .with_session_mut(&self.session_id, Session::finish_prompt)
        {
            debug!("Turn ended for {} without a session: {}", self.session_id, e);
        }
    }
}

/// ACP Connection for communicating with an agent
pub struct AcpConnection {
    /// Agent name
    name: String,
    rpc: RpcClient,
    sessions: Arc<SessionManager>,
    state: Arc<Mutex<ConnectionState>>,
    /// Agent's answer to `initialize`
    init: RwLock<Option<InitializeResult>>,
    options: ConnectionOptions,
    _subscriptions: Vec<Subscription>,
}

impl AcpConnection {
    /// Spawn the configured agent and wire a connection to it.
    pub async fn spawn(
        name: impl Into<String>,
        config: &ClientConfig,
        delegate: Arc<dyn AgentClient>,
    ) -> Result<Self> {
        let name = name.into();
        info!("Connecting to agent: {} ({})", name, config.agent.command);

        let observers: Vec<Arc<dyn TransportObserver>> = vec![Arc::new(TracingObserver)];
        let (transport, inbound) =
            Transport::spawn(&config.agent, &config.transport_options(), observers).await?;

        Ok(Self::from_transport(
            name,
            transport,
            inbound,
            delegate,
            ConnectionOptions::from(config),
        ))
    }

    /// Wire a connection over an already running transport.
    pub fn from_transport(
        name: impl Into<String>,
        transport: Transport,
        inbound: InboundReceiver,
        delegate: Arc<dyn AgentClient>,
        options: ConnectionOptions,
    ) -> Self {
        let rpc = RpcClient::new(transport, inbound, delegate, options.call_timeout);
        let sessions = Arc::new(SessionManager::new(options.event_capacity));
        let state = Arc::new(Mutex::new(ConnectionState::Unstarted));

        let mut subscriptions: Vec<Subscription> = AgentNotification::METHODS
            .iter()
            .map(|method| {
                let sessions = Arc::clone(&sessions);
                rpc.subscribe(
                    method,
                    Arc::new(move |notification: &JsonRpcNotification| {
                        match AgentNotification::parse(notification) {
                            Ok(Some(parsed)) => sessions.apply(parsed.into_session_update()),
                            Ok(None) => {}
                            Err(e) => {
                                warn!("Dropping {} notification: {}", notification.method, e)
                            }
                        }
                    }),
                )
            })
            .collect();

        subscriptions.push(rpc.on_disconnect({
            let sessions = Arc::clone(&sessions);
            let state = Arc::clone(&state);
            Arc::new(move |reason: &str| {
                info!("Agent connection closed: {}", reason);
                *state.lock() = ConnectionState::Closed;
                sessions.close_all(reason);
            })
        }));

        Self {
            name: name.into(),
            rpc,
            sessions,
            state,
            init: RwLock::new(None),
            options,
            _subscriptions: subscriptions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Agent capabilities from initialization
    pub fn capabilities(&self) -> Option<AgentCapabilities> {
        self.init
            .read()
            .as_ref()
            .map(|init| init.agent_capabilities.clone())
    }

    pub fn agent_info(&self) -> Option<AgentInfo> {
        self.init.read().as_ref().and_then(|init| init.agent_info.clone())
    }

    /// Snapshots of every known session, closed ones included.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions
            .ids()
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }

    pub fn transport_pid(&self) -> Option<u32> {
        self.rpc.transport().pid()
    }

    fn ensure_initialized(&self) -> Result<()> {
        match *self.state.lock() {
            ConnectionState::Initialized => Ok(()),
            ConnectionState::Unstarted | ConnectionState::Initializing => {
                Err(Error::Acp(AcpError::NotInitialized))
            }
            ConnectionState::Closed => Err(Error::Acp(AcpError::ProcessNotRunning)),
        }
    }

    /// Validate the connection and session before a session-scoped call.
    fn ensure_session(&self, session_id: &str, operation: &'static str) -> Result<()> {
        self.ensure_initialized()?;
        self.sessions.ensure_usable(session_id, operation)
    }

    async fn send_cancel(&self, session_id: &str) -> Result<()> {
        let params = protocol::to_params(&SessionIdParams {
            session_id: session_id.to_string(),
        })?;
        self.rpc.notify(methods::SESSION_CANCEL, Some(params)).await
    }

    /// Fold a set_* response into the session. Every category the agent
    /// returned replaces ours in full; a bare acknowledgement makes the
    /// requested value current.
    fn apply_selection(
        &self,
        session_id: &str,
        response: SelectionResponse,
        requested: Selection,
    ) -> Result<Session> {
        let (session, events) = self.sessions.with_session_mut(session_id, |s| {
            let prev_model = s.current_model().cloned();
            let prev_mode = s.current_mode().cloned();

            let model_reported = response.models.is_some() || response.current_model_id.is_some();
            let mode_reported = response.modes.is_some() || response.current_mode_id.is_some();
            let mut config_changed = response.config_options.is_some();

            if let Some(models) = response.models {
                s.models = Some(models);
            }
            if let Some(model_id) = response.current_model_id {
                s.set_current_model(model_id);
            }
            if let Some(modes) = response.modes {
                s.modes = Some(modes);
            }
            if let Some(mode_id) = response.current_mode_id {
                s.set_current_mode(mode_id);
            }
            if let Some(options) = response.config_options {
                s.replace_config_options(options);
            }

            match requested {
                Selection::Model(model_id) if !model_reported => {
                    s.set_current_model(model_id);
                }
                Selection::Mode(mode_id) if !mode_reported => {
                    s.set_current_mode(mode_id);
                }
                Selection::ConfigOption(config_id, value) if !config_changed => {
                    if let Some(option) = s.config_options.iter_mut().find(|o| o.id == config_id) {
                        option.current_value = value;
                        config_changed = true;
                    }
                }
                _ => {}
            }

            let mut events = Vec::new();
            if let Some(model_id) = s.current_model().filter(|m| Some(*m) != prev_model.as_ref()) {
                events.push(SessionEvent::ModelChanged {
                    session_id: s.id.clone(),
                    model_id: model_id.clone(),
                });
            }
            if let Some(mode_id) = s.current_mode().filter(|m| Some(*m) != prev_mode.as_ref()) {
                events.push(SessionEvent::ModeChanged {
                    session_id: s.id.clone(),
                    mode_id: mode_id.clone(),
                });
            }
            if config_changed {
                events.push(SessionEvent::ConfigChanged {
                    session_id: s.id.clone(),
                    options: s.config_options.clone(),
                });
            }
            (s.clone(), events)
        })?;

        for event in events {
            self.sessions.publish(event);
        }
        Ok(session)
    }
}

#[async_trait]
impl AgentConnection for AcpConnection {
    async fn initialize(&self, capabilities: ClientCapabilities) -> Result<InitializeResult> {
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Unstarted => *state = ConnectionState::Initializing,
                ConnectionState::Initializing | ConnectionState::Initialized => {
                    return Err(Error::Acp(AcpError::AlreadyInitialized))
                }
                ConnectionState::Closed => return Err(Error::Acp(AcpError::ProcessNotRunning)),
            }
        }

        info!("Initializing ACP connection for {}", self.name);
        let params = InitializeParams {
            protocol_version: ACP_PROTOCOL_VERSION,
            client_info: self.options.client_info.clone(),
            client_capabilities: capabilities,
        };

        let result = match self
            .rpc
            .call(methods::INITIALIZE, Some(protocol::to_params(&params)?))
            .await
            .and_then(|value| protocol::parse_result::<InitializeResult>(methods::INITIALIZE, value))
        {
            Ok(result) => result,
            Err(e) => {
                let mut state = self.state.lock();
                if *state == ConnectionState::Initializing {
                    *state = ConnectionState::Unstarted;
                }
                return Err(e);
            }
        };

        if result.protocol_version != ACP_PROTOCOL_VERSION {
            warn!(
                "Protocol version mismatch: expected {}, got {}",
                ACP_PROTOCOL_VERSION, result.protocol_version
            );
        }
        match &result.agent_info {
            Some(agent) => debug!("Agent initialized: {} v{}", agent.name, agent.version),
            None => debug!("Agent initialized (no agent info provided)"),
        }

        *self.init.write() = Some(result.clone());
        {
            let mut state = self.state.lock();
            if *state == ConnectionState::Initializing {
                *state = ConnectionState::Initialized;
            }
        }
        info!("ACP connection initialized successfully for {}", self.name);
        Ok(result)
    }

    async fn new_session(&self, cwd: &Path, mcp_servers: Vec<McpServer>) -> Result<Session> {
        self.ensure_initialized()?;

        let cwd = cwd.to_string_lossy().into_owned();
        let params = SessionNewParams {
            cwd: cwd.clone(),
            mcp_servers,
        };
        let value = self
            .rpc
            .call(methods::SESSION_NEW, Some(protocol::to_params(&params)?))
            .await?;
        let result: SessionSetupResult = protocol::parse_result(methods::SESSION_NEW, value)?;

        let session_id = result.session_id.clone().ok_or_else(|| {
            Error::Acp(AcpError::Protocol(
                "session/new result has no sessionId".to_string(),
            ))
        })?;

        let mut session = Session::new(&session_id, cwd, SessionState::Active);
        session.apply_setup(result);
        self.sessions.insert(session)?;
        info!("Session created: {}", session_id);

        self.sessions.publish(SessionEvent::SessionReady {
            session_id: session_id.clone(),
        });
        self.sessions
            .get(&session_id)
            .ok_or(Error::Acp(AcpError::SessionNotFound(session_id)))
    }

    async fn load_session(
        &self,
        session_id: &str,
        cwd: &Path,
        mcp_servers: Vec<McpServer>,
    ) -> Result<Session> {
        self.ensure_initialized()?;
        if !self.capabilities().is_some_and(|caps| caps.load_session) {
            return Err(Error::Acp(AcpError::CapabilityNotSupported(
                "loadSession".to_string(),
            )));
        }

        let cwd = cwd.to_string_lossy().into_owned();
        // Registered first so replayed updates have somewhere to land.
        self.sessions
            .insert(Session::new(session_id, cwd.clone(), SessionState::Loading))?;

        let params = SessionLoadParams {
            session_id: session_id.to_string(),
            cwd,
            mcp_servers,
        };
        let loaded = match protocol::to_params(&params) {
            Ok(params) => self.rpc.call(methods::SESSION_LOAD, Some(params)).await,
            Err(e) => Err(e),
        }
        .and_then(|value| {
            protocol::parse_result_or_default::<SessionSetupResult>(methods::SESSION_LOAD, value)
        });

        let result = match loaded {
            Ok(result) => result,
            Err(e) => {
                warn!("Failed to load session {}: {}", session_id, e);
                self.sessions.remove(session_id);
                return Err(e);
            }
        };

        let session = self.sessions.with_session_mut(session_id, |s| {
            if s.state != SessionState::Loading {
                return Err(Error::Acp(AcpError::SessionClosed(s.id.clone())));
            }
            s.apply_setup(result);
            s.state = SessionState::Active;
            Ok(s.clone())
        })??;

        info!(
            "Session loaded: {} ({} history entries)",
            session_id,
            session.history.len()
        );
        self.sessions.publish(SessionEvent::SessionReady {
            session_id: session_id.to_string(),
        });
        Ok(session)
    }

    async fn prompt(&self, session_id: &str, message: PromptMessage) -> Result<PromptResult> {
        self.ensure_initialized()?;
        self.sessions
            .with_session_mut(session_id, Session::begin_prompt)??;
        let turn = TurnGuard {
            sessions: Arc::clone(&self.sessions),
            session_id: session_id.to_string(),
        };

        debug!(
            "Prompting session {} with {} blocks",
            session_id,
            message.content.len()
        );
        let params = SessionPromptParams {
            session_id: session_id.to_string(),
            prompt: message.content,
        };
        let response = match protocol::to_params(&params) {
            Ok(params) => {
                self.rpc
                    .call_with_timeout(
                        methods::SESSION_PROMPT,
                        Some(params),
                        self.options.prompt_timeout,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        let outcome = match response {
            Ok(value) => protocol::parse_result::<PromptResponse>(methods::SESSION_PROMPT, value)
                .map(|r| TurnOutcome::from_stop_reason(r.stop_reason)),
            Err(Error::Acp(AcpError::Agent {
                code,
                message,
                data,
            })) => Ok(TurnOutcome::Failed(AgentFailure {
                code,
                message,
                data,
            })),
            Err(e) => Err(e),
        };

        drop(turn);

        match outcome {
            Ok(outcome) => {
                info!("Prompt turn for {} ended: {:?}", session_id, outcome);
                self.sessions.publish(SessionEvent::TurnComplete {
                    session_id: session_id.to_string(),
                    outcome: outcome.clone(),
                });
                Ok(PromptResult {
                    session_id: session_id.to_string(),
                    outcome,
                })
            }
            Err(e) => {
                if e.is_timeout() && self.options.cancel_on_timeout {
                    info!("Cancelling timed out prompt for {}", session_id);
                    if let Err(cancel_err) = self.send_cancel(session_id).await {
                        warn!("Failed to cancel {}: {}", session_id, cancel_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn cancel(&self, session_id: &str) -> Result<()> {
        self.ensure_session(session_id, "cancel")?;
        debug!("Cancelling session {}", session_id);
        self.send_cancel(session_id).await
    }

    async fn set_model(&self, session_id: &str, model_id: ModelId) -> Result<Session> {
        self.ensure_session(session_id, "set model")?;
        info!("Setting model for {} to {}", session_id, model_id);

        let params = SetModelParams {
            session_id: session_id.to_string(),
            model_id: model_id.clone(),
        };
        let value = self
            .rpc
            .call(methods::SESSION_SET_MODEL, Some(protocol::to_params(&params)?))
            .await?;
        let response = protocol::parse_result_or_default(methods::SESSION_SET_MODEL, value)?;
        self.apply_selection(session_id, response, Selection::Model(model_id))
    }

    async fn set_mode(&self, session_id: &str, mode_id: SessionModeId) -> Result<Session> {
        self.ensure_session(session_id, "set mode")?;
        info!("Setting mode for {} to {}", session_id, mode_id);

        let params = SetModeParams {
            session_id: session_id.to_string(),
            mode_id: mode_id.clone(),
        };
        let value = self
            .rpc
            .call(methods::SESSION_SET_MODE, Some(protocol::to_params(&params)?))
            .await?;
        let response = protocol::parse_result_or_default(methods::SESSION_SET_MODE, value)?;
        self.apply_selection(session_id, response, Selection::Mode(mode_id))
    }

    async fn set_config_option(
        &self,
        session_id: &str,
        config_id: ConfigOptionId,
        value: String,
    ) -> Result<Session> {
        self.ensure_session(session_id, "set config option")?;
        info!("Setting {} for {} to {}", config_id, session_id, value);

        let params = SetConfigOptionParams {
            session_id: session_id.to_string(),
            config_id: config_id.clone(),
            value: value.clone(),
        };
        let result = self
            .rpc
            .call(
                methods::SESSION_SET_CONFIG_OPTION,
                Some(protocol::to_params(&params)?),
            )
            .await?;
        let response =
            protocol::parse_result_or_default(methods::SESSION_SET_CONFIG_OPTION, result)?;
        self.apply_selection(
            session_id,
            response,
            Selection::ConfigOption(config_id, value),
        )
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        self.ensure_session(session_id, "close")?;

        let params = protocol::to_params(&SessionIdParams {
            session_id: session_id.to_string(),
        })?;
        let result = self.rpc.call(methods::SESSION_CLOSE, Some(params)).await;
        self.sessions.close(session_id, "closed by client");

        match result {
            Ok(_) => Ok(()),
            Err(Error::Acp(AcpError::Agent { code, .. })) if code == error_codes::METHOD_NOT_FOUND => {
                debug!("Agent has no session/close; closed {} locally", session_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.name);
        self.rpc.stop().await;
        *self.state.lock() = ConnectionState::Closed;
        self.sessions.close_all("disconnected");
        Ok(())
    }
}
