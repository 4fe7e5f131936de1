//! Session state for ACP
//!
//! A [`Session`] mirrors what the agent has told us about one conversation:
//! lifecycle state, current model and mode, config options, streamed history
//! and tool calls. The [`SessionManager`] owns every session of a connection
//! and turns applied updates into [`SessionEvent`]s for listeners.

use super::traits::SessionEvent;
use crate::error::{AcpError, Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `session/load` in progress; history is being replayed
    Loading,
    Active,
    PromptInFlight,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loading => "loading",
            Self::Active => "active",
            Self::PromptInFlight => "prompting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRole {
    User,
    Agent,
    Thought,
}

/// One message of the reconstructed conversation
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Concatenated text of the entry's text blocks.
    pub fn text(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect()
    }
}

/// Tool call as last reported by the agent
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    pub id: String,
    pub title: String,
    pub kind: ToolCallKind,
    pub status: ToolCallStatus,
    pub content: Vec<ToolCallContent>,
    pub raw_input: Option<serde_json::Value>,
    pub raw_output: Option<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Client-side view of one agent session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub cwd: String,
    pub state: SessionState,
    pub models: Option<SessionModelState>,
    pub modes: Option<SessionModeState>,
    /// Full descriptors, always replaced as a whole
    pub config_options: Vec<SessionConfigOption>,
    pub available_commands: Vec<AvailableCommand>,
    pub plan: Vec<PlanEntry>,
    pub history: Vec<HistoryEntry>,
    pub tool_calls: HashMap<String, ToolCallRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, cwd: impl Into<String>, state: SessionState) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            cwd: cwd.into(),
            state,
            models: None,
            modes: None,
            config_options: Vec::new(),
            available_commands: Vec::new(),
            plan: Vec::new(),
            history: Vec::new(),
            tool_calls: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Take models, modes and config options from a new/load result.
    pub fn apply_setup(&mut self, setup: SessionSetupResult) {
        if let Some(models) = setup.models {
            self.models = Some(models);
        }
        if let Some(modes) = setup.modes {
            self.modes = Some(modes);
        }
        if let Some(options) = setup.config_options {
            self.config_options = options;
        }
        self.touch();
    }

    pub fn current_model(&self) -> Option<&ModelId> {
        self.models.as_ref().map(|m| &m.current_model_id)
    }

    pub fn current_mode(&self) -> Option<&SessionModeId> {
        self.modes.as_ref().map(|m| &m.current_mode_id)
    }

    pub fn config_option(&self, id: &ConfigOptionId) -> Option<&SessionConfigOption> {
        self.config_options.iter().find(|o| &o.id == id)
    }

    /// Current value of every config option.
    pub fn config_values(&self) -> HashMap<ConfigOptionId, String> {
        self.config_options
            .iter()
            .map(|o| (o.id.clone(), o.current_value.clone()))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Fail unless the session accepts `operation` in its current state.
    pub fn ensure_usable(&self, operation: &'static str) -> Result<()> {
        match self.state {
            SessionState::Active | SessionState::PromptInFlight => Ok(()),
            SessionState::Closed => Err(Error::Acp(AcpError::SessionClosed(self.id.clone()))),
            SessionState::Loading => Err(Error::Acp(AcpError::InvalidSessionState {
                session_id: self.id.clone(),
                state: self.state.to_string(),
                operation,
            })),
        }
    }

    /// Active -> PromptInFlight.
    pub fn begin_prompt(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active => {
                self.state = SessionState::PromptInFlight;
                self.touch();
                Ok(())
            }
            SessionState::PromptInFlight => {
                Err(Error::Acp(AcpError::PromptInFlight(self.id.clone())))
            }
            _ => self.ensure_usable("prompt"),
        }
    }

    /// PromptInFlight -> Active. Other states are left alone.
    pub fn finish_prompt(&mut self) {
        if self.state == SessionState::PromptInFlight {
            self.state = SessionState::Active;
            self.touch();
        }
    }

    /// Returns false if the session was already closed.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Closed;
        self.touch();
        true
    }

    /// Replace every config option. There is no partial merge.
    pub fn replace_config_options(&mut self, options: Vec<SessionConfigOption>) {
        self.config_options = options;
        self.touch();
    }

    /// Returns true if the current model changed.
    pub fn set_current_model(&mut self, model_id: ModelId) -> bool {
        match &mut self.models {
            Some(models) if models.current_model_id == model_id => false,
            Some(models) => {
                models.current_model_id = model_id;
                self.touch();
                true
            }
            None => {
                self.models = Some(SessionModelState {
                    current_model_id: model_id,
                    available_models: Vec::new(),
                });
                self.touch();
                true
            }
        }
    }

    /// Returns true if the current mode changed.
    pub fn set_current_mode(&mut self, mode_id: SessionModeId) -> bool {
        match &mut self.modes {
            Some(modes) if modes.current_mode_id == mode_id => false,
            Some(modes) => {
                modes.current_mode_id = mode_id;
                self.touch();
                true
            }
            None => {
                self.modes = Some(SessionModeState {
                    current_mode_id: mode_id,
                    available_modes: Vec::new(),
                });
                self.touch();
                true
            }
        }
    }

    /// Apply a pushed update and return the events it produces.
    ///
    /// Updates never change the lifecycle state. While loading, state is
    /// rebuilt silently.
    pub fn apply_update(&mut self, update: SessionUpdate) -> Vec<SessionEvent> {
        self.touch();
        let session_id = self.id.clone();

        let events = match update {
            SessionUpdate::AgentMessageChunk { content } => {
                let text = content.as_text().map(str::to_string);
                self.append_history(HistoryRole::Agent, content);
                text.map(|text| SessionEvent::TextDelta { session_id, text })
                    .into_iter()
                    .collect()
            }

            SessionUpdate::UserMessageChunk { content } => {
                self.append_history(HistoryRole::User, content);
                Vec::new()
            }

            SessionUpdate::AgentThoughtChunk { content } => {
                let text = content.as_text().map(str::to_string);
                self.append_history(HistoryRole::Thought, content);
                text.map(|text| SessionEvent::ThoughtDelta { session_id, text })
                    .into_iter()
                    .collect()
            }

            SessionUpdate::ToolCall {
                tool_call_id,
                title,
                kind,
                status,
                raw_input,
            } => {
                let title = title.unwrap_or_else(|| tool_call_id.clone());
                self.tool_calls.insert(
                    tool_call_id.clone(),
                    ToolCallRecord {
                        id: tool_call_id.clone(),
                        title: title.clone(),
                        kind,
                        status,
                        content: Vec::new(),
                        raw_input,
                        raw_output: None,
                        started_at: Utc::now(),
                        completed_at: status.is_terminal().then(Utc::now),
                    },
                );
                vec![SessionEvent::ToolStarted {
                    session_id,
                    tool_call_id,
                    title,
                    kind,
                }]
            }

            SessionUpdate::ToolCallUpdate {
                tool_call_id,
                status,
                title,
                content,
                raw_output,
            } => {
                let record = self
                    .tool_calls
                    .entry(tool_call_id.clone())
                    .or_insert_with(|| ToolCallRecord {
                        id: tool_call_id.clone(),
                        title: tool_call_id.clone(),
                        kind: ToolCallKind::Other,
                        status: ToolCallStatus::Pending,
                        content: Vec::new(),
                        raw_input: None,
                        raw_output: None,
                        started_at: Utc::now(),
                        completed_at: None,
                    });

                if let Some(status) = status {
                    record.status = status;
                }
                if let Some(title) = title {
                    record.title = title;
                }
                if let Some(content) = content {
                    record.content = content;
                }
                if raw_output.is_some() {
                    record.raw_output = raw_output;
                }

                if record.status.is_terminal() {
                    record.completed_at.get_or_insert_with(Utc::now);
                    vec![SessionEvent::ToolResult {
                        session_id,
                        tool_call_id,
                        status: record.status,
                        content: record.content.clone(),
                    }]
                } else {
                    vec![SessionEvent::ToolUpdated {
                        session_id,
                        tool_call_id,
                        status: record.status,
                    }]
                }
            }

            SessionUpdate::Plan { entries } => {
                self.plan = entries.clone();
                vec![SessionEvent::PlanUpdated {
                    session_id,
                    entries,
                }]
            }

            SessionUpdate::AvailableCommandsUpdate { available_commands } => {
                let commands = available_commands.iter().map(|c| c.name.clone()).collect();
                self.available_commands = available_commands;
                vec![SessionEvent::CommandsUpdated {
                    session_id,
                    commands,
                }]
            }

            SessionUpdate::CurrentModeUpdate { current_mode_id } => {
                if self.set_current_mode(current_mode_id.clone()) {
                    vec![SessionEvent::ModeChanged {
                        session_id,
                        mode_id: current_mode_id,
                    }]
                } else {
                    Vec::new()
                }
            }

            SessionUpdate::ConfigOptionsUpdate { config_options } => {
                self.replace_config_options(config_options.clone());
                vec![SessionEvent::ConfigChanged {
                    session_id,
                    options: config_options,
                }]
            }
        };

        if self.state == SessionState::Loading {
            trace!("Replayed update for loading session {}", self.id);
            return Vec::new();
        }
        events
    }

    /// Append a chunk, merging into the last entry when the role matches.
    fn append_history(&mut self, role: HistoryRole, content: ContentBlock) {
        match self.history.last_mut() {
            Some(last) if last.role == role => {
                // Adjacent text chunks are one message
                if let (Some(ContentBlock::Text { text: prev }), ContentBlock::Text { text }) =
                    (last.content.last_mut(), &content)
                {
                    prev.push_str(text);
                } else {
                    last.content.push(content);
                }
            }
            _ => self.history.push(HistoryEntry {
                role,
                content: vec![content],
                timestamp: Utc::now(),
            }),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Updates held for ids that are not registered yet
const ORPHAN_LIMIT: usize = 64;

/// Owns every session of one connection and publishes their events
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    /// An agent may push updates for a new session before the `session/new`
    /// caller has registered it; those are replayed on insert.
    orphans: Mutex<VecDeque<SessionUpdateNotification>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            sessions: RwLock::new(HashMap::new()),
            orphans: Mutex::new(VecDeque::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    fn publish_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Register a session. A closed session with the same id is replaced.
    ///
    /// Updates that arrived for this id before registration are applied now.
    pub fn insert(&self, session: Session) -> Result<()> {
        let session_id = session.id.clone();
        let events = {
            let mut sessions = self.sessions.write();
            if let Some(existing) = sessions.get(&session_id) {
                if !existing.is_closed() {
                    return Err(Error::Acp(AcpError::SessionAlreadyExists(session_id)));
                }
            }
            debug!("Registered session {} ({})", session_id, session.state);
            sessions.insert(session_id.clone(), session);

            let held: Vec<SessionUpdateNotification> = {
                let mut orphans = self.orphans.lock();
                let (held, rest): (Vec<_>, Vec<_>) = orphans
                    .drain(..)
                    .partition(|n: &SessionUpdateNotification| n.session_id == session_id);
                *orphans = rest.into();
                held
            };
            match sessions.get_mut(&session_id) {
                Some(session) => held
                    .into_iter()
                    .flat_map(|n| session.apply_update(n.update))
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            }
        };
        self.publish_all(events);
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn remove(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().remove(session_id)
    }

    /// Run `f` on a session regardless of its state.
    pub fn with_session_mut<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::Acp(AcpError::SessionNotFound(session_id.to_string())))?;
        Ok(f(session))
    }

    /// Fail with a usage error unless the session accepts `operation`.
    pub fn ensure_usable(&self, session_id: &str, operation: &'static str) -> Result<()> {
        self.sessions
            .read()
            .get(session_id)
            .ok_or_else(|| Error::Acp(AcpError::SessionNotFound(session_id.to_string())))?
            .ensure_usable(operation)
    }

    /// Mark a session closed and announce it. No-op when already closed.
    pub fn close(&self, session_id: &str, reason: &str) -> bool {
        let closed = self
            .with_session_mut(session_id, Session::close)
            .unwrap_or(false);
        if closed {
            self.publish(SessionEvent::SessionClosed {
                session_id: session_id.to_string(),
                reason: reason.to_string(),
            });
        }
        closed
    }

    /// Close every session, e.g. when the transport terminates.
    pub fn close_all(&self, reason: &str) {
        let closed: Vec<String> = {
            let mut sessions = self.sessions.write();
            sessions
                .values_mut()
                .filter_map(|s| s.close().then(|| s.id.clone()))
                .collect()
        };
        for session_id in closed {
            self.publish(SessionEvent::SessionClosed {
                session_id,
                reason: reason.to_string(),
            });
        }
    }

    /// Apply a pushed update to the session it names.
    pub fn apply(&self, notification: SessionUpdateNotification) {
        let SessionUpdateNotification { session_id, update } = notification;
        let kind = update.kind();

        let events = {
            let mut sessions = self.sessions.write();
            match sessions.get_mut(&session_id) {
                Some(session) if session.is_closed() => {
                    debug!("Ignoring {} for closed session {}", kind, session_id);
                    return;
                }
                Some(session) => session.apply_update(update),
                None => {
                    debug!("Holding {} for unregistered session {}", kind, session_id);
                    let mut orphans = self.orphans.lock();
                    if orphans.len() == ORPHAN_LIMIT {
                        if let Some(dropped) = orphans.pop_front() {
                            warn!(
                                "Dropping {} for unknown session {}",
                                dropped.update.kind(),
                                dropped.session_id
                            );
                        }
                    }
                    orphans.push_back(SessionUpdateNotification {
                        session_id,
                        update,
                    });
                    return;
                }
            }
        };

        self.publish_all(events);
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn option(id: &str, category: ConfigOptionCategory, value: &str) -> SessionConfigOption {
        serde_json::from_value(json!({
            "id": id,
            "name": id,
            "category": category,
            "type": "select",
            "currentValue": value,
            "options": [{"value": value, "name": value}]
        }))
        .unwrap()
    }

    fn chunk(text: &str) -> SessionUpdate {
        SessionUpdate::AgentMessageChunk {
            content: ContentBlock::text(text),
        }
    }

    #[test]
    fn test_prompt_state_transitions() {
        let mut session = Session::new("s1", "/tmp", SessionState::Active);
        session.begin_prompt().unwrap();
        assert_eq!(session.state, SessionState::PromptInFlight);

        let err = session.begin_prompt().unwrap_err();
        assert!(matches!(err, Error::Acp(AcpError::PromptInFlight(_))));

        session.finish_prompt();
        assert_eq!(session.state, SessionState::Active);

        assert!(session.close());
        assert!(!session.close());
        let err = session.begin_prompt().unwrap_err();
        assert!(err.is_session_not_found());
    }

    #[test]
    fn test_loading_session_rejects_prompts() {
        let mut session = Session::new("s1", "/tmp", SessionState::Loading);
        let err = session.begin_prompt().unwrap_err();
        assert!(matches!(
            err,
            Error::Acp(AcpError::InvalidSessionState { .. })
        ));
    }

    #[test]
    fn test_config_replacement_is_total() {
        let mut session = Session::new("s1", "/tmp", SessionState::Active);
        session.replace_config_options(vec![
            option("model", ConfigOptionCategory::Model, "a/b"),
            option("effort", ConfigOptionCategory::ThoughtLevel, "low"),
        ]);

        let events = session.apply_update(SessionUpdate::ConfigOptionsUpdate {
            config_options: vec![option("mode", ConfigOptionCategory::Mode, "plan")],
        });

        let values = session.config_values();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&ConfigOptionId::new("mode")).map(String::as_str), Some("plan"));
        assert!(session.config_option(&ConfigOptionId::new("effort")).is_none());
        assert!(matches!(events.as_slice(), [SessionEvent::ConfigChanged { .. }]));
        assert_eq!(session.state, SessionState::Active);
    }

    #[test]
    fn test_message_chunks_merge_into_history() {
        let mut session = Session::new("s1", "/tmp", SessionState::Active);
        session.apply_update(SessionUpdate::UserMessageChunk {
            content: ContentBlock::text("hi"),
        });
        let events = session.apply_update(chunk("Hel"));
        session.apply_update(chunk("lo"));
        session.apply_update(SessionUpdate::AgentThoughtChunk {
            content: ContentBlock::text("pondering"),
        });
        session.apply_update(chunk("!"));

        assert_eq!(
            events,
            vec![SessionEvent::TextDelta {
                session_id: "s1".into(),
                text: "Hel".into()
            }]
        );
        let roles: Vec<_> = session.history.iter().map(|h| h.role).collect();
        assert_eq!(
            roles,
            vec![
                HistoryRole::User,
                HistoryRole::Agent,
                HistoryRole::Thought,
                HistoryRole::Agent
            ]
        );
        assert_eq!(session.history[1].text(), "Hello");
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let mut session = Session::new("s1", "/tmp", SessionState::PromptInFlight);
        let started = session.apply_update(SessionUpdate::ToolCall {
            tool_call_id: "call_1".into(),
            title: Some("write testcase.md".into()),
            kind: ToolCallKind::Edit,
            status: ToolCallStatus::Pending,
            raw_input: None,
        });
        assert!(matches!(started.as_slice(), [SessionEvent::ToolStarted { .. }]));

        let updated = session.apply_update(SessionUpdate::ToolCallUpdate {
            tool_call_id: "call_1".into(),
            status: Some(ToolCallStatus::InProgress),
            title: None,
            content: None,
            raw_output: None,
        });
        assert!(matches!(updated.as_slice(), [SessionEvent::ToolUpdated { .. }]));

        let finished = session.apply_update(SessionUpdate::ToolCallUpdate {
            tool_call_id: "call_1".into(),
            status: Some(ToolCallStatus::Completed),
            title: None,
            content: Some(vec![ToolCallContent::Content {
                content: ContentBlock::text("done"),
            }]),
            raw_output: None,
        });
        match finished.as_slice() {
            [SessionEvent::ToolResult { status, content, .. }] => {
                assert_eq!(*status, ToolCallStatus::Completed);
                assert_eq!(content.len(), 1);
            }
            other => panic!("unexpected events: {:?}", other),
        }
        let record = &session.tool_calls["call_1"];
        assert_eq!(record.title, "write testcase.md");
        assert!(record.completed_at.is_some());
        assert_eq!(session.state, SessionState::PromptInFlight);
    }

    #[test]
    fn test_unknown_tool_status_keeps_the_update() {
        let mut session = Session::new("s1", "/tmp", SessionState::PromptInFlight);
        let update: SessionUpdate = serde_json::from_value(json!({
            "sessionUpdate": "tool_call_update",
            "toolCallId": "call_1",
            "status": "awaiting_approval",
            "title": "run nmap"
        }))
        .unwrap();
        let events = session.apply_update(update);
        assert!(matches!(events.as_slice(), [SessionEvent::ToolUpdated { .. }]));

        let record = &session.tool_calls["call_1"];
        assert_eq!(record.status, ToolCallStatus::Unknown);
        assert_eq!(record.title, "run nmap");
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_loading_replay_is_silent() {
        let mut session = Session::new("s1", "/tmp", SessionState::Loading);
        let events = session.apply_update(chunk("old answer"));
        assert!(events.is_empty());
        let events = session.apply_update(SessionUpdate::Plan {
            entries: vec![PlanEntry {
                content: "Recon".into(),
                priority: PlanPriority::High,
                status: PlanStatus::Completed,
            }],
        });
        assert!(events.is_empty());
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.plan.len(), 1);
    }

    #[test]
    fn test_mode_update_emits_only_on_change() {
        let mut session = Session::new("s1", "/tmp", SessionState::Active);
        let events = session.apply_update(SessionUpdate::CurrentModeUpdate {
            current_mode_id: "plan".into(),
        });
        assert_eq!(events.len(), 1);
        let events = session.apply_update(SessionUpdate::CurrentModeUpdate {
            current_mode_id: "plan".into(),
        });
        assert!(events.is_empty());
        assert_eq!(session.current_mode().map(|m| m.as_str()), Some("plan"));
    }

    #[tokio::test]
    async fn test_manager_routes_updates_and_closes() {
        let manager = SessionManager::default();
        let mut events = manager.subscribe();
        manager
            .insert(Session::new("s1", "/tmp", SessionState::Active))
            .unwrap();
        manager
            .insert(Session::new("s2", "/tmp", SessionState::Active))
            .unwrap();
        assert!(manager
            .insert(Session::new("s1", "/tmp", SessionState::Active))
            .is_err());

        manager.apply(SessionUpdateNotification {
            session_id: "s2".into(),
            update: chunk("for s2"),
        });
        manager.apply(SessionUpdateNotification {
            session_id: "ghost".into(),
            update: chunk("dropped"),
        });

        let event = events.recv().await.unwrap();
        assert_eq!(event.session_id(), "s2");
        assert!(manager.get("s1").unwrap().history.is_empty());

        manager.close_all("agent exited");
        let mut closed = vec![
            events.recv().await.unwrap().session_id().to_string(),
            events.recv().await.unwrap().session_id().to_string(),
        ];
        closed.sort();
        assert_eq!(closed, vec!["s1", "s2"]);
        assert!(manager.get("s1").unwrap().is_closed());

        manager.apply(SessionUpdateNotification {
            session_id: "s1".into(),
            update: chunk("late"),
        });
        assert!(manager.get("s1").unwrap().history.is_empty());

        let err = manager.ensure_usable("s1", "prompt").unwrap_err();
        assert!(matches!(err, Error::Acp(AcpError::SessionClosed(_))));
        let err = manager.ensure_usable("nope", "prompt").unwrap_err();
        assert!(matches!(err, Error::Acp(AcpError::SessionNotFound(_))));
    }

    #[test]
    fn test_early_update_is_replayed_on_insert() {
        let manager = SessionManager::default();
        manager.apply(SessionUpdateNotification {
            session_id: "ses_new".into(),
            update: SessionUpdate::AvailableCommandsUpdate {
                available_commands: vec![AvailableCommand {
                    name: "init".into(),
                    description: None,
                }],
            },
        });
        assert!(!manager.contains("ses_new"));

        manager
            .insert(Session::new("ses_new", "/tmp", SessionState::Active))
            .unwrap();
        let session = manager.get("ses_new").unwrap();
        assert_eq!(session.available_commands.len(), 1);
    }
}
