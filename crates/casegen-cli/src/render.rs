//! Terminal rendering of session state and events

use casegen_core::types::{ContentBlock, ToolCallContent};
use casegen_core::{Session, SessionEvent};
use serde::Serialize;

const PREVIEW_CHARS: usize = 100;

/// Wire spelling of a serde enum (`allow_once`, `in_progress`, ...)
pub fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        _ => "?".to_string(),
    }
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

/// Text to print for an event, if any. Deltas are returned verbatim so
/// they stream on one line.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    let rendered = match event {
        SessionEvent::TextDelta { text, .. } => text.clone(),
        SessionEvent::ThoughtDelta { text, .. } => format!("\n  [thinking] {}", text),
        SessionEvent::ToolStarted {
            tool_call_id,
            title,
            kind,
            ..
        } => format!("\n  [tool_call: {}] {} ({})", tool_call_id, title, wire_name(kind)),
        SessionEvent::ToolUpdated {
            tool_call_id,
            status,
            ..
        } => format!("\n  [tool_update: {}] {}", tool_call_id, wire_name(status)),
        SessionEvent::ToolResult {
            tool_call_id,
            status,
            content,
            ..
        } => {
            let mut out = format!("\n  [tool_update: {}] {}", tool_call_id, wire_name(status));
            for item in content {
                match item {
                    ToolCallContent::Content {
                        content: ContentBlock::Text { text },
                    } => out.push_str(&format!("\n    -> {}", preview(text))),
                    ToolCallContent::Content { content } => {
                        out.push_str(&format!("\n    -> [{}]", content.kind()))
                    }
                    ToolCallContent::Diff { path, .. } => {
                        out.push_str(&format!("\n    -> [diff] {}", path))
                    }
                    ToolCallContent::Terminal { terminal_id } => {
                        out.push_str(&format!("\n    -> [terminal] {}", terminal_id))
                    }
                }
            }
            out
        }
        SessionEvent::PlanUpdated { entries, .. } => {
            let mut out = format!("\n  [plan] {} entries", entries.len());
            for entry in entries {
                out.push_str(&format!(
                    "\n    - [{}] {}",
                    wire_name(&entry.status),
                    entry.content
                ));
            }
            out
        }
        SessionEvent::CommandsUpdated { commands, .. } => {
            format!("\n  [commands] {}", commands.join(", "))
        }
        SessionEvent::ModeChanged { mode_id, .. } => format!("\n  [mode_update] {}", mode_id),
        SessionEvent::ModelChanged { model_id, .. } => format!("\n  [model_update] {}", model_id),
        SessionEvent::ConfigChanged { options, .. } => {
            format!("\n  [config_update] {} options", options.len())
        }
        SessionEvent::SessionClosed { reason, .. } => format!("\n  [session closed] {}", reason),
        SessionEvent::TurnComplete { .. } | SessionEvent::SessionReady { .. } => return None,
    };
    Some(rendered)
}

/// Multi-line description of a freshly created session.
pub fn session_summary(session: &Session) -> String {
    let mut lines = vec![format!("  sessionId: {}", session.id)];
    lines.push(format!(
        "  currentModel: {}",
        session.current_model().map(|m| m.as_str()).unwrap_or("?")
    ));
    lines.push(format!(
        "  currentMode: {}",
        session.current_mode().map(|m| m.as_str()).unwrap_or("?")
    ));

    if let Some(models) = &session.models {
        lines.push(format!("  available models ({}):", models.available_models.len()));
        lines.extend(
            models
                .available_models
                .iter()
                .map(|m| format!("    - {}", m.model_id)),
        );
    }
    if let Some(modes) = &session.modes {
        lines.push(format!("  available modes ({}):", modes.available_modes.len()));
        lines.extend(
            modes
                .available_modes
                .iter()
                .map(|m| format!("    - {} ({})", m.id, m.name)),
        );
    }
    if !session.config_options.is_empty() {
        lines.push(format!("  config options ({}):", session.config_options.len()));
        for option in &session.config_options {
            let values: Vec<&str> = option.options.iter().map(|v| v.value.as_str()).collect();
            lines.push(format!(
                "    - [{}] {}: {} (options: {})",
                wire_name(&option.category),
                option.id,
                option.current_value,
                values.join(", ")
            ));
        }
    }
    lines.join("\n")
}
