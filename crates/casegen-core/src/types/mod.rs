//! Core type definitions for CaseGen
//!
//! This module contains the shared types used across the crate: ACP wire
//! types (JSON-RPC envelopes, session payloads) and content blocks.

mod acp_types;

pub use acp_types::*;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Content block carried by prompts, message chunks and tool output.
///
/// Block types this client does not model are kept verbatim in
/// [`ContentBlock::Other`] so they survive a round trip to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    ResourceLink {
        uri: String,
        name: String,
    },
    Other(serde_json::Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Wire `type` tag of this block.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::ResourceLink { .. } => "resource_link",
            Self::Other(value) => value.get("type").and_then(|t| t.as_str()).unwrap_or(""),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum KnownBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    ResourceLink {
        uri: String,
        name: String,
    },
}

impl Serialize for ContentBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let known = match self {
            Self::Other(value) => return value.serialize(serializer),
            Self::Text { text } => KnownBlock::Text { text: text.clone() },
            Self::Image { data, mime_type } => KnownBlock::Image {
                data: data.clone(),
                mime_type: mime_type.clone(),
            },
            Self::ResourceLink { uri, name } => KnownBlock::ResourceLink {
                uri: uri.clone(),
                name: name.clone(),
            },
        };
        known.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        if !value.get("type").is_some_and(|t| t.is_string()) {
            return Err(de::Error::custom("content block without a string `type`"));
        }

        // Unmodelled block types (audio, resource, ...) pass through untouched.
        match serde_json::from_value::<KnownBlock>(value.clone()) {
            Ok(KnownBlock::Text { text }) => Ok(Self::Text { text }),
            Ok(KnownBlock::Image { data, mime_type }) => Ok(Self::Image { data, mime_type }),
            Ok(KnownBlock::ResourceLink { uri, name }) => Ok(Self::ResourceLink { uri, name }),
            Err(_) => Ok(Self::Other(value)),
        }
    }
}

/// Plan entry from agent planning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanEntry {
    pub content: String,
    #[serde(default)]
    pub priority: PlanPriority,
    #[serde(default)]
    pub status: PlanStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_text_block_wire_shape() {
        let block = ContentBlock::text("Say hello in one sentence.");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "text", "text": "Say hello in one sentence."})
        );
    }

    #[test]
    fn test_image_block_uses_camel_case_mime_type() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "image", "data": "AAAA", "mimeType": "image/png"}))
                .unwrap();
        assert_eq!(
            block,
            ContentBlock::Image {
                data: "AAAA".into(),
                mime_type: "image/png".into()
            }
        );
    }

    #[test]
    fn test_unknown_block_type_passes_through() {
        let raw = json!({"type": "audio", "data": "UklGR", "mimeType": "audio/wav"});
        let block: ContentBlock = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.kind(), "audio");
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);
    }

    #[test]
    fn test_block_without_type_is_rejected() {
        let result = serde_json::from_value::<ContentBlock>(json!({"text": "hi"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_plan_entry_defaults() {
        let entry: PlanEntry = serde_json::from_value(json!({"content": "Scan inputs"})).unwrap();
        assert_eq!(entry.priority, PlanPriority::Medium);
        assert_eq!(entry.status, PlanStatus::Pending);
    }
}
