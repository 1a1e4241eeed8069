//! Conversation messages exchanged with the LLM.

use serde::{Deserialize, Serialize};

/// A tool call emitted by the assistant. Only the fields needed to correlate
/// a tool result back to its call are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A single role-tagged unit of conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Human {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Ai {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    System {
        content: String,
    },
    Tool {
        content: String,
        tool_call_id: String,
        /// Name of the tool that produced this result, when the caller knows it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
}

/// Role names understood by chat-completion APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Message::Human {
            content: content.into(),
            name: None,
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// An assistant turn that requested one or more tool calls.
    pub fn ai_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Ai {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: None,
        }
    }

    pub fn tool_named(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
            tool_name: Some(tool_name.into()),
        }
    }

    /// API role for this message. Total over every variant.
    pub fn role(&self) -> Role {
        match self {
            Message::Human { .. } => Role::User,
            Message::Ai { .. } => Role::Assistant,
            Message::System { .. } => Role::System,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::Human { content, .. }
            | Message::Ai { content, .. }
            | Message::System { content }
            | Message::Tool { content, .. } => content,
        }
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Message::Tool { .. })
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping_covers_every_variant() {
        assert_eq!(Message::human("hi").role(), Role::User);
        assert_eq!(Message::ai("hello").role(), Role::Assistant);
        assert_eq!(Message::system("rules").role(), Role::System);
        assert_eq!(Message::tool("call_1", "result").role(), Role::Tool);
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let json = serde_json::to_value(Message::tool_named("call_1", "web_search", "r")).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["tool_name"], "web_search");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.tool_call_id(), Some("call_1"));
    }

    #[test]
    fn test_human_without_name_deserializes() {
        let msg: Message = serde_json::from_str(r#"{"type":"human","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::human("hi"));
    }
}
