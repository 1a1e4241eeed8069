//! Wire types for the chat-completions endpoint.

use serde::{Deserialize, Serialize};

use crate::completion::{CompletionError, Message};

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct WireToolCall<'a> {
    pub id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: WireFunction<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct WireFunction<'a> {
    pub name: &'a str,
    pub arguments: &'static str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let mut wire = ChatMessage {
            role: message.role().as_str(),
            content: message.content(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
        };

        match message {
            Message::Human { name, .. } => wire.name = name.as_deref(),
            Message::Ai { tool_calls, .. } => {
                wire.tool_calls = tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: &call.id,
                        kind: "function",
                        function: WireFunction {
                            name: &call.name,
                            arguments: "{}",
                        },
                    })
                    .collect();
            }
            Message::Tool { tool_call_id, .. } => wire.tool_call_id = Some(tool_call_id.as_str()),
            Message::System { .. } => {}
        }

        wire
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Trimmed text of the first choice.
    pub fn into_text(self) -> Result<String, CompletionError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CompletionError::ResponseError("Response contained no choices".into()))?;

        Ok(choice
            .message
            .content
            .map(|content| content.trim().to_string())
            .unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}
