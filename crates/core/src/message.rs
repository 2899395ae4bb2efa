//! Conversation message types.
//!
//! These are the value objects a caller builds a prompt from and that
//! compressors and provider clients consume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Images sent alongside the text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageContent>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            images: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach an image to this message.
    pub fn with_image(mut self, image: ImageContent) -> Self {
        self.images.push(image);
        self
    }

    /// Rough token estimate: 4 chars ≈ 1 token, plus 4 tokens of framing.
    /// Each image counts as a flat [`IMAGE_TOKEN_ESTIMATE`].
    pub fn estimated_tokens(&self) -> usize {
        let calls: usize = self
            .tool_calls
            .iter()
            .map(|tc| tc.name.len() + tc.arguments.len())
            .sum();
        4 + (self.content.len() + calls).div_ceil(4) + self.images.len() * IMAGE_TOKEN_ESTIMATE
    }
}

/// Token cost assumed for one image, independent of its resolution.
pub const IMAGE_TOKEN_ESTIMATE: usize = 85;

/// A base64-encoded image carried inside a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageContent {
    /// Image format, lowercase (`png`, `jpeg`, `webp`, ...)
    pub format: String,

    /// Base64 of the raw image bytes, without a data-URI prefix
    pub data: String,
}

impl ImageContent {
    /// `jpg` is normalized to `jpeg` so the MIME type is valid.
    pub fn new(format: impl Into<String>, data: impl Into<String>) -> Self {
        let format = format.into().trim_start_matches('.').to_ascii_lowercase();
        let format = if format == "jpg" { "jpeg".to_string() } else { format };
        Self {
            format,
            data: data.into(),
        }
    }

    pub fn media_type(&self) -> String {
        format!("image/{}", self.format)
    }

    /// `data:image/<format>;base64,<data>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type(), self.data)
    }
}

/// Estimated token size of a whole conversation.
pub fn estimated_tokens(messages: &[Message]) -> usize {
    messages.iter().map(Message::estimated_tokens).sum()
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}
