//! ProviderClient trait: the abstraction over LLM wire protocols.
//!
//! A client knows how to send a conversation (or a piece of text to embed)
//! to one backend and translate the reply into a [`Response`]. Every wire
//! protocol (OpenAI-compatible, Anthropic, ...) is one implementation,
//! resolved by client type through the registry in `modelrelay-providers`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::ModelDescriptor;
use crate::error::ProviderError;
use crate::message::{ImageContent, Message, ToolCall};

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Per-call input supplied by the caller. Discarded after the call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Ordered conversation messages.
    pub messages: Vec<Message>,

    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,

    /// JSON Schema the reply must conform to.
    pub response_format: Option<serde_json::Value>,

    /// Overrides the task's default max tokens.
    pub max_tokens: Option<u32>,

    /// Overrides the task's default temperature.
    pub temperature: Option<f32>,
}

impl RequestContext {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A single user message.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new(vec![Message::user(prompt)])
    }

    /// A single user message carrying a prompt and one image.
    pub fn from_image_prompt(prompt: impl Into<String>, image: ImageContent) -> Self {
        Self::new(vec![Message::user(prompt).with_image(image)])
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_response_format(mut self, schema: serde_json::Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A fully resolved completion call handed to a client.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
    pub response_format: Option<&'a serde_json::Value>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// What a provider call produced.
///
/// Text requests populate `text`/`reasoning`/`tool_calls`; embedding
/// requests populate `embedding`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    /// Visible output text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Reasoning text, from a first-class channel or extracted markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Tool calls requested by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Embedding vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Token usage statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Catalog id of the model that served the request (set by the executor).
    #[serde(default)]
    pub model_id: String,

    /// Provider id of the model that served the request (set by the executor).
    #[serde(default)]
    pub provider_id: String,
}

impl Response {
    /// A text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// An embedding reply.
    pub fn embedding(vector: Vec<f32>) -> Self {
        Self {
            embedding: Some(vector),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    pub fn has_text(&self) -> bool {
        self.text.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// The core ProviderClient trait.
///
/// The executor calls `complete()` or `embed()` without knowing which wire
/// protocol sits behind it.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// The registry key this client was built for (e.g. "openai").
    fn client_type(&self) -> &str;

    /// Send a conversation and get a complete response.
    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: CompletionRequest<'_>,
    ) -> std::result::Result<Response, ProviderError>;

    /// Embed a piece of text.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _model: &ModelDescriptor,
        _input: &str,
    ) -> std::result::Result<Response, ProviderError> {
        Err(ProviderError::Unsupported(format!(
            "client '{}' does not support embeddings",
            self.client_type()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_builders() {
        let ctx = RequestContext::from_prompt("hi")
            .with_max_tokens(64)
            .with_temperature(0.2)
            .with_response_format(serde_json::json!({"type": "object"}));
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.max_tokens, Some(64));
        assert_eq!(ctx.temperature, Some(0.2));
        assert!(ctx.response_format.is_some());
        assert!(ctx.tools.is_empty());
    }

    #[test]
    fn image_prompt_is_one_user_message() {
        let ctx = RequestContext::from_image_prompt("describe", ImageContent::new("png", "AAAA"));
        assert_eq!(ctx.messages.len(), 1);
        assert_eq!(ctx.messages[0].content, "describe");
        assert_eq!(ctx.messages[0].images[0].format, "png");
    }

    #[test]
    fn response_text_and_tool_detection() {
        assert!(Response::text("ok").has_text());
        assert!(!Response::text("").has_text());
        assert!(!Response::default().has_tool_calls());

        let mut r = Response::default();
        r.tool_calls = Some(vec![ToolCall {
            id: "c1".into(),
            name: "search".into(),
            arguments: "{}".into(),
        }]);
        assert!(r.has_tool_calls());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "lookup".into(),
            description: "Look something up".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("lookup"));
        assert!(json.contains("query"));
    }
}
