//! Anthropic native client implementation.
//!
//! Uses Anthropic's Messages API directly (not OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Extended thinking surfaced as the reasoning channel
//! - Image input as base64 `image` source blocks
//!
//! Embeddings are not offered by this API.

use async_trait::async_trait;
use modelrelay_core::catalog::{ModelDescriptor, ProviderDescriptor};
use modelrelay_core::error::ProviderError;
use modelrelay_core::message::{ImageContent, Message, Role, ToolCall};
use modelrelay_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

/// Client type this implementation registers under.
pub const CLIENT_TYPE: &str = "anthropic";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API client.
pub struct AnthropicClient {
    provider_id: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    /// Create a client for the given provider.
    pub fn new(provider: &ProviderDescriptor) -> Result<Self, ProviderError> {
        let base_url = if provider.base_url.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else {
            provider.base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            provider_id: provider.id.clone(),
            base_url,
            api_key: provider.api_key.clone().unwrap_or_default(),
            client: http::build_client(provider.timeout_secs)?,
        })
    }

    /// Extract system messages from the message list.
    /// Anthropic puts system prompt as a top-level field, not in messages.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                _ => non_system.push(msg),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, non_system)
    }

    /// Convert messages to Anthropic API format with content blocks.
    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User if msg.images.is_empty() => {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Text(msg.content.clone()),
                    });
                }
                Role::User => {
                    let mut blocks: Vec<ContentBlock> =
                        msg.images.iter().map(ContentBlock::image).collect();
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Text(msg.content.clone()),
                        });
                    } else {
                        let mut blocks: Vec<ContentBlock> = Vec::new();
                        if !msg.content.is_empty() {
                            blocks.push(ContentBlock::Text {
                                text: msg.content.clone(),
                            });
                        }
                        for tc in &msg.tool_calls {
                            let input: serde_json::Value =
                                serde_json::from_str(&tc.arguments).unwrap_or_default();
                            blocks.push(ContentBlock::ToolUse {
                                id: tc.id.clone(),
                                name: tc.name.clone(),
                                input,
                            });
                        }
                        result.push(AnthropicMessage {
                            role: "assistant".into(),
                            content: AnthropicContent::Blocks(blocks),
                        });
                    }
                }
                Role::Tool => {
                    // Tool results travel as user messages
                    let tool_call_id = msg.tool_call_id.clone().unwrap_or_default();
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                            tool_use_id: tool_call_id,
                            content: msg.content.clone(),
                        }]),
                    });
                }
                Role::System => {} // handled separately
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn build_body(model: &ModelDescriptor, request: &CompletionRequest<'_>) -> serde_json::Value {
        let (system, messages) = Self::extract_system(request.messages);

        let mut body = serde_json::json!({
            "model": model.wire_name(),
            "messages": Self::to_api_messages(&messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(request.tools));
        }

        http::merge_extra_params(&mut body, &model.extra_params);
        body
    }

    /// Convert an Anthropic API response into our Response.
    fn into_response(resp: AnthropicResponse) -> Response {
        let mut text_content = String::new();
        let mut reasoning = String::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !text_content.is_empty() {
                        text_content.push('\n');
                    }
                    text_content.push_str(&text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: serde_json::to_string(&input).unwrap_or_default(),
                    });
                }
                ResponseContentBlock::Thinking { thinking } => {
                    if !reasoning.is_empty() {
                        reasoning.push('\n');
                    }
                    reasoning.push_str(&thinking);
                }
                ResponseContentBlock::Other => {}
            }
        }

        Response {
            text: Some(text_content),
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            ..Response::default()
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn client_type(&self) -> &str {
        CLIENT_TYPE
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: CompletionRequest<'_>,
    ) -> std::result::Result<Response, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(model, &request);

        if request.response_format.is_some() {
            debug!(provider = %self.provider_id, "Messages API has no response_format; schema not sent");
        }

        debug!(provider = %self.provider_id, model = %model.wire_name(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let api_resp: AnthropicResponse = http::read_json(response, &self.provider_id).await?;
        Ok(Self::into_response(api_resp))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
    #[serde(rename = "image")]
    Image { source: ImageSource },
}

impl ContentBlock {
    fn image(image: &ImageContent) -> Self {
        Self::Image {
            source: ImageSource {
                r#type: "base64".into(),
                media_type: image.media_type(),
                data: image.data.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ImageSource {
    r#type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_defaults() {
        let client = AnthropicClient::new(&ProviderDescriptor::new("claude", "anthropic")).unwrap();
        assert_eq!(client.client_type(), "anthropic");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let p = ProviderDescriptor::new("claude", "anthropic")
            .with_base_url("https://custom.proxy.com/");
        let client = AnthropicClient::new(&p).unwrap();
        assert_eq!(client.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn system_extraction() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::system("Be concise"),
            Message::user("Hello"),
            Message::assistant("Hi!"),
        ];

        let (system, non_system) = AnthropicClient::extract_system(&messages);
        assert_eq!(system.as_deref(), Some("You are helpful\n\nBe concise"));
        assert_eq!(non_system.len(), 2);
        assert_eq!(non_system[0].role, Role::User);
        assert_eq!(non_system[1].role, Role::Assistant);
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let mut msg = Message::assistant("Let me search");
        msg.tool_calls = vec![ToolCall {
            id: "toolu_123".into(),
            name: "web_search".into(),
            arguments: r#"{"query":"rust"}"#.into(),
        }];

        let api_msgs = AnthropicClient::to_api_messages(&[&msg]);
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 2);
                assert!(matches!(&blocks[1], ContentBlock::ToolUse { name, .. } if name == "web_search"));
            }
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn message_conversion_tool_result() {
        let msg = Message::tool_result("toolu_123", "search results here");
        let api_msgs = AnthropicClient::to_api_messages(&[&msg]);
        assert_eq!(api_msgs[0].role, "user");
        match &api_msgs[0].content {
            AnthropicContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { tool_use_id, content } => {
                    assert_eq!(tool_use_id, "toolu_123");
                    assert_eq!(content, "search results here");
                }
                _ => panic!("Expected tool_result block"),
            },
            _ => panic!("Expected blocks content"),
        }
    }

    #[test]
    fn image_becomes_base64_source_block() {
        let msg = Message::user("what is this?").with_image(ImageContent::new("png", "AAAA"));
        let api_msgs = AnthropicClient::to_api_messages(&[&msg]);
        let json = serde_json::to_value(&api_msgs[0]).unwrap();

        assert_eq!(json["role"], "user");
        let blocks = json["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0]["type"], "image");
        assert_eq!(blocks[0]["source"]["type"], "base64");
        assert_eq!(blocks[0]["source"]["media_type"], "image/png");
        assert_eq!(blocks[0]["source"]["data"], "AAAA");
        assert_eq!(blocks[1]["type"], "text");
        assert_eq!(blocks[1]["text"], "what is this?");
    }

    #[test]
    fn body_places_system_at_top_level() {
        let model = ModelDescriptor::new("smart", "claude").with_identifier("claude-sonnet-4");
        let messages = vec![Message::system("rules"), Message::user("hi")];
        let req = CompletionRequest {
            messages: &messages,
            tools: &[],
            response_format: None,
            max_tokens: 512,
            temperature: 0.5,
        };
        let body = AnthropicClient::build_body(&model, &req);
        assert_eq!(body["system"], "rules");
        assert_eq!(body["model"], "claude-sonnet-4");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn parse_tool_use_response() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_02",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "text", "text": "Let me calculate"},
                    {"type": "tool_use", "id": "toolu_abc", "name": "calculator", "input": {"expression": "2+2"}}
                ],
                "usage": {"input_tokens": 20, "output_tokens": 10},
                "stop_reason": "tool_use"
            }"#,
        )
        .unwrap();

        let r = AnthropicClient::into_response(resp);
        assert_eq!(r.text.as_deref(), Some("Let me calculate"));
        let calls = r.tool_calls.unwrap();
        assert_eq!(calls[0].id, "toolu_abc");
        let args: serde_json::Value = serde_json::from_str(&calls[0].arguments).unwrap();
        assert_eq!(args["expression"], "2+2");
        assert_eq!(r.usage.unwrap().total_tokens, 30);
    }

    #[test]
    fn thinking_goes_to_reasoning_channel() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_03",
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "thinking", "thinking": "I need to consider...", "signature": "x"},
                    {"type": "redacted_thinking", "data": "..."},
                    {"type": "text", "text": "Here's my answer."}
                ],
                "usage": {"input_tokens": 15, "output_tokens": 25}
            }"#,
        )
        .unwrap();

        let r = AnthropicClient::into_response(resp);
        assert_eq!(r.text.as_deref(), Some("Here's my answer."));
        assert_eq!(r.reasoning.as_deref(), Some("I need to consider..."));
    }

    #[tokio::test]
    async fn embeddings_are_unsupported() {
        let client = AnthropicClient::new(&ProviderDescriptor::new("claude", "anthropic")).unwrap();
        let err = client
            .embed(&ModelDescriptor::new("smart", "claude"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported(_)));
    }
}
