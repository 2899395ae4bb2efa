//! OpenAI-compatible client implementation.
//!
//! Works with: OpenAI, OpenRouter, DeepSeek, SiliconFlow, Ollama, vLLM,
//! Together AI, Fireworks AI, and any OpenAI-compatible endpoint.
//!
//! Supports:
//! - Chat completions with tool use / function calling
//! - Structured output via `response_format`
//! - Image input as `image_url` data URIs
//! - A first-class `reasoning_content` channel when the backend sends one
//! - Embeddings

use async_trait::async_trait;
use modelrelay_core::catalog::{ModelDescriptor, ProviderDescriptor};
use modelrelay_core::error::ProviderError;
use modelrelay_core::message::{ImageContent, Message, Role, ToolCall};
use modelrelay_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http;

/// Client type this implementation registers under.
pub const CLIENT_TYPE: &str = "openai";

/// An OpenAI-compatible LLM client.
///
/// This handles the vast majority of LLM providers since most expose
/// an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    provider_id: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a client for the given provider.
    pub fn new(provider: &ProviderDescriptor) -> Result<Self, ProviderError> {
        let base_url = if provider.base_url.is_empty() {
            "https://api.openai.com/v1".to_string()
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

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(Self::to_api_content(&m.content, &m.images)),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: match m.role {
                    Role::Tool => m.tool_call_id.clone(),
                    _ => None,
                },
                reasoning_content: None,
            })
            .collect()
    }

    /// Plain text, or content parts when images are attached.
    fn to_api_content(text: &str, images: &[ImageContent]) -> ApiContent {
        if images.is_empty() {
            return ApiContent::Text(text.to_string());
        }
        let mut parts = Vec::with_capacity(images.len() + 1);
        if !text.is_empty() {
            parts.push(ApiContentPart::Text {
                text: text.to_string(),
            });
        }
        parts.extend(images.iter().map(|img| ApiContentPart::ImageUrl {
            image_url: ApiImageUrl {
                url: img.data_uri(),
            },
        }));
        ApiContent::Parts(parts)
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Wrap a bare JSON Schema as a `json_schema` response format.
    /// Values that already name a format type are passed through.
    fn to_response_format(schema: &serde_json::Value) -> serde_json::Value {
        if schema.get("json_schema").is_some()
            || schema.get("type").and_then(|t| t.as_str()) == Some("json_object")
        {
            return schema.clone();
        }
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": "response",
                "schema": schema,
                "strict": true,
            }
        })
    }

    fn build_body(model: &ModelDescriptor, request: &CompletionRequest<'_>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model.wire_name(),
            "messages": Self::to_api_messages(request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(request.tools));
        }

        if let Some(schema) = request.response_format {
            body["response_format"] = Self::to_response_format(schema);
        }

        http::merge_extra_params(&mut body, &model.extra_params);
        body
    }

    fn into_response(api_response: ApiResponse) -> Result<Response, ProviderError> {
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedResponse("No choices in response".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Response {
            text: choice.message.content.map(ApiContent::into_text),
            reasoning: choice.message.reasoning_content.filter(|r| !r.is_empty()),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            usage,
            ..Response::default()
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn client_type(&self) -> &str {
        CLIENT_TYPE
    }

    async fn complete(
        &self,
        model: &ModelDescriptor,
        request: CompletionRequest<'_>,
    ) -> std::result::Result<Response, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(model, &request);

        debug!(provider = %self.provider_id, model = %model.wire_name(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let api_response: ApiResponse = http::read_json(response, &self.provider_id).await?;
        Self::into_response(api_response)
    }

    async fn embed(
        &self,
        model: &ModelDescriptor,
        input: &str,
    ) -> std::result::Result<Response, ProviderError> {
        let url = format!("{}/embeddings", self.base_url);

        let mut body = serde_json::json!({
            "model": model.wire_name(),
            "input": input,
            "encoding_format": "float",
        });
        http::merge_extra_params(&mut body, &model.extra_params);

        debug!(provider = %self.provider_id, model = %model.wire_name(), "Sending embedding request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(http::transport_error)?;

        let api_resp: EmbeddingApiResponse = http::read_json(response, &self.provider_id).await?;

        let embedding = api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::MalformedResponse("No embedding in response".into()))?;

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(Response {
            embedding: Some(embedding),
            usage,
            ..Response::default()
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<ApiContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiContentPart>),
}

impl ApiContent {
    /// Concatenated text parts. Image parts are dropped.
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Parts(parts) => parts
                .into_iter()
                .filter_map(|p| match p {
                    ApiContentPart::Text { text } => Some(text),
                    ApiContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}
