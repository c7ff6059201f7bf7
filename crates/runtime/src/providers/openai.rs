//! OpenAI-compatible chat completions backend.

use crate::model::{
    Message, ModelClient, ModelError, ModelRequest, PlannerOutcome, Role, ToolCall,
};
use crate::tools::ToolSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`OpenAiClient`].
#[derive(Debug, Clone)]
pub struct OpenAiClientBuilder {
    api_key: String,
    model: String,
    base_url: String,
    system: Option<String>,
    max_tokens: Option<u32>,
}

impl OpenAiClientBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            system: None,
            max_tokens: None,
        }
    }

    /// Point the client at another OpenAI-compatible server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn build(self) -> OpenAiClient {
        OpenAiClient {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            endpoint: format!("{}/chat/completions", self.base_url),
            system: self.system,
            max_tokens: self.max_tokens,
        }
    }
}

/// Planner backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    system: Option<String>,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiClientBuilder {
        OpenAiClientBuilder::new(api_key, model)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let tool_calls: Vec<ApiToolCall> = msg
            .tool_calls
            .iter()
            .map(|call| ApiToolCall {
                id: call.id.clone(),
                call_type: function_type(),
                function: ApiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect();

        // Assistant messages that only carry calls have null content.
        let content = if msg.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        ApiMessage {
            role: Self::role_to_api(msg.role),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: spec.schema.to_json_schema(),
            },
        }
    }

    fn build_request<'a>(&'a self, request: ModelRequest<'a>) -> ApiRequest<'a> {
        let system = self.system.iter().map(|text| ApiMessage {
            role: "system",
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });

        ApiRequest {
            model: &self.model,
            messages: system
                .chain(request.messages.iter().map(Self::message_to_api))
                .collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
            max_tokens: self.max_tokens,
        }
    }

    fn status_to_error(status: u16, body: String) -> ModelError {
        match status {
            401 | 403 => ModelError::Auth(body),
            429 => ModelError::RateLimited(body),
            500..=599 => ModelError::Server { status, body },
            _ => ModelError::Api { status, body },
        }
    }

    fn response_to_outcome(response: ApiResponse) -> Result<PlannerOutcome, ModelError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        Ok(PlannerOutcome::from_parts(
            choice.message.content.unwrap_or_default(),
            calls,
        ))
    }
}

impl std::fmt::Display for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({}, endpoint={})", self.model, self.endpoint)
    }
}

impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        request: ModelRequest<'_>,
        deadline: Instant,
    ) -> Result<PlannerOutcome, ModelError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ModelError::Timeout);
        }

        let api_request = self.build_request(request);
        debug!(
            model = %self.model,
            messages = api_request.messages.len(),
            tools = api_request.tools.len(),
            "calling planner"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .timeout(remaining)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_to_error(status.as_u16(), body));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout
            } else {
                ModelError::Network(e.to_string())
            }
        })?;
        let api_response: ApiResponse = serde_json::from_slice(&body)
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Self::response_to_outcome(api_response)
    }
}
