//! Chat-completions client that plays the debate roles.
//!
//! Every role goes to the same endpoint: the role's standing instructions
//! become the system message and the rendered turn becomes the user
//! message. Role identity lives entirely in those two strings.

use async_trait::async_trait;
use pipeline::{DebateRole, RoleCallError, RoleInvoker, RoleRequest};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmEndpoint;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response has no message content")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// First non-blank message content of a chat-completions response body.
pub fn parse_chat_response(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|_| LlmError::EmptyResponse)?;
    response
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .find(|content| !content.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)
}

/// [`RoleInvoker`] backed by an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatRoleInvoker {
    client: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl ChatRoleInvoker {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &LlmEndpoint {
        &self.endpoint
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.url.trim_end_matches('/'))
    }

    pub async fn complete(&self, request: &RoleRequest) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.endpoint.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.endpoint.temperature,
            max_tokens: self.endpoint.max_tokens,
        };

        let mut http = self.client.post(self.completions_url()).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_chat_response(&text)
    }
}

#[async_trait]
impl RoleInvoker for ChatRoleInvoker {
    async fn invoke(&self, role: DebateRole, request: &RoleRequest) -> Result<String, RoleCallError> {
        debug!(%role, model = %self.endpoint.model, "Invoking debate role");
        self.complete(request)
            .await
            .map_err(|e| RoleCallError(format!("{role}: {e}")))
    }
}
