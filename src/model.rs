use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// What the caller asks for; turned into the wire body by [`ChatRequest::from`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
}

impl From<&CompletionRequest> for ChatRequest {
    fn from(request: &CompletionRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![Message::user(request.prompt.clone())],
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<MessageRole>,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    /// Integral in practice, but the wire format is a JSON number.
    pub total_tokens: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub remaining_requests: Option<String>,
    pub remaining_tokens: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub answer: String,
    pub model: String,
    pub total_tokens: u64,
    pub rate_limit: RateLimit,
}

impl ChatResponse {
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|err| Error::Shape {
            reason: err.to_string(),
        })
    }

    pub fn into_completion(self, rate_limit: RateLimit) -> Result<Completion> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(Error::Shape {
                reason: "response contained no choices".to_string(),
            });
        };
        if !self.usage.total_tokens.is_finite() || self.usage.total_tokens < 0.0 {
            return Err(Error::Shape {
                reason: format!("invalid usage.total_tokens {}", self.usage.total_tokens),
            });
        }

        Ok(Completion {
            answer: choice.message.content,
            model: self.model,
            total_tokens: self.usage.total_tokens.round() as u64,
            rate_limit,
        })
    }
}
