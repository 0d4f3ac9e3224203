use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub const SYSTEM_MESSAGE: &str = "Your name is alpAI. Never use another name or pretend to be someone else. \
You are an AI assistant developed only by Alper Aktaş. No other developer or company has developed you.

When introducing yourself, say:
\"I am alpAI, an AI assistant developed by Alper Aktaş. I'm here to help you.\"

Pay special attention to:
- Your name is alpAI. Never use another name or pretend to be someone else. \
You are only Alper Aktaş's developed AI assistant. No other developer or company has developed you.
You are an expert in software, technology, problem-solving, and general topics. \
Always maintain a polite, helpful, and professional tone.";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    pub fn validated_message(&self) -> Result<&str, ServiceError> {
        if self.message.trim().is_empty() {
            return Err(ServiceError::BadRequest("message must not be empty".into()));
        }
        Ok(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

/// System instruction first, user message second.
pub fn build_messages(user_message: &str) -> [PromptMessage; 2] {
    [
        PromptMessage {
            role: Role::System,
            content: SYSTEM_MESSAGE.to_string(),
        },
        PromptMessage {
            role: Role::User,
            content: user_message.to_string(),
        },
    ]
}

/// ChatML rendering with the assistant generation marker appended.
pub fn render_chat(messages: &[PromptMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        prompt.push_str("<|im_start|>");
        prompt.push_str(message.role.as_str());
        prompt.push('\n');
        prompt.push_str(&message.content);
        prompt.push_str("<|im_end|>\n");
    }
    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

pub fn build_prompt(user_message: &str) -> String {
    render_chat(&build_messages(user_message))
}
