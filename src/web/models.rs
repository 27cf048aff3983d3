use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub text: String,
}

impl ChatRequest {
    /// Shape checks beyond what deserialization enforces; returns the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.message.is_empty() {
            return Err("Message is required");
        }
        if self.history.iter().any(|turn| turn.text.is_empty()) {
            return Err("History entries must have non-empty text");
        }
        Ok(())
    }
}
