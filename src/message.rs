use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    /// Carries the task and every loop-authored envelope.
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Wrap a loop-authored payload as a user-channel message.
    pub fn envelope(envelope: &Envelope) -> Self {
        Self::user(envelope.to_json())
    }
}

/// JSON payload the loop sends to the model on the user channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    User { content: String },
    Observation { content: serde_json::Value },
    Instruction { content: String },
}

impl Envelope {
    pub fn user(content: impl Into<String>) -> Self {
        Envelope::User {
            content: content.into(),
        }
    }

    pub fn observation(content: impl Into<serde_json::Value>) -> Self {
        Envelope::Observation {
            content: content.into(),
        }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Envelope::Observation {
            content: serde_json::Value::String(format!("Error: {message}")),
        }
    }

    pub fn instruction(content: impl Into<String>) -> Self {
        Envelope::Instruction {
            content: content.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Enum of strings and `Value`s; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}
