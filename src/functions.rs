//! Structured-output intents offered to the model as callable functions.
//!
//! Each intent carries its own argument schema and transform. A function call
//! returned by the model is decoded into an [`Intent`] and applied to produce
//! the conversation turns of a training record.

use crate::client::{FunctionCall, FunctionDefinition};
use crate::models::{Message, Role};
use serde::Deserialize;
use serde_json::json;

/// Name of the conversation conversion function.
pub const CONVERT_TO_TRAINING_DATA: &str = "convertToTrainingData";

/// A speaker in a generated conversation; system turns are not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl From<Speaker> for Role {
    fn from(speaker: Speaker) -> Self {
        match speaker {
            Speaker::User => Role::User,
            Speaker::Assistant => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Turn {
    pub role: Speaker,
    pub content: String,
}

/// Decoded function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// `convertToTrainingData({conversation: [{role, content}]})`
    ConvertToTrainingData { conversation: Vec<Turn> },
}

/// Why a function call could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("invalid arguments for '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },
}

#[derive(Deserialize)]
struct ConvertArgs {
    conversation: Vec<Turn>,
}

impl Intent {
    /// Definitions of every intent, sent with each chat request.
    pub fn definitions() -> Vec<FunctionDefinition> {
        vec![FunctionDefinition {
            name: CONVERT_TO_TRAINING_DATA.to_string(),
            description: "Convert the conversation to an array of messages alternating \
                          between the user and assistant."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "conversation": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "role": {
                                    "type": "string",
                                    "enum": ["user", "assistant"],
                                    "description": "The name of the role that's currently responding."
                                },
                                "content": {
                                    "type": "string",
                                    "description": "The message content"
                                }
                            },
                            "required": ["role", "content"]
                        }
                    }
                },
                "required": ["conversation"]
            }),
        }]
    }

    /// Decode a function call returned by the model.
    pub fn from_call(call: &FunctionCall) -> Result<Self, IntentError> {
        match call.name.as_str() {
            CONVERT_TO_TRAINING_DATA => {
                let args: ConvertArgs = serde_json::from_str(&call.arguments).map_err(|e| {
                    IntentError::InvalidArguments {
                        name: call.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Intent::ConvertToTrainingData {
                    conversation: args.conversation,
                })
            }
            other => Err(IntentError::UnknownFunction(other.to_string())),
        }
    }

    /// Conversation turns this intent contributes to a training record.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Intent::ConvertToTrainingData { conversation } => conversation
                .into_iter()
                .map(|turn| Message {
                    role: turn.role.into(),
                    content: turn.content,
                })
                .collect(),
        }
    }
}
