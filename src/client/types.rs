//! Wire types for the remote API.
//!
//! Only the fields the pipelines consume are typed; everything else the
//! API returns is ignored on deserialization.

use crate::models::{Epochs, Message, TokenUsage};
use serde::{Deserialize, Serialize};

/// A function the model may elect to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub parameters: serde_json::Value,
}

/// Chat completion request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub functions: Vec<FunctionDefinition>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function_call: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

/// Chat completion response, written to the raw completions file.
///
/// Fields not modelled here (`object`, `system_fingerprint`, `logprobs`, ...)
/// are kept in `extra` on the completion, its choices and their messages, so
/// they survive the round trip. `usage` keeps only the three token counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: AssistantMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Message returned by the model: plain text, a function call, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Structured function call; `arguments` is a JSON-encoded string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Uploaded file descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub purpose: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Hyperparameters sent on job creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub n_epochs: Epochs,
}

/// Fine-tuning job creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuneJobRequest {
    pub model: String,
    pub training_file: String,
    pub hyperparameters: Hyperparameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Fine-tuning job descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuneJob {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub training_file: Option<String>,
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,
    #[serde(default)]
    pub trained_tokens: Option<u64>,
    #[serde(default)]
    pub hyperparameters: Option<serde_json::Value>,
}

/// Event emitted during a fine-tuning job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// Model descriptor from the models listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

impl ModelObject {
    /// Models produced by the account's own fine-tuning jobs.
    pub fn is_user_owned(&self) -> bool {
        self.owned_by.starts_with("user-") || self.owned_by.starts_with("org-")
    }
}

/// Result of a delete call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionStatus {
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Envelope of list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_call_completion_deserializes() {
        let body = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-3.5-turbo-0613",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {
                        "name": "convertToTrainingData",
                        "arguments": "{\"conversation\": []}"
                    }
                },
                "finish_reason": "function_call"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion: ChatCompletion = serde_json::from_str(body).unwrap();
        let call = completion.choices[0].message.function_call.as_ref().unwrap();
        assert_eq!(call.name, "convertToTrainingData");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
        assert!(completion.choices[0].message.content.is_none());
    }

    #[test]
    fn test_unmodelled_completion_fields_survive_reserialization() {
        let body = r#"{
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-3.5-turbo-0613",
            "system_fingerprint": "fp_44709d6fcb",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi", "refusal": null},
                "logprobs": {"content": []},
                "finish_reason": "stop"
            }]
        }"#;
        let completion: ChatCompletion = serde_json::from_str(body).unwrap();
        assert_eq!(completion.extra["object"], "chat.completion");

        let json = serde_json::to_value(&completion).unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["system_fingerprint"], "fp_44709d6fcb");
        assert_eq!(json["created"], 1700000000);
        assert_eq!(json["choices"][0]["logprobs"], serde_json::json!({"content": []}));
        assert!(json["choices"][0]["message"].as_object().unwrap().contains_key("refusal"));
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn test_job_request_omits_missing_suffix() {
        let request = FineTuneJobRequest {
            model: "gpt-3.5-turbo".to_string(),
            training_file: "file-1".to_string(),
            hyperparameters: Hyperparameters {
                n_epochs: Epochs::Auto,
            },
            suffix: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["hyperparameters"]["n_epochs"], "auto");
        assert!(json.get("suffix").is_none());
    }

    #[test]
    fn test_user_owned_models() {
        let model = ModelObject {
            id: "ft:gpt-3.5-turbo:acme::abc".to_string(),
            created: 0,
            owned_by: "user-123".to_string(),
        };
        assert!(model.is_user_owned());
        let base = ModelObject {
            owned_by: "openai".to_string(),
            ..model
        };
        assert!(!base.is_user_owned());
    }
}
