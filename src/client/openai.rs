//! Remote API client for chat completions, files and fine-tuning jobs.
//!
//! One explicitly constructed client is shared by every command. All calls go
//! through the same retry loop:
//! - request timeout from config
//! - exponential backoff on network errors and 5xx
//! - `retry-after` honoured on 429
//! - no retry on 401, 404 or other 4xx

use crate::client::{
    ChatCompletion, ChatRequest, DeletionStatus, FileObject, FineTuneJob, FineTuneJobRequest,
    JobEvent, ListResponse, ModelObject,
};
use crate::models::{ApiConfig, ApiError, OaiftError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Purpose tag for uploaded training files.
pub const FINE_TUNE_PURPOSE: &str = "fine-tune";

/// Wait used when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: f64 = 1.0;

/// Longest `retry-after` honoured.
const MAX_RETRY_AFTER_SECS: f64 = 60.0;

/// Seconds to wait for a `retry-after` header value.
///
/// Only finite, non-negative numbers are accepted, capped at
/// [`MAX_RETRY_AFTER_SECS`].
fn retry_after_secs(header: Option<&str>) -> f64 {
    header
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| secs.min(MAX_RETRY_AFTER_SECS))
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// API error response body.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    // Usage tracking
    total_requests: AtomicU64,
    total_tokens: AtomicU64,
}

impl OpenAiClient {
    /// Create a new client.
    pub fn new(
        api_key: String,
        base_url: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(OaiftError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            max_retries: max_retries.max(1),
            total_requests: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        })
    }

    /// Create a client from the `[api]` section of a project config.
    pub fn from_config(config: &ApiConfig, api_key: String) -> Result<Self> {
        Self::new(
            api_key,
            config.base_url.clone(),
            config.timeout_secs,
            config.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.api_key)
    }

    /// Send a request with retries and return the successful response.
    ///
    /// `build` is called once per attempt since request bodies are consumed.
    /// Whether and how long to wait is decided by [`OaiftError::is_retryable`]
    /// and [`OaiftError::retry_after`].
    async fn execute<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            self.total_requests.fetch_add(1, Ordering::Relaxed);

            let error = match self.send_once(what, &build).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= self.max_retries || !error.is_retryable() {
                return Err(error);
            }

            let backoff = Duration::from_secs(2u64.pow(attempt - 1));
            let delay = error
                .retry_after()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(backoff);
            debug!(
                what = what,
                attempt = attempt,
                delay_secs = delay.as_secs_f64(),
                error = %error,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One attempt; any non-2xx status becomes an error.
    async fn send_once<F>(&self, what: &str, build: &F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = build().send().await.map_err(|e| {
            if e.is_timeout() {
                OaiftError::Timeout(self.timeout)
            } else {
                OaiftError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        if status == 429 {
            let retry_after = retry_after_secs(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let message = response.text().await.unwrap_or_default();
            return Err(OaiftError::Api(ApiError::RateLimited {
                message,
                retry_after_secs: Some(retry_after),
            }));
        }

        let error_body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
            .map(|e| e.error.message)
            .unwrap_or(error_body);

        Err(OaiftError::Api(match status {
            401 => ApiError::AuthenticationFailed,
            404 => ApiError::NotFound(format!("{what}: {message}")),
            _ => ApiError::Status { status, message },
        }))
    }

    async fn send_json<T, F>(&self, what: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self.execute(what, build).await?;
        response.json::<T>().await.map_err(|e| {
            OaiftError::Api(ApiError::InvalidResponse(format!(
                "Failed to parse {what} response: {e}"
            )))
        })
    }

    /// Create a chat completion.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let completion: ChatCompletion = self
            .send_json("chat completion", || {
                self.request(Method::POST, "chat/completions").json(request)
            })
            .await?;

        if let Some(usage) = &completion.usage {
            self.total_tokens
                .fetch_add(usage.total_tokens, Ordering::Relaxed);
        }
        Ok(completion)
    }

    /// Upload a training file.
    pub async fn upload_file(&self, path: &Path, purpose: &str) -> Result<FileObject> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OaiftError::io(format!("reading {}", path.display()), e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "training_set.jsonl".to_string());

        self.send_json("file upload", || {
            let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
            let form = Form::new()
                .part("file", part)
                .text("purpose", purpose.to_string());
            self.request(Method::POST, "files").multipart(form)
        })
        .await
    }

    /// Create a fine-tuning job.
    pub async fn create_fine_tune_job(&self, request: &FineTuneJobRequest) -> Result<FineTuneJob> {
        self.send_json("fine-tuning job creation", || {
            self.request(Method::POST, "fine_tuning/jobs").json(request)
        })
        .await
    }

    pub async fn list_files(&self) -> Result<Vec<FileObject>> {
        let list: ListResponse<FileObject> = self
            .send_json("file listing", || self.request(Method::GET, "files"))
            .await?;
        Ok(list.data)
    }

    /// Raw content of an uploaded file.
    pub async fn file_content(&self, id: &str) -> Result<String> {
        let path = format!("files/{id}/content");
        let response = self
            .execute("file content", || self.request(Method::GET, &path))
            .await?;
        response.text().await.map_err(OaiftError::Network)
    }

    pub async fn delete_file(&self, id: &str) -> Result<DeletionStatus> {
        let path = format!("files/{id}");
        self.send_json("file deletion", || self.request(Method::DELETE, &path))
            .await
    }

    pub async fn list_fine_tune_jobs(&self) -> Result<Vec<FineTuneJob>> {
        let list: ListResponse<FineTuneJob> = self
            .send_json("job listing", || {
                self.request(Method::GET, "fine_tuning/jobs")
            })
            .await?;
        Ok(list.data)
    }

    pub async fn retrieve_fine_tune_job(&self, id: &str) -> Result<FineTuneJob> {
        let path = format!("fine_tuning/jobs/{id}");
        self.send_json("job retrieval", || self.request(Method::GET, &path))
            .await
    }

    pub async fn cancel_fine_tune_job(&self, id: &str) -> Result<FineTuneJob> {
        let path = format!("fine_tuning/jobs/{id}/cancel");
        self.send_json("job cancellation", || self.request(Method::POST, &path))
            .await
    }

    pub async fn list_fine_tune_events(&self, id: &str) -> Result<Vec<JobEvent>> {
        let path = format!("fine_tuning/jobs/{id}/events");
        let list: ListResponse<JobEvent> = self
            .send_json("job events", || self.request(Method::GET, &path))
            .await?;
        Ok(list.data)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelObject>> {
        let list: ListResponse<ModelObject> = self
            .send_json("model listing", || self.request(Method::GET, "models"))
            .await?;
        Ok(list.data)
    }

    pub async fn delete_model(&self, id: &str) -> Result<DeletionStatus> {
        let path = format!("models/{id}");
        self.send_json("model deletion", || self.request(Method::DELETE, &path))
            .await
    }

    /// Get (requests sent, tokens reported) so far.
    pub fn usage(&self) -> (u64, u64) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn client(server: &mockito::ServerGuard, max_retries: u32) -> OpenAiClient {
        OpenAiClient::new("test-key".to_string(), server.url(), 5, max_retries).unwrap()
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-3.5-turbo".to_string(),
            messages: vec![Message::system("S"), Message::user("hi")],
            temperature: 0.5,
            functions: Vec::new(),
            function_call: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "c1", "model": "gpt-3.5-turbo-0613",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}}"#,
            )
            .create_async()
            .await;

        let client = client(&server, 1);
        let completion = client.chat_completion(&chat_request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(completion.model, "gpt-3.5-turbo-0613");
        assert_eq!(
            completion.choices[0].message.content.as_deref(),
            Some("hello")
        );
        assert_eq!(client.usage(), (1, 5));
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": {"message": "bad key"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client(&server, 3);
        let err = client.chat_completion(&chat_request()).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, OaiftError::Api(ApiError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_server_error_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(r#"{"error": {"message": "overloaded"}}"#)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server, 2);
        let err = client.chat_completion(&chat_request()).await.unwrap_err();

        mock.assert_async().await;
        match err {
            OaiftError::Api(ApiError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_retry_after_rejects_unusable_values() {
        assert_eq!(retry_after_secs(Some("5")), 5.0);
        assert_eq!(retry_after_secs(Some("0.5")), 0.5);
        assert_eq!(retry_after_secs(Some("1000")), MAX_RETRY_AFTER_SECS);
        for bad in ["-1", "NaN", "inf", "-inf", "soon"] {
            assert_eq!(retry_after_secs(Some(bad)), DEFAULT_RETRY_AFTER_SECS, "{bad}");
        }
        assert_eq!(retry_after_secs(None), DEFAULT_RETRY_AFTER_SECS);
    }

    #[tokio::test]
    async fn test_negative_retry_after_fails_the_call() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_header("retry-after", "-1")
            .with_body("slow down")
            .expect(2)
            .create_async()
            .await;

        let err = client(&server, 2)
            .chat_completion(&chat_request())
            .await
            .unwrap_err();

        mock.assert_async().await;
        match err {
            OaiftError::Api(ApiError::RateLimited {
                retry_after_secs, ..
            }) => assert_eq!(retry_after_secs, Some(DEFAULT_RETRY_AFTER_SECS)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_upload_file_sends_multipart() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("training_set.jsonl");
        std::fs::write(&path, "{\"messages\":[]}").unwrap();

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/files")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(mockito::Matcher::Regex("fine-tune".to_string()))
            .with_status(200)
            .with_body(
                r#"{"id": "file-1", "filename": "training_set.jsonl", "bytes": 15,
                    "created_at": 1700000000, "purpose": "fine-tune"}"#,
            )
            .create_async()
            .await;

        let file = client(&server, 1)
            .upload_file(&path, FINE_TUNE_PURPOSE)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(file.id, "file-1");
        assert_eq!(file.bytes, 15);
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(
                r#"{"object": "list", "data": [
                    {"id": "gpt-4", "created": 1, "owned_by": "openai"},
                    {"id": "ft:gpt-3.5-turbo:acme::x", "created": 2, "owned_by": "user-abc"}]}"#,
            )
            .create_async()
            .await;

        let models = client(&server, 1).list_models().await.unwrap();
        let owned: Vec<_> = models.iter().filter(|m| m.is_user_owned()).collect();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "ft:gpt-3.5-turbo:acme::x");
    }
}
