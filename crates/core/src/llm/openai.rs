// crates/core/src/llm/openai.rs
//! OpenAI-compatible HTTP provider — POSTs to `{base_url}/chat/completions`.
//!
//! Works against any gateway that speaks the chat/completions dialect.
//! Streaming uses the SSE framing of that API: `data: {json}` lines with a
//! terminal `data: [DONE]`.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::time::{timeout, Duration};

use super::config::LlmConfig;
use super::provider::LlmProvider;
use super::types::{CompletionRequest, CompletionResponse, LlmError};

/// Completion provider backed by an OpenAI-compatible HTTP endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn payload(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.user_prompt}));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if stream {
            payload["stream"] = Value::Bool(true);
        }
        payload
    }

    fn request_builder(&self, payload: &Value) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(self.endpoint()).json(payload);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

/// Extract the assistant message from a non-streaming response body.
///
/// The content is returned verbatim (no trimming) so that streamed deltas
/// concatenate to exactly the same text.
fn parse_completion(body: &Value) -> Result<String, LlmError> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            LlmError::ParseFailed("response has no choices[0].message.content".into())
        })
}

/// One parsed event from the SSE stream.
enum StreamEvent {
    Delta(String),
    Done,
}

/// Parse one line of a streaming response. Returns None for keep-alives,
/// empty deltas, and anything that is not a data line.
fn parse_stream_line(line: &str) -> Option<StreamEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(StreamEvent::Done);
    }
    let value: Value = serde_json::from_str(data).ok()?;
    let delta = value["choices"][0]["delta"]["content"].as_str()?;
    if delta.is_empty() {
        None
    } else {
        Some(StreamEvent::Delta(delta.to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let start = std::time::Instant::now();
        let timeout_secs = self.config.timeout_secs;
        let timeout_duration = Duration::from_secs(timeout_secs);
        let payload = self.payload(&request, false);

        let response = timeout(timeout_duration, self.request_builder(&payload).send())
            .await
            .map_err(|_| {
                tracing::error!(timeout_secs, "completion call timed out");
                LlmError::Timeout(timeout_secs)
            })?
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "completion service returned an error");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: truncate(&message, 500),
            });
        }

        let body: Value = timeout(timeout_duration, response.json())
            .await
            .map_err(|_| LlmError::Timeout(timeout_secs))?
            .map_err(|e| LlmError::ParseFailed(e.to_string()))?;

        let content = parse_completion(&body)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(latency_ms, content_len = content.len(), "completion received");

        Ok(CompletionResponse {
            content,
            model: body["model"].as_str().map(str::to_string),
            input_tokens: body["usage"]["prompt_tokens"].as_u64(),
            output_tokens: body["usage"]["completion_tokens"].as_u64(),
            latency_ms,
        })
    }

    fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<
        (
            tokio::sync::mpsc::Receiver<String>,
            tokio::task::JoinHandle<Result<(), LlmError>>,
        ),
        LlmError,
    > {
        let payload = self.payload(&request, true);
        let builder = self.request_builder(&payload);
        let timeout_secs = self.config.timeout_secs;
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(64);

        let handle = tokio::spawn(async move {
            let response = timeout(Duration::from_secs(timeout_secs), builder.send())
                .await
                .map_err(|_| LlmError::Timeout(timeout_secs))?
                .map_err(|e| LlmError::Http(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message: truncate(&message, 500),
                });
            }

            let mut stream = response.bytes_stream();
            let mut buf = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| LlmError::Stream(e.to_string()))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    match parse_stream_line(line.trim_end()) {
                        Some(StreamEvent::Done) => return Ok(()),
                        Some(StreamEvent::Delta(text)) => {
                            if tx.send(text).await.is_err() {
                                // Receiver dropped — consumer cancelled.
                                // Dropping the response aborts the connection.
                                return Ok(());
                            }
                        }
                        None => {}
                    }
                }
            }

            Ok(())
        });

        Ok((rx, handle))
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        if self.config.api_key.is_none() && self.config.base_url.contains("api.openai.com") {
            return Err(LlmError::NotAvailable("OPENAI_API_KEY is not set".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}
