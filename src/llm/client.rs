use crate::error::{ReconcileError, Result};
use crate::llm::types::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_UPLOAD_URL: &str = "https://generativelanguage.googleapis.com/upload/v1beta/files";

/// Reports above this size go through the Files API instead of inline data.
pub const INLINE_LIMIT_BYTES: u64 = 20 * 1024 * 1024;

const STATE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_STATE_POLLS: usize = 90;

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

fn api_error(context: &str, status: StatusCode, body: String) -> ReconcileError {
    let message = format!("{} (status {}): {}", context, status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ReconcileError::Transport {
            message,
            transient: true,
        }
    } else {
        ReconcileError::OracleFailed(message)
    }
}

fn missing(what: &str) -> ReconcileError {
    ReconcileError::OracleFailed(format!("Upload response missing {}", what))
}

fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Reads the report and decides how it travels with each request.
    pub async fn prepare_document(&self, path: &Path) -> Result<DocumentPayload> {
        let bytes = fs::read(path).await?;
        let mime_type = mime_type_for(path);

        if bytes.len() as u64 > INLINE_LIMIT_BYTES {
            debug!("{} is {} bytes; uploading", path.display(), bytes.len());
            let display_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    ReconcileError::DocumentError(format!("Invalid file name: {}", path.display()))
                })?;
            let remote = self.upload_document(display_name, &mime_type, bytes).await?;
            return Ok(DocumentPayload::Remote(remote));
        }

        Ok(DocumentPayload::Inline(InlineData {
            mime_type,
            data: STANDARD.encode(bytes),
        }))
    }

    /// Resumable upload to the Files API, then waits until the file is
    /// usable in prompts.
    pub async fn upload_document(
        &self,
        display_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<RemoteDocument> {
        let session_url = self
            .start_upload(display_name, mime_type, bytes.len())
            .await?;
        let file = self.finish_upload(&session_url, bytes).await?;

        let uri = str_field(&file, "uri").ok_or_else(|| missing("uri"))?.to_string();
        let name = str_field(&file, "name").ok_or_else(|| missing("name"))?.to_string();
        let state = str_field(&file, "state").unwrap_or("PROCESSING").to_string();
        let state = self.wait_until_active(&name, state).await?;

        debug!("Uploaded {} as {}", display_name, name);
        Ok(RemoteDocument {
            uri,
            name,
            display_name: display_name.to_string(),
            mime_type: mime_type.to_string(),
            state,
        })
    }

    async fn start_upload(&self, display_name: &str, mime_type: &str, size: usize) -> Result<String> {
        let res = self
            .client
            .post(format!("{}?key={}", GEMINI_UPLOAD_URL, self.api_key))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", size.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(api_error("Upload init failed", status, res.text().await?));
        }

        res.headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| missing("x-goog-upload-url header"))
    }

    async fn finish_upload(&self, session_url: &str, bytes: Vec<u8>) -> Result<Value> {
        let size = bytes.len();
        let res = self
            .client
            .post(session_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(api_error("File upload failed", status, res.text().await?));
        }

        let mut body: Value = res.json().await?;
        body.get_mut("file").map(Value::take).ok_or_else(|| missing("'file'"))
    }

    async fn wait_until_active(&self, name: &str, mut state: String) -> Result<String> {
        let url = format!("{}/{}?key={}", self.base_url, name, self.api_key);
        for _ in 0..MAX_STATE_POLLS {
            match state.as_str() {
                "ACTIVE" => return Ok(state),
                "FAILED" => {
                    return Err(ReconcileError::OracleFailed(format!(
                        "Files API failed to process {}",
                        name
                    )))
                }
                _ => sleep(STATE_POLL_INTERVAL).await,
            }
            let body: Value = self.client.get(&url).send().await?.json().await?;
            let file = body.get("file").unwrap_or(&body);
            state = str_field(file, "state").unwrap_or("PROCESSING").to_string();
        }
        if state == "ACTIVE" {
            return Ok(state);
        }
        Err(ReconcileError::Transport {
            message: format!("{} still {} after upload", name, state),
            transient: true,
        })
    }

    /// Returns the text of the first candidate part.
    pub async fn generate_content(
        &self,
        model: &str,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content {
                role: "user".to_string(),
                parts: vec![Part::Text {
                    text: system_prompt.to_string(),
                }],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: 0.2,
                top_p: 0.9,
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(api_error("Gemini API error", status, res.text().await?));
        }

        let body: GenerateContentResponse = res.json().await?;
        let first_part = body
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content.parts.into_iter().next());

        match first_part {
            Some(Part::Text { text }) => Ok(text),
            Some(_) => Err(ReconcileError::OracleFailed(
                "Model returned non-text content".to_string(),
            )),
            None => Err(ReconcileError::OracleFailed(
                "Response carried no candidate text".to_string(),
            )),
        }
    }
}

fn mime_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
