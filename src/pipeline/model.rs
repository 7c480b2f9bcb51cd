//! Model-client collaborator: send the prompt plus two documents to a
//! generative model and return its free-form answer.
//!
//! [`GeminiClient`] talks to the Gemini REST API directly:
//!
//! 1. Upload the half-page PDF and the OCR HTML as ephemeral files
//!    (resumable upload protocol, single chunk)
//! 2. Poll each file until it is `ACTIVE`
//! 3. Issue one `generateContent` call referencing both files
//! 4. Delete every file that was uploaded, whether step 2 or 3 failed or not
//!
//! Generation over large documents is slow, so the client carries a timeout
//! in minutes rather than seconds (see
//! [`crate::config::PipelineConfig::model_timeout_secs`]).

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MODEL_PREFIX: &str = "models/";
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(2);
const ACTIVE_POLL_ATTEMPTS: u32 = 60;

/// Errors raised inside the model client.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("uploaded file '{name}' did not become active (state {state})")]
    FileNotActive { name: String, state: String },

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Generates text from a prompt and two attached documents.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Ask the model about `document` (the half-page PDF) and `html` (its OCR).
    async fn generate(&self, prompt: &str, document: &Path, html: &Path)
        -> Result<String, ModelError>;
}

/// A file uploaded to the Files API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    /// Resource name, `files/{id}`.
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: String,
}

impl RemoteFile {
    fn is_active(&self) -> bool {
        self.state.is_empty() || self.state == "ACTIVE"
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

// ── generateContent wire types ────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

/// Error envelope returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// [`ModelClient`] backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    /// Build a client whose requests time out after `timeout`.
    pub fn new(
        api_key: impl Into<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model_path(model),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        })
    }

    /// Point the client at another API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Normalised model path, e.g. `models/gemini-2.5-flash`.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Upload one local file and return its remote handle.
    pub async fn upload(&self, path: &Path) -> Result<RemoteFile, ModelError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ModelError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mime = mime_for(path);
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let start = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime)
            .json(&serde_json::json!({ "file": { "display_name": display_name } }))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v: &HeaderValue| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ModelError::Upload("missing x-goog-upload-url header".into()))?;

        let size = bytes.len();
        let finish = self
            .http
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("Content-Length", size.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let finish = check_status(finish).await?;

        let uploaded: UploadResponse = finish.json().await?;
        debug!(
            "Uploaded {} ({} bytes, {}) as {}",
            path.display(),
            size,
            mime,
            uploaded.file.name
        );
        Ok(uploaded.file)
    }

    /// Poll `file` until it is `ACTIVE`.
    pub async fn wait_active(&self, file: RemoteFile) -> Result<RemoteFile, ModelError> {
        let mut current = file;
        for _ in 0..ACTIVE_POLL_ATTEMPTS {
            if current.is_active() {
                return Ok(current);
            }
            if current.state == "FAILED" {
                break;
            }
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
            current = self.get_file(&current.name).await?;
        }
        Err(ModelError::FileNotActive {
            name: current.name,
            state: current.state,
        })
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ModelError> {
        let response = self
            .http
            .get(format!("{}/v1beta/{}", self.base_url, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Delete an uploaded file.
    pub async fn delete(&self, name: &str) -> Result<(), ModelError> {
        let response = self
            .http
            .delete(format!("{}/v1beta/{}", self.base_url, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        check_status(response).await?;
        debug!("Deleted {}", name);
        Ok(())
    }

    async fn generate_with(&self, prompt: &str, files: &[RemoteFile]) -> Result<String, ModelError> {
        let request = build_request(prompt, files);
        let response = self
            .http
            .post(format!("{}/v1beta/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let parsed: GenerateResponse = check_status(response).await?.json().await?;
        Ok(response_text(&parsed))
    }

    async fn upload_active(
        &self,
        path: &Path,
        uploaded: &mut Vec<RemoteFile>,
    ) -> Result<RemoteFile, ModelError> {
        let file = self.upload(path).await?;
        uploaded.push(file.clone());
        self.wait_active(file).await
    }

    fn transport(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout)
        } else {
            ModelError::Http(e)
        }
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        document: &Path,
        html: &Path,
    ) -> Result<String, ModelError> {
        let mut uploaded = Vec::with_capacity(2);

        let result: Result<String, ModelError> = async {
            let pdf = self.upload_active(document, &mut uploaded).await?;
            let page = self.upload_active(html, &mut uploaded).await?;
            self.generate_with(prompt, &[pdf, page]).await
        }
        .await;

        for file in &uploaded {
            if let Err(e) = self.delete(&file.name).await {
                warn!("Failed to delete uploaded file {}: {}", file.name, e);
            }
        }

        result
    }
}

/// Turn a non-2xx response into [`ModelError::Api`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ModelError::Api {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|env| env.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

fn build_request(prompt: &str, files: &[RemoteFile]) -> GenerateRequest {
    let mut parts = Vec::with_capacity(files.len() + 1);
    parts.push(Part {
        text: Some(prompt.to_string()),
        file_data: None,
    });
    for file in files {
        parts.push(Part {
            text: None,
            file_data: Some(FileData {
                mime_type: file.mime_type.clone(),
                file_uri: file.uri.clone(),
            }),
        });
    }
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".into()),
            parts,
        }],
    }
}

/// Concatenated text parts of the first candidate, or `""`.
fn response_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .map(|c| {
            c.content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Add the `models/` prefix when missing.
pub fn model_path(model: &str) -> String {
    let model = model.trim();
    if model.starts_with(MODEL_PREFIX) {
        model.to_string()
    } else {
        format!("{}{}", MODEL_PREFIX, model)
    }
}

/// MIME type sent for an uploaded file.
pub fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(name: &str, uri: &str, mime: &str) -> RemoteFile {
        RemoteFile {
            name: name.into(),
            uri: uri.into(),
            mime_type: mime.into(),
            state: "ACTIVE".into(),
        }
    }

    #[test]
    fn model_prefix_is_added_once() {
        assert_eq!(model_path("gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(model_path("models/gemini-2.5-pro"), "models/gemini-2.5-pro");
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_for(Path::new("a/2019_p01_L.pdf")), "application/pdf");
        assert_eq!(mime_for(Path::new("p01_l/page.HTML")), "text/html");
        assert_eq!(mime_for(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn request_has_prompt_then_files() {
        let request = build_request(
            "Extract questions.",
            &[
                remote("files/a", "https://x/files/a", "application/pdf"),
                remote("files/b", "https://x/files/b", "text/html"),
            ],
        );
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "Extract questions."},
                        {"fileData": {"mimeType": "application/pdf", "fileUri": "https://x/files/a"}},
                        {"fileData": {"mimeType": "text/html", "fileUri": "https://x/files/b"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "```json\n"}, {"text": "{}\n```"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(response_text(&response), "```json\n{}\n```");
    }

    #[test]
    fn empty_response_is_empty_text() {
        let response: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response_text(&response), "");
    }

    #[test]
    fn api_error_message_prefers_envelope() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid");
        assert_eq!(api_error_message(" plain text \n"), "plain text");
    }

    #[test]
    fn upload_response_shape() {
        let uploaded: UploadResponse = serde_json::from_value(json!({
            "file": {
                "name": "files/abc",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc",
                "mimeType": "application/pdf",
                "state": "PROCESSING"
            }
        }))
        .unwrap();
        assert_eq!(uploaded.file.name, "files/abc");
        assert!(!uploaded.file.is_active());
    }

    #[test]
    fn client_normalises_model_and_base_url() {
        let client = GeminiClient::new("k", "gemini-2.5-flash", Duration::from_secs(600))
            .unwrap()
            .with_base_url("http://localhost:9000/");
        assert_eq!(client.model(), "models/gemini-2.5-flash");
        assert_eq!(client.base_url, "http://localhost:9000");
    }
}
