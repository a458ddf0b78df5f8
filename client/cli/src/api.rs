use crate::error::ClientError;
use crate::upload::UploadCandidate;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error};

/// Every call made through [`ApiClient`] is bounded by this.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

// --- File types ---

/// Opaque record id. The backend currently sends integers, but the client
/// never interprets it beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileId {
    Number(i64),
    Text(String),
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileId::Number(n) => write!(f, "{}", n),
            FileId::Text(s) => f.write_str(s),
        }
    }
}

/// Metadata for one previously uploaded image. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub original_filename: String,
    pub file_size: u64,
    /// ISO-8601, as sent by the backend.
    pub uploaded_at: String,
    /// Absolute URL used for both the preview and the full-size view.
    pub file_url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Body of a successful `POST /upload`. Only logged; success is decided by
/// the status code alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UploadReceipt {
    pub id: Option<FileId>,
    pub filename: Option<String>,
    pub url: Option<String>,
    pub size: Option<u64>,
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// The two backend operations the upload widget and gallery depend on, plus
/// the preview probe used to hide broken thumbnails.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, ClientError>;

    async fn upload_file(
        &self,
        token: &str,
        candidate: &UploadCandidate,
    ) -> Result<UploadReceipt, ClientError>;

    async fn probe_preview(&self, url: &str) -> Result<(), ClientError>;
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request and run the response hook on whatever comes back.
    /// Non-2xx responses are turned into `ClientError::Status` with the
    /// server's `detail`, if any.
    async fn dispatch(&self, label: &str, req: RequestBuilder) -> Result<Response, ClientError> {
        let outcome = match req.send().await {
            Ok(resp) if resp.status().is_success() => Ok(resp),
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                Err(ClientError::Status {
                    status,
                    detail: extract_detail(&body),
                })
            }
            Err(e) => Err(ClientError::from(e)),
        };
        log_response(label, &outcome);
        outcome
    }

    pub async fn health(&self) -> Result<String, ClientError> {
        let resp = self
            .dispatch("GET /health", self.client.get(format!("{}/health", self.base_url)))
            .await?;
        let health: HealthResponse = resp.json().await?;
        Ok(health.status)
    }

    pub async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, ClientError> {
        let req = self
            .client
            .get(format!("{}/files", self.base_url))
            .bearer_auth(token);
        let resp = self.dispatch("GET /files", req).await?;
        resp.json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn upload_file(
        &self,
        token: &str,
        candidate: &UploadCandidate,
    ) -> Result<UploadReceipt, ClientError> {
        let part = reqwest::multipart::Part::bytes(candidate.payload().to_vec())
            .file_name(candidate.name().to_string())
            .mime_str(candidate.mime_type())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let req = self
            .client
            .post(format!("{}/upload", self.base_url))
            .bearer_auth(token)
            .multipart(form);
        let resp = self.dispatch("POST /upload", req).await?;

        let receipt = match resp.bytes().await {
            Ok(body) => serde_json::from_slice(&body).unwrap_or_default(),
            Err(_) => UploadReceipt::default(),
        };
        Ok(receipt)
    }

    pub async fn probe_preview(&self, url: &str) -> Result<(), ClientError> {
        self.dispatch("HEAD preview", self.client.head(url)).await?;
        Ok(())
    }
}

#[async_trait]
impl Backend for ApiClient {
    async fn list_files(&self, token: &str) -> Result<Vec<FileRecord>, ClientError> {
        ApiClient::list_files(self, token).await
    }

    async fn upload_file(
        &self,
        token: &str,
        candidate: &UploadCandidate,
    ) -> Result<UploadReceipt, ClientError> {
        ApiClient::upload_file(self, token, candidate).await
    }

    async fn probe_preview(&self, url: &str) -> Result<(), ClientError> {
        ApiClient::probe_preview(self, url).await
    }
}

/// Response hook. Observes every outcome, never changes it.
fn log_response(label: &str, outcome: &Result<Response, ClientError>) {
    match outcome {
        Ok(resp) => debug!(request = label, status = resp.status().as_u16(), "API response"),
        Err(e) => error!(request = label, error = %e, "API error"),
    }
}

/// Pull a string `detail` out of an error body (`{"detail": "..."}`).
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("detail")?
        .as_str()
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const FILES_BODY: &str = r#"[
        {"id": 7, "original_filename": "cat.png", "file_url": "https://blob.example/cat.png",
         "file_size": 2048, "content_type": "image/png", "uploaded_at": "2024-05-01T10:00:00"},
        {"id": "b-2", "original_filename": "dog.gif", "file_url": "https://blob.example/dog.gif",
         "file_size": 10, "uploaded_at": "2024-04-30T08:15:00+00:00"}
    ]"#;

    #[test]
    fn test_extract_detail() {
        assert_eq!(
            extract_detail(r#"{"detail": "Invalid image file"}"#).as_deref(),
            Some("Invalid image file")
        );
        assert_eq!(extract_detail(r#"{"detail": [{"loc": ["body"]}]}"#), None);
        assert_eq!(extract_detail(r#"{"detail": ""}"#), None);
        assert_eq!(extract_detail("<html>Bad Gateway</html>"), None);
    }

    #[test]
    fn test_file_id_display() {
        assert_eq!(FileId::Number(42).to_string(), "42");
        assert_eq!(FileId::Text("abc".into()).to_string(), "abc");
    }

    #[tokio::test]
    async fn test_list_files_sends_bearer_and_keeps_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/files")
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(FILES_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&format!("{}/", server.url())).unwrap();
        let files = client.list_files("tok").await.unwrap();
        mock.assert_async().await;

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, FileId::Number(7));
        assert_eq!(files[0].original_filename, "cat.png");
        assert_eq!(files[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(files[1].id, FileId::Text("b-2".into()));
        assert_eq!(files[1].content_type, None);
    }

    #[tokio::test]
    async fn test_list_files_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/files")
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.list_files("tok").await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Status {
                status: 500,
                detail: None
            }
        );
    }

    #[tokio::test]
    async fn test_upload_is_multipart_with_file_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_header("authorization", "Bearer tok")
            .match_header("content-type", Matcher::Regex("^multipart/form-data".into()))
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file""#.into()),
                Matcher::Regex(r#"filename="cat.png""#.into()),
                Matcher::Regex("not really a png".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"id": 9, "filename": "cat.png", "url": "https://blob.example/x.png", "size": 16}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let candidate = UploadCandidate::new("cat.png", "image/png", b"not really a png".to_vec());
        let receipt = client.upload_file("tok", &candidate).await.unwrap();
        mock.assert_async().await;

        assert_eq!(receipt.id, Some(FileId::Number(9)));
        assert_eq!(receipt.size, Some(16));
    }

    #[tokio::test]
    async fn test_upload_success_with_unexpected_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(201)
            .with_body("ok")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let candidate = UploadCandidate::new("a.gif", "image/gif", vec![0u8; 4]);
        let receipt = client.upload_file("tok", &candidate).await.unwrap();
        assert!(receipt.id.is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_surfaces_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/upload")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"detail": "Invalid image file"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let candidate = UploadCandidate::new("a.png", "image/png", vec![1, 2, 3]);
        let err = client.upload_file("tok", &candidate).await.unwrap_err();
        assert_eq!(err.detail(), Some("Invalid image file"));
    }

    #[tokio::test]
    async fn test_health_and_probe() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status": "healthy"}"#)
            .create_async()
            .await;
        server
            .mock("HEAD", "/blobs/ok.png")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", "/blobs/gone.png")
            .with_status(404)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert_eq!(client.health().await.unwrap(), "healthy");
        assert!(client
            .probe_preview(&format!("{}/blobs/ok.png", server.url()))
            .await
            .is_ok());
        assert!(client
            .probe_preview(&format!("{}/blobs/gone.png", server.url()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = client.list_files("tok").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    fn log_everything() -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    #[tokio::test]
    async fn test_silent_backend_times_out() {
        let _logs = log_everything();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and never answer.
        let silent = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let client =
            ApiClient::with_timeout(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();
        let err = client.list_files("tok").await.unwrap_err();
        assert_eq!(err, ClientError::Timeout);
        silent.abort();
    }

    #[tokio::test]
    async fn test_logging_hook_keeps_outcome() {
        let _logs = log_everything();
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/files")
            .with_status(200)
            .with_body(FILES_BODY)
            .create_async()
            .await;
        let _bad = server
            .mock("POST", "/upload")
            .with_status(400)
            .with_body(r#"{"detail": "Invalid image file"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        assert_eq!(client.list_files("tok").await.unwrap().len(), 2);

        let candidate = UploadCandidate::new("cat.png", "image/png", b"png".to_vec());
        let err = client.upload_file("tok", &candidate).await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Status {
                status: 400,
                detail: Some("Invalid image file".into()),
            }
        );
    }
}
