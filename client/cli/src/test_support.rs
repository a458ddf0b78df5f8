//! In-memory stand-ins for the backend and the identity provider.

use crate::api::{Backend, FileId, FileRecord, UploadReceipt};
use crate::auth::CredentialProvider;
use crate::error::ClientError;
use crate::upload::UploadCandidate;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, Semaphore};

pub type ListResult = Result<Vec<FileRecord>, ClientError>;

pub fn record(id: i64, name: &str, size: u64) -> FileRecord {
    FileRecord {
        id: FileId::Number(id),
        original_filename: name.to_string(),
        file_size: size,
        uploaded_at: "2024-05-01T10:00:00".to_string(),
        file_url: format!("https://blob.example/{}", name),
        content_type: Some("image/png".to_string()),
    }
}

enum Reply {
    Now(ListResult),
    Later(oneshot::Receiver<ListResult>),
}

/// Serves `listing` for `GET /files` unless a scripted reply is queued.
/// Successful uploads are appended to `listing`.
#[derive(Default)]
pub struct FakeBackend {
    listing: Mutex<Vec<FileRecord>>,
    replies: Mutex<VecDeque<Reply>>,
    upload_error: Mutex<Option<ClientError>>,
    uploads: Mutex<Vec<(String, String)>>,
    broken_previews: Mutex<HashSet<String>>,
    preview_gate: Mutex<Option<Arc<Semaphore>>>,
    list_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    preview_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listing(files: Vec<FileRecord>) -> Self {
        let backend = Self::new();
        *backend.listing.lock().unwrap() = files;
        backend
    }

    pub fn set_listing(&self, files: Vec<FileRecord>) {
        *self.listing.lock().unwrap() = files;
    }

    pub fn reply_now(&self, result: ListResult) {
        self.replies.lock().unwrap().push_back(Reply::Now(result));
    }

    /// Queue a reply that resolves when the returned sender fires.
    pub fn reply_later(&self) -> oneshot::Sender<ListResult> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Reply::Later(rx));
        tx
    }

    pub fn fail_uploads(&self, err: ClientError) {
        *self.upload_error.lock().unwrap() = Some(err);
    }

    pub fn break_preview(&self, url: &str) {
        self.broken_previews.lock().unwrap().insert(url.to_string());
    }

    /// Make every later preview check wait for a permit on the returned
    /// semaphore.
    pub fn hold_previews(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.preview_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn preview_calls(&self) -> usize {
        self.preview_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn last_upload_token(&self) -> Option<String> {
        self.uploads.lock().unwrap().last().map(|(_, t)| t.clone())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_files(&self, _token: &str) -> Result<Vec<FileRecord>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Now(result)) => result,
            Some(Reply::Later(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::Transport("reply dropped".into()))),
            None => Ok(self.listing.lock().unwrap().clone()),
        }
    }

    async fn upload_file(
        &self,
        token: &str,
        candidate: &UploadCandidate,
    ) -> Result<UploadReceipt, ClientError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.uploads
            .lock()
            .unwrap()
            .push((candidate.name().to_string(), token.to_string()));
        if let Some(err) = self.upload_error.lock().unwrap().clone() {
            return Err(err);
        }

        let mut listing = self.listing.lock().unwrap();
        let id = listing.len() as i64 + 1;
        listing.insert(0, record(id, candidate.name(), candidate.size()));
        Ok(UploadReceipt {
            id: Some(FileId::Number(id)),
            filename: Some(candidate.name().to_string()),
            ..Default::default()
        })
    }

    async fn probe_preview(&self, url: &str) -> Result<(), ClientError> {
        self.preview_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.preview_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.broken_previews.lock().unwrap().contains(url) {
            Err(ClientError::Status {
                status: 404,
                detail: None,
            })
        } else {
            Ok(())
        }
    }
}

/// Identity provider that refuses to hand out a token.
pub struct DeniedToken;

#[async_trait]
impl CredentialProvider for DeniedToken {
    async fn bearer_token(&self) -> Result<String, ClientError> {
        Err(ClientError::Auth("login required".into()))
    }
}
