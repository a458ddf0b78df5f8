//! Upload widget
//!
//! Takes one image (picked or dropped), checks it locally, sends it to the
//! backend and announces a successful upload on the [`RefreshHub`]. A file
//! that fails the local checks never reaches the backend.

use crate::api::Backend;
use crate::auth::CredentialProvider;
use crate::error::ClientError;
use crate::events::RefreshHub;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// 5 MiB
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

pub const INVALID_TYPE_MESSAGE: &str =
    "Invalid file type. Only JPG, PNG, and GIF images are allowed.";
pub const TOO_LARGE_MESSAGE: &str = "File size exceeds 5MB limit.";
pub const UPLOADING_MESSAGE: &str = "Uploading your image...";
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload file. Please try again.";

/// A file the user wants to upload. Lives only for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    name: String,
    mime_type: String,
    size: u64,
    payload: Vec<u8>,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: payload.len() as u64,
            payload,
        }
    }

    /// Describe a local file and read it only if it would pass [`validate`].
    /// The declared type comes from the extension, like a browser file
    /// picker would report it, and the size from the file's metadata.
    ///
    /// A candidate that fails validation carries an empty payload.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let mut candidate = Self {
            name,
            mime_type,
            size: metadata.len(),
            payload: Vec::new(),
        };
        if validate(&candidate).is_ok() {
            // The file may have changed since the metadata call.
            candidate.payload = tokio::fs::read(path).await?;
            candidate.size = candidate.payload.len() as u64;
        }
        Ok(candidate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    InvalidType,
    TooLarge,
}

impl Rejection {
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::InvalidType => INVALID_TYPE_MESSAGE,
            Rejection::TooLarge => TOO_LARGE_MESSAGE,
        }
    }
}

/// Type first, then size. The first failing check is the only one reported.
pub fn validate(candidate: &UploadCandidate) -> Result<(), Rejection> {
    if !ALLOWED_MIME_TYPES.contains(&candidate.mime_type()) {
        return Err(Rejection::InvalidType);
    }
    if candidate.size() > MAX_UPLOAD_BYTES {
        return Err(Rejection::TooLarge);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Validating,
    InvalidType,
    TooLarge,
    Submitting { name: String },
    Success { name: String },
    Failure { message: String },
}

impl UploadState {
    /// Text shown under the picker, `None` while idle.
    pub fn message(&self) -> Option<String> {
        match self {
            UploadState::Idle | UploadState::Validating => None,
            UploadState::InvalidType => Some(INVALID_TYPE_MESSAGE.to_string()),
            UploadState::TooLarge => Some(TOO_LARGE_MESSAGE.to_string()),
            UploadState::Submitting { .. } => Some(UPLOADING_MESSAGE.to_string()),
            UploadState::Success { name } => {
                Some(format!("File \"{}\" uploaded successfully!", name))
            }
            UploadState::Failure { message } => Some(message.clone()),
        }
    }

    pub fn is_submitting(&self) -> bool {
        matches!(self, UploadState::Submitting { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            UploadState::InvalidType | UploadState::TooLarge | UploadState::Failure { .. }
        )
    }
}

impl From<Rejection> for UploadState {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::InvalidType => UploadState::InvalidType,
            Rejection::TooLarge => UploadState::TooLarge,
        }
    }
}

pub struct UploadWidget {
    backend: Arc<dyn Backend>,
    credentials: Arc<dyn CredentialProvider>,
    hub: RefreshHub,
    state: watch::Sender<UploadState>,
    drag_over: bool,
    picker: Option<String>,
}

impl UploadWidget {
    pub fn new(
        backend: Arc<dyn Backend>,
        credentials: Arc<dyn CredentialProvider>,
        hub: RefreshHub,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            backend,
            credentials,
            hub,
            state,
            drag_over: false,
            picker: None,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    /// Follow state changes from a renderer that does not own the widget.
    pub fn watch(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn is_drag_over(&self) -> bool {
        self.drag_over
    }

    /// Visual affordance only.
    pub fn drag_enter(&mut self) {
        self.drag_over = true;
    }

    pub fn drag_leave(&mut self) {
        self.drag_over = false;
    }

    /// Current file-picker value; cleared after a successful upload.
    pub fn picker_value(&self) -> Option<&str> {
        self.picker.as_deref()
    }

    pub fn set_picker(&mut self, value: impl Into<String>) {
        self.picker = Some(value.into());
    }

    pub fn reset(&mut self) {
        self.state.send_replace(UploadState::Idle);
    }

    /// Drop handler: only the first file is used.
    pub async fn drop_files(&mut self, files: Vec<UploadCandidate>) -> UploadState {
        self.drag_over = false;
        match files.into_iter().next() {
            Some(first) => self.select(first).await,
            None => self.state(),
        }
    }

    /// Validate and, if the file passes, upload it. Exactly one refresh
    /// notification is published per successful upload and none otherwise.
    pub async fn select(&mut self, candidate: UploadCandidate) -> UploadState {
        self.state.send_replace(UploadState::Validating);

        if let Err(rejection) = validate(&candidate) {
            return self.set(rejection.into());
        }

        self.state.send_replace(UploadState::Submitting {
            name: candidate.name().to_string(),
        });

        match self.submit(&candidate).await {
            Ok(()) => {
                self.picker = None;
                let next = self.set(UploadState::Success {
                    name: candidate.name().to_string(),
                });
                self.hub.publish();
                next
            }
            Err(e) => {
                warn!(file = candidate.name(), error = %e, "Upload failed");
                let message = e
                    .detail()
                    .map(str::to_string)
                    .unwrap_or_else(|| UPLOAD_FAILED_MESSAGE.to_string());
                self.set(UploadState::Failure { message })
            }
        }
    }

    async fn submit(&self, candidate: &UploadCandidate) -> Result<(), ClientError> {
        let token = self.credentials.bearer_token().await?;
        let receipt = self.backend.upload_file(&token, candidate).await?;
        info!(
            file = candidate.name(),
            bytes = candidate.size(),
            id = ?receipt.id,
            "Uploaded image"
        );
        Ok(())
    }

    fn set(&self, state: UploadState) -> UploadState {
        self.state.send_replace(state.clone());
        state
    }
}
