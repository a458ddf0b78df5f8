//! Gallery view
//!
//! Holds the most recent successful `GET /files` result and reloads it every
//! time a refresh notification arrives. Each reload replaces the whole
//! collection; a failed reload drops it in favour of an error state.

use crate::api::{Backend, FileId, FileRecord};
use crate::auth::CredentialProvider;
use crate::error::ClientError;
use crate::events::RefreshHub;
use crate::format::{format_file_size, format_timestamp};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

pub const LOAD_ERROR_MESSAGE: &str = "Failed to load files. Please try again.";
pub const LOADING_MESSAGE: &str = "Loading your files...";
pub const EMPTY_MESSAGE: &str = "No images uploaded yet.";
pub const EMPTY_HINT: &str = "Upload your first image using the form above!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub record: FileRecord,
    /// Set when the preview could not be fetched. Affects this entry only.
    pub preview_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryState {
    Loading,
    Loaded(Vec<GalleryEntry>),
    LoadError(String),
}

/// Which of several overlapping loads gets to set the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOrdering {
    /// Only the most recently started load may apply its result; older
    /// responses arriving late are dropped.
    #[default]
    LatestIssued,
    /// Whichever response arrives last wins, regardless of start order.
    LastCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load was started before this one finished.
    Superseded,
    /// The view was torn down while the request was in flight.
    Detached,
}

pub struct GalleryView {
    backend: Arc<dyn Backend>,
    credentials: Arc<dyn CredentialProvider>,
    ordering: LoadOrdering,
    generation: AtomicU64,
    attached: AtomicBool,
    state: watch::Sender<GalleryState>,
}

impl GalleryView {
    pub fn new(backend: Arc<dyn Backend>, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (state, _) = watch::channel(GalleryState::Loading);
        Self {
            backend,
            credentials,
            ordering: LoadOrdering::default(),
            generation: AtomicU64::new(0),
            attached: AtomicBool::new(true),
            state,
        }
    }

    pub fn with_ordering(mut self, ordering: LoadOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn state(&self) -> GalleryState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GalleryState> {
        self.state.subscribe()
    }

    /// Fetch a token, then the file list, and replace the displayed state.
    pub async fn load(&self) -> LoadOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.attached.load(Ordering::SeqCst) {
            self.state.send_replace(GalleryState::Loading);
        }

        let result = self.fetch().await;
        self.apply(generation, result)
    }

    /// Manual retry after an error. Same protocol as [`reload`](Self::reload).
    pub async fn retry(&self) -> LoadOutcome {
        self.reload().await
    }

    /// [`load`](Self::load), then check the previews of the collection it
    /// applied.
    pub async fn reload(&self) -> LoadOutcome {
        let outcome = self.load().await;
        if outcome == LoadOutcome::Applied {
            self.probe_previews().await;
        }
        outcome
    }

    async fn fetch(&self) -> Result<Vec<FileRecord>, ClientError> {
        let token = self.credentials.bearer_token().await?;
        self.backend.list_files(&token).await
    }

    fn apply(&self, generation: u64, result: Result<Vec<FileRecord>, ClientError>) -> LoadOutcome {
        if !self.attached.load(Ordering::SeqCst) {
            debug!(generation, "Gallery detached, dropping load result");
            return LoadOutcome::Detached;
        }

        let next = match result {
            Ok(files) => {
                info!(generation, count = files.len(), "Loaded files");
                GalleryState::Loaded(
                    files
                        .into_iter()
                        .map(|record| GalleryEntry {
                            record,
                            preview_hidden: false,
                        })
                        .collect(),
                )
            }
            Err(e) => {
                warn!(generation, error = %e, "Error fetching files");
                GalleryState::LoadError(LOAD_ERROR_MESSAGE.to_string())
            }
        };

        let mut outcome = LoadOutcome::Applied;
        self.state.send_if_modified(|state| {
            let latest = self.generation.load(Ordering::SeqCst);
            if self.ordering == LoadOrdering::LatestIssued && generation != latest {
                outcome = LoadOutcome::Superseded;
                return false;
            }
            *state = next;
            true
        });
        if outcome == LoadOutcome::Superseded {
            debug!(generation, "Stale gallery response ignored");
        }
        outcome
    }

    /// Hide one entry's preview. Returns false if the entry is not shown.
    pub fn hide_preview(&self, id: &FileId) -> bool {
        self.state.send_if_modified(|state| hide_in(state, id))
    }

    /// Like [`hide_preview`](Self::hide_preview), but only while no load has
    /// started since `generation`.
    fn hide_preview_from(&self, generation: u64, id: &FileId) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                debug!(generation, %id, "Preview check outlived its load");
                return false;
            }
            hide_in(state, id)
        })
    }

    /// Check every shown preview and hide the ones that fail to load.
    /// Returns how many were hidden.
    pub async fn probe_previews(&self) -> usize {
        let generation = self.generation.load(Ordering::SeqCst);
        let records: Vec<FileRecord> = match &*self.state.borrow() {
            GalleryState::Loaded(entries) => entries.iter().map(|e| e.record.clone()).collect(),
            _ => return 0,
        };

        let mut probes = JoinSet::new();
        for record in records {
            let backend = Arc::clone(&self.backend);
            probes.spawn(async move {
                let ok = backend.probe_preview(&record.file_url).await.is_ok();
                (record.id, ok)
            });
        }

        let mut hidden = 0;
        while let Some(joined) = probes.join_next().await {
            if let Ok((id, false)) = joined {
                if self.hide_preview_from(generation, &id) {
                    hidden += 1;
                }
            }
        }
        hidden
    }

    /// Subscribe to `hub`, run the initial load, and reload on every
    /// notification. Reloads are not serialized against each other.
    pub fn spawn_sync(self: &Arc<Self>, hub: &RefreshHub) -> GallerySync {
        let mut subscription = hub.subscribe();
        self.attached.store(true, Ordering::SeqCst);

        let view = Arc::clone(self);
        let listener = tokio::spawn(async move {
            spawn_load(&view);
            while subscription.recv().await.is_some() {
                debug!("Refresh notification received");
                spawn_load(&view);
            }
        });

        GallerySync {
            view: Arc::clone(self),
            listener,
        }
    }
}

fn hide_in(state: &mut GalleryState, id: &FileId) -> bool {
    match state {
        GalleryState::Loaded(entries) => {
            match entries.iter_mut().find(|e| &e.record.id == id && !e.preview_hidden) {
                Some(entry) => {
                    entry.preview_hidden = true;
                    true
                }
                None => false,
            }
        }
        _ => false,
    }
}

/// Run [`GalleryView::reload`] in the background.
pub fn spawn_load(view: &Arc<GalleryView>) -> JoinHandle<LoadOutcome> {
    let view = Arc::clone(view);
    tokio::spawn(async move { view.reload().await })
}

/// Keeps a gallery subscribed. Dropping it unsubscribes and detaches the
/// view; requests already in flight finish but their results are ignored.
pub struct GallerySync {
    view: Arc<GalleryView>,
    listener: JoinHandle<()>,
}

impl GallerySync {
    pub fn view(&self) -> &Arc<GalleryView> {
        &self.view
    }

    pub fn teardown(self) {}
}

impl Drop for GallerySync {
    fn drop(&mut self) {
        self.listener.abort();
        self.view.attached.store(false, Ordering::SeqCst);
    }
}

/// Text for one gallery state, shared by the TUI and `lightbox ls`.
pub fn render_lines(state: &GalleryState) -> Vec<String> {
    match state {
        GalleryState::Loading => vec!["Your Images".to_string(), LOADING_MESSAGE.to_string()],
        GalleryState::LoadError(message) => vec!["Your Images".to_string(), message.clone()],
        GalleryState::Loaded(entries) if entries.is_empty() => vec![
            "Your Images (0)".to_string(),
            EMPTY_MESSAGE.to_string(),
            EMPTY_HINT.to_string(),
        ],
        GalleryState::Loaded(entries) => {
            let mut lines = vec![format!("Your Images ({})", entries.len())];
            for entry in entries {
                let record = &entry.record;
                lines.push(String::new());
                lines.push(record.original_filename.clone());
                if !entry.preview_hidden {
                    lines.push(format!("  Preview: {}", record.file_url));
                }
                lines.push(format!("  Size: {}", format_file_size(record.file_size)));
                lines.push(format!("  Uploaded: {}", format_timestamp(&record.uploaded_at)));
                lines.push(format!("  View Full Size: {}", record.file_url));
            }
            lines
        }
    }
}
