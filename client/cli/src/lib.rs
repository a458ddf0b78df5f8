//! Lightbox: upload images to the backend and keep a gallery of them in sync.
//!
//! The [`upload::UploadWidget`] and [`gallery::GalleryView`] never talk to each
//! other directly. A successful upload publishes on a shared
//! [`events::RefreshHub`] and every subscribed gallery reloads.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod gallery;
pub mod tui;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, Backend, FileId, FileRecord, UploadReceipt};
pub use auth::{CredentialProvider, StaticToken, StoredToken};
pub use error::ClientError;
pub use events::{Refresh, RefreshHub, RefreshSubscription};
pub use gallery::{GalleryState, GallerySync, GalleryView, LoadOrdering, LoadOutcome};
pub use upload::{UploadCandidate, UploadState, UploadWidget};
