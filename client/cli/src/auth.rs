//! Bearer token acquisition
//!
//! The identity provider that issues tokens is external; the client only asks
//! for "the current token" right before each authorized call and never caches
//! it itself.

use crate::config::Config;
use crate::error::ClientError;
use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain the current bearer token. May fail; callers treat a failure
    /// exactly like a failed request.
    async fn bearer_token(&self) -> Result<String, ClientError>;
}

/// A fixed token, e.g. passed with `--token`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Result<String, ClientError> {
        Ok(self.0.clone())
    }
}

/// Reads the token saved by `lightbox login` on every call, so a `logout`
/// from another terminal takes effect immediately.
pub struct StoredToken {
    path: Option<PathBuf>,
}

impl StoredToken {
    /// Token from the default config file.
    pub fn new() -> Self {
        Self { path: None }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    fn load(&self) -> anyhow::Result<Config> {
        match &self.path {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
    }
}

impl Default for StoredToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for StoredToken {
    async fn bearer_token(&self) -> Result<String, ClientError> {
        let config = self
            .load()
            .map_err(|e| ClientError::Auth(format!("could not read config: {}", e)))?;
        match config.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(ClientError::Auth(
                "Not logged in. Run: lightbox login".to_string(),
            )),
        }
    }
}
