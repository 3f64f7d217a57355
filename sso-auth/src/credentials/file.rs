//! JSON file credentials store.
//!
//! Layout:
//!
//! ```json
//! { "credentials": { "app.example.io": { "token": "..." } } }
//! ```
//!
//! Top-level keys other than `credentials` are preserved on rewrite.

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Storage, StoredCredential};
use crate::error::{credential_error, CredentialErrorKind, Error};
use crate::oauth::token::Token;

#[derive(Default, Serialize, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: BTreeMap<String, CredentialEntry>,
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize, Deserialize)]
struct CredentialEntry {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Stores tokens in a JSON file, readable only by the owner on Unix.
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<CredentialsFile, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(CredentialsFile::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                credential_error(
                    CredentialErrorKind::InvalidFormat,
                    &format!("{}: {}", self.path.display(), e),
                )
            }),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(CredentialsFile::default()),
            Err(e) => Err(credential_error(
                CredentialErrorKind::Read,
                &format!("{}: {}", self.path.display(), e),
            )),
        }
    }

    async fn save(&self, file: &CredentialsFile) -> Result<(), Error> {
        let write_error =
            |e: std::io::Error| credential_error(CredentialErrorKind::Write, &format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let contents = serde_json::to_string_pretty(file).map_err(|e| {
            credential_error(CredentialErrorKind::InvalidFormat, &e.to_string())
        })?;

        let tmp_path = self.path.with_extension("tmp");
        // A leftover temp file would keep its old permissions, so always create afresh.
        match tokio::fs::remove_file(&tmp_path).await {
            Err(e) if e.kind() != IoErrorKind::NotFound => return Err(write_error(e)),
            _ => {}
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut tmp = options.open(&tmp_path).await.map_err(write_error)?;
        tmp.write_all(contents.as_bytes()).await.map_err(write_error)?;
        tmp.sync_all().await.map_err(write_error)?;
        drop(tmp);

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(write_error)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn store(&self, service_key: &str, token: &Token) -> Result<(), Error> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;

        file.credentials.insert(
            service_key.to_string(),
            CredentialEntry {
                token: token.access_token.expose_secret().clone(),
                expires_at: token.expires_at,
            },
        );

        self.save(&file).await?;
        debug!("Stored credentials for {} in {}", service_key, self.path.display());
        Ok(())
    }

    async fn get(&self, service_key: &str) -> Result<Option<StoredCredential>, Error> {
        let file = self.load().await?;
        Ok(file
            .credentials
            .get(service_key)
            .map(|entry| StoredCredential {
                token: SecretString::from(entry.token.clone()),
                expires_at: entry.expires_at,
            }))
    }

    async fn delete(&self, service_key: &str) -> Result<bool, Error> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;

        if file.credentials.remove(service_key).is_none() {
            return Ok(false);
        }

        self.save(&file).await?;
        debug!("Removed credentials for {} from {}", service_key, self.path.display());
        Ok(true)
    }
}
