//! Filesystem artifact storage: uploaded decks in, notes documents out.
//!
//! Two directories, two naming rules:
//!
//! * uploads — `"{timestamp}_{job_id}_{sanitized_source_name}"`, so a
//!   directory listing alone identifies which job a file belongs to;
//! * outputs — `"{job_id}.json"`, so completion is observable (and the
//!   document addressable) from the id alone, even if in-memory job state
//!   was lost.
//!
//! The notes document is published atomically: written to a `.tmp` sibling
//! and renamed into place, so a polling reader can never observe a
//! half-written file under the final name.

use crate::error::ExplainError;
use crate::job::JobId;
use crate::output::DeckNotes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upload and output directories for one pipeline instance.
#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl Storage {
    pub fn new(upload_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Create both directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> Result<(), ExplainError> {
        for dir in [&self.upload_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ExplainError::Storage {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persist an uploaded deck; returns the stored file name.
    pub async fn store_upload(
        &self,
        bytes: &[u8],
        id: &JobId,
        source_name: &str,
    ) -> Result<String, ExplainError> {
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let stored_name = format!("{stamp}_{id}_{}", sanitize_name(source_name));
        let path = self.upload_dir.join(&stored_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ExplainError::Storage { path, source: e })?;
        debug!(%id, stored_name, "stored upload");
        Ok(stored_name)
    }

    /// Locate the uploaded artifact for a job.
    ///
    /// The stored name from the job record is checked first; if the record
    /// was rebuilt (or the name is stale) the upload directory is scanned
    /// for any file whose name embeds the id.
    pub async fn find_upload(
        &self,
        id: &JobId,
        stored_name: Option<&str>,
    ) -> Result<Option<PathBuf>, ExplainError> {
        if let Some(name) = stored_name {
            let path = self.upload_dir.join(name);
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(Some(path));
            }
        }

        let mut entries =
            tokio::fs::read_dir(&self.upload_dir)
                .await
                .map_err(|e| ExplainError::Storage {
                    path: self.upload_dir.clone(),
                    source: e,
                })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExplainError::Storage {
                path: self.upload_dir.clone(),
                source: e,
            })?
        {
            if entry.file_name().to_string_lossy().contains(id.as_str()) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Read an uploaded artifact.
    pub async fn read_upload(&self, path: &Path) -> Result<Vec<u8>, ExplainError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ExplainError::Storage {
                path: path.to_path_buf(),
                source: e,
            })
    }

    /// Canonical path of the notes document for a job.
    pub fn notes_path(&self, id: &JobId) -> PathBuf {
        self.output_dir.join(format!("{id}.json"))
    }

    /// Whether the notes document for a job has been published.
    pub async fn notes_exist(&self, id: &JobId) -> bool {
        tokio::fs::try_exists(self.notes_path(id))
            .await
            .unwrap_or(false)
    }

    /// Read a published notes document back.
    pub async fn read_notes(&self, id: &JobId) -> Result<DeckNotes, ExplainError> {
        let path = self.notes_path(id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| ExplainError::Storage {
                path: path.clone(),
                source: e,
            })?;
        DeckNotes::from_json(&bytes)
            .map_err(|e| ExplainError::Internal(format!("corrupt notes document {path:?}: {e}")))
    }

    /// Publish a notes document atomically (write to `.tmp`, then rename).
    pub async fn write_notes(
        &self,
        id: &JobId,
        notes: &DeckNotes,
    ) -> Result<PathBuf, ExplainError> {
        let path = self.notes_path(id);
        let bytes = notes
            .to_json()
            .map_err(|e| ExplainError::Internal(format!("serialise notes: {e}")))?;

        let tmp_path = self.output_dir.join(format!("{id}.json.tmp"));
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| ExplainError::Storage {
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| ExplainError::Storage {
                path: path.clone(),
                source: e,
            })?;

        debug!(%id, path = %path.display(), "published notes document");
        Ok(path)
    }
}

/// Strip path components and replace awkward characters so the source name
/// can be embedded in a file name on any platform.
fn sanitize_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "deck.pptx".to_string()
    } else {
        cleaned
    }
}
