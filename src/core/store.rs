// src/core/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::models::{StageResult, TargetId, TargetStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result store I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("result store lock poisoned")]
    Poisoned,
}

/// Where the engine writes stage outcomes and target status.
///
/// Writes are fire-and-forget from the engine's point of view: a failed
/// write is logged and the pipeline carries on.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Appends one immutable stage record.
    async fn append_result(&self, result: StageResult) -> Result<(), StoreError>;

    /// Records a target's scan status and the time it was set.
    async fn set_target_status(&self, target_id: TargetId, status: TargetStatus) -> Result<(), StoreError>;

    /// All records for a target, in write order.
    async fn results_for(&self, target_id: TargetId) -> Vec<StageResult>;

    /// Last status written for a target.
    async fn target_status(&self, target_id: TargetId) -> Option<(TargetStatus, DateTime<Utc>)>;
}

/// Keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    results: RwLock<Vec<StageResult>>,
    statuses: RwLock<HashMap<TargetId, (TargetStatus, DateTime<Utc>)>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn all_results(&self) -> Vec<StageResult> {
        self.results.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append_result(&self, result: StageResult) -> Result<(), StoreError> {
        self.results.write().map_err(|_| StoreError::Poisoned)?.push(result);
        Ok(())
    }

    async fn set_target_status(&self, target_id: TargetId, status: TargetStatus) -> Result<(), StoreError> {
        self.statuses
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert(target_id, (status, Utc::now()));
        Ok(())
    }

    async fn results_for(&self, target_id: TargetId) -> Vec<StageResult> {
        self.results
            .read()
            .map(|all| all.iter().filter(|r| r.target_id == target_id).cloned().collect())
            .unwrap_or_default()
    }

    async fn target_status(&self, target_id: TargetId) -> Option<(TargetStatus, DateTime<Utc>)> {
        self.statuses.read().ok()?.get(&target_id).copied()
    }
}

/// Append-only JSON Lines file, with an in-memory index for queries.
///
/// Each line is either `{"type":"stage_result",...}` or
/// `{"type":"target_status",...}`.
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
    index: MemoryResultStore,
}

#[derive(serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JournalLine<'a> {
    StageResult(&'a StageResult),
    TargetStatus {
        target_id: TargetId,
        status: TargetStatus,
        at: DateTime<Utc>,
    },
}

impl JsonlResultStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        debug!(path = %path.display(), "Opened result journal.");
        Ok(Self {
            path,
            file: Mutex::new(file),
            index: MemoryResultStore::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_line(&self, line: &JournalLine<'_>) -> Result<(), StoreError> {
        let mut encoded = serde_json::to_vec(line)?;
        encoded.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&encoded).await.map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        file.flush().await.map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn append_result(&self, result: StageResult) -> Result<(), StoreError> {
        self.write_line(&JournalLine::StageResult(&result)).await?;
        self.index.append_result(result).await
    }

    async fn set_target_status(&self, target_id: TargetId, status: TargetStatus) -> Result<(), StoreError> {
        self.write_line(&JournalLine::TargetStatus {
            target_id,
            status,
            at: Utc::now(),
        })
        .await?;
        self.index.set_target_status(target_id, status).await
    }

    async fn results_for(&self, target_id: TargetId) -> Vec<StageResult> {
        self.index.results_for(target_id).await
    }

    async fn target_status(&self, target_id: TargetId) -> Option<(TargetStatus, DateTime<Utc>)> {
        self.index.target_status(target_id).await
    }
}
