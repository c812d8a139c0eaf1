use crate::alerts::dispatch::DeliveryResult;
use crate::alerts::types::AlertType;
use crate::detection::ConfidenceBreakdown;
use crate::error::PersistenceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub type AlertId = Uuid;

/// Persisted description of one sent alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub alert_id: AlertId,
    pub alert_type: AlertType,
    pub camera_id: String,
    pub is_test: bool,
    pub created_at: DateTime<Utc>,
    pub confidence: ConfidenceBreakdown,
    pub delivery: Option<DeliveryResult>,
}

/// Persistence collaborator. Both calls are best-effort from the
/// coordinator's point of view.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create_alert_record(
        &self,
        alert_type: AlertType,
        camera_id: &str,
        confidence: &ConfidenceBreakdown,
        is_test: bool,
    ) -> Result<AlertId, PersistenceError>;

    async fn update_alert_record(
        &self,
        alert_id: AlertId,
        delivery: &DeliveryResult,
    ) -> Result<(), PersistenceError>;
}

/// Records kept by [`MemoryAlertStore`] before the oldest are evicted
pub const MEMORY_STORE_CAPACITY: usize = 1000;

/// Keeps the most recent records in memory; the default when no alert log
/// is configured. Updating an evicted record reports `NotFound`.
#[derive(Debug)]
pub struct MemoryAlertStore {
    records: Mutex<VecDeque<AlertRecord>>,
    capacity: usize,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::with_capacity(MEMORY_STORE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "memory store capacity must be positive");
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(MEMORY_STORE_CAPACITY))),
            capacity,
        }
    }

    /// Retained records, oldest first
    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn create_alert_record(
        &self,
        alert_type: AlertType,
        camera_id: &str,
        confidence: &ConfidenceBreakdown,
        is_test: bool,
    ) -> Result<AlertId, PersistenceError> {
        let record = AlertRecord {
            alert_id: Uuid::new_v4(),
            alert_type,
            camera_id: camera_id.to_string(),
            is_test,
            created_at: Utc::now(),
            confidence: *confidence,
            delivery: None,
        };
        let alert_id = record.alert_id;

        let mut records = self.records.lock();
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        Ok(alert_id)
    }

    async fn update_alert_record(
        &self,
        alert_id: AlertId,
        delivery: &DeliveryResult,
    ) -> Result<(), PersistenceError> {
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|record| record.alert_id == alert_id)
            .ok_or_else(|| PersistenceError::NotFound {
                alert_id: alert_id.to_string(),
            })?;
        record.delivery = Some(delivery.clone());
        Ok(())
    }
}

/// One line of the alert log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertLogLine {
    Created(AlertRecord),
    Delivered {
        alert_id: AlertId,
        at: DateTime<Utc>,
        delivery: DeliveryResult,
    },
}

/// Append-only JSON-lines alert log
pub struct JsonLinesAlertStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonLinesAlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &AlertLogLine) -> Result<(), PersistenceError> {
        let mut json = serde_json::to_string(line).map_err(|e| PersistenceError::WriteFailed {
            details: format!("Failed to serialize alert log line: {}", e),
        })?;
        json.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    PersistenceError::WriteFailed {
                        details: format!("Failed to create alert log directory: {}", e),
                    }
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                details: format!("Failed to open alert log {}: {}", self.path.display(), e),
            })?;

        file.write_all(json.as_bytes())
            .await
            .map_err(|e| PersistenceError::WriteFailed {
                details: format!("Failed to append to alert log: {}", e),
            })?;
        file.flush().await.map_err(|e| PersistenceError::WriteFailed {
            details: format!("Failed to flush alert log: {}", e),
        })?;

        debug!("Appended alert log line to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl AlertStore for JsonLinesAlertStore {
    async fn create_alert_record(
        &self,
        alert_type: AlertType,
        camera_id: &str,
        confidence: &ConfidenceBreakdown,
        is_test: bool,
    ) -> Result<AlertId, PersistenceError> {
        let record = AlertRecord {
            alert_id: Uuid::new_v4(),
            alert_type,
            camera_id: camera_id.to_string(),
            is_test,
            created_at: Utc::now(),
            confidence: *confidence,
            delivery: None,
        };
        let alert_id = record.alert_id;
        self.append(&AlertLogLine::Created(record)).await?;
        Ok(alert_id)
    }

    async fn update_alert_record(
        &self,
        alert_id: AlertId,
        delivery: &DeliveryResult,
    ) -> Result<(), PersistenceError> {
        self.append(&AlertLogLine::Delivered {
            alert_id,
            at: Utc::now(),
            delivery: delivery.clone(),
        })
        .await
    }
}
