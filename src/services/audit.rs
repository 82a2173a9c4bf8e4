use crate::error::{AppError, AppResult};
use crate::models::{RoomEvent, RoomId};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: i64,
    pub event_type: String, // "room_created", "bet_placed", "room_settled", etc.
    pub room_id: RoomId,
    pub details: serde_json::Value,
}

/// Append-only JSON-lines record of every room transition
pub struct AuditTrailService {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailService {
    /// Create a new audit trail service
    pub fn new(log_directory: &Path) -> AppResult<Self> {
        std::fs::create_dir_all(log_directory)
            .map_err(|e| AppError::Message(format!("Failed to create log directory: {}", e)))?;

        // One file per day
        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Message(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Log an audit entry
    pub async fn log(&self, entry: AuditLogEntry) -> AppResult<()> {
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .map_err(|e| AppError::Message(format!("Failed to write audit log: {}", e)))?;

        file.flush()
            .map_err(|e| AppError::Message(format!("Failed to flush audit log: {}", e)))?;

        Ok(())
    }

    /// Log one room transition
    pub async fn log_room_event(&self, event: &RoomEvent) -> AppResult<()> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().timestamp(),
            event_type: event.as_str().to_string(),
            room_id: event.room_id(),
            details: serde_json::to_value(event)?,
        };

        self.log(entry).await
    }

    /// Drain bus events into the log until the bus closes
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<RoomEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.log_room_event(&event).await {
                        warn!("Failed to audit {} for room {}: {}", event.as_str(), event.room_id(), e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Audit trail lagged, {} room events were not recorded", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
