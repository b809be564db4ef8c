//! Connection log.
//!
//! One self-contained JSONL record per terminated connection, appended to a
//! shared log file. The core only ever appends; the management tooling that
//! reads and searches this file never sees a rewrite or truncation.
//!
//! Telemetry is best-effort: a failed append is surfaced on the operational
//! channel and never changes the connection's own classification.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Terminal classification of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Both directions ended via clean end-of-stream.
    Completed,
    /// Backend dial failed, or at least one direction ended with an error.
    Error,
    /// Client address was in the blocklist; no backend dial attempted.
    Blocked,
}

/// One terminated connection, as persisted to the connection log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// UTC time the record was finalized.
    pub timestamp: DateTime<Utc>,
    pub client_ip: String,
    pub client_port: u16,
    pub server_name: String,
    pub server_port: u16,
    pub status: ConnectionStatus,
    /// Accept-to-terminal duration, rounded to two decimals.
    pub duration_seconds: f64,
    /// Bytes read from the client socket.
    pub bytes_sent: u64,
    /// Bytes read from the backend socket.
    pub bytes_received: u64,
}

impl ConnectionRecord {
    /// Finalize a record for a connection that just reached a terminal state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_ip: String,
        client_port: u16,
        server_name: &str,
        server_port: u16,
        status: ConnectionStatus,
        duration: std::time::Duration,
        bytes_sent: u64,
        bytes_received: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            client_ip,
            client_port,
            server_name: server_name.to_string(),
            server_port,
            status,
            duration_seconds: (duration.as_secs_f64() * 100.0).round() / 100.0,
            bytes_sent,
            bytes_received,
        }
    }
}

/// Append-only JSONL connection logger shared by all handlers.
pub struct ConnectionLogger {
    file: Mutex<File>,
}

impl ConnectionLogger {
    /// Open the connection log in append mode, creating it (and its parent
    /// directory) if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open connection log {}", path.display()))?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Append one record as a single newline-terminated line.
    ///
    /// Serialization happens outside the lock; the guarded write covers the
    /// whole line, so concurrent handlers never interleave partial records.
    pub async fn record(&self, record: &ConnectionRecord) {
        let mut line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize connection record");
                return;
            }
        };
        line.push('\n');

        let mut file = self.file.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to append connection record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample_record(status: ConnectionStatus) -> ConnectionRecord {
        ConnectionRecord::new(
            "203.0.113.7".to_string(),
            54321,
            "AuthServer",
            3724,
            status,
            Duration::from_millis(1234),
            100,
            250,
        )
    }

    #[test]
    fn test_record_field_names_and_status_casing() {
        let record = sample_record(ConnectionStatus::Blocked);
        let json = serde_json::to_string(&record).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["client_ip"], "203.0.113.7");
        assert_eq!(value["client_port"], 54321);
        assert_eq!(value["server_name"], "AuthServer");
        assert_eq!(value["server_port"], 3724);
        assert_eq!(value["status"], "blocked");
        assert_eq!(value["bytes_sent"], 100);
        assert_eq!(value["bytes_received"], 250);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_duration_rounds_to_two_decimals() {
        let record = ConnectionRecord::new(
            "10.0.0.1".to_string(),
            1,
            "WorldServer",
            8085,
            ConnectionStatus::Completed,
            Duration::from_micros(1_234_567),
            0,
            0,
        );
        assert_eq!(record.duration_seconds, 1.23);
    }

    #[tokio::test]
    async fn test_records_append_as_parseable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.jsonl");

        let logger = ConnectionLogger::open(&path).await.unwrap();
        logger.record(&sample_record(ConnectionStatus::Completed)).await;
        logger.record(&sample_record(ConnectionStatus::Error)).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<ConnectionRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, ConnectionStatus::Completed);
        assert_eq!(records[1].status, ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_open_appends_to_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connections.jsonl");

        {
            let logger = ConnectionLogger::open(&path).await.unwrap();
            logger.record(&sample_record(ConnectionStatus::Completed)).await;
        }
        {
            let logger = ConnectionLogger::open(&path).await.unwrap();
            logger.record(&sample_record(ConnectionStatus::Blocked)).await;
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
