//! JSONL capture logs with rotation
//!
//! Each record is one line of JSON carrying an RFC 3339 timestamp and the
//! flattened [`Transaction`]. A new file is started after
//! `max_records_per_file` records; files from one run share a timestamped
//! prefix and a sequence number.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::Transaction;
use crate::error::{Result, ServoError};

#[derive(Debug, Serialize)]
struct CaptureRecord<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    transaction: &'a Transaction,
}

/// Writes transactions to rotating JSONL files
pub struct CaptureLogger {
    dir: PathBuf,
    prefix: String,
    max_records_per_file: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    files_written: usize,
}

impl CaptureLogger {
    /// Create the log directory if needed; no file is opened until the first
    /// record arrives
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            prefix: format!("capture_{}", Utc::now().format("%Y%m%d_%H%M%S")),
            max_records_per_file: max_records_per_file.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            files_written: 0,
        })
    }

    pub fn log(&mut self, transaction: &Transaction) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = CaptureRecord {
            timestamp: Utc::now(),
            transaction,
        };

        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &record)
                .map_err(|e| ServoError::Capture(format!("Failed to serialize record: {}", e)))?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        self.files_written += 1;
        let path = self
            .dir
            .join(format!("{}_{:04}.jsonl", self.prefix, self.files_written));
        let file = File::create(&path)?;

        if self.files_written == 1 {
            info!("Logging capture to {}", path.display());
        } else {
            debug!("Rotated capture log to {}", path.display());
        }

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// File currently being written, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }
}

impl Drop for CaptureLogger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
