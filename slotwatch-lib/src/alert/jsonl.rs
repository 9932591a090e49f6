use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::history::{AlertRecord, AlertStore, BatchError, HistoryQuery};
use crate::error::{Result, SlotwatchError};

/// Append-only JSON lines file, one [`AlertRecord`] per line.
///
/// Ids continue from the largest id found in the file when it is reopened.
/// Lines that fail to parse are skipped with a warning.
#[derive(Debug)]
pub struct JsonlAlertStore {
    path: PathBuf,
    // serialises appends and guards the id counter
    next_id: Mutex<u64>,
}

impl JsonlAlertStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        repair_tail(&path).await?;
        let existing = read_records(&path).await?;
        let next_id = existing
            .iter()
            .map(|r| r.id)
            .max()
            .unwrap_or(0)
            .saturating_add(1);
        debug!(path = %path.display(), records = existing.len(), "Opened alert history file");
        Ok(Self { path, next_id: Mutex::new(next_id) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_lines(&self, buf: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                SlotwatchError::Store(format!(
                    "Unable to open alert history [{}]: {e}",
                    self.path.display()
                ))
            })?;
        let start = file.metadata().await?.len();

        let written = async {
            file.write_all(buf).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // drop whatever part of the buffer made it to disk
            if let Err(trunc) = file.set_len(start).await {
                warn!(
                    path = %self.path.display(),
                    error = %trunc,
                    "Unable to roll back partial alert history write"
                );
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl AlertStore for JsonlAlertStore {
    async fn append(&self, mut record: AlertRecord) -> Result<AlertRecord> {
        let mut next_id = self.next_id.lock().await;
        record.id = *next_id;
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.write_lines(&line).await?;
        *next_id = next_id.saturating_add(1);
        Ok(record)
    }

    /// Writes the whole batch with a single append; either every record
    /// lands or none is counted.
    async fn append_batch(
        &self,
        records: Vec<AlertRecord>,
    ) -> std::result::Result<usize, BatchError> {
        let total = records.len();
        if total == 0 {
            return Ok(0);
        }

        let mut next_id = self.next_id.lock().await;
        let mut id = *next_id;
        let mut buf = Vec::new();
        for mut record in records {
            record.id = id;
            id = id.saturating_add(1);
            if let Err(e) = serde_json::to_writer(&mut buf, &record) {
                return Err(BatchError { failed: total, total, reason: e.to_string() });
            }
            buf.push(b'\n');
        }

        match self.write_lines(&buf).await {
            Ok(()) => {
                *next_id = id;
                Ok(total)
            }
            Err(e) => Err(BatchError { failed: total, total, reason: e.to_string() }),
        }
    }

    async fn fetch(&self, query: &HistoryQuery) -> Result<Vec<AlertRecord>> {
        let records = read_records(&self.path).await?;
        Ok(query.select(records))
    }
}

/// Cut an unterminated last line left by an interrupted write, so the next
/// append starts on a fresh line.
async fn repair_tail(path: &Path) -> Result<()> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(SlotwatchError::Store(format!(
                "Unable to read alert history [{}]: {e}",
                path.display()
            )))
        }
    };
    if bytes.last().is_none_or(|b| *b == b'\n') {
        return Ok(());
    }

    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "Truncating unterminated alert history line"
    );

    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    Ok(())
}

async fn read_records(path: &Path) -> Result<Vec<AlertRecord>> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(SlotwatchError::Store(format!(
                "Unable to read alert history [{}]: {e}",
                path.display()
            )))
        }
    };

    let mut records = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AlertRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = lineno + 1,
                error = %e,
                "Skipping malformed alert history line"
            ),
        }
    }
    Ok(records)
}
