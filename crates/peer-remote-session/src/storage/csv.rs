//! CSV export of interaction logs.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

use super::InteractionLogEntry;

/// Header row of every export.
pub const CSV_HEADER: &str = "timestamp,type,details";

/// Export error.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Cannot create export directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Quote a field, doubling embedded quotes.
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quote only when the field would otherwise break the row.
fn escaped(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        quoted(field)
    } else {
        field.to_string()
    }
}

/// Render a complete CSV document.
#[must_use]
pub fn render(entries: &[InteractionLogEntry]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + entries.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&entry.timestamp_text());
        out.push(',');
        out.push_str(&escaped(&entry.kind));
        out.push(',');
        out.push_str(&quoted(&entry.details));
        out.push('\n');
    }
    out
}

/// Keep file names portable whatever the device is called.
fn file_stem(device_name: &str) -> String {
    let stem: String = device_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if stem.is_empty() { "Device".to_string() } else { stem }
}

/// Writes interaction logs into a directory, one fresh file per export.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
    device_name: String,
}

impl CsvExporter {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, device_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            device_name: device_name.into(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<Device>_Interactions_<epochSeconds>.csv`, with a counter suffix on collision.
    fn candidate(&self, epoch: u64, attempt: u32) -> PathBuf {
        let stem = file_stem(&self.device_name);
        let name = if attempt == 0 {
            format!("{stem}_Interactions_{epoch}.csv")
        } else {
            format!("{stem}_Interactions_{epoch}_{attempt}.csv")
        };
        self.dir.join(name)
    }

    /// Write `entries` to a new file.
    ///
    /// Returns `None` without touching the filesystem when there is nothing
    /// to export. A failed write removes the partial file.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the file cannot
    /// be written.
    pub async fn export(
        &self,
        entries: &[InteractionLogEntry],
    ) -> Result<Option<PathBuf>, ExportError> {
        if entries.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ExportError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let document = render(entries);
        let epoch = now();
        let mut attempt = 0;
        let (path, mut file) = loop {
            let path = self.candidate(epoch, attempt);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(ExportError::Write { path, source }),
            }
        };

        let written = async {
            file.write_all(document.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(source) = written {
            drop(file);
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), "Failed to remove partial export: {e}");
            }
            return Err(ExportError::Write { path, source });
        }

        tracing::info!(path = %path.display(), rows = entries.len(), "Exported interaction log");
        Ok(Some(path))
    }
}
