//! The append-only run log file.
//!
//! One logical stream shared by every executor. Appends are serialised by an
//! async mutex around the file handle, and each append is a single write of a
//! complete line, so lines from concurrent jobs never interleave. The file is
//! opened in append mode and is never truncated after startup.

use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::line::READY_MARKER;

/// Timestamp prefix layout of every run log line.
const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Handle to the run log file.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl RunLog {
    /// Open the run log at `path`, creating it if needed.
    ///
    /// With `fresh` set the existing content is discarded first; otherwise
    /// new lines are appended after it.
    pub async fn open(path: impl Into<PathBuf>, fresh: bool) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        if fresh {
            tokio::fs::File::create(&path).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line. Embedded newlines are flattened so the
    /// record always occupies exactly one line.
    pub async fn append(&self, body: &str) -> io::Result<()> {
        let stamp = chrono::Utc::now().format(TIMESTAMP_FORMAT);
        let line = format!("{stamp} {}\n", body.replace(['\r', '\n'], " "));
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Write the startup banner followed by the ready marker.
    pub async fn write_banner(&self, version: &str, listen_addr: &str) -> io::Result<()> {
        self.append(&format!("[bacillus {version} startup]")).await?;
        self.append(&format!("[listening on {listen_addr}]")).await?;
        self.append(READY_MARKER).await
    }

    /// The whole log as text.
    pub async fn read_all(&self) -> io::Result<String> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Current size of the log file in bytes.
    pub async fn byte_len(&self) -> io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// The event lines recorded after the first ready marker (or all lines
    /// when no marker has been written yet).
    pub async fn event_lines(&self) -> io::Result<Vec<String>> {
        Ok(event_lines(&self.read_all().await?))
    }
}

/// Split raw log text into event lines, skipping the startup header.
pub fn event_lines(text: &str) -> Vec<String> {
    let events = match text.find(READY_MARKER) {
        Some(pos) => {
            let rest = &text[pos + READY_MARKER.len()..];
            rest.split_once('\n').map_or("", |(_, after)| after)
        }
        None => text,
    };
    events
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
