//! Per-instance console artifacts.
//!
//! A console artifact starts with a fixed three-line preamble:
//!
//! ```text
//! [r 255]                                          <- status header
//! /workdir/fullconsole/bacillus__build_42/console.out  <- link to the raw artifact
//! build                                            <- job tag
//! ```
//!
//! followed by the job's interleaved stdout/stderr. The status header is the
//! only part of the file ever rewritten: it is overwritten in place at offset
//! zero when the job finishes, and its encoding is fixed-width so the
//! overwrite can never shift the bytes that follow it.

use std::fmt;
use std::io::SeekFrom;
use std::path::Path;

use serde::Serialize;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// File name of the console artifact inside a workspace.
pub const CONSOLE_FILE_NAME: &str = "console.out";

/// Encoded length of a [`ConsoleHeader`], in bytes.
pub const HEADER_LEN: usize = 7;

/// Status recorded in the header while the job is still running.
pub const RUNNING_STATUS: u8 = 255;

/// Status recorded for a process that was killed rather than exiting.
pub const KILLED_STATUS: u8 = 255;

/// Number of body lines shown by [`ConsoleSummary`] before truncating.
pub const CONSOLE_TAIL_LINES: usize = 34;

/// Lifecycle state encoded in the status header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Finished,
}

impl JobState {
    fn code(self) -> u8 {
        match self {
            Self::Running => b'r',
            Self::Finished => b'f',
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            b'r' => Some(Self::Running),
            b'f' => Some(Self::Finished),
            _ => None,
        }
    }
}

/// The fixed-width first line of a console artifact: `[<state> <status>]`,
/// with the status as three decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsoleHeader {
    pub state: JobState,
    pub status: u8,
}

impl ConsoleHeader {
    pub const fn running() -> Self {
        Self {
            state: JobState::Running,
            status: RUNNING_STATUS,
        }
    }

    pub const fn finished(status: u8) -> Self {
        Self {
            state: JobState::Finished,
            status,
        }
    }

    /// Encode to exactly [`HEADER_LEN`] bytes.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let s = self.status;
        [
            b'[',
            self.state.code(),
            b' ',
            b'0' + s / 100,
            b'0' + (s / 10) % 10,
            b'0' + s % 10,
            b']',
        ]
    }

    /// Decode the header from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let h = bytes.get(..HEADER_LEN)?;
        if h[0] != b'[' || h[2] != b' ' || h[6] != b']' {
            return None;
        }
        let state = JobState::from_code(h[1])?;
        let mut status: u16 = 0;
        for &digit in &h[3..6] {
            if !digit.is_ascii_digit() {
                return None;
            }
            status = status * 10 + u16::from(digit - b'0');
        }
        Some(Self {
            state,
            status: u8::try_from(status).ok()?,
        })
    }
}

impl fmt::Display for ConsoleHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.encode()))
    }
}

/// Create the console artifact at `path` and write the running preamble.
///
/// Returns the open file positioned just after the preamble so it can be
/// handed to the child process as stdout/stderr.
pub async fn create_console(path: &Path, link: &str, tag: &str) -> std::io::Result<std::fs::File> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut preamble = Vec::with_capacity(HEADER_LEN + link.len() + tag.len() + 3);
    preamble.extend_from_slice(&ConsoleHeader::running().encode());
    preamble.push(b'\n');
    preamble.extend_from_slice(link.as_bytes());
    preamble.push(b'\n');
    preamble.extend_from_slice(tag.as_bytes());
    preamble.push(b'\n');
    file.write_all(&preamble).await?;
    file.flush().await?;
    Ok(file.into_std().await)
}

/// Overwrite the status header of the console artifact at `path` in place.
pub async fn mark_finished(path: &Path, status: u8) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(&ConsoleHeader::finished(status).encode()).await?;
    file.flush().await
}

/// Decoded view of a console artifact for status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsoleSummary {
    /// `None` if the first line is not a valid status header.
    pub header: Option<ConsoleHeader>,
    pub link: String,
    pub tag: String,
    /// The last body lines of the artifact.
    pub tail: Vec<String>,
    /// Whether earlier body lines were omitted from `tail`.
    pub truncated: bool,
}

impl ConsoleSummary {
    /// Parse artifact text, keeping at most `tail_lines` body lines.
    pub fn parse(text: &str, tail_lines: usize) -> Self {
        let mut lines = text.lines();
        let header = lines.next().and_then(|l| ConsoleHeader::decode(l.as_bytes()));
        let link = lines.next().unwrap_or_default().to_string();
        let tag = lines.next().unwrap_or_default().to_string();
        let body: Vec<&str> = lines.collect();
        let skip = body.len().saturating_sub(tail_lines);
        Self {
            header,
            link,
            tag,
            tail: body[skip..].iter().map(|l| l.to_string()).collect(),
            truncated: skip > 0,
        }
    }

    pub async fn read(path: &Path, tail_lines: usize) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::parse(&String::from_utf8_lossy(&bytes), tail_lines))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn header_encoding_is_fixed_width() {
        for status in [0u8, 3, 42, 100, 255] {
            for header in [ConsoleHeader::running(), ConsoleHeader::finished(status)] {
                let bytes = header.encode();
                assert_eq!(bytes.len(), HEADER_LEN);
                assert_eq!(ConsoleHeader::decode(&bytes), Some(header));
            }
        }
        assert_eq!(ConsoleHeader::running().to_string(), "[r 255]");
        assert_eq!(ConsoleHeader::finished(3).to_string(), "[f 003]");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(ConsoleHeader::decode(b"[x 001]"), None);
        assert_eq!(ConsoleHeader::decode(b"[f 2a1]"), None);
        assert_eq!(ConsoleHeader::decode(b"[f 300]"), None);
        assert_eq!(ConsoleHeader::decode(b"[f 01"), None);
    }

    #[tokio::test]
    async fn finishing_rewrites_header_without_touching_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONSOLE_FILE_NAME);

        let mut file = create_console(&path, "/workdir/fullconsole/x/console.out", "build")
            .await
            .unwrap();
        writeln!(file, "compiling...").unwrap();
        writeln!(file, "done").unwrap();
        drop(file);

        let before = tokio::fs::read(&path).await.unwrap();
        mark_finished(&path, 3).await.unwrap();
        let after = tokio::fs::read(&path).await.unwrap();

        assert_eq!(before.len(), after.len());
        assert_eq!(&before[HEADER_LEN..], &after[HEADER_LEN..]);

        let summary = ConsoleSummary::read(&path, CONSOLE_TAIL_LINES).await.unwrap();
        assert_eq!(summary.header, Some(ConsoleHeader::finished(3)));
        assert_eq!(summary.link, "/workdir/fullconsole/x/console.out");
        assert_eq!(summary.tag, "build");
        assert_eq!(summary.tail, ["compiling...", "done"]);
        assert!(!summary.truncated);
    }

    #[test]
    fn summary_keeps_only_the_tail() {
        let mut text = String::from("[r 255]\n/link\ntag\n");
        for i in 0..50 {
            text.push_str(&format!("line {i}\n"));
        }
        let summary = ConsoleSummary::parse(&text, 10);
        assert_eq!(summary.header, Some(ConsoleHeader::running()));
        assert_eq!(summary.tail.len(), 10);
        assert_eq!(summary.tail[0], "line 40");
        assert!(summary.truncated);
    }
}
