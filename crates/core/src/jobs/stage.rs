//! Job-reported sub-progress ("stage") files.
//!
//! A running job may write a short, `:`-separated progress string to
//! `_stage` in its workspace. The engine never writes the file; it only reads
//! it on demand when rendering status.

use std::path::Path;

use tokio::io::AsyncReadExt;

/// File name of the stage file inside a workspace.
pub const STAGE_FILE_NAME: &str = "_stage";

/// Maximum number of bytes read from a stage file.
const MAX_STAGE_BYTES: u64 = 4096;

/// Number of trailing `:`-separated fields kept in a summary.
const STAGE_FIELDS_KEPT: usize = 3;

/// Maximum length of a rendered stage summary, in characters.
const MAX_SUMMARY_CHARS: usize = 96;

/// Separator shown between stage fields.
const FIELD_SEPARATOR: &str = " &compfn; ";

/// Read the raw stage text of the workspace at `workdir`.
///
/// Returns `None` when the file is absent, unreadable or blank.
pub async fn read_stage(workdir: &Path) -> Option<String> {
    let file = tokio::fs::File::open(workdir.join(STAGE_FILE_NAME)).await.ok()?;
    let mut buf = Vec::new();
    file.take(MAX_STAGE_BYTES).read_to_end(&mut buf).await.ok()?;
    let text = String::from_utf8_lossy(&buf).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Condense raw stage text for display.
///
/// Keeps the last three `:`-separated fields (prefixed with `...` when any
/// were dropped), renders separators as ` &compfn; ` and caps the length.
pub fn summarize_stage(raw: &str) -> String {
    let raw = raw.trim();
    let fields: Vec<&str> = raw.split(':').collect();
    let kept = if fields.len() > STAGE_FIELDS_KEPT {
        let mut tail = vec!["..."];
        tail.extend_from_slice(&fields[fields.len() - STAGE_FIELDS_KEPT..]);
        tail
    } else {
        fields
    };
    let joined = kept
        .iter()
        .map(|f| f.trim())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR);
    truncate_chars(&joined, MAX_SUMMARY_CHARS)
}

/// Read and summarise the stage of the workspace at `workdir`.
pub async fn stage_summary(workdir: &Path) -> Option<String> {
    read_stage(workdir).await.map(|raw| summarize_stage(&raw))
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
