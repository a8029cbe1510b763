//! Transcript line accounting.
//!
//! The orchestrator never parses transcript records; it only counts lines
//! and slices `[cursor..]` for condensation. Format-aware extraction is the
//! adapters' job.

use anyhow::Result;
use entire_core::EntireError;
use std::path::Path;

/// Number of lines, counting a trailing unterminated line.
pub fn line_count(text: &str) -> usize {
    text.lines().count()
}

/// Lines `[cursor..]`, newline-terminated. An out-of-range cursor yields an
/// empty slice rather than panicking; the cursor invariant is enforced by
/// callers, this stays total.
pub fn slice_from(text: &str, cursor: usize) -> String {
    let mut slice = String::new();
    for line in text.lines().skip(cursor) {
        slice.push_str(line);
        slice.push('\n');
    }
    slice
}

/// Read a transcript file; a missing file is the typed `TranscriptMissing`
/// so hooks can skip quietly.
pub fn read(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(EntireError::TranscriptMissing(path.to_path_buf()).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Separator between concatenated user prompts in `prompt.txt`.
pub const PROMPT_SEPARATOR: &str = "\n\n---\n\n";

/// Concatenate prompts onto an existing accumulation.
pub fn append_prompts(existing: &str, prompts: &[String]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    if !existing.trim().is_empty() {
        parts.push(existing.trim_end_matches('\n'));
    }
    for prompt in prompts {
        if !prompt.trim().is_empty() {
            parts.push(prompt.trim_end_matches('\n'));
        }
    }
    parts.join(PROMPT_SEPARATOR)
}
