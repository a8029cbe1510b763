//! Commit-message trailer parsing and editing.
//!
//! Pure functions over message text. The trailing block is the run of
//! non-blank lines after the last blank line; a message with no blank line
//! has no trailer block. Keys are case-sensitive, one `Key: value` pair per
//! line.

use entire_core::CheckpointId;
use entire_core::trailer::{RESERVED_TRAILERS, TRAILER_CHECKPOINT};
use std::collections::BTreeMap;

fn is_trailer_line(line: &str) -> bool {
    let Some((key, _)) = line.split_once(": ") else {
        return false;
    };
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

/// Index of the first line of the trailing block, if any.
fn trailer_block_start(lines: &[&str]) -> Option<usize> {
    let end = lines.iter().rposition(|l| !l.trim().is_empty())? + 1;
    let blank = lines[..end].iter().rposition(|l| l.trim().is_empty())?;
    let block = &lines[blank + 1..end];
    if !block.is_empty() && block.iter().all(|l| is_trailer_line(l)) {
        Some(blank + 1)
    } else {
        None
    }
}

/// Parse the trailer block of a commit message into a key → value map.
/// Later duplicates win.
pub fn parse_trailers(message: &str) -> BTreeMap<String, String> {
    let lines: Vec<&str> = message.lines().collect();
    let mut trailers = BTreeMap::new();
    if let Some(start) = trailer_block_start(&lines) {
        for line in &lines[start..] {
            if let Some((key, value)) = line.split_once(": ") {
                trailers.insert(key.to_string(), value.trim().to_string());
            }
        }
    }
    trailers
}

/// Extract a well-formed checkpoint id from a message. A trailer whose
/// value is not twelve lowercase hex characters is treated as absent.
pub fn checkpoint_id(message: &str) -> Option<CheckpointId> {
    parse_trailers(message)
        .get(TRAILER_CHECKPOINT)
        .and_then(|v| CheckpointId::parse(v))
}

/// Append a trailer to a message, creating the trailing block if needed.
pub fn append_trailer(message: &str, key: &str, value: &str) -> String {
    let trimmed = message.trim_end_matches('\n');
    let lines: Vec<&str> = trimmed.lines().collect();
    if trailer_block_start(&lines).is_some() {
        format!("{trimmed}\n{key}: {value}\n")
    } else {
        format!("{trimmed}\n\n{key}: {value}\n")
    }
}

/// Remove every reserved `Entire-*` trailer from a message, keeping
/// `Entire-Checkpoint`, the only key permitted on user-branch commits.
/// Returns `None` when nothing had to change.
pub fn strip_reserved_trailers(message: &str) -> Option<String> {
    let lines: Vec<&str> = message.lines().collect();
    let start = trailer_block_start(&lines)?;

    let mut kept: Vec<&str> = lines[..start].to_vec();
    let mut removed = false;
    for line in &lines[start..] {
        let reserved = line
            .split_once(": ")
            .is_some_and(|(key, _)| RESERVED_TRAILERS.contains(&key));
        if reserved {
            removed = true;
        } else {
            kept.push(line);
        }
    }
    if !removed {
        return None;
    }

    // Drop a now-empty trailing block's separator blank line.
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    Some(format!("{}\n", kept.join("\n")))
}
