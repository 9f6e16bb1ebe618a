//! Media playlist rewriting.
//!
//! Upstream variant playlists reference segments relative to their own
//! directory. Players fetch them from the relay instead, so bare segment
//! lines are rewritten to host-relative paths the relay can forward as-is.
//! Every other line is copied unchanged, line endings included.

use crate::models::ChannelPathState;

/// Segment file extension
pub const SEGMENT_EXTENSION: &str = ".aac";

fn is_bare_segment(line: &str) -> bool {
    let trimmed = line.trim_end();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('/') {
        return false;
    }
    if trimmed.contains("://") {
        return false;
    }
    let path = trimmed.split('?').next().unwrap_or(trimmed);
    path.ends_with(SEGMENT_EXTENSION)
}

/// Prefixes bare segment lines with the channel's segment directory.
///
/// When no directory is known for the channel the playlist is returned
/// untouched.
pub fn rewrite_playlist(body: &str, state: &ChannelPathState, channel_id: &str) -> String {
    let Some(dir) = state.segment_dir(channel_id) else {
        return body.to_string();
    };
    let dir = dir.trim_end_matches('/');

    body.split('\n')
        .map(|line| {
            if is_bare_segment(line) {
                format!("{dir}/{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
