//! Segment retrieval with failure accounting.
//!
//! A 403 is counted as a segment failure; once failures reach the session's
//! threshold the session is renewed and the same path retried right away.
//! A 404 walks through the alternate directory layouts of the channel.
//! Every retry consumes one attempt from the caller's budget.

use crate::api::UpstreamApi;
use crate::error::{Result, SiriusXmError};
use crate::models::ChannelPathState;
use crate::resolver::StreamResolver;
use crate::session::SessionManager;
use bytes::Bytes;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Full host-relative path for a requested segment.
///
/// Paths containing a directory are used as-is. A bare file name is placed
/// under the channel's known segment directory when there is one.
pub fn reconstruct_path(path: &str, channel_id: Option<&str>, state: Option<&ChannelPathState>) -> String {
    if path.contains('/') {
        return path.to_string();
    }
    match (channel_id, state) {
        (Some(channel), Some(state)) => match state.segment_dir(channel) {
            Some(dir) => format!("{}/{}", dir.trim_end_matches('/'), path),
            None => path.to_string(),
        },
        _ => path.to_string(),
    }
}

/// Channel id embedded in an `AAC_Data/{channel}/...` path.
pub fn channel_from_path(path: &str) -> Option<&str> {
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some("AAC_Data"), Some(channel)) => Some(channel),
        _ => None,
    }
}

/// Alternate layouts tried after a 404, skipping the path already tried.
pub fn alternate_paths(channel_id: &str, path: &str) -> VecDeque<String> {
    let file = path.rsplit('/').next().unwrap_or(path);
    let tried = format!("/{}", path.trim_start_matches('/'));
    [
        format!("/AAC_Data/{channel_id}/HLS_{channel_id}_256k_v3/{file}"),
        format!("/AAC_Data/{channel_id}/{file}"),
        format!("/AAC_Data/{channel_id}/{channel_id}_256k_v3/{file}"),
    ]
    .into_iter()
    .filter(|candidate| *candidate != tried)
    .collect()
}

pub struct SegmentFetcher {
    api: Arc<UpstreamApi>,
    session: Arc<SessionManager>,
    resolver: Arc<StreamResolver>,
}

impl SegmentFetcher {
    pub fn new(api: Arc<UpstreamApi>, session: Arc<SessionManager>, resolver: Arc<StreamResolver>) -> Self {
        Self {
            api,
            session,
            resolver,
        }
    }

    /// One authenticated GET, returning the session epoch it was sent with.
    async fn get(&self, path: &str) -> Result<(StatusCode, Bytes, u64)> {
        self.session.ensure_authenticated().await?;
        let epoch = self.session.epoch();
        let auth = self.session.auth_params()?;
        let reply = self.api.fetch_stream(&self.api.stream_url(path), &auth).await?;
        Ok((reply.status, reply.body, epoch))
    }

    /// Fetches a segment, `channel` being the channel last served as a
    /// playlist when the path does not name one.
    pub async fn fetch_segment(
        &self,
        path: &str,
        channel: Option<&str>,
        max_attempts: u32,
    ) -> Result<Bytes> {
        let channel_id = channel_from_path(path)
            .map(str::to_string)
            .or_else(|| channel.map(str::to_string));
        let state = channel_id
            .as_deref()
            .and_then(|c| self.resolver.path_state(c));
        let mut current = reconstruct_path(path, channel_id.as_deref(), state.as_ref());
        let mut remaining = max_attempts;
        let mut alternates: Option<VecDeque<String>> = None;

        loop {
            let (status, body, epoch) = self.get(&current).await?;

            match status {
                StatusCode::OK => {
                    self.session.reset_segment_errors();
                    return Ok(body);
                }
                StatusCode::FORBIDDEN => {
                    let errors = self.session.record_segment_failure();
                    warn!(path = %current, errors, remaining, "Segment forbidden");
                    if remaining == 0 {
                        return Err(SiriusXmError::UpstreamStatus { code: 403 });
                    }
                    if errors >= self.session.error_threshold() {
                        match self.session.force_reauthenticate(epoch).await {
                            Ok(()) => {
                                self.session.reset_segment_errors();
                                let (status, body, _) = self.get(&current).await?;
                                if status == StatusCode::OK {
                                    return Ok(body);
                                }
                                let errors = self.session.record_segment_failure();
                                warn!(path = %current, status = status.as_u16(), errors, "Segment still failing after re-authentication");
                            }
                            Err(e) => warn!(error = %e, "Re-authentication failed"),
                        }
                    }
                    remaining -= 1;
                }
                StatusCode::NOT_FOUND => {
                    self.session.record_segment_failure();
                    let Some(channel) = channel_id.as_deref() else {
                        return Err(SiriusXmError::not_found(current));
                    };
                    let queue = alternates.get_or_insert_with(|| alternate_paths(channel, &current));
                    if remaining == 0 {
                        return Err(SiriusXmError::not_found(current));
                    }
                    match queue.pop_front() {
                        Some(next) => {
                            debug!(from = %current, to = %next, "Segment not found, trying alternate layout");
                            current = next;
                            remaining -= 1;
                        }
                        None => return Err(SiriusXmError::not_found(current)),
                    }
                }
                other => {
                    self.session.record_segment_failure();
                    warn!(path = %current, status = other.as_u16(), "Unexpected segment status");
                    return Err(SiriusXmError::UpstreamStatus {
                        code: other.as_u16(),
                    });
                }
            }
        }
    }
}
