//! HTTP front served to players
//!
//! Routing is by path suffix rather than by route table:
//!
//! - `*/key/1` returns the static HLS key
//! - `{channel}.m3u8` returns the rewritten media playlist
//! - `*.aac` returns segment bytes
//!
//! Anything else, and any failure, is an empty 500.

use crate::client::{SiriusXmRelay, hls_key};
use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const PLAYLIST_CONTENT_TYPE: &str = "application/x-mpegURL";
const SEGMENT_CONTENT_TYPE: &str = "audio/x-aac";
const KEY_CONTENT_TYPE: &str = "text/plain";

#[derive(Clone)]
pub struct RelayState {
    relay: Arc<SiriusXmRelay>,
    permits: Arc<Semaphore>,
}

impl RelayState {
    /// `max_connections` bounds concurrent upstream-bound requests.
    pub fn new(relay: Arc<SiriusXmRelay>, max_connections: usize) -> Self {
        Self {
            relay,
            permits: Arc::new(Semaphore::new(max_connections.max(1))),
        }
    }
}

pub fn create_router(state: RelayState) -> Router {
    Router::new().fallback(dispatch).with_state(state)
}

fn server_error() -> Response {
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn dispatch(State(state): State<RelayState>, uri: Uri) -> Response {
    let path = uri.path();

    if path.ends_with("/key/1") {
        return ([(header::CONTENT_TYPE, KEY_CONTENT_TYPE)], hls_key()).into_response();
    }

    let Ok(_permit) = state.permits.acquire().await else {
        return server_error();
    };

    if let Some(stem) = path.strip_suffix(".m3u8") {
        let name = stem.rsplit('/').next().unwrap_or(stem);
        debug!(channel = name, "Playlist request");
        return match state.relay.get_playlist(name).await {
            Ok(body) => ([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body).into_response(),
            Err(e) => {
                warn!(channel = name, error = %e, "Playlist request failed");
                server_error()
            }
        };
    }

    if path.ends_with(".aac") {
        let segment = path.trim_start_matches('/');
        return match state.relay.get_segment(segment).await {
            Ok(bytes) => ([(header::CONTENT_TYPE, SEGMENT_CONTENT_TYPE)], bytes).into_response(),
            Err(e) => {
                warn!(path = segment, error = %e, "Segment request failed");
                server_error()
            }
        };
    }

    debug!(path, "Unhandled path");
    server_error()
}
