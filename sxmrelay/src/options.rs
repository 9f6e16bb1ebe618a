//! Tunables shared by the relay components.

use std::time::Duration;

/// REST module endpoint root
pub const DEFAULT_REST_BASE: &str = "https://player.siriusxm.com/rest/v2/experience/modules";
/// Live HLS host substituted for `%Live_Primary_HLS%`
pub const DEFAULT_HLS_HOST: &str = "https://siriusxm-priprodlive.akamaized.net";
/// Browser identity expected by upstream
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_6) AppleWebKit/604.5.6 (KHTML, like Gecko) Version/11.0.3 Safari/604.5.6";

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub rest_base: String,
    pub hls_host: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Sessions older than this are re-authenticated on next use
    pub refresh_interval: Duration,
    /// Consecutive segment failures forcing a re-authentication
    pub error_threshold: u32,
    /// Session-expired retries of the now-playing lookup
    pub resolve_attempts: u32,
    /// Fetches of the master/variant listing before giving up on 403
    pub variant_attempts: u32,
    /// Playlist fetches (with re-authentication in between) on 403
    pub playlist_attempts: u32,
    pub segment_attempts: u32,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            rest_base: DEFAULT_REST_BASE.to_string(),
            hls_host: DEFAULT_HLS_HOST.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(600),
            error_threshold: 5,
            resolve_attempts: 5,
            variant_attempts: 3,
            playlist_attempts: 3,
            segment_attempts: 5,
        }
    }
}
