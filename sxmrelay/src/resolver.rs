//! Playlist URL resolution.
//!
//! A channel GUID is turned into a playable variant playlist URL:
//!
//! 1. ask the now-playing endpoint for the live variant list, renewing the
//!    session when upstream reports it expired
//! 2. pick the `LARGE` variant (or the first one) and expand the host macro
//! 3. fetch that listing and probe the variant entries it references
//! 4. when any of this fails, probe well-known direct locations instead
//!
//! The winning URL is cached per channel together with the directory layout
//! needed later to rebuild segment paths.

use crate::api::{AuthParams, UpstreamApi};
use crate::clock::Clock;
use crate::error::{Result, SiriusXmError};
use crate::models::{self, ChannelPathState, HlsAudioInfo};
use crate::session::SessionManager;
use chrono::SecondsFormat;
use m3u8_rs::Playlist;
use moka::future::Cache;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};
use url::Url;

/// Placeholder for the live HLS host in now-playing URLs
pub const LIVE_HOST_MACRO: &str = "%Live_Primary_HLS%";

/// Candidate stream location relative to `/AAC_Data/{channel}`.
///
/// `{ch}` and `{br}` are replaced by the channel id and bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectTemplate {
    pub subdirectory: Option<&'static str>,
    pub file: &'static str,
    pub bitrate: &'static str,
}

impl DirectTemplate {
    const fn new(subdirectory: Option<&'static str>, file: &'static str, bitrate: &'static str) -> Self {
        Self {
            subdirectory,
            file,
            bitrate,
        }
    }

    pub fn render(&self, host: &str, channel_id: &str) -> ChannelPathState {
        let fill = |s: &str| s.replace("{ch}", channel_id).replace("{br}", self.bitrate);
        let base = format!("/AAC_Data/{channel_id}");
        let subdirectory = self.subdirectory.map(fill);
        let path = match &subdirectory {
            Some(sub) => format!("{base}/{sub}/{}", fill(self.file)),
            None => format!("{base}/{}", fill(self.file)),
        };
        ChannelPathState {
            playlist_url: format!("{}{}", host.trim_end_matches('/'), path),
            base_path: Some(base),
            subdirectory,
        }
    }
}

/// Current 256k layouts, in probing order
pub const PRIMARY_TEMPLATES: [DirectTemplate; 3] = [
    DirectTemplate::new(Some("HLS_{ch}_{br}_v3"), "{ch}_{br}_large_v3.m3u8", "256k"),
    DirectTemplate::new(None, "{ch}_{br}_large_v3.m3u8", "256k"),
    DirectTemplate::new(Some("HLS_{ch}_{br}_v3"), "{ch}_{br}_v3.m3u8", "256k"),
];

pub const LEGACY_BITRATES: [&str; 4] = ["256k", "128k", "64k", "32k"];

/// Older v2 layouts across [`LEGACY_BITRATES`]
pub fn legacy_templates() -> Vec<DirectTemplate> {
    LEGACY_BITRATES
        .iter()
        .flat_map(|&br| {
            [
                DirectTemplate::new(None, "{ch}_{br}_large_v2.m3u8", br),
                DirectTemplate::new(Some("HLS_{ch}_{br}_v2"), "{ch}_{br}_v2.m3u8", br),
            ]
        })
        .collect()
}

/// `LARGE` variant if present, else the first one.
pub fn select_variant(infos: &[HlsAudioInfo]) -> Option<&HlsAudioInfo> {
    infos
        .iter()
        .find(|i| i.size.eq_ignore_ascii_case("LARGE"))
        .or_else(|| infos.first())
}

/// Variant playlists referenced by a master listing, with their layout.
///
/// Relative entries keep the listing directory as base and their own
/// directory component as subdirectory. A media playlist is its own variant.
pub fn parse_variant_candidates(listing_url: &str, body: &[u8]) -> Result<Vec<ChannelPathState>> {
    let listing = Url::parse(listing_url)?;
    let listing_dir = parent_path(listing.path());

    let master = match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(master)) => master,
        Ok(Playlist::MediaPlaylist(_)) => {
            return Ok(vec![ChannelPathState {
                playlist_url: listing_url.to_string(),
                base_path: Some(listing_dir),
                subdirectory: None,
            }]);
        }
        Err(e) => {
            return Err(SiriusXmError::decode(format!(
                "invalid playlist at {listing_url}: {e:?}"
            )));
        }
    };

    let mut candidates = Vec::with_capacity(master.variants.len());
    for variant in &master.variants {
        let entry = variant.uri.trim();
        let url = listing.join(entry)?;
        let entry_path = entry.split('?').next().unwrap_or(entry);
        let state = if entry.starts_with('/') || entry.contains("://") {
            ChannelPathState {
                playlist_url: url.to_string(),
                base_path: Some(parent_path(url.path())),
                subdirectory: None,
            }
        } else {
            ChannelPathState {
                playlist_url: url.to_string(),
                base_path: Some(listing_dir.clone()),
                subdirectory: entry_path.rsplit_once('/').map(|(dir, _)| dir.to_string()),
            }
        };
        candidates.push(state);
    }

    Ok(candidates)
}

fn parent_path(path: &str) -> String {
    path.rsplit_once('/')
        .map(|(dir, _)| dir.to_string())
        .unwrap_or_default()
}

pub struct StreamResolver {
    api: Arc<UpstreamApi>,
    session: Arc<SessionManager>,
    clock: Arc<dyn Clock>,
    variant_attempts: u32,
    // One map-wide lock; it is only held to clone or insert a single entry.
    paths: RwLock<HashMap<String, ChannelPathState>>,
    cache: Cache<String, String>,
}

impl StreamResolver {
    pub fn new(
        api: Arc<UpstreamApi>,
        session: Arc<SessionManager>,
        clock: Arc<dyn Clock>,
        variant_attempts: u32,
    ) -> Self {
        Self {
            api,
            session,
            clock,
            variant_attempts: variant_attempts.max(1),
            paths: RwLock::new(HashMap::new()),
            cache: Cache::builder().max_capacity(4096).build(),
        }
    }

    /// Layout recorded for a channel by the last resolution.
    pub fn path_state(&self, channel_id: &str) -> Option<ChannelPathState> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_id)
            .cloned()
    }

    fn remember(&self, channel_id: &str, state: ChannelPathState) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id.to_string(), state);
    }

    pub async fn cached_url(&self, channel_id: &str) -> Option<String> {
        self.cache.get(channel_id).await
    }

    /// Drops the cached URL so the next resolution goes upstream.
    pub async fn invalidate(&self, channel_id: &str) {
        self.cache.invalidate(channel_id).await;
    }

    async fn store(&self, channel_id: &str, state: ChannelPathState) -> String {
        let url = state.playlist_url.clone();
        self.remember(channel_id, state);
        self.cache.insert(channel_id.to_string(), url.clone()).await;
        url
    }

    /// Resolves the variant playlist URL of a channel.
    ///
    /// With `use_cache` a previously resolved URL is returned without any
    /// upstream call. Session-expired answers (codes 201 and 208) trigger a
    /// re-authentication and a retry, at most `max_attempts` times.
    pub async fn resolve_playlist_url(
        &self,
        guid: &str,
        channel_id: &str,
        use_cache: bool,
        max_attempts: u32,
    ) -> Result<String> {
        if use_cache {
            if let Some(url) = self.cache.get(channel_id).await {
                debug!(channel = channel_id, "Playlist URL cache hit");
                return Ok(url);
            }
        }

        let infos = self.now_playing(guid, channel_id, max_attempts).await?;
        let variant = select_variant(&infos)
            .ok_or_else(|| SiriusXmError::not_found(format!("no HLS variant for {channel_id}")))?;
        let listing_url = variant.url.replace(LIVE_HOST_MACRO, self.api.hls_host());
        debug!(channel = channel_id, url = %listing_url, size = %variant.size, "Selected HLS variant");

        let state = match self.verify_variant(&listing_url).await {
            Ok(state) => state,
            Err(e) => {
                warn!(channel = channel_id, error = %e, "Variant verification failed, trying direct locations");
                self.probe_templates(channel_id, &PRIMARY_TEMPLATES).await?
            }
        };

        info!(channel = channel_id, url = %state.playlist_url, "Resolved playlist");
        Ok(self.store(channel_id, state).await)
    }

    async fn now_playing(
        &self,
        guid: &str,
        channel_id: &str,
        max_attempts: u32,
    ) -> Result<Vec<HlsAudioInfo>> {
        let mut remaining = max_attempts;
        loop {
            self.session.ensure_authenticated().await?;
            let epoch = self.session.epoch();

            let now = self.clock.now();
            let params = [
                ("assetGUID", guid.to_string()),
                ("ccRequestType", "AUDIO_VIDEO".to_string()),
                ("channelId", channel_id.to_string()),
                ("hls_output_mode", "custom".to_string()),
                ("marker_mode", "all_separate_cue_points".to_string()),
                ("result-template", "web".to_string()),
                ("time", now.timestamp_millis().to_string()),
                ("timestamp", now.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ];
            let header = self.session.cookie_header();
            let reply = self
                .api
                .get_module("tune/now-playing-live", &params, header.as_deref())
                .await?;
            self.session.absorb_cookies(reply.cookies);

            let (code, message) = models::first_message(&reply.body)
                .ok_or_else(|| SiriusXmError::decode("now-playing message code is missing"))?;

            match code {
                100 => return models::parse_hls_infos(&reply.body),
                201 | 208 => {
                    if remaining == 0 {
                        warn!(channel = channel_id, code, "Session still expired, giving up");
                        return Err(SiriusXmError::UpstreamLogic { code, message });
                    }
                    remaining -= 1;
                    warn!(channel = channel_id, code, remaining, "Session expired, re-authenticating");
                    self.session.force_reauthenticate(epoch).await?;
                }
                _ => {
                    warn!(channel = channel_id, code, %message, "Now-playing lookup failed");
                    return Err(SiriusXmError::UpstreamLogic { code, message });
                }
            }
        }
    }

    async fn auth_params(&self) -> Result<AuthParams> {
        self.session.ensure_authenticated().await?;
        self.session.auth_params()
    }

    /// Fetches a master listing and picks the first variant answering a probe.
    ///
    /// When no variant answers, the first one is used anyway.
    pub async fn verify_variant(&self, listing_url: &str) -> Result<ChannelPathState> {
        let mut attempt = 0;
        let body = loop {
            attempt += 1;
            let auth = self.auth_params().await?;
            let epoch = self.session.epoch();
            let reply = self.api.fetch_stream(listing_url, &auth).await?;
            match reply.status {
                StatusCode::OK => break reply.body,
                StatusCode::FORBIDDEN if attempt < self.variant_attempts => {
                    warn!(attempt, url = listing_url, "Variant listing forbidden, re-authenticating");
                    self.session.force_reauthenticate(epoch).await?;
                }
                status => {
                    return Err(SiriusXmError::UpstreamStatus {
                        code: status.as_u16(),
                    });
                }
            }
        };

        let candidates = parse_variant_candidates(listing_url, &body)?;
        let first = candidates
            .first()
            .cloned()
            .ok_or_else(|| SiriusXmError::not_found(format!("no variant in {listing_url}")))?;

        let auth = self.auth_params().await?;
        for candidate in &candidates {
            if self.api.probe(&candidate.playlist_url, &auth).await {
                return Ok(candidate.clone());
            }
        }

        warn!(url = %first.playlist_url, "No variant answered the probe, using the first one");
        Ok(first)
    }

    async fn probe_templates(
        &self,
        channel_id: &str,
        templates: &[DirectTemplate],
    ) -> Result<ChannelPathState> {
        let auth = self.auth_params().await?;
        for template in templates {
            let state = template.render(self.api.hls_host(), channel_id);
            if self.api.probe(&state.playlist_url, &auth).await {
                debug!(channel = channel_id, url = %state.playlist_url, "Direct location found");
                return Ok(state);
            }
        }
        Err(SiriusXmError::not_found(format!(
            "no direct stream location for {channel_id}"
        )))
    }

    /// Resolves a channel without the now-playing endpoint by probing the
    /// primary then the legacy layouts.
    pub async fn resolve_direct(&self, channel_id: &str, use_cache: bool) -> Result<String> {
        if use_cache {
            if let Some(url) = self.cache.get(channel_id).await {
                return Ok(url);
            }
        }

        let state = match self.probe_templates(channel_id, &PRIMARY_TEMPLATES).await {
            Ok(state) => state,
            Err(SiriusXmError::NotFound(_)) => {
                debug!(channel = channel_id, "Trying legacy stream layouts");
                self.probe_templates(channel_id, &legacy_templates()).await?
            }
            Err(e) => return Err(e),
        };

        info!(channel = channel_id, url = %state.playlist_url, "Resolved direct playlist");
        Ok(self.store(channel_id, state).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(size: &str, url: &str) -> HlsAudioInfo {
        HlsAudioInfo {
            name: "primary".into(),
            size: size.into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_select_variant_prefers_large() {
        let infos = vec![info("SMALL", "a"), info("LARGE", "b"), info("MEDIUM", "c")];
        assert_eq!(select_variant(&infos).unwrap().url, "b");

        let infos = vec![info("SMALL", "a"), info("MEDIUM", "c")];
        assert_eq!(select_variant(&infos).unwrap().url, "a");

        assert!(select_variant(&[]).is_none());
    }

    #[test]
    fn test_relative_variant_with_subdirectory() {
        let body = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=281600\nHLS_9450_256k_v3/9450_256k_large_v3.m3u8\n";
        let candidates = parse_variant_candidates(
            "https://host.example/AAC_Data/9450/9450_variant_large_v3.m3u8?token=x",
            body,
        )
        .unwrap();

        assert_eq!(candidates.len(), 1);
        let state = &candidates[0];
        assert_eq!(
            state.playlist_url,
            "https://host.example/AAC_Data/9450/HLS_9450_256k_v3/9450_256k_large_v3.m3u8"
        );
        assert_eq!(state.base_path.as_deref(), Some("/AAC_Data/9450"));
        assert_eq!(state.subdirectory.as_deref(), Some("HLS_9450_256k_v3"));
    }

    #[test]
    fn test_flat_and_absolute_variants() {
        let body = b"#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=281600\n9450_256k_large_v3.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=140800\n/AAC_Data/other/x_v3.m3u8\n";
        let candidates =
            parse_variant_candidates("https://host.example/AAC_Data/9450/master.m3u8", body).unwrap();

        assert_eq!(candidates[0].subdirectory, None);
        assert_eq!(candidates[0].base_path.as_deref(), Some("/AAC_Data/9450"));
        assert_eq!(candidates[1].base_path.as_deref(), Some("/AAC_Data/other"));
        assert_eq!(
            candidates[1].playlist_url,
            "https://host.example/AAC_Data/other/x_v3.m3u8"
        );
    }

    #[test]
    fn test_media_listing_is_its_own_variant() {
        let body = b"#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nseg1.aac\n";
        let url = "https://host.example/AAC_Data/1/1_256k_v3.m3u8";
        let candidates = parse_variant_candidates(url, body).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].playlist_url, url);
    }

    #[test]
    fn test_garbage_listing_is_a_decode_error() {
        let err = parse_variant_candidates("https://host.example/a.m3u8", b"<html>denied</html>")
            .unwrap_err();
        assert!(matches!(err, SiriusXmError::Decode(_)));
    }

    #[test]
    fn test_template_rendering() {
        let state = PRIMARY_TEMPLATES[0].render("https://host.example/", "9450");
        assert_eq!(
            state.playlist_url,
            "https://host.example/AAC_Data/9450/HLS_9450_256k_v3/9450_256k_large_v3.m3u8"
        );
        assert_eq!(state.subdirectory.as_deref(), Some("HLS_9450_256k_v3"));

        let flat = PRIMARY_TEMPLATES[1].render("https://host.example", "9450");
        assert_eq!(flat.playlist_url, "https://host.example/AAC_Data/9450/9450_256k_large_v3.m3u8");
        assert_eq!(flat.subdirectory, None);

        let legacy = legacy_templates();
        assert_eq!(legacy.len(), 8);
        assert_eq!(
            legacy[3].render("h", "c").playlist_url,
            "h/AAC_Data/c/HLS_c_128k_v2/c_128k_v2.m3u8"
        );
    }
}
