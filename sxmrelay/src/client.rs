//! Relay context
//!
//! [`SiriusXmRelay`] wires the session, catalog, resolver and segment
//! fetcher together around one HTTP client and exposes the three
//! operations served to players: playlists, segments and the HLS key.

use crate::api::UpstreamApi;
use crate::clock::{Clock, SystemClock};
use crate::directory::ChannelDirectory;
use crate::error::{Result, SiriusXmError};
use crate::models::{Channel, Credentials, Region};
use crate::options::RelayOptions;
use crate::resolver::StreamResolver;
use crate::rewriter::rewrite_playlist;
use crate::segments::SegmentFetcher;
use crate::session::{SessionManager, SessionStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::StatusCode;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;
use sxmconfig::Config;
use tracing::{info, warn};

/// Static AES-128 key served to players for `key/1`
pub const HLS_AES_KEY_BASE64: &str = "0Nsco7MAgxowGvkUT8aYag==";

static HLS_AES_KEY: LazyLock<Vec<u8>> =
    LazyLock::new(|| STANDARD.decode(HLS_AES_KEY_BASE64).unwrap_or_default());

/// Decoded HLS decryption key.
pub fn hls_key() -> &'static [u8] {
    &HLS_AES_KEY
}

pub struct SiriusXmRelay {
    options: RelayOptions,
    api: Arc<UpstreamApi>,
    session: Arc<SessionManager>,
    directory: ChannelDirectory,
    resolver: Arc<StreamResolver>,
    segments: SegmentFetcher,
    current_channel: RwLock<Option<String>>,
}

impl SiriusXmRelay {
    pub fn builder(credentials: Credentials) -> RelayBuilder {
        RelayBuilder::new(credentials)
    }

    pub fn new(credentials: Credentials, region: Region) -> Result<Self> {
        Self::builder(credentials).region(region).build()
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn directory(&self) -> &ChannelDirectory {
        &self.directory
    }

    pub fn resolver(&self) -> &Arc<StreamResolver> {
        &self.resolver
    }

    /// Channel of the last playlist served.
    pub fn current_channel(&self) -> Option<String> {
        self.current_channel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current_channel(&self, channel_id: &str) {
        *self
            .current_channel
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(channel_id.to_string());
    }

    pub async fn channels(&self) -> Result<Arc<Vec<Channel>>> {
        self.directory.list().await
    }

    /// Rewritten media playlist for a channel name, id or number.
    ///
    /// A 403 on the playlist renews the session and resolves the channel
    /// again, bypassing the URL cache.
    pub async fn get_playlist(&self, name: &str) -> Result<String> {
        let (guid, channel_id) = self
            .directory
            .find(name)
            .await?
            .ok_or_else(|| SiriusXmError::not_found(format!("channel '{name}'")))?;

        let mut use_cache = true;
        let mut attempt = 0;
        let body = loop {
            attempt += 1;
            let url = if guid.is_empty() {
                self.resolver.resolve_direct(&channel_id, use_cache).await?
            } else {
                self.resolver
                    .resolve_playlist_url(&guid, &channel_id, use_cache, self.options.resolve_attempts)
                    .await?
            };

            self.session.ensure_authenticated().await?;
            let epoch = self.session.epoch();
            let auth = self.session.auth_params()?;
            let reply = self.api.fetch_stream(&url, &auth).await?;
            match reply.status {
                StatusCode::OK => break String::from_utf8_lossy(&reply.body).into_owned(),
                StatusCode::FORBIDDEN if attempt < self.options.playlist_attempts => {
                    warn!(channel = %channel_id, attempt, "Playlist forbidden, re-authenticating");
                    self.session.force_reauthenticate(epoch).await?;
                    self.resolver.invalidate(&channel_id).await;
                    use_cache = false;
                }
                status => {
                    warn!(channel = %channel_id, status = status.as_u16(), "Playlist fetch failed");
                    return Err(SiriusXmError::UpstreamStatus {
                        code: status.as_u16(),
                    });
                }
            }
        };

        let state = self.resolver.path_state(&channel_id).unwrap_or_default();
        self.set_current_channel(&channel_id);
        info!(channel = %channel_id, "Serving playlist");
        Ok(rewrite_playlist(&body, &state, &channel_id))
    }

    /// Segment bytes for a path as requested by the player.
    pub async fn get_segment(&self, path: &str) -> Result<Bytes> {
        let channel = self.current_channel();
        self.segments
            .fetch_segment(path, channel.as_deref(), self.options.segment_attempts)
            .await
    }
}

/// Builder for [`SiriusXmRelay`]
pub struct RelayBuilder {
    credentials: Credentials,
    region: Region,
    options: RelayOptions,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn SessionStore>>,
}

impl RelayBuilder {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            region: Region::default(),
            options: RelayOptions::default(),
            clock: Arc::new(SystemClock),
            store: None,
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Applies the `host` settings of the configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        if let Ok(secs) = config.get_request_timeout_secs() {
            self.options.request_timeout = Duration::from_secs(secs as u64);
        }
        self
    }

    pub fn options(mut self, options: RelayOptions) -> Self {
        self.options = options;
        self
    }

    pub fn rest_base(mut self, url: impl Into<String>) -> Self {
        self.options.rest_base = url.into();
        self
    }

    pub fn hls_host(mut self, url: impl Into<String>) -> Self {
        self.options.hls_host = url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<SiriusXmRelay> {
        let options = self.options;
        let api = Arc::new(UpstreamApi::new(&options)?);

        let mut session = SessionManager::new(
            api.clone(),
            self.credentials,
            self.region,
            self.clock.clone(),
            options.refresh_interval,
            options.error_threshold,
        );
        if let Some(store) = self.store {
            session = session.with_store(store);
        }
        let session = Arc::new(session);

        let directory = ChannelDirectory::new(api.clone(), session.clone());
        let resolver = Arc::new(StreamResolver::new(
            api.clone(),
            session.clone(),
            self.clock,
            options.variant_attempts,
        ));
        let segments = SegmentFetcher::new(api.clone(), session.clone(), resolver.clone());

        Ok(SiriusXmRelay {
            options,
            api,
            session,
            directory,
            resolver,
            segments,
            current_channel: RwLock::new(None),
        })
    }
}
