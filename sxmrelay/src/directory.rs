//! Channel catalog.
//!
//! The catalog is fetched once and kept for the life of the process;
//! concurrent first callers share a single fetch. [`ChannelDirectory::refresh`]
//! forces a new download.

use crate::api::UpstreamApi;
use crate::error::{Result, SiriusXmError};
use crate::models::{self, Channel};
use crate::session::SessionManager;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct ChannelDirectory {
    api: Arc<UpstreamApi>,
    session: Arc<SessionManager>,
    catalog: Mutex<Option<Arc<Vec<Channel>>>>,
}

impl ChannelDirectory {
    pub fn new(api: Arc<UpstreamApi>, session: Arc<SessionManager>) -> Self {
        Self {
            api,
            session,
            catalog: Mutex::new(None),
        }
    }

    /// Returns the catalog, downloading it on first use.
    pub async fn list(&self) -> Result<Arc<Vec<Channel>>> {
        let mut catalog = self.catalog.lock().await;
        if let Some(channels) = catalog.as_ref() {
            return Ok(channels.clone());
        }
        let channels = Arc::new(self.fetch().await?);
        *catalog = Some(channels.clone());
        Ok(channels)
    }

    /// Downloads the catalog again, replacing the cached copy on success.
    pub async fn refresh(&self) -> Result<Arc<Vec<Channel>>> {
        let mut catalog = self.catalog.lock().await;
        let channels = Arc::new(self.fetch().await?);
        *catalog = Some(channels.clone());
        Ok(channels)
    }

    async fn fetch(&self) -> Result<Vec<Channel>> {
        self.session.ensure_authenticated().await?;

        let header = self.session.cookie_header();
        let reply = self
            .api
            .post_module("get", &models::channel_listing_request(), header.as_deref())
            .await?;
        self.session.absorb_cookies(reply.cookies);

        let status = models::module_status(&reply.body)?;
        if status != 1 {
            let (code, message) = models::first_message(&reply.body)
                .unwrap_or((status, "channel listing rejected".to_string()));
            warn!(status, code, "Channel listing rejected");
            return Err(SiriusXmError::UpstreamLogic { code, message });
        }

        let channels = models::parse_channels(&reply.body)?;
        info!(count = channels.len(), "Loaded SiriusXM channel catalog");
        Ok(channels)
    }

    /// Looks a channel up by name, id or dial number.
    ///
    /// Returns `(guid, id)` of the first match, `None` when nothing matches.
    pub async fn find(&self, name: &str) -> Result<Option<(String, String)>> {
        let channels = self.list().await?;
        Ok(find_in(&channels, name).map(|c| (c.guid.clone(), c.id.clone())))
    }
}

/// First channel whose name or id equals `name` ignoring case, or whose
/// dial number equals it exactly.
pub fn find_in<'a>(channels: &'a [Channel], name: &str) -> Option<&'a Channel> {
    let wanted = name.to_lowercase();
    channels.iter().find(|c| {
        c.name.to_lowercase() == wanted || c.id.to_lowercase() == wanted || c.number == name
    })
}
