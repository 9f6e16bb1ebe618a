//! Extension of `sxmserver::Server` mounting the relay front.
//!
//! ```rust,no_run
//! use sxmrelay::SiriusXmServerExt;
//! use sxmserver::ServerBuilder;
//! use sxmconfig::Config;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Arc::new(Config::load_config("")?);
//! let mut server = ServerBuilder::new_configured(&config).build();
//! server.init_siriusxm_configured(config.clone()).await?;
//! server.start().await?;
//! server.wait().await;
//! # Ok(())
//! # }
//! ```

use crate::api_rest::{RelayState, create_router};
use crate::client::SiriusXmRelay;
use crate::config_ext::SiriusXmConfigExt;
use anyhow::Result;
use std::sync::Arc;
use sxmconfig::Config;
use sxmserver::Server;
use tracing::info;

pub trait SiriusXmServerExt {
    /// Mounts the playlist, segment and key handlers at the root.
    async fn init_siriusxm(
        &mut self,
        relay: Arc<SiriusXmRelay>,
        max_connections: usize,
    ) -> Result<Arc<SiriusXmRelay>>;

    /// Builds the relay from `accounts.siriusxm` (credentials, region and
    /// saved session) and mounts it.
    async fn init_siriusxm_configured(&mut self, config: Arc<Config>) -> Result<Arc<SiriusXmRelay>>;
}

impl SiriusXmServerExt for Server {
    async fn init_siriusxm(
        &mut self,
        relay: Arc<SiriusXmRelay>,
        max_connections: usize,
    ) -> Result<Arc<SiriusXmRelay>> {
        let state = RelayState::new(relay.clone(), max_connections);
        self.add_router("/", create_router(state)).await;
        info!(max_connections, "SiriusXM relay mounted");
        Ok(relay)
    }

    async fn init_siriusxm_configured(&mut self, config: Arc<Config>) -> Result<Arc<SiriusXmRelay>> {
        let relay = SiriusXmRelay::builder(config.get_siriusxm_credentials()?)
            .region(config.get_siriusxm_region()?)
            .with_config(&config)
            .session_store(config.clone())
            .build()?;
        let max_connections = config.get_max_connections()?;
        self.init_siriusxm(Arc::new(relay), max_connections).await
    }
}
