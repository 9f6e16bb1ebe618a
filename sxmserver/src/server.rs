//! # HTTP server
//!
//! [`Server`] collects Axum routers registered by the feature crates, binds
//! the listener on `start()` and stops gracefully on Ctrl+C.

use anyhow::{Context, Result};
use axum::Router;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use sxmconfig::Config;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tracing::{error, info};

/// Serializable server description.
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub http_port: u16,
}

/// Main HTTP server.
pub struct Server {
    name: String,
    http_port: u16,
    router: Arc<RwLock<Router>>,
    local_addr: Option<SocketAddr>,
    join_handle: Option<JoinHandle<()>>,
}

impl Server {
    pub fn new(name: impl Into<String>, http_port: u16) -> Self {
        Self {
            name: name.into(),
            http_port,
            router: Arc::new(RwLock::new(Router::new())),
            local_addr: None,
            join_handle: None,
        }
    }

    /// Adds a sub-router.
    ///
    /// - `"/"` merges it into the root router
    /// - any other path nests it under that prefix
    pub async fn add_router(&mut self, path: &str, sub_router: Router) {
        let mut r = self.router.write().await;
        let current = std::mem::take(&mut *r);
        *r = if path == "/" {
            current.merge(sub_router)
        } else {
            let normalized = format!("/{}", path.trim_start_matches('/'));
            current.nest(&normalized, sub_router)
        };
    }

    /// Binds the listener and serves in the background.
    ///
    /// Ctrl+C triggers a graceful shutdown: in-flight requests are allowed to
    /// finish, then [`wait`](Self::wait) returns.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Unable to bind port {}", self.http_port))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(
            "Server {} listening on http://{}",
            self.name, local_addr
        );

        let router = self.router.read().await.clone();
        let name = self.name.clone();
        self.join_handle = Some(tokio::spawn(async move {
            let served = axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(shutdown_signal())
                .await;
            match served {
                Ok(()) => info!("Server {} stopped", name),
                Err(e) => error!(error = %e, "Server {} failed", name),
            }
        }));

        Ok(())
    }

    /// Waits for the server task to end.
    pub async fn wait(&mut self) {
        if let Some(h) = self.join_handle.take() {
            let _ = h.await;
        }
    }

    /// Address actually bound by [`start`](Self::start).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            http_port: self.local_addr.map(|a| a.port()).unwrap_or(self.http_port),
        }
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down"),
        Err(e) => {
            error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    name: String,
    http_port: u16,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http_port: 9999,
        }
    }

    /// Builder seeded from the `host` section of the configuration.
    pub fn new_configured(config: &Config) -> Self {
        Self {
            name: "SXMProxy".to_string(),
            http_port: config.get_http_port(),
        }
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn build(self) -> Server {
        Server::new(self.name, self.http_port)
    }
}
