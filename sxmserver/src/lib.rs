//! # sxmserver - Axum host for the relay
//!
//! A thin wrapper around Axum that owns the listener, the merged router and
//! the Ctrl+C shutdown, plus the tracing setup shared by every binary.
//!
//! - [`server`] : [`Server`] and its [`ServerBuilder`]
//! - [`logs`] : reloadable level filter and console output
//!
//! ```rust,no_run
//! use sxmserver::ServerBuilder;
//! use axum::{Router, routing::get};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = ServerBuilder::new("relay").http_port(9999).build();
//! server
//!     .add_router("/", Router::new().route("/ping", get(|| async { "pong" })))
//!     .await;
//! server.start().await?;
//! server.wait().await;
//! # Ok(())
//! # }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, init_logging};
pub use server::{Server, ServerBuilder, ServerInfo};
