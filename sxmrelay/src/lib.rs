//! # sxmrelay - SiriusXM HLS relay
//!
//! Logs in to SiriusXM with account credentials, keeps the session alive and
//! re-serves live channels as plain HLS to local players that know nothing
//! about SiriusXM authentication.
//!
//! ## Architecture
//!
//! - [`session`] : login, session resumption, bearer tokens, failure accounting
//! - [`directory`] : channel catalog and lookup by name, id or number
//! - [`resolver`] : GUID to variant playlist URL, with direct-layout fallback
//! - [`rewriter`] : segment path rewriting in media playlists
//! - [`segments`] : segment retrieval with retries and alternate layouts
//! - [`client`] : [`SiriusXmRelay`], the context object tying them together
//! - `api_rest` / `server_ext` : HTTP front mounted on `sxmserver::Server`
//!
//! ## Example
//!
//! ```rust,no_run
//! use sxmrelay::{Credentials, Region, SiriusXmRelay};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let relay = SiriusXmRelay::new(Credentials::new("me@example.com", "secret"), Region::Us)?;
//!
//!     for channel in relay.channels().await?.iter() {
//!         println!("{} {}", channel.number, channel.name);
//!     }
//!
//!     let playlist = relay.get_playlist("octane").await?;
//!     println!("{playlist}");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod clock;
pub mod config_ext;
pub mod cookies;
pub mod directory;
pub mod error;
pub mod models;
pub mod options;
pub mod resolver;
pub mod rewriter;
pub mod segments;
pub mod session;

#[cfg(feature = "sxmserver")]
pub mod api_rest;
#[cfg(feature = "sxmserver")]
pub mod server_ext;

pub use client::{RelayBuilder, SiriusXmRelay, hls_key};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config_ext::SiriusXmConfigExt;
pub use error::{Result, SiriusXmError};
pub use models::{Channel, ChannelPathState, Credentials, Region};
pub use options::RelayOptions;
pub use session::{SessionManager, SessionSnapshot, SessionStore};

#[cfg(feature = "sxmserver")]
pub use server_ext::SiriusXmServerExt;
