mod listing;

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use sxmconfig::Config;
use sxmrelay::{Credentials, Region, SiriusXmConfigExt, SiriusXmRelay, SiriusXmServerExt};
use sxmserver::{ServerBuilder, init_logging, logs::string_to_level};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[clap(version)]
/// Relays SiriusXM channels as plain HLS playlists.
struct Args {
    /// SiriusXM account user name (falls back to the configuration)
    username: Option<String>,

    /// SiriusXM account password (falls back to the configuration)
    password: Option<String>,

    /// Print the channel list and exit
    #[clap(short, long)]
    list: bool,

    /// Local HTTP port
    #[clap(short, long)]
    port: Option<u16>,

    /// Use the Canadian region (also accepted as `--ca`; the single-dash
    /// `-ca` form is not supported)
    #[clap(long, alias = "ca")]
    canada: bool,

    /// Read credentials from SXM_USER and SXM_PASS when set
    #[clap(short, long)]
    env: bool,

    /// Configuration directory
    #[clap(long, env = "SXM_CONFIG")]
    config_dir: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[clap(long)]
    log_level: Option<String>,
}

fn credentials(args: &Args, config: &Config) -> Result<Credentials> {
    let from_env = |key: &str| {
        if args.env {
            std::env::var(key).ok().filter(|v| !v.is_empty())
        } else {
            None
        }
    };

    let username = from_env("SXM_USER")
        .or_else(|| args.username.clone())
        .or_else(|| config.get_siriusxm_username().ok());
    let password = from_env("SXM_PASS")
        .or_else(|| args.password.clone())
        .or_else(|| config.get_siriusxm_password().ok());

    match (username, password) {
        (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
        _ => bail!("SiriusXM credentials are required (arguments, --env or accounts.siriusxm in the configuration)"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Arc::new(Config::load_config(args.config_dir.as_deref().unwrap_or(""))?);
    let log_state = init_logging(&config);
    if let Some(level) = &args.log_level {
        match string_to_level(level) {
            Some(level) => log_state.set_max_level(level),
            None => warn!(level = %level, "Unknown log level, keeping the configured one"),
        }
    }

    let credentials = credentials(&args, &config)?;
    let region = if args.canada {
        Region::Ca
    } else {
        config.get_siriusxm_region()?
    };

    let relay = SiriusXmRelay::builder(credentials)
        .region(region)
        .with_config(&config)
        .session_store(config.clone())
        .build()
        .context("Failed to build the SiriusXM client")?;

    if args.list {
        let mut channels = relay.channels().await?.as_ref().clone();
        listing::sort_channels(&mut channels);
        print!("{}", listing::format_channel_table(&channels));
        return Ok(());
    }

    let mut builder = ServerBuilder::new_configured(&config);
    if let Some(port) = args.port {
        builder = builder.http_port(port);
    }
    let mut server = builder.build();

    server
        .init_siriusxm(Arc::new(relay), config.get_max_connections()?)
        .await?;

    info!(region = %region, "Starting SiriusXM proxy");
    server.start().await?;
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}
