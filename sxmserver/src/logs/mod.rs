//! Tracing setup.
//!
//! A reloadable [`LevelFilter`] sits in front of an optional console layer,
//! so the verbosity can be raised at runtime (e.g. from a CLI flag) without
//! rebuilding the subscriber.

use std::sync::{Arc, PoisonError, RwLock};

use sxmconfig::Config;
use tracing::Level;
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

/// Handle on the installed subscriber.
#[derive(Clone)]
pub struct LogState {
    max_level: Arc<RwLock<Level>>,
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogState {
    fn new(level: Level, reload_handle: reload::Handle<LevelFilter, Registry>) -> Self {
        Self {
            max_level: Arc::new(RwLock::new(level)),
            reload_handle,
        }
    }

    pub fn set_max_level(&self, level: Level) {
        *self.max_level.write().unwrap_or_else(PoisonError::into_inner) = level;
        if let Err(e) = self.reload_handle.reload(LevelFilter::from_level(level)) {
            eprintln!("Failed to reload log level filter: {}", e);
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Installs the global subscriber from `host.logger`.
///
/// `min_level` defaults to INFO when missing or unparsable; the console
/// layer is added when `enable_console` is true (the default).
pub fn init_logging(config: &Config) -> LogState {
    let level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .unwrap_or(Level::INFO);

    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(level));
    let log_state = LogState::new(level, reload_handle);

    let subscriber = Registry::default().with(filter);

    if config.get_log_enable_console().unwrap_or(true) {
        let console = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true);
        if let Err(e) = subscriber.with(console).try_init() {
            eprintln!("Logging already initialised: {}", e);
        }
    } else if let Err(e) = subscriber.try_init() {
        eprintln!("Logging already initialised: {}", e);
    }

    log_state
}

/// Parses a level name, case-insensitively.
pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}
