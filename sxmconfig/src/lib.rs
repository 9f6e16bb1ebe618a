//! # SXMProxy Configuration
//!
//! YAML backed configuration for the relay:
//! - an embedded default document merged with `config.yaml` from the config directory
//! - `SXM_CONFIG__SECTION__KEY` environment overrides
//! - typed getters/setters for the host settings
//!
//! Service specific sections (credentials, persisted session state) are added by
//! extension traits in the crates that own them.
//!
//! ## Usage
//!
//! ```no_run
//! use sxmconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let port = config.get_http_port();
//! config.set_http_port(8888)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = include_str!("sxmproxy.yaml");

const ENV_CONFIG_DIR: &str = "SXM_CONFIG";
const ENV_PREFIX: &str = "SXM_CONFIG__";
const CONFIG_DIR_NAME: &str = ".sxmproxy";

const DEFAULT_HTTP_PORT: u16 = 9999;
const DEFAULT_REQUEST_TIMEOUT_SECS: usize = 30;
const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration manager.
///
/// Every setter persists the whole document back to `config.yaml`, so the
/// file always reflects the running state (including the cached SiriusXM
/// session written by the relay).
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Config {
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let probe = path.join(".write_test");
        fs::write(&probe, b"test")?;
        fs::remove_file(&probe)?;

        fs::read_dir(path)?;
        Ok(())
    }

    /// Determines and validates the configuration directory.
    ///
    /// Search order: the `directory` argument when not empty, the
    /// `SXM_CONFIG` environment variable, `./.sxmproxy`, then `~/.sxmproxy`.
    /// The directory is created when missing.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration.
    ///
    /// The embedded defaults are merged with `config.yaml` (if present),
    /// keys are lowercased, environment overrides are applied and the
    /// result is written back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let path = Path::new(&config_dir)
            .join("config.yaml")
            .to_string_lossy()
            .to_string();

        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path, "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut config_value, &external);
            }
            Err(_) => {
                info!(config_file = %path, "Config file not found, using embedded defaults");
            }
        }

        let mut config_value = lower_keys_value(config_value);
        apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    fn lock(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Directory holding `config.yaml`.
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Writes the current document to `config.yaml`.
    ///
    /// The file may contain account credentials, so on unix it is
    /// restricted to the owner.
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.lock())?;
        fs::write(&self.path, yaml)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)) {
                warn!(config_file = %self.path, error = %e, "Unable to restrict config file permissions");
            }
        }

        Ok(())
    }

    /// Sets the value at `path` (e.g. `&["host", "http_port"]`) and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.lock();
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Removes the value at `path` and saves. Missing paths are not an error.
    pub fn remove_value(&self, path: &[&str]) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Ok(());
        };
        {
            let mut data = self.lock();
            let mut current = &mut *data;
            for key in parents {
                match current {
                    Value::Mapping(map) => {
                        match map.get_mut(Value::String(key.to_lowercase())) {
                            Some(next) => current = next,
                            None => return Ok(()),
                        }
                    }
                    _ => return Ok(()),
                }
            }
            if let Value::Mapping(map) = current {
                map.remove(Value::String(last.to_lowercase()));
            }
        }
        self.save()
    }

    /// Returns the value at `path`, or an error when the path does not exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.lock();
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            match current {
                Value::Mapping(map) => match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                },
                _ => return Err(anyhow!("Path {} is not a mapping", path[..i].join("."))),
            }
        }
        Ok(current.clone())
    }

    /// Returns the string at `path`, `None` when absent or empty.
    pub fn get_string(&self, path: &[&str]) -> Option<String> {
        match self.get_value(path) {
            Ok(Value::String(s)) if !s.is_empty() => Some(s),
            Ok(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    /// HTTP port of the local relay (default 9999).
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!(port = %n, "Invalid HTTP port, using default {}", DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!(port = %s, "Invalid HTTP port, using default {}", DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    impl_usize_config!(
        get_request_timeout_secs,
        set_request_timeout_secs,
        &["host", "request_timeout_secs"],
        DEFAULT_REQUEST_TIMEOUT_SECS
    );

    impl_usize_config!(
        get_max_connections,
        set_max_connections,
        &["host", "max_connections"],
        DEFAULT_MAX_CONNECTIONS
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    /// Minimum log level name (`TRACE` .. `ERROR`).
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    if data.is_null() {
        *data = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Node at {} is not a mapping", first));
    };
    let key = Value::String(first.to_lowercase());
    if rest.is_empty() {
        map.insert(key, value);
        return Ok(());
    }
    let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
    set_value_internal(entry, rest, value)
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value =
                serde_yaml::from_str::<Value>(&value).unwrap_or(Value::String(value.clone()));
            if let Err(e) = set_value_internal(config, &key_path, yaml_value) {
                warn!(variable = %key, error = %e, "Ignoring environment override");
            }
        }
    }
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        other => other,
    }
}

/// Recursively merges `external` into `default`: mappings are merged key by
/// key, scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
