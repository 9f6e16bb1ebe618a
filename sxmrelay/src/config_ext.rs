//! SiriusXM section of the configuration
//!
//! Adds account and session accessors to [`sxmconfig::Config`]:
//!
//! ```yaml
//! accounts:
//!   siriusxm:
//!     username: me@example.com
//!     password: secret
//!     region: US
//!     auth:
//!       last_auth_time: 1700000000
//!       cookies:
//!         - name: SXMDATA
//!           value: ...
//! ```
//!
//! Cookies are stored as a list since mapping keys are lowercased when the
//! configuration is loaded.

use crate::models::{Credentials, Region};
use crate::session::{SessionSnapshot, SessionStore};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sxmconfig::Config;

const ACCOUNT: [&str; 2] = ["accounts", "siriusxm"];

fn path<'a>(tail: &[&'a str]) -> Vec<&'a str> {
    ACCOUNT.iter().copied().chain(tail.iter().copied()).collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    last_auth_time: Option<i64>,
    #[serde(default)]
    cookies: Vec<StoredCookie>,
}

impl From<&SessionSnapshot> for StoredSession {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            last_auth_time: snapshot.last_auth_time,
            cookies: snapshot
                .cookies
                .iter()
                .map(|(name, value)| StoredCookie {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

impl From<StoredSession> for SessionSnapshot {
    fn from(stored: StoredSession) -> Self {
        Self {
            last_auth_time: stored.last_auth_time,
            cookies: stored
                .cookies
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect(),
        }
    }
}

/// Extension trait giving [`Config`] SiriusXM accessors
///
/// ```rust,ignore
/// use sxmrelay::SiriusXmConfigExt;
///
/// let credentials = config.get_siriusxm_credentials()?;
/// let region = config.get_siriusxm_region()?;
/// ```
pub trait SiriusXmConfigExt {
    fn get_siriusxm_username(&self) -> Result<String>;
    fn set_siriusxm_username(&self, username: &str) -> Result<()>;
    fn get_siriusxm_password(&self) -> Result<String>;
    fn set_siriusxm_password(&self, password: &str) -> Result<()>;

    /// Username and password, failing when either is missing
    fn get_siriusxm_credentials(&self) -> Result<Credentials>;

    /// Account region, `US` when unset
    fn get_siriusxm_region(&self) -> Result<Region>;
    fn set_siriusxm_region(&self, region: Region) -> Result<()>;

    /// Saved session, `None` when nothing was saved
    fn get_siriusxm_auth_state(&self) -> Result<Option<SessionSnapshot>>;
    fn set_siriusxm_auth_state(&self, snapshot: &SessionSnapshot) -> Result<()>;
    fn clear_siriusxm_auth_state(&self) -> Result<()>;
}

impl SiriusXmConfigExt for Config {
    fn get_siriusxm_username(&self) -> Result<String> {
        self.get_string(&path(&["username"]))
            .ok_or_else(|| anyhow!("SiriusXM username not configured"))
    }

    fn set_siriusxm_username(&self, username: &str) -> Result<()> {
        self.set_value(&path(&["username"]), Value::String(username.to_string()))
    }

    fn get_siriusxm_password(&self) -> Result<String> {
        self.get_string(&path(&["password"]))
            .ok_or_else(|| anyhow!("SiriusXM password not configured"))
    }

    fn set_siriusxm_password(&self, password: &str) -> Result<()> {
        self.set_value(&path(&["password"]), Value::String(password.to_string()))
    }

    fn get_siriusxm_credentials(&self) -> Result<Credentials> {
        Ok(Credentials::new(
            self.get_siriusxm_username()?,
            self.get_siriusxm_password()?,
        ))
    }

    fn get_siriusxm_region(&self) -> Result<Region> {
        match self.get_string(&path(&["region"])) {
            Some(region) => Ok(region.parse()?),
            None => Ok(Region::Us),
        }
    }

    fn set_siriusxm_region(&self, region: Region) -> Result<()> {
        self.set_value(&path(&["region"]), Value::String(region.to_string()))
    }

    fn get_siriusxm_auth_state(&self) -> Result<Option<SessionSnapshot>> {
        match self.get_value(&path(&["auth"])) {
            Ok(Value::Null) | Err(_) => Ok(None),
            Ok(value) => {
                let stored: StoredSession = serde_yaml::from_value(value)?;
                Ok(Some(stored.into()))
            }
        }
    }

    fn set_siriusxm_auth_state(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let stored = StoredSession::from(snapshot);
        self.set_value(&path(&["auth"]), serde_yaml::to_value(&stored)?)
    }

    fn clear_siriusxm_auth_state(&self) -> Result<()> {
        self.remove_value(&path(&["auth"]))
    }
}

impl SessionStore for Config {
    fn load_session(&self) -> Result<Option<SessionSnapshot>> {
        self.get_siriusxm_auth_state()
    }

    fn save_session(&self, snapshot: &SessionSnapshot) -> Result<()> {
        self.set_siriusxm_auth_state(snapshot)
    }
}
