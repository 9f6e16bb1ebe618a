//! Data structures for the SiriusXM API
//!
//! Typed views over the parts of the upstream JSON the relay relies on, plus
//! builders for the request envelopes it sends.

use crate::error::{Result, SiriusXmError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Client version announced in `deviceInfo`
pub const APP_VERSION: &str = "3.1802.10011.0";

/// Account region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "CA")]
    Ca,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Ca => "CA",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = SiriusXmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "US" | "" => Ok(Region::Us),
            "CA" | "CANADA" => Ok(Region::Ca),
            other => Err(SiriusXmError::Config(anyhow::anyhow!(
                "Unknown region '{other}'"
            ))),
        }
    }
}

/// Account credentials. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Catalog entry
///
/// Missing or null fields decode as empty, as upstream leaves some of them
/// out for special channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Short identifier used in stream paths (e.g. `9450`, `siriushits1`)
    #[serde(rename = "channelId", default, deserialize_with = "deserialize_text")]
    pub id: String,
    /// Identifier used by the now-playing endpoint, empty for direct-only channels
    #[serde(rename = "channelGuid", default, deserialize_with = "deserialize_text")]
    pub guid: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub name: String,
    /// Dial position, kept as text since upstream mixes strings and numbers
    #[serde(
        rename = "siriusChannelNumber",
        default,
        deserialize_with = "deserialize_text"
    )]
    pub number: String,
    #[serde(rename = "isFavorite", default, deserialize_with = "deserialize_flag")]
    pub favorite: bool,
}

impl Channel {
    /// Numeric dial position, `None` when missing or not numeric.
    pub fn dial(&self) -> Option<u32> {
        self.number.trim().parse().ok()
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

/// Entry of `hlsAudioInfos` in a now-playing answer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HlsAudioInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: String,
    pub url: String,
}

/// Where a channel's variant playlist and segments live on the stream host.
///
/// `base_path` is the host-relative directory the playlist was resolved
/// from; `subdirectory` is the extra directory level of the variant entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPathState {
    pub playlist_url: String,
    pub base_path: Option<String>,
    pub subdirectory: Option<String>,
}

impl ChannelPathState {
    /// Host-relative directory holding the channel's segments.
    ///
    /// Uses `base_path[/subdirectory]` when a base is known, else the
    /// conventional `/AAC_Data/{channel}/{subdirectory}` layout.
    pub fn segment_dir(&self, channel_id: &str) -> Option<String> {
        let sub = self.subdirectory.as_deref().filter(|s| !s.is_empty());
        match (self.base_path.as_deref(), sub) {
            (Some(base), Some(sub)) => Some(format!("{}/{}", base.trim_end_matches('/'), sub)),
            (Some(base), None) => Some(base.trim_end_matches('/').to_string()),
            (None, Some(sub)) => Some(format!("/AAC_Data/{channel_id}/{sub}")),
            (None, None) => None,
        }
    }
}

fn device_info(region: Region) -> Value {
    json!({
        "osVersion": "Mac",
        "platform": "Web",
        "sxmAppVersion": APP_VERSION,
        "browser": "Safari",
        "browserVersion": "11.0.3",
        "appRegion": region.as_str(),
        "deviceModel": "K2WebClient",
        "clientDeviceId": "null",
        "player": "html5",
        "clientDeviceType": "web",
    })
}

/// Body of `modify/authentication`
pub fn login_request(credentials: &Credentials, region: Region) -> Value {
    json!({
        "moduleList": {
            "modules": [{
                "moduleRequest": {
                    "resultTemplate": "web",
                    "deviceInfo": device_info(region),
                    "standardAuth": {
                        "username": credentials.username,
                        "password": credentials.password,
                    },
                },
            }],
        },
    })
}

/// Body of `resume`
pub fn resume_request(region: Region) -> Value {
    json!({
        "moduleList": {
            "modules": [{
                "moduleRequest": {
                    "resultTemplate": "web",
                    "deviceInfo": device_info(region),
                },
            }],
        },
    })
}

/// Body of `get` for the channel listing
pub fn channel_listing_request() -> Value {
    json!({
        "moduleList": {
            "modules": [{
                "moduleArea": "Discovery",
                "moduleType": "ChannelListing",
                "moduleRequest": {
                    "consumeRequests": [],
                    "resultTemplate": "responsive",
                    "alerts": [],
                    "profileInfos": [],
                },
            }],
        },
    })
}

/// `ModuleListResponse.status`
pub fn module_status(body: &Value) -> Result<i64> {
    body.pointer("/ModuleListResponse/status")
        .and_then(Value::as_i64)
        .ok_or_else(|| SiriusXmError::decode("ModuleListResponse.status is missing"))
}

/// First `(code, message)` of `ModuleListResponse.messages`
pub fn first_message(body: &Value) -> Option<(i64, String)> {
    let message = body.pointer("/ModuleListResponse/messages/0")?;
    let code = message.get("code").and_then(Value::as_i64)?;
    let text = message
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, text))
}

/// Channels of a `get` channel-listing answer
pub fn parse_channels(body: &Value) -> Result<Vec<Channel>> {
    let channels = body
        .pointer("/ModuleListResponse/moduleList/modules/0/moduleResponse/contentData/channelListing/channels")
        .and_then(Value::as_array)
        .ok_or_else(|| SiriusXmError::decode("channel listing is missing"))?;

    Ok(channels
        .iter()
        .filter_map(|entry| match Channel::deserialize(entry) {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(error = %e, "Skipping malformed catalog entry");
                None
            }
        })
        .collect())
}

/// Variant list of a now-playing answer
pub fn parse_hls_infos(body: &Value) -> Result<Vec<HlsAudioInfo>> {
    let infos = body
        .pointer("/ModuleListResponse/moduleList/modules/0/moduleResponse/liveChannelData/hlsAudioInfos")
        .ok_or_else(|| SiriusXmError::decode("hlsAudioInfos is missing"))?;
    Ok(serde_json::from_value(infos.clone())?)
}

/// Depth-first search for a string `gupId` anywhere in a JSON document.
pub fn find_account_id(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            if let Some(Value::String(id)) = map.get("gupId") {
                if !id.is_empty() {
                    return Some(id.clone());
                }
            }
            map.values().find_map(find_account_id)
        }
        Value::Array(items) => items.iter().find_map(find_account_id),
        _ => None,
    }
}
