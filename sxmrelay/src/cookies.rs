//! Cookie jar for the SiriusXM REST session.
//!
//! Upstream signals authentication purely through cookies:
//! - `SXMDATA` present means logged in; its URL-encoded JSON carries `gupId`
//! - `AWSALB` and `JSESSIONID` together mean the session is authenticated
//! - `SXMAKTOKEN` holds the bearer token as `token=<value>,<attrs>`
//!
//! The jar is a plain map so it can be staged, compared and persisted.

use serde_json::Value;
use std::collections::BTreeMap;

pub const SESSION_DATA_COOKIE: &str = "SXMDATA";
pub const LOAD_BALANCER_COOKIE: &str = "AWSALB";
pub const SESSION_ID_COOKIE: &str = "JSESSIONID";
pub const AUTH_TOKEN_COOKIE: &str = "SXMAKTOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieStore {
    cookies: BTreeMap<String, String>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(cookies: BTreeMap<String, String>) -> Self {
        let mut store = Self::new();
        store.merge(cookies);
        store
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.cookies.clone()
    }

    /// Sets a cookie; an empty value deletes it.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        if value.is_empty() {
            self.cookies.remove(&name);
        } else {
            self.cookies.insert(name, value);
        }
    }

    pub fn merge<I>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in cookies {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn is_logged_in(&self) -> bool {
        self.contains(SESSION_DATA_COOKIE)
    }

    pub fn is_session_authenticated(&self) -> bool {
        self.contains(LOAD_BALANCER_COOKIE) && self.contains(SESSION_ID_COOKIE)
    }

    /// Bearer token carried by `SXMAKTOKEN`.
    pub fn bearer_token(&self) -> Option<String> {
        let raw = self.get(AUTH_TOKEN_COOKIE)?;
        let (_, rest) = raw.split_once('=')?;
        let token = rest.split(',').next().unwrap_or_default().trim();
        (!token.is_empty()).then(|| token.to_string())
    }

    /// Account id (`gupId`) embedded in `SXMDATA`.
    pub fn account_id(&self) -> Option<String> {
        let raw = self.get(SESSION_DATA_COOKIE)?;
        let decoded = urlencoding::decode(raw).ok()?;
        let data: Value = serde_json::from_str(&decoded).ok()?;
        data.get("gupId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// `Cookie` request header value, `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers() {
        let mut jar = CookieStore::new();
        assert!(!jar.is_logged_in());
        jar.insert(SESSION_DATA_COOKIE, "x");
        assert!(jar.is_logged_in());
        assert!(!jar.is_session_authenticated());
        jar.insert(LOAD_BALANCER_COOKIE, "lb");
        assert!(!jar.is_session_authenticated());
        jar.insert(SESSION_ID_COOKIE, "sid");
        assert!(jar.is_session_authenticated());
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut jar = CookieStore::new();
        jar.insert(AUTH_TOKEN_COOKIE, "token=abc123,expires=1520000000");
        assert_eq!(jar.bearer_token().as_deref(), Some("abc123"));

        jar.insert(AUTH_TOKEN_COOKIE, "token=a=b");
        assert_eq!(jar.bearer_token().as_deref(), Some("a=b"));

        jar.insert(AUTH_TOKEN_COOKIE, "novalue");
        assert_eq!(jar.bearer_token(), None);
    }

    #[test]
    fn test_account_id_from_encoded_json() {
        let mut jar = CookieStore::new();
        jar.insert(SESSION_DATA_COOKIE, "%7B%22gupId%22%3A%22GUP-42%22%7D");
        assert_eq!(jar.account_id().as_deref(), Some("GUP-42"));

        jar.insert(SESSION_DATA_COOKIE, "not-json");
        assert_eq!(jar.account_id(), None);
    }

    #[test]
    fn test_empty_value_deletes_and_header() {
        let mut jar = CookieStore::new();
        assert_eq!(jar.header_value(), None);
        jar.insert("B", "2");
        jar.insert("A", "1");
        assert_eq!(jar.header_value().as_deref(), Some("A=1; B=2"));
        jar.insert("A", "");
        assert_eq!(jar.header_value().as_deref(), Some("B=2"));
    }
}
