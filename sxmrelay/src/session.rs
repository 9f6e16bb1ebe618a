//! Session lifecycle.
//!
//! [`SessionManager`] owns the cookie jar, the rotating bearer tokens and
//! the consecutive segment failure counter. Login and session resumption
//! are single-flight: concurrent callers wait on one gate and re-check the
//! state once they hold it, so a burst of failures triggers one upstream
//! authentication instead of one per request.
//!
//! Both operations stage cookies on a copy of the jar and commit only when
//! the whole exchange succeeded, leaving the previous state untouched on
//! failure.

use crate::api::{AuthParams, UpstreamApi};
use crate::clock::Clock;
use crate::cookies::CookieStore;
use crate::error::{Result, SiriusXmError};
use crate::models::{self, Credentials, Region};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Number of bearer tokens kept in rotation
pub const MAX_TOKENS: usize = 5;

/// Account id used when neither the session cookie nor the login answer
/// carries one
pub const DEFAULT_GUP_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Timestamped bearer tokens, oldest evicted past [`MAX_TOKENS`].
#[derive(Debug, Clone, Default)]
pub struct TokenRing {
    entries: BTreeMap<DateTime<Utc>, String>,
}

impl TokenRing {
    pub fn push(&mut self, at: DateTime<Utc>, token: impl Into<String>) {
        self.entries.insert(at, token.into());
        while self.entries.len() > MAX_TOKENS {
            self.entries.pop_first();
        }
    }

    /// Most recently issued token.
    pub fn current(&self) -> Option<&str> {
        self.entries.last_key_value().map(|(_, t)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Persistable part of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    /// Unix seconds of the last successful authentication
    #[serde(default)]
    pub last_auth_time: Option<i64>,
}

/// Where session snapshots survive restarts.
///
/// Failures are logged by the session and never abort authentication.
pub trait SessionStore: Send + Sync {
    fn load_session(&self) -> anyhow::Result<Option<SessionSnapshot>>;
    fn save_session(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct SessionState {
    cookies: CookieStore,
    tokens: TokenRing,
    account_id: Option<String>,
    last_auth: Option<DateTime<Utc>>,
    segment_errors: u32,
    /// Bumped on every committed authentication
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            cookies: self.cookies.to_map(),
            last_auth_time: self.last_auth.map(|t| t.timestamp()),
        }
    }

    fn commit(&mut self, cookies: CookieStore, token: String, account: Option<String>, now: DateTime<Utc>) {
        self.cookies = cookies;
        self.tokens.push(now, token);
        if account.is_some() {
            self.account_id = account;
        }
        self.last_auth = Some(match self.last_auth {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        self.segment_errors = 0;
        self.epoch += 1;
    }
}

pub struct SessionManager {
    api: Arc<UpstreamApi>,
    credentials: Credentials,
    region: Region,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn SessionStore>>,
    refresh_interval: Duration,
    error_threshold: u32,
    state: Mutex<SessionState>,
    gate: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        api: Arc<UpstreamApi>,
        credentials: Credentials,
        region: Region,
        clock: Arc<dyn Clock>,
        refresh_interval: Duration,
        error_threshold: u32,
    ) -> Self {
        Self {
            api,
            credentials,
            region,
            clock,
            store: None,
            refresh_interval,
            error_threshold,
            state: Mutex::new(SessionState::default()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Attaches a snapshot store and restores the saved session from it.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        match store.load_session() {
            Ok(Some(snapshot)) => {
                info!(cookies = snapshot.cookies.len(), "Restoring saved SiriusXM session");
                self.restore(snapshot);
            }
            Ok(None) => debug!("No saved SiriusXM session"),
            Err(e) => warn!(error = %e, "Unable to load saved SiriusXM session"),
        }
        self.store = Some(store);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the in-memory session with a snapshot.
    pub fn restore(&self, snapshot: SessionSnapshot) {
        let cookies = CookieStore::from_map(snapshot.cookies);
        let last_auth = snapshot
            .last_auth_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single());

        let mut state = self.lock();
        state.tokens = TokenRing::default();
        if let Some(token) = cookies.bearer_token() {
            state.tokens.push(last_auth.unwrap_or_else(|| self.clock.now()), token);
        }
        state.account_id = cookies.account_id();
        state.cookies = cookies;
        state.last_auth = last_auth;
        state.segment_errors = 0;
        state.epoch += 1;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    fn persist(&self, snapshot: &SessionSnapshot) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_session(snapshot) {
                warn!(error = %e, "Unable to persist SiriusXM session");
            }
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock().cookies.is_logged_in()
    }

    pub fn is_session_authenticated(&self) -> bool {
        self.lock().cookies.is_session_authenticated()
    }

    /// True when no authentication happened yet, the last one is older than
    /// the refresh interval, or segment failures reached the threshold.
    pub fn should_refresh(&self) -> bool {
        let state = self.lock();
        self.needs_refresh(&state)
    }

    fn needs_refresh(&self, state: &SessionState) -> bool {
        let Some(last) = state.last_auth else {
            return true;
        };
        let age = (self.clock.now() - last).num_milliseconds();
        age > self.refresh_interval.as_millis() as i64 || state.segment_errors >= self.error_threshold
    }

    fn is_ready(&self) -> bool {
        let state = self.lock();
        state.cookies.is_logged_in()
            && state.cookies.is_session_authenticated()
            && !self.needs_refresh(&state)
    }

    /// Latest bearer token, falling back to the cookie jar.
    pub fn current_token(&self) -> Option<String> {
        let state = self.lock();
        state
            .tokens
            .current()
            .map(str::to_string)
            .or_else(|| state.cookies.bearer_token())
    }

    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    /// Account id, or [`DEFAULT_GUP_ID`] when none could be derived.
    pub fn account_id(&self) -> String {
        let state = self.lock();
        state
            .account_id
            .clone()
            .or_else(|| state.cookies.account_id())
            .unwrap_or_else(|| DEFAULT_GUP_ID.to_string())
    }

    pub fn last_auth_time(&self) -> Option<DateTime<Utc>> {
        self.lock().last_auth
    }

    /// Authentication generation; changes whenever a login or resume commits.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.lock().cookies.header_value()
    }

    /// Merges cookies set by a non-authentication REST answer.
    pub fn absorb_cookies(&self, cookies: Vec<(String, String)>) {
        if !cookies.is_empty() {
            self.lock().cookies.merge(cookies);
        }
    }

    /// Stream host credentials for the current session.
    pub fn auth_params(&self) -> Result<AuthParams> {
        let token = self
            .current_token()
            .ok_or_else(|| SiriusXmError::missing("bearer token"))?;
        Ok(AuthParams {
            token,
            gup_id: self.account_id(),
        })
    }

    /// Counts a failed segment fetch and returns the new count.
    pub fn record_segment_failure(&self) -> u32 {
        let mut state = self.lock();
        state.segment_errors += 1;
        state.segment_errors
    }

    pub fn reset_segment_errors(&self) {
        self.lock().segment_errors = 0;
    }

    pub fn segment_errors(&self) -> u32 {
        self.lock().segment_errors
    }

    pub fn error_threshold(&self) -> u32 {
        self.error_threshold
    }

    /// Makes sure a usable, fresh session exists.
    pub async fn ensure_authenticated(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let _guard = self.gate.lock().await;
        if self.is_ready() {
            return Ok(());
        }
        self.authenticate_locked().await
    }

    /// Logs in with the account credentials.
    pub async fn login(&self) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.login_locked().await
    }

    /// Resumes the session, logging in first when needed.
    pub async fn authenticate(&self) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.authenticate_locked().await
    }

    /// Re-authenticates unless another caller already did so since
    /// `seen_epoch` was read.
    pub async fn force_reauthenticate(&self, seen_epoch: u64) -> Result<()> {
        let _guard = self.gate.lock().await;
        if self.epoch() != seen_epoch {
            debug!("Session already renewed by a concurrent caller");
            return Ok(());
        }
        self.authenticate_locked().await
    }

    async fn login_locked(&self) -> Result<()> {
        info!(user = %self.credentials.username, region = %self.region, "Logging in to SiriusXM");

        let body = models::login_request(&self.credentials, self.region);
        let header = self.cookie_header();
        let reply = self
            .api
            .post_module("modify/authentication", &body, header.as_deref())
            .await?;

        let status = models::module_status(&reply.body)?;
        if status != 1 {
            let (code, message) =
                models::first_message(&reply.body).unwrap_or((status, "login rejected".to_string()));
            warn!(status, code, "SiriusXM login rejected");
            return Err(SiriusXmError::UpstreamLogic { code, message });
        }

        let mut staged = self.lock().cookies.clone();
        staged.merge(reply.cookies);

        if !staged.is_logged_in() {
            warn!("Login answer did not set the session data cookie");
            return Err(SiriusXmError::missing("session data cookie"));
        }
        let token = staged
            .bearer_token()
            .ok_or_else(|| SiriusXmError::missing("bearer token"))?;
        let account = staged
            .account_id()
            .or_else(|| models::find_account_id(&reply.body));
        if account.is_none() {
            warn!("No account id in login answer, using default");
        }

        let now = self.clock.now();
        let snapshot = {
            let mut state = self.lock();
            state.commit(staged, token, account, now);
            state.snapshot()
        };
        self.persist(&snapshot);
        info!("SiriusXM login succeeded");
        Ok(())
    }

    async fn authenticate_locked(&self) -> Result<()> {
        if !self.is_logged_in() {
            self.login_locked().await?;
        }

        info!("Resuming SiriusXM session");
        let body = models::resume_request(self.region);
        let header = self.cookie_header();
        let reply = self
            .api
            .post_module("resume?OAtrial=false", &body, header.as_deref())
            .await?;

        let status = models::module_status(&reply.body)?;
        if status != 1 {
            let (code, message) =
                models::first_message(&reply.body).unwrap_or((status, "resume rejected".to_string()));
            warn!(status, code, "SiriusXM session resume rejected");
            return Err(SiriusXmError::UpstreamLogic { code, message });
        }

        let mut staged = self.lock().cookies.clone();
        staged.merge(reply.cookies);

        if !staged.is_session_authenticated() {
            warn!("Resume answer did not set the session cookies");
            return Err(SiriusXmError::missing("session cookies"));
        }
        let token = staged
            .bearer_token()
            .ok_or_else(|| SiriusXmError::missing("bearer token"))?;
        let account = staged.account_id();

        let now = self.clock.now();
        let snapshot = {
            let mut state = self.lock();
            state.commit(staged, token, account, now);
            state.snapshot()
        };
        self.persist(&snapshot);
        info!("SiriusXM session authenticated");
        Ok(())
    }
}
