use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::poller::PollOptions;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer token slot shared between a session and the backends built from it.
/// Every clone sees the same value.
#[derive(Debug, Clone, Default)]
pub struct Credential(Arc<RwLock<Option<String>>>);

impl Credential {
    pub fn new(token: Option<String>) -> Self {
        Self(Arc::new(RwLock::new(token)))
    }

    pub fn get(&self) -> Option<String> {
        match self.0.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, token: Option<String>) -> Option<String> {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, token)
    }
}

/// Connection and credential state for one client process.
///
/// Created once at startup with `init` and handed explicitly to the backend
/// and to the analysis flow. `teardown` drops the credential (logout), which
/// also stops backends built with `HttpBackend::from_session` from sending it.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_base: String,
    pub request_timeout: Duration,
    pub poll: PollOptions,
    token: Credential,
}

impl Session {
    pub fn init(config: &Config) -> Self {
        let defaults = PollOptions::default();
        let poll = PollOptions {
            timeout: config
                .poll
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            interval: config
                .poll
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
        };
        let session = Self {
            api_base: config.api_base().to_string(),
            request_timeout: config
                .api
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            poll,
            token: Credential::new(config.api.token.clone().filter(|t| !t.trim().is_empty())),
        };
        debug!(api_base = %session.api_base, authenticated = session.is_authenticated(), "session initialised");
        session
    }

    pub fn token(&self) -> Option<String> {
        self.token.get()
    }

    /// Handle to the live token, for backends that must observe login/logout.
    pub fn credential(&self) -> Credential {
        self.token.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.get().is_some()
    }

    /// Store a token obtained from `POST /auth/login`.
    pub fn set_token(&self, token: String) {
        self.token.replace(Some(token));
        debug!("session token updated");
    }

    pub fn teardown(&mut self) {
        if self.token.replace(None).is_some() {
            debug!("session token cleared");
        }
    }
}
