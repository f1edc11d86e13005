//! Process-lifetime store for auxiliary carrier credentials.
//!
//! Credentials such as J&T phone suffixes are never written to the database.
//! The driver creates one [`SessionContext`], hands it to the orchestrator,
//! and everything in it is gone when the process exits.

use std::time::Duration;

use moka::sync::Cache;

use crate::carriers::AuxCredential;
use crate::config::SessionConfig;

const MAX_CREDENTIALS: u64 = 10_000;

#[derive(Clone)]
pub struct SessionContext {
    credentials: Cache<String, AuxCredential>,
}

impl SessionContext {
    /// Credentials live until the process exits or they are replaced.
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    /// Credentials are forgotten `ttl` after they were remembered.
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder().max_capacity(MAX_CREDENTIALS);
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            credentials: builder.build(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::with_ttl(config.credential_ttl_secs.map(Duration::from_secs))
    }

    pub fn remember(&self, tracking_code: &str, credential: AuxCredential) {
        self.credentials.insert(tracking_code.to_string(), credential);
    }

    pub fn credential(&self, tracking_code: &str) -> Option<AuxCredential> {
        self.credentials.get(tracking_code)
    }

    pub fn forget(&self, tracking_code: &str) {
        self.credentials.invalidate(tracking_code);
    }

    /// Re-keys a credential after a tracking code was edited.
    pub fn rename(&self, from: &str, to: &str) {
        if from == to {
            return;
        }
        if let Some(credential) = self.credentials.remove(from) {
            self.credentials.insert(to.to_string(), credential);
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
