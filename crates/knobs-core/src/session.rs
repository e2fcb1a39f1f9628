//! Single-session tracking for the settings UI.
//!
//! At most one session is live at a time: logging in again replaces the
//! previous session. Sessions expire after an idle period, measured from
//! the last successful validation.
//!
//! # Security model
//!
//! - Tokens are UUID v4 (122 bits of OS CSPRNG randomness) rendered as 32
//!   lowercase hex characters.
//! - Token comparison uses `subtle::ConstantTimeEq`.
//! - An expired session is dropped the first time it is presented.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Default idle timeout: 36 hours.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(36 * 60 * 60);

#[derive(Debug)]
struct Session {
    token: String,
    last_seen: Instant,
}

/// Holds the one active session, if any.
#[derive(Debug)]
pub struct SessionManager {
    current: Mutex<Option<Session>>,
    idle_timeout: Option<Duration>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Some(DEFAULT_IDLE_TIMEOUT))
    }
}

impl SessionManager {
    /// Create a manager. `None` disables idle expiry.
    #[must_use]
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            current: Mutex::new(None),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Start a new session, replacing any existing one. Returns its token.
    pub fn create_session(&self) -> String {
        self.create_session_at(Instant::now())
    }

    fn create_session_at(&self, now: Instant) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_some() {
            info!("replacing active session");
        }
        *current = Some(Session {
            token: token.clone(),
            last_seen: now,
        });
        token
    }

    /// Check `token` against the active session and refresh it on success.
    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, Instant::now())
    }

    /// [`validate`](Self::validate) with an explicit clock reading.
    pub fn validate_at(&self, token: &str, now: Instant) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = current.as_mut() else {
            return false;
        };

        if let Some(timeout) = self.idle_timeout {
            if now.saturating_duration_since(session.last_seen) > timeout {
                info!("session expired after idle timeout");
                *current = None;
                return false;
            }
        }

        if !bool::from(session.token.as_bytes().ct_eq(token.as_bytes())) {
            debug!("session token mismatch");
            return false;
        }

        session.last_seen = now;
        true
    }

    /// Whether a session is currently held (expired or not).
    pub fn has_session(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the active session.
    pub fn clear(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
