//! Authentication gates in front of settings pages and writes.
//!
//! A settings block asks its gate whether a request may go ahead. When the
//! gate is inactive the block falls back to a per-block password field
//! instead.

use std::time::Duration;

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::request::{FormRequest, Method};
use crate::session::SessionManager;

/// Path of the login page that denials redirect to.
pub const LOGIN_PATH: &str = "/login";

/// Paths that never require a session. Entries ending in `/` match as
/// prefixes.
pub const DEFAULT_WHITELIST: &[&str] = &["/login", "/logout", "/static/", "/favicon.ico"];

/// Result of asking a gate about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Reject; the client should be sent to `redirect`.
    Deny { redirect: String },
}

impl GateDecision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Request gate consulted by settings blocks and page routes.
pub trait AuthGate: Send + Sync {
    /// Whether the gate is enforcing anything. Inactive gates leave
    /// protection to the block's fallback password.
    fn is_active(&self) -> bool;

    /// Decide whether `request` may proceed.
    fn require(&self, request: &FormRequest) -> GateDecision;
}

/// A gate that is never active.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGate;

impl AuthGate for DisabledGate {
    fn is_active(&self) -> bool {
        false
    }

    fn require(&self, _request: &FormRequest) -> GateDecision {
        GateDecision::Proceed
    }
}

/// Login credentials for the UI.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// [`SessionGate`] settings.
#[derive(Debug, Clone)]
pub struct SessionGateConfig {
    pub enabled: bool,
    /// Let every `GET` through and only guard writes.
    pub post_only_lockdown: bool,
    /// Extra whitelisted paths on top of [`DEFAULT_WHITELIST`].
    pub whitelist: Vec<String>,
    pub credentials: Option<Credentials>,
    /// `None` disables idle expiry.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            post_only_lockdown: false,
            whitelist: Vec::new(),
            credentials: None,
            idle_timeout: Some(crate::session::DEFAULT_IDLE_TIMEOUT),
        }
    }
}

/// Session-cookie gate with a single user.
#[derive(Debug)]
pub struct SessionGate {
    enabled: bool,
    post_only_lockdown: bool,
    whitelist: Vec<String>,
    credentials: Option<Credentials>,
    sessions: SessionManager,
}

impl SessionGate {
    #[must_use]
    pub fn new(config: SessionGateConfig) -> Self {
        let mut whitelist: Vec<String> = DEFAULT_WHITELIST.iter().map(|p| (*p).to_owned()).collect();
        whitelist.extend(config.whitelist);
        if config.enabled && config.credentials.is_none() {
            warn!("session gate enabled without credentials, nobody can log in");
        }
        Self {
            enabled: config.enabled,
            post_only_lockdown: config.post_only_lockdown,
            whitelist,
            credentials: config.credentials,
            sessions: SessionManager::new(config.idle_timeout),
        }
    }

    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.whitelist.iter().any(|entry| {
            if entry.ends_with('/') {
                path.starts_with(entry.as_str())
            } else {
                path == entry
            }
        })
    }

    /// Check credentials and open a session. Returns the session token.
    pub fn login(&self, user: &str, password: &str) -> Option<String> {
        let Some(creds) = &self.credentials else {
            warn!(user, "login attempted with no credentials configured");
            return None;
        };
        let user_ok = creds.user.as_bytes().ct_eq(user.as_bytes());
        let pass_ok = creds.password.as_bytes().ct_eq(password.as_bytes());
        if bool::from(user_ok & pass_ok) {
            info!(user, "login succeeded");
            Some(self.sessions.create_session())
        } else {
            warn!(user, "login failed");
            None
        }
    }

    pub fn logout(&self) {
        self.sessions.clear();
        info!("logged out");
    }

    /// Whether `token` names the live session.
    pub fn validate(&self, token: Option<&str>) -> bool {
        token.is_some_and(|t| self.sessions.validate(t))
    }
}

/// `/login?next=<path>` for a denied request to `path`.
pub fn login_redirect(path: &str) -> String {
    format!("{LOGIN_PATH}?next={}", urlencoding::encode(path))
}

impl AuthGate for SessionGate {
    fn is_active(&self) -> bool {
        self.enabled
    }

    fn require(&self, request: &FormRequest) -> GateDecision {
        if !self.enabled || self.is_whitelisted(request.path()) {
            return GateDecision::Proceed;
        }
        if self.post_only_lockdown && request.method() == Method::Get {
            return GateDecision::Proceed;
        }
        if self.validate(request.session()) {
            GateDecision::Proceed
        } else {
            GateDecision::Deny {
                redirect: login_redirect(request.path()),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gate(post_only_lockdown: bool) -> SessionGate {
        SessionGate::new(SessionGateConfig {
            enabled: true,
            post_only_lockdown,
            whitelist: vec!["/health".to_owned()],
            credentials: Some(Credentials {
                user: "admin".to_owned(),
                password: "hunter2".to_owned(),
            }),
            ..SessionGateConfig::default()
        })
    }

    #[test]
    fn disabled_gates_let_everything_through() {
        assert!(!DisabledGate.is_active());
        assert!(DisabledGate.require(&FormRequest::post("/hydro/update")).is_proceed());

        let off = SessionGate::new(SessionGateConfig::default());
        assert!(!off.is_active());
        assert!(off.require(&FormRequest::post("/hydro/update")).is_proceed());
    }

    #[test]
    fn missing_session_redirects_to_login() {
        let gate = gate(false);
        assert_eq!(
            gate.require(&FormRequest::get("/hydro")),
            GateDecision::Deny {
                redirect: "/login?next=%2Fhydro".to_owned()
            }
        );
    }

    #[test]
    fn whitelist_matches_exact_and_prefix() {
        let gate = gate(false);
        assert!(gate.require(&FormRequest::get("/login")).is_proceed());
        assert!(gate.require(&FormRequest::get("/static/app.css")).is_proceed());
        assert!(gate.require(&FormRequest::get("/health")).is_proceed());
        assert!(!gate.require(&FormRequest::get("/loginx")).is_proceed());
    }

    #[test]
    fn post_only_lockdown_guards_writes_only() {
        let gate = gate(true);
        assert!(gate.require(&FormRequest::get("/hydro")).is_proceed());
        assert!(!gate.require(&FormRequest::post("/hydro/update")).is_proceed());
    }

    #[test]
    fn login_session_and_logout() {
        let gate = gate(false);
        assert!(gate.login("admin", "wrong").is_none());
        assert!(gate.login("root", "hunter2").is_none());

        let token = gate.login("admin", "hunter2").unwrap();
        let request = FormRequest::post("/hydro/update").with_session(token.clone());
        assert!(gate.require(&request).is_proceed());

        gate.logout();
        assert!(!gate.require(&request).is_proceed());
        assert!(!gate.validate(Some(&token)));
    }

    #[test]
    fn no_credentials_means_no_login() {
        let gate = SessionGate::new(SessionGateConfig {
            enabled: true,
            ..SessionGateConfig::default()
        });
        assert!(gate.login("", "").is_none());
    }
}
