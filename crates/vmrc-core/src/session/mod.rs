//! Authenticated standing with the upstream console directory.
//!
//! [`SessionGate`] owns the process-wide session. Every privileged directory
//! call goes through [`SessionGate::ensure_authenticated`], which reuses the
//! live session or logs in again when the directory reports it expired.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::SessionError;

/// Service account used to log in to the directory.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
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

/// Opaque token identifying a live directory session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for placing on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Session operations offered by the upstream directory.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns whether the directory still honours `token`.
    async fn session_is_valid(&self, token: &SessionToken) -> Result<bool, SessionError>;

    /// Logs in and returns a new session token.
    async fn login(&self, credentials: &Credentials) -> Result<SessionToken, SessionError>;
}

/// Single-flight guard around the shared directory session.
///
/// The session is checked and, if needed, renewed while holding an async
/// mutex, so concurrent callers never see a half-established session and at
/// most one login is in flight. A failed login leaves no session cached and
/// the next caller tries again.
pub struct SessionGate {
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    current: Mutex<Option<SessionToken>>,
}

impl SessionGate {
    pub fn new(authenticator: Arc<dyn Authenticator>, credentials: Credentials) -> Self {
        Self {
            authenticator,
            credentials,
            current: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns a live session token, logging in if there is none or the
    /// directory no longer accepts the cached one.
    pub async fn ensure_authenticated(&self) -> Result<SessionToken, SessionError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if self.authenticator.session_is_valid(token).await? {
                return Ok(token.clone());
            }
            tracing::info!("Directory session expired, logging in again");
            *current = None;
        }

        let token = self
            .authenticator
            .login(&self.credentials)
            .await
            .inspect_err(|e| {
                tracing::error!(
                    "Directory login failed for {}: {e}",
                    self.credentials.username()
                )
            })?;
        tracing::info!("Logged in to directory as {}", self.credentials.username());
        *current = Some(token.clone());
        Ok(token)
    }

    /// Forgets the cached session if it is still `token`.
    ///
    /// Called when the directory rejects a token between the liveness check
    /// and the privileged call. A newer session installed by another caller
    /// is kept.
    pub async fn invalidate(&self, token: &SessionToken) {
        let mut current = self.current.lock().await;
        if current.as_ref() == Some(token) {
            tracing::debug!("Dropping rejected directory session");
            *current = None;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// In-memory directory session endpoint that counts logins.
    pub(crate) struct FakeAuthenticator {
        pub logins: AtomicUsize,
        pub checks: AtomicUsize,
        pub session_valid: AtomicBool,
        pub reject_login: AtomicBool,
    }

    impl FakeAuthenticator {
        pub(crate) fn new() -> Self {
            Self {
                logins: AtomicUsize::new(0),
                checks: AtomicUsize::new(0),
                session_valid: AtomicBool::new(true),
                reject_login: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Authenticator for FakeAuthenticator {
        async fn session_is_valid(&self, _token: &SessionToken) -> Result<bool, SessionError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.session_valid.load(Ordering::SeqCst))
        }

        async fn login(&self, credentials: &Credentials) -> Result<SessionToken, SessionError> {
            if self.reject_login.load(Ordering::SeqCst) {
                return Err(SessionError::Rejected("bad credentials".to_string()));
            }
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            self.session_valid.store(true, Ordering::SeqCst);
            Ok(SessionToken::new(format!("{}-{n}", credentials.username())))
        }
    }

    fn gate(auth: &Arc<FakeAuthenticator>) -> SessionGate {
        SessionGate::new(auth.clone(), Credentials::new("svc", "secret"))
    }

    #[tokio::test]
    async fn live_session_is_reused() {
        let auth = Arc::new(FakeAuthenticator::new());
        let gate = gate(&auth);

        let first = gate.ensure_authenticated().await.unwrap();
        for _ in 0..10 {
            assert_eq!(gate.ensure_authenticated().await.unwrap(), first);
        }

        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
        assert_eq!(auth.checks.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn expired_session_triggers_login() {
        let auth = Arc::new(FakeAuthenticator::new());
        let gate = gate(&auth);

        let first = gate.ensure_authenticated().await.unwrap();
        auth.session_valid.store(false, Ordering::SeqCst);
        let second = gate.ensure_authenticated().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(auth.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_login_is_reported_and_retried_later() {
        let auth = Arc::new(FakeAuthenticator::new());
        auth.reject_login.store(true, Ordering::SeqCst);
        let gate = gate(&auth);

        let err = gate.ensure_authenticated().await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected(_)));

        auth.reject_login.store(false, Ordering::SeqCst);
        assert!(gate.ensure_authenticated().await.is_ok());
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_login() {
        let auth = Arc::new(FakeAuthenticator::new());
        let gate = Arc::new(gate(&auth));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.ensure_authenticated().await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_new_login() {
        let auth = Arc::new(FakeAuthenticator::new());
        let gate = gate(&auth);

        let first = gate.ensure_authenticated().await.unwrap();
        gate.invalidate(&first).await;
        let second = gate.ensure_authenticated().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(auth.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_ignores_stale_token() {
        let auth = Arc::new(FakeAuthenticator::new());
        let gate = gate(&auth);

        let current = gate.ensure_authenticated().await.unwrap();
        gate.invalidate(&SessionToken::new("older")).await;

        assert_eq!(gate.ensure_authenticated().await.unwrap(), current);
        assert_eq!(auth.logins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let creds = Credentials::new("svc", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));

        let token = SessionToken::new("abc");
        assert_eq!(format!("{token:?}"), "SessionToken(<redacted>)");
    }
}
