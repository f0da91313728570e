//! Authenticated session actor
//!
//! One [`AuthSession`] actor task owns the login state for a platform. Fetch
//! tasks hold cheap cloned handles and talk to it over an mpsc channel, so a
//! credential refresh is serialized with every other request for
//! credentials and no lock is held across a network call.
//!
//! ```text
//! ┌────────────┐  Acquire / Invalidate   ┌──────────────────────┐
//! │ fetch task │ ──────────────────────▶ │  session actor       │
//! │ fetch task │ ◀────────────────────── │  (state, creds, gen) │
//! │ fetch task │       oneshot reply     └──────────┬───────────┘
//! └────────────┘                                    │ login / persist
//!                                         Authenticator + Store
//! ```
//!
//! States move `LoggedOut → LoggingIn → Active → Expired → LoggingIn → …`.
//! A report of stale credentials whose generation is already superseded
//! returns the current credentials without logging in again. Requests that
//! queued up behind a failed login share its failure instead of each
//! attempting their own.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::metrics;
use crate::models::{Credentials, Platform};
use crate::storage::SharedStore;
use crate::utils::error::{AuthError, FetchError};

/// Default number of attempts per fetch call
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const COMMAND_BUFFER: usize = 32;

/// Performs the platform's login exchange
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Log in and return fresh credentials
    ///
    /// The returned `generation` is ignored; the session assigns its own.
    async fn login(&self) -> Result<Credentials, AuthError>;
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    Active,
    Expired,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoggedOut => "logged_out",
            Self::LoggingIn => "logging_in",
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub failure_count: u32,
    pub generation: u64,
}

enum Command {
    Acquire {
        reply: oneshot::Sender<Result<Credentials, AuthError>>,
    },
    Invalidate {
        stale_generation: u64,
        reply: oneshot::Sender<Result<Credentials, AuthError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Handle to a platform's session actor
#[derive(Clone)]
pub struct AuthSession {
    platform: Platform,
    tx: mpsc::Sender<Command>,
}

impl AuthSession {
    /// Spawn the actor task and return a handle to it
    ///
    /// The actor stops once every handle has been dropped.
    pub fn spawn(
        platform: Platform,
        authenticator: Arc<dyn Authenticator>,
        store: SharedStore,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor {
            platform,
            authenticator,
            store,
            state: SessionState::LoggedOut,
            credentials: None,
            generation: 0,
            failure_count: 0,
        };
        tokio::spawn(actor.run(rx));
        Self { platform, tx }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Current credentials, logging in first if necessary
    pub async fn acquire(&self) -> Result<Credentials, AuthError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Acquire { reply }).await?;
        rx.await.map_err(|_| AuthError::SessionClosed)?
    }

    /// Report that `stale` credentials were rejected and get fresh ones
    pub async fn invalidate(&self, stale: &Credentials) -> Result<Credentials, AuthError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Invalidate {
            stale_generation: stale.generation,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AuthError::SessionClosed)?
    }

    /// Current state, failure count and generation
    pub async fn snapshot(&self) -> Result<SessionSnapshot, AuthError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| AuthError::SessionClosed)
    }

    async fn send(&self, command: Command) -> Result<(), AuthError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AuthError::SessionClosed)
    }
}

struct SessionActor {
    platform: Platform,
    authenticator: Arc<dyn Authenticator>,
    store: SharedStore,
    state: SessionState,
    credentials: Option<Credentials>,
    generation: u64,
    failure_count: u32,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            let (result, reply) = match command {
                Command::Acquire { reply } => (self.acquire().await, reply),
                Command::Invalidate {
                    stale_generation,
                    reply,
                } => (self.invalidate(stale_generation).await, reply),
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                    continue;
                }
            };

            let failure = result.as_ref().err().map(ToString::to_string);
            let _ = reply.send(result);
            if let Some(reason) = failure {
                self.fail_pending(&mut rx, &reason);
            }
        }
        tracing::debug!(platform = %self.platform, "Session actor stopped");
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            generation: self.generation,
        }
    }

    /// Answer every request already queued with the login failure
    fn fail_pending(&self, rx: &mut mpsc::Receiver<Command>, reason: &str) {
        let mut shared = 0usize;
        while let Ok(command) = rx.try_recv() {
            match command {
                Command::Acquire { reply } | Command::Invalidate { reply, .. } => {
                    let _ = reply.send(Err(AuthError::LoginPending(reason.to_string())));
                    shared += 1;
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
            }
        }
        if shared > 0 {
            tracing::debug!(platform = %self.platform, shared, "Shared login failure with queued requests");
        }
    }

    async fn acquire(&mut self) -> Result<Credentials, AuthError> {
        if let Some(current) = self.active_credentials() {
            return Ok(current);
        }

        if self.state == SessionState::LoggedOut {
            self.state = SessionState::LoggingIn;
            if let Some(restored) = self.restore().await {
                return Ok(restored);
            }
        }
        self.login().await
    }

    async fn invalidate(&mut self, stale_generation: u64) -> Result<Credentials, AuthError> {
        if let Some(current) = self.active_credentials() {
            if current.generation != stale_generation {
                tracing::debug!(
                    platform = %self.platform,
                    stale_generation,
                    current_generation = current.generation,
                    "Credentials already refreshed"
                );
                return Ok(current);
            }
            self.state = SessionState::Expired;
            tracing::info!(platform = %self.platform, generation = current.generation, "Session expired");
        }
        self.login().await
    }

    fn active_credentials(&self) -> Option<Credentials> {
        match self.state {
            SessionState::Active => self.credentials.clone(),
            _ => None,
        }
    }

    /// Adopt credentials persisted by an earlier run
    async fn restore(&mut self) -> Option<Credentials> {
        match self.store.load_session(self.platform).await {
            Ok(Some(mut credentials)) => {
                self.generation += 1;
                credentials.generation = self.generation;
                self.credentials = Some(credentials.clone());
                self.state = SessionState::Active;
                tracing::info!(platform = %self.platform, "Restored persisted session");
                Some(credentials)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(platform = %self.platform, error = %e, "Failed to load persisted session");
                None
            }
        }
    }

    async fn login(&mut self) -> Result<Credentials, AuthError> {
        self.state = SessionState::LoggingIn;
        tracing::info!(platform = %self.platform, "Logging in");

        match self.authenticator.login().await {
            Ok(mut credentials) => {
                self.generation += 1;
                credentials.generation = self.generation;
                self.credentials = Some(credentials.clone());
                self.state = SessionState::Active;
                metrics::record_login(self.platform.as_str(), true);

                if let Err(e) = self.store.save_session(self.platform, &credentials).await {
                    tracing::warn!(platform = %self.platform, error = %e, "Failed to persist session");
                }

                tracing::info!(platform = %self.platform, generation = self.generation, "Logged in");
                Ok(credentials)
            }
            Err(e) => {
                self.failure_count += 1;
                self.credentials = None;
                self.state = SessionState::Expired;
                metrics::record_login(self.platform.as_str(), false);
                tracing::warn!(
                    platform = %self.platform,
                    failure_count = self.failure_count,
                    error = %e,
                    "Login failed"
                );
                Err(e)
            }
        }
    }
}

/// Run `request` with session credentials, re-logging in on `Unauthorized`
///
/// The first use of a fresh session counts as the first login. Every
/// `Unauthorized` response but the last triggers one refresh through the
/// session, so `max_attempts` rejected requests cost at most `max_attempts`
/// logins before the call gives up with [`FetchError::AuthRetriesExhausted`].
/// Any other outcome is returned as is.
pub async fn run_authorized<T, F, Fut>(
    session: &AuthSession,
    max_attempts: u32,
    mut request: F,
) -> Result<T, FetchError>
where
    F: FnMut(Credentials) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut credentials = session.acquire().await?;

    for attempt in 1..=max_attempts {
        match request(credentials.clone()).await {
            Err(FetchError::Unauthorized) if attempt < max_attempts => {
                tracing::debug!(
                    platform = %session.platform(),
                    attempt,
                    max_attempts,
                    "Request unauthorized, refreshing session"
                );
                credentials = session.invalidate(&credentials).await?;
            }
            Err(FetchError::Unauthorized) => break,
            other => return other,
        }
    }

    Err(FetchError::AuthRetriesExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Store};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingAuthenticator {
        logins: AtomicU32,
        fail: bool,
    }

    impl CountingAuthenticator {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                logins: AtomicU32::new(0),
                fail,
            })
        }

        fn count(&self) -> u32 {
            self.logins.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn login(&self) -> Result<Credentials, AuthError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail {
                return Err(AuthError::Rejected("checkpoint_required".into()));
            }
            Ok(Credentials {
                token: format!("csrf-{n}"),
                cookie: format!("sessionid={n}"),
                generation: 0,
            })
        }
    }

    fn session(auth: Arc<CountingAuthenticator>, store: Arc<MemoryStore>) -> AuthSession {
        AuthSession::spawn(Platform::Instagram, auth, store)
    }

    #[tokio::test]
    async fn test_first_use_logs_in_and_persists() {
        let auth = CountingAuthenticator::new(false);
        let store = Arc::new(MemoryStore::new());
        let session = session(auth.clone(), store.clone());

        assert_eq!(session.snapshot().await.unwrap().state, SessionState::LoggedOut);

        let credentials = session.acquire().await.unwrap();
        assert_eq!(credentials.token, "csrf-1");
        assert_eq!(auth.count(), 1);

        // Second acquire reuses the active credentials
        session.acquire().await.unwrap();
        assert_eq!(auth.count(), 1);

        let persisted = store.load_session(Platform::Instagram).await.unwrap().unwrap();
        assert_eq!(persisted.cookie, "sessionid=1");
        assert_eq!(session.snapshot().await.unwrap().state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_first_use_restores_persisted_credentials() {
        let auth = CountingAuthenticator::new(false);
        let store = Arc::new(MemoryStore::new());
        store
            .save_session(
                Platform::Instagram,
                &Credentials {
                    token: "saved".into(),
                    cookie: "sessionid=saved".into(),
                    generation: 0,
                },
            )
            .await
            .unwrap();

        let session = session(auth.clone(), store);
        let credentials = session.acquire().await.unwrap();
        assert_eq!(credentials.token, "saved");
        assert_eq!(auth.count(), 0);
    }

    #[tokio::test]
    async fn test_stale_invalidation_does_not_relogin() {
        let auth = CountingAuthenticator::new(false);
        let session = session(auth.clone(), Arc::new(MemoryStore::new()));

        let first = session.acquire().await.unwrap();

        // Two tasks report the same stale credentials
        let (a, b) = tokio::join!(session.invalidate(&first), session.invalidate(&first));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(auth.count(), 2);
        assert_eq!(a, b);
        assert_eq!(a.generation, first.generation + 1);
    }

    #[tokio::test]
    async fn test_failed_login_counts_and_expires() {
        let auth = CountingAuthenticator::new(true);
        let session = session(auth.clone(), Arc::new(MemoryStore::new()));

        assert!(session.acquire().await.is_err());
        assert!(session.acquire().await.is_err());

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Expired);
        assert_eq!(snapshot.failure_count, 2);
        assert_eq!(auth.count(), 2);
    }

    #[tokio::test]
    async fn test_retry_cap_on_restored_session() {
        let auth = CountingAuthenticator::new(false);
        let store = Arc::new(MemoryStore::new());
        store
            .save_session(
                Platform::Instagram,
                &Credentials {
                    token: "saved".into(),
                    cookie: "c".into(),
                    generation: 0,
                },
            )
            .await
            .unwrap();
        let session = session(auth.clone(), store);

        let requests = AtomicU32::new(0);
        let result: Result<(), FetchError> = run_authorized(&session, 3, |_| {
            requests.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Unauthorized) }
        })
        .await;

        assert!(matches!(
            result,
            Err(FetchError::AuthRetriesExhausted { attempts: 3 })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
        // No refresh after the final rejection
        assert_eq!(auth.count(), 2);
    }

    #[tokio::test]
    async fn test_retry_cap_on_fresh_session() {
        let auth = CountingAuthenticator::new(false);
        let session = session(auth.clone(), Arc::new(MemoryStore::new()));

        let requests = AtomicU32::new(0);
        let result: Result<(), FetchError> = run_authorized(&session, 3, |_| {
            requests.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Unauthorized) }
        })
        .await;

        assert!(matches!(
            result,
            Err(FetchError::AuthRetriesExhausted { attempts: 3 })
        ));
        assert_eq!(requests.load(Ordering::SeqCst), 3);
        assert_eq!(auth.count(), 3);
    }

    #[tokio::test]
    async fn test_queued_requests_share_failed_login() {
        struct SlowFailure(AtomicU32);

        #[async_trait]
        impl Authenticator for SlowFailure {
            async fn login(&self) -> Result<Credentials, AuthError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Err(AuthError::Rejected("checkpoint_required".into()))
            }
        }

        let auth = Arc::new(SlowFailure(AtomicU32::new(0)));
        let session = AuthSession::spawn(Platform::Instagram, auth.clone(), Arc::new(MemoryStore::new()));

        let (a, b, c, d) = tokio::join!(
            session.acquire(),
            session.acquire(),
            session.acquire(),
            session.acquire()
        );

        assert!(matches!(a, Err(AuthError::Rejected(_))));
        for queued in [b, c, d] {
            assert!(matches!(queued, Err(AuthError::LoginPending(_))));
        }
        assert_eq!(auth.0.load(Ordering::SeqCst), 1);
        assert_eq!(session.snapshot().await.unwrap().failure_count, 1);

        // A later use tries again
        assert!(session.acquire().await.is_err());
        assert_eq!(auth.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_refresh() {
        let auth = CountingAuthenticator::new(false);
        let session = session(auth.clone(), Arc::new(MemoryStore::new()));

        let result = run_authorized(&session, 3, |credentials| async move {
            if credentials.token == "csrf-1" {
                Err(FetchError::Unauthorized)
            } else {
                Ok(credentials.token)
            }
        })
        .await;

        assert_eq!(result.unwrap(), "csrf-2");
        assert_eq!(auth.count(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let auth = CountingAuthenticator::new(false);
        let session = session(auth.clone(), Arc::new(MemoryStore::new()));

        let requests = AtomicU32::new(0);
        let result: Result<(), FetchError> = run_authorized(&session, 3, |_| {
            requests.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::RateLimited) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::RateLimited)));
        assert_eq!(requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_failure_abandons_request() {
        let auth = CountingAuthenticator::new(true);
        let session = session(auth, Arc::new(MemoryStore::new()));

        let result: Result<(), FetchError> =
            run_authorized(&session, 3, |_| async { Ok(()) }).await;
        assert!(matches!(result, Err(FetchError::Login(_))));
    }
}
