//! Session lifecycle: restore, login, refresh and logout.
//!
//! `SessionStore` owns the in-memory session and mirrors the token pair and
//! profile into a `DurableStore`. Every change is published on a watch
//! channel so observers see intermediate states, including the optimistic
//! authenticated-without-profile state during a restore.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::api::ApiError;
use crate::models::{AccessToken, Credentials, TokenPair, UserProfile};

use super::storage::{keys, DurableStore};

/// The backend calls the session store depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<TokenPair>;

    /// Fetch the current user, sending `access_token` as the bearer credential.
    async fn me(&self, access_token: &str) -> Result<UserProfile>;

    async fn refresh(&self, refresh_token: &str) -> Result<AccessToken>;

    /// Set or clear the credential attached to subsequent requests.
    fn set_default_token(&self, token: Option<&str>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Anonymous,
    Restoring,
    Authenticated,
    Refreshing,
}

/// Snapshot of the session. Tokens are either both present or both absent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub phase: SessionPhase,
    pub is_authenticated: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub is_privileged: bool,
}

impl Session {
    /// True once the profile fetch has populated the user fields.
    pub fn has_profile(&self) -> bool {
        self.user_id.is_some()
    }

    /// True when nothing at all is held.
    pub fn is_anonymous(&self) -> bool {
        *self == Session::default()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("is_authenticated", &self.is_authenticated)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("is_privileged", &self.is_privileged)
            .finish()
    }
}

/// Message shown to the user when a login attempt fails. Transport
/// failures carry no server text and read as `Login failed`.
pub fn login_error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(api_err) => api_err
            .server_message()
            .unwrap_or_else(|| "Login failed".to_string()),
        None => "An unexpected error occurred".to_string(),
    }
}

/// Keeps the loading flag set until dropped, so a cancelled login does not
/// leave it set.
struct LoadingGuard(Arc<AtomicBool>);

impl LoadingGuard {
    fn start(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Relaxed);
        Self(Arc::clone(flag))
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

pub struct SessionStore<A, S> {
    api: A,
    storage: S,
    session: Session,
    loading: Arc<AtomicBool>,
    error: Option<String>,
    tx: watch::Sender<Session>,
}

impl<A: AuthApi, S: DurableStore> SessionStore<A, S> {
    /// Create an anonymous session. Call [`restore`](Self::restore) to pick
    /// up a session persisted by an earlier run.
    pub fn new(api: A, storage: S) -> Self {
        let (tx, _rx) = watch::channel(Session::default());
        Self {
            api,
            storage,
            session: Session::default(),
            loading: Arc::new(AtomicBool::new(false)),
            error: None,
            tx,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.access_token.as_deref()
    }

    /// True while a login request is in flight.
    pub fn loading(&self) -> bool {
        self.loading.load(Ordering::Relaxed)
    }

    /// Display message from the last failed login.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Observe every session change.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    fn publish(&self) {
        self.tx.send_replace(self.session.clone());
    }

    /// Durable write failures are logged and do not abort the action.
    fn persist(&mut self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(error = %e, key, "Failed to persist session entry");
        }
    }

    /// Restore a session persisted by an earlier run.
    ///
    /// Marks the session authenticated before the profile fetch resolves.
    /// A failed profile fetch clears everything. Returns whether the
    /// session ended up authenticated.
    pub async fn restore(&mut self) -> bool {
        let Some(access) = self.storage.get(keys::ACCESS) else {
            debug!("No stored session");
            return false;
        };
        let Some(refresh) = self.storage.get(keys::REFRESH) else {
            warn!("Stored session has no refresh token; clearing it");
            self.clear();
            return false;
        };

        self.session.phase = SessionPhase::Restoring;
        self.session.access_token = Some(access);
        self.session.refresh_token = Some(refresh);
        self.session.is_authenticated = true;
        self.publish();

        self.load_profile_and_refresh().await
    }

    /// Log in with `credentials`, then load the profile.
    ///
    /// On failure the display message is kept in [`error`](Self::error) and
    /// the original error is returned.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<()> {
        let _loading = LoadingGuard::start(&self.loading);
        self.error = None;

        match self.api.login(credentials).await {
            Ok(pair) => {
                info!(email = %credentials.email, "Login successful");
                self.set_tokens(&pair);
                if !self.load_profile_and_refresh().await {
                    warn!("Logged in but the session could not be established");
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Login failed");
                self.error = Some(login_error_message(&e));
                Err(e)
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    /// Any failure ends the session. Returns whether the session survived.
    pub async fn refresh(&mut self) -> bool {
        let Some(refresh_token) = self.session.refresh_token.clone() else {
            debug!("No refresh token held; clearing session");
            self.clear();
            return false;
        };

        self.session.phase = SessionPhase::Refreshing;
        self.publish();

        match self.api.refresh(&refresh_token).await {
            Ok(AccessToken { access }) => {
                self.persist(keys::ACCESS, &access);
                self.api.set_default_token(Some(&access));
                self.session.access_token = Some(access);
                self.session.phase = SessionPhase::Authenticated;
                self.publish();
                debug!("Access token refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed; clearing session");
                self.clear();
                false
            }
        }
    }

    /// Drop the session and wipe durable storage.
    pub fn logout(&mut self) {
        info!("Logging out");
        self.clear();
    }

    fn set_tokens(&mut self, pair: &TokenPair) {
        self.session.phase = SessionPhase::Restoring;
        self.session.access_token = Some(pair.access.clone());
        self.session.refresh_token = Some(pair.refresh.clone());
        self.session.is_authenticated = true;
        self.persist(keys::ACCESS, &pair.access);
        self.persist(keys::REFRESH, &pair.refresh);
        self.publish();
    }

    fn set_user_info(&mut self, profile: UserProfile) {
        self.persist(keys::ID, &profile.id);
        self.persist(keys::EMAIL, profile.email.as_deref().unwrap_or_default());
        self.persist(keys::NAME, profile.name.as_deref().unwrap_or_default());
        self.persist(keys::IS_STAFF, if profile.is_staff { "true" } else { "false" });

        self.session.user_id = Some(profile.id);
        self.session.email = profile.email;
        self.session.display_name = profile.name;
        self.session.is_privileged = profile.is_staff;
        self.session.phase = SessionPhase::Authenticated;
        self.publish();
    }

    /// Fetch the profile with the held access token; on success refresh.
    async fn load_profile_and_refresh(&mut self) -> bool {
        let Some(access) = self.session.access_token.clone() else {
            return false;
        };

        match self.api.me(&access).await {
            Ok(profile) => {
                debug!(user_id = %profile.id, "User info loaded");
                self.set_user_info(profile);
            }
            Err(e) => {
                error!(error = %e, "Failed to fetch user info");
                self.clear();
                return false;
            }
        }

        self.refresh().await
    }

    fn clear(&mut self) {
        self.session = Session::default();
        self.api.set_default_token(None);
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear stored session");
        }
        self.publish();
    }
}

/// Refresh the access token every `period` while the session stays
/// authenticated. The task ends once the session is anonymous.
pub fn spawn_refresh_task<A, S>(store: Arc<Mutex<SessionStore<A, S>>>, period: Duration) -> JoinHandle<()>
where
    A: AuthApi + 'static,
    S: DurableStore + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let mut store = store.lock().await;
            if !store.is_authenticated() {
                debug!("Session is anonymous; stopping refresh task");
                break;
            }
            if !store.refresh().await {
                info!("Session ended by failed refresh");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::{FileStore, MemoryStore};
    use tokio::sync::Notify;

    enum LoginBehavior {
        Succeed(TokenPair),
        Reject,
        Crash,
    }

    struct FakeApi {
        login: LoginBehavior,
        profile: Option<UserProfile>,
        refreshed: Option<String>,
        me_gate: Option<Arc<Notify>>,
        login_gate: Option<Arc<Notify>>,
        calls: parking_lot::Mutex<Vec<String>>,
        default_token: parking_lot::Mutex<Option<String>>,
    }

    impl FakeApi {
        fn new() -> Self {
            Self {
                login: LoginBehavior::Succeed(TokenPair { access: "AAA".into(), refresh: "RRR".into() }),
                profile: Some(UserProfile {
                    id: "42".into(),
                    name: Some("Ada".into()),
                    email: Some("a@b.com".into()),
                    is_staff: true,
                }),
                refreshed: Some("AAA2".into()),
                me_gate: None,
                login_gate: None,
                calls: parking_lot::Mutex::new(Vec::new()),
                default_token: parking_lot::Mutex::new(None),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn default_token(&self) -> Option<String> {
            self.default_token.lock().clone()
        }
    }

    fn unauthorized() -> anyhow::Error {
        ApiError::Unauthorized(r#"{"detail": "Token is invalid or expired"}"#.to_string()).into()
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
            self.calls.lock().push(format!("login:{}", credentials.email));
            if let Some(ref gate) = self.login_gate {
                gate.notified().await;
            }
            match self.login {
                LoginBehavior::Succeed(ref pair) => Ok(pair.clone()),
                LoginBehavior::Reject => Err(ApiError::Unauthorized(
                    r#"{"detail": "No active account found with the given credentials"}"#.to_string(),
                )
                .into()),
                LoginBehavior::Crash => Err(anyhow::anyhow!("response body was not JSON")),
            }
        }

        async fn me(&self, access_token: &str) -> Result<UserProfile> {
            self.calls.lock().push(format!("me:Bearer {}", access_token));
            if let Some(ref gate) = self.me_gate {
                gate.notified().await;
            }
            self.profile.clone().ok_or_else(unauthorized)
        }

        async fn refresh(&self, refresh_token: &str) -> Result<AccessToken> {
            self.calls.lock().push(format!("refresh:{}", refresh_token));
            self.refreshed
                .clone()
                .map(|access| AccessToken { access })
                .ok_or_else(unauthorized)
        }

        fn set_default_token(&self, token: Option<&str>) {
            *self.default_token.lock() = token.map(str::to_string);
        }
    }

    fn stored(pairs: &[(&str, &str)]) -> MemoryStore {
        let mut storage = MemoryStore::new();
        for (key, value) in pairs {
            storage.set(key, value).unwrap();
        }
        storage
    }

    fn assert_fully_cleared<S: DurableStore>(store: &SessionStore<FakeApi, S>) {
        assert!(store.session().is_anonymous(), "session not cleared: {:?}", store.session());
        for key in keys::ALL {
            assert_eq!(store.storage().get(key), None, "{} still stored", key);
        }
        assert_eq!(store.api().default_token(), None);
    }

    #[tokio::test]
    async fn test_login_populates_session_and_storage() {
        let mut store = SessionStore::new(FakeApi::new(), MemoryStore::new());

        store.login(&Credentials::new("a@b.com", "x")).await.expect("login succeeds");

        assert_eq!(
            store.api().calls(),
            vec!["login:a@b.com", "me:Bearer AAA", "refresh:RRR"]
        );

        let session = store.session();
        assert!(session.is_authenticated);
        assert_eq!(session.phase, SessionPhase::Authenticated);
        assert_eq!(session.user_id.as_deref(), Some("42"));
        assert_eq!(session.email.as_deref(), Some("a@b.com"));
        assert_eq!(session.display_name.as_deref(), Some("Ada"));
        assert!(session.is_privileged);

        assert_eq!(session.access_token.as_deref(), Some("AAA2"));
        assert_eq!(store.storage().get(keys::ACCESS), session.access_token);
        assert_eq!(store.storage().get(keys::REFRESH), session.refresh_token);
        assert_eq!(store.storage().get(keys::IS_STAFF).as_deref(), Some("true"));
        assert_eq!(store.api().default_token().as_deref(), Some("AAA2"));
        assert!(!store.loading());
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_rejected_login_surfaces_server_message() {
        let mut api = FakeApi::new();
        api.login = LoginBehavior::Reject;
        let mut store = SessionStore::new(api, MemoryStore::new());

        let err = store.login(&Credentials::new("a@b.com", "wrong")).await.expect_err("login rejected");
        assert!(err.downcast_ref::<ApiError>().is_some());
        assert_eq!(store.error(), Some("No active account found with the given credentials"));
        assert!(!store.is_authenticated());
        assert!(!store.loading());
        assert!(store.storage().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_login_failure_message() {
        let mut api = FakeApi::new();
        api.login = LoginBehavior::Crash;
        let mut store = SessionStore::new(api, MemoryStore::new());

        assert!(store.login(&Credentials::new("a@b.com", "x")).await.is_err());
        assert_eq!(store.error(), Some("An unexpected error occurred"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_login_clears_loading() {
        let mut api = FakeApi::new();
        api.login_gate = Some(Arc::new(Notify::new()));
        let mut store = SessionStore::new(api, MemoryStore::new());

        let creds = Credentials::new("a@b.com", "x");
        let attempt = tokio::time::timeout(Duration::from_secs(5), store.login(&creds));
        assert!(attempt.await.is_err(), "login should still be pending");

        assert!(!store.loading());
        assert!(!store.is_authenticated());
        assert_eq!(store.api().calls(), vec!["login:a@b.com"]);
    }

    #[test]
    fn test_login_error_message_without_server_text() {
        let err: anyhow::Error = ApiError::ServerError("<html>502</html>".to_string()).into();
        assert_eq!(login_error_message(&err), "Login failed");
    }

    #[tokio::test]
    async fn test_logout_wipes_storage() {
        let mut store = SessionStore::new(FakeApi::new(), MemoryStore::new());
        store.login(&Credentials::new("a@b.com", "x")).await.unwrap();
        assert!(!store.storage().is_empty());

        store.logout();

        assert!(!store.is_authenticated());
        assert!(store.storage().is_empty());
        assert_fully_cleared(&store);
    }

    #[tokio::test]
    async fn test_restore_with_failed_profile_fetch_clears_everything() {
        let mut api = FakeApi::new();
        api.profile = None;
        let storage = stored(&[
            (keys::ACCESS, "AAA"),
            (keys::REFRESH, "RRR"),
            (keys::ID, "42"),
            (keys::EMAIL, "a@b.com"),
        ]);
        let mut store = SessionStore::new(api, storage);

        assert!(!store.restore().await);

        assert_fully_cleared(&store);
        // Refresh is skipped once the profile fetch has ended the session
        assert_eq!(store.api().calls(), vec!["me:Bearer AAA"]);
    }

    #[tokio::test]
    async fn test_restore_success_refreshes() {
        let storage = stored(&[(keys::ACCESS, "AAA"), (keys::REFRESH, "RRR")]);
        let mut store = SessionStore::new(FakeApi::new(), storage);

        assert!(store.restore().await);

        assert_eq!(store.api().calls(), vec!["me:Bearer AAA", "refresh:RRR"]);
        assert_eq!(store.storage().get(keys::ID).as_deref(), Some("42"));
        assert_eq!(store.storage().get(keys::NAME).as_deref(), Some("Ada"));
        assert_eq!(store.access_token(), Some("AAA2"));
    }

    #[tokio::test]
    async fn test_session_survives_reopening_file_store() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = SessionStore::new(FakeApi::new(), FileStore::open(dir.path()).unwrap());
        first.login(&Credentials::new("a@b.com", "x")).await.expect("login succeeds");
        drop(first);

        let mut second = SessionStore::new(FakeApi::new(), FileStore::open(dir.path()).unwrap());
        assert!(second.restore().await);
        assert_eq!(second.api().calls(), vec!["me:Bearer AAA2", "refresh:RRR"]);
        assert_eq!(second.session().email.as_deref(), Some("a@b.com"));
        assert_eq!(second.api().default_token().as_deref(), Some("AAA2"));

        second.logout();
        drop(second);

        let mut third = SessionStore::new(FakeApi::new(), FileStore::open(dir.path()).unwrap());
        assert!(!third.restore().await);
        assert!(third.api().calls().is_empty());
        assert!(third.session().is_anonymous());
    }

    #[tokio::test]
    async fn test_restore_without_stored_session_does_nothing() {
        let mut store = SessionStore::new(FakeApi::new(), MemoryStore::new());

        assert!(!store.restore().await);
        assert!(store.api().calls().is_empty());
        assert!(store.session().is_anonymous());
    }

    #[tokio::test]
    async fn test_restore_with_access_but_no_refresh_fails_closed() {
        let storage = stored(&[(keys::ACCESS, "AAA"), (keys::EMAIL, "a@b.com")]);
        let mut store = SessionStore::new(FakeApi::new(), storage);

        assert!(!store.restore().await);
        assert!(store.api().calls().is_empty());
        assert_fully_cleared(&store);
    }

    #[tokio::test]
    async fn test_restore_is_optimistic_before_profile_resolves() {
        let gate = Arc::new(Notify::new());
        let mut api = FakeApi::new();
        api.me_gate = Some(Arc::clone(&gate));
        let storage = stored(&[(keys::ACCESS, "AAA"), (keys::REFRESH, "RRR")]);
        let mut store = SessionStore::new(api, storage);
        let mut rx = store.subscribe();

        let observer = async {
            rx.changed().await.expect("session published");
            let snapshot = rx.borrow_and_update().clone();
            gate.notify_one();
            snapshot
        };
        let (restored, snapshot) = tokio::join!(store.restore(), observer);

        assert!(snapshot.is_authenticated);
        assert_eq!(snapshot.phase, SessionPhase::Restoring);
        assert!(!snapshot.has_profile());
        assert!(restored);
        assert!(store.session().has_profile());
    }

    #[tokio::test]
    async fn test_rejected_refresh_returns_to_anonymous() {
        let mut api = FakeApi::new();
        api.refreshed = None;
        let mut store = SessionStore::new(api, MemoryStore::new());

        store.login(&Credentials::new("a@b.com", "x")).await.expect("login itself succeeds");

        assert!(!store.is_authenticated());
        assert_fully_cleared(&store);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_clears() {
        let mut store = SessionStore::new(FakeApi::new(), stored(&[(keys::EMAIL, "a@b.com")]));

        assert!(!store.refresh().await);
        assert!(store.api().calls().is_empty());
        assert_fully_cleared(&store);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_runs_on_interval() {
        let mut store = SessionStore::new(FakeApi::new(), MemoryStore::new());
        store.login(&Credentials::new("a@b.com", "x")).await.unwrap();
        let store = Arc::new(Mutex::new(store));

        let handle = spawn_refresh_task(Arc::clone(&store), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(150)).await;

        let refreshes = store
            .lock()
            .await
            .api()
            .calls()
            .iter()
            .filter(|c| c.starts_with("refresh:"))
            .count();
        // One from login, two from the timer
        assert_eq!(refreshes, 3);

        store.lock().await.logout();
        handle.await.expect("task ends after logout");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_stops_after_failure() {
        let mut store = SessionStore::new(FakeApi::new(), MemoryStore::new());
        store.login(&Credentials::new("a@b.com", "x")).await.unwrap();
        store.api.refreshed = None;
        let store = Arc::new(Mutex::new(store));

        let handle = spawn_refresh_task(Arc::clone(&store), Duration::from_secs(60));
        handle.await.expect("task ends");

        let store = store.lock().await;
        assert_fully_cleared(&*store);
    }
}
