//! Session lifecycle: sign-in, token refresh and session-bound background tasks

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use adoption_api::{
    ApiError, AuthApi, AuthResponse, Credentials, Registration, ResponseCache, User, UserRole,
};
use chrono::{DateTime, Utc};
use jwt_claims::Claims;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::storage::TokenStorage;
use crate::tasks::{TaskHandle, TaskKind};
use crate::tokens::{self, StoredTokens, TokenPair};

const MIN_TASK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// `init` has not run yet
    Uninitialized,
    Unauthenticated,
    Authenticated,
    /// Authenticated, with a token refresh in flight
    Refreshing,
}

impl AuthState {
    pub fn is_authenticated(self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::Refreshing)
    }
}

#[derive(Default)]
struct SessionState {
    tokens: Option<TokenPair>,
    user: Option<User>,
}

/// Owns the signed-in session.
///
/// Constructed explicitly and shared as `Arc<SessionManager>`. Background
/// tasks hold only a weak reference, so dropping the last `Arc` (or calling
/// [`dispose`](Self::dispose)) stops them.
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn TokenStorage>,
    /// Cleared when the session ends
    cache: Option<ResponseCache>,
    config: SessionConfig,
    status: watch::Sender<AuthState>,
    session: RwLock<SessionState>,
    // Held for the duration of a network refresh
    refresh_gate: tokio::sync::Mutex<()>,
    // Bumped whenever a session begins or ends. Held while session state and
    // storage are written, so a refresh that outlived its session is dropped.
    generation: tokio::sync::Mutex<u64>,
    tasks: Mutex<HashMap<TaskKind, TaskHandle>>,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn TokenStorage>,
        config: SessionConfig,
    ) -> Arc<Self> {
        Self::build(api, storage, config, None)
    }

    /// Like [`new`](Self::new), clearing `cache` whenever the session ends
    pub fn with_cache(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn TokenStorage>,
        config: SessionConfig,
        cache: ResponseCache,
    ) -> Arc<Self> {
        Self::build(api, storage, config, Some(cache))
    }

    fn build(
        api: Arc<dyn AuthApi>,
        storage: Arc<dyn TokenStorage>,
        config: SessionConfig,
        cache: Option<ResponseCache>,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(AuthState::Uninitialized);
        Arc::new_cyclic(|this| Self {
            api,
            storage,
            cache,
            config,
            status,
            session: RwLock::new(SessionState::default()),
            refresh_gate: tokio::sync::Mutex::new(()),
            generation: tokio::sync::Mutex::new(0),
            tasks: Mutex::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> AuthState {
        *self.status.borrow()
    }

    /// Receive every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.status.subscribe()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.access_token.clone())
    }

    /// Claims decoded from the current access token. Advisory only.
    pub fn claims(&self) -> Option<Claims> {
        let token = self.access_token()?;
        jwt_claims::decode(&token).ok()
    }

    /// Whether to show admin affordances. The server authorizes every admin
    /// action on its own.
    pub fn is_admin(&self) -> bool {
        self.claims().is_some_and(|c| c.is_admin())
            || self.user().is_some_and(|u| u.role == UserRole::Admin)
    }

    /// Restore the session from storage.
    ///
    /// Incomplete or unreadable storage is cleared. A complete token pair is
    /// checked against the server by loading the current user.
    pub async fn init(&self) -> AuthState {
        let stored = match tokens::load_tokens(self.storage.as_ref()).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored session");
                StoredTokens::Corrupt
            }
        };

        match stored {
            StoredTokens::Empty => {
                debug!("No stored session");
                self.set_status(AuthState::Unauthenticated);
            }
            StoredTokens::Corrupt => {
                warn!("Stored session is incomplete, clearing it");
                self.end_session().await;
            }
            StoredTokens::Complete(pair) => {
                {
                    let mut generation = self.generation.lock().await;
                    *generation += 1;
                    self.write().tokens = Some(pair);
                }
                match self.refresh_user().await {
                    Ok(user) => info!(user_id = %user.id, "Session restored"),
                    Err(e) => debug!(error = %e, "Could not load user for stored session"),
                }
                if self.state().is_authenticated() {
                    self.start_background_tasks_if_enabled();
                }
            }
        }

        self.state()
    }

    /// Sign in with email and password. On failure the state is unchanged.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let response = self.api.login(credentials).await.map_err(|e| match e {
            ApiError::Authentication(_) => SessionError::InvalidCredentials,
            other => SessionError::Api(other),
        })?;
        self.begin_session(response).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<User> {
        let response = self.api.register(registration).await?;
        self.begin_session(response).await
    }

    /// End the session. The remote call is best-effort; local state is always
    /// cleared.
    pub async fn logout(&self) {
        if let Some(pair) = self.tokens() {
            if let Err(e) = self
                .api
                .logout(&pair.access_token, &pair.refresh_token)
                .await
            {
                warn!(error = %e, "Remote logout failed, clearing local session anyway");
            }
        }
        self.end_session().await;
        info!("Signed out");
    }

    /// Reload the signed-in user.
    ///
    /// Network and server-side failures keep the session; any other failure
    /// (after the one refresh-and-retry `authorized` allows) ends it.
    pub async fn refresh_user(&self) -> Result<User> {
        let api = &self.api;
        let result = self
            .authorized(move |token: String| async move { api.current_user(&token).await })
            .await;

        match result {
            Ok(user) => {
                self.write().user = Some(user.clone());
                self.set_status(AuthState::Authenticated);
                Ok(user)
            }
            Err(SessionError::Api(e)) if !ends_session(&e) => {
                warn!(error = %e, "Could not load the user, keeping stored session");
                if self.tokens().is_some() {
                    self.set_status(AuthState::Authenticated);
                }
                Err(e.into())
            }
            Err(e) => {
                if self.tokens().is_some() {
                    warn!(error = %e, "Stored session is no longer valid");
                    self.end_session().await;
                }
                Err(e)
            }
        }
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one network refresh.
    pub async fn refresh_tokens(&self) -> Result<()> {
        let current = self.access_token().ok_or(SessionError::NotAuthenticated)?;
        self.refresh_if_current(&current).await.map(drop)
    }

    /// Run `request` with the current access token.
    ///
    /// A 401 triggers one refresh and one retry with the new token, so the
    /// caller never sees the first rejection. If the refresh is rejected the
    /// session ends.
    pub async fn authorized<T, F, Fut>(&self, request: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = adoption_api::Result<T>>,
    {
        let token = self.access_token().ok_or(SessionError::NotAuthenticated)?;

        match request(token.clone()).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Access token rejected, refreshing and retrying once");
                let fresh = self.refresh_if_current(&token).await?;
                Ok(request(fresh).await?)
            }
            result => Ok(result?),
        }
    }

    /// Both tokens stored and the stored expiry not yet passed
    pub async fn has_valid_tokens(&self) -> bool {
        tokens::has_valid_tokens(self.storage.as_ref(), Utc::now()).await
    }

    /// True when the access token expires within the refresh threshold of
    /// `now`. Tokens with unknown expiry are left alone.
    pub fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.tokens().and_then(|t| t.expires_at) else {
            return false;
        };
        match chrono::Duration::from_std(self.config.refresh_threshold) {
            Ok(window) => expires_at - now <= window,
            Err(_) => true,
        }
    }

    /// Start the proactive refresh task, replacing any running one
    pub fn start_background_tasks(&self) {
        let weak = self.this.clone();
        let every = self.config.refresh_check_interval.max(MIN_TASK_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the session is fresh then
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(session) = weak.upgrade() else {
                    break;
                };
                if !session.should_refresh_at(Utc::now()) {
                    continue;
                }
                debug!("Access token close to expiry, refreshing");
                if let Err(e) = session.refresh_tokens().await {
                    warn!(error = %e, "Proactive token refresh failed");
                }
            }
        });

        self.install_task(TaskKind::ProactiveRefresh, TaskHandle::new(task));
        debug!(interval_secs = every.as_secs(), "Proactive token refresh started");
    }

    /// Poll the unread notification count every `every` through
    /// [`authorized`](Self::authorized) and publish it.
    ///
    /// The first poll runs immediately. Failed polls are logged and the last
    /// published value kept. The task ends with the session, or once every
    /// receiver is dropped.
    pub fn watch_unread_count<F, Fut>(&self, every: Duration, fetch: F) -> watch::Receiver<u64>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = adoption_api::Result<u64>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(0);
        let weak = self.this.clone();
        let every = every.max(MIN_TASK_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let Some(session) = weak.upgrade() else {
                    break;
                };
                match session.authorized(&fetch).await {
                    Ok(count) => {
                        tx.send_if_modified(|current| {
                            let changed = *current != count;
                            *current = count;
                            changed
                        });
                    }
                    Err(SessionError::NotAuthenticated) => {
                        debug!("No session, skipping unread count poll");
                    }
                    Err(e) => warn!(error = %e, "Unread count poll failed"),
                }
            }
        });

        self.install_task(TaskKind::UnreadPoller, TaskHandle::new(task));
        rx
    }

    pub fn has_background_tasks(&self) -> bool {
        self.tasks().values().any(|task| !task.is_finished())
    }

    pub fn stop_background_tasks(&self) {
        let stopped: Vec<TaskHandle> = self.tasks().drain().map(|(_, task)| task).collect();
        if !stopped.is_empty() {
            debug!(count = stopped.len(), "Background tasks stopped");
        }
    }

    /// Stop every task this session started. The session itself is kept.
    pub fn dispose(&self) {
        self.stop_background_tasks();
    }

    async fn begin_session(&self, response: AuthResponse) -> Result<User> {
        let pair = TokenPair::issued(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            Utc::now(),
        );
        {
            let mut generation = self.generation.lock().await;
            tokens::save_tokens(self.storage.as_ref(), &pair).await?;
            *generation += 1;

            let mut session = self.write();
            session.tokens = Some(pair);
            session.user = Some(response.user.clone());
        }
        self.set_status(AuthState::Authenticated);
        info!(user_id = %response.user.id, "Signed in");

        self.start_background_tasks_if_enabled();
        Ok(response.user)
    }

    /// Refresh unless another caller already replaced `stale`, in which case
    /// the newer token is returned without a network call.
    ///
    /// The result is discarded if the session ended or was replaced while the
    /// request was in flight.
    async fn refresh_if_current(&self, stale: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        let (current, started) = {
            let generation = self.generation.lock().await;
            (self.tokens(), *generation)
        };
        let Some(current) = current else {
            return Err(SessionError::NotAuthenticated);
        };
        if current.access_token != stale {
            debug!("Token already refreshed by a concurrent caller");
            return Ok(current.access_token);
        }

        let previous = self.state();
        self.set_status(AuthState::Refreshing);

        let result = self.api.refresh(&current.refresh_token).await;

        let mut generation = self.generation.lock().await;
        if *generation != started {
            debug!("Session changed while refreshing, discarding result");
            return Err(SessionError::NotAuthenticated);
        }

        match result {
            Ok(refreshed) => {
                let pair = TokenPair::issued(
                    refreshed.access_token,
                    refreshed.refresh_token.unwrap_or(current.refresh_token),
                    refreshed.expires_in,
                    Utc::now(),
                );
                if let Err(e) = tokens::save_tokens(self.storage.as_ref(), &pair).await {
                    warn!(error = %e, "Failed to persist refreshed tokens");
                }
                let access_token = pair.access_token.clone();
                self.write().tokens = Some(pair);
                self.set_status(AuthState::Authenticated);
                info!("Access token refreshed");
                Ok(access_token)
            }
            Err(e) if ends_session(&e) => {
                warn!(error = %e, "Refresh token rejected, ending session");
                self.clear_session(&mut generation).await;
                Err(e.into())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, keeping session");
                self.set_status(previous);
                Err(e.into())
            }
        }
    }

    /// Clear tokens, user, cache and tasks. Tasks go last so this can run
    /// from inside one of them.
    async fn end_session(&self) {
        let mut generation = self.generation.lock().await;
        self.clear_session(&mut generation).await;
    }

    async fn clear_session(&self, generation: &mut u64) {
        *generation += 1;
        {
            let mut session = self.write();
            session.tokens = None;
            session.user = None;
        }
        self.set_status(AuthState::Unauthenticated);

        if let Some(cache) = &self.cache {
            cache.clear();
        }
        if let Err(e) = tokens::clear_tokens(self.storage.as_ref()).await {
            warn!(error = %e, "Failed to clear stored tokens");
        }

        self.stop_background_tasks();
    }

    fn start_background_tasks_if_enabled(&self) {
        if self.config.background_refresh {
            self.start_background_tasks();
        }
    }

    fn install_task(&self, kind: TaskKind, task: TaskHandle) {
        // A replaced handle aborts its task on drop
        self.tasks().insert(kind, task);
    }

    fn set_status(&self, state: AuthState) {
        let previous = self.status.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Auth state changed");
        }
    }

    fn tokens(&self) -> Option<TokenPair> {
        self.read().tokens.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskKind, TaskHandle>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Refresh failures that mean the refresh token itself is no good
fn ends_session(err: &ApiError) -> bool {
    matches!(
        err,
        ApiError::Authentication(_)
            | ApiError::Authorization(_)
            | ApiError::Validation { .. }
            | ApiError::NotFound(_)
    )
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
