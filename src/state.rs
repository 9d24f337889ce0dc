//! Shared application state and session types.

use crate::actions::Action;
use crate::config::PanelConfig;
use crate::publish::SummaryPublisher;
use crate::token::{random_string, TokenStore, CSRF_TOKEN_LEN};
use crate::workspace::ActiveProject;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

/// The selected project of one browser session.
pub type Workspace = Arc<Mutex<Option<ActiveProject>>>;

/// A browser session, keyed by the id stored in its cookie.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub token: Option<String>,
    pub csrf_token: Option<String>,
    pub selected_action: Option<Action>,
    pub workspace: Workspace,
    pub created_at: Instant,
    pub last_used: Instant,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            token: None,
            csrf_token: None,
            selected_action: None,
            workspace: Arc::new(Mutex::new(None)),
            created_at: now,
            last_used: now,
        }
    }
}

/// Thread-safe session storage.
pub type Sessions = Arc<RwLock<HashMap<String, Session>>>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Sessions,
    pub tokens: Arc<TokenStore>,
    pub config: Arc<PanelConfig>,
    pub publisher: Arc<SummaryPublisher>,
    /// Held for the whole lifetime of a tool run; one run at a time.
    pub dispatch_lock: Arc<Mutex<()>>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(config: PanelConfig, tokens: TokenStore) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            tokens: Arc::new(tokens),
            config: Arc::new(config),
            publisher: Arc::new(SummaryPublisher::new()),
            dispatch_lock: Arc::new(Mutex::new(())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Refresh the session named by the cookie, or start a new one.
    ///
    /// Returns the live session id and whether it was just created.
    pub async fn open_session(&self, cookie_id: Option<&str>) -> (String, bool) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = cookie_id.and_then(|id| sessions.get_mut(id)) {
            session.last_used = Instant::now();
            return (session.id.clone(), false);
        }
        let id = uuid::Uuid::new_v4().to_string();
        sessions.insert(id.clone(), Session::new(id.clone()));
        debug!(session = %id, "created session");
        (id, true)
    }

    pub async fn session_token(&self, id: &str) -> Option<String> {
        self.sessions.read().await.get(id).and_then(|s| s.token.clone())
    }

    pub async fn set_session_token(&self, id: &str, token: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.token = Some(token.to_string());
        }
    }

    /// The session's CSRF token, issuing one on first use.
    pub async fn csrf_token(&self, id: &str) -> String {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => session
                .csrf_token
                .get_or_insert_with(|| random_string(CSRF_TOKEN_LEN))
                .clone(),
            None => random_string(CSRF_TOKEN_LEN),
        }
    }

    /// CSRF token already issued to the session, without issuing a new one.
    pub async fn issued_csrf_token(&self, id: &str) -> Option<String> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|s| s.csrf_token.clone())
    }

    /// Forget the login and CSRF token of a session. Missing sessions are
    /// only logged.
    pub async fn clear_auth(&self, id: &str) {
        match self.sessions.write().await.get_mut(id) {
            Some(session) => {
                session.token = None;
                session.csrf_token = None;
                info!(session = %id, "cleared session authentication");
            }
            None => debug!(session = %id, "no session to clear"),
        }
    }

    pub async fn workspace(&self, id: &str) -> Option<Workspace> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| s.workspace.clone())
    }

    pub async fn set_selected_action(&self, id: &str, action: Action) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.selected_action = Some(action);
        }
    }

    pub async fn selected_action(&self, id: &str) -> Option<Action> {
        self.sessions
            .read()
            .await
            .get(id)
            .and_then(|s| s.selected_action)
    }
}

/// Drop sessions idle for longer than `ttl`.
pub async fn cleanup_expired_sessions(sessions: &Sessions, ttl: Duration) -> usize {
    let mut sessions = sessions.write().await;
    let now = Instant::now();

    let expired: Vec<String> = sessions
        .iter()
        .filter(|(_, s)| now.duration_since(s.last_used) > ttl)
        .map(|(id, _)| id.clone())
        .collect();

    for id in &expired {
        if let Some(session) = sessions.remove(id) {
            info!(
                session = %id,
                age_secs = now.duration_since(session.created_at).as_secs(),
                "cleaning up expired session"
            );
        }
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(PanelConfig::default(), TokenStore::with_token("secret"))
    }

    #[tokio::test]
    async fn unknown_cookie_starts_a_new_session() {
        let state = state();
        let (first, created) = state.open_session(Some("stale")).await;
        assert!(created);
        assert_ne!(first, "stale");

        let (again, created) = state.open_session(Some(&first)).await;
        assert!(!created);
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn csrf_token_is_issued_once() {
        let state = state();
        let (id, _) = state.open_session(None).await;
        assert!(state.issued_csrf_token(&id).await.is_none());
        let first = state.csrf_token(&id).await;
        assert_eq!(first.len(), CSRF_TOKEN_LEN);
        assert_eq!(state.csrf_token(&id).await, first);
        assert_eq!(state.issued_csrf_token(&id).await, Some(first));
    }

    #[tokio::test]
    async fn clear_auth_drops_token_and_csrf() {
        let state = state();
        let (id, _) = state.open_session(None).await;
        state.set_session_token(&id, "secret").await;
        state.csrf_token(&id).await;
        state.clear_auth(&id).await;
        assert!(state.session_token(&id).await.is_none());
        assert!(state.issued_csrf_token(&id).await.is_none());
        state.clear_auth("gone").await;
    }

    #[tokio::test]
    async fn expired_sessions_are_removed() {
        let state = state();
        let (id, _) = state.open_session(None).await;
        assert_eq!(cleanup_expired_sessions(&state.sessions, Duration::from_secs(60)).await, 0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cleanup_expired_sessions(&state.sessions, Duration::ZERO).await, 1);
        assert!(state.workspace(&id).await.is_none());
    }

    #[tokio::test]
    async fn sessions_have_separate_workspaces() {
        let state = state();
        let (a, _) = state.open_session(None).await;
        let (b, _) = state.open_session(None).await;
        let wa = state.workspace(&a).await.expect("a");
        let wb = state.workspace(&b).await.expect("b");
        assert!(!Arc::ptr_eq(&wa, &wb));
    }
}
