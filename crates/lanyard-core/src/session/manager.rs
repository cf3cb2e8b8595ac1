//! Session orchestration: the state machine embedders talk to.
//!
//! The manager composes the bound token store, the CSRF state store, and
//! the session validator into the login-redirect flow, callback completion,
//! a heartbeat loop, and logout. Embedders observe it through a watch
//! channel of [`AuthState`] snapshots and drive navigation through the
//! [`Navigator`] seam; the core assumes nothing else about the UI.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use reqwest::Url;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{PortalClient, TokenExchanger};
use crate::config::AuthConfig;
use crate::fingerprint::DeviceEnv;
use crate::models::AuthUser;
use crate::session::callback::{CallbackError, CallbackParams};
use crate::session::validator::{SessionValidation, SessionValidator};
use crate::storage::{self, AuthStorage};
use crate::token::{codec, BoundTokenStore, CsrfStateStore};

/// Interval between heartbeat validations of an active session.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Delay before the default post-logout redirect, giving the embedder's UI
/// transition time to settle.
const LOGOUT_REDIRECT_DELAY: Duration = Duration::from_millis(500);

/// One-shot query marker that forces a token refresh on arrival.
const VERIFIED_PARAM: &str = "verified";

/// Seam to the embedder's navigation machinery.
///
/// The manager never renders or routes; it reads the current URL, requests
/// full navigations, and replaces the displayed URL through this trait.
pub trait Navigator: Send + Sync {
    /// Full URL currently displayed, including query and fragment.
    fn current_url(&self) -> String;
    /// Perform a full navigation; control leaves the session core.
    fn navigate(&self, url: &str);
    /// Replace the displayed URL without adding a history entry.
    fn replace_url(&self, url: &str);
}

/// Authentication state visible to embedders.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// `start` has not run yet.
    Uninitialized,
    /// Local identity applied; the first server reconciliation is still in
    /// flight. The carried identity is already renderable.
    Loading(Option<AuthUser>),
    Authenticated(AuthUser),
    Unauthenticated,
}

impl AuthState {
    /// Identity carried by this state, if any.
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            AuthState::Loading(user) => user.as_ref(),
            AuthState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// Whether the first server reconciliation is still pending.
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Uninitialized | AuthState::Loading(_))
    }
}

/// The session state machine. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: Arc<AuthConfig>,
    store: Arc<BoundTokenStore>,
    csrf: CsrfStateStore,
    validator: SessionValidator,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<AuthState>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Build a manager over the default storage root, the ambient device
    /// environment, and the live portal client.
    pub fn new(config: AuthConfig, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let config = Arc::new(config);
        let storage = Arc::new(AuthStorage::new(
            config.storage_area,
            storage::default_root(&config.app_id),
        ));
        let client = PortalClient::new(&config.token_service_root_url)?;
        Ok(Self::with_parts(
            config,
            storage,
            Box::new(client),
            DeviceEnv::detect(),
            navigator,
        ))
    }

    /// Assemble a manager from explicit parts.
    ///
    /// This is the composition seam: embedders (and tests) can substitute
    /// the storage root, the device environment, and the exchange endpoint.
    pub fn with_parts(
        config: Arc<AuthConfig>,
        storage: Arc<AuthStorage>,
        exchanger: Box<dyn TokenExchanger>,
        env: DeviceEnv,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = Arc::new(BoundTokenStore::new(Arc::clone(&storage), &env));
        let csrf = CsrfStateStore::new(storage);
        let validator = SessionValidator::new(Arc::clone(&config), Arc::clone(&store), exchanger);
        let (state, _) = watch::channel(AuthState::Uninitialized);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                store,
                csrf,
                validator,
                navigator,
                state,
                heartbeat: Mutex::new(None),
            }),
        }
    }

    /// Run the startup sequence.
    ///
    /// The local read completes before this returns, so a renderable state
    /// is always available immediately. Server reconciliation and the
    /// one-shot `verified` marker handling complete in the background, and
    /// the heartbeat starts ticking.
    pub fn start(&self) {
        let local = self.inner.store.current_claims().map(AuthUser::from);
        self.inner.state.send_replace(AuthState::Loading(local));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.apply_validation().await;
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.handle_verified_marker().await;
        });

        self.spawn_heartbeat();
    }

    /// Watch the authentication state. The receiver always holds a current
    /// snapshot; changes are published on login, logout, refresh, and
    /// validation outcomes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    pub fn current_state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Recompute the identity from local storage only; no server call.
    pub fn refresh_identity(&self) {
        self.inner.publish_local();
    }

    /// Revalidate against the server now and fold the outcome.
    pub async fn validate_now(&self) {
        self.inner.apply_validation().await;
    }

    /// Begin the login redirect: issue CSRF state and hand control to the
    /// portal.
    pub fn login(&self) -> Result<()> {
        let state = self.inner.csrf.issue()?;
        let url = self.inner.build_portal_login_url(&state)?;
        info!("redirecting to portal for login");
        self.inner.navigator.navigate(&url);
        Ok(())
    }

    /// Complete the callback leg after the portal redirects back.
    ///
    /// The CSRF state is consumed exactly once, success or failure, and the
    /// token is never persisted on a failed attempt. On success the fragment
    /// is stripped from the URL and the identity published; the embedder
    /// then navigates wherever it pleases. On failure the returned error's
    /// message is suitable for direct display.
    pub fn complete_callback(&self) -> Result<(), CallbackError> {
        let params = CallbackParams::from_url(&self.inner.navigator.current_url());
        let result = self.inner.accept_callback(params);

        // One-shot semantics: the state never survives a callback attempt.
        self.inner.csrf.clear();

        if let Err(error) = &result {
            warn!(error = %error, "callback completion failed");
        }
        result
    }

    /// Clear the session and, after a short delay, return to the login flow.
    pub fn logout(&self) {
        self.inner.clear_session();
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(LOGOUT_REDIRECT_DELAY).await;
            if let Err(error) = manager.login() {
                error!(error = %error, "post-logout login redirect failed");
            }
        });
    }

    /// Clear the session and run the embedder's own hook instead of the
    /// default portal redirect.
    pub fn logout_with<F: FnOnce()>(&self, hook: F) {
        self.inner.clear_session();
        hook();
    }

    /// Tear down the heartbeat. Call when the embedding surface unmounts;
    /// dropping the last manager clone does the same.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.inner.heartbeat).take() {
            handle.abort();
        }
    }

    fn spawn_heartbeat(&self) {
        // The task holds only a weak reference so an abandoned manager can
        // still drop (and its Drop aborts this task).
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(HEARTBEAT_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval fires immediately; the heartbeat
            // starts one full period out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.state.borrow().is_authenticated() {
                    continue;
                }
                debug!("heartbeat - validating session");
                inner.apply_validation().await;
            }
        });

        if let Some(previous) = lock(&self.inner.heartbeat).replace(handle) {
            previous.abort();
        }
    }
}

impl ManagerInner {
    /// Validate against the server and fold the outcome into the state.
    async fn apply_validation(&self) {
        let outcome = self.validator.validate().await;
        self.fold_validation(outcome);
    }

    fn fold_validation(&self, outcome: SessionValidation) {
        if let SessionValidation::Rejected(reason) = &outcome {
            info!(reason = %reason, "session invalid; clearing local state");
            self.store.clear();
            self.state.send_replace(AuthState::Unauthenticated);
            return;
        }
        // Valid, NotLoggedIn, or Unreachable: settle on whatever the store
        // holds now.
        self.publish_local();
    }

    /// Publish the store-derived identity as the settled state.
    fn publish_local(&self) {
        match self.store.current_claims().map(AuthUser::from) {
            Some(user) => self.state.send_replace(AuthState::Authenticated(user)),
            None => self.state.send_replace(AuthState::Unauthenticated),
        };
    }

    /// Strip a one-shot `verified=true` query marker and force a token
    /// refresh so freshly-changed claims are picked up.
    async fn handle_verified_marker(&self) {
        let url = self.navigator.current_url();
        let Some(stripped) = strip_verified_param(&url) else {
            return;
        };
        info!("verification marker detected; refreshing token for updated claims");
        self.navigator.replace_url(&stripped);
        if self.validator.refresh().await {
            self.publish_local();
        }
    }

    fn accept_callback(&self, params: CallbackParams) -> Result<(), CallbackError> {
        if let Some(code) = params.error {
            return Err(CallbackError::Portal(code));
        }
        let Some(token) = params.access_token else {
            return Err(CallbackError::MissingToken);
        };

        // The CSRF check comes before the token is even decoded.
        if !self.csrf.verify(params.state.as_deref()) {
            return Err(CallbackError::StateMismatch);
        }

        let claims = codec::decode(&token).map_err(|error| {
            debug!(error = %error, "callback token failed to decode");
            CallbackError::MalformedToken
        })?;
        if codec::is_expired(&claims) {
            return Err(CallbackError::TokenExpired);
        }
        if !claims.master_auth {
            return Err(CallbackError::UntrustedIssuer);
        }

        if let Err(error) = self.store.store(&token) {
            warn!(error = %error, "failed to persist token after callback");
            return Err(CallbackError::Storage);
        }

        // Strip the fragment so the token never lingers in the URL.
        let url = self.navigator.current_url();
        let stripped = url.split_once('#').map(|(base, _)| base).unwrap_or(&url);
        self.navigator.replace_url(stripped);

        self.publish_local();
        info!("login callback completed");
        Ok(())
    }

    fn build_portal_login_url(&self, state: &str) -> Result<String> {
        let current = Url::parse(&self.navigator.current_url())?;
        let origin = current.origin().ascii_serialization();
        let redirect_uri = format!("{}{}", origin, self.config.callback_path);

        let mut url = Url::parse(&format!(
            "{}/login",
            self.config.portal_url.trim_end_matches('/')
        ))?;
        url.query_pairs_mut()
            .append_pair("app", &self.config.app_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("state", state);
        Ok(url.into())
    }

    fn clear_session(&self) {
        info!("logging out; clearing local session state");
        self.store.clear();
        self.csrf.clear();
        self.state.send_replace(AuthState::Unauthenticated);
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let handle = match self.heartbeat.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Remove a `verified=true` marker from the URL's query, preserving every
/// other parameter. None when the marker is absent.
fn strip_verified_param(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;

    let has_marker = parsed
        .query_pairs()
        .any(|(key, value)| key == VERIFIED_PARAM && value == "true");
    if !has_marker {
        return None;
    }

    let remaining: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != VERIFIED_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    parsed.set_query(None);
    if !remaining.is_empty() {
        let mut pairs = parsed.query_pairs_mut();
        for (key, value) in &remaining {
            pairs.append_pair(key, value);
        }
    }
    Some(parsed.into())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, TokenGrant};
    use crate::storage::StorageArea;
    use crate::testutil::{claims_json, encode_jwt, far_future_exp, valid_jwt};
    use crate::token::csrf::STATE_KEY;
    use crate::token::store::TOKEN_KEY;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct MockNavigator {
        current: Mutex<String>,
        navigations: Mutex<Vec<String>>,
        replacements: Mutex<Vec<String>>,
    }

    impl MockNavigator {
        fn at(url: &str) -> Arc<Self> {
            Arc::new(Self {
                current: Mutex::new(url.to_string()),
                navigations: Mutex::new(Vec::new()),
                replacements: Mutex::new(Vec::new()),
            })
        }

        fn set_url(&self, url: &str) {
            *self.current.lock().unwrap() = url.to_string();
        }

        fn navigations(&self) -> Vec<String> {
            self.navigations.lock().unwrap().clone()
        }

        fn replacements(&self) -> Vec<String> {
            self.replacements.lock().unwrap().clone()
        }
    }

    impl Navigator for MockNavigator {
        fn current_url(&self) -> String {
            self.current.lock().unwrap().clone()
        }

        fn navigate(&self, url: &str) {
            self.navigations.lock().unwrap().push(url.to_string());
        }

        fn replace_url(&self, url: &str) {
            // A replacement changes the displayed URL, like the real thing.
            *self.current.lock().unwrap() = url.to_string();
            self.replacements.lock().unwrap().push(url.to_string());
        }
    }

    #[derive(Clone)]
    enum Script {
        Grant(Option<String>),
        Reject(String),
    }

    struct MockExchanger {
        script: Script,
    }

    #[async_trait]
    impl TokenExchanger for MockExchanger {
        async fn exchange(&self, _token: &str, _app_id: &str) -> Result<TokenGrant, ApiError> {
            match self.script.clone() {
                Script::Grant(token) => Ok(TokenGrant {
                    access_token: token,
                }),
                Script::Reject(reason) => Err(ApiError::Rejected {
                    status: 401,
                    reason,
                }),
            }
        }
    }

    fn test_env() -> DeviceEnv {
        DeviceEnv {
            user_agent: "linux/x86_64".to_string(),
            language: "en_US.UTF-8".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            color_depth: 24,
            timezone: "America/Chicago".to_string(),
            hardware_concurrency: 8,
        }
    }

    fn test_config() -> Arc<AuthConfig> {
        Arc::new(
            AuthConfig::new(
                "demo-app",
                "https://portal.example.com",
                "https://svc.example.com",
            )
            .unwrap(),
        )
    }

    fn manager_in(
        dir: &TempDir,
        script: Script,
        navigator: Arc<MockNavigator>,
    ) -> (SessionManager, Arc<AuthStorage>) {
        let storage = Arc::new(AuthStorage::new(
            StorageArea::Persistent,
            dir.path().to_path_buf(),
        ));
        let manager = SessionManager::with_parts(
            test_config(),
            Arc::clone(&storage),
            Box::new(MockExchanger { script }),
            test_env(),
            navigator,
        );
        (manager, storage)
    }

    /// Wait until the published state satisfies the predicate.
    async fn wait_for_state<F: Fn(&AuthState) -> bool>(
        manager: &SessionManager,
        predicate: F,
    ) -> AuthState {
        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let state = rx.borrow_and_update();
                    if predicate(&state) {
                        return state.clone();
                    }
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("state predicate not reached in time")
    }

    #[tokio::test]
    async fn test_login_issues_state_and_navigates_to_portal() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/dashboard");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();

        let navigations = navigator.navigations();
        assert_eq!(navigations.len(), 1);

        let url = Url::parse(&navigations[0]).unwrap();
        assert_eq!(url.origin().ascii_serialization(), "https://portal.example.com");
        assert_eq!(url.path(), "/login");

        let pairs: std::collections::HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs["app"], "demo-app");
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/auth/callback");

        // The state in the URL is the state that was persisted.
        assert_eq!(storage.get(STATE_KEY).as_deref(), Some(pairs["state"].as_str()));
    }

    #[tokio::test]
    async fn test_callback_success_end_to_end() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        let portal_url = Url::parse(&navigator.navigations()[0]).unwrap();
        let state = portal_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let token = valid_jwt();
        navigator.set_url(&format!(
            "https://app.example.com/auth/callback#access_token={token}&state={state}"
        ));

        manager.complete_callback().unwrap();

        // Token persisted, fragment stripped, CSRF state consumed.
        let user = manager.current_user().unwrap();
        assert_eq!(user.email, "pat@example.com");
        assert_eq!(
            navigator.current_url(),
            "https://app.example.com/auth/callback"
        );
        assert_eq!(storage.get(STATE_KEY), None);
        assert!(storage.get(TOKEN_KEY).is_some());
    }

    #[tokio::test]
    async fn test_callback_with_portal_error_never_stores_token() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        navigator.set_url("https://app.example.com/auth/callback#error=access_denied");

        let error = manager.complete_callback().unwrap_err();
        assert_eq!(error, CallbackError::Portal("access_denied".to_string()));
        assert_eq!(error.to_string(), "access_denied");

        assert_eq!(storage.get(TOKEN_KEY), None);
        // One-shot: the CSRF state is gone even though verification never ran.
        assert_eq!(storage.get(STATE_KEY), None);
    }

    #[tokio::test]
    async fn test_callback_state_mismatch_aborts_before_decode() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        let token = valid_jwt();
        navigator.set_url(&format!(
            "https://app.example.com/auth/callback#access_token={token}&state=forged"
        ));

        assert_eq!(
            manager.complete_callback().unwrap_err(),
            CallbackError::StateMismatch
        );
        assert_eq!(storage.get(TOKEN_KEY), None);
        assert_eq!(storage.get(STATE_KEY), None);
    }

    #[tokio::test]
    async fn test_callback_missing_token_is_fatal() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/auth/callback#state=abc");
        let (manager, _) = manager_in(&dir, Script::Grant(None), navigator);

        assert_eq!(
            manager.complete_callback().unwrap_err(),
            CallbackError::MissingToken
        );
    }

    #[tokio::test]
    async fn test_callback_rejects_expired_token() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        let state = storage.get(STATE_KEY).unwrap();
        let expired = encode_jwt(&claims_json(chrono::Utc::now().timestamp() - 60));
        navigator.set_url(&format!(
            "https://app.example.com/auth/callback#access_token={expired}&state={state}"
        ));

        assert_eq!(
            manager.complete_callback().unwrap_err(),
            CallbackError::TokenExpired
        );
        assert_eq!(storage.get(TOKEN_KEY), None);
    }

    #[tokio::test]
    async fn test_callback_rejects_token_without_provenance_marker() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        let state = storage.get(STATE_KEY).unwrap();

        let mut payload = claims_json(far_future_exp());
        payload["master_auth"] = serde_json::Value::Bool(false);
        let token = encode_jwt(&payload);
        navigator.set_url(&format!(
            "https://app.example.com/auth/callback#access_token={token}&state={state}"
        ));

        assert_eq!(
            manager.complete_callback().unwrap_err(),
            CallbackError::UntrustedIssuer
        );
        assert_eq!(storage.get(TOKEN_KEY), None);
    }

    #[tokio::test]
    async fn test_callback_rejects_malformed_token() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.login().unwrap();
        let state = storage.get(STATE_KEY).unwrap();
        navigator.set_url(&format!(
            "https://app.example.com/auth/callback#access_token=garbage&state={state}"
        ));

        assert_eq!(
            manager.complete_callback().unwrap_err(),
            CallbackError::MalformedToken
        );
        assert_eq!(storage.get(TOKEN_KEY), None);
    }

    #[tokio::test]
    async fn test_start_publishes_local_identity_then_settles() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let refreshed = valid_jwt();
        let (manager, _storage) = manager_in(
            &dir,
            Script::Grant(Some(refreshed)),
            Arc::clone(&navigator),
        );

        // Session stored by a previous run.
        manager.inner.store.store(&valid_jwt()).unwrap();

        manager.start();

        // The local read is synchronous: an identity is renderable at once.
        assert!(manager.current_user().is_some());

        // Server validation settles the state.
        let settled =
            wait_for_state(&manager, |s| matches!(s, AuthState::Authenticated(_))).await;
        assert_eq!(settled.user().unwrap().email, "pat@example.com");
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_start_with_force_logout_clears_session() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(
            &dir,
            Script::Reject("force_logout".to_string()),
            Arc::clone(&navigator),
        );
        manager.inner.store.store(&valid_jwt()).unwrap();

        manager.start();
        wait_for_state(&manager, |s| matches!(s, AuthState::Unauthenticated)).await;

        assert_eq!(storage.get(TOKEN_KEY), None);
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_start_without_token_settles_unauthenticated() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, _) = manager_in(&dir, Script::Grant(None), navigator);

        manager.start();
        assert!(manager.current_state().is_loading());

        wait_for_state(&manager, |s| matches!(s, AuthState::Unauthenticated)).await;
        assert!(!manager.is_authenticated());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_verified_marker_is_stripped_and_claims_refreshed() {
        let dir = TempDir::new().unwrap();
        let navigator =
            MockNavigator::at("https://app.example.com/settings?verified=true&tab=profile");

        let mut payload = claims_json(far_future_exp());
        payload["full_name"] = serde_json::Value::String("Verified Pat".to_string());
        let refreshed = encode_jwt(&payload);

        let (manager, _) = manager_in(&dir, Script::Grant(Some(refreshed)), Arc::clone(&navigator));
        manager.inner.store.store(&valid_jwt()).unwrap();

        manager.start();

        let settled = wait_for_state(&manager, |s| {
            matches!(s, AuthState::Authenticated(user) if user.display_name == "Verified Pat")
        })
        .await;
        assert!(settled.is_authenticated());

        // The marker is gone, the rest of the query survives.
        let replaced = navigator.replacements();
        assert!(replaced
            .iter()
            .any(|u| u == "https://app.example.com/settings?tab=profile"));
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_logout_with_hook_clears_everything() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, storage) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.inner.store.store(&valid_jwt()).unwrap();
        manager.refresh_identity();
        assert!(manager.is_authenticated());

        let ran = AtomicBool::new(false);
        manager.logout_with(|| ran.store(true, Ordering::SeqCst));

        assert!(ran.load(Ordering::SeqCst));
        assert!(!manager.is_authenticated());
        assert_eq!(storage.get(TOKEN_KEY), None);
        assert_eq!(storage.get(STATE_KEY), None);
        // The default redirect was suppressed by the hook.
        assert!(navigator.navigations().is_empty());
    }

    #[tokio::test]
    async fn test_default_logout_redirects_to_login_after_delay() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, _) = manager_in(&dir, Script::Grant(None), Arc::clone(&navigator));

        manager.inner.store.store(&valid_jwt()).unwrap();
        manager.refresh_identity();
        manager.logout();

        assert!(!manager.is_authenticated());
        assert!(navigator.navigations().is_empty());

        tokio::time::timeout(Duration::from_secs(5), async {
            while navigator.navigations().is_empty() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("no post-logout redirect");

        let url = Url::parse(&navigator.navigations()[0]).unwrap();
        assert_eq!(url.path(), "/login");
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_heartbeat() {
        let dir = TempDir::new().unwrap();
        let navigator = MockNavigator::at("https://app.example.com/");
        let (manager, _) = manager_in(&dir, Script::Grant(None), navigator);

        manager.start();
        assert!(lock(&manager.inner.heartbeat).is_some());

        manager.shutdown();
        assert!(lock(&manager.inner.heartbeat).is_none());
    }

    #[test]
    fn test_strip_verified_param() {
        assert_eq!(
            strip_verified_param("https://x.example/p?verified=true"),
            Some("https://x.example/p".to_string())
        );
        assert_eq!(
            strip_verified_param("https://x.example/p?a=1&verified=true&b=2"),
            Some("https://x.example/p?a=1&b=2".to_string())
        );
        // Only the literal `true` marker triggers.
        assert_eq!(strip_verified_param("https://x.example/p?verified=false"), None);
        assert_eq!(strip_verified_param("https://x.example/p?a=1"), None);
        assert_eq!(strip_verified_param("not a url"), None);
    }
}
