// Identity provider seam.
//
// Authentication is delegated to an external provider; this module only
// describes what the client consumes from it and keeps track of the
// signed-in user.

use crate::error::{Error, Result};
use crate::routes::{self, Route};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignInMethod {
    Password,
    Federated,
    EmailLink,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub method: SignInMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
}

/// External identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;

    /// Sign in through a federated account (e.g. an OAuth popup)
    async fn sign_in_with_provider(&self) -> Result<User>;

    async fn send_passwordless_link(&self, email: &str) -> Result<()>;

    async fn complete_passwordless_sign_in(&self, link: &str) -> Result<User>;

    async fn sign_out(&self) -> Result<()>;

    /// Subscribe to sign-in / sign-out events
    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent>;

    fn current_user(&self) -> Option<User>;
}

/// In-process identity provider.
///
/// Holds a fixed account table and hands out sign-in links through an
/// outbox instead of sending mail. Used by the terminal client and tests.
pub struct MemoryIdentityProvider {
    accounts: RwLock<HashMap<String, String>>,
    accept_any: bool,
    federated: Option<User>,
    link_base: String,
    pending_links: Mutex<HashMap<String, String>>,
    outbox: Mutex<Vec<(String, String)>>,
    current: RwLock<Option<User>>,
    events: broadcast::Sender<AuthEvent>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            accounts: RwLock::new(HashMap::new()),
            accept_any: false,
            federated: None,
            link_base: "http://localhost/login".to_string(),
            pending_links: Mutex::new(HashMap::new()),
            outbox: Mutex::new(Vec::new()),
            current: RwLock::new(None),
            events,
        }
    }

    /// Accept any well-formed email with a non-empty password
    pub fn accepting_any() -> Self {
        Self {
            accept_any: true,
            ..Self::new()
        }
    }

    pub fn with_account(self, email: &str, password: &str) -> Self {
        self.accounts
            .write()
            .insert(email.to_lowercase(), password.to_string());
        self
    }

    pub fn with_federated_user(mut self, user: User) -> Self {
        self.federated = Some(user);
        self
    }

    /// Links sent to `email`, oldest first
    pub fn sent_links(&self, email: &str) -> Vec<String> {
        let email = email.to_lowercase();
        self.outbox
            .lock()
            .iter()
            .filter(|(to, _)| *to == email)
            .map(|(_, link)| link.clone())
            .collect()
    }

    fn establish(&self, user: User) -> User {
        *self.current.write() = Some(user.clone());
        // no subscribers is fine
        let _ = self.events.send(AuthEvent::SignedIn(user.clone()));
        info!(uid = %user.uid, method = ?user.method, "signed in");
        user
    }

    fn user_for(email: &str, method: SignInMethod) -> User {
        User {
            uid: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: None,
            method,
        }
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn check_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let well_formed = matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && domain.contains('.')
    );
    if well_formed {
        Ok(email)
    } else {
        Err(Error::Auth(format!("invalid email address: {}", email)))
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let email = check_email(email)?;
        if password.is_empty() {
            return Err(Error::Auth("password required".to_string()));
        }

        let known = self.accounts.read().get(&email).cloned();
        let accepted = match known {
            Some(expected) => expected == password,
            None => self.accept_any,
        };
        if !accepted {
            warn!(email = %email, "rejected sign-in");
            return Err(Error::Auth("invalid email or password".to_string()));
        }

        Ok(self.establish(Self::user_for(&email, SignInMethod::Password)))
    }

    async fn sign_in_with_provider(&self) -> Result<User> {
        match &self.federated {
            Some(user) => Ok(self.establish(User {
                method: SignInMethod::Federated,
                ..user.clone()
            })),
            None => Err(Error::Auth("no federated provider configured".to_string())),
        }
    }

    async fn send_passwordless_link(&self, email: &str) -> Result<()> {
        let email = check_email(email)?;
        let code = uuid::Uuid::new_v4().simple().to_string();
        let link = format!("{}?mode=signIn&oobCode={}", self.link_base, code);

        self.pending_links.lock().insert(code, email.clone());
        self.outbox.lock().push((email.clone(), link));
        debug!(email = %email, "sign-in link issued");
        Ok(())
    }

    async fn complete_passwordless_sign_in(&self, link: &str) -> Result<User> {
        let invalid = || Error::Auth("Invalid verification link".to_string());

        let parsed = url::Url::parse(link).map_err(|_| invalid())?;
        let mut mode = None;
        let mut code = None;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "mode" => mode = Some(value.into_owned()),
                "oobCode" => code = Some(value.into_owned()),
                _ => {}
            }
        }
        if mode.as_deref() != Some("signIn") {
            return Err(invalid());
        }
        let code = code.ok_or_else(invalid)?;

        // links are single use
        let email = self
            .pending_links
            .lock()
            .remove(&code)
            .ok_or_else(|| Error::Auth("Please provide your email for verification".to_string()))?;

        Ok(self.establish(Self::user_for(&email, SignInMethod::EmailLink)))
    }

    async fn sign_out(&self) -> Result<()> {
        if self.current.write().take().is_some() {
            let _ = self.events.send(AuthEvent::SignedOut);
            info!("signed out");
        }
        Ok(())
    }

    fn on_auth_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn current_user(&self) -> Option<User> {
        self.current.read().clone()
    }
}

/// Tracks the signed-in user by following a provider's auth-change events.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    events: Mutex<broadcast::Receiver<AuthEvent>>,
    user: RwLock<Option<User>>,
}

impl AuthSession {
    pub fn follow(provider: Arc<dyn IdentityProvider>) -> Self {
        let events = provider.on_auth_change();
        let user = provider.current_user();
        Self {
            provider,
            events: Mutex::new(events),
            user: RwLock::new(user),
        }
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    fn drain_events(&self) {
        let mut events = self.events.lock();
        loop {
            match events.try_recv() {
                Ok(AuthEvent::SignedIn(user)) => *self.user.write() = Some(user),
                Ok(AuthEvent::SignedOut) => *self.user.write() = None,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "auth events lagged, resyncing");
                    *self.user.write() = self.provider.current_user();
                }
                Err(_) => break,
            }
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.drain_events();
        self.user.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    /// Apply the navigation guard for the current user
    pub fn resolve(&self, requested: Route) -> Route {
        routes::resolve(requested, self.is_authenticated())
    }
}
