//! Client-side session lifecycle.
//!
//! There is no authentication server. Registration stores a profile in the
//! local store, login mints a credential for it, and the credential is sent
//! to the catalog as a bearer token. The [SessionManager] is also the
//! [SessionHandle] of the transport, so a 401 from the catalog ends the
//! session here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use derive_more::Display;
use recipebox_catalog::SessionHandle;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::credential::{self, Claims};
use crate::storage::{SharedStore, StoreError, set_json};

pub const CREDENTIAL_KEY: &str = "auth_token";
pub const REFRESH_CREDENTIAL_KEY: &str = "refresh_token";

fn profile_key(username: &str) -> String {
    format!("user_{username}")
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a new user provides when registering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub age: String,
    pub gender: String,
}

/// A stored user profile.
///
/// Attributes the user didn't provide are stored as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub name: String,
    pub age: String,
    pub gender: String,
}

impl UserProfile {
    /// A profile that only knows the username.
    pub fn stub(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }
}

impl From<&Registration> for UserProfile {
    fn from(registration: &Registration) -> Self {
        Self {
            username: registration.username.clone(),
            email: registration.email.clone(),
            name: registration.name.clone(),
            age: registration.age.clone(),
            gender: registration.gender.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginResponse {
    pub credential: String,
    pub refresh_credential: String,
    pub user: UserProfile,
}

/// Broadcast to anyone who needs to react to the session ending.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionStatus {
    #[display("logged in as {_0}")]
    LoggedIn(String),
    #[display("logged out")]
    LoggedOut,
    /// The catalog rejected the credential, the user has to log in again.
    #[display("session expired")]
    Expired,
}

/// Issues, stores, validates and refreshes the session credential.
#[derive(Debug)]
pub struct SessionManager {
    store: SharedStore,
    status: watch::Sender<SessionStatus>,
}

impl SessionManager {
    pub fn new(store: SharedStore) -> Arc<Self> {
        let manager = Self {
            store,
            status: watch::Sender::new(SessionStatus::LoggedOut),
        };
        if let Some(user) = manager.current_user() {
            manager
                .status
                .send_replace(SessionStatus::LoggedIn(user.username));
        }
        Arc::new(manager)
    }

    /// Subscribe to session status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Store a new user profile.
    ///
    /// Registering does not log the user in and the password is not kept.
    /// Registering an existing username replaces its profile.
    pub fn register(&self, registration: &Registration) -> Result<UserProfile, SessionError> {
        if registration.username.is_empty() || registration.password.is_empty() {
            return Err(SessionError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let profile = UserProfile::from(registration);
        set_json(
            self.store.as_ref(),
            &profile_key(&profile.username),
            &profile,
        )?;
        info!(username = %profile.username, "registered user");
        Ok(profile)
    }

    /// Log in as `username`.
    ///
    /// Any non-empty password is accepted. Users that never registered get a
    /// profile that only carries their username.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, SessionError> {
        self.login_at(username, password, Utc::now())
    }

    fn login_at(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginResponse, SessionError> {
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::Validation(
                "Username and password are required".to_string(),
            ));
        }

        let user = self
            .user_info(username)
            .unwrap_or_else(|| UserProfile::stub(username));

        let mut fields = match serde_json::to_value(&user) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        fields.insert("sub".to_string(), json!(username));
        let credential = credential::issue(fields, now);
        let refresh_credential = credential::issue(refresh_fields(username), now);

        self.store.set(CREDENTIAL_KEY, credential.clone())?;
        self.store
            .set(REFRESH_CREDENTIAL_KEY, refresh_credential.clone())?;

        info!(username, "logged in");
        self.status
            .send_replace(SessionStatus::LoggedIn(username.to_string()));

        Ok(LoginResponse {
            credential,
            refresh_credential,
            user,
        })
    }

    /// Forget both credentials. Logging out twice is fine.
    pub fn logout(&self) -> Result<(), SessionError> {
        self.clear()?;
        self.status.send_replace(SessionStatus::LoggedOut);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIAL_KEY)?;
        self.store.remove(REFRESH_CREDENTIAL_KEY)?;
        debug!("cleared session credentials");
        Ok(())
    }

    /// The stored credential, valid or not.
    pub fn credential(&self) -> Option<String> {
        self.read_key(CREDENTIAL_KEY)
    }

    /// The stored refresh credential, valid or not.
    pub fn refresh_credential(&self) -> Option<String> {
        self.read_key(REFRESH_CREDENTIAL_KEY)
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "couldn't read session storage");
                None
            },
        }
    }

    /// `Bearer <credential>` if a credential is stored.
    pub fn auth_header(&self) -> Option<String> {
        self.credential()
            .map(|credential| format!("Bearer {credential}"))
    }

    fn valid_claims_at(&self, now: DateTime<Utc>) -> Option<Claims> {
        let credential = self.credential()?;
        match credential::decode(&credential) {
            Ok(claims) if claims.is_valid_at(now) => Some(claims),
            Ok(_) => {
                debug!("stored credential has expired");
                None
            },
            Err(err) => {
                debug!(error = %err, "stored credential can't be decoded");
                None
            },
        }
    }

    /// Whether a well-formed, unexpired credential is stored.
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated_at(Utc::now())
    }

    fn is_authenticated_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_claims_at(now).is_some()
    }

    /// The profile of the signed-in user.
    ///
    /// Falls back to a username-only profile when none was registered.
    pub fn current_user(&self) -> Option<UserProfile> {
        let claims = self.valid_claims_at(Utc::now())?;
        let username = claims.subject()?;
        Some(
            self.user_info(username)
                .unwrap_or_else(|| UserProfile::stub(username)),
        )
    }

    /// Read a stored profile.
    ///
    /// Unreadable profiles are treated as missing.
    pub fn user_info(&self, username: &str) -> Option<UserProfile> {
        let stored = self.read_key(&profile_key(username))?;
        match serde_json::from_str(&stored) {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!(username, error = %err, "ignoring unreadable user profile");
                None
            },
        }
    }

    /// Issue a fresh credential from the refresh credential.
    ///
    /// The refresh credential itself is kept. Returns whether a new
    /// credential was issued.
    pub fn refresh(&self) -> bool {
        self.refresh_at(Utc::now())
    }

    fn refresh_at(&self, now: DateTime<Utc>) -> bool {
        let Some(refresh_credential) = self.refresh_credential() else {
            return false;
        };
        let claims = match credential::decode(&refresh_credential) {
            Ok(claims) => claims,
            Err(err) => {
                debug!(error = %err, "refresh credential can't be decoded");
                return false;
            },
        };
        let Some(username) = claims.username() else {
            debug!("refresh credential has no username");
            return false;
        };

        let mut fields = Map::new();
        fields.insert("username".to_string(), json!(username));
        fields.insert("sub".to_string(), json!(username));
        let credential = credential::issue(fields, now);

        if let Err(err) = self.store.set(CREDENTIAL_KEY, credential) {
            warn!(error = %err, "couldn't store refreshed credential");
            return false;
        }
        debug!(username, "refreshed credential");
        self.status
            .send_replace(SessionStatus::LoggedIn(username.to_string()));
        true
    }
}

fn refresh_fields(username: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("username".to_string(), json!(username));
    fields.insert("type".to_string(), json!("refresh"));
    fields
}

impl SessionHandle for SessionManager {
    fn bearer_token(&self) -> Option<String> {
        if self.is_authenticated() {
            self.credential()
        } else {
            None
        }
    }

    fn invalidate(&self) {
        if let Err(err) = self.clear() {
            warn!(error = %err, "couldn't clear rejected session");
        }
        self.status.send_replace(SessionStatus::Expired);
    }
}
