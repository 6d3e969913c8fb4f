//! The signed-in viewer. Built on login, persisted in the config store and
//! handed explicitly to whatever needs it.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiClient, ApiError};
use crate::config::{ConfigError, ConfigStore};
use crate::models::{Event, UserProfile, UserRole};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in; run `event-lagbe login` first")]
    SignedOut,
    #[error("this action needs one of these roles: {0}")]
    Forbidden(String),
    #[error("you do not manage event {0}")]
    NotEventManager(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub firebase_uid: String,
    /// Bearer token issued by the identity provider.
    pub id_token: Option<String>,
    pub user: UserProfile,
    pub role: UserRole,
}

impl Session {
    pub fn new(user: UserProfile, id_token: Option<String>, fallback_role: UserRole) -> Self {
        let role = user.role.unwrap_or(fallback_role);
        Self {
            firebase_uid: user.firebase_uid.clone(),
            id_token,
            user,
            role,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), SessionError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            let names = allowed
                .iter()
                .map(UserRole::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            Err(SessionError::Forbidden(names))
        }
    }

    /// Organizers and organizations host events; admins may act for them.
    pub fn require_host(&self) -> Result<(), SessionError> {
        if self.role.can_host_events() || self.is_admin() {
            Ok(())
        } else {
            Err(SessionError::Forbidden("organizer, organization".to_string()))
        }
    }

    /// Owners, co-hosts and admins may edit an event.
    pub fn can_manage_event(&self, event: &Event) -> bool {
        self.is_admin() || event.is_hosted_by(self.user_id())
    }

    pub fn ensure_can_manage(&self, event: &Event) -> Result<(), SessionError> {
        if self.can_manage_event(event) {
            Ok(())
        } else {
            Err(SessionError::NotEventManager(event.id.clone()))
        }
    }
}

pub fn current(store: &ConfigStore) -> Result<Session, SessionError> {
    store.read().session.ok_or(SessionError::SignedOut)
}

/// Resolves the profile behind `firebase_uid` and stores the session.
pub async fn login(
    store: &ConfigStore,
    client: &ApiClient,
    firebase_uid: &str,
    id_token: Option<String>,
    fallback_role: UserRole,
) -> Result<Session, SessionError> {
    let client = match &id_token {
        Some(token) => client.clone().with_token(token.clone()),
        None => client.clone(),
    };
    let profile = client.fetch_profile(firebase_uid.trim()).await?;
    let session = Session::new(profile, id_token, fallback_role);
    let saved = session.clone();
    store.update(move |config| config.session = Some(saved))?;
    info!(user = %session.user.display_name(), role = %session.role, "signed in");
    Ok(session)
}

pub fn logout(store: &ConfigStore) -> Result<(), SessionError> {
    store.update(|config| config.session = None)?;
    info!("signed out");
    Ok(())
}
