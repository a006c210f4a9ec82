use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::message::UserProfile;
use crate::store::MessageStore;

/// The signed-in user, as handed over by the external auth layer.
#[derive(Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
    /// Supabase Auth JWT, if the session carries one.
    pub access_token: Option<String>,
}

impl std::fmt::Debug for CurrentUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentUser")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("avatar_url", &self.avatar_url)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl CurrentUser {
    /// Build from an auth session. The display name is the full name when
    /// present, else the email.
    pub fn from_auth(
        id: impl Into<String>,
        full_name: Option<&str>,
        email: Option<&str>,
        avatar_url: Option<&str>,
        access_token: Option<String>,
    ) -> Self {
        let display_name = full_name
            .filter(|n| !n.trim().is_empty())
            .or(email)
            .unwrap_or_default()
            .to_string();
        Self {
            id: id.into(),
            display_name,
            avatar_url: avatar_url.unwrap_or_default().to_string(),
            access_token,
        }
    }

    /// Row for the `users` table.
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Application-wide current user. Clones share state.
///
/// Populated once after the first authenticated load and cleared on
/// logout; components read it instead of reaching for a global.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    inner: Arc<RwLock<Option<CurrentUser>>>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current user and upsert their profile row.
    ///
    /// Returns false (and does nothing) if a user is already set. A failed
    /// upsert is logged and otherwise ignored.
    pub async fn init(&self, user: CurrentUser, store: &dyn MessageStore) -> bool {
        {
            let mut slot = self.inner.write().await;
            if slot.is_some() {
                return false;
            }
            *slot = Some(user.clone());
        }
        info!(user_id = %user.id, "Current user initialized");

        if let Err(e) = store.upsert_profile(&user.to_profile()).await {
            warn!(user_id = %user.id, error = %e, "Failed to upsert user profile");
        }
        true
    }

    pub async fn current(&self) -> Option<CurrentUser> {
        self.inner.read().await.clone()
    }

    pub async fn is_signed_in(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Forget the current user (logout).
    pub async fn clear(&self) {
        if self.inner.write().await.take().is_some() {
            info!("Current user cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ada() -> CurrentUser {
        CurrentUser::from_auth("u1", Some("Ada Lovelace"), Some("ada@example.com"), None, None)
    }

    #[test]
    fn display_name_prefers_full_name() {
        assert_eq!(ada().display_name, "Ada Lovelace");
        let u = CurrentUser::from_auth("u2", None, Some("bob@example.com"), None, None);
        assert_eq!(u.display_name, "bob@example.com");
        let u = CurrentUser::from_auth("u3", Some("  "), None, None, None);
        assert_eq!(u.display_name, "");
    }

    #[test]
    fn debug_redacts_token() {
        let u = CurrentUser::from_auth("u1", None, None, None, Some("jwt-secret".into()));
        assert!(!format!("{u:?}").contains("jwt-secret"));
    }

    #[tokio::test]
    async fn init_populates_once_and_upserts() {
        let store = MemoryStore::new();
        let ctx = UserContext::new();
        assert!(!ctx.is_signed_in().await);

        assert!(ctx.init(ada(), &store).await);
        let other = CurrentUser::from_auth("u9", Some("Eve"), None, None, None);
        assert!(!ctx.init(other, &store).await);

        assert_eq!(ctx.current().await.unwrap().id, "u1");
        let profiles = store.profiles().await;
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].display_name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn upsert_failure_is_not_fatal() {
        let store = MemoryStore::new();
        store.set_reject_mutations(Some("rls".into())).await;
        let ctx = UserContext::new();
        assert!(ctx.init(ada(), &store).await);
        assert!(ctx.is_signed_in().await);
    }

    #[tokio::test]
    async fn clear_allows_a_new_user() {
        let store = MemoryStore::new();
        let ctx = UserContext::new();
        let shared = ctx.clone();
        ctx.init(ada(), &store).await;
        shared.clear().await;
        assert!(ctx.current().await.is_none());
        let bob = CurrentUser::from_auth("u2", Some("Bob"), None, None, None);
        assert!(ctx.init(bob, &store).await);
    }
}
