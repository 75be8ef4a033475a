use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::profile::Profile;
use crate::domain::voucher::PrincipalId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("profile directory unavailable: {0}")]
    Unavailable(String),
}

/// Looks up employee contact details for notifications addressed to the voucher owner.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn profile(&self, user_id: &PrincipalId) -> Result<Option<Profile>, DirectoryError>;

    /// Stores the e-mail the principal authenticated with. An existing full name is kept.
    async fn record_contact(&self, user_id: &PrincipalId, email: &str)
        -> Result<(), DirectoryError>;
}

#[derive(Default)]
pub struct InMemoryProfileDirectory {
    profiles: RwLock<HashMap<PrincipalId, Profile>>,
}

impl InMemoryProfileDirectory {
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        let profiles =
            profiles.into_iter().map(|profile| (profile.user_id.clone(), profile)).collect();
        Self { profiles: RwLock::new(profiles) }
    }

    pub async fn upsert(&self, profile: Profile) {
        self.profiles.write().await.insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryProfileDirectory {
    async fn profile(&self, user_id: &PrincipalId) -> Result<Option<Profile>, DirectoryError> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn record_contact(
        &self,
        user_id: &PrincipalId,
        email: &str,
    ) -> Result<(), DirectoryError> {
        let mut profiles = self.profiles.write().await;
        profiles
            .entry(user_id.clone())
            .and_modify(|profile| profile.email = email.to_owned())
            .or_insert_with(|| Profile {
                user_id: user_id.clone(),
                email: email.to_owned(),
                full_name: None,
            });
        Ok(())
    }
}
