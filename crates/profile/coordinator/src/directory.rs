use std::collections::HashMap;
use std::sync::RwLock;

use jeeva_health_shared::{normalize_email, HealthError, HealthResult, ProfileId};
use profile_integrity::Profile;

/// Maps principals to their Profile records.
pub trait ProfileDirectory: Send + Sync {
    fn get(&self, id: ProfileId) -> HealthResult<Option<Profile>>;

    /// Case-insensitive lookup
    fn find_by_email(&self, email: &str) -> HealthResult<Option<Profile>>;

    /// Insert a new profile. Fails with `ValidationError` when the email is taken.
    fn insert(&self, profile: Profile) -> HealthResult<Profile>;

    /// Replace an existing profile. Fails with `NotFound` when absent.
    fn update(&self, profile: Profile) -> HealthResult<Profile>;
}

#[derive(Debug, Default)]
struct DirectoryInner {
    by_id: HashMap<ProfileId, Profile>,
    by_email: HashMap<String, ProfileId>,
}

/// In-process directory used by the service binary and tests
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    inner: RwLock<DirectoryInner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileDirectory for MemoryDirectory {
    fn get(&self, id: ProfileId) -> HealthResult<Option<Profile>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| HealthError::lock_poisoned("profile directory"))?;
        Ok(inner.by_id.get(&id).cloned())
    }

    fn find_by_email(&self, email: &str) -> HealthResult<Option<Profile>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| HealthError::lock_poisoned("profile directory"))?;
        Ok(inner
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    fn insert(&self, profile: Profile) -> HealthResult<Profile> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| HealthError::lock_poisoned("profile directory"))?;
        let email = normalize_email(&profile.email);
        if inner.by_email.contains_key(&email) {
            return Err(HealthError::ValidationError(format!(
                "A profile with email {email} already exists"
            )));
        }
        inner.by_email.insert(email, profile.id);
        inner.by_id.insert(profile.id, profile.clone());
        Ok(profile)
    }

    fn update(&self, profile: Profile) -> HealthResult<Profile> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| HealthError::lock_poisoned("profile directory"))?;
        let existing = inner
            .by_id
            .get(&profile.id)
            .ok_or_else(|| HealthError::NotFound(format!("Profile {}", profile.id)))?;
        if normalize_email(&existing.email) != normalize_email(&profile.email) {
            return Err(HealthError::ValidationError(
                "Profile email cannot be changed".to_string(),
            ));
        }
        inner.by_id.insert(profile.id, profile.clone());
        Ok(profile)
    }
}
