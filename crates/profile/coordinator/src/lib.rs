//! Profile Coordinator
//!
//! Identity directory operations: resolve the authenticated principal to a
//! Profile (creating one on first sight), self-service updates, patient
//! provisioning for invitations, and role checks used by the consent ledger.

mod cache;
mod directory;

pub use cache::ProfileCache;
pub use directory::{MemoryDirectory, ProfileDirectory};

use std::sync::Arc;

use jeeva_health_shared::{
    normalize_email, validate_email, Caller, Clock, HealthError, HealthResult, ProfileId, Role,
};
use profile_integrity::{validate_profile, validate_profile_update, Profile, ProfileUpdate};

pub struct ProfileService {
    directory: Arc<dyn ProfileDirectory>,
    cache: ProfileCache,
    clock: Arc<dyn Clock>,
}

impl ProfileService {
    pub fn new(
        directory: Arc<dyn ProfileDirectory>,
        cache: ProfileCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            cache,
            clock,
        }
    }

    /// Profile of the authenticated principal, created as a patient on first sight.
    pub fn me(&self, email: &str) -> HealthResult<Profile> {
        validate_email(email).into_result()?;

        if let Some(profile) = self.cache.get(email) {
            return Ok(profile);
        }

        let profile = match self.directory.find_by_email(email)? {
            Some(profile) => profile,
            None => self.create(email, Role::Patient)?,
        };
        self.cache.put(&profile);
        Ok(profile)
    }

    /// Caller identity for access checks
    pub fn caller(&self, email: &str) -> HealthResult<Caller> {
        let profile = self.me(email)?;
        Ok(Caller {
            id: profile.id,
            role: profile.role,
        })
    }

    /// Apply a partial update to the caller's own profile.
    pub fn update_me(&self, email: &str, update: ProfileUpdate) -> HealthResult<Profile> {
        // Read through the directory, not the cache, before writing
        self.cache.invalidate(email);
        let mut profile = self.me(email)?;

        validate_profile_update(&profile, &update).into_result()?;
        update.apply(&mut profile, self.clock.now());
        validate_profile(&profile, self.clock.now().date_naive()).into_result()?;

        let updated = self.directory.update(profile)?;
        self.cache.invalidate(email);
        tracing::info!(profile = %updated.id, role = %updated.role, "profile updated");
        Ok(updated)
    }

    /// Forget the cached profile of a principal that signed out.
    pub fn sign_out(&self, email: &str) {
        self.cache.invalidate(email);
    }

    pub fn get(&self, id: ProfileId) -> HealthResult<Profile> {
        self.directory
            .get(id)?
            .ok_or_else(|| HealthError::NotFound(format!("Profile {id}")))
    }

    pub fn find_by_email(&self, email: &str) -> HealthResult<Option<Profile>> {
        self.directory.find_by_email(email)
    }

    /// Create a minimal patient profile for an invited, not yet registered email.
    pub fn provision_patient(&self, email: &str) -> HealthResult<Profile> {
        validate_email(email).into_result()?;
        let profile = self.create(email, Role::Patient)?;
        tracing::warn!(profile = %profile.id, "patient profile provisioned without signup");
        Ok(profile)
    }

    fn create(&self, email: &str, role: Role) -> HealthResult<Profile> {
        let profile = Profile::new(email, role, self.clock.now());
        validate_profile(&profile, self.clock.now().date_naive()).into_result()?;
        match self.directory.insert(profile) {
            Ok(profile) => {
                tracing::info!(profile = %profile.id, %role, "profile created");
                Ok(profile)
            }
            // Lost a race with a concurrent first request for the same email
            Err(HealthError::ValidationError(_)) => self
                .directory
                .find_by_email(email)?
                .ok_or_else(|| HealthError::NotFound(format!("Profile {}", normalize_email(email)))),
            Err(err) => Err(err),
        }
    }
}

/// Resolve a profile and require it to hold the given role.
pub fn require_role(
    directory: &dyn ProfileDirectory,
    id: ProfileId,
    role: Role,
) -> HealthResult<Profile> {
    let profile = directory
        .get(id)?
        .ok_or_else(|| HealthError::NotFound(format!("{role} profile {id}")))?;
    if profile.role != role {
        return Err(HealthError::ValidationError(format!(
            "Profile {id} is a {}, not a {role}",
            profile.role
        )));
    }
    Ok(profile)
}
