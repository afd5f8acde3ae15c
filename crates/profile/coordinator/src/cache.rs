use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use jeeva_health_shared::{normalize_email, Clock};
use profile_integrity::Profile;

#[derive(Clone, Debug)]
struct CachedProfile {
    profile: Profile,
    fetched_at: DateTime<Utc>,
}

/// Read-through cache of authenticated profiles, keyed by principal email.
///
/// Entries older than the staleness window are ignored. Signing out or
/// updating a profile drops its entry. Consent decisions never read from here.
pub struct ProfileCache {
    entries: RwLock<HashMap<String, CachedProfile>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ProfileCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn get(&self, email: &str) -> Option<Profile> {
        let entries = self.entries.read().ok()?;
        let cached = entries.get(&normalize_email(email))?;
        if self.clock.now() - cached.fetched_at >= self.ttl {
            return None;
        }
        Some(cached.profile.clone())
    }

    pub fn put(&self, profile: &Profile) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                normalize_email(&profile.email),
                CachedProfile {
                    profile: profile.clone(),
                    fetched_at: self.clock.now(),
                },
            );
        }
    }

    pub fn invalidate(&self, email: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&normalize_email(email));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
