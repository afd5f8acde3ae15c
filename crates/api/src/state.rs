use std::sync::Arc;

use axum::http::HeaderMap;
use consent::{AccessEvaluator, ConsentLedger, ConsentStore, MemoryConsentStore};
use jeeva_health_shared::{Caller, Clock, MemoryAuditLog};
use profile::{MemoryDirectory, ProfileCache, ProfileDirectory, ProfileService};
use profile_integrity::Profile;
use records::{InsightGenerator, MemoryRecordStore, RecordService, UnconfiguredGenerator};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

/// Header carrying the authenticated principal's email
pub const USER_EMAIL_HEADER: &str = "x-user-email";

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub profiles: ProfileService,
    pub ledger: ConsentLedger,
    pub evaluator: Arc<AccessEvaluator>,
    pub records: RecordService,
    pub auto_provision: bool,
}

impl AppState {
    /// Wire every service over in-process stores.
    pub fn in_memory(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::with_generator(config, clock, Arc::new(UnconfiguredGenerator))
    }

    pub fn with_generator(
        config: &Config,
        clock: Arc<dyn Clock>,
        generator: Arc<dyn InsightGenerator>,
    ) -> Self {
        let directory: Arc<dyn ProfileDirectory> = Arc::new(MemoryDirectory::new());
        let consents: Arc<dyn ConsentStore> = Arc::new(MemoryConsentStore::new());
        let evaluator = Arc::new(AccessEvaluator::new(consents.clone(), clock.clone()));

        let profiles = ProfileService::new(
            directory.clone(),
            ProfileCache::new(config.profile_cache_ttl(), clock.clone()),
            clock.clone(),
        );
        let ledger = ConsentLedger::new(consents, directory.clone(), clock.clone());
        let records = RecordService::new(
            Arc::new(MemoryRecordStore::new()),
            directory,
            evaluator.clone(),
            Arc::new(MemoryAuditLog::new()),
            generator,
            clock,
        );

        Self {
            profiles,
            ledger,
            evaluator,
            records,
            auto_provision: config.auto_provision_patients,
        }
    }

    /// Resolve the request's principal, creating their profile on first sight.
    pub fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Profile> {
        let email = extract_email(headers)?;
        Ok(self.profiles.me(&email)?)
    }

    pub fn caller(&self, headers: &HeaderMap) -> ApiResult<Caller> {
        Ok(self.profiles.caller(&extract_email(headers)?)?)
    }
}

pub fn extract_email(headers: &HeaderMap) -> ApiResult<String> {
    headers
        .get(USER_EMAIL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(|email| email.to_string())
        .ok_or_else(|| ApiError::unauthorized("Missing X-User-Email header"))
}
