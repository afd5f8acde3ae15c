//! Shared fixture: every service wired over in-memory stores and one
//! manually driven clock.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use consent::{AccessEvaluator, ConsentLedger, ConsentStore, MemoryConsentStore};
use jeeva_health_shared::{
    Caller, Clock, HealthError, HealthResult, ManualClock, MemoryAuditLog, Role,
};
use profile::{MemoryDirectory, ProfileCache, ProfileService};
use profile_integrity::ProfileUpdate;
use records::{InsightGenerator, InsightPrompt, MemoryRecordStore, RecordService};

/// Returns the same text for every prompt, or fails when empty
pub struct FixedGenerator(pub String);

impl InsightGenerator for FixedGenerator {
    fn generate(&self, _prompt: &InsightPrompt) -> HealthResult<String> {
        if self.0.is_empty() {
            return Err(HealthError::Upstream("generator returned nothing".to_string()));
        }
        Ok(self.0.clone())
    }
}

pub struct World {
    pub clock: Arc<ManualClock>,
    pub directory: Arc<MemoryDirectory>,
    pub profiles: ProfileService,
    pub ledger: ConsentLedger,
    pub evaluator: Arc<AccessEvaluator>,
    pub records: RecordService,
    pub audit: Arc<MemoryAuditLog>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2)
            .and_then(|day| day.and_hms_opt(9, 0, 0))
            .map(|at| at.and_utc())
            .unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self::with_generator(start, Arc::new(FixedGenerator(String::new())))
    }

    pub fn with_generator(start: DateTime<Utc>, generator: Arc<dyn InsightGenerator>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let directory = Arc::new(MemoryDirectory::new());
        let consents: Arc<dyn ConsentStore> = Arc::new(MemoryConsentStore::new());
        let evaluator = Arc::new(AccessEvaluator::new(consents.clone(), clock.clone()));
        let audit = Arc::new(MemoryAuditLog::new());

        let profiles = ProfileService::new(
            directory.clone(),
            ProfileCache::new(Duration::minutes(5), clock.clone()),
            clock.clone(),
        );
        let ledger = ConsentLedger::new(consents, directory.clone(), clock.clone());
        let records = RecordService::new(
            Arc::new(MemoryRecordStore::new()),
            directory.clone(),
            evaluator.clone(),
            audit.clone(),
            generator,
            clock.clone(),
        );

        Self {
            clock,
            directory,
            profiles,
            ledger,
            evaluator,
            records,
            audit,
        }
    }

    /// Sign in a new principal; they start as a patient.
    pub fn patient(&self, email: &str) -> HealthResult<Caller> {
        self.profiles.caller(email)
    }

    /// Sign in a principal and switch their profile to doctor.
    pub fn doctor(&self, email: &str) -> HealthResult<Caller> {
        let profile = self.profiles.update_me(
            email,
            ProfileUpdate {
                role: Some(Role::Doctor),
                specialization: Some("General Medicine".to_string()),
                ..Default::default()
            },
        )?;
        Ok(Caller {
            id: profile.id,
            role: profile.role,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
