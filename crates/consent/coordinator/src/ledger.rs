use std::sync::Arc;

use chrono::NaiveDate;
use consent_integrity::{
    transition, validate_consent_request, validate_status_change, ConsentEvent, ConsentRequest,
    ConsentStatus,
};
use jeeva_health_shared::{Clock, ConsentId, HealthError, HealthResult, ProfileId, Role};
use profile::{require_role, ProfileDirectory, ProfileService};
use profile_integrity::ProfileSummary;
use serde::{Deserialize, Serialize};

use crate::store::{CasOutcome, ConsentStore, StatusUpdate};

/// Which side of a request the caller is listing from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentParty {
    Doctor,
    Patient,
}

/// A consent request with minimal profiles of both parties embedded
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsentView {
    #[serde(flatten)]
    pub request: ConsentRequest,
    pub doctor: Option<ProfileSummary>,
    pub patient: Option<ProfileSummary>,
}

/// Creates, lists and transitions consent requests.
pub struct ConsentLedger {
    store: Arc<dyn ConsentStore>,
    directory: Arc<dyn ProfileDirectory>,
    clock: Arc<dyn Clock>,
}

impl ConsentLedger {
    pub fn new(
        store: Arc<dyn ConsentStore>,
        directory: Arc<dyn ProfileDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
        }
    }

    /// Record a new pending request from a doctor to a patient.
    ///
    /// Not idempotent: every call stores a new row.
    pub fn create_request(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
        purpose: &str,
        expiry_date: Option<NaiveDate>,
    ) -> HealthResult<ConsentRequest> {
        require_role(self.directory.as_ref(), doctor_id, Role::Doctor)?;
        require_role(self.directory.as_ref(), patient_id, Role::Patient)?;

        let request = ConsentRequest::new(
            doctor_id,
            patient_id,
            purpose,
            expiry_date,
            self.clock.now(),
        );
        validate_consent_request(&request).into_result()?;

        let request = self.store.insert(request)?;
        tracing::info!(
            consent = %request.id,
            doctor = %doctor_id,
            patient = %patient_id,
            "consent requested"
        );
        Ok(request)
    }

    /// Request consent from a patient known only by email.
    ///
    /// An unregistered email is `NotFound` unless `profiles` is given, in which
    /// case a minimal patient profile is provisioned for it first.
    pub fn request_by_email(
        &self,
        doctor_id: ProfileId,
        patient_email: &str,
        purpose: &str,
        expiry_date: Option<NaiveDate>,
        profiles: Option<&ProfileService>,
    ) -> HealthResult<ConsentRequest> {
        let patient = match (self.directory.find_by_email(patient_email)?, profiles) {
            (Some(patient), _) => patient,
            (None, Some(profiles)) => profiles.provision_patient(patient_email)?,
            (None, None) => {
                return Err(HealthError::NotFound(format!(
                    "No patient registered with email {}",
                    patient_email.trim()
                )))
            }
        };
        self.create_request(doctor_id, patient.id, purpose, expiry_date)
    }

    /// A single request, visible only to its doctor and patient
    pub fn get(&self, id: ConsentId, caller_id: ProfileId) -> HealthResult<ConsentRequest> {
        let request = self.load(id)?;
        if !request.involves(caller_id) {
            return Err(HealthError::Unauthorized(format!(
                "Consent request {id} is not addressed to this profile"
            )));
        }
        Ok(request)
    }

    /// Every request the doctor made, newest first
    pub fn list_for_doctor(&self, doctor_id: ProfileId) -> HealthResult<Vec<ConsentRequest>> {
        Ok(newest_first(self.store.list_for_doctor(doctor_id)?))
    }

    /// The patient's inbox, newest first
    pub fn list_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<ConsentRequest>> {
        Ok(newest_first(self.store.list_for_patient(patient_id)?))
    }

    pub fn list_for_party(
        &self,
        party: ConsentParty,
        profile_id: ProfileId,
    ) -> HealthResult<Vec<ConsentRequest>> {
        match party {
            ConsentParty::Doctor => self.list_for_doctor(profile_id),
            ConsentParty::Patient => self.list_for_patient(profile_id),
        }
    }

    /// Approve or deny a pending request addressed to `patient_id`.
    pub fn respond(
        &self,
        id: ConsentId,
        patient_id: ProfileId,
        status: ConsentStatus,
    ) -> HealthResult<ConsentRequest> {
        let event = ConsentEvent::for_response(status).ok_or_else(|| {
            HealthError::ValidationError(format!(
                "A response must approve or deny, not set the request to {status}"
            ))
        })?;
        self.apply(id, patient_id, event)
    }

    /// Withdraw an earlier approval.
    pub fn revoke(&self, id: ConsentId, patient_id: ProfileId) -> HealthResult<ConsentRequest> {
        self.apply(id, patient_id, ConsentEvent::Revoke)
    }

    /// Embed minimal profiles of both parties.
    pub fn with_parties(&self, request: ConsentRequest) -> HealthResult<ConsentView> {
        let doctor = self.directory.get(request.doctor_id)?.map(|p| p.summary());
        let patient = self.directory.get(request.patient_id)?.map(|p| p.summary());
        Ok(ConsentView {
            request,
            doctor,
            patient,
        })
    }

    fn load(&self, id: ConsentId) -> HealthResult<ConsentRequest> {
        self.store
            .get(id)?
            .ok_or_else(|| HealthError::NotFound(format!("Consent request {id}")))
    }

    fn apply(
        &self,
        id: ConsentId,
        patient_id: ProfileId,
        event: ConsentEvent,
    ) -> HealthResult<ConsentRequest> {
        let current = self.load(id)?;

        if current.patient_id != patient_id {
            tracing::warn!(consent = %id, actor = %patient_id, ?event, "consent change by non-owner refused");
            return Err(HealthError::Unauthorized(format!(
                "Consent request {id} is addressed to a different patient"
            )));
        }

        let next = transition(current.status, event)?;
        let now = self.clock.now().max(current.updated_at);
        let update = StatusUpdate {
            status: next,
            responded_at: event.is_response().then_some(now),
            updated_at: now,
        };

        let mut proposed = current.clone();
        proposed.status = update.status;
        if let Some(responded_at) = update.responded_at {
            proposed.responded_at = Some(responded_at);
        }
        proposed.updated_at = update.updated_at;
        validate_status_change(&current, &proposed).into_result()?;

        match self.store.compare_and_set(id, current.status, update)? {
            CasOutcome::Applied(updated) => {
                tracing::info!(
                    consent = %id,
                    from = %current.status,
                    to = %updated.status,
                    "consent status changed"
                );
                Ok(updated)
            }
            CasOutcome::Conflict(latest) => Err(HealthError::InvalidTransition(format!(
                "Consent request {id} changed concurrently and is now {}",
                latest.status
            ))),
            CasOutcome::Missing => Err(HealthError::NotFound(format!("Consent request {id}"))),
        }
    }
}

/// Order by `requested_at` descending; rows arrive in insertion order, so
/// reversing first keeps later inserts ahead on ties.
fn newest_first(mut requests: Vec<ConsentRequest>) -> Vec<ConsentRequest> {
    requests.reverse();
    requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
    requests
}
