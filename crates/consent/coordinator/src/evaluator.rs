use std::sync::Arc;

use chrono::{DateTime, Utc};
use consent_integrity::ConsentStatus;
use jeeva_health_shared::{AccessPolicy, AuthorizationResult, Clock, HealthResult, ProfileId};

use crate::store::ConsentStore;

/// Decides whether a doctor may currently access a patient's data.
///
/// The deciding row is the most recently updated request the patient has
/// acted on. A request still awaiting an answer never changes the outcome,
/// so re-requesting does not suspend an approval that is already in effect.
/// Access holds only while that row is approved and its expiry date, if any,
/// has not passed. Every call reads the store; nothing is cached.
pub struct AccessEvaluator {
    store: Arc<dyn ConsentStore>,
    clock: Arc<dyn Clock>,
}

impl AccessEvaluator {
    pub fn new(store: Arc<dyn ConsentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn is_authorized(&self, doctor_id: ProfileId, patient_id: ProfileId) -> HealthResult<bool> {
        self.is_authorized_at(doctor_id, patient_id, self.clock.now())
    }

    pub fn is_authorized_at(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
        now: DateTime<Utc>,
    ) -> HealthResult<bool> {
        Ok(self
            .check_authorization_at(doctor_id, patient_id, now)?
            .authorized)
    }

    pub fn check_authorization_at(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
        now: DateTime<Utc>,
    ) -> HealthResult<AuthorizationResult> {
        let history = self.store.history_for_pair(doctor_id, patient_id)?;

        // max_by_key keeps the last maximum, so equal timestamps resolve to
        // the later insert
        let Some(deciding) = history
            .iter()
            .filter(|request| request.status.is_decided())
            .max_by_key(|request| request.updated_at)
        else {
            let reason = if history.is_empty() {
                "No consent request on record"
            } else {
                "Consent request awaiting the patient's response"
            };
            return Ok(AuthorizationResult::denied(None, reason));
        };

        let result = if deciding.is_in_effect_at(now) {
            AuthorizationResult::granted(deciding.id)
        } else if deciding.status == ConsentStatus::Approved {
            AuthorizationResult::denied(
                Some(deciding.id),
                match deciding.expiry_date {
                    Some(expiry) => format!("Consent expired on {expiry}"),
                    None => "Consent expired".to_string(),
                },
            )
        } else {
            AuthorizationResult::denied(
                Some(deciding.id),
                format!("Most recent consent decision is {}", deciding.status),
            )
        };
        tracing::debug!(
            doctor = %doctor_id,
            patient = %patient_id,
            authorized = result.authorized,
            "access evaluated"
        );
        Ok(result)
    }
}

impl AccessPolicy for AccessEvaluator {
    fn check_authorization(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
    ) -> HealthResult<AuthorizationResult> {
        self.check_authorization_at(doctor_id, patient_id, self.clock.now())
    }
}
