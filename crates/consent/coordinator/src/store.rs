use std::sync::RwLock;

use chrono::{DateTime, Utc};
use consent_integrity::{ConsentRequest, ConsentStatus};
use jeeva_health_shared::{ConsentId, HealthError, HealthResult, ProfileId};

/// New status and timestamps written by a guarded transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ConsentStatus,
    /// Left untouched when `None`
    pub responded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a compare-and-set on a request's status
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The status matched and the update was written
    Applied(ConsentRequest),
    /// The status no longer matched; carries the row as it is now
    Conflict(ConsentRequest),
    Missing,
}

/// Durable storage of consent requests.
///
/// Rows are never deleted. Listing methods return rows in insertion order.
pub trait ConsentStore: Send + Sync {
    fn insert(&self, request: ConsentRequest) -> HealthResult<ConsentRequest>;

    fn get(&self, id: ConsentId) -> HealthResult<Option<ConsentRequest>>;

    fn list_for_doctor(&self, doctor_id: ProfileId) -> HealthResult<Vec<ConsentRequest>>;

    fn list_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<ConsentRequest>>;

    /// Every request between one doctor and one patient
    fn history_for_pair(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
    ) -> HealthResult<Vec<ConsentRequest>>;

    /// Atomically apply `update` only if the row's status is still `expected`.
    fn compare_and_set(
        &self,
        id: ConsentId,
        expected: ConsentStatus,
        update: StatusUpdate,
    ) -> HealthResult<CasOutcome>;
}

/// In-process store; a single write lock makes compare-and-set atomic.
#[derive(Debug, Default)]
pub struct MemoryConsentStore {
    rows: RwLock<Vec<ConsentRequest>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn filtered(
        &self,
        predicate: impl Fn(&ConsentRequest) -> bool,
    ) -> HealthResult<Vec<ConsentRequest>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| HealthError::lock_poisoned("consent store"))?;
        Ok(rows.iter().filter(|row| predicate(row)).cloned().collect())
    }
}

impl ConsentStore for MemoryConsentStore {
    fn insert(&self, request: ConsentRequest) -> HealthResult<ConsentRequest> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| HealthError::lock_poisoned("consent store"))?;
        if rows.iter().any(|row| row.id == request.id) {
            return Err(HealthError::InternalError(format!(
                "consent request {} already stored",
                request.id
            )));
        }
        rows.push(request.clone());
        Ok(request)
    }

    fn get(&self, id: ConsentId) -> HealthResult<Option<ConsentRequest>> {
        let rows = self
            .rows
            .read()
            .map_err(|_| HealthError::lock_poisoned("consent store"))?;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    fn list_for_doctor(&self, doctor_id: ProfileId) -> HealthResult<Vec<ConsentRequest>> {
        self.filtered(|row| row.doctor_id == doctor_id)
    }

    fn list_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<ConsentRequest>> {
        self.filtered(|row| row.patient_id == patient_id)
    }

    fn history_for_pair(
        &self,
        doctor_id: ProfileId,
        patient_id: ProfileId,
    ) -> HealthResult<Vec<ConsentRequest>> {
        self.filtered(|row| row.doctor_id == doctor_id && row.patient_id == patient_id)
    }

    fn compare_and_set(
        &self,
        id: ConsentId,
        expected: ConsentStatus,
        update: StatusUpdate,
    ) -> HealthResult<CasOutcome> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| HealthError::lock_poisoned("consent store"))?;
        let Some(row) = rows.iter_mut().find(|row| row.id == id) else {
            return Ok(CasOutcome::Missing);
        };
        if row.status != expected {
            return Ok(CasOutcome::Conflict(row.clone()));
        }
        row.status = update.status;
        if let Some(responded_at) = update.responded_at {
            row.responded_at = Some(responded_at);
        }
        row.updated_at = update.updated_at;
        Ok(CasOutcome::Applied(row.clone()))
    }
}
