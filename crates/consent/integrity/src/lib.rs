//! Patient Consent Integrity
//!
//! Defines the consent request entry, the status state machine that governs
//! it, and the validation rules every stored row and every status change must
//! satisfy.

use chrono::{DateTime, NaiveDate, Utc};
use jeeva_health_shared::{
    validate_required_text, ConsentId, HealthError, HealthResult, ProfileId, ValidationErrorCode,
    ValidationResult,
};
use serde::{Deserialize, Serialize};

/// Purpose recorded when the doctor leaves it blank
pub const DEFAULT_PURPOSE: &str = "Access to health records";
pub const MAX_PURPOSE_LEN: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Denied,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Pending => "pending",
            ConsentStatus::Approved => "approved",
            ConsentStatus::Denied => "denied",
            ConsentStatus::Revoked => "revoked",
        }
    }

    /// Whether the patient has acted on the request
    pub fn is_decided(&self) -> bool {
        !matches!(self, ConsentStatus::Pending)
    }
}

impl std::fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConsentStatus {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ConsentStatus::Pending),
            "approved" => Ok(ConsentStatus::Approved),
            "denied" => Ok(ConsentStatus::Denied),
            "revoked" => Ok(ConsentStatus::Revoked),
            other => Err(HealthError::ValidationError(format!(
                "Unknown consent status '{other}'"
            ))),
        }
    }
}

/// Patient actions on an existing request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentEvent {
    Approve,
    Deny,
    Revoke,
}

impl ConsentEvent {
    /// The event a patient response with the given status stands for.
    pub fn for_response(status: ConsentStatus) -> Option<Self> {
        match status {
            ConsentStatus::Approved => Some(ConsentEvent::Approve),
            ConsentStatus::Denied => Some(ConsentEvent::Deny),
            ConsentStatus::Pending | ConsentStatus::Revoked => None,
        }
    }

    /// Approve and deny answer the request; revoke withdraws an earlier answer.
    pub fn is_response(&self) -> bool {
        matches!(self, ConsentEvent::Approve | ConsentEvent::Deny)
    }
}

/// Apply an event to a status.
///
/// | From     | Event   | To       |
/// |----------|---------|----------|
/// | pending  | approve | approved |
/// | pending  | deny    | denied   |
/// | approved | revoke  | revoked  |
///
/// Every other combination is an `InvalidTransition`.
pub fn transition(from: ConsentStatus, event: ConsentEvent) -> HealthResult<ConsentStatus> {
    match (from, event) {
        (ConsentStatus::Pending, ConsentEvent::Approve) => Ok(ConsentStatus::Approved),
        (ConsentStatus::Pending, ConsentEvent::Deny) => Ok(ConsentStatus::Denied),
        (ConsentStatus::Approved, ConsentEvent::Revoke) => Ok(ConsentStatus::Revoked),
        (from, event) => Err(HealthError::InvalidTransition(format!(
            "cannot {event:?} a consent request that is {from}"
        ))),
    }
}

/// Purpose text to store: the trimmed input, or the default when blank
pub fn resolve_purpose(purpose: &str) -> String {
    let purpose = purpose.trim();
    if purpose.is_empty() {
        DEFAULT_PURPOSE.to_string()
    } else {
        purpose.to_string()
    }
}

/// One doctor's ask to access one patient's data for a stated purpose
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: ConsentId,
    pub doctor_id: ProfileId,
    pub patient_id: ProfileId,
    pub purpose: String,
    pub status: ConsentStatus,
    /// Last calendar day (UTC) on which an approval grants access
    pub expiry_date: Option<NaiveDate>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ConsentRequest {
    pub fn new(
        doctor_id: ProfileId,
        patient_id: ProfileId,
        purpose: &str,
        expiry_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConsentId::new(),
            doctor_id,
            patient_id,
            purpose: resolve_purpose(purpose),
            status: ConsentStatus::Pending,
            expiry_date,
            requested_at: now,
            responded_at: None,
            updated_at: now,
        }
    }

    /// Whether the expiry date, if any, has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date
            .map(|expiry| now.date_naive() > expiry)
            .unwrap_or(false)
    }

    /// Approved and not expired at `now`
    pub fn is_in_effect_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Approved && !self.is_expired_at(now)
    }

    pub fn involves(&self, profile_id: ProfileId) -> bool {
        self.doctor_id == profile_id || self.patient_id == profile_id
    }
}

/// Validate a consent request before it is stored
pub fn validate_consent_request(request: &ConsentRequest) -> ValidationResult {
    let mut result = validate_required_text(&request.purpose, "purpose", MAX_PURPOSE_LEN);

    if request.doctor_id == request.patient_id {
        result.add_error(
            "patient_id",
            "A doctor cannot request consent from themselves",
            ValidationErrorCode::InvalidReference,
        );
    }

    if let Some(expiry) = request.expiry_date {
        if expiry < request.requested_at.date_naive() {
            result.add_error(
                "expiry_date",
                "Expiry date cannot be before the request date",
                ValidationErrorCode::OutOfRange,
            );
        }
    }

    match (request.status, request.responded_at) {
        (ConsentStatus::Pending, Some(_)) => result.add_error(
            "responded_at",
            "A pending request cannot have a response time",
            ValidationErrorCode::InvalidFormat,
        ),
        (status, None) if status.is_decided() => result.add_error(
            "responded_at",
            "A decided request must record its response time",
            ValidationErrorCode::Required,
        ),
        _ => {}
    }

    if request.updated_at < request.requested_at {
        result.add_error(
            "updated_at",
            "Request cannot be updated before it was made",
            ValidationErrorCode::OutOfRange,
        );
    }

    result
}

/// Validate an update of a stored request: only status and timestamps may
/// change, and the status change must be a legal transition.
pub fn validate_status_change(original: &ConsentRequest, updated: &ConsentRequest) -> ValidationResult {
    let mut result = validate_consent_request(updated);

    let immutable_unchanged = original.id == updated.id
        && original.doctor_id == updated.doctor_id
        && original.patient_id == updated.patient_id
        && original.purpose == updated.purpose
        && original.expiry_date == updated.expiry_date
        && original.requested_at == updated.requested_at;
    if !immutable_unchanged {
        result.add_error(
            "id",
            "Only the status of a consent request can change",
            ValidationErrorCode::InvalidReference,
        );
    }

    let legal = [ConsentEvent::Approve, ConsentEvent::Deny, ConsentEvent::Revoke]
        .into_iter()
        .any(|event| transition(original.status, event).ok() == Some(updated.status));
    if !legal {
        result.add_error(
            "status",
            &format!("Illegal status change {} -> {}", original.status, updated.status),
            ValidationErrorCode::InvalidFormat,
        );
    }

    if updated.updated_at < original.updated_at {
        result.add_error(
            "updated_at",
            "Updates cannot move back in time",
            ValidationErrorCode::OutOfRange,
        );
    }

    result
}
