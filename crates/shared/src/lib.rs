//! Jeeva Health Shared Utilities
//!
//! This crate provides common functionality for all Jeeva Health crates:
//! - Entity identifiers and the common error type
//! - Access control enforcement (consent-gated authorization seam)
//! - Audit logging
//! - Input validation
//! - Pagination and clocks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, RwLock};

// Re-export commonly used items
pub use access_control::*;
pub use audit::*;
pub use clock::*;
pub use types::*;
pub use validation::*;

/// Common types used across crates
pub mod types {
    use super::*;
    use derive_more::{Display, From, FromStr};
    use thiserror::Error;
    use uuid::Uuid;

    macro_rules! entity_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
                Serialize, Deserialize, Display, From, FromStr,
            )]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }
        };
    }

    entity_id!(
        /// Identifier of a Profile (patient, doctor or admin)
        ProfileId
    );
    entity_id!(
        /// Identifier of a consent request row
        ConsentId
    );
    entity_id!(
        /// Identifier of a stored health record
        RecordId
    );
    entity_id!(
        /// Identifier of a generated AI insight
        InsightId
    );
    entity_id!(LogId);

    /// Standard error types for consistent error handling
    #[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
    pub enum HealthError {
        /// A doctor, patient, record or request reference does not resolve
        #[error("Not found: {0}")]
        NotFound(String),
        /// The actor does not own the entity it is trying to read or mutate
        #[error("Unauthorized: {0}")]
        Unauthorized(String),
        /// A status precondition was not met
        #[error("Invalid transition: {0}")]
        InvalidTransition(String),
        #[error("Validation error: {0}")]
        ValidationError(String),
        /// No approved, unexpired consent covers the access
        #[error("Consent required: {0}")]
        ConsentRequired(String),
        /// The insight generator failed
        #[error("Upstream error: {0}")]
        Upstream(String),
        #[error("Unavailable: {0}")]
        Unavailable(String),
        #[error("Internal error: {0}")]
        InternalError(String),
    }

    pub type HealthResult<T> = Result<T, HealthError>;

    impl HealthError {
        pub fn lock_poisoned(store: &str) -> Self {
            HealthError::InternalError(format!("{store} lock poisoned"))
        }
    }

    /// Input for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PaginationInput {
        pub offset: usize,
        pub limit: usize,
    }

    impl PaginationInput {
        pub const MAX_LIMIT: usize = 100;

        pub fn validate(&self) -> HealthResult<()> {
            if self.limit > Self::MAX_LIMIT {
                return Err(HealthError::ValidationError(format!(
                    "Limit cannot exceed {}",
                    Self::MAX_LIMIT
                )));
            }
            if self.limit == 0 {
                return Err(HealthError::ValidationError(
                    "Limit must be greater than 0".to_string(),
                ));
            }
            Ok(())
        }

        /// Slice a fully materialized list into one page.
        pub fn paginate<T>(&self, items: Vec<T>) -> PaginatedResult<T> {
            let total = items.len();
            let page = items
                .into_iter()
                .skip(self.offset)
                .take(self.limit)
                .collect();
            PaginatedResult::new(page, total, self)
        }
    }

    impl Default for PaginationInput {
        fn default() -> Self {
            Self {
                offset: 0,
                limit: 50,
            }
        }
    }

    /// Result wrapper for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PaginatedResult<T> {
        pub items: Vec<T>,
        pub total: usize,
        pub offset: usize,
        pub limit: usize,
        pub has_more: bool,
    }

    impl<T> PaginatedResult<T> {
        pub fn new(items: Vec<T>, total: usize, pagination: &PaginationInput) -> Self {
            Self {
                has_more: pagination.offset + items.len() < total,
                items,
                total,
                offset: pagination.offset,
                limit: pagination.limit,
            }
        }
    }
}

/// Time source, injectable so expiry can be evaluated at a chosen instant
pub mod clock {
    use super::*;

    pub trait Clock: Send + Sync {
        fn now(&self) -> DateTime<Utc>;
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub fn new(at: DateTime<Utc>) -> Self {
            Self { now: Mutex::new(at) }
        }

        pub fn set(&self, at: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
        }

        pub fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(|p| p.into_inner())
        }
    }
}

/// Access control module - enforces consent-based authorization
pub mod access_control {
    use super::*;

    /// Role of an authenticated principal
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Role {
        Patient,
        Doctor,
        Admin,
    }

    impl std::fmt::Display for Role {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Role::Patient => write!(f, "patient"),
                Role::Doctor => write!(f, "doctor"),
                Role::Admin => write!(f, "admin"),
            }
        }
    }

    /// The authenticated principal behind a request
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Caller {
        pub id: ProfileId,
        pub role: Role,
    }

    /// Result of an authorization check
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AuthorizationResult {
        /// Whether access is authorized
        pub authorized: bool,
        /// The consent request granting access (if any)
        pub consent_id: Option<ConsentId>,
        /// Reason for the authorization decision
        pub reason: String,
    }

    impl AuthorizationResult {
        pub fn granted(consent_id: ConsentId) -> Self {
            Self {
                authorized: true,
                consent_id: Some(consent_id),
                reason: "Approved consent in effect".to_string(),
            }
        }

        pub fn denied(consent_id: Option<ConsentId>, reason: impl Into<String>) -> Self {
            Self {
                authorized: false,
                consent_id,
                reason: reason.into(),
            }
        }

        pub fn own_data() -> Self {
            Self {
                authorized: true,
                consent_id: None,
                reason: "Patient accessing own data".to_string(),
            }
        }
    }

    /// Source of consent decisions for doctor access to patient data.
    pub trait AccessPolicy: Send + Sync {
        fn check_authorization(
            &self,
            doctor_id: ProfileId,
            patient_id: ProfileId,
        ) -> HealthResult<AuthorizationResult>;
    }

    /// Check if the caller may access a patient's data.
    ///
    /// Patients always reach their own data. Doctors need a decision from the
    /// access policy; everyone else is denied.
    ///
    /// # Returns
    /// * `Ok(AuthorizationResult)` - access granted
    /// * `Err(ConsentRequired)` - doctor without approved, unexpired consent
    /// * `Err(Unauthorized)` - caller is neither the patient nor a doctor
    pub fn require_authorization(
        policy: &dyn AccessPolicy,
        caller: &Caller,
        patient_id: ProfileId,
    ) -> HealthResult<AuthorizationResult> {
        if caller.id == patient_id {
            return Ok(AuthorizationResult::own_data());
        }

        match caller.role {
            Role::Doctor => {
                let result = policy.check_authorization(caller.id, patient_id)?;
                if !result.authorized {
                    return Err(HealthError::ConsentRequired(result.reason));
                }
                Ok(result)
            }
            Role::Patient | Role::Admin => Err(HealthError::Unauthorized(
                "Only the patient or a consented doctor may access these records".to_string(),
            )),
        }
    }
}

/// Audit logging module - tracks every doctor access to patient data
pub mod audit {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AccessAction {
        ListRecords,
        ViewRecord,
        CreateRecord,
        ListInsights,
        AnalyzeRecord,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AccessOutcome {
        Granted,
        Denied,
    }

    /// Access log entry for audit trail
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct AccessLogEntry {
        pub id: LogId,
        pub accessor_id: ProfileId,
        pub patient_id: ProfileId,
        pub record_id: Option<RecordId>,
        pub action: AccessAction,
        pub outcome: AccessOutcome,
        pub consent_id: Option<ConsentId>,
        pub reason: String,
        pub at: DateTime<Utc>,
    }

    /// Append-only destination for access log entries
    pub trait AuditSink: Send + Sync {
        fn append(&self, entry: AccessLogEntry) -> HealthResult<()>;

        /// Entries concerning one patient, newest first
        fn for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<AccessLogEntry>>;
    }

    #[derive(Debug, Default)]
    pub struct MemoryAuditLog {
        entries: RwLock<Vec<AccessLogEntry>>,
    }

    impl MemoryAuditLog {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl AuditSink for MemoryAuditLog {
        fn append(&self, entry: AccessLogEntry) -> HealthResult<()> {
            self.entries
                .write()
                .map_err(|_| HealthError::lock_poisoned("audit log"))?
                .push(entry);
            Ok(())
        }

        fn for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<AccessLogEntry>> {
            let entries = self
                .entries
                .read()
                .map_err(|_| HealthError::lock_poisoned("audit log"))?;
            Ok(entries
                .iter()
                .rev()
                .filter(|entry| entry.patient_id == patient_id)
                .cloned()
                .collect())
        }
    }

    /// Log a granted data access.
    ///
    /// Patients reading their own data are not logged; every other granted
    /// access is.
    pub fn log_data_access(
        sink: &dyn AuditSink,
        clock: &dyn Clock,
        caller: &Caller,
        patient_id: ProfileId,
        record_id: Option<RecordId>,
        action: AccessAction,
        auth: &AuthorizationResult,
    ) -> HealthResult<Option<LogId>> {
        if caller.id == patient_id {
            return Ok(None);
        }
        let id = LogId::new();
        sink.append(AccessLogEntry {
            id,
            accessor_id: caller.id,
            patient_id,
            record_id,
            action,
            outcome: AccessOutcome::Granted,
            consent_id: auth.consent_id,
            reason: auth.reason.clone(),
            at: clock.now(),
        })?;
        tracing::debug!(accessor = %caller.id, patient = %patient_id, ?action, "data access logged");
        Ok(Some(id))
    }

    /// Log denied access attempt for security monitoring
    pub fn log_access_denied(
        sink: &dyn AuditSink,
        clock: &dyn Clock,
        caller: &Caller,
        patient_id: ProfileId,
        action: AccessAction,
        error: &HealthError,
    ) -> HealthResult<LogId> {
        let id = LogId::new();
        sink.append(AccessLogEntry {
            id,
            accessor_id: caller.id,
            patient_id,
            record_id: None,
            action,
            outcome: AccessOutcome::Denied,
            consent_id: None,
            reason: format!("DENIED: {error}"),
            at: clock.now(),
        })?;
        tracing::warn!(accessor = %caller.id, patient = %patient_id, ?action, %error, "access denied");
        Ok(id)
    }
}

/// Input validation module - ensures data quality at the boundary
///
/// Provides validators for:
/// - Email addresses
/// - Required and length-bounded text
/// - Phone numbers
pub mod validation {
    use super::*;

    /// Validation error with detailed context
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct ValidationError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        TooLong,
        InvalidCharacters,
        DuplicateValue,
        InvalidReference,
    }

    impl std::fmt::Display for ValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default)]
    pub struct ValidationResult {
        pub errors: Vec<ValidationError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code,
            });
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn into_result(self) -> HealthResult<()> {
            if self.is_valid() {
                Ok(())
            } else {
                let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
                Err(HealthError::ValidationError(messages.join("; ")))
            }
        }

        pub fn merge(&mut self, other: ValidationResult) {
            self.errors.extend(other.errors);
        }
    }

    pub const MAX_EMAIL_LEN: usize = 254;

    /// Normalize an email for lookup and uniqueness: trimmed, lowercase.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Validate an email address
    ///
    /// Email must be:
    /// - Present
    /// - Exactly one `@` with a non-empty local part
    /// - A domain containing a dot, not at either end
    pub fn validate_email(email: &str) -> ValidationResult {
        let mut result = ValidationResult::new();
        let email = email.trim();

        if email.is_empty() {
            result.add_error("email", "Email is required", ValidationErrorCode::Required);
            return result;
        }

        if email.len() > MAX_EMAIL_LEN {
            result.add_error("email", "Email is too long", ValidationErrorCode::TooLong);
        }

        if email.chars().any(char::is_whitespace) {
            result.add_error(
                "email",
                "Email cannot contain whitespace",
                ValidationErrorCode::InvalidCharacters,
            );
        }

        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.contains('@') => {
                let dotted = domain
                    .split('.')
                    .collect::<Vec<_>>();
                if dotted.len() < 2 || dotted.iter().any(|part| part.is_empty()) {
                    result.add_error(
                        "email",
                        "Email domain must look like example.com",
                        ValidationErrorCode::InvalidFormat,
                    );
                }
            }
            _ => result.add_error(
                "email",
                "Email must have the form name@domain",
                ValidationErrorCode::InvalidFormat,
            ),
        }

        result
    }

    /// Validate a required text field with an upper length bound
    pub fn validate_required_text(value: &str, field_name: &str, max_len: usize) -> ValidationResult {
        let mut result = ValidationResult::new();

        if value.trim().is_empty() {
            result.add_error(
                field_name,
                &format!("{field_name} is required"),
                ValidationErrorCode::Required,
            );
            return result;
        }

        result.merge(validate_max_len(value, field_name, max_len));
        result
    }

    pub fn validate_max_len(value: &str, field_name: &str, max_len: usize) -> ValidationResult {
        let mut result = ValidationResult::new();
        if value.chars().count() > max_len {
            result.add_error(
                field_name,
                &format!("{field_name} cannot exceed {max_len} characters"),
                ValidationErrorCode::TooLong,
            );
        }
        result
    }

    /// Validate a phone number: digits with optional `+`, spaces, hyphens and parentheses
    pub fn validate_phone(phone: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        if !phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        {
            result.add_error(
                "phone",
                "Phone can only contain digits, spaces, '+', '-', '(' and ')'",
                ValidationErrorCode::InvalidCharacters,
            );
        }

        let digits = phone.chars().filter(char::is_ascii_digit).count();
        if !(7..=15).contains(&digits) {
            result.add_error(
                "phone",
                "Phone must contain between 7 and 15 digits",
                ValidationErrorCode::OutOfRange,
            );
        }

        result
    }
}
