//! Profile Identity Integrity
//!
//! Defines the application-level identity record for patients, doctors and
//! admins, and the rules a profile must satisfy before it is stored.

use chrono::{DateTime, NaiveDate, Utc};
use jeeva_health_shared::{
    normalize_email, validate_email, validate_max_len, validate_phone, ProfileId, Role,
    ValidationErrorCode, ValidationResult,
};
use serde::{Deserialize, Serialize};

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_AFFILIATION_LEN: usize = 200;
pub const MAX_ADDRESS_LEN: usize = 500;

/// One profile per registered principal
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    /// Stored normalized (trimmed, lowercase); unique across profiles
    pub email: String,
    pub phone: Option<String>,
    /// Doctor-only
    pub specialization: Option<String>,
    /// Doctor-only
    pub license_number: Option<String>,
    pub hospital_affiliation: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Minimal profile for a principal seen for the first time.
    pub fn new(email: &str, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            id: ProfileId::new(),
            role,
            first_name: String::new(),
            last_name: String::new(),
            email: normalize_email(email),
            phone: None,
            specialization: None,
            license_number: None,
            hospital_affiliation: None,
            date_of_birth: None,
            gender: None,
            address: None,
            emergency_contact: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Counterpart profile embedded in consent listings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: ProfileId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Partial update submitted by the owning principal.
///
/// Absent fields are left untouched. Email and identifiers are not updatable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileUpdate {
    pub role: Option<Role>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub hospital_affiliation: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub emergency_contact: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(self, profile: &mut Profile, now: DateTime<Utc>) {
        fn set(slot: &mut Option<String>, value: Option<String>) {
            if let Some(value) = value {
                let value = value.trim().to_string();
                *slot = (!value.is_empty()).then_some(value);
            }
        }

        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(first_name) = self.first_name {
            profile.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = self.last_name {
            profile.last_name = last_name.trim().to_string();
        }
        set(&mut profile.phone, self.phone);
        set(&mut profile.specialization, self.specialization);
        set(&mut profile.license_number, self.license_number);
        set(&mut profile.hospital_affiliation, self.hospital_affiliation);
        set(&mut profile.gender, self.gender);
        set(&mut profile.address, self.address);
        set(&mut profile.emergency_contact, self.emergency_contact);
        if let Some(date_of_birth) = self.date_of_birth {
            profile.date_of_birth = Some(date_of_birth);
        }
        profile.updated_at = now;
    }
}

/// Validate a profile before it is stored
pub fn validate_profile(profile: &Profile, today: NaiveDate) -> ValidationResult {
    let mut result = validate_email(&profile.email);

    if profile.email != normalize_email(&profile.email) {
        result.add_error(
            "email",
            "Email must be stored normalized",
            ValidationErrorCode::InvalidFormat,
        );
    }

    result.merge(validate_max_len(&profile.first_name, "first_name", MAX_NAME_LEN));
    result.merge(validate_max_len(&profile.last_name, "last_name", MAX_NAME_LEN));

    if let Some(phone) = &profile.phone {
        result.merge(validate_phone(phone));
    }
    if let Some(affiliation) = &profile.hospital_affiliation {
        result.merge(validate_max_len(affiliation, "hospital_affiliation", MAX_AFFILIATION_LEN));
    }
    if let Some(address) = &profile.address {
        result.merge(validate_max_len(address, "address", MAX_ADDRESS_LEN));
    }

    // Specialization and license only make sense on doctor profiles
    if profile.role != Role::Doctor
        && (profile.specialization.is_some() || profile.license_number.is_some())
    {
        result.add_error(
            "license_number",
            "Specialization and license number are reserved for doctor profiles",
            ValidationErrorCode::InvalidReference,
        );
    }

    if let Some(date_of_birth) = profile.date_of_birth {
        if date_of_birth > today {
            result.add_error(
                "date_of_birth",
                "Date of birth cannot be in the future",
                ValidationErrorCode::OutOfRange,
            );
        }
    }

    if profile.updated_at < profile.created_at {
        result.add_error(
            "updated_at",
            "Profile cannot be updated before it was created",
            ValidationErrorCode::OutOfRange,
        );
    }

    result
}

/// Validate an update against the profile it modifies
pub fn validate_profile_update(original: &Profile, update: &ProfileUpdate) -> ValidationResult {
    let mut result = ValidationResult::new();

    // Admin is granted out of band, never self-assigned
    if update.role == Some(Role::Admin) && original.role != Role::Admin {
        result.add_error(
            "role",
            "The admin role cannot be self-assigned",
            ValidationErrorCode::InvalidReference,
        );
    }

    result
}
