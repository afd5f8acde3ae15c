use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use consent::{ConsentParty, ConsentView};
use consent_integrity::ConsentStatus;
use jeeva_health_shared::{
    AccessLogEntry, AccessPolicy, AuthorizationResult, ConsentId, HealthError, PaginatedResult,
    PaginationInput, ProfileId, RecordId, Role,
};
use profile_integrity::{Profile, ProfileUpdate};
use records::AnalyzeInput;
use records_integrity::{AiInsight, HealthRecord, NewHealthRecord};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::{extract_email, SharedState};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profile/me", get(get_profile).put(update_profile))
        .route("/profile/sign-out", post(sign_out))
        .route("/consents", get(list_consents).post(create_consent))
        .route("/consents/:id", get(get_consent).patch(update_consent))
        .route("/consents/:id/revoke", post(revoke_consent))
        .route("/access/:patient_id", get(check_access))
        .route("/records", get(list_records).post(create_record))
        .route("/records/:id", get(get_record))
        .route("/insights", get(list_insights))
        .route("/insights/analyze", post(analyze))
        .route("/access-logs", get(access_logs))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ==================== PROFILE ====================

async fn get_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<Profile>> {
    Ok(Json(state.authenticate(&headers)?))
}

async fn update_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<Profile>> {
    let email = extract_email(&headers)?;
    let Json(update) = payload?;
    Ok(Json(state.profiles.update_me(&email, update)?))
}

async fn sign_out(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let email = extract_email(&headers)?;
    state.profiles.sign_out(&email);
    Ok(StatusCode::NO_CONTENT)
}

// ==================== CONSENT ====================

/// Body of `POST /consents`. The doctor defaults to the caller.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConsentBody {
    #[serde(default)]
    pub doctor_id: Option<ProfileId>,
    #[serde(default)]
    pub doctor_email: Option<String>,
    #[serde(default)]
    pub patient_id: Option<ProfileId>,
    #[serde(default)]
    pub patient_email: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ListConsentsQuery {
    pub role: Option<ConsentParty>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateConsentBody {
    pub status: String,
}

async fn create_consent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<CreateConsentBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ConsentView>)> {
    let caller = state.caller(&headers)?;
    let Json(body) = payload?;

    let doctor_id = match (body.doctor_id, body.doctor_email.as_deref()) {
        (Some(id), _) => id,
        (None, Some(email)) => {
            state
                .profiles
                .find_by_email(email)?
                .ok_or_else(|| HealthError::NotFound(format!("Doctor with email {}", email.trim())))?
                .id
        }
        (None, None) => caller.id,
    };
    if doctor_id != caller.id && caller.role != Role::Admin {
        return Err(HealthError::Unauthorized(
            "Consent can only be requested on your own behalf".to_string(),
        )
        .into());
    }

    let purpose = body.purpose.as_deref().unwrap_or_default();
    let request = match (body.patient_id, body.patient_email.as_deref()) {
        (Some(patient_id), _) => {
            state
                .ledger
                .create_request(doctor_id, patient_id, purpose, body.expiry_date)?
        }
        (None, Some(email)) => {
            let provisioning = state.auto_provision.then_some(&state.profiles);
            state.ledger.request_by_email(
                doctor_id,
                email,
                purpose,
                body.expiry_date,
                provisioning,
            )?
        }
        (None, None) => {
            return Err(ApiError::bad_request(
                "patient_id or patient_email is required",
            ))
        }
    };

    Ok((StatusCode::CREATED, Json(state.ledger.with_parties(request)?)))
}

async fn list_consents(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: Result<Query<ListConsentsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ConsentView>>> {
    let caller = state.caller(&headers)?;
    let Query(query) = query?;

    let party = query.role.unwrap_or(match caller.role {
        Role::Doctor => ConsentParty::Doctor,
        Role::Patient | Role::Admin => ConsentParty::Patient,
    });
    let views = state
        .ledger
        .list_for_party(party, caller.id)?
        .into_iter()
        .map(|request| state.ledger.with_parties(request))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}

async fn get_consent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<ConsentId>, PathRejection>,
) -> ApiResult<Json<ConsentView>> {
    let caller = state.caller(&headers)?;
    let Path(id) = id?;
    let request = state.ledger.get(id, caller.id)?;
    Ok(Json(state.ledger.with_parties(request)?))
}

/// Patient response to a request; `revoked` withdraws an approval.
async fn update_consent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<ConsentId>, PathRejection>,
    payload: Result<Json<UpdateConsentBody>, JsonRejection>,
) -> ApiResult<Json<ConsentView>> {
    let caller = state.caller(&headers)?;
    let Path(id) = id?;
    let Json(body) = payload?;

    let request = match body.status.parse::<ConsentStatus>()? {
        ConsentStatus::Revoked => state.ledger.revoke(id, caller.id)?,
        status => state.ledger.respond(id, caller.id, status)?,
    };
    Ok(Json(state.ledger.with_parties(request)?))
}

async fn revoke_consent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<ConsentId>, PathRejection>,
) -> ApiResult<Json<ConsentView>> {
    let caller = state.caller(&headers)?;
    let Path(id) = id?;
    let request = state.ledger.revoke(id, caller.id)?;
    Ok(Json(state.ledger.with_parties(request)?))
}

/// Whether the calling doctor currently holds consent for a patient
async fn check_access(
    State(state): State<SharedState>,
    headers: HeaderMap,
    patient_id: Result<Path<ProfileId>, PathRejection>,
) -> ApiResult<Json<AuthorizationResult>> {
    let caller = state.caller(&headers)?;
    let Path(patient_id) = patient_id?;
    if caller.role != Role::Doctor {
        return Err(HealthError::Unauthorized("Only doctors hold consent".to_string()).into());
    }
    Ok(Json(state.evaluator.check_authorization(caller.id, patient_id)?))
}

// ==================== RECORDS & INSIGHTS ====================

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub patient_id: Option<ProfileId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccessLogQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

async fn list_records(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<HealthRecord>>> {
    let caller = state.caller(&headers)?;
    let Query(query) = query?;
    Ok(Json(state.records.list_records(&caller, query.patient_id)?))
}

async fn create_record(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<NewHealthRecord>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<HealthRecord>)> {
    let caller = state.caller(&headers)?;
    let Json(input) = payload?;
    let record = state.records.create_record(&caller, input)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_record(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<RecordId>, PathRejection>,
) -> ApiResult<Json<HealthRecord>> {
    let caller = state.caller(&headers)?;
    let Path(id) = id?;
    Ok(Json(state.records.get_record(&caller, id)?))
}

async fn list_insights(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AiInsight>>> {
    let caller = state.caller(&headers)?;
    let Query(query) = query?;
    Ok(Json(state.records.list_insights(&caller, query.patient_id)?))
}

async fn analyze(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AiInsight>)> {
    let caller = state.caller(&headers)?;
    let Json(input) = payload?;
    let insight = state.records.analyze_record(&caller, input)?;
    Ok((StatusCode::CREATED, Json(insight)))
}

async fn access_logs(
    State(state): State<SharedState>,
    headers: HeaderMap,
    query: Result<Query<AccessLogQuery>, QueryRejection>,
) -> ApiResult<Json<PaginatedResult<AccessLogEntry>>> {
    let caller = state.caller(&headers)?;
    let Query(query) = query?;
    let defaults = PaginationInput::default();
    let pagination = PaginationInput {
        offset: query.offset.unwrap_or(defaults.offset),
        limit: query.limit.unwrap_or(defaults.limit),
    };
    Ok(Json(state.records.access_log(&caller, &pagination)?))
}
