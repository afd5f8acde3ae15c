//! Health Records Coordinator
//!
//! Record and insight operations. Every read or write of a patient's data
//! passes through `require_authorization` first, and every access by anyone
//! other than the patient lands in the audit log, granted or denied.

mod generator;
mod store;

pub use generator::{ImageAttachment, InsightGenerator, InsightPrompt, UnconfiguredGenerator};
pub use store::{MemoryRecordStore, RecordStore};

use std::sync::Arc;

use jeeva_health_shared::{
    log_access_denied, log_data_access, require_authorization, AccessAction, AccessLogEntry,
    AccessPolicy, AuditSink, AuthorizationResult, Caller, Clock, HealthError, HealthResult,
    PaginatedResult, PaginationInput, ProfileId, RecordId, Role,
};
use profile::{require_role, ProfileDirectory};
use records_integrity::{
    parse_insight_content, validate_health_record, AiInsight, HealthRecord, NewHealthRecord,
    RecordType,
};
use serde::{Deserialize, Serialize};

/// Input for analyzing a record or ad hoc text
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeInput {
    #[serde(default)]
    pub record_id: Option<RecordId>,
    /// Required for doctors when no record is named
    #[serde(default)]
    pub patient_id: Option<ProfileId>,
    #[serde(default)]
    pub record_type: Option<RecordType>,
    #[serde(default)]
    pub record_text: String,
    #[serde(default)]
    pub image: Option<ImageAttachment>,
}

pub struct RecordService {
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn ProfileDirectory>,
    policy: Arc<dyn AccessPolicy>,
    audit: Arc<dyn AuditSink>,
    generator: Arc<dyn InsightGenerator>,
    clock: Arc<dyn Clock>,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<dyn ProfileDirectory>,
        policy: Arc<dyn AccessPolicy>,
        audit: Arc<dyn AuditSink>,
        generator: Arc<dyn InsightGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            policy,
            audit,
            generator,
            clock,
        }
    }

    /// A patient's records, newest first.
    pub fn list_records(
        &self,
        caller: &Caller,
        patient_id: Option<ProfileId>,
    ) -> HealthResult<Vec<HealthRecord>> {
        let patient_id = target_patient(caller, patient_id)?;
        let auth = self.authorize(caller, patient_id, AccessAction::ListRecords)?;

        let records = self.store.records_for_patient(patient_id)?;
        self.log_granted(caller, patient_id, None, AccessAction::ListRecords, &auth)?;
        Ok(records)
    }

    pub fn get_record(&self, caller: &Caller, id: RecordId) -> HealthResult<HealthRecord> {
        let record = self
            .store
            .get_record(id)?
            .ok_or_else(|| HealthError::NotFound(format!("Health record {id}")))?;
        let auth = self.authorize(caller, record.patient_id, AccessAction::ViewRecord)?;

        self.log_granted(
            caller,
            record.patient_id,
            Some(record.id),
            AccessAction::ViewRecord,
            &auth,
        )?;
        Ok(record)
    }

    /// Store record metadata, either the patient's own or authored by a
    /// consented doctor.
    pub fn create_record(
        &self,
        caller: &Caller,
        input: NewHealthRecord,
    ) -> HealthResult<HealthRecord> {
        let patient_id = target_patient(caller, input.patient_id)?;
        let doctor_id = if patient_id == caller.id {
            None
        } else {
            require_role(self.directory.as_ref(), patient_id, Role::Patient)?;
            Some(caller.id)
        };
        let auth = self.authorize(caller, patient_id, AccessAction::CreateRecord)?;

        let now = self.clock.now();
        let record = HealthRecord::new(input, patient_id, doctor_id, now);
        validate_health_record(&record, now.date_naive()).into_result()?;

        let record = self.store.insert_record(record)?;
        self.log_granted(
            caller,
            patient_id,
            Some(record.id),
            AccessAction::CreateRecord,
            &auth,
        )?;
        tracing::info!(
            record = %record.id,
            patient = %patient_id,
            record_type = %record.record_type,
            "health record created"
        );
        Ok(record)
    }

    pub fn list_insights(
        &self,
        caller: &Caller,
        patient_id: Option<ProfileId>,
    ) -> HealthResult<Vec<AiInsight>> {
        let patient_id = target_patient(caller, patient_id)?;
        let auth = self.authorize(caller, patient_id, AccessAction::ListInsights)?;

        let insights = self.store.insights_for_patient(patient_id)?;
        self.log_granted(caller, patient_id, None, AccessAction::ListInsights, &auth)?;
        Ok(insights)
    }

    /// Run the insight generator over a record or supplied text and store
    /// the result.
    pub fn analyze_record(&self, caller: &Caller, input: AnalyzeInput) -> HealthResult<AiInsight> {
        let record = match input.record_id {
            Some(id) => Some(
                self.store
                    .get_record(id)?
                    .ok_or_else(|| HealthError::NotFound(format!("Health record {id}")))?,
            ),
            None => None,
        };

        let patient_id = match (&record, input.patient_id) {
            (Some(record), Some(patient_id)) if record.patient_id != patient_id => {
                return Err(HealthError::ValidationError(format!(
                    "Record {} does not belong to patient {patient_id}",
                    record.id
                )))
            }
            (Some(record), _) => record.patient_id,
            (None, patient_id) => target_patient(caller, patient_id)?,
        };
        let auth = self.authorize(caller, patient_id, AccessAction::AnalyzeRecord)?;

        let record_type = input
            .record_type
            .or(record.as_ref().map(|r| r.record_type))
            .unwrap_or_default();
        let record_text = match (input.record_text.trim(), &record) {
            ("", Some(record)) => describe(record),
            (text, _) => text.to_string(),
        };
        if record_text.is_empty() && input.image.is_none() {
            return Err(HealthError::ValidationError(
                "record_text or image is required".to_string(),
            ));
        }

        let prompt = InsightPrompt {
            record_type,
            record_text,
            image: input.image,
        };
        let output = self.generator.generate(&prompt).inspect_err(|err| {
            tracing::error!(patient = %patient_id, %err, "insight generation failed");
        })?;

        let record_id = record.as_ref().map(|r| r.id);
        let insight = AiInsight::new(
            patient_id,
            record_id,
            record_type,
            parse_insight_content(&output),
            self.clock.now(),
        );
        let insight = self.store.insert_insight(insight)?;

        self.log_granted(
            caller,
            patient_id,
            record_id,
            AccessAction::AnalyzeRecord,
            &auth,
        )?;
        tracing::info!(
            insight = %insight.id,
            patient = %patient_id,
            risk = ?insight.risk_level,
            "insight stored"
        );
        Ok(insight)
    }

    /// Who accessed the caller's data, newest first
    pub fn access_log(
        &self,
        caller: &Caller,
        pagination: &PaginationInput,
    ) -> HealthResult<PaginatedResult<AccessLogEntry>> {
        pagination.validate()?;
        let entries = self.audit.for_patient(caller.id)?;
        Ok(pagination.paginate(entries))
    }

    fn authorize(
        &self,
        caller: &Caller,
        patient_id: ProfileId,
        action: AccessAction,
    ) -> HealthResult<AuthorizationResult> {
        require_authorization(self.policy.as_ref(), caller, patient_id).or_else(|err| {
            log_access_denied(
                self.audit.as_ref(),
                self.clock.as_ref(),
                caller,
                patient_id,
                action,
                &err,
            )?;
            Err(err)
        })
    }

    fn log_granted(
        &self,
        caller: &Caller,
        patient_id: ProfileId,
        record_id: Option<RecordId>,
        action: AccessAction,
        auth: &AuthorizationResult,
    ) -> HealthResult<()> {
        log_data_access(
            self.audit.as_ref(),
            self.clock.as_ref(),
            caller,
            patient_id,
            record_id,
            action,
            auth,
        )?;
        Ok(())
    }
}

/// The patient whose data an operation concerns. Patients default to
/// themselves; everyone else must name one.
fn target_patient(caller: &Caller, patient_id: Option<ProfileId>) -> HealthResult<ProfileId> {
    match (patient_id, caller.role) {
        (Some(patient_id), _) => Ok(patient_id),
        (None, Role::Patient) => Ok(caller.id),
        (None, role) => Err(HealthError::ValidationError(format!(
            "patient_id is required when acting as {role}"
        ))),
    }
}

fn describe(record: &HealthRecord) -> String {
    match &record.description {
        Some(description) => format!("{}\n{}", record.title, description),
        None => record.title.clone(),
    }
}
