//! Health Records Integrity
//!
//! Defines health record metadata and AI insight entries, the defensive
//! parser that turns free-form generator output into typed insight content,
//! and the validation rules for stored records.

use chrono::{DateTime, NaiveDate, Utc};
use jeeva_health_shared::{
    validate_max_len, validate_required_text, HealthError, InsightId, ProfileId, RecordId,
    ValidationErrorCode, ValidationResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 10_000;
pub const MAX_FILE_URL_LEN: usize = 500;
pub const MAX_FILE_TYPE_LEN: usize = 80;
pub const MAX_HOSPITAL_NAME_LEN: usize = 200;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Prescription,
    LabReport,
    Imaging,
    ConsultationNote,
    DischargeSummary,
    #[default]
    Other,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Prescription => "prescription",
            RecordType::LabReport => "lab_report",
            RecordType::Imaging => "imaging",
            RecordType::ConsultationNote => "consultation_note",
            RecordType::DischargeSummary => "discharge_summary",
            RecordType::Other => "other",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prescription" => Ok(RecordType::Prescription),
            "lab_report" => Ok(RecordType::LabReport),
            "imaging" => Ok(RecordType::Imaging),
            "consultation_note" => Ok(RecordType::ConsultationNote),
            "discharge_summary" => Ok(RecordType::DischargeSummary),
            "other" => Ok(RecordType::Other),
            other => Err(HealthError::ValidationError(format!(
                "Unknown record type '{other}'"
            ))),
        }
    }
}

/// Metadata of an uploaded or authored health record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub id: RecordId,
    pub patient_id: ProfileId,
    pub record_type: RecordType,
    pub title: String,
    pub description: Option<String>,
    /// Location in external file storage
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub date_recorded: Option<NaiveDate>,
    /// Set when a doctor authored the record
    pub doctor_id: Option<ProfileId>,
    pub hospital_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller supplies when creating a record
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewHealthRecord {
    /// Required when a doctor writes into a patient's records
    #[serde(default)]
    pub patient_id: Option<ProfileId>,
    pub record_type: RecordType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub date_recorded: Option<NaiveDate>,
    #[serde(default)]
    pub hospital_name: Option<String>,
}

impl HealthRecord {
    pub fn new(
        input: NewHealthRecord,
        patient_id: ProfileId,
        doctor_id: Option<ProfileId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            patient_id,
            record_type: input.record_type,
            title: input.title.trim().to_string(),
            description: non_blank(input.description),
            file_url: non_blank(input.file_url),
            file_type: non_blank(input.file_type),
            date_recorded: input.date_recorded,
            doctor_id,
            hospital_name: non_blank(input.hospital_name),
            created_at: now,
            updated_at: now,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validate a health record before it is stored
pub fn validate_health_record(record: &HealthRecord, today: NaiveDate) -> ValidationResult {
    let mut result = validate_required_text(&record.title, "title", MAX_TITLE_LEN);

    let optional = [
        (&record.description, "description", MAX_DESCRIPTION_LEN),
        (&record.file_url, "file_url", MAX_FILE_URL_LEN),
        (&record.file_type, "file_type", MAX_FILE_TYPE_LEN),
        (&record.hospital_name, "hospital_name", MAX_HOSPITAL_NAME_LEN),
    ];
    for (value, field, max) in optional {
        if let Some(value) = value {
            result.merge(validate_max_len(value, field, max));
        }
    }

    if let Some(date) = record.date_recorded {
        if date > today {
            result.add_error(
                "date_recorded",
                "Record date cannot be in the future",
                ValidationErrorCode::OutOfRange,
            );
        }
    }

    if record.doctor_id == Some(record.patient_id) {
        result.add_error(
            "doctor_id",
            "A record cannot be authored by its own patient as doctor",
            ValidationErrorCode::InvalidReference,
        );
    }

    result
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Read a risk level out of generator prose; unknown words give `None`.
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "minimal" => Some(RiskLevel::Low),
            "medium" | "moderate" => Some(RiskLevel::Medium),
            "high" | "severe" | "critical" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// The shape the insight generator is asked to answer with
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredInsight {
    pub summary: String,
    pub indicators: Vec<String>,
    pub risk_level: Option<RiskLevel>,
    pub recommendations: Vec<String>,
}

/// Generator output, typed as far as it can be trusted
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum InsightContent {
    /// A JSON object carrying at least a textual summary
    Structured(StructuredInsight),
    /// Valid JSON of some other shape
    Document(Value),
    /// Anything that did not parse
    RawText { raw: String },
}

impl InsightContent {
    pub fn risk_level(&self) -> Option<RiskLevel> {
        match self {
            InsightContent::Structured(insight) => insight.risk_level,
            InsightContent::Document(value) => value
                .get("risk_level")
                .and_then(Value::as_str)
                .and_then(RiskLevel::parse_loose),
            InsightContent::RawText { .. } => None,
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        match self {
            InsightContent::Structured(insight) => insight.recommendations.clone(),
            InsightContent::Document(value) => {
                value.get("recommendations").map(strings).unwrap_or_default()
            }
            InsightContent::RawText { .. } => Vec::new(),
        }
    }
}

/// Parse free-form generator output.
///
/// Markdown code fences are stripped and the span from the first `{` to the
/// last `}` is parsed as JSON. Output that still does not parse is kept
/// verbatim as raw text.
pub fn parse_insight_content(text: &str) -> InsightContent {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return InsightContent::Document(Value::Object(Default::default()));
    }

    let unfenced = strip_code_fence(trimmed);
    let candidate = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => structured(&value)
            .map(InsightContent::Structured)
            .unwrap_or(InsightContent::Document(value)),
        Err(_) => InsightContent::RawText {
            raw: text.to_string(),
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag on the opening fence line
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.trim_end_matches('`').trim()
}

fn structured(value: &Value) -> Option<StructuredInsight> {
    let object = value.as_object()?;
    let summary = object.get("summary")?.as_str()?.to_string();
    Some(StructuredInsight {
        summary,
        indicators: object.get("indicators").map(strings).unwrap_or_default(),
        risk_level: object
            .get("risk_level")
            .and_then(Value::as_str)
            .and_then(RiskLevel::parse_loose),
        recommendations: object.get("recommendations").map(strings).unwrap_or_default(),
    })
}

/// A list of strings from a JSON array, or a single string
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// A generated analysis of a patient's record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiInsight {
    pub id: InsightId,
    pub patient_id: ProfileId,
    pub record_id: Option<RecordId>,
    pub insight_type: RecordType,
    pub content: InsightContent,
    pub risk_level: Option<RiskLevel>,
    pub recommendations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl AiInsight {
    pub fn new(
        patient_id: ProfileId,
        record_id: Option<RecordId>,
        insight_type: RecordType,
        content: InsightContent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InsightId::new(),
            patient_id,
            record_id,
            insight_type,
            risk_level: content.risk_level(),
            recommendations: content.recommendations(),
            content,
            created_at: now,
        }
    }
}
