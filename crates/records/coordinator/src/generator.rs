use jeeva_health_shared::{HealthError, HealthResult};
use records_integrity::RecordType;
use serde::{Deserialize, Serialize};

/// An image sent along with the record text, base64 encoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageAttachment {
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    pub data_base64: String,
}

fn default_mime_type() -> String {
    "image/png".to_string()
}

/// What the generator is asked to analyze
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsightPrompt {
    pub record_type: RecordType,
    pub record_text: String,
    pub image: Option<ImageAttachment>,
}

/// Opaque producer of free-form analysis text.
///
/// Implementations report transport or model failures as
/// `HealthError::Upstream`. The output is untrusted and parsed defensively.
pub trait InsightGenerator: Send + Sync {
    fn generate(&self, prompt: &InsightPrompt) -> HealthResult<String>;
}

/// Stands in when no generator is configured; every call is `Unavailable`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredGenerator;

impl InsightGenerator for UnconfiguredGenerator {
    fn generate(&self, _prompt: &InsightPrompt) -> HealthResult<String> {
        Err(HealthError::Unavailable(
            "No insight generator is configured".to_string(),
        ))
    }
}
