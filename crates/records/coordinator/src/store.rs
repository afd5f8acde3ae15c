use std::sync::RwLock;

use jeeva_health_shared::{HealthError, HealthResult, ProfileId, RecordId};
use records_integrity::{AiInsight, HealthRecord};

/// Storage of record metadata and generated insights.
///
/// Listing methods return newest first.
pub trait RecordStore: Send + Sync {
    fn insert_record(&self, record: HealthRecord) -> HealthResult<HealthRecord>;

    fn get_record(&self, id: RecordId) -> HealthResult<Option<HealthRecord>>;

    fn records_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<HealthRecord>>;

    fn insert_insight(&self, insight: AiInsight) -> HealthResult<AiInsight>;

    fn insights_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<AiInsight>>;
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<HealthRecord>>,
    insights: RwLock<Vec<AiInsight>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert_record(&self, record: HealthRecord) -> HealthResult<HealthRecord> {
        self.records
            .write()
            .map_err(|_| HealthError::lock_poisoned("record store"))?
            .push(record.clone());
        Ok(record)
    }

    fn get_record(&self, id: RecordId) -> HealthResult<Option<HealthRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| HealthError::lock_poisoned("record store"))?;
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    fn records_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<HealthRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| HealthError::lock_poisoned("record store"))?;
        let mut found: Vec<_> = records
            .iter()
            .rev()
            .filter(|record| record.patient_id == patient_id)
            .cloned()
            .collect();
        // Stable, so equal timestamps keep later inserts first
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn insert_insight(&self, insight: AiInsight) -> HealthResult<AiInsight> {
        self.insights
            .write()
            .map_err(|_| HealthError::lock_poisoned("insight store"))?
            .push(insight.clone());
        Ok(insight)
    }

    fn insights_for_patient(&self, patient_id: ProfileId) -> HealthResult<Vec<AiInsight>> {
        let insights = self
            .insights
            .read()
            .map_err(|_| HealthError::lock_poisoned("insight store"))?;
        let mut found: Vec<_> = insights
            .iter()
            .rev()
            .filter(|insight| insight.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}
