//! Access Control Enforcement Tests
//!
//! Record and insight reads are gated by the access evaluator, and every
//! access by someone other than the patient is written to the audit log.

#[cfg(test)]
mod tests {
    use crate::world::{FixedGenerator, World};
    use chrono::{Duration, Utc};
    use consent_integrity::ConsentStatus;
    use jeeva_health_shared::{
        AccessAction, AccessOutcome, AuditSink, Caller, HealthError, PaginationInput, Role,
    };
    use records::AnalyzeInput;
    use records_integrity::{InsightContent, NewHealthRecord, RecordType};
    use std::sync::Arc;

    fn blood_panel() -> NewHealthRecord {
        NewHealthRecord {
            record_type: RecordType::LabReport,
            title: "Complete blood count".to_string(),
            description: Some("Hb 10.2 g/dL, WBC 7.1".to_string()),
            ..Default::default()
        }
    }

    fn approve(world: &World, doctor: &Caller, patient: &Caller) {
        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();
    }

    #[test]
    fn test_records_open_and_close_with_consent() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        world.records.create_record(&patient, blood_panel()).unwrap();

        assert!(matches!(
            world.records.list_records(&doctor, Some(patient.id)),
            Err(HealthError::ConsentRequired(_))
        ));

        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();
        assert_eq!(
            world.records.list_records(&doctor, Some(patient.id)).unwrap().len(),
            1
        );

        world.advance(Duration::minutes(10));
        world.ledger.revoke(request.id, patient.id).unwrap();
        assert!(matches!(
            world.records.list_records(&doctor, Some(patient.id)),
            Err(HealthError::ConsentRequired(_))
        ));
    }

    #[test]
    fn test_expiry_closes_access_after_the_expiry_day() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let record = world.records.create_record(&patient, blood_panel()).unwrap();

        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", Some(world.today()))
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();
        assert!(world.records.get_record(&doctor, record.id).is_ok());

        world.advance(Duration::days(1));
        assert!(matches!(
            world.records.get_record(&doctor, record.id),
            Err(HealthError::ConsentRequired(_))
        ));
    }

    #[test]
    fn test_audit_trail_records_grants_and_denials() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let record = world.records.create_record(&patient, blood_panel()).unwrap();

        let _ = world.records.get_record(&doctor, record.id);
        approve(&world, &doctor, &patient);
        world.advance(Duration::minutes(1));
        world.records.get_record(&doctor, record.id).unwrap();
        // The patient's own reads are not audited
        world.records.list_records(&patient, None).unwrap();

        let trail = world.audit.for_patient(patient.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].outcome, AccessOutcome::Granted);
        assert_eq!(trail[0].record_id, Some(record.id));
        assert_eq!(trail[1].outcome, AccessOutcome::Denied);
        assert_eq!(trail[1].action, AccessAction::ViewRecord);
        assert!(trail.iter().all(|entry| entry.accessor_id == doctor.id));

        let page = world
            .records
            .access_log(&patient, &PaginationInput::default())
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(!page.has_more);
    }

    #[test]
    fn test_admin_and_other_patients_cannot_read_records() {
        let world = World::new();
        let patient = world.patient("asha@example.com").unwrap();
        let neighbour = world.patient("ravi@example.com").unwrap();
        world.records.create_record(&patient, blood_panel()).unwrap();

        let admin = Caller {
            id: neighbour.id,
            role: Role::Admin,
        };
        for caller in [neighbour, admin] {
            assert!(matches!(
                world.records.list_records(&caller, Some(patient.id)),
                Err(HealthError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn test_doctor_authored_record_requires_consent() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let prescription = NewHealthRecord {
            patient_id: Some(patient.id),
            record_type: RecordType::Prescription,
            title: "Metformin 500mg twice daily".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            world.records.create_record(&doctor, prescription.clone()),
            Err(HealthError::ConsentRequired(_))
        ));

        approve(&world, &doctor, &patient);
        let record = world.records.create_record(&doctor, prescription).unwrap();
        assert_eq!(record.doctor_id, Some(doctor.id));

        let own = world.records.list_records(&patient, None).unwrap();
        assert_eq!(own, vec![record]);
    }

    #[test]
    fn test_insights_follow_the_same_gate() {
        let output = "```json\n{\"summary\": \"Mild anaemia\", \"indicators\": [\"Hb 10.2\"], \
                      \"risk_level\": \"moderate\", \"recommendations\": [\"Iron studies\"]}\n```";
        let world = World::with_generator(Utc::now(), Arc::new(FixedGenerator(output.to_string())));
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let record = world.records.create_record(&patient, blood_panel()).unwrap();

        let analyze = AnalyzeInput {
            record_id: Some(record.id),
            ..Default::default()
        };
        assert!(matches!(
            world.records.analyze_record(&doctor, analyze.clone()),
            Err(HealthError::ConsentRequired(_))
        ));

        approve(&world, &doctor, &patient);
        let insight = world.records.analyze_record(&doctor, analyze).unwrap();
        assert_eq!(insight.recommendations, vec!["Iron studies"]);
        assert!(matches!(insight.content, InsightContent::Structured(_)));

        assert_eq!(
            world
                .records
                .list_insights(&doctor, Some(patient.id))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_generator_failure_stores_nothing() {
        let world = World::new();
        let patient = world.patient("asha@example.com").unwrap();
        let result = world.records.analyze_record(
            &patient,
            AnalyzeInput {
                record_text: "Chest pain on exertion".to_string(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(HealthError::Upstream(_))));
        assert!(world.records.list_insights(&patient, None).unwrap().is_empty());
    }
}
