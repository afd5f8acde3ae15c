//! Consent Ledger Tests
//!
//! Request, respond and revoke through the ledger, with the access evaluator
//! reading the resulting history.

#[cfg(test)]
mod tests {
    use crate::World;
    use chrono::Duration;
    use consent_integrity::ConsentStatus;
    use jeeva_health_shared::{AccessPolicy, HealthError};

    #[test]
    fn test_new_request_never_authorizes() {
        let world = World::new();
        for n in 0..5 {
            let doctor = world.doctor(&format!("doctor{n}@example.com")).unwrap();
            let patient = world.patient(&format!("patient{n}@example.com")).unwrap();
            world
                .ledger
                .create_request(doctor.id, patient.id, "checkup", None)
                .unwrap();
            assert!(!world.evaluator.is_authorized(doctor.id, patient.id).unwrap());
        }
    }

    #[test]
    fn test_approval_without_expiry_authorizes() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();

        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();

        assert!(world.evaluator.is_authorized(doctor.id, patient.id).unwrap());
        // A year later it still holds
        assert!(world
            .evaluator
            .is_authorized_at(doctor.id, patient.id, world.now() + Duration::days(365))
            .unwrap());
    }

    #[test]
    fn test_approval_expired_yesterday_is_not_authorization() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();

        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", Some(world.today() + Duration::days(2)))
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();
        assert!(world.evaluator.is_authorized(doctor.id, patient.id).unwrap());

        world.advance(Duration::days(3));
        let result = world
            .evaluator
            .check_authorization(doctor.id, patient.id)
            .unwrap();
        assert!(!result.authorized);
        assert_eq!(result.consent_id, Some(request.id));
    }

    #[test]
    fn test_responding_twice_fails() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();

        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Denied)
            .unwrap();
        let second = world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved);
        assert!(matches!(second, Err(HealthError::InvalidTransition(_))));
        assert!(!world.evaluator.is_authorized(doctor.id, patient.id).unwrap());
    }

    #[test]
    fn test_revoking_unapproved_request_fails() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();

        assert!(matches!(
            world.ledger.revoke(request.id, patient.id),
            Err(HealthError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_patient_cannot_answer_someone_elses_request() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        let other = world.patient("ravi@example.com").unwrap();
        let request = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();

        assert!(matches!(
            world.ledger.respond(request.id, other.id, ConsentStatus::Approved),
            Err(HealthError::Unauthorized(_))
        ));
        assert_eq!(
            world.ledger.get(request.id, patient.id).unwrap().status,
            ConsentStatus::Pending
        );
    }

    #[test]
    fn test_re_request_after_denial() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();

        let first = world
            .ledger
            .create_request(doctor.id, patient.id, "annual checkup", None)
            .unwrap();
        world.advance(Duration::hours(1));
        world
            .ledger
            .respond(first.id, patient.id, ConsentStatus::Denied)
            .unwrap();

        world.advance(Duration::days(1));
        let second = world
            .ledger
            .create_request(doctor.id, patient.id, "follow-up", None)
            .unwrap();
        world.advance(Duration::hours(1));
        world
            .ledger
            .respond(second.id, patient.id, ConsentStatus::Approved)
            .unwrap();

        assert!(world.evaluator.is_authorized(doctor.id, patient.id).unwrap());

        let inbox = world.ledger.list_for_patient(patient.id).unwrap();
        assert_eq!(inbox.len(), 2);
        // Newest first: the follow-up, then the original
        assert_eq!(inbox[0].purpose, "follow-up");
        assert_eq!(inbox[0].status, ConsentStatus::Approved);
        assert_eq!(inbox[1].purpose, "annual checkup");
        assert_eq!(inbox[1].status, ConsentStatus::Denied);
    }

    #[test]
    fn test_pending_re_request_keeps_earlier_approval() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();

        let first = world
            .ledger
            .create_request(doctor.id, patient.id, "checkup", None)
            .unwrap();
        world
            .ledger
            .respond(first.id, patient.id, ConsentStatus::Approved)
            .unwrap();
        world.advance(Duration::days(30));
        world
            .ledger
            .create_request(doctor.id, patient.id, "imaging review", None)
            .unwrap();

        assert!(world.evaluator.is_authorized(doctor.id, patient.id).unwrap());
    }

    #[test]
    fn test_consent_is_per_doctor() {
        let world = World::new();
        let mehta = world.doctor("dr.mehta@example.com").unwrap();
        let rao = world.doctor("dr.rao@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();

        let request = world
            .ledger
            .create_request(mehta.id, patient.id, "checkup", None)
            .unwrap();
        world
            .ledger
            .respond(request.id, patient.id, ConsentStatus::Approved)
            .unwrap();

        assert!(world.evaluator.is_authorized(mehta.id, patient.id).unwrap());
        assert!(!world.evaluator.is_authorized(rao.id, patient.id).unwrap());
    }

    #[test]
    fn test_invite_by_email_provisions_patient() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();

        let request = world
            .ledger
            .request_by_email(
                doctor.id,
                "New.Patient@Example.com",
                "",
                None,
                Some(&world.profiles),
            )
            .unwrap();

        let invited = world.profiles.find_by_email("new.patient@example.com").unwrap().unwrap();
        assert_eq!(request.patient_id, invited.id);
        assert_eq!(request.purpose, "Access to health records");

        // The invitee signs in later and sees the request in their inbox
        let patient = world.patient("new.patient@example.com").unwrap();
        assert_eq!(patient.id, invited.id);
        assert_eq!(world.ledger.list_for_patient(patient.id).unwrap().len(), 1);
    }
}
