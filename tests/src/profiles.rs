//! Profile Directory Tests
//!
//! Get-or-create on first sight, role switching, and the relationship
//! between the profile cache and the consent ledger.

#[cfg(test)]
mod tests {
    use crate::World;
    use chrono::Duration;
    use jeeva_health_shared::{HealthError, Role};
    use profile::ProfileDirectory;
    use profile_integrity::ProfileUpdate;

    #[test]
    fn test_first_sight_creates_one_patient_profile() {
        let world = World::new();

        let first = world.profiles.me("Asha@Example.com").unwrap();
        let second = world.profiles.me("  asha@example.COM").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.role, Role::Patient);
        assert_eq!(first.email, "asha@example.com");
        let stored = world.directory.find_by_email("ASHA@EXAMPLE.COM").unwrap();
        assert_eq!(stored.map(|profile| profile.id), Some(first.id));
    }

    #[test]
    fn test_patient_cannot_request_consent_until_switching_role() {
        let world = World::new();
        let ravi = world.patient("ravi@example.com").unwrap();
        let asha = world.patient("asha@example.com").unwrap();

        assert!(matches!(
            world.ledger.create_request(ravi.id, asha.id, "checkup", None),
            Err(HealthError::ValidationError(_))
        ));

        let doctor = world.doctor("ravi@example.com").unwrap();
        assert_eq!(doctor.id, ravi.id);
        assert_eq!(doctor.role, Role::Doctor);
        assert!(world
            .ledger
            .create_request(doctor.id, asha.id, "checkup", None)
            .is_ok());
    }

    #[test]
    fn test_admin_role_cannot_be_self_assigned() {
        let world = World::new();
        world.patient("asha@example.com").unwrap();

        let result = world.profiles.update_me(
            "asha@example.com",
            ProfileUpdate {
                role: Some(Role::Admin),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(HealthError::ValidationError(_))));
        assert_eq!(
            world.profiles.me("asha@example.com").unwrap().role,
            Role::Patient
        );
    }

    #[test]
    fn test_sign_out_drops_stale_identity() {
        let world = World::new();
        let mut profile = world.profiles.me("asha@example.com").unwrap();

        // An operator renames the profile directly in the directory
        profile.first_name = "Asha".to_string();
        world.directory.update(profile).unwrap();
        assert_eq!(world.profiles.me("asha@example.com").unwrap().first_name, "");

        world.profiles.sign_out("asha@example.com");
        assert_eq!(
            world.profiles.me("asha@example.com").unwrap().first_name,
            "Asha"
        );
    }

    #[test]
    fn test_cached_role_never_decides_consent() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();
        let patient = world.patient("asha@example.com").unwrap();
        assert_eq!(
            world.profiles.caller("dr.mehta@example.com").unwrap().role,
            Role::Doctor
        );

        // Demoted directly in the directory while a cached Doctor identity lives on
        let mut demoted = world.profiles.get(doctor.id).unwrap();
        demoted.role = Role::Patient;
        world.directory.update(demoted).unwrap();
        assert_eq!(
            world.profiles.caller("dr.mehta@example.com").unwrap().role,
            Role::Doctor
        );

        // The ledger checks roles against the directory
        assert!(matches!(
            world.ledger.create_request(doctor.id, patient.id, "checkup", None),
            Err(HealthError::ValidationError(_))
        ));

        world.advance(Duration::minutes(5));
        assert_eq!(
            world.profiles.caller("dr.mehta@example.com").unwrap().role,
            Role::Patient
        );
    }

    #[test]
    fn test_unknown_invitee_is_not_found_without_provisioning() {
        let world = World::new();
        let doctor = world.doctor("dr.mehta@example.com").unwrap();

        let result = world.ledger.request_by_email(
            doctor.id,
            "nobody@example.com",
            "checkup",
            None,
            None,
        );
        assert!(matches!(result, Err(HealthError::NotFound(_))));
        assert!(world
            .profiles
            .find_by_email("nobody@example.com")
            .unwrap()
            .is_none());
    }
}
