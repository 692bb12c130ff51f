//! Care-assignment engine.
//!
//! Owns the patient staffing state machine:
//!
//! ```text
//! Unassigned --assign nurse--> NurseAssigned --assign doctor--> DoctorAssigned
//! ```
//!
//! The state is never stored; it is derived from `nurse_count` and
//! `doctor_assigned` after every mutation. Each mutation runs in one
//! `BEGIN IMMEDIATE` transaction, so concurrent mutations of the same patient
//! are serialized and a failed check leaves nothing behind.

mod board;

pub use board::*;

use thiserror::Error;

use crate::db::{Database, DbError};
use crate::models::{Patient, Role, User, MAX_NURSES};

/// Care-assignment errors.
#[derive(Error, Debug)]
pub enum CareError {
    #[error("User {user_id} cannot perform this action: requires role {expected}")]
    RoleMismatch {
        user_id: String,
        expected: &'static str,
        actual: Option<Role>,
    },

    #[error("Patient {patient_id} already has the maximum of {max} nurses")]
    CapacityExceeded { patient_id: String, max: u32 },

    #[error("User {user_id} is already assigned to patient {patient_id}")]
    DuplicateAssignment { patient_id: String, user_id: String },

    #[error("Patient {0} already has a doctor assigned")]
    AlreadyAssigned(String),

    #[error("Patient {0} needs at least one nurse before a doctor can be assigned")]
    PrecedenceViolation(String),

    #[error("User {user_id} is not assigned to patient {patient_id}")]
    NotAssigned { patient_id: String, user_id: String },

    #[error("User {user_id} holds {count} active assignment(s); unassign them before changing role")]
    ActiveAssignments { user_id: String, count: u32 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Staffing invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<rusqlite::Error> for CareError {
    fn from(e: rusqlite::Error) -> Self {
        CareError::Database(DbError::from(e))
    }
}

pub type CareResult<T> = Result<T, CareError>;

/// Whether a user with `role` may assign themselves to `patient`.
pub fn can_assign(role: Option<Role>, patient: &Patient, is_assigned: bool) -> bool {
    match role {
        Some(Role::Doctor) => !patient.doctor_assigned && patient.nurse_count > 0,
        Some(Role::Nurse) => patient.has_nurse_capacity() && !is_assigned,
        _ => false,
    }
}

/// Whether a user with `role` may unassign themselves from a patient.
pub fn can_unassign(role: Option<Role>, is_assigned: bool) -> bool {
    role.is_some_and(|r| r.is_clinical()) && is_assigned
}

fn require_role(user: &User, expected: Role) -> CareResult<()> {
    if user.role == Some(expected) {
        Ok(())
    } else {
        Err(CareError::RoleMismatch {
            user_id: user.id.clone(),
            expected: expected.as_str(),
            actual: user.role,
        })
    }
}

fn invariant_violation(patient: &Patient, message: &str) -> CareError {
    tracing::error!(
        patient_id = %patient.id,
        nurse_count = patient.nurse_count,
        doctor_assigned = patient.doctor_assigned,
        "{}",
        message
    );
    CareError::InvariantViolation(format!("patient {}: {}", patient.id, message))
}

/// Staffing operations over a database.
pub struct CareEngine<'a> {
    db: &'a Database,
}

impl<'a> CareEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn load_patient(&self, patient_id: &str) -> CareResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| CareError::NotFound {
                entity: "Patient",
                id: patient_id.to_string(),
            })
    }

    fn save_staffing(&self, patient: &mut Patient) -> CareResult<()> {
        patient.touch();
        if !self.db.update_patient_staffing(patient)? {
            return Err(CareError::NotFound {
                entity: "Patient",
                id: patient.id.clone(),
            });
        }
        Ok(())
    }

    /// Assign a nurse to a patient.
    pub fn assign_nurse(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        require_role(user, Role::Nurse)?;

        let tx = self.db.begin_immediate()?;
        let mut patient = self.load_patient(patient_id)?;

        if patient.nurse_count >= MAX_NURSES {
            return Err(CareError::CapacityExceeded {
                patient_id: patient.id,
                max: MAX_NURSES,
            });
        }
        if self.db.is_treating(&patient.id, &user.id)? {
            return Err(CareError::DuplicateAssignment {
                patient_id: patient.id,
                user_id: user.id.clone(),
            });
        }

        self.db.insert_treatment_record(&patient.id, &user.id)?;
        patient.nurse_count += 1;
        self.save_staffing(&mut patient)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %patient.id,
            worker_id = %user.id,
            nurse_count = patient.nurse_count,
            state = %patient.state(),
            "Assigned nurse"
        );
        Ok(patient)
    }

    /// Assign a doctor to a patient. Requires at least one nurse.
    pub fn assign_doctor(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        require_role(user, Role::Doctor)?;

        let tx = self.db.begin_immediate()?;
        let mut patient = self.load_patient(patient_id)?;

        if self.db.is_treating(&patient.id, &user.id)? {
            return Err(CareError::DuplicateAssignment {
                patient_id: patient.id,
                user_id: user.id.clone(),
            });
        }
        if patient.doctor_assigned {
            return Err(CareError::AlreadyAssigned(patient.id));
        }
        if patient.nurse_count == 0 {
            return Err(CareError::PrecedenceViolation(patient.id));
        }

        self.db.insert_treatment_record(&patient.id, &user.id)?;
        patient.doctor_assigned = true;
        self.save_staffing(&mut patient)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %patient.id,
            worker_id = %user.id,
            nurse_count = patient.nurse_count,
            state = %patient.state(),
            "Assigned doctor"
        );
        Ok(patient)
    }

    /// Remove a nurse from a patient. The doctor flag is left alone.
    pub fn unassign_nurse(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        require_role(user, Role::Nurse)?;

        let tx = self.db.begin_immediate()?;
        let mut patient = self.load_patient(patient_id)?;

        let record = self
            .db
            .get_treatment_record(&patient.id, &user.id)?
            .ok_or_else(|| CareError::NotAssigned {
                patient_id: patient.id.clone(),
                user_id: user.id.clone(),
            })?;

        let remaining = patient
            .nurse_count
            .checked_sub(1)
            .ok_or_else(|| invariant_violation(&patient, "nurse record exists but nurse_count is 0"))?;

        self.db.delete_treatment_record(record.id)?;
        patient.nurse_count = remaining;
        self.save_staffing(&mut patient)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %patient.id,
            worker_id = %user.id,
            nurse_count = patient.nurse_count,
            state = %patient.state(),
            "Unassigned nurse"
        );
        Ok(patient)
    }

    /// Remove the doctor from a patient.
    pub fn unassign_doctor(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        require_role(user, Role::Doctor)?;

        let tx = self.db.begin_immediate()?;
        let mut patient = self.load_patient(patient_id)?;

        let record = self
            .db
            .get_treatment_record(&patient.id, &user.id)?
            .ok_or_else(|| CareError::NotAssigned {
                patient_id: patient.id.clone(),
                user_id: user.id.clone(),
            })?;

        if !patient.doctor_assigned {
            return Err(invariant_violation(
                &patient,
                "doctor record exists but doctor_assigned is false",
            ));
        }

        self.db.delete_treatment_record(record.id)?;
        patient.doctor_assigned = false;
        self.save_staffing(&mut patient)?;
        tx.commit()?;

        tracing::info!(
            patient_id = %patient.id,
            worker_id = %user.id,
            nurse_count = patient.nurse_count,
            state = %patient.state(),
            "Unassigned doctor"
        );
        Ok(patient)
    }

    /// Assign the user by their role.
    pub fn assign(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        match user.role {
            Some(Role::Nurse) => self.assign_nurse(patient_id, user),
            Some(Role::Doctor) => self.assign_doctor(patient_id, user),
            actual => Err(CareError::RoleMismatch {
                user_id: user.id.clone(),
                expected: "nurse or doctor",
                actual,
            }),
        }
    }

    /// Unassign the user by their role.
    pub fn unassign(&self, patient_id: &str, user: &User) -> CareResult<Patient> {
        match user.role {
            Some(Role::Nurse) => self.unassign_nurse(patient_id, user),
            Some(Role::Doctor) => self.unassign_doctor(patient_id, user),
            actual => Err(CareError::RoleMismatch {
                user_id: user.id.clone(),
                expected: "nurse or doctor",
                actual,
            }),
        }
    }

    /// Set or clear a user's role (admin action).
    ///
    /// Treatment records count toward the nurse or doctor slot of the role
    /// held at assignment time, so the role is frozen while any are held.
    pub fn change_role(&self, user_id: &str, role: Option<Role>) -> CareResult<User> {
        let tx = self.db.begin_immediate()?;

        let mut user = self.db.get_user(user_id)?.ok_or_else(|| CareError::NotFound {
            entity: "User",
            id: user_id.to_string(),
        })?;
        if user.role == role {
            return Ok(user);
        }

        let count = self.db.count_records_for_worker(&user.id)?;
        if count > 0 {
            return Err(CareError::ActiveAssignments {
                user_id: user.id,
                count,
            });
        }

        self.db.update_user_role(&user.id, role)?;
        tx.commit()?;

        tracing::info!(
            user_id = %user.id,
            from = user.role.map(|r| r.as_str()).unwrap_or("-"),
            to = role.map(|r| r.as_str()).unwrap_or("-"),
            "Changed user role"
        );
        user.role = role;
        Ok(user)
    }

    /// Whether the user could assign themselves to the patient right now.
    pub fn can_assign(&self, patient_id: &str, user: &User) -> CareResult<bool> {
        let patient = self.load_patient(patient_id)?;
        let is_assigned = self.db.is_treating(&patient.id, &user.id)?;
        Ok(can_assign(user.role, &patient, is_assigned))
    }

    /// Whether the user could unassign themselves from the patient right now.
    pub fn can_unassign(&self, patient_id: &str, user: &User) -> CareResult<bool> {
        let patient = self.load_patient(patient_id)?;
        let is_assigned = self.db.is_treating(&patient.id, &user.id)?;
        Ok(can_unassign(user.role, is_assigned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CareState;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, email: &str, role: Option<Role>) -> User {
        let user = User::new(email.into(), "Test".into(), email.into(), role);
        db.insert_user(&user).unwrap();
        user
    }

    fn add_patient(db: &Database) -> Patient {
        let patient = Patient::new("John Doe".into(), "123 Main St".into());
        db.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_assign_nurse() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "a@example.com", Some(Role::Nurse));

        let updated = engine.assign_nurse(&patient.id, &nurse).unwrap();
        assert_eq!(updated.nurse_count, 1);
        assert_eq!(updated.state(), CareState::NurseAssigned);

        let stored = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(stored.nurse_count, 1);
        assert!(db.is_treating(&patient.id, &nurse.id).unwrap());
    }

    #[test]
    fn test_role_checked_first() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));
        let admin = add_user(&db, "x@example.com", Some(Role::Admin));

        assert!(matches!(
            engine.assign_nurse(&patient.id, &doctor),
            Err(CareError::RoleMismatch { .. })
        ));
        assert!(matches!(
            engine.assign(&patient.id, &admin),
            Err(CareError::RoleMismatch { actual: Some(Role::Admin), .. })
        ));
        // Role beats a missing patient
        assert!(matches!(
            engine.unassign_doctor("missing", &admin),
            Err(CareError::RoleMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_patient() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let nurse = add_user(&db, "a@example.com", Some(Role::Nurse));

        assert!(matches!(
            engine.assign_nurse("missing", &nurse),
            Err(CareError::NotFound { entity: "Patient", .. })
        ));
    }

    #[test]
    fn test_capacity_checked_before_duplicate() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);

        let nurses: Vec<_> = (0..3)
            .map(|i| add_user(&db, &format!("n{}@example.com", i), Some(Role::Nurse)))
            .collect();
        for nurse in &nurses {
            engine.assign_nurse(&patient.id, nurse).unwrap();
        }

        // An already-assigned nurse on a full patient sees the capacity error
        assert!(matches!(
            engine.assign_nurse(&patient.id, &nurses[0]),
            Err(CareError::CapacityExceeded { max: 3, .. })
        ));
    }

    #[test]
    fn test_doctor_checks_in_order() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));
        let other = add_user(&db, "o@example.com", Some(Role::Doctor));

        assert!(matches!(
            engine.assign_doctor(&patient.id, &doctor),
            Err(CareError::PrecedenceViolation(_))
        ));

        engine.assign_nurse(&patient.id, &nurse).unwrap();
        let updated = engine.assign_doctor(&patient.id, &doctor).unwrap();
        assert!(updated.doctor_assigned);
        assert_eq!(updated.state(), CareState::DoctorAssigned);

        assert!(matches!(
            engine.assign_doctor(&patient.id, &doctor),
            Err(CareError::DuplicateAssignment { .. })
        ));
        assert!(matches!(
            engine.assign_doctor(&patient.id, &other),
            Err(CareError::AlreadyAssigned(_))
        ));
    }

    #[test]
    fn test_failed_check_leaves_no_trace() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));

        engine.assign_doctor(&patient.id, &doctor).unwrap_err();
        assert!(!db.is_treating(&patient.id, &doctor.id).unwrap());
        // Connection is usable again after the rolled-back transaction
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));
        engine.assign_nurse(&patient.id, &nurse).unwrap();
    }

    #[test]
    fn test_unassign_nurse_keeps_doctor() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));

        engine.assign_nurse(&patient.id, &nurse).unwrap();
        engine.assign_doctor(&patient.id, &doctor).unwrap();

        let updated = engine.unassign_nurse(&patient.id, &nurse).unwrap();
        assert_eq!(updated.nurse_count, 0);
        assert!(updated.doctor_assigned);
        assert_eq!(updated.state(), CareState::DoctorAssigned);

        let updated = engine.unassign_doctor(&patient.id, &doctor).unwrap();
        assert_eq!(updated.state(), CareState::Unassigned);
    }

    #[test]
    fn test_unassign_not_assigned() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));

        assert!(matches!(
            engine.unassign_nurse(&patient.id, &nurse),
            Err(CareError::NotAssigned { .. })
        ));
    }

    #[test]
    fn test_counter_underflow_is_invariant_violation() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));

        // Corrupt state: a record without a matching counter
        db.insert_treatment_record(&patient.id, &nurse.id).unwrap();

        assert!(matches!(
            engine.unassign_nurse(&patient.id, &nurse),
            Err(CareError::InvariantViolation(_))
        ));
        // Rolled back: the record is still there
        assert!(db.is_treating(&patient.id, &nurse.id).unwrap());
    }

    #[test]
    fn test_dispatch_by_role() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));

        engine.assign(&patient.id, &nurse).unwrap();
        let updated = engine.assign(&patient.id, &doctor).unwrap();
        assert_eq!(updated.state(), CareState::DoctorAssigned);

        let updated = engine.unassign(&patient.id, &doctor).unwrap();
        assert_eq!(updated.state(), CareState::NurseAssigned);
    }

    #[test]
    fn test_can_assign_rules() {
        let mut patient = Patient::new("P".into(), "".into());

        assert!(can_assign(Some(Role::Nurse), &patient, false));
        assert!(!can_assign(Some(Role::Doctor), &patient, false));
        assert!(!can_assign(Some(Role::Admin), &patient, false));
        assert!(!can_assign(None, &patient, false));

        patient.nurse_count = 1;
        assert!(can_assign(Some(Role::Doctor), &patient, false));
        assert!(!can_assign(Some(Role::Nurse), &patient, true));

        patient.nurse_count = 3;
        assert!(!can_assign(Some(Role::Nurse), &patient, false));

        patient.doctor_assigned = true;
        assert!(!can_assign(Some(Role::Doctor), &patient, false));
    }

    #[test]
    fn test_can_unassign_rules() {
        assert!(can_unassign(Some(Role::Nurse), true));
        assert!(can_unassign(Some(Role::Doctor), true));
        assert!(!can_unassign(Some(Role::Nurse), false));
        assert!(!can_unassign(Some(Role::Admin), true));
    }

    #[test]
    fn test_engine_can_assign() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));

        assert!(engine.can_assign(&patient.id, &nurse).unwrap());
        assert!(!engine.can_unassign(&patient.id, &nurse).unwrap());

        engine.assign_nurse(&patient.id, &nurse).unwrap();
        assert!(!engine.can_assign(&patient.id, &nurse).unwrap());
        assert!(engine.can_unassign(&patient.id, &nurse).unwrap());
    }

    #[test]
    fn test_role_frozen_while_assigned() {
        let db = setup_db();
        let engine = CareEngine::new(&db);
        let patient = add_patient(&db);
        let nurse = add_user(&db, "n@example.com", Some(Role::Nurse));
        let doctor = add_user(&db, "d@example.com", Some(Role::Doctor));

        engine.assign_nurse(&patient.id, &nurse).unwrap();
        engine.assign_doctor(&patient.id, &doctor).unwrap();

        assert!(matches!(
            engine.change_role(&nurse.id, Some(Role::Doctor)),
            Err(CareError::ActiveAssignments { count: 1, .. })
        ));
        assert_eq!(db.get_user(&nurse.id).unwrap().unwrap().role, Some(Role::Nurse));

        // Unchanged role is a no-op even while assigned
        engine.change_role(&nurse.id, Some(Role::Nurse)).unwrap();

        // The nurse still leaves through the nurse slot
        let patient = engine.unassign(&patient.id, &nurse).unwrap();
        assert_eq!(patient.nurse_count, 0);
        assert!(patient.doctor_assigned);
        assert_eq!(db.count_treating_by_role(&patient.id, Role::Doctor).unwrap(), 1);

        let promoted = engine.change_role(&nurse.id, Some(Role::Doctor)).unwrap();
        assert_eq!(promoted.role, Some(Role::Doctor));
        assert!(matches!(
            engine.assign(&patient.id, &promoted),
            Err(CareError::AlreadyAssigned(_))
        ));
    }

    #[test]
    fn test_change_role_missing_user() {
        let db = setup_db();
        let engine = CareEngine::new(&db);

        assert!(matches!(
            engine.change_role("missing", Some(Role::Nurse)),
            Err(CareError::NotFound { entity: "User", .. })
        ));
    }
}
