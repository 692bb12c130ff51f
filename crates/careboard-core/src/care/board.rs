//! Care boards: patient lists annotated for the viewing user.

use serde::{Deserialize, Serialize};

use super::{can_assign, can_unassign, CareEngine, CareError, CareResult};
use crate::models::{CareState, Geocode, Page, Patient, PatientQuery, Role, User};

/// A staff member shown on a board entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardWorker {
    pub user_id: String,
    pub name: String,
    pub role: Option<Role>,
    pub is_current_user: bool,
}

/// One patient row on a board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardEntry {
    pub patient: Patient,
    pub state: CareState,
    pub workers: Vec<BoardWorker>,
    pub is_assigned_to_user: bool,
    pub can_assign: bool,
    pub can_unassign: bool,
}

/// Patients of one geocode plus the other geocodes to switch to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CareBoard {
    /// None when no geocode was given and the user has no primary geocode
    pub geocode: Option<Geocode>,
    pub entries: Page<BoardEntry>,
    pub other_geocodes: Vec<Geocode>,
}

impl<'a> CareEngine<'a> {
    /// Board for a geocode: the explicit one, else the user's primary one.
    pub fn care_board(
        &self,
        user: &User,
        geocode_id: Option<&str>,
        query: &PatientQuery,
    ) -> CareResult<CareBoard> {
        let geocode = match geocode_id.or(user.primary_geocode_id.as_deref()) {
            Some(id) => {
                let found = self.db.get_geocode(id)?;
                if found.is_none() && geocode_id.is_some() {
                    return Err(CareError::NotFound {
                        entity: "Geocode",
                        id: id.to_string(),
                    });
                }
                found
            }
            None => None,
        };

        let entries = match &geocode {
            Some(g) => {
                let patients = self.db.list_patients_in_geocode(&g.id, query)?;
                self.annotate(user, patients)?
            }
            None => Page::empty(query.page.max(1), query.page_size),
        };

        let current_id = geocode.as_ref().map(|g| g.id.as_str());
        let other_geocodes = self
            .db
            .list_geocodes()?
            .into_iter()
            .filter(|g| Some(g.id.as_str()) != current_id)
            .collect();

        tracing::debug!(
            user_id = %user.id,
            geocode_id = current_id.unwrap_or("-"),
            total = entries.total,
            "Built care board"
        );

        Ok(CareBoard {
            geocode,
            entries,
            other_geocodes,
        })
    }

    /// Board of the patients the user is currently assigned to.
    pub fn my_board(&self, user: &User, query: &PatientQuery) -> CareResult<Page<BoardEntry>> {
        let patients = self.db.list_patients_for_worker(&user.id, query)?;
        self.annotate(user, patients)
    }

    fn annotate(&self, user: &User, patients: Page<Patient>) -> CareResult<Page<BoardEntry>> {
        let mut entries = Vec::with_capacity(patients.items.len());
        for patient in &patients.items {
            let workers: Vec<BoardWorker> = self
                .db
                .list_assigned_workers(&patient.id)?
                .into_iter()
                .map(|w| BoardWorker {
                    is_current_user: w.user_id == user.id,
                    user_id: w.user_id,
                    name: w.name,
                    role: w.role,
                })
                .collect();
            let is_assigned = workers.iter().any(|w| w.is_current_user);

            entries.push(BoardEntry {
                state: patient.state(),
                can_assign: can_assign(user.role, patient, is_assigned),
                can_unassign: can_unassign(user.role, is_assigned),
                is_assigned_to_user: is_assigned,
                workers,
                patient: patient.clone(),
            });
        }

        Ok(Page {
            items: entries,
            page: patients.page,
            page_size: patients.page_size,
            total: patients.total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn add_user(db: &Database, email: &str, role: Role, geocode: Option<&Geocode>) -> User {
        let mut user = User::new(email.into(), "Test".into(), "User".into(), Some(role));
        user.primary_geocode_id = geocode.map(|g| g.id.clone());
        db.insert_user(&user).unwrap();
        user
    }

    fn add_patient(db: &Database, name: &str, geocode: &Geocode) -> Patient {
        let mut patient = Patient::new(name.into(), "".into());
        patient.geocode_id = Some(geocode.id.clone());
        db.insert_patient(&patient).unwrap();
        patient
    }

    #[test]
    fn test_board_uses_primary_geocode() {
        let db = setup_db();
        let north = Geocode::new("North".into(), "".into());
        let south = Geocode::new("South".into(), "".into());
        db.insert_geocode(&north).unwrap();
        db.insert_geocode(&south).unwrap();

        let nurse = add_user(&db, "n@example.com", Role::Nurse, Some(&north));
        let patient = add_patient(&db, "Ann", &north);
        add_patient(&db, "Bob", &south);

        let engine = CareEngine::new(&db);
        engine.assign_nurse(&patient.id, &nurse).unwrap();

        let board = engine
            .care_board(&nurse, None, &PatientQuery::default())
            .unwrap();
        assert_eq!(board.geocode.as_ref().map(|g| g.name.as_str()), Some("North"));
        assert_eq!(board.entries.total, 1);
        assert_eq!(board.other_geocodes, vec![south.clone()]);

        let entry = &board.entries.items[0];
        assert_eq!(entry.state, CareState::NurseAssigned);
        assert!(entry.is_assigned_to_user);
        assert!(!entry.can_assign);
        assert!(entry.can_unassign);
        assert_eq!(entry.workers.len(), 1);
        assert!(entry.workers[0].is_current_user);

        let board = engine
            .care_board(&nurse, Some(south.id.as_str()), &PatientQuery::default())
            .unwrap();
        assert_eq!(board.entries.items[0].patient.name, "Bob");
        assert!(board.entries.items[0].can_assign);
    }

    #[test]
    fn test_board_without_geocode_is_empty() {
        let db = setup_db();
        let north = Geocode::new("North".into(), "".into());
        db.insert_geocode(&north).unwrap();
        add_patient(&db, "Ann", &north);
        let doctor = add_user(&db, "d@example.com", Role::Doctor, None);

        let board = CareEngine::new(&db)
            .care_board(&doctor, None, &PatientQuery::default())
            .unwrap();
        assert!(board.geocode.is_none());
        assert_eq!(board.entries.total, 0);
        assert_eq!(board.other_geocodes.len(), 1);
    }

    #[test]
    fn test_board_unknown_geocode() {
        let db = setup_db();
        let doctor = add_user(&db, "d@example.com", Role::Doctor, None);

        let result = CareEngine::new(&db).care_board(&doctor, Some("missing"), &PatientQuery::default());
        assert!(matches!(
            result,
            Err(CareError::NotFound { entity: "Geocode", .. })
        ));
    }

    #[test]
    fn test_my_board() {
        let db = setup_db();
        let north = Geocode::new("North".into(), "".into());
        db.insert_geocode(&north).unwrap();
        let nurse = add_user(&db, "n@example.com", Role::Nurse, None);
        let doctor = add_user(&db, "d@example.com", Role::Doctor, None);
        let mine = add_patient(&db, "Ann", &north);
        add_patient(&db, "Bob", &north);

        let engine = CareEngine::new(&db);
        engine.assign_nurse(&mine.id, &nurse).unwrap();

        let board = engine.my_board(&nurse, &PatientQuery::default()).unwrap();
        assert_eq!(board.total, 1);
        assert_eq!(board.items[0].patient.id, mine.id);

        let board = engine.my_board(&doctor, &PatientQuery::default()).unwrap();
        assert_eq!(board.total, 0);
    }
}
