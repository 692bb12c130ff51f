//! Patient database operations.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{contains_pattern, Database, DbResult};
use crate::models::{limit_offset, Page, Patient, PatientQuery};

const PATIENT_COLUMNS: &str = r#"
    p.id, p.name, p.address, p.date_of_birth, p.height_in, p.weight_lb,
    p.blood_group, p.bed_id, p.treatment_area, p.geocode_id,
    p.nurse_count, p.doctor_assigned, p.created_at, p.updated_at
"#;

/// SQL projection of the derived care state (kept in step with `CareState::derive`).
const STATE_SQL: &str = r#"
    CASE
        WHEN p.doctor_assigned = 1 THEN 'doctor_assigned'
        WHEN p.nurse_count > 0 THEN 'nurse_assigned'
        ELSE 'unassigned'
    END
"#;

/// Which patients a list query covers.
enum PatientScope<'a> {
    All,
    Geocode(&'a str),
    Worker(&'a str),
}

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, name, address, date_of_birth, height_in, weight_lb,
                blood_group, bed_id, treatment_area, geocode_id,
                nurse_count, doctor_assigned, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                patient.id,
                patient.name,
                patient.address,
                patient.date_of_birth,
                patient.height_in,
                patient.weight_lb,
                patient.blood_group,
                patient.bed_id,
                patient.treatment_area,
                patient.geocode_id,
                patient.nurse_count,
                patient.doctor_assigned,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a patient's demographic fields. Staffing counters are untouched.
    pub fn update_patient_details(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                address = ?3,
                date_of_birth = ?4,
                height_in = ?5,
                weight_lb = ?6,
                blood_group = ?7,
                bed_id = ?8,
                treatment_area = ?9,
                geocode_id = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.name,
                patient.address,
                patient.date_of_birth,
                patient.height_in,
                patient.weight_lb,
                patient.blood_group,
                patient.bed_id,
                patient.treatment_area,
                patient.geocode_id,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Persist staffing counters. Only the care engine calls this.
    pub(crate) fn update_patient_staffing(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                nurse_count = ?2,
                doctor_assigned = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.nurse_count,
                patient.doctor_assigned,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients p WHERE p.id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [id], patient_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Delete a patient, cascading treatment records and documents.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// List patients matching a query.
    pub fn list_patients(&self, query: &PatientQuery) -> DbResult<Page<Patient>> {
        self.query_patients(PatientScope::All, query)
    }

    /// List patients belonging to a geocode.
    pub fn list_patients_in_geocode(
        &self,
        geocode_id: &str,
        query: &PatientQuery,
    ) -> DbResult<Page<Patient>> {
        self.query_patients(PatientScope::Geocode(geocode_id), query)
    }

    /// List patients a worker is currently assigned to.
    pub fn list_patients_for_worker(
        &self,
        worker_id: &str,
        query: &PatientQuery,
    ) -> DbResult<Page<Patient>> {
        self.query_patients(PatientScope::Worker(worker_id), query)
    }

    fn query_patients(&self, scope: PatientScope<'_>, query: &PatientQuery) -> DbResult<Page<Patient>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        match scope {
            PatientScope::All => {}
            PatientScope::Geocode(geocode_id) => {
                clauses.push("p.geocode_id = ?".into());
                values.push(Value::Text(geocode_id.to_string()));
            }
            PatientScope::Worker(worker_id) => {
                clauses.push(
                    "EXISTS (SELECT 1 FROM treatment_records tr WHERE tr.patient_id = p.id AND tr.worker_id = ?)"
                        .into(),
                );
                values.push(Value::Text(worker_id.to_string()));
            }
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                r#"(p.name LIKE ? ESCAPE '\' OR p.bed_id LIKE ? ESCAPE '\'
                    OR p.treatment_area LIKE ? ESCAPE '\' OR g.name LIKE ? ESCAPE '\')"#
                    .into(),
            );
            let pattern = contains_pattern(search);
            for _ in 0..4 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        if let Some(state) = query.state {
            clauses.push(format!("{} = ?", STATE_SQL));
            values.push(Value::Text(state.as_str().to_string()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let from_sql = "FROM patients p LEFT JOIN geocodes g ON g.id = p.geocode_id";

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) {} {}", from_sql, where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let (limit, offset) = limit_offset(query.page, query.page_size);
        let sql = format!(
            "SELECT {} {} {} ORDER BY {}, p.id LIMIT {} OFFSET {}",
            PATIENT_COLUMNS,
            from_sql,
            where_sql,
            query.sort.column(),
            limit,
            offset
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), patient_from_row)?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page: query.page.max(1),
            page_size: limit as u32,
            total: total as u64,
        })
    }
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        date_of_birth: row.get(3)?,
        height_in: row.get(4)?,
        weight_lb: row.get(5)?,
        blood_group: row.get(6)?,
        bed_id: row.get(7)?,
        treatment_area: row.get(8)?,
        geocode_id: row.get(9)?,
        nurse_count: row.get(10)?,
        doctor_assigned: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}
