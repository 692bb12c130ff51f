//! Treatment record database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{AssignedWorker, Role, TreatmentRecord};

impl Database {
    /// Record that a worker now treats a patient.
    pub(crate) fn insert_treatment_record(
        &self,
        patient_id: &str,
        worker_id: &str,
    ) -> DbResult<TreatmentRecord> {
        let created_at = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO treatment_records (patient_id, worker_id, created_at) VALUES (?1, ?2, ?3)",
            params![patient_id, worker_id, created_at],
        )?;

        Ok(TreatmentRecord {
            id: self.conn.last_insert_rowid(),
            patient_id: patient_id.to_string(),
            worker_id: worker_id.to_string(),
            created_at,
        })
    }

    /// Get the treatment record for a patient/worker pair.
    pub fn get_treatment_record(
        &self,
        patient_id: &str,
        worker_id: &str,
    ) -> DbResult<Option<TreatmentRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_id, worker_id, created_at
                FROM treatment_records
                WHERE patient_id = ? AND worker_id = ?
                "#,
                params![patient_id, worker_id],
                |row| {
                    Ok(TreatmentRecord {
                        id: row.get(0)?,
                        patient_id: row.get(1)?,
                        worker_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Whether a worker currently treats a patient.
    pub fn is_treating(&self, patient_id: &str, worker_id: &str) -> DbResult<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM treatment_records WHERE patient_id = ? AND worker_id = ?)",
            params![patient_id, worker_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Delete a treatment record by ID.
    pub(crate) fn delete_treatment_record(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM treatment_records WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Count a patient's active records held by workers of one role.
    pub fn count_treating_by_role(&self, patient_id: &str, role: Role) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM treatment_records tr
            JOIN users u ON u.id = tr.worker_id
            WHERE tr.patient_id = ? AND u.role = ?
            "#,
            params![patient_id, role.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count the active records a worker holds across all patients.
    pub fn count_records_for_worker(&self, worker_id: &str) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM treatment_records WHERE worker_id = ?",
            [worker_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// List the workers assigned to a patient, in assignment order.
    pub fn list_assigned_workers(&self, patient_id: &str) -> DbResult<Vec<AssignedWorker>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT u.id, u.first_name, u.last_name, u.role
            FROM treatment_records tr
            JOIN users u ON u.id = tr.worker_id
            WHERE tr.patient_id = ?
            ORDER BY tr.id
            "#,
        )?;

        let rows = stmt.query_map([patient_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut workers = Vec::new();
        for row in rows {
            let (user_id, first_name, last_name, role) = row?;
            let role = role
                .map(|s| s.parse::<Role>())
                .transpose()
                .map_err(|e| DbError::Constraint(e.to_string()))?;
            workers.push(AssignedWorker {
                user_id,
                name: format!("{} {}", first_name, last_name).trim().to_string(),
                role,
            });
        }
        Ok(workers)
    }
}
