//! Document and field value database operations.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use super::{contains_pattern, Database, DbResult};
use crate::models::{limit_offset, Document, DocumentQuery, FileRef, Page};

const DOCUMENT_COLUMNS: &str = r#"
    d.id, d.title, d.document_type_id, d.owner_id, d.patient_id, d.creation_date,
    d.is_uploaded_pdf, d.file_key, d.file_sha256, d.file_size, d.updated_at
"#;

/// A raw stored value, not yet interpreted by its field type.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFieldValue {
    pub field_id: i64,
    pub value: String,
}

impl Database {
    // =========================================================================
    // Documents
    // =========================================================================

    /// Insert a document row.
    pub fn insert_document(&self, document: &Document) -> DbResult<()> {
        let (file_key, file_sha256, file_size) = file_columns(document.file.as_ref());
        self.conn.execute(
            r#"
            INSERT INTO documents (
                id, title, document_type_id, owner_id, patient_id, creation_date,
                is_uploaded_pdf, file_key, file_sha256, file_size, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                document.id,
                document.title,
                document.document_type_id,
                document.owner_id,
                document.patient_id,
                document.creation_date,
                document.is_uploaded_pdf,
                file_key,
                file_sha256,
                file_size,
                document.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a document's mutable columns. `creation_date` and owner never change.
    pub fn update_document(&self, document: &Document) -> DbResult<bool> {
        let (file_key, file_sha256, file_size) = file_columns(document.file.as_ref());
        let rows_affected = self.conn.execute(
            r#"
            UPDATE documents SET
                title = ?2,
                patient_id = ?3,
                is_uploaded_pdf = ?4,
                file_key = ?5,
                file_sha256 = ?6,
                file_size = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                document.id,
                document.title,
                document.patient_id,
                document.is_uploaded_pdf,
                file_key,
                file_sha256,
                file_size,
                document.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a document by ID.
    pub fn get_document(&self, id: &str) -> DbResult<Option<Document>> {
        let sql = format!("SELECT {} FROM documents d WHERE d.id = ?", DOCUMENT_COLUMNS);
        self.conn
            .query_row(&sql, [id], document_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Delete a document and its field values.
    pub fn delete_document(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM documents WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// List a patient's documents, newest first.
    pub fn list_documents_for_patient(&self, patient_id: &str) -> DbResult<Vec<Document>> {
        self.list_documents_where("d.patient_id = ?", patient_id)
    }

    /// List documents owned by a user, newest first.
    pub fn list_documents_for_owner(&self, owner_id: &str) -> DbResult<Vec<Document>> {
        self.list_documents_where("d.owner_id = ?", owner_id)
    }

    fn list_documents_where(&self, clause: &str, value: &str) -> DbResult<Vec<Document>> {
        let sql = format!(
            "SELECT {} FROM documents d WHERE {} ORDER BY d.creation_date DESC, d.id",
            DOCUMENT_COLUMNS, clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([value], document_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List documents about patients the user currently treats.
    pub fn list_documents_for_user(
        &self,
        user_id: &str,
        query: &DocumentQuery,
    ) -> DbResult<Page<Document>> {
        let mut clauses = vec![
            "EXISTS (SELECT 1 FROM treatment_records tr WHERE tr.patient_id = d.patient_id AND tr.worker_id = ?)"
                .to_string(),
        ];
        let mut values = vec![Value::Text(user_id.to_string())];

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push(
                r#"(d.title LIKE ? ESCAPE '\' OR p.name LIKE ? ESCAPE '\' OR t.name LIKE ? ESCAPE '\'
                    OR (u.first_name || ' ' || u.last_name) LIKE ? ESCAPE '\')"#
                    .into(),
            );
            let pattern = contains_pattern(search);
            for _ in 0..4 {
                values.push(Value::Text(pattern.clone()));
            }
        }

        if let Some(type_id) = query.document_type_id {
            clauses.push("d.document_type_id = ?".into());
            values.push(Value::Integer(type_id));
        }

        let from_sql = r#"
            FROM documents d
            JOIN document_types t ON t.id = d.document_type_id
            JOIN users u ON u.id = d.owner_id
            LEFT JOIN patients p ON p.id = d.patient_id
        "#;
        let where_sql = format!("WHERE {}", clauses.join(" AND "));

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) {} {}", from_sql, where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        let (limit, offset) = limit_offset(query.page, query.page_size);
        let sql = format!(
            "SELECT {} {} {} ORDER BY {}, d.id LIMIT {} OFFSET {}",
            DOCUMENT_COLUMNS,
            from_sql,
            where_sql,
            query.sort.order_by(),
            limit,
            offset
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), document_from_row)?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            page: query.page.max(1),
            page_size: limit as u32,
            total: total as u64,
        })
    }

    // =========================================================================
    // Field Values
    // =========================================================================

    /// Insert or replace the value of one field of a document.
    pub fn upsert_field_value(&self, document_id: &str, field_id: i64, value: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO document_field_values (document_id, field_id, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(document_id, field_id) DO UPDATE SET
                value = excluded.value
            "#,
            params![document_id, field_id, value],
        )?;
        Ok(())
    }

    /// List a document's stored values.
    pub fn list_field_values(&self, document_id: &str) -> DbResult<Vec<StoredFieldValue>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT field_id, value
            FROM document_field_values
            WHERE document_id = ?
            ORDER BY field_id
            "#,
        )?;

        let rows = stmt.query_map([document_id], |row| {
            Ok(StoredFieldValue {
                field_id: row.get(0)?,
                value: row.get(1)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Remove every stored value of a document.
    pub fn delete_field_values(&self, document_id: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "DELETE FROM document_field_values WHERE document_id = ?",
            [document_id],
        )?;
        Ok(rows_affected)
    }
}

fn file_columns(file: Option<&FileRef>) -> (Option<&str>, Option<&str>, Option<i64>) {
    match file {
        Some(f) => (
            Some(f.key.as_str()),
            Some(f.sha256.as_str()),
            Some(f.size_bytes as i64),
        ),
        None => (None, None, None),
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let file_key: Option<String> = row.get(7)?;
    let file_sha256: Option<String> = row.get(8)?;
    let file_size: Option<i64> = row.get(9)?;

    let file = file_key.map(|key| FileRef {
        key,
        sha256: file_sha256.unwrap_or_default(),
        size_bytes: file_size.unwrap_or(0).max(0) as u64,
    });

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        document_type_id: row.get(2)?,
        owner_id: row.get(3)?,
        patient_id: row.get(4)?,
        creation_date: row.get(5)?,
        is_uploaded_pdf: row.get(6)?,
        file,
        updated_at: row.get(10)?,
    })
}
