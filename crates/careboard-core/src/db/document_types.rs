//! Document type and field database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{DocumentField, DocumentType, FieldKind};

impl Database {
    // =========================================================================
    // Document Types
    // =========================================================================

    /// Insert a document type.
    pub fn insert_document_type(&self, name: &str) -> DbResult<DocumentType> {
        self.conn
            .execute("INSERT INTO document_types (name) VALUES (?)", [name])?;
        Ok(DocumentType {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Get a document type by ID.
    pub fn get_document_type(&self, id: i64) -> DbResult<Option<DocumentType>> {
        self.conn
            .query_row(
                "SELECT id, name FROM document_types WHERE id = ?",
                [id],
                |row| {
                    Ok(DocumentType {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// List document types by name.
    pub fn list_document_types(&self) -> DbResult<Vec<DocumentType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM document_types ORDER BY name, id")?;
        let rows = stmt.query_map([], |row| {
            Ok(DocumentType {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Rename a document type.
    pub fn rename_document_type(&self, id: i64, name: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE document_types SET name = ? WHERE id = ?",
            params![name, id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a document type, cascading its fields, documents and values.
    pub fn delete_document_type(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM document_types WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Fields
    // =========================================================================

    /// Append a field to a document type.
    pub fn insert_document_field(
        &self,
        document_type_id: i64,
        name: &str,
        field_type: FieldKind,
    ) -> DbResult<DocumentField> {
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM document_fields WHERE document_type_id = ?",
            [document_type_id],
            |row| row.get(0),
        )?;

        self.conn.execute(
            r#"
            INSERT INTO document_fields (document_type_id, name, field_type, position)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![document_type_id, name, field_type.as_str(), position],
        )?;

        Ok(DocumentField {
            id: self.conn.last_insert_rowid(),
            document_type_id,
            name: name.to_string(),
            field_type,
            position,
        })
    }

    /// Get a field by ID.
    pub fn get_document_field(&self, id: i64) -> DbResult<Option<DocumentField>> {
        self.conn
            .query_row(
                r#"
                SELECT id, document_type_id, name, field_type, position
                FROM document_fields
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(FieldRow {
                        id: row.get(0)?,
                        document_type_id: row.get(1)?,
                        name: row.get(2)?,
                        field_type: row.get(3)?,
                        position: row.get(4)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List a type's fields in creation order.
    pub fn list_document_fields(&self, document_type_id: i64) -> DbResult<Vec<DocumentField>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, document_type_id, name, field_type, position
            FROM document_fields
            WHERE document_type_id = ?
            ORDER BY position, id
            "#,
        )?;

        let rows = stmt.query_map([document_type_id], |row| {
            Ok(FieldRow {
                id: row.get(0)?,
                document_type_id: row.get(1)?,
                name: row.get(2)?,
                field_type: row.get(3)?,
                position: row.get(4)?,
            })
        })?;

        rows.map(|r| r.map_err(DbError::from).and_then(|row| row.try_into()))
            .collect()
    }

    /// Remove a field from its type, cascading stored values.
    pub fn delete_document_field(&self, document_type_id: i64, field_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "DELETE FROM document_fields WHERE id = ? AND document_type_id = ?",
            params![field_id, document_type_id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct FieldRow {
    id: i64,
    document_type_id: i64,
    name: String,
    field_type: String,
    position: i64,
}

impl TryFrom<FieldRow> for DocumentField {
    type Error = DbError;

    fn try_from(row: FieldRow) -> Result<Self, Self::Error> {
        let field_type = row
            .field_type
            .parse::<FieldKind>()
            .map_err(|e| DbError::Constraint(e.to_string()))?;

        Ok(DocumentField {
            id: row.id,
            document_type_id: row.document_type_id,
            name: row.name,
            field_type,
            position: row.position,
        })
    }
}
