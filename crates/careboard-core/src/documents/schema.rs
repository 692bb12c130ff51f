//! Document type schemas.

use super::{DocumentError, DocumentResult};
use crate::db::Database;
use crate::models::{derive_key, DocumentField, DocumentSchema, DocumentType, FieldKind};

/// Manages document types and their fields.
pub struct SchemaEngine<'a> {
    db: &'a Database,
}

impl<'a> SchemaEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn require_type(&self, id: i64) -> DocumentResult<DocumentType> {
        self.db
            .get_document_type(id)?
            .ok_or_else(|| DocumentError::NotFound {
                entity: "DocumentType",
                id: id.to_string(),
            })
    }

    /// Create an empty document type.
    pub fn create_document_type(&self, name: &str) -> DocumentResult<DocumentType> {
        let doc_type = self.db.insert_document_type(name.trim())?;
        tracing::info!(document_type_id = doc_type.id, name = %doc_type.name, "Created document type");
        Ok(doc_type)
    }

    /// Create a document type together with its fields, all or nothing.
    ///
    /// Each field is a `(name, field_type tag)` pair, added in order.
    pub fn create_document_type_with_fields(
        &self,
        name: &str,
        fields: &[(&str, &str)],
    ) -> DocumentResult<DocumentSchema> {
        let tx = self.db.begin_immediate()?;

        let doc_type = self.db.insert_document_type(name.trim())?;
        let mut created = Vec::with_capacity(fields.len());
        for (field_name, field_type) in fields {
            created.push(self.insert_field(&doc_type, field_name, field_type)?);
        }
        tx.commit()?;

        tracing::info!(
            document_type_id = doc_type.id,
            name = %doc_type.name,
            fields = created.len(),
            "Created document type"
        );
        Ok(DocumentSchema {
            document_type: doc_type,
            fields: created,
        })
    }

    pub fn get_document_type(&self, id: i64) -> DocumentResult<DocumentType> {
        self.require_type(id)
    }

    pub fn list_document_types(&self) -> DocumentResult<Vec<DocumentType>> {
        Ok(self.db.list_document_types()?)
    }

    pub fn rename_document_type(&self, id: i64, name: &str) -> DocumentResult<DocumentType> {
        if !self.db.rename_document_type(id, name.trim())? {
            return Err(DocumentError::NotFound {
                entity: "DocumentType",
                id: id.to_string(),
            });
        }
        self.require_type(id)
    }

    /// Delete a type with its fields, documents and values.
    pub fn delete_document_type(&self, id: i64) -> DocumentResult<()> {
        if !self.db.delete_document_type(id)? {
            return Err(DocumentError::NotFound {
                entity: "DocumentType",
                id: id.to_string(),
            });
        }
        tracing::info!(document_type_id = id, "Deleted document type");
        Ok(())
    }

    /// Append a field to a document type.
    pub fn add_field(
        &self,
        document_type_id: i64,
        name: &str,
        field_type: &str,
    ) -> DocumentResult<DocumentField> {
        let tx = self.db.begin_immediate()?;
        let doc_type = self.require_type(document_type_id)?;
        let field = self.insert_field(&doc_type, name, field_type)?;
        tx.commit()?;

        tracing::info!(
            document_type_id,
            field_id = field.id,
            key = %field.key(),
            field_type = %field.field_type,
            "Added field"
        );
        Ok(field)
    }

    fn insert_field(
        &self,
        doc_type: &DocumentType,
        name: &str,
        field_type: &str,
    ) -> DocumentResult<DocumentField> {
        let kind = field_type
            .parse::<FieldKind>()
            .map_err(|e| DocumentError::InvalidFieldType(e.0))?;

        let name = name.trim();
        let key = derive_key(name);
        if key.is_empty() {
            return Err(DocumentError::InvalidFieldName(name.to_string()));
        }

        let existing = self.db.list_document_fields(doc_type.id)?;
        if existing.iter().any(|f| f.key() == key) {
            return Err(DocumentError::DuplicateFieldKey {
                name: name.to_string(),
                key,
            });
        }

        Ok(self.db.insert_document_field(doc_type.id, name, kind)?)
    }

    /// Remove a field, cascading its stored values.
    pub fn remove_field(&self, document_type_id: i64, field_id: i64) -> DocumentResult<()> {
        if !self.db.delete_document_field(document_type_id, field_id)? {
            return Err(DocumentError::NotFound {
                entity: "DocumentField",
                id: field_id.to_string(),
            });
        }
        tracing::info!(document_type_id, field_id, "Removed field");
        Ok(())
    }

    /// Fields of a type in creation order.
    pub fn list_fields(&self, document_type_id: i64) -> DocumentResult<Vec<DocumentField>> {
        self.require_type(document_type_id)?;
        Ok(self.db.list_document_fields(document_type_id)?)
    }

    /// A type together with its ordered fields.
    pub fn schema(&self, document_type_id: i64) -> DocumentResult<DocumentSchema> {
        let document_type = self.require_type(document_type_id)?;
        let fields = self.db.list_document_fields(document_type_id)?;
        Ok(DocumentSchema {
            document_type,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_add_and_list_fields() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);
        let doc_type = engine.create_document_type("Consult").unwrap();

        engine.add_field(doc_type.id, "Diagnosis", "text").unwrap();
        engine.add_field(doc_type.id, "Follow-up Date", "date").unwrap();

        let fields = engine.list_fields(doc_type.id).unwrap();
        let keys: Vec<_> = fields.iter().map(|f| f.key()).collect();
        assert_eq!(keys, vec!["diagnosis", "follow_up_date"]);
        assert_eq!(fields[1].field_type, FieldKind::Date);
    }

    #[test]
    fn test_invalid_field_type() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);
        let doc_type = engine.create_document_type("Consult").unwrap();

        let result = engine.add_field(doc_type.id, "Flag", "checkbox");
        assert!(matches!(result, Err(DocumentError::InvalidFieldType(t)) if t == "checkbox"));
        assert!(engine.list_fields(doc_type.id).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_and_duplicate_names() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);
        let doc_type = engine.create_document_type("Consult").unwrap();

        assert!(matches!(
            engine.add_field(doc_type.id, " -- ", "text"),
            Err(DocumentError::InvalidFieldName(_))
        ));

        engine.add_field(doc_type.id, "Heart Rate", "number").unwrap();
        assert!(matches!(
            engine.add_field(doc_type.id, "HeartRate", "text"),
            Err(DocumentError::DuplicateFieldKey { key, .. }) if key == "heart_rate"
        ));
    }

    #[test]
    fn test_unknown_type() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);

        assert!(matches!(
            engine.add_field(99, "Notes", "text"),
            Err(DocumentError::NotFound { entity: "DocumentType", .. })
        ));
        assert!(engine.schema(99).is_err());
    }

    #[test]
    fn test_create_with_fields_is_atomic() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);

        let result = engine.create_document_type_with_fields(
            "Broken",
            &[("Notes", "text"), ("Dose", "bogus")],
        );
        assert!(result.is_err());
        assert!(engine.list_document_types().unwrap().is_empty());

        let schema = engine
            .create_document_type_with_fields("Consult", &[("Notes", "rich_text"), ("Dose", "number")])
            .unwrap();
        assert_eq!(schema.fields.len(), 2);
        assert_eq!(engine.schema(schema.document_type.id).unwrap(), schema);
    }

    #[test]
    fn test_remove_field() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);
        let doc_type = engine.create_document_type("Consult").unwrap();
        let field = engine.add_field(doc_type.id, "Notes", "text").unwrap();

        engine.remove_field(doc_type.id, field.id).unwrap();
        assert!(engine.list_fields(doc_type.id).unwrap().is_empty());
        assert!(matches!(
            engine.remove_field(doc_type.id, field.id),
            Err(DocumentError::NotFound { .. })
        ));
    }

    #[test]
    fn test_rename_and_delete_type() {
        let db = setup_db();
        let engine = SchemaEngine::new(&db);
        let doc_type = engine.create_document_type("Consult").unwrap();

        let renamed = engine.rename_document_type(doc_type.id, " Referral ").unwrap();
        assert_eq!(renamed.name, "Referral");

        engine.delete_document_type(doc_type.id).unwrap();
        assert!(engine.get_document_type(doc_type.id).is_err());
    }
}
