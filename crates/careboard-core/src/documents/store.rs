//! Document instances and their field values.

use std::collections::BTreeMap;

use super::{coerce_input, parse_stored, DocumentError, DocumentResult, FieldInputs};
use crate::db::Database;
use crate::files::FileStore;
use crate::models::{
    normalize_title, Document, DocumentField, DocumentQuery, FieldValue, FileRef, Page, User,
};

/// New content for a document update.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    /// Field values keyed by field key; the document becomes field-based
    Fields(FieldInputs),
    /// PDF bytes; the document becomes an uploaded PDF
    Upload(Vec<u8>),
}

/// Creates, updates and renders documents.
pub struct DocumentStore<'a> {
    db: &'a Database,
    files: &'a dyn FileStore,
}

impl<'a> DocumentStore<'a> {
    pub fn new(db: &'a Database, files: &'a dyn FileStore) -> Self {
        Self { db, files }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get_document(&self, id: &str) -> DocumentResult<Document> {
        self.db
            .get_document(id)?
            .ok_or_else(|| DocumentError::NotFound {
                entity: "Document",
                id: id.to_string(),
            })
    }

    fn schema_fields(&self, document_type_id: i64) -> DocumentResult<Vec<DocumentField>> {
        if self.db.get_document_type(document_type_id)?.is_none() {
            return Err(DocumentError::NotFound {
                entity: "DocumentType",
                id: document_type_id.to_string(),
            });
        }
        Ok(self.db.list_document_fields(document_type_id)?)
    }

    fn require_patient(&self, patient_id: Option<&str>) -> DocumentResult<()> {
        if let Some(id) = patient_id {
            if self.db.get_patient(id)?.is_none() {
                return Err(DocumentError::NotFound {
                    entity: "Patient",
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn list_documents_for_patient(&self, patient_id: &str) -> DocumentResult<Vec<Document>> {
        Ok(self.db.list_documents_for_patient(patient_id)?)
    }

    pub fn list_documents_for_owner(&self, owner_id: &str) -> DocumentResult<Vec<Document>> {
        Ok(self.db.list_documents_for_owner(owner_id)?)
    }

    /// Documents about patients the user currently treats.
    pub fn list_documents_for_user(
        &self,
        user: &User,
        query: &DocumentQuery,
    ) -> DocumentResult<Page<Document>> {
        Ok(self.db.list_documents_for_user(&user.id, query)?)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a field-based document with one value per schema field.
    pub fn create_document(
        &self,
        document_type_id: i64,
        owner: &User,
        title: &str,
        patient_id: Option<&str>,
        values: &FieldInputs,
    ) -> DocumentResult<Document> {
        let tx = self.db.begin_immediate()?;

        let fields = self.schema_fields(document_type_id)?;
        self.require_patient(patient_id)?;

        let document = Document::new(
            document_type_id,
            owner.id.clone(),
            title,
            patient_id.map(str::to_string),
        );
        self.db.insert_document(&document)?;
        self.write_values(&document.id, &fields, values)?;
        tx.commit()?;

        tracing::info!(
            document_id = %document.id,
            document_type_id,
            owner_id = %owner.id,
            fields = fields.len(),
            "Created document"
        );
        Ok(document)
    }

    /// Create an uploaded-PDF document. It carries no field values.
    pub fn create_uploaded_document(
        &self,
        document_type_id: i64,
        owner: &User,
        title: &str,
        patient_id: Option<&str>,
        pdf: &[u8],
    ) -> DocumentResult<Document> {
        let tx = self.db.begin_immediate()?;

        self.schema_fields(document_type_id)?;
        self.require_patient(patient_id)?;

        let mut document = Document::new(
            document_type_id,
            owner.id.clone(),
            title,
            patient_id.map(str::to_string),
        );
        let file = self.files.put(&document.id, pdf)?;
        document.is_uploaded_pdf = true;
        document.file = Some(file);

        let persisted = self
            .db
            .insert_document(&document)
            .and_then(|()| tx.commit().map_err(Into::into));
        if let Err(e) = persisted {
            self.discard_blob(document.file.as_ref());
            return Err(e.into());
        }

        tracing::info!(
            document_id = %document.id,
            document_type_id,
            owner_id = %owner.id,
            size = pdf.len(),
            "Created uploaded document"
        );
        Ok(document)
    }

    /// Update title, patient and content.
    ///
    /// `Upload` switches the document to uploaded mode, dropping any field
    /// values. The new file is stored under a fresh key and the previous one
    /// is removed only once the row is committed. `Fields` switches it to field mode and
    /// upserts one value per current schema field, which also backfills
    /// fields added since the last save. A generated file is cleared.
    pub fn update_document(
        &self,
        document_id: &str,
        title: &str,
        patient_id: Option<&str>,
        content: &DocumentContent,
    ) -> DocumentResult<Document> {
        let tx = self.db.begin_immediate()?;

        let mut document = self.get_document(document_id)?;
        self.require_patient(patient_id)?;
        let previous_file = document.file.clone();

        document.title = normalize_title(title);
        document.patient_id = patient_id.map(str::to_string);
        document.touch();

        match content {
            DocumentContent::Upload(pdf) => {
                document.is_uploaded_pdf = true;
                document.file = Some(self.files.put(&document.id, pdf)?);
                let persisted = self
                    .db
                    .delete_field_values(&document.id)
                    .and_then(|_| self.db.update_document(&document))
                    .and_then(|_| tx.commit().map_err(Into::into));
                if let Err(e) = persisted {
                    self.discard_superseded(document.file.as_ref(), previous_file.as_ref());
                    return Err(e.into());
                }
                self.discard_superseded(previous_file.as_ref(), document.file.as_ref());
            }
            DocumentContent::Fields(values) => {
                let fields = self.schema_fields(document.document_type_id)?;
                document.is_uploaded_pdf = false;
                document.file = None;
                // Clear the upload flag before writing values
                self.db.update_document(&document)?;
                self.write_values(&document.id, &fields, values)?;
                tx.commit()?;
                self.discard_blob(previous_file.as_ref());
            }
        }

        tracing::info!(
            document_id = %document.id,
            uploaded = document.is_uploaded_pdf,
            "Updated document"
        );
        Ok(document)
    }

    /// Attach a rendering of a field-based document produced elsewhere.
    pub fn record_generated_file(&self, document_id: &str, pdf: &[u8]) -> DocumentResult<Document> {
        let tx = self.db.begin_immediate()?;

        let mut document = self.get_document(document_id)?;
        if document.is_uploaded_pdf {
            return Err(DocumentError::UploadedDocument(document.id));
        }

        let previous_file = document.file.clone();
        document.file = Some(self.files.put(&document.id, pdf)?);
        document.touch();
        let persisted = self
            .db
            .update_document(&document)
            .and_then(|_| tx.commit().map_err(Into::into));
        if let Err(e) = persisted {
            self.discard_superseded(document.file.as_ref(), previous_file.as_ref());
            return Err(e.into());
        }
        self.discard_superseded(previous_file.as_ref(), document.file.as_ref());

        tracing::info!(document_id = %document.id, size = pdf.len(), "Recorded generated file");
        Ok(document)
    }

    /// Read back a document's uploaded or generated file.
    pub fn read_file(&self, document_id: &str) -> DocumentResult<Vec<u8>> {
        let document = self.get_document(document_id)?;
        let file = document.file.ok_or_else(|| DocumentError::NotFound {
            entity: "DocumentFile",
            id: document_id.to_string(),
        })?;
        Ok(self.files.get(&file)?)
    }

    /// Delete a document, its values and its file.
    pub fn delete_document(&self, document_id: &str) -> DocumentResult<()> {
        let document = self.get_document(document_id)?;
        if !self.db.delete_document(&document.id)? {
            return Err(DocumentError::NotFound {
                entity: "Document",
                id: document_id.to_string(),
            });
        }
        self.discard_blob(document.file.as_ref());

        tracing::info!(document_id = %document.id, "Deleted document");
        Ok(())
    }

    /// Typed values of a field-based document keyed by field key.
    ///
    /// Every current schema field has an entry; fields without a stored or
    /// non-blank value map to `None`.
    pub fn render_field_values(
        &self,
        document_id: &str,
    ) -> DocumentResult<BTreeMap<String, Option<FieldValue>>> {
        let document = self.get_document(document_id)?;
        if document.is_uploaded_pdf {
            return Err(DocumentError::UploadedDocument(document.id));
        }

        let fields = self.db.list_document_fields(document.document_type_id)?;
        let stored: BTreeMap<i64, String> = self
            .db
            .list_field_values(&document.id)?
            .into_iter()
            .map(|v| (v.field_id, v.value))
            .collect();

        let mut rendered = BTreeMap::new();
        for field in &fields {
            let value = match stored.get(&field.id) {
                Some(text) => parse_stored(self.db, field, text)?,
                None => None,
            };
            rendered.insert(field.key(), value);
        }
        Ok(rendered)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn write_values(
        &self,
        document_id: &str,
        fields: &[DocumentField],
        values: &FieldInputs,
    ) -> DocumentResult<()> {
        for field in fields {
            let stored = match values.get(&field.key()) {
                Some(input) => coerce_input(self.db, field, input)?,
                None => String::new(),
            };
            self.db.upsert_field_value(document_id, field.id, &stored)?;
        }

        let unknown: Vec<&str> = values
            .keys()
            .filter(|key| !fields.iter().any(|f| &f.key() == *key))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            tracing::debug!(document_id, ?unknown, "Ignoring values for unknown fields");
        }
        Ok(())
    }

    /// Remove `file` unless it is the same blob as `kept`.
    fn discard_superseded(&self, file: Option<&FileRef>, kept: Option<&FileRef>) {
        match (file, kept) {
            (Some(f), Some(k)) if f.key == k.key => {}
            _ => self.discard_blob(file),
        }
    }

    fn discard_blob(&self, file: Option<&FileRef>) {
        if let Some(file) = file {
            if let Err(e) = self.files.remove(file) {
                tracing::warn!(key = %file.key, error = %e, "Failed to remove blob");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{FieldInput, SchemaEngine};
    use crate::files::LocalFileStore;
    use crate::models::{DrugRef, Patient, Role};
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    struct Fixture {
        db: Database,
        files: LocalFileStore,
        _dir: tempfile::TempDir,
        owner: User,
        patient: Patient,
        type_id: i64,
    }

    fn fixture() -> Fixture {
        let db = setup_db();
        let dir = tempfile::tempdir().unwrap();
        let files = LocalFileStore::new(dir.path());

        let owner = User::new("n@example.com".into(), "Nora".into(), "Nurse".into(), Some(Role::Nurse));
        db.insert_user(&owner).unwrap();
        let patient = Patient::new("John Doe".into(), "123 Main St".into());
        db.insert_patient(&patient).unwrap();
        db.insert_drug("Amoxicillin").unwrap();

        let schema = SchemaEngine::new(&db)
            .create_document_type_with_fields(
                "Consult",
                &[("Diagnosis", "text"), ("Dose", "number"), ("Medication", "drug")],
            )
            .unwrap();

        Fixture {
            db,
            files,
            _dir: dir,
            owner,
            patient,
            type_id: schema.document_type.id,
        }
    }

    fn inputs(pairs: &[(&str, FieldInput)]) -> FieldInputs {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_create_and_render() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let doc = store
            .create_document(
                f.type_id,
                &f.owner,
                "",
                Some(f.patient.id.as_str()),
                &inputs(&[
                    ("diagnosis", "Flu".into()),
                    ("medication", "Amoxicillin".into()),
                ]),
            )
            .unwrap();
        assert_eq!(doc.title, "Untitled Document");

        // One stored value per schema field, absent ones blank
        assert_eq!(f.db.list_field_values(&doc.id).unwrap().len(), 3);

        let rendered = store.render_field_values(&doc.id).unwrap();
        assert_eq!(rendered["diagnosis"], Some(FieldValue::Text("Flu".into())));
        assert_eq!(rendered["dose"], None);
        assert!(matches!(
            &rendered["medication"],
            Some(FieldValue::Drug(DrugRef::Found(d))) if d.name == "Amoxicillin"
        ));
    }

    #[test]
    fn test_unknown_drug_rolls_back() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let result = store.create_document(
            f.type_id,
            &f.owner,
            "Consult",
            None,
            &inputs(&[("medication", "Amoxicilin".into())]),
        );
        assert!(matches!(result, Err(DocumentError::UnknownDrug { .. })));
        assert!(f.db.list_documents_for_owner(&f.owner.id).unwrap().is_empty());
    }

    #[test]
    fn test_missing_type_and_patient() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        assert!(matches!(
            store.create_document(999, &f.owner, "X", None, &FieldInputs::new()),
            Err(DocumentError::NotFound { entity: "DocumentType", .. })
        ));
        assert!(matches!(
            store.create_document(f.type_id, &f.owner, "X", Some("missing"), &FieldInputs::new()),
            Err(DocumentError::NotFound { entity: "Patient", .. })
        ));
    }

    #[test]
    fn test_uploaded_document() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let doc = store
            .create_uploaded_document(f.type_id, &f.owner, "Scan", None, b"%PDF-1.7")
            .unwrap();
        assert!(doc.is_uploaded_pdf);
        assert!(f.db.list_field_values(&doc.id).unwrap().is_empty());
        assert_eq!(store.read_file(&doc.id).unwrap(), b"%PDF-1.7");
        assert!(matches!(
            store.render_field_values(&doc.id),
            Err(DocumentError::UploadedDocument(_))
        ));
    }

    fn stored_blobs(f: &Fixture, document_id: &str) -> usize {
        std::fs::read_dir(f._dir.path().join("documents").join(document_id))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_replacing_upload_removes_old_blob() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let doc = store
            .create_uploaded_document(f.type_id, &f.owner, "Scan", None, b"first scan")
            .unwrap();
        let replaced = store
            .update_document(&doc.id, "Scan", None, &DocumentContent::Upload(b"second scan".to_vec()))
            .unwrap();

        assert_ne!(replaced.file, doc.file);
        assert_eq!(store.read_file(&doc.id).unwrap(), b"second scan");
        assert_eq!(stored_blobs(&f, &doc.id), 1);
    }

    #[test]
    fn test_failed_upload_update_keeps_previous_file() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let doc = store
            .create_uploaded_document(f.type_id, &f.owner, "Scan", None, b"original scan")
            .unwrap();

        f.db.conn()
            .execute_batch(
                "CREATE TRIGGER reject_document_update BEFORE UPDATE ON documents
                 BEGIN SELECT RAISE(ABORT, 'document row locked'); END;",
            )
            .unwrap();

        let result = store.update_document(
            &doc.id,
            "Scan",
            None,
            &DocumentContent::Upload(b"replacement scan".to_vec()),
        );
        assert!(matches!(result, Err(DocumentError::Database(_))));

        let stored = f.db.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(stored.file, doc.file);
        assert_eq!(store.read_file(&doc.id).unwrap(), b"original scan");
        assert_eq!(stored_blobs(&f, &doc.id), 1);

        let generated = store.record_generated_file(&doc.id, b"rendered");
        assert!(matches!(generated, Err(DocumentError::UploadedDocument(_))));
    }

    #[test]
    fn test_update_switches_modes() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);

        let doc = store
            .create_document(
                f.type_id,
                &f.owner,
                "Consult",
                None,
                &inputs(&[("diagnosis", "Flu".into())]),
            )
            .unwrap();

        let uploaded = store
            .update_document(&doc.id, "Scan", None, &DocumentContent::Upload(b"pdf".to_vec()))
            .unwrap();
        assert!(uploaded.is_uploaded_pdf);
        assert_eq!(uploaded.creation_date, doc.creation_date);
        assert!(f.db.list_field_values(&doc.id).unwrap().is_empty());

        let back = store
            .update_document(
                &doc.id,
                "Consult",
                Some(f.patient.id.as_str()),
                &DocumentContent::Fields(inputs(&[("dose", FieldValue::Number(2.5).into())])),
            )
            .unwrap();
        assert!(!back.is_uploaded_pdf);
        assert!(back.file.is_none());
        assert_eq!(back.patient_id, Some(f.patient.id.clone()));

        let rendered = store.render_field_values(&doc.id).unwrap();
        assert_eq!(rendered["dose"], Some(FieldValue::Number(2.5)));
        assert_eq!(rendered["diagnosis"], None);
    }

    #[test]
    fn test_new_field_backfilled_on_update() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);
        let doc = store
            .create_document(f.type_id, &f.owner, "Consult", None, &FieldInputs::new())
            .unwrap();

        SchemaEngine::new(&f.db)
            .add_field(f.type_id, "Follow-up Date", "date")
            .unwrap();
        assert_eq!(f.db.list_field_values(&doc.id).unwrap().len(), 3);

        let rendered = store.render_field_values(&doc.id).unwrap();
        assert_eq!(rendered["follow_up_date"], None);

        store
            .update_document(
                &doc.id,
                "Consult",
                None,
                &DocumentContent::Fields(inputs(&[("follow_up_date", "2024-06-01".into())])),
            )
            .unwrap();
        assert_eq!(f.db.list_field_values(&doc.id).unwrap().len(), 4);
        let rendered = store.render_field_values(&doc.id).unwrap();
        assert_eq!(
            rendered["follow_up_date"],
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()))
        );
    }

    #[test]
    fn test_generated_file_cleared_on_field_update() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);
        let doc = store
            .create_document(f.type_id, &f.owner, "Consult", None, &FieldInputs::new())
            .unwrap();

        let generated = store.record_generated_file(&doc.id, b"rendered").unwrap();
        assert!(generated.file.is_some());
        assert!(!generated.is_uploaded_pdf);

        let updated = store
            .update_document(&doc.id, "Consult", None, &DocumentContent::Fields(FieldInputs::new()))
            .unwrap();
        assert!(updated.file.is_none());
        assert!(matches!(
            store.read_file(&doc.id),
            Err(DocumentError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_document() {
        let f = fixture();
        let store = DocumentStore::new(&f.db, &f.files);
        let doc = store
            .create_uploaded_document(f.type_id, &f.owner, "Scan", None, b"pdf")
            .unwrap();
        let file = doc.file.clone().unwrap();

        store.delete_document(&doc.id).unwrap();
        assert!(matches!(
            store.get_document(&doc.id),
            Err(DocumentError::NotFound { .. })
        ));
        assert!(!f.files.remove(&file).unwrap());
    }
}
