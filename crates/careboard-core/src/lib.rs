//! Careboard Core Library
//!
//! Clinical-records core: patients, nurse/doctor staffing, care regions and
//! dynamically configured clinical documents.
//!
//! # Architecture
//!
//! ```text
//!            caller (web / mobile layer, supplies the current user)
//!                                   │
//!                            CareboardCore (FFI)
//!                                   │
//!          ┌────────────────────────┼─────────────────────────┐
//!          │                        │                         │
//!          ▼                        ▼                         ▼
//!     CareEngine              SchemaEngine              DocumentStore
//!  (staffing state,        (document types and      (documents, typed field
//!   care boards)             typed fields)            values, PDF files)
//!          │                        │                         │
//!          └────────────────────────┼───────────────┬─────────┘
//!                                   ▼               ▼
//!                             SQLite (db)       FileStore
//! ```
//!
//! # Core Principle
//!
//! **Care state is derived, never stored.** It is recomputed from
//! `nurse_count` and `doctor_assigned` after every staffing change, and every
//! staffing change is a single immediate transaction.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer
//! - [`models`]: Domain types (Patient, CareState, Document, FieldValue, etc.)
//! - [`care`]: Care-assignment engine and care boards
//! - [`documents`]: Document schema engine and instance store
//! - [`files`]: Blob storage for document files
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: Tracing subscriber setup

pub mod care;
pub mod config;
pub mod db;
pub mod documents;
pub mod files;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use care::{BoardEntry, CareBoard, CareEngine, CareError};
pub use config::{load_config, CoreConfig};
pub use db::Database;
pub use documents::{
    DocumentContent, DocumentError, DocumentStore, FieldInput, FieldInputs, SchemaEngine,
};
pub use files::{FileStore, LocalFileStore};
pub use models::{
    CareState, Document, DocumentField, DocumentType, FieldKind, FieldValue, Patient, Role, User,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use config::PaginationConfig;
use models::{
    parse_page_size, DocumentQuery, DocumentSort, DrugRef, Geocode, Page,
    PatientQuery, PatientSort,
};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CareboardError {
    #[error("Role mismatch: {0}")]
    RoleMismatch(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Duplicate assignment: {0}")]
    DuplicateAssignment(String),

    #[error("Already assigned: {0}")]
    AlreadyAssigned(String),

    #[error("Precedence violation: {0}")]
    PrecedenceViolation(String),

    #[error("Not assigned: {0}")]
    NotAssigned(String),

    #[error("Active assignments: {0}")]
    ActiveAssignments(String),

    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),

    #[error("Unknown drug: {0}")]
    UnknownDrug(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<db::DbError> for CareboardError {
    fn from(e: db::DbError) -> Self {
        CareboardError::DatabaseError(e.to_string())
    }
}

impl From<CareError> for CareboardError {
    fn from(e: CareError) -> Self {
        let message = e.to_string();
        match e {
            CareError::RoleMismatch { .. } => CareboardError::RoleMismatch(message),
            CareError::CapacityExceeded { .. } => CareboardError::CapacityExceeded(message),
            CareError::DuplicateAssignment { .. } => CareboardError::DuplicateAssignment(message),
            CareError::AlreadyAssigned(_) => CareboardError::AlreadyAssigned(message),
            CareError::PrecedenceViolation(_) => CareboardError::PrecedenceViolation(message),
            CareError::NotAssigned { .. } => CareboardError::NotAssigned(message),
            CareError::ActiveAssignments { .. } => CareboardError::ActiveAssignments(message),
            CareError::NotFound { .. } => CareboardError::NotFound(message),
            CareError::InvariantViolation(_) => CareboardError::InvariantViolation(message),
            CareError::Database(db) => db.into(),
        }
    }
}

impl From<DocumentError> for CareboardError {
    fn from(e: DocumentError) -> Self {
        let message = e.to_string();
        match e {
            DocumentError::InvalidFieldType(_) => CareboardError::InvalidFieldType(message),
            DocumentError::UnknownDrug { .. } => CareboardError::UnknownDrug(message),
            DocumentError::NotFound { .. } => CareboardError::NotFound(message),
            DocumentError::InvalidFieldName(_)
            | DocumentError::DuplicateFieldKey { .. }
            | DocumentError::InvalidValue { .. }
            | DocumentError::UploadedDocument(_) => CareboardError::InvalidInput(message),
            DocumentError::Database(db) => db.into(),
            DocumentError::Storage(storage) => storage.into(),
        }
    }
}

impl From<files::FileStoreError> for CareboardError {
    fn from(e: files::FileStoreError) -> Self {
        match e {
            files::FileStoreError::NotFound(key) => CareboardError::NotFound(key),
            other => CareboardError::StorageError(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for CareboardError {
    fn from(e: config::ConfigError) -> Self {
        CareboardError::ConfigError(e.to_string())
    }
}

impl From<logging::LoggingError> for CareboardError {
    fn from(e: logging::LoggingError) -> Self {
        CareboardError::ConfigError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CareboardError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CareboardError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open the database and file store described by a TOML config file.
#[uniffi::export]
pub fn open_with_config(config_path: String) -> Result<Arc<CareboardCore>, CareboardError> {
    let config = load_config(&config_path)?;
    let db = Database::open_with(&config.database)?;
    Ok(Arc::new(CareboardCore::new(
        db,
        LocalFileStore::new(config.storage.root),
        config.pagination,
    )))
}

/// Open or create a database at the given path with default settings.
#[uniffi::export]
pub fn open_database(path: String, storage_root: String) -> Result<Arc<CareboardCore>, CareboardError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(CareboardCore::new(
        db,
        LocalFileStore::new(storage_root),
        PaginationConfig::default(),
    )))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory(storage_root: String) -> Result<Arc<CareboardCore>, CareboardError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(CareboardCore::new(
        db,
        LocalFileStore::new(storage_root),
        PaginationConfig::default(),
    )))
}

/// Install the global log subscriber. Returns false if one was already set.
#[uniffi::export]
pub fn init_logging(filter: String, json: bool) -> Result<bool, CareboardError> {
    Ok(logging::init_logging(&config::LoggingConfig { filter, json })?)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe core handle for FFI.
#[derive(uniffi::Object)]
pub struct CareboardCore {
    db: Arc<Mutex<Database>>,
    files: LocalFileStore,
    pagination: PaginationConfig,
}

impl CareboardCore {
    fn new(db: Database, files: LocalFileStore, pagination: PaginationConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            files,
            pagination,
        }
    }

    fn page_size(&self, raw: Option<&str>) -> u32 {
        parse_page_size(
            raw,
            self.pagination.default_page_size,
            self.pagination.max_page_size,
        )
    }

    fn patient_query(&self, query: FfiPatientQuery) -> Result<PatientQuery, CareboardError> {
        let state = query
            .state
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<CareState>())
            .transpose()
            .map_err(CareboardError::InvalidInput)?;

        Ok(PatientQuery {
            search: query.search,
            state,
            sort: query
                .sort
                .as_deref()
                .map(PatientSort::parse)
                .unwrap_or_default(),
            page: query.page.max(1),
            page_size: self.page_size(query.page_size.as_deref()),
        })
    }

    fn document_query(&self, query: FfiDocumentQuery) -> DocumentQuery {
        DocumentQuery {
            search: query.search,
            document_type_id: query.document_type_id,
            sort: query
                .sort
                .as_deref()
                .map(DocumentSort::parse)
                .unwrap_or_default(),
            page: query.page.max(1),
            page_size: self.page_size(query.page_size.as_deref()),
        }
    }
}

fn require_user(db: &Database, user_id: &str) -> Result<User, CareboardError> {
    db.get_user(user_id)?
        .ok_or_else(|| CareboardError::NotFound(format!("User {}", user_id)))
}

fn parse_role(role: Option<String>) -> Result<Option<Role>, CareboardError> {
    role.filter(|r| !r.is_empty())
        .map(|r| r.parse::<Role>())
        .transpose()
        .map_err(|e| CareboardError::InvalidInput(e.to_string()))
}

#[uniffi::export]
impl CareboardCore {
    // =========================================================================
    // Directory Operations
    // =========================================================================

    /// Look up a role by name.
    pub fn get_role(&self, name: String) -> Result<String, CareboardError> {
        let db = self.db.lock()?;
        let role = db
            .get_role(&name)?
            .ok_or_else(|| CareboardError::NotFound(format!("Role {}", name)))?;
        Ok(role.as_str().to_string())
    }

    /// Register a user record (identity is managed elsewhere).
    pub fn create_user(
        &self,
        email: String,
        first_name: String,
        last_name: String,
        role: Option<String>,
    ) -> Result<FfiUser, CareboardError> {
        let db = self.db.lock()?;
        let user = User::new(email, first_name, last_name, parse_role(role)?);
        db.insert_user(&user)?;
        Ok(user.into())
    }

    pub fn get_user(&self, user_id: String) -> Result<Option<FfiUser>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.get_user(&user_id)?.map(|u| u.into()))
    }

    /// Set or clear a user's role. Refused while the user holds assignments.
    pub fn set_user_role(&self, user_id: String, role: Option<String>) -> Result<FfiUser, CareboardError> {
        let role = parse_role(role)?;
        let db = self.db.lock()?;
        Ok(CareEngine::new(&db).change_role(&user_id, role)?.into())
    }

    /// Set or clear a user's primary geocode.
    pub fn set_user_geocode(
        &self,
        user_id: String,
        geocode_id: Option<String>,
    ) -> Result<(), CareboardError> {
        let db = self.db.lock()?;
        if let Some(id) = &geocode_id {
            if db.get_geocode(id)?.is_none() {
                return Err(CareboardError::NotFound(format!("Geocode {}", id)));
            }
        }
        if !db.update_user_geocode(&user_id, geocode_id.as_deref())? {
            return Err(CareboardError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }

    pub fn create_geocode(
        &self,
        name: String,
        description: String,
    ) -> Result<FfiGeocode, CareboardError> {
        let db = self.db.lock()?;
        let geocode = Geocode::new(name, description);
        db.insert_geocode(&geocode)?;
        Ok(geocode.into())
    }

    pub fn get_geocode(&self, geocode_id: String) -> Result<FfiGeocode, CareboardError> {
        let db = self.db.lock()?;
        let geocode = db
            .get_geocode(&geocode_id)?
            .ok_or_else(|| CareboardError::NotFound(format!("Geocode {}", geocode_id)))?;
        Ok(geocode.into())
    }

    pub fn list_geocodes(&self) -> Result<Vec<FfiGeocode>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.list_geocodes()?.into_iter().map(|g| g.into()).collect())
    }

    pub fn delete_geocode(&self, geocode_id: String) -> Result<bool, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.delete_geocode(&geocode_id)?)
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Create a new, unstaffed patient.
    pub fn create_patient(&self, details: FfiPatientDetails) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let mut patient = Patient::new(details.name.clone(), details.address.clone());
        details.apply(&mut patient);
        db.insert_patient(&patient)?;
        tracing::info!(patient_id = %patient.id, "Created patient");
        Ok(patient.into())
    }

    /// Update demographics. Staffing is only changed through assignment.
    pub fn update_patient(
        &self,
        patient_id: String,
        details: FfiPatientDetails,
    ) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let mut patient = db
            .get_patient(&patient_id)?
            .ok_or_else(|| CareboardError::NotFound(format!("Patient {}", patient_id)))?;
        details.apply(&mut patient);
        patient.touch();
        db.update_patient_details(&patient)?;
        Ok(patient.into())
    }

    pub fn get_patient(&self, patient_id: String) -> Result<Option<FfiPatient>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.get_patient(&patient_id)?.map(|p| p.into()))
    }

    /// Delete a patient with its treatment records and documents.
    pub fn delete_patient(&self, patient_id: String) -> Result<(), CareboardError> {
        let db = self.db.lock()?;
        if !db.delete_patient(&patient_id)? {
            return Err(CareboardError::NotFound(format!("Patient {}", patient_id)));
        }
        tracing::info!(patient_id = %patient_id, "Deleted patient");
        Ok(())
    }

    /// Search, filter, sort and page the patient list.
    pub fn list_patients(&self, query: FfiPatientQuery) -> Result<FfiPatientPage, CareboardError> {
        let query = self.patient_query(query)?;
        let db = self.db.lock()?;
        Ok(db.list_patients(&query)?.into())
    }

    // =========================================================================
    // Care Assignment Operations
    // =========================================================================

    pub fn assign_nurse(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).assign_nurse(&patient_id, &user)?.into())
    }

    pub fn assign_doctor(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).assign_doctor(&patient_id, &user)?.into())
    }

    pub fn unassign_nurse(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).unassign_nurse(&patient_id, &user)?.into())
    }

    pub fn unassign_doctor(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).unassign_doctor(&patient_id, &user)?.into())
    }

    /// Assign the user to the patient according to their role.
    pub fn assign(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).assign(&patient_id, &user)?.into())
    }

    /// Unassign the user from the patient according to their role.
    pub fn unassign(&self, patient_id: String, user_id: String) -> Result<FfiPatient, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).unassign(&patient_id, &user)?.into())
    }

    pub fn can_assign(&self, patient_id: String, user_id: String) -> Result<bool, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).can_assign(&patient_id, &user)?)
    }

    pub fn can_unassign(&self, patient_id: String, user_id: String) -> Result<bool, CareboardError> {
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).can_unassign(&patient_id, &user)?)
    }

    /// Care board for a geocode (defaults to the user's primary geocode).
    pub fn care_board(
        &self,
        user_id: String,
        geocode_id: Option<String>,
        query: FfiPatientQuery,
    ) -> Result<FfiCareBoard, CareboardError> {
        let query = self.patient_query(query)?;
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        let board = CareEngine::new(&db).care_board(&user, geocode_id.as_deref(), &query)?;
        Ok(board.into())
    }

    /// Patients the user is assigned to.
    pub fn my_board(&self, user_id: String, query: FfiPatientQuery) -> Result<FfiBoardPage, CareboardError> {
        let query = self.patient_query(query)?;
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        Ok(CareEngine::new(&db).my_board(&user, &query)?.into())
    }

    // =========================================================================
    // Document Schema Operations
    // =========================================================================

    /// Field kinds a document type may use.
    pub fn field_kinds(&self) -> Vec<FfiFieldKind> {
        FieldKind::ALL
            .iter()
            .map(|k| FfiFieldKind {
                tag: k.as_str().to_string(),
                label: k.label().to_string(),
            })
            .collect()
    }

    pub fn create_document_type(&self, name: String) -> Result<FfiDocumentType, CareboardError> {
        let db = self.db.lock()?;
        Ok(SchemaEngine::new(&db).create_document_type(&name)?.into())
    }

    /// Create a document type and its fields in one step.
    pub fn create_document_type_with_fields(
        &self,
        name: String,
        fields: Vec<FfiFieldSpec>,
    ) -> Result<FfiDocumentSchema, CareboardError> {
        let db = self.db.lock()?;
        let specs: Vec<(&str, &str)> = fields
            .iter()
            .map(|f| (f.name.as_str(), f.field_type.as_str()))
            .collect();
        let schema = SchemaEngine::new(&db).create_document_type_with_fields(&name, &specs)?;
        Ok(schema.into())
    }

    pub fn list_document_types(&self) -> Result<Vec<FfiDocumentType>, CareboardError> {
        let db = self.db.lock()?;
        let types = SchemaEngine::new(&db).list_document_types()?;
        Ok(types.into_iter().map(|t| t.into()).collect())
    }

    pub fn rename_document_type(
        &self,
        document_type_id: i64,
        name: String,
    ) -> Result<FfiDocumentType, CareboardError> {
        let db = self.db.lock()?;
        Ok(SchemaEngine::new(&db)
            .rename_document_type(document_type_id, &name)?
            .into())
    }

    pub fn delete_document_type(&self, document_type_id: i64) -> Result<(), CareboardError> {
        let db = self.db.lock()?;
        Ok(SchemaEngine::new(&db).delete_document_type(document_type_id)?)
    }

    pub fn add_field(
        &self,
        document_type_id: i64,
        name: String,
        field_type: String,
    ) -> Result<FfiDocumentField, CareboardError> {
        let db = self.db.lock()?;
        Ok(SchemaEngine::new(&db)
            .add_field(document_type_id, &name, &field_type)?
            .into())
    }

    pub fn remove_field(&self, document_type_id: i64, field_id: i64) -> Result<(), CareboardError> {
        let db = self.db.lock()?;
        Ok(SchemaEngine::new(&db).remove_field(document_type_id, field_id)?)
    }

    pub fn list_fields(&self, document_type_id: i64) -> Result<Vec<FfiDocumentField>, CareboardError> {
        let db = self.db.lock()?;
        let fields = SchemaEngine::new(&db).list_fields(document_type_id)?;
        Ok(fields.into_iter().map(|f| f.into()).collect())
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Create a field-based document from raw form values keyed by field key.
    pub fn create_document(
        &self,
        document_type_id: i64,
        owner_id: String,
        title: String,
        patient_id: Option<String>,
        values: HashMap<String, String>,
    ) -> Result<FfiDocument, CareboardError> {
        let db = self.db.lock()?;
        let owner = require_user(&db, &owner_id)?;
        let document = DocumentStore::new(&db, &self.files).create_document(
            document_type_id,
            &owner,
            &title,
            patient_id.as_deref(),
            &raw_inputs(values),
        )?;
        Ok(document.into())
    }

    /// Create a document whose content is an uploaded PDF.
    pub fn create_uploaded_document(
        &self,
        document_type_id: i64,
        owner_id: String,
        title: String,
        patient_id: Option<String>,
        pdf: Vec<u8>,
    ) -> Result<FfiDocument, CareboardError> {
        let db = self.db.lock()?;
        let owner = require_user(&db, &owner_id)?;
        let document = DocumentStore::new(&db, &self.files).create_uploaded_document(
            document_type_id,
            &owner,
            &title,
            patient_id.as_deref(),
            &pdf,
        )?;
        Ok(document.into())
    }

    /// Update a document. A PDF switches it to uploaded mode; otherwise the
    /// values are written and the document is field-based.
    pub fn update_document(
        &self,
        document_id: String,
        title: String,
        patient_id: Option<String>,
        values: HashMap<String, String>,
        pdf: Option<Vec<u8>>,
    ) -> Result<FfiDocument, CareboardError> {
        let content = match pdf {
            Some(bytes) => DocumentContent::Upload(bytes),
            None => DocumentContent::Fields(raw_inputs(values)),
        };
        let db = self.db.lock()?;
        let document = DocumentStore::new(&db, &self.files).update_document(
            &document_id,
            &title,
            patient_id.as_deref(),
            &content,
        )?;
        Ok(document.into())
    }

    /// Attach an externally generated rendering of a field-based document.
    pub fn record_generated_file(
        &self,
        document_id: String,
        pdf: Vec<u8>,
    ) -> Result<FfiDocument, CareboardError> {
        let db = self.db.lock()?;
        let document = DocumentStore::new(&db, &self.files).record_generated_file(&document_id, &pdf)?;
        Ok(document.into())
    }

    pub fn read_document_file(&self, document_id: String) -> Result<Vec<u8>, CareboardError> {
        let db = self.db.lock()?;
        Ok(DocumentStore::new(&db, &self.files).read_file(&document_id)?)
    }

    pub fn get_document(&self, document_id: String) -> Result<Option<FfiDocument>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.get_document(&document_id)?.map(|d| d.into()))
    }

    pub fn delete_document(&self, document_id: String) -> Result<(), CareboardError> {
        let db = self.db.lock()?;
        Ok(DocumentStore::new(&db, &self.files).delete_document(&document_id)?)
    }

    /// Typed field values of a document, in schema order.
    pub fn render_field_values(&self, document_id: String) -> Result<Vec<FfiFieldValue>, CareboardError> {
        let db = self.db.lock()?;
        let store = DocumentStore::new(&db, &self.files);
        let document = store.get_document(&document_id)?;
        let mut rendered = store.render_field_values(&document_id)?;

        let fields = db.list_document_fields(document.document_type_id)?;
        Ok(fields
            .into_iter()
            .map(|field| {
                let key = field.key();
                let value = rendered.remove(&key).flatten();
                FfiFieldValue::new(key, field.name, field.field_type, value)
            })
            .collect())
    }

    /// Documents about patients the user treats.
    pub fn list_documents_for_user(
        &self,
        user_id: String,
        query: FfiDocumentQuery,
    ) -> Result<FfiDocumentPage, CareboardError> {
        let query = self.document_query(query);
        let db = self.db.lock()?;
        let user = require_user(&db, &user_id)?;
        let page = DocumentStore::new(&db, &self.files).list_documents_for_user(&user, &query)?;
        Ok(page.into())
    }

    pub fn list_documents_for_patient(&self, patient_id: String) -> Result<Vec<FfiDocument>, CareboardError> {
        let db = self.db.lock()?;
        let documents = db.list_documents_for_patient(&patient_id)?;
        Ok(documents.into_iter().map(|d| d.into()).collect())
    }

    pub fn list_documents_for_owner(&self, owner_id: String) -> Result<Vec<FfiDocument>, CareboardError> {
        let db = self.db.lock()?;
        let documents = db.list_documents_for_owner(&owner_id)?;
        Ok(documents.into_iter().map(|d| d.into()).collect())
    }

    // =========================================================================
    // Drug Directory Operations
    // =========================================================================

    pub fn add_drug(&self, name: String) -> Result<FfiDrug, CareboardError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CareboardError::InvalidInput("Drug name must not be empty".into()));
        }
        let db = self.db.lock()?;
        Ok(db.insert_drug(name)?.into())
    }

    pub fn get_drug(&self, drug_id: i64) -> Result<Option<FfiDrug>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.get_drug(drug_id)?.map(|d| d.into()))
    }

    /// Exact-name lookup.
    pub fn find_drug(&self, name: String) -> Result<Option<FfiDrug>, CareboardError> {
        let db = self.db.lock()?;
        Ok(db.find_drug_by_name(&name)?.map(|d| d.into()))
    }

    /// Substring search for autocomplete.
    pub fn search_drugs(&self, query: String, limit: u32) -> Result<Vec<FfiDrug>, CareboardError> {
        let db = self.db.lock()?;
        let drugs = db.search_drugs(&query, limit)?;
        Ok(drugs.into_iter().map(|d| d.into()).collect())
    }
}

fn raw_inputs(values: HashMap<String, String>) -> FieldInputs {
    values
        .into_iter()
        .map(|(key, raw)| (key, FieldInput::Raw(raw)))
        .collect()
}

// =========================================================================
// FFI Record Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub primary_geocode_id: Option<String>,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role.map(|r| r.as_str().to_string()),
            primary_geocode_id: user.primary_geocode_id,
        }
    }
}

/// FFI-safe geocode.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiGeocode {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<Geocode> for FfiGeocode {
    fn from(geocode: Geocode) -> Self {
        Self {
            id: geocode.id,
            name: geocode.name,
            description: geocode.description,
        }
    }
}

/// Editable patient demographics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientDetails {
    pub name: String,
    pub address: String,
    pub date_of_birth: Option<String>,
    pub height_in: Option<f64>,
    pub weight_lb: Option<f64>,
    pub blood_group: Option<String>,
    pub bed_id: Option<String>,
    pub treatment_area: Option<String>,
    pub geocode_id: Option<String>,
}

impl FfiPatientDetails {
    fn apply(self, patient: &mut Patient) {
        patient.name = self.name;
        patient.address = self.address;
        patient.date_of_birth = self.date_of_birth;
        patient.height_in = self.height_in;
        patient.weight_lb = self.weight_lb;
        patient.blood_group = self.blood_group;
        patient.bed_id = self.bed_id;
        patient.treatment_area = self.treatment_area;
        patient.geocode_id = self.geocode_id;
    }
}

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub address: String,
    pub date_of_birth: Option<String>,
    pub height_in: Option<f64>,
    pub weight_lb: Option<f64>,
    pub blood_group: Option<String>,
    pub bed_id: Option<String>,
    pub treatment_area: Option<String>,
    pub geocode_id: Option<String>,
    pub nurse_count: u32,
    pub doctor_assigned: bool,
    /// Derived care state
    pub state: String,
    pub updated_at: String,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            state: patient.state().as_str().to_string(),
            id: patient.id,
            name: patient.name,
            address: patient.address,
            date_of_birth: patient.date_of_birth,
            height_in: patient.height_in,
            weight_lb: patient.weight_lb,
            blood_group: patient.blood_group,
            bed_id: patient.bed_id,
            treatment_area: patient.treatment_area,
            geocode_id: patient.geocode_id,
            nurse_count: patient.nurse_count,
            doctor_assigned: patient.doctor_assigned,
            updated_at: patient.updated_at,
        }
    }
}

/// Patient list parameters as received from a request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientQuery {
    pub search: Option<String>,
    /// `unassigned`, `nurse_assigned` or `doctor_assigned`
    pub state: Option<String>,
    /// Column name; unknown columns sort by name
    pub sort: Option<String>,
    pub page: u32,
    /// Raw page-size parameter; malformed values use the configured default
    pub page_size: Option<String>,
}

/// A page of patients.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientPage {
    pub items: Vec<FfiPatient>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub num_pages: u32,
}

impl From<Page<Patient>> for FfiPatientPage {
    fn from(page: Page<Patient>) -> Self {
        let num_pages = page.num_pages();
        Self {
            items: page.items.into_iter().map(|p| p.into()).collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            num_pages,
        }
    }
}

/// FFI-safe assigned worker.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBoardWorker {
    pub user_id: String,
    pub name: String,
    pub role: Option<String>,
    pub is_current_user: bool,
}

impl From<care::BoardWorker> for FfiBoardWorker {
    fn from(worker: care::BoardWorker) -> Self {
        Self {
            user_id: worker.user_id,
            name: worker.name,
            role: worker.role.map(|r| r.as_str().to_string()),
            is_current_user: worker.is_current_user,
        }
    }
}

/// FFI-safe board entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBoardEntry {
    pub patient: FfiPatient,
    pub workers: Vec<FfiBoardWorker>,
    pub is_assigned_to_user: bool,
    pub can_assign: bool,
    pub can_unassign: bool,
}

impl From<BoardEntry> for FfiBoardEntry {
    fn from(entry: BoardEntry) -> Self {
        Self {
            patient: entry.patient.into(),
            workers: entry.workers.into_iter().map(|w| w.into()).collect(),
            is_assigned_to_user: entry.is_assigned_to_user,
            can_assign: entry.can_assign,
            can_unassign: entry.can_unassign,
        }
    }
}

/// A page of board entries.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBoardPage {
    pub items: Vec<FfiBoardEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub num_pages: u32,
}

impl From<Page<BoardEntry>> for FfiBoardPage {
    fn from(page: Page<BoardEntry>) -> Self {
        let num_pages = page.num_pages();
        Self {
            items: page.items.into_iter().map(|e| e.into()).collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            num_pages,
        }
    }
}

/// FFI-safe care board.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCareBoard {
    pub geocode: Option<FfiGeocode>,
    pub entries: FfiBoardPage,
    pub other_geocodes: Vec<FfiGeocode>,
}

impl From<CareBoard> for FfiCareBoard {
    fn from(board: CareBoard) -> Self {
        Self {
            geocode: board.geocode.map(|g| g.into()),
            entries: board.entries.into(),
            other_geocodes: board.other_geocodes.into_iter().map(|g| g.into()).collect(),
        }
    }
}

/// A selectable field kind.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFieldKind {
    pub tag: String,
    pub label: String,
}

/// A field to create along with its document type.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFieldSpec {
    pub name: String,
    pub field_type: String,
}

/// FFI-safe document type.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocumentType {
    pub id: i64,
    pub name: String,
}

impl From<DocumentType> for FfiDocumentType {
    fn from(doc_type: DocumentType) -> Self {
        Self {
            id: doc_type.id,
            name: doc_type.name,
        }
    }
}

/// FFI-safe document field.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocumentField {
    pub id: i64,
    pub document_type_id: i64,
    pub name: String,
    pub key: String,
    pub field_type: String,
}

impl From<DocumentField> for FfiDocumentField {
    fn from(field: DocumentField) -> Self {
        Self {
            key: field.key(),
            id: field.id,
            document_type_id: field.document_type_id,
            name: field.name,
            field_type: field.field_type.as_str().to_string(),
        }
    }
}

/// FFI-safe document schema.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocumentSchema {
    pub document_type: FfiDocumentType,
    pub fields: Vec<FfiDocumentField>,
}

impl From<models::DocumentSchema> for FfiDocumentSchema {
    fn from(schema: models::DocumentSchema) -> Self {
        Self {
            document_type: schema.document_type.into(),
            fields: schema.fields.into_iter().map(|f| f.into()).collect(),
        }
    }
}

/// FFI-safe document.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocument {
    pub id: String,
    pub title: String,
    pub document_type_id: i64,
    pub owner_id: String,
    pub patient_id: Option<String>,
    pub creation_date: String,
    pub is_uploaded_pdf: bool,
    pub has_file: bool,
    pub file_sha256: Option<String>,
    pub updated_at: String,
}

impl From<Document> for FfiDocument {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            title: document.title,
            document_type_id: document.document_type_id,
            owner_id: document.owner_id,
            patient_id: document.patient_id,
            creation_date: document.creation_date,
            is_uploaded_pdf: document.is_uploaded_pdf,
            has_file: document.file.is_some(),
            file_sha256: document.file.map(|f| f.sha256),
            updated_at: document.updated_at,
        }
    }
}

/// A page of documents.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocumentPage {
    pub items: Vec<FfiDocument>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub num_pages: u32,
}

impl From<Page<Document>> for FfiDocumentPage {
    fn from(page: Page<Document>) -> Self {
        let num_pages = page.num_pages();
        Self {
            items: page.items.into_iter().map(|d| d.into()).collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
            num_pages,
        }
    }
}

/// Document list parameters as received from a request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDocumentQuery {
    pub search: Option<String>,
    pub document_type_id: Option<i64>,
    pub sort: Option<String>,
    pub page: u32,
    pub page_size: Option<String>,
}

/// A rendered field value.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFieldValue {
    pub key: String,
    pub name: String,
    pub field_type: String,
    /// Canonical text form; None when blank
    pub value: Option<String>,
    /// Set when a drug value resolved to a directory entry
    pub drug_id: Option<i64>,
    /// True when a drug value names a drug no longer in the directory
    pub drug_not_found: bool,
}

impl FfiFieldValue {
    fn new(key: String, name: String, kind: FieldKind, value: Option<FieldValue>) -> Self {
        let (drug_id, drug_not_found) = match &value {
            Some(FieldValue::Drug(DrugRef::Found(drug))) => (Some(drug.id), false),
            Some(FieldValue::Drug(DrugRef::NotFound { .. })) => (None, true),
            _ => (None, false),
        };
        Self {
            key,
            name,
            field_type: kind.as_str().to_string(),
            value: value.map(|v| v.to_storage()),
            drug_id,
            drug_not_found,
        }
    }
}

/// FFI-safe drug.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDrug {
    pub id: i64,
    pub name: String,
}

impl From<models::Drug> for FfiDrug {
    fn from(drug: models::Drug) -> Self {
        Self {
            id: drug.id,
            name: drug.name,
        }
    }
}
