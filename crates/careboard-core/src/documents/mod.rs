//! Dynamic document schemas and document instances.
//!
//! Admins define document types as ordered lists of typed fields; documents
//! store one text value per field, coerced by the field's kind on the way in
//! and parsed back into a [`FieldValue`](crate::models::FieldValue) on the way
//! out. A document is either field-based or an uploaded PDF, never both.

mod schema;
mod store;
mod values;

pub use schema::*;
pub use store::*;
pub use values::*;

use thiserror::Error;

use crate::db::DbError;
use crate::files::FileStoreError;

/// Document errors.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),

    #[error("Invalid field name '{0}': it must contain at least one letter or digit")]
    InvalidFieldName(String),

    #[error("Field '{name}' collides with existing key '{key}'")]
    DuplicateFieldKey { name: String, key: String },

    #[error("Invalid value for field '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Unknown drug '{name}' for field '{key}'{}", suggestion_hint(.suggestion))]
    UnknownDrug {
        key: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error("Document {0} is an uploaded PDF and has no field values")]
    UploadedDocument(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("File storage error: {0}")]
    Storage(#[from] FileStoreError),
}

impl From<rusqlite::Error> for DocumentError {
    fn from(e: rusqlite::Error) -> Self {
        DocumentError::Database(DbError::from(e))
    }
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

pub type DocumentResult<T> = Result<T, DocumentError>;
