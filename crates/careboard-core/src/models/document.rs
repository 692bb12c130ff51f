//! Document schema and instance models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::drug::Drug;

/// Title used when a document is saved without one.
pub const UNTITLED_DOCUMENT: &str = "Untitled Document";

/// Date format for date-typed field values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Kind of a document field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    RichText,
    /// Reference to a drug in the directory, stored by name
    Drug,
}

/// Returned when a field type tag is not one of the known kinds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unrecognized field type: {0}")]
pub struct UnknownFieldKind(pub String);

impl FieldKind {
    pub const ALL: [FieldKind; 5] = [
        FieldKind::Text,
        FieldKind::Number,
        FieldKind::Date,
        FieldKind::RichText,
        FieldKind::Drug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Date => "date",
            FieldKind::RichText => "rich_text",
            FieldKind::Drug => "drug",
        }
    }

    /// Human-readable label for form builders.
    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Text => "Text",
            FieldKind::Number => "Number",
            FieldKind::Date => "Date",
            FieldKind::RichText => "Rich Text",
            FieldKind::Drug => "Drug",
        }
    }
}

impl FromStr for FieldKind {
    type Err = UnknownFieldKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(FieldKind::Text),
            "number" => Ok(FieldKind::Number),
            "date" => Ok(FieldKind::Date),
            "rich_text" => Ok(FieldKind::RichText),
            "drug" => Ok(FieldKind::Drug),
            other => Err(UnknownFieldKind(other.to_string())),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize a field display name into its snake-case machine key.
///
/// Non-alphanumeric runs become a single underscore, and a word boundary is
/// inserted before an uppercase letter that follows a lowercase letter or
/// digit, or that starts a new word after an acronym (`HRValue` -> `hr_value`).
/// Leading and trailing separators are dropped.
pub fn derive_key(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut key = String::with_capacity(chars.len() + 4);
    let mut pending_sep = false;

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            pending_sep = !key.is_empty();
            continue;
        }

        if c.is_uppercase() && !key.is_empty() && i > 0 {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_is_lower) {
                pending_sep = true;
            }
        }

        if pending_sep {
            key.push('_');
            pending_sep = false;
        }
        key.extend(c.to_lowercase());
    }

    key
}

/// A document type (schema).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentType {
    pub id: i64,
    pub name: String,
}

/// A typed field of a document type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentField {
    pub id: i64,
    pub document_type_id: i64,
    pub name: String,
    pub field_type: FieldKind,
    /// Display/creation order within the type
    pub position: i64,
}

impl DocumentField {
    /// Machine key joining this field to stored values.
    pub fn key(&self) -> String {
        derive_key(&self.name)
    }
}

/// A document type together with its ordered fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentSchema {
    pub document_type: DocumentType,
    pub fields: Vec<DocumentField>,
}

impl DocumentSchema {
    /// Find a field by its derived key.
    pub fn field_by_key(&self, key: &str) -> Option<&DocumentField> {
        self.fields.iter().find(|f| f.key() == key)
    }
}

/// Reference to a stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    /// Store key (relative path)
    pub key: String,
    /// Hex SHA-256 of the content
    pub sha256: String,
    pub size_bytes: u64,
}

/// A clinical document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// UUID
    pub id: String,
    pub title: String,
    pub document_type_id: i64,
    /// Owning user ID
    pub owner_id: String,
    pub patient_id: Option<String>,
    /// Set once at creation
    pub creation_date: String,
    /// True when the content is an uploaded PDF rather than field values
    pub is_uploaded_pdf: bool,
    /// Uploaded file, or a generated rendering of the fields
    pub file: Option<FileRef>,
    /// Last update timestamp
    pub updated_at: String,
}

impl Document {
    /// Create a new field-mode document.
    pub fn new(
        document_type_id: i64,
        owner_id: String,
        title: &str,
        patient_id: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: normalize_title(title),
            document_type_id,
            owner_id,
            patient_id,
            creation_date: now.clone(),
            is_uploaded_pdf: false,
            file: None,
            updated_at: now,
        }
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Trim a title, falling back to [`UNTITLED_DOCUMENT`] when blank.
pub fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        UNTITLED_DOCUMENT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A drug-field value resolved against the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DrugRef {
    Found(Drug),
    /// The stored name no longer matches any drug
    NotFound { name: String },
}

impl DrugRef {
    pub fn name(&self) -> &str {
        match self {
            DrugRef::Found(drug) => &drug.name,
            DrugRef::NotFound { name } => name,
        }
    }
}

/// A typed document field value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    RichText(String),
    Drug(DrugRef),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::RichText(_) => FieldKind::RichText,
            FieldValue::Drug(_) => FieldKind::Drug,
        }
    }

    /// Serialize to the single text column used for storage.
    pub fn to_storage(&self) -> String {
        match self {
            FieldValue::Text(s) | FieldValue::RichText(s) => s.clone(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            FieldValue::Drug(drug) => drug.name().to_string(),
        }
    }
}
