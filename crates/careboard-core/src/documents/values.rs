//! Per-kind coercion of field values to and from their stored text.

use chrono::NaiveDate;
use strsim::jaro_winkler;

use super::{DocumentError, DocumentResult};
use crate::db::Database;
use crate::models::{DocumentField, DrugRef, FieldKind, FieldValue, DATE_FORMAT};

/// Minimum Jaro-Winkler similarity for a drug name suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// A value supplied for a field when creating or updating a document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldInput {
    /// Unparsed form input, interpreted by the field's kind
    Raw(String),
    /// Already-typed value; its kind must match the field's
    Value(FieldValue),
}

impl From<FieldValue> for FieldInput {
    fn from(value: FieldValue) -> Self {
        FieldInput::Value(value)
    }
}

impl From<&str> for FieldInput {
    fn from(raw: &str) -> Self {
        FieldInput::Raw(raw.to_string())
    }
}

impl From<String> for FieldInput {
    fn from(raw: String) -> Self {
        FieldInput::Raw(raw)
    }
}

/// Field inputs keyed by field key.
pub type FieldInputs = std::collections::BTreeMap<String, FieldInput>;

/// Coerce an input for `field` into its stored text.
pub fn coerce_input(db: &Database, field: &DocumentField, input: &FieldInput) -> DocumentResult<String> {
    match input {
        FieldInput::Raw(raw) => coerce_raw(db, field, raw),
        FieldInput::Value(value) => {
            if value.kind() != field.field_type {
                return Err(DocumentError::InvalidValue {
                    key: field.key(),
                    reason: format!(
                        "expected a {} value, got {}",
                        field.field_type,
                        value.kind()
                    ),
                });
            }
            coerce_raw(db, field, &value.to_storage())
        }
    }
}

/// Coerce unparsed input for `field` into its stored text.
///
/// Blank input for any kind is stored as the empty string.
pub fn coerce_raw(db: &Database, field: &DocumentField, raw: &str) -> DocumentResult<String> {
    match field.field_type {
        FieldKind::Text | FieldKind::RichText => Ok(raw.to_string()),
        FieldKind::Number => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(String::new());
            }
            let number = trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| DocumentError::InvalidValue {
                    key: field.key(),
                    reason: format!("'{}' is not a number", trimmed),
                })?;
            Ok(FieldValue::Number(number).to_storage())
        }
        FieldKind::Date => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(String::new());
            }
            let date = NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| {
                DocumentError::InvalidValue {
                    key: field.key(),
                    reason: format!("'{}' is not a YYYY-MM-DD date", trimmed),
                }
            })?;
            Ok(FieldValue::Date(date).to_storage())
        }
        FieldKind::Drug => {
            let name = raw.trim();
            if name.is_empty() {
                return Ok(String::new());
            }
            match db.find_drug_by_name(name)? {
                Some(drug) => Ok(drug.name),
                None => Err(DocumentError::UnknownDrug {
                    key: field.key(),
                    name: name.to_string(),
                    suggestion: suggest_drug(db, name)?,
                }),
            }
        }
    }
}

/// Closest directory name to an unknown drug name, if any is close enough.
pub fn suggest_drug(db: &Database, name: &str) -> DocumentResult<Option<String>> {
    let needle = name.to_lowercase();
    let best = db
        .list_drug_names()?
        .into_iter()
        .map(|candidate| (jaro_winkler(&needle, &candidate.to_lowercase()), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0));

    Ok(best.map(|(_, candidate)| candidate))
}

/// Parse stored text back into a typed value. Blank text is `None`.
///
/// Text that no longer parses for the field's kind is logged and read as
/// `None`; drug names that no longer resolve become [`DrugRef::NotFound`].
pub fn parse_stored(db: &Database, field: &DocumentField, stored: &str) -> DocumentResult<Option<FieldValue>> {
    if stored.trim().is_empty() {
        return Ok(None);
    }

    let value = match field.field_type {
        FieldKind::Text => Some(FieldValue::Text(stored.to_string())),
        FieldKind::RichText => Some(FieldValue::RichText(stored.to_string())),
        FieldKind::Number => stored.trim().parse::<f64>().ok().map(FieldValue::Number),
        FieldKind::Date => NaiveDate::parse_from_str(stored.trim(), DATE_FORMAT)
            .ok()
            .map(FieldValue::Date),
        FieldKind::Drug => {
            let drug = match db.find_drug_by_name(stored)? {
                Some(drug) => DrugRef::Found(drug),
                None => DrugRef::NotFound {
                    name: stored.to_string(),
                },
            };
            Some(FieldValue::Drug(drug))
        }
    };

    if value.is_none() {
        tracing::warn!(
            field_id = field.id,
            field_type = %field.field_type,
            stored,
            "Stored value does not parse for its field type"
        );
    }
    Ok(value)
}
