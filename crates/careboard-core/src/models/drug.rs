//! Drug directory model.

use serde::{Deserialize, Serialize};

/// An entry in the flat drug directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Drug {
    pub id: i64,
    /// Display name; also the value stored in drug-typed document fields
    pub name: String,
}
