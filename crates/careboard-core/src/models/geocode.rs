//! Geocode (care region) model.

use serde::{Deserialize, Serialize};

/// A named geographic or administrative care region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geocode {
    /// UUID
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Geocode {
    pub fn new(name: String, description: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
        }
    }
}
