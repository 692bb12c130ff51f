//! Patient models and the derived care state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::identity::Role;

/// Maximum number of nurses that may staff one patient.
pub const MAX_NURSES: u32 = 3;

/// Staffing status of a patient.
///
/// Never stored: always derived from `(nurse_count, doctor_assigned)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CareState {
    /// No staff assigned
    Unassigned,
    /// At least one nurse, no doctor
    NurseAssigned,
    /// A doctor is assigned
    DoctorAssigned,
}

impl CareState {
    /// Derive the state from the staffing counters.
    pub fn derive(nurse_count: u32, doctor_assigned: bool) -> Self {
        if doctor_assigned {
            CareState::DoctorAssigned
        } else if nurse_count > 0 {
            CareState::NurseAssigned
        } else {
            CareState::Unassigned
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CareState::Unassigned => "unassigned",
            CareState::NurseAssigned => "nurse_assigned",
            CareState::DoctorAssigned => "doctor_assigned",
        }
    }
}

impl FromStr for CareState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unassigned" => Ok(CareState::Unassigned),
            "nurse_assigned" => Ok(CareState::NurseAssigned),
            "doctor_assigned" => Ok(CareState::DoctorAssigned),
            other => Err(format!("Unknown care state: {}", other)),
        }
    }
}

impl fmt::Display for CareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// UUID
    pub id: String,
    pub name: String,
    pub address: String,
    /// ISO date (YYYY-MM-DD)
    pub date_of_birth: Option<String>,
    /// Height in inches
    pub height_in: Option<f64>,
    /// Weight in pounds
    pub weight_lb: Option<f64>,
    /// e.g. "A+", "AB-"
    pub blood_group: Option<String>,
    pub bed_id: Option<String>,
    /// Treatment unit or department
    pub treatment_area: Option<String>,
    /// Care region
    pub geocode_id: Option<String>,
    /// Number of nurses currently assigned (0..=3)
    pub nurse_count: u32,
    /// Whether a doctor is currently assigned
    pub doctor_assigned: bool,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Patient {
    /// Create a new, unstaffed patient.
    pub fn new(name: String, address: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            address,
            date_of_birth: None,
            height_in: None,
            weight_lb: None,
            blood_group: None,
            bed_id: None,
            treatment_area: None,
            geocode_id: None,
            nurse_count: 0,
            doctor_assigned: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Current care state, derived from the counters.
    pub fn state(&self) -> CareState {
        CareState::derive(self.nurse_count, self.doctor_assigned)
    }

    /// Whether another nurse can be taken on.
    pub fn has_nurse_capacity(&self) -> bool {
        self.nurse_count < MAX_NURSES
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Active staffing relationship between a patient and a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreatmentRecord {
    pub id: i64,
    pub patient_id: String,
    pub worker_id: String,
    pub created_at: String,
}

/// A worker assigned to a patient, as shown on a care board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignedWorker {
    pub user_id: String,
    pub name: String,
    pub role: Option<Role>,
}
