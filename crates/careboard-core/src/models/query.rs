//! List query and pagination types.

use serde::{Deserialize, Serialize};

use super::patient::CareState;

/// Default page size when none (or garbage) is supplied.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    /// Total matching rows across all pages
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            page,
            page_size,
            total: 0,
        }
    }

    /// Number of pages needed for `total` rows (at least 1).
    pub fn num_pages(&self) -> u32 {
        if self.total == 0 || self.page_size == 0 {
            return 1;
        }
        self.total.div_ceil(self.page_size as u64) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total: self.total,
        }
    }
}

/// Parse a page-size request parameter, falling back to `default` when it is
/// missing, malformed or zero, and clamping to `max`.
pub fn parse_page_size(raw: Option<&str>, default: u32, max: u32) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
        .min(max)
}

/// Sortable patient columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatientSort {
    #[default]
    Name,
    TreatmentArea,
    BedId,
    DateOfBirth,
}

impl PatientSort {
    /// Parse a sort parameter; unknown columns fall back to name.
    pub fn parse(s: &str) -> Self {
        match s {
            "treatment_area" => PatientSort::TreatmentArea,
            "bed_id" => PatientSort::BedId,
            "date_of_birth" => PatientSort::DateOfBirth,
            _ => PatientSort::Name,
        }
    }

    pub(crate) fn column(&self) -> &'static str {
        match self {
            PatientSort::Name => "p.name",
            PatientSort::TreatmentArea => "p.treatment_area",
            PatientSort::BedId => "p.bed_id",
            PatientSort::DateOfBirth => "p.date_of_birth",
        }
    }
}

/// Filters for patient lists and care boards.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientQuery {
    /// Case-insensitive substring over name, bed, treatment area and geocode name
    pub search: Option<String>,
    /// Restrict to one derived state
    pub state: Option<CareState>,
    pub sort: PatientSort,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl Default for PatientQuery {
    fn default() -> Self {
        Self {
            search: None,
            state: None,
            sort: PatientSort::Name,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Sortable document columns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSort {
    #[default]
    Title,
    Patient,
    Owner,
    DocumentType,
    /// Newest first
    CreationDate,
}

impl DocumentSort {
    /// Parse a sort parameter; unknown columns fall back to title.
    pub fn parse(s: &str) -> Self {
        match s {
            "patient" => DocumentSort::Patient,
            "owner" => DocumentSort::Owner,
            "document_type" => DocumentSort::DocumentType,
            "creation_date" => DocumentSort::CreationDate,
            _ => DocumentSort::Title,
        }
    }

    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            DocumentSort::Title => "d.title",
            DocumentSort::Patient => "p.name",
            DocumentSort::Owner => "u.last_name, u.first_name",
            DocumentSort::DocumentType => "t.name",
            DocumentSort::CreationDate => "d.creation_date DESC",
        }
    }
}

/// Filters for document lists.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    /// Case-insensitive substring over title, patient name, type name and owner name
    pub search: Option<String>,
    pub document_type_id: Option<i64>,
    pub sort: DocumentSort,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl Default for DocumentQuery {
    fn default() -> Self {
        Self {
            search: None,
            document_type_id: None,
            sort: DocumentSort::Title,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// SQL LIMIT/OFFSET for a 1-based page.
pub(crate) fn limit_offset(page: u32, page_size: u32) -> (i64, i64) {
    let page = page.max(1) as i64;
    let size = page_size.max(1) as i64;
    (size, (page - 1) * size)
}
