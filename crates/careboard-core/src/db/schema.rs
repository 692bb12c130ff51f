//! SQLite schema definition.

/// Complete database schema for careboard.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Reference Data: Roles
-- ============================================================================

CREATE TABLE IF NOT EXISTS roles (
    name TEXT PRIMARY KEY CHECK (name IN ('doctor', 'nurse', 'admin'))
);

INSERT OR IGNORE INTO roles (name) VALUES ('doctor');
INSERT OR IGNORE INTO roles (name) VALUES ('nurse');
INSERT OR IGNORE INTO roles (name) VALUES ('admin');

-- ============================================================================
-- Geocodes (care regions)
-- ============================================================================

CREATE TABLE IF NOT EXISTS geocodes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_geocodes_name ON geocodes(name);

-- ============================================================================
-- Users (owned by the identity subsystem; role/geocode set by admins)
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    role TEXT REFERENCES roles(name) ON DELETE SET NULL,
    primary_geocode_id TEXT REFERENCES geocodes(id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Patients
-- ============================================================================

-- Care state is not stored: it is derived from nurse_count/doctor_assigned.
CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL DEFAULT '',
    date_of_birth TEXT,                          -- YYYY-MM-DD
    height_in REAL,
    weight_lb REAL,
    blood_group TEXT,
    bed_id TEXT,
    treatment_area TEXT,
    geocode_id TEXT REFERENCES geocodes(id) ON DELETE SET NULL,
    nurse_count INTEGER NOT NULL DEFAULT 0 CHECK (nurse_count BETWEEN 0 AND 3),
    doctor_assigned INTEGER NOT NULL DEFAULT 0 CHECK (doctor_assigned IN (0, 1)),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_geocode ON patients(geocode_id);

-- ============================================================================
-- Treatment Records (active staffing, one row per patient/worker pair)
-- ============================================================================

CREATE TABLE IF NOT EXISTS treatment_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    worker_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (patient_id, worker_id)
);

CREATE INDEX IF NOT EXISTS idx_treatment_worker ON treatment_records(worker_id);

-- ============================================================================
-- Drug Directory
-- ============================================================================

CREATE TABLE IF NOT EXISTS drugs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drugs_name ON drugs(name);

-- ============================================================================
-- Document Schemas
-- ============================================================================

CREATE TABLE IF NOT EXISTS document_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS document_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_type_id INTEGER NOT NULL REFERENCES document_types(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    field_type TEXT NOT NULL
        CHECK (field_type IN ('text', 'number', 'date', 'rich_text', 'drug')),
    position INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fields_type ON document_fields(document_type_id, position);

-- ============================================================================
-- Documents
-- ============================================================================

CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    document_type_id INTEGER NOT NULL REFERENCES document_types(id) ON DELETE CASCADE,
    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    patient_id TEXT REFERENCES patients(id) ON DELETE CASCADE,
    creation_date TEXT NOT NULL,
    is_uploaded_pdf INTEGER NOT NULL DEFAULT 0 CHECK (is_uploaded_pdf IN (0, 1)),
    file_key TEXT,
    file_sha256 TEXT,
    file_size INTEGER,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (is_uploaded_pdf = 0 OR file_key IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_documents_patient ON documents(patient_id);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(document_type_id);

CREATE TRIGGER IF NOT EXISTS documents_creation_date_immutable
BEFORE UPDATE OF creation_date ON documents
WHEN new.creation_date IS NOT old.creation_date
BEGIN
    SELECT RAISE(ABORT, 'creation_date is immutable');
END;

-- One value per (document, field); values are text interpreted by field_type
CREATE TABLE IF NOT EXISTS document_field_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    field_id INTEGER NOT NULL REFERENCES document_fields(id) ON DELETE CASCADE,
    value TEXT NOT NULL DEFAULT '',
    UNIQUE (document_id, field_id)
);

CREATE INDEX IF NOT EXISTS idx_field_values_field ON document_field_values(field_id);

-- Uploaded-PDF documents carry a file instead of field values
CREATE TRIGGER IF NOT EXISTS field_values_reject_uploaded BEFORE INSERT ON document_field_values
WHEN (SELECT is_uploaded_pdf FROM documents WHERE id = new.document_id) = 1
BEGIN
    SELECT RAISE(ABORT, 'Uploaded documents cannot have field values');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = setup_conn();
        conn.execute_batch(SCHEMA).unwrap();

        let roles: i64 = conn
            .query_row("SELECT COUNT(*) FROM roles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(roles, 3);
    }

    #[test]
    fn test_nurse_count_check() {
        let conn = setup_conn();

        let result = conn.execute(
            "INSERT INTO patients (id, name, nurse_count) VALUES ('p1', 'Over', 4)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO patients (id, name, nurse_count) VALUES ('p1', 'Full', 3)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_treatment_record_unique() {
        let conn = setup_conn();
        conn.execute("INSERT INTO patients (id, name) VALUES ('p1', 'Pat')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO users (id, email, role) VALUES ('u1', 'n@example.com', 'nurse')",
            [],
        )
        .unwrap();

        conn.execute(
            "INSERT INTO treatment_records (patient_id, worker_id) VALUES ('p1', 'u1')",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO treatment_records (patient_id, worker_id) VALUES ('p1', 'u1')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let conn = setup_conn();
        conn.execute("INSERT INTO document_types (id, name) VALUES (1, 'Note')", [])
            .unwrap();

        let result = conn.execute(
            "INSERT INTO document_fields (document_type_id, name, field_type, position)
             VALUES (1, 'Flag', 'checkbox', 1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_document_triggers() {
        let conn = setup_conn();
        conn.execute("INSERT INTO users (id, email) VALUES ('u1', 'a@example.com')", [])
            .unwrap();
        conn.execute("INSERT INTO document_types (id, name) VALUES (1, 'Scan')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO document_fields (id, document_type_id, name, field_type, position)
             VALUES (1, 1, 'Notes', 'text', 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO documents (id, title, document_type_id, owner_id, creation_date, is_uploaded_pdf, file_key)
             VALUES ('d1', 'Scan', 1, 'u1', '2024-01-01T00:00:00Z', 1, 'documents/d1.pdf')",
            [],
        )
        .unwrap();

        // Uploaded documents cannot take field values
        let result = conn.execute(
            "INSERT INTO document_field_values (document_id, field_id, value) VALUES ('d1', 1, 'x')",
            [],
        );
        assert!(result.is_err());

        // creation_date cannot change
        let result = conn.execute(
            "UPDATE documents SET creation_date = '2025-01-01T00:00:00Z' WHERE id = 'd1'",
            [],
        );
        assert!(result.is_err());

        // Other columns still update
        let result = conn.execute("UPDATE documents SET title = 'Renamed' WHERE id = 'd1'", []);
        assert!(result.is_ok());
    }
}
