//! Drug directory database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{contains_pattern, Database, DbResult};
use crate::models::Drug;

impl Database {
    /// Add a drug to the directory.
    pub fn insert_drug(&self, name: &str) -> DbResult<Drug> {
        self.conn
            .execute("INSERT INTO drugs (name) VALUES (?)", [name])?;
        Ok(Drug {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Get a drug by ID.
    pub fn get_drug(&self, id: i64) -> DbResult<Option<Drug>> {
        self.conn
            .query_row("SELECT id, name FROM drugs WHERE id = ?", [id], drug_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// Find a drug by exact name. With duplicate names the oldest entry wins.
    pub fn find_drug_by_name(&self, name: &str) -> DbResult<Option<Drug>> {
        self.conn
            .query_row(
                "SELECT id, name FROM drugs WHERE name = ? ORDER BY id LIMIT 1",
                [name],
                drug_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Case-insensitive substring search over drug names.
    pub fn search_drugs(&self, query: &str, limit: u32) -> DbResult<Vec<Drug>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name FROM drugs
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY name, id
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![contains_pattern(query.trim()), limit], drug_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// All drug names, for fuzzy suggestions.
    pub fn list_drug_names(&self) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM drugs ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Remove a drug. Stored field values that named it are left as-is.
    pub fn delete_drug(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM drugs WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

fn drug_from_row(row: &Row<'_>) -> rusqlite::Result<Drug> {
    Ok(Drug {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let db = setup_db();
        let drug = db.insert_drug("Amoxicillin").unwrap();

        assert_eq!(db.get_drug(drug.id).unwrap(), Some(drug.clone()));
        assert_eq!(db.find_drug_by_name("Amoxicillin").unwrap(), Some(drug));
        assert!(db.find_drug_by_name("amoxicillin").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_names_resolve_to_oldest() {
        let db = setup_db();
        let first = db.insert_drug("Ibuprofen").unwrap();
        db.insert_drug("Ibuprofen").unwrap();

        assert_eq!(db.find_drug_by_name("Ibuprofen").unwrap().unwrap().id, first.id);
    }

    #[test]
    fn test_search() {
        let db = setup_db();
        db.insert_drug("Amoxicillin").unwrap();
        db.insert_drug("Ampicillin").unwrap();
        db.insert_drug("Ibuprofen").unwrap();

        let results = db.search_drugs("CILLIN", 10).unwrap();
        let names: Vec<_> = results.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Amoxicillin", "Ampicillin"]);

        assert_eq!(db.search_drugs("cillin", 1).unwrap().len(), 1);
        assert!(db.search_drugs("%", 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_drug() {
        let db = setup_db();
        let drug = db.insert_drug("Aspirin").unwrap();

        assert!(db.delete_drug(drug.id).unwrap());
        assert!(db.list_drug_names().unwrap().is_empty());
    }
}
