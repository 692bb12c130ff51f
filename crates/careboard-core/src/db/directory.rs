//! Role, user and geocode database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{Geocode, Role, User};

impl Database {
    // =========================================================================
    // Roles
    // =========================================================================

    /// Look up a seeded role by name.
    pub fn get_role(&self, name: &str) -> DbResult<Option<Role>> {
        let stored: Option<String> = self
            .conn
            .query_row("SELECT name FROM roles WHERE name = ?", [name], |row| {
                row.get(0)
            })
            .optional()?;

        stored
            .map(|s| {
                s.parse::<Role>()
                    .map_err(|e| DbError::Constraint(e.to_string()))
            })
            .transpose()
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user record.
    pub fn insert_user(&self, user: &User) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (
                id, email, first_name, last_name, role, primary_geocode_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                user.id,
                user.email,
                user.first_name,
                user.last_name,
                user.role.map(|r| r.as_str()),
                user.primary_geocode_id,
                user.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a user by ID.
    pub fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                r#"
                SELECT id, email, first_name, last_name, role, primary_geocode_id, created_at
                FROM users
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                        role: row.get(4)?,
                        primary_geocode_id: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Set or clear a user's role. Callers go through
    /// [`CareEngine::change_role`](crate::care::CareEngine::change_role),
    /// which refuses while the user holds treatment records.
    pub(crate) fn update_user_role(&self, id: &str, role: Option<Role>) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE users SET role = ? WHERE id = ?",
            params![role.map(|r| r.as_str()), id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set or clear a user's primary geocode (admin action).
    pub fn update_user_geocode(&self, id: &str, geocode_id: Option<&str>) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE users SET primary_geocode_id = ? WHERE id = ?",
            params![geocode_id, id],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Geocodes
    // =========================================================================

    /// Insert a geocode.
    pub fn insert_geocode(&self, geocode: &Geocode) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO geocodes (id, name, description) VALUES (?1, ?2, ?3)",
            params![geocode.id, geocode.name, geocode.description],
        )?;
        Ok(())
    }

    /// Get a geocode by ID.
    pub fn get_geocode(&self, id: &str) -> DbResult<Option<Geocode>> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM geocodes WHERE id = ?",
                [id],
                |row| {
                    Ok(Geocode {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// List all geocodes by name.
    pub fn list_geocodes(&self) -> DbResult<Vec<Geocode>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM geocodes ORDER BY name")?;

        let rows = stmt.query_map([], |row| {
            Ok(Geocode {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a geocode. Patients and users referencing it are unlinked.
    pub fn delete_geocode(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM geocodes WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct UserRow {
    id: String,
    email: String,
    first_name: String,
    last_name: String,
    role: Option<String>,
    primary_geocode_id: Option<String>,
    created_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .map(|s| s.parse::<Role>())
            .transpose()
            .map_err(|e| DbError::Constraint(e.to_string()))?;

        Ok(User {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            role,
            primary_geocode_id: row.primary_geocode_id,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Patient;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_get_role() {
        let db = setup_db();
        assert_eq!(db.get_role("nurse").unwrap(), Some(Role::Nurse));
        assert_eq!(db.get_role("doctor").unwrap(), Some(Role::Doctor));
        assert_eq!(db.get_role("admin").unwrap(), Some(Role::Admin));
        assert_eq!(db.get_role("janitor").unwrap(), None);
    }

    #[test]
    fn test_insert_and_get_user() {
        let db = setup_db();
        let user = User::new(
            "joy@example.com".into(),
            "Nurse".into(),
            "Joy".into(),
            Some(Role::Nurse),
        );
        db.insert_user(&user).unwrap();

        let retrieved = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(retrieved, user);
        assert!(db.get_user("missing").unwrap().is_none());
    }

    #[test]
    fn test_update_user_role() {
        let db = setup_db();
        let user = User::new("new@example.com".into(), "New".into(), "Hire".into(), None);
        db.insert_user(&user).unwrap();

        assert!(db.update_user_role(&user.id, Some(Role::Doctor)).unwrap());
        let retrieved = db.get_user(&user.id).unwrap().unwrap();
        assert_eq!(retrieved.role, Some(Role::Doctor));

        assert!(!db.update_user_role("missing", Some(Role::Doctor)).unwrap());
    }

    #[test]
    fn test_geocodes_listed_by_name() {
        let db = setup_db();
        db.insert_geocode(&Geocode::new("West Ward".into(), "".into()))
            .unwrap();
        db.insert_geocode(&Geocode::new("East Ward".into(), "Ground floor".into()))
            .unwrap();

        let geocodes = db.list_geocodes().unwrap();
        assert_eq!(geocodes.len(), 2);
        assert_eq!(geocodes[0].name, "East Ward");
        assert_eq!(geocodes[1].name, "West Ward");
    }

    #[test]
    fn test_delete_geocode_unlinks_references() {
        let db = setup_db();
        let geocode = Geocode::new("North".into(), "".into());
        db.insert_geocode(&geocode).unwrap();

        let mut user = User::new("doc@example.com".into(), "Doc".into(), "Tor".into(), Some(Role::Doctor));
        user.primary_geocode_id = Some(geocode.id.clone());
        db.insert_user(&user).unwrap();

        let mut patient = Patient::new("John Doe".into(), "123 Main St".into());
        patient.geocode_id = Some(geocode.id.clone());
        db.insert_patient(&patient).unwrap();

        assert!(db.delete_geocode(&geocode.id).unwrap());
        assert!(db.get_geocode(&geocode.id).unwrap().is_none());
        assert_eq!(db.get_user(&user.id).unwrap().unwrap().primary_geocode_id, None);
        assert_eq!(db.get_patient(&patient.id).unwrap().unwrap().geocode_id, None);
    }
}
