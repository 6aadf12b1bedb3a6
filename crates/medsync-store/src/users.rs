use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;

/// Basic information on a user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub role: String,
}

/// All information on a user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: i64,
    pub name: String,
    pub role: String,
}

/// A to-be inserted user.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default = "default_role")]
    pub role: String,
}

/// A to-be applied user update.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdatedUser {
    pub name: String,
    pub role: String,
}

fn default_role() -> String {
    "patient".into()
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: &NewUser) -> Result<UserDetails, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (name, role, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![new.name, new.role, Utc::now().to_rfc3339()],
            )?;
            Ok(UserDetails {
                id: conn.last_insert_rowid(),
                name: new.name.clone(),
                role: new.role.clone(),
            })
        })
    }

    pub fn list(&self) -> Result<Vec<UserSummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, role FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn read(&self, id: i64) -> Result<UserDetails, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT id, name, role FROM users WHERE id = ?1", [id], |row| {
                Ok(UserDetails {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    role: row.get(2)?,
                })
            })
            .map_err(|_| StoreError::NotFound(format!("user {id}")))
        })
    }

    pub fn update(&self, id: i64, updated: &UpdatedUser) -> Result<UserDetails, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?1, role = ?2 WHERE id = ?3",
                rusqlite::params![updated.name, updated.role, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(UserDetails {
                id,
                name: updated.name.clone(),
                role: updated.role.clone(),
            })
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("user {id}")));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> UserRepo {
        UserRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn create_defaults_role_via_serde() {
        let new: NewUser = serde_json::from_str(r#"{"name":"alice"}"#).unwrap();
        assert_eq!(new.role, "patient");
    }

    #[test]
    fn crud_roundtrip() {
        let repo = repo();
        let user = repo.create(&NewUser { name: "alice".into(), role: "doctor".into() }).unwrap();

        let read = repo.read(user.id).unwrap();
        assert_eq!(read.name, "alice");
        assert_eq!(read.role, "doctor");

        repo.update(user.id, &UpdatedUser { name: "bob".into(), role: "doctor".into() }).unwrap();
        assert_eq!(repo.read(user.id).unwrap().name, "bob");

        repo.delete(user.id).unwrap();
        assert!(matches!(repo.read(user.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_returns_all() {
        let repo = repo();
        repo.create(&NewUser { name: "a".into(), role: "patient".into() }).unwrap();
        repo.create(&NewUser { name: "b".into(), role: "doctor".into() }).unwrap();
        assert_eq!(repo.list().unwrap().len(), 2);
    }
}
