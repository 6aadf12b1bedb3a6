use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;

/// Basic information on a single medication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
}

/// All information on a medication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicationDetails {
    pub id: i64,
    pub title: String,
    pub description: String,
}

impl MedicationDetails {
    pub fn to_summary(&self) -> MedicationSummary {
        MedicationSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

/// A to-be inserted medication.
#[derive(Clone, Debug, Deserialize)]
pub struct NewMedication {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// A to-be applied medication update.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdatedMedication {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

pub struct MedicationRepo {
    db: Database,
}

impl MedicationRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, new: &NewMedication) -> Result<MedicationDetails, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO medications (title, description) VALUES (?1, ?2)",
                rusqlite::params![new.title, new.description],
            )?;
            let id = conn.last_insert_rowid();
            Ok(MedicationDetails {
                id,
                title: new.title.clone(),
                description: new.description.clone(),
            })
        })
    }

    pub fn list(&self) -> Result<Vec<MedicationSummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, title, description FROM medications ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MedicationSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn read(&self, id: i64) -> Result<MedicationDetails, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, description FROM medications WHERE id = ?1",
                [id],
                |row| {
                    Ok(MedicationDetails {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .map_err(|_| StoreError::NotFound(format!("medication {id}")))
        })
    }

    pub fn update(&self, id: i64, updated: &UpdatedMedication) -> Result<MedicationDetails, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE medications SET title = ?1, description = ?2 WHERE id = ?3",
                rusqlite::params![updated.title, updated.description, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("medication {id}")));
            }
            Ok(MedicationDetails {
                id,
                title: updated.title.clone(),
                description: updated.description.clone(),
            })
        })
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM medications WHERE id = ?1", [id])?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("medication {id}")));
            }
            Ok(())
        })
    }
}
