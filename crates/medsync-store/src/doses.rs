use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;
use crate::medications::MedicationSummary;

/// Basic information on a dose.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseSummary {
    pub id: i64,
    pub title: String,
    pub dispense_after: String,
    pub dispense_before: String,
    pub description: String,
}

/// A medication and amount contained in a dose.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoseMedication {
    pub amount: i64,
    pub medication: MedicationSummary,
}

/// All information on a dose.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseDetails {
    pub id: i64,
    pub title: String,
    pub dispense_after: String,
    pub dispense_before: String,
    pub description: String,
    pub medications: Vec<DoseMedication>,
}

impl DoseDetails {
    pub fn to_summary(&self) -> DoseSummary {
        DoseSummary {
            id: self.id,
            title: self.title.clone(),
            dispense_after: self.dispense_after.clone(),
            dispense_before: self.dispense_before.clone(),
            description: self.description.clone(),
        }
    }
}

/// A medication reference in a to-be written dose.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoseMedication {
    pub medication_id: i64,
    pub amount: i64,
}

/// A to-be inserted dose.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDose {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub dispense_after: String,
    pub dispense_before: String,
    #[serde(default)]
    pub medications: Vec<NewDoseMedication>,
}

/// A to-be applied dose update. Replaces the medication list wholesale.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedDose {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub dispense_after: String,
    pub dispense_before: String,
    #[serde(default)]
    pub medications: Vec<NewDoseMedication>,
}

pub struct DoseRepo {
    db: Database,
}

impl DoseRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, user_id: i64, new: &NewDose) -> Result<DoseDetails, StoreError> {
        let dose_id = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO doses (user_id, title, description, dispense_after, dispense_before, created_on)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    user_id,
                    new.title,
                    new.description,
                    new.dispense_after,
                    new.dispense_before,
                    // SQLite's DATE() reads this back for the summary queries.
                    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                ],
            )?;
            let dose_id = tx.last_insert_rowid();
            for medication in &new.medications {
                tx.execute(
                    "INSERT INTO dose_medications (dose_id, medication_id, amount) VALUES (?1, ?2, ?3)",
                    rusqlite::params![dose_id, medication.medication_id, medication.amount],
                )?;
            }
            tx.commit()?;
            Ok(dose_id)
        })?;

        self.read(user_id, dose_id)
    }

    pub fn list(&self, user_id: i64) -> Result<Vec<DoseSummary>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, dispense_after, dispense_before, description
                 FROM doses WHERE user_id = ?1 ORDER BY dispense_after",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(DoseSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        dispense_after: row.get(2)?,
                        dispense_before: row.get(3)?,
                        description: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn read(&self, user_id: i64, dose_id: i64) -> Result<DoseDetails, StoreError> {
        self.db.with_conn(|conn| {
            let mut dose = conn
                .query_row(
                    "SELECT id, title, dispense_after, dispense_before, description
                     FROM doses WHERE user_id = ?1 AND id = ?2",
                    [user_id, dose_id],
                    |row| {
                        Ok(DoseDetails {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            dispense_after: row.get(2)?,
                            dispense_before: row.get(3)?,
                            description: row.get(4)?,
                            medications: Vec::new(),
                        })
                    },
                )
                .map_err(|_| StoreError::NotFound(format!("dose {dose_id} for user {user_id}")))?;

            dose.medications = read_dose_medications(conn, dose_id)?;
            Ok(dose)
        })
    }

    pub fn update(&self, user_id: i64, dose_id: i64, updated: &UpdatedDose) -> Result<DoseDetails, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(
                "UPDATE doses SET title = ?1, description = ?2, dispense_after = ?3, dispense_before = ?4
                 WHERE user_id = ?5 AND id = ?6",
                rusqlite::params![
                    updated.title,
                    updated.description,
                    updated.dispense_after,
                    updated.dispense_before,
                    user_id,
                    dose_id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("dose {dose_id} for user {user_id}")));
            }

            tx.execute("DELETE FROM dose_medications WHERE dose_id = ?1", [dose_id])?;
            for medication in &updated.medications {
                tx.execute(
                    "INSERT INTO dose_medications (dose_id, medication_id, amount) VALUES (?1, ?2, ?3)",
                    rusqlite::params![dose_id, medication.medication_id, medication.amount],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        self.read(user_id, dose_id)
    }

    pub fn delete(&self, user_id: i64, dose_id: i64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM doses WHERE user_id = ?1 AND id = ?2",
                [user_id, dose_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("dose {dose_id} for user {user_id}")));
            }
            Ok(())
        })
    }
}

fn read_dose_medications(conn: &Connection, dose_id: i64) -> Result<Vec<DoseMedication>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT dm.amount, m.id, m.title, m.description
         FROM dose_medications dm
         JOIN medications m ON m.id = dm.medication_id
         WHERE dm.dose_id = ?1
         ORDER BY m.id",
    )?;
    let rows = stmt
        .query_map([dose_id], |row| {
            Ok(DoseMedication {
                amount: row.get(0)?,
                medication: MedicationSummary {
                    id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medications::{MedicationRepo, NewMedication};
    use crate::users::{NewUser, UserRepo};

    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let user = UserRepo::new(db.clone())
            .create(&NewUser { name: "alice".into(), role: "patient".into() })
            .unwrap();
        let med = MedicationRepo::new(db.clone())
            .create(&NewMedication { title: "aspirin".into(), description: String::new() })
            .unwrap();
        (db, user.id, med.id)
    }

    fn new_dose(medication_id: i64) -> NewDose {
        NewDose {
            title: "morning".into(),
            description: String::new(),
            dispense_after: "08:00".into(),
            dispense_before: "10:00".into(),
            medications: vec![NewDoseMedication { medication_id, amount: 2 }],
        }
    }

    #[test]
    fn create_reads_back_medications() {
        let (db, user_id, med_id) = setup();
        let repo = DoseRepo::new(db);

        let dose = repo.create(user_id, &new_dose(med_id)).unwrap();
        assert_eq!(dose.title, "morning");
        assert_eq!(dose.medications.len(), 1);
        assert_eq!(dose.medications[0].amount, 2);
        assert_eq!(dose.medications[0].medication.title, "aspirin");
    }

    #[test]
    fn read_scoped_to_user() {
        let (db, user_id, med_id) = setup();
        let other = UserRepo::new(db.clone())
            .create(&NewUser { name: "bob".into(), role: "patient".into() })
            .unwrap();
        let repo = DoseRepo::new(db);

        let dose = repo.create(user_id, &new_dose(med_id)).unwrap();
        assert!(matches!(repo.read(other.id, dose.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn update_replaces_medication_list() {
        let (db, user_id, med_id) = setup();
        let repo = DoseRepo::new(db);

        let dose = repo.create(user_id, &new_dose(med_id)).unwrap();
        let updated = repo
            .update(
                user_id,
                dose.id,
                &UpdatedDose {
                    title: "evening".into(),
                    description: String::new(),
                    dispense_after: "18:00".into(),
                    dispense_before: "20:00".into(),
                    medications: vec![],
                },
            )
            .unwrap();
        assert_eq!(updated.title, "evening");
        assert!(updated.medications.is_empty());
    }

    #[test]
    fn delete_cascades_medication_rows() {
        let (db, user_id, med_id) = setup();
        let repo = DoseRepo::new(db.clone());

        let dose = repo.create(user_id, &new_dose(med_id)).unwrap();
        repo.delete(user_id, dose.id).unwrap();

        let orphans: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM dose_medications", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn list_ordered_by_dispense_window() {
        let (db, user_id, med_id) = setup();
        let repo = DoseRepo::new(db);

        let mut evening = new_dose(med_id);
        evening.title = "evening".into();
        evening.dispense_after = "18:00".into();
        repo.create(user_id, &evening).unwrap();
        repo.create(user_id, &new_dose(med_id)).unwrap();

        let all = repo.list(user_id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "morning");
        assert_eq!(all[1].title, "evening");
    }

    #[test]
    fn dose_wire_shape_is_camel_case() {
        let (db, user_id, med_id) = setup();
        let repo = DoseRepo::new(db);

        let dose = repo.create(user_id, &new_dose(med_id)).unwrap();
        let json = serde_json::to_value(&dose).unwrap();
        assert!(json.get("dispenseAfter").is_some());
        assert!(json.get("dispense_after").is_none());
    }
}
