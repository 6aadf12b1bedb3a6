use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::error::StoreError;

/// Minimal id/title reference to another entity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinimalEntity {
    pub id: i64,
    pub title: String,
}

/// A to-be inserted dose history entry (one dispense).
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoseHistoryEntry {
    pub dose_id: i64,
    pub dispensed_day: String,
    pub dispensed_time: String,
}

/// A recorded dispense of a dose.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseHistoryEntry {
    pub id: i64,
    pub dispensed_day: String,
    pub dispensed_time: String,
    pub dose: MinimalEntity,
}

/// Per-day dispense counts for one user.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseDaySummary {
    pub date: String,
    pub dispensed_count: i64,
    pub pending_count: i64,
    pub total_count: i64,
}

/// Status of one dose on one day.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseStatus {
    pub dispensed_time: String,
    pub dispensed: bool,
    pub pending: bool,
    pub dose: MinimalEntity,
}

pub struct DoseHistoryRepo {
    db: Database,
}

impl DoseHistoryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a dispense. The dose must belong to the given user.
    pub fn create(&self, user_id: i64, new: &NewDoseHistoryEntry) -> Result<DoseHistoryEntry, StoreError> {
        let id = self.db.with_conn(|conn| {
            let owned: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM doses WHERE id = ?1 AND user_id = ?2",
                    [new.dose_id, user_id],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            if owned == 0 {
                return Err(StoreError::NotFound(format!(
                    "dose {} for user {user_id}",
                    new.dose_id
                )));
            }

            conn.execute(
                "INSERT INTO dose_history (dose_id, dispensed_day, dispensed_time) VALUES (?1, ?2, ?3)",
                rusqlite::params![new.dose_id, new.dispensed_day, new.dispensed_time],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        self.read(user_id, id)
    }

    pub fn read(&self, user_id: i64, entry_id: i64) -> Result<DoseHistoryEntry, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT dh.id, dh.dispensed_day, dh.dispensed_time, d.id, d.title
                 FROM dose_history dh
                 JOIN doses d ON d.id = dh.dose_id
                 WHERE d.user_id = ?1 AND dh.id = ?2",
                [user_id, entry_id],
                |row| {
                    Ok(DoseHistoryEntry {
                        id: row.get(0)?,
                        dispensed_day: row.get(1)?,
                        dispensed_time: row.get(2)?,
                        dose: MinimalEntity {
                            id: row.get(3)?,
                            title: row.get(4)?,
                        },
                    })
                },
            )
            .map_err(|_| StoreError::NotFound(format!("dose history entry {entry_id} for user {user_id}")))
        })
    }

    pub fn list(&self, user_id: i64) -> Result<Vec<DoseHistoryEntry>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dh.id, dh.dispensed_day, dh.dispensed_time, d.id, d.title
                 FROM dose_history dh
                 JOIN doses d ON d.id = dh.dose_id
                 WHERE d.user_id = ?1
                 ORDER BY dh.dispensed_day DESC, dh.dispensed_time DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(DoseHistoryEntry {
                        id: row.get(0)?,
                        dispensed_day: row.get(1)?,
                        dispensed_time: row.get(2)?,
                        dose: MinimalEntity {
                            id: row.get(3)?,
                            title: row.get(4)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Per-day dispense summaries for a user, most recent day first.
    /// Pending doses only exist for the current day.
    pub fn summaries(&self, user_id: i64) -> Result<Vec<DoseDaySummary>, StoreError> {
        let today = Utc::now().date_naive().to_string();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT dh.dispensed_day,
                        COUNT(DISTINCT dh.dose_id),
                        (SELECT COUNT(*) FROM doses d2
                         WHERE d2.user_id = ?1 AND DATE(d2.created_on) <= dh.dispensed_day)
                 FROM dose_history dh
                 JOIN doses d ON d.id = dh.dose_id
                 WHERE d.user_id = ?1
                 GROUP BY dh.dispensed_day
                 ORDER BY dh.dispensed_day DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let summaries = rows
                .into_iter()
                .map(|(date, dispensed_count, total_count)| {
                    let pending_count = if date == today {
                        total_count - dispensed_count
                    } else {
                        0
                    };
                    DoseDaySummary {
                        date,
                        dispensed_count,
                        pending_count,
                        total_count,
                    }
                })
                .collect();
            Ok(summaries)
        })
    }

    /// Status of each of a user's doses on the given day.
    pub fn statuses(&self, user_id: i64, date: &str) -> Result<Vec<DoseStatus>, StoreError> {
        let today = Utc::now().date_naive().to_string();
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id, d.title, IFNULL(dh.dispensed_time, ''), dh.id IS NOT NULL
                 FROM doses d
                 LEFT JOIN dose_history dh ON dh.dose_id = d.id AND dh.dispensed_day = ?2
                 WHERE d.user_id = ?1 AND DATE(d.created_on) <= ?2
                 ORDER BY d.dispense_after",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, date], |row| {
                    Ok(DoseStatus {
                        dose: MinimalEntity {
                            id: row.get(0)?,
                            title: row.get(1)?,
                        },
                        dispensed_time: row.get(2)?,
                        dispensed: row.get(3)?,
                        pending: false,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let statuses = rows
                .into_iter()
                .map(|mut status| {
                    status.pending = !status.dispensed && date == today;
                    status
                })
                .collect();
            Ok(statuses)
        })
    }
}
