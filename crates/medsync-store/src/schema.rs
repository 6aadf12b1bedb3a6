/// SQL DDL for the medsync database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'patient',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS doses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    dispense_after TEXT NOT NULL,
    dispense_before TEXT NOT NULL,
    created_on TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS dose_medications (
    dose_id INTEGER NOT NULL REFERENCES doses(id) ON DELETE CASCADE,
    medication_id INTEGER NOT NULL REFERENCES medications(id),
    amount INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dose_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dose_id INTEGER NOT NULL REFERENCES doses(id) ON DELETE CASCADE,
    dispensed_day TEXT NOT NULL,
    dispensed_time TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_doses_user ON doses(user_id);
CREATE INDEX IF NOT EXISTS idx_dose_medications_dose ON dose_medications(dose_id);
CREATE INDEX IF NOT EXISTS idx_dose_history_dose ON dose_history(dose_id);
CREATE INDEX IF NOT EXISTS idx_dose_history_day ON dose_history(dispensed_day);
"#;
