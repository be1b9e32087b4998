//! SQLite schema definition.

/// Complete database schema for the appointment store.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT,                             -- NULL for walk-ins
    patient_name TEXT NOT NULL,
    date TEXT NOT NULL,                          -- YYYY-MM-DD
    time TEXT NOT NULL,                          -- HH:MM
    duration INTEGER NOT NULL CHECK (duration >= 0),
    type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'confirmed', 'cancelled', 'completed')),
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(date, time);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);
CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);
"#;
