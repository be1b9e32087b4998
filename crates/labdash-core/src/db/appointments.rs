//! Appointment database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::gateway::{WireAppointment, WireAppointmentInput, WireId};
use crate::models::AppointmentStatus;

const SELECT_COLUMNS: &str = r#"
    SELECT id, patient_id, patient_name, date, time, duration,
           type, status, notes, created_at, updated_at
    FROM appointments
"#;

impl Database {
    /// Insert a new appointment, returning the stored row with its assigned ID.
    pub fn insert_appointment(&self, input: &WireAppointmentInput) -> DbResult<WireAppointment> {
        let status = canonical_status(&input.status)?;
        let now = chrono::Utc::now().to_rfc3339();

        self.conn.execute(
            r#"
            INSERT INTO appointments (
                patient_id, patient_name, date, time, duration,
                type, status, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                input.patient_id,
                input.patient_name,
                input.date,
                input.time,
                input.duration,
                input.category,
                status,
                input.notes,
                now,
                now,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        self.get_appointment(id)?
            .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    /// Replace an existing appointment. Returns `None` if the ID is unknown.
    pub fn update_appointment(
        &self,
        id: i64,
        input: &WireAppointmentInput,
    ) -> DbResult<Option<WireAppointment>> {
        let status = canonical_status(&input.status)?;
        let now = chrono::Utc::now().to_rfc3339();

        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                patient_id = ?2,
                patient_name = ?3,
                date = ?4,
                time = ?5,
                duration = ?6,
                type = ?7,
                status = ?8,
                notes = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                id,
                input.patient_id,
                input.patient_name,
                input.date,
                input.time,
                input.duration,
                input.category,
                status,
                input.notes,
                now,
            ],
        )?;

        if rows_affected == 0 {
            return Ok(None);
        }
        self.get_appointment(id)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: i64) -> DbResult<Option<WireAppointment>> {
        self.conn
            .query_row(&format!("{} WHERE id = ?", SELECT_COLUMNS), [id], map_row)
            .optional()
            .map_err(Into::into)
    }

    /// List all appointments in insertion order.
    pub fn list_appointments(&self) -> DbResult<Vec<WireAppointment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY id ASC", SELECT_COLUMNS))?;
        let rows = stmt.query_map([], map_row)?;

        let mut appointments = Vec::new();
        for row in rows {
            appointments.push(row?);
        }
        Ok(appointments)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<WireAppointment> {
    let patient_id: Option<String> = row.get(1)?;
    let notes: String = row.get(8)?;
    Ok(WireAppointment {
        id: WireId::Int(row.get(0)?),
        patient_id: patient_id.map(WireId::Text),
        patient_name: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        duration: row.get(5)?,
        category: row.get(6)?,
        status: row.get(7)?,
        notes: Some(notes),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn canonical_status(s: &str) -> DbResult<&'static str> {
    s.parse::<AppointmentStatus>()
        .map(AppointmentStatus::as_str)
        .map_err(|e| DbError::Constraint(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_input(name: &str, date: &str, time: &str) -> WireAppointmentInput {
        WireAppointmentInput {
            patient_id: Some("P001".into()),
            patient_name: name.into(),
            date: date.into(),
            time: time.into(),
            duration: 30,
            category: "Follow-up".into(),
            status: "Pending".into(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_insert_and_get_appointment() {
        let db = Database::open_in_memory().unwrap();
        let stored = db
            .insert_appointment(&make_input("John Smith", "2025-01-22", "09:00"))
            .unwrap();

        assert_eq!(stored.id, WireId::Int(1));
        assert_eq!(stored.status, "scheduled");
        assert_eq!(stored.notes.as_deref(), Some(""));

        let fetched = db.get_appointment(1).unwrap().unwrap();
        assert_eq!(fetched, stored);
    }

    #[test]
    fn test_update_appointment() {
        let db = Database::open_in_memory().unwrap();
        db.insert_appointment(&make_input("John Smith", "2025-01-22", "09:00"))
            .unwrap();

        let mut input = make_input("John Smith", "2025-01-22", "09:00");
        input.status = "confirmed".into();
        input.notes = "Bring results".into();
        let updated = db.update_appointment(1, &input).unwrap().unwrap();

        assert_eq!(updated.status, "confirmed");
        assert_eq!(updated.notes.as_deref(), Some("Bring results"));
        assert!(db.update_appointment(99, &input).unwrap().is_none());
    }

    #[test]
    fn test_unknown_status_is_constraint_error() {
        let db = Database::open_in_memory().unwrap();
        let mut input = make_input("John Smith", "2025-01-22", "09:00");
        input.status = "archived".into();
        assert!(matches!(
            db.insert_appointment(&input),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_list_appointments_in_id_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_appointment(&make_input("Late", "2025-01-22", "15:30"))
            .unwrap();
        db.insert_appointment(&make_input("Other day", "2025-01-23", "08:00"))
            .unwrap();
        db.insert_appointment(&make_input("Early", "2025-01-22", "09:00"))
            .unwrap();

        let all = db.list_appointments().unwrap();
        let names: Vec<_> = all.iter().map(|a| a.patient_name.as_str()).collect();
        assert_eq!(names, vec!["Late", "Other day", "Early"]);
        assert_eq!(all[2].id, WireId::Int(3));
    }
}
