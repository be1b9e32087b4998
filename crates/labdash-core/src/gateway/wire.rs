//! Flat wire records exchanged with the persistence service.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::GatewayError;
use crate::models::{
    AppointmentCategory, AppointmentDraft, AppointmentId, AppointmentRecord, AppointmentStatus,
    SubjectRef, SyncState,
};

/// Date format on the wire.
pub const WIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Time format written to the wire.
pub const WIRE_TIME_FORMAT: &str = "%H:%M";

/// Accepted time formats, tried in order.
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M", "%I:%M %p"];

/// Server identifier, which may arrive as an integer or a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum WireId {
    Int(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Int(id) => write!(f, "{}", id),
            WireId::Text(id) => f.write_str(id),
        }
    }
}

/// A persisted appointment as returned by the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireAppointment {
    pub id: WireId,
    #[serde(default)]
    pub patient_id: Option<WireId>,
    pub patient_name: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    #[serde(rename = "type")]
    pub category: String,
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for create/update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireAppointmentInput {
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    #[serde(rename = "type")]
    pub category: String,
    pub status: String,
    pub notes: String,
}

impl From<&AppointmentDraft> for WireAppointmentInput {
    fn from(draft: &AppointmentDraft) -> Self {
        Self {
            patient_id: draft.subject.id.clone(),
            patient_name: draft.subject.name.clone(),
            date: draft.date.format(WIRE_DATE_FORMAT).to_string(),
            time: draft.time.format(WIRE_TIME_FORMAT).to_string(),
            duration: draft.duration_minutes,
            category: draft.category.label().to_string(),
            status: AppointmentStatus::Scheduled.as_str().to_string(),
            notes: draft.notes.clone(),
        }
    }
}

impl From<&AppointmentRecord> for WireAppointmentInput {
    fn from(record: &AppointmentRecord) -> Self {
        Self {
            patient_id: record.subject.id.clone(),
            patient_name: record.subject.name.clone(),
            date: record.date.format(WIRE_DATE_FORMAT).to_string(),
            time: record.time.format(WIRE_TIME_FORMAT).to_string(),
            duration: record.duration_minutes,
            category: record.category.label().to_string(),
            status: record.status.as_str().to_string(),
            notes: record.notes.clone(),
        }
    }
}

impl TryFrom<WireAppointment> for AppointmentRecord {
    type Error = GatewayError;

    fn try_from(wire: WireAppointment) -> Result<Self, Self::Error> {
        let id = wire.id.to_string();
        let malformed = |field: &str, value: &str| {
            GatewayError::Malformed(format!("appointment {}: invalid {} '{}'", id, field, value))
        };

        if wire.patient_name.trim().is_empty() {
            return Err(malformed("patient_name", &wire.patient_name));
        }
        let date = parse_wire_date(&wire.date).ok_or_else(|| malformed("date", &wire.date))?;
        let time = parse_wire_time(&wire.time).ok_or_else(|| malformed("time", &wire.time))?;
        let category: AppointmentCategory = wire
            .category
            .parse()
            .map_err(|_| malformed("type", &wire.category))?;
        let status: AppointmentStatus = wire
            .status
            .parse()
            .map_err(|_| malformed("status", &wire.status))?;
        let created_at = parse_wire_timestamp(&wire.created_at)
            .ok_or_else(|| malformed("created_at", &wire.created_at))?;
        let updated_at = parse_wire_timestamp(&wire.updated_at)
            .ok_or_else(|| malformed("updated_at", &wire.updated_at))?;

        Ok(AppointmentRecord {
            id: AppointmentId::Server(id),
            subject: SubjectRef::new(wire.patient_id.map(|p| p.to_string()), wire.patient_name),
            date,
            time,
            duration_minutes: wire.duration,
            category,
            status,
            notes: wire.notes.unwrap_or_default(),
            created_at,
            updated_at,
            sync: SyncState::Synced,
        })
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_wire_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), WIRE_DATE_FORMAT).ok()
}

/// Parse `HH:MM`, `HH:MM:SS` or `hh:mm AM/PM`.
pub fn parse_wire_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_wire_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
