//! Appointment records and drafts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::AppointmentStatus;

/// Appointment identity with provisional/authoritative support.
///
/// A record created locally carries a provisional UUID until the gateway
/// responds with the server-assigned identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AppointmentId {
    /// Locally generated, not yet acknowledged by the server
    Provisional(String),
    /// Assigned by the server
    Server(String),
}

impl AppointmentId {
    /// Generate a fresh provisional identifier.
    pub fn provisional() -> Self {
        AppointmentId::Provisional(uuid::Uuid::new_v4().to_string())
    }

    /// Check if this identifier was assigned by the server.
    pub fn is_server(&self) -> bool {
        matches!(self, AppointmentId::Server(_))
    }

    /// Raw identifier text.
    pub fn as_str(&self) -> &str {
        match self {
            AppointmentId::Provisional(id) | AppointmentId::Server(id) => id,
        }
    }
}

impl fmt::Display for AppointmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The patient an appointment is booked for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectRef {
    /// Patient ID (None for walk-ins entered by name only)
    pub id: Option<String>,
    /// Display name
    pub name: String,
}

impl SubjectRef {
    pub fn new(id: Option<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Appointment type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentCategory {
    NewPatient,
    FollowUp,
    Consultation,
    TestReview,
    InPerson,
    VideoCall,
    Emergency,
}

impl AppointmentCategory {
    /// Human-readable label (also the wire representation).
    pub fn label(self) -> &'static str {
        match self {
            AppointmentCategory::NewPatient => "New Patient",
            AppointmentCategory::FollowUp => "Follow-up",
            AppointmentCategory::Consultation => "Consultation",
            AppointmentCategory::TestReview => "Test Review",
            AppointmentCategory::InPerson => "In-Person",
            AppointmentCategory::VideoCall => "Video Call",
            AppointmentCategory::Emergency => "Emergency",
        }
    }
}

impl fmt::Display for AppointmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a category string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown appointment category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for AppointmentCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Compare on letters only so "Follow-up", "follow_up" and "FollowUp" agree
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "newpatient" => Ok(AppointmentCategory::NewPatient),
            "followup" => Ok(AppointmentCategory::FollowUp),
            "consultation" => Ok(AppointmentCategory::Consultation),
            "testreview" => Ok(AppointmentCategory::TestReview),
            "inperson" => Ok(AppointmentCategory::InPerson),
            "videocall" => Ok(AppointmentCategory::VideoCall),
            "emergency" => Ok(AppointmentCategory::Emergency),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Local synchronization state of a cached record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Matches the last server response
    #[default]
    Synced,
    /// Optimistic change awaiting the server
    Pending,
    /// Server rejected or never received the optimistic change
    Failed,
}

/// User input for a new appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentDraft {
    pub subject: SubjectRef,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub category: AppointmentCategory,
    pub notes: String,
}

impl AppointmentDraft {
    /// Create a draft with required fields and empty notes.
    pub fn new(
        subject: SubjectRef,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        category: AppointmentCategory,
    ) -> Self {
        Self {
            subject,
            date,
            time,
            duration_minutes,
            category,
            notes: String::new(),
        }
    }

    /// Attach notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Check required fields, returning a displayable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.name.trim().is_empty() {
            return Err("Patient name is required".into());
        }
        if self.duration_minutes == 0 {
            return Err("Duration must be at least one minute".into());
        }
        Ok(())
    }
}

/// A cached appointment record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentRecord {
    pub id: AppointmentId,
    pub subject: SubjectRef,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub category: AppointmentCategory,
    pub status: AppointmentStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Local-only; never sent over the wire
    #[serde(default)]
    pub sync: SyncState,
}

impl AppointmentRecord {
    /// Synthesize a provisional `Scheduled` record from a draft.
    pub fn provisional(draft: AppointmentDraft) -> Self {
        let now = Utc::now();
        Self {
            id: AppointmentId::provisional(),
            subject: draft.subject,
            date: draft.date,
            time: draft.time,
            duration_minutes: draft.duration_minutes,
            category: draft.category,
            status: AppointmentStatus::Scheduled,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
            sync: SyncState::Pending,
        }
    }

    /// Check if this record carries a server-assigned identifier.
    pub fn is_synced(&self) -> bool {
        self.id.is_server() && self.sync == SyncState::Synced
    }

    /// Whether `id` names this record.
    pub fn matches_id(&self, id: &str) -> bool {
        self.id.as_str() == id
    }

    /// Scheduled start as a naive datetime.
    pub fn starts_at(&self) -> chrono::NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Scheduled end (start + duration).
    pub fn ends_at(&self) -> chrono::NaiveDateTime {
        self.starts_at() + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
