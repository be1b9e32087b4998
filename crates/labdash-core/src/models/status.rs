//! Appointment status model and legal transitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Appointment lifecycle status.
///
/// ```text
/// Scheduled ──confirm──▶ Confirmed ──(complete)──▶ Completed
///     │                      │
///     └──────cancel──────────┴──────▶ Cancelled
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, pending confirmation
    Scheduled,
    /// Confirmed by staff
    Confirmed,
    /// Cancelled with a reason
    Cancelled,
    /// Visit took place
    Completed,
}

/// A UI action that may be offered for an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    Confirm,
    Cancel,
    Reschedule,
    EditNotes,
}

impl AppointmentStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
    ];

    /// Check whether moving from `self` to `target` is a legal transition.
    pub fn can_transition_to(self, target: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, target),
            (Scheduled, Confirmed)
                | (Scheduled, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
        )
    }

    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::Completed
        )
    }

    /// Whether the date/time may still be moved.
    pub fn is_reschedulable(self) -> bool {
        !self.is_terminal()
    }

    /// Whether free-text notes may still be edited.
    pub fn accepts_note_edits(self) -> bool {
        self != AppointmentStatus::Cancelled
    }

    /// Actions the presentation layer should offer for this status.
    ///
    /// Confirm is only offered while scheduled; cancel is hidden once the
    /// appointment is cancelled or completed.
    pub fn allowed_actions(self) -> Vec<AppointmentAction> {
        let mut actions = Vec::new();
        if self.can_transition_to(AppointmentStatus::Confirmed) {
            actions.push(AppointmentAction::Confirm);
        }
        if self.can_transition_to(AppointmentStatus::Cancelled) {
            actions.push(AppointmentAction::Cancel);
        }
        if self.is_reschedulable() {
            actions.push(AppointmentAction::Reschedule);
        }
        if self.accepts_note_edits() {
            actions.push(AppointmentAction::EditNotes);
        }
        actions
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::Completed => "Completed",
        }
    }

    /// Canonical wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown appointment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for AppointmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "scheduled" | "pending" => Ok(AppointmentStatus::Scheduled),
            "confirmed" | "approved" => Ok(AppointmentStatus::Confirmed),
            // A no-show never happened and is read-only, like a cancellation
            "cancelled" | "canceled" | "rejected" | "noshow" => Ok(AppointmentStatus::Cancelled),
            "completed" => Ok(AppointmentStatus::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}
