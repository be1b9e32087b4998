//! Per-status totals for dashboard cards.

use serde::{Deserialize, Serialize};

use crate::models::{AppointmentRecord, AppointmentStatus};

/// Appointment counts by status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub scheduled: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub completed: usize,
}

impl StatusCounts {
    /// Count every record in a snapshot.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AppointmentRecord>) -> Self {
        records
            .into_iter()
            .fold(Self::default(), |mut counts, record| {
                counts.total += 1;
                match record.status {
                    AppointmentStatus::Scheduled => counts.scheduled += 1,
                    AppointmentStatus::Confirmed => counts.confirmed += 1,
                    AppointmentStatus::Cancelled => counts.cancelled += 1,
                    AppointmentStatus::Completed => counts.completed += 1,
                }
                counts
            })
    }

    pub fn get(&self, status: AppointmentStatus) -> usize {
        match status {
            AppointmentStatus::Scheduled => self.scheduled,
            AppointmentStatus::Confirmed => self.confirmed,
            AppointmentStatus::Cancelled => self.cancelled,
            AppointmentStatus::Completed => self.completed,
        }
    }
}
