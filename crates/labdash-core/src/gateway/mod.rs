//! Remote gateway boundary.
//!
//! The persistence service is an external collaborator. This module defines
//! the three operations the cache relies on, the flat wire record the service
//! speaks, and the validation that turns wire records into typed
//! [`AppointmentRecord`]s.

mod memory;
mod sqlite;
mod wire;

pub use memory::*;
pub use sqlite::*;
pub use wire::*;

use std::future::Future;

use thiserror::Error;

/// Gateway errors. All of them are recoverable by a later user-driven retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server rejected request: {0}")]
    Rejected(String),

    #[error("Malformed record from server: {0}")]
    Malformed(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Create/read/update access to the authoritative appointment store.
///
/// Every operation returns the canonical representation persisted by the
/// service, including server-assigned identifiers and timestamps.
pub trait Gateway: Send + Sync + 'static {
    /// Fetch every appointment visible to the caller.
    fn list(&self) -> impl Future<Output = GatewayResult<Vec<WireAppointment>>> + Send;

    /// Persist a new appointment.
    fn create(
        &self,
        input: WireAppointmentInput,
    ) -> impl Future<Output = GatewayResult<WireAppointment>> + Send;

    /// Replace an existing appointment.
    fn update(
        &self,
        id: String,
        input: WireAppointmentInput,
    ) -> impl Future<Output = GatewayResult<WireAppointment>> + Send;
}
