//! Labdash Core Library
//!
//! Appointment state for the laboratory dashboard: an optimistic entity cache
//! kept consistent with a remote persistence service.
//!
//! # Architecture
//!
//! ```text
//!   UI action (create / confirm / cancel / reschedule / edit notes)
//!                               │
//!                               ▼
//!                 ┌───────────────────────────┐
//!                 │     AppointmentCache      │──── mark ───▶ HighlightTracker
//!                 │  optimistic local change  │              (5 s window)
//!                 └─────────────┬─────────────┘
//!                               │
//!                    Gateway create / update
//!                               │
//!                 canonical record replaces local
//!                               │
//!                  background load(): full refresh
//!                               │
//!                               ▼
//!            snapshot ──▶ Query pipeline ──▶ displayed list
//!                  (search → status → date → sort)
//! ```
//!
//! # Modules
//!
//! - [`models`]: Domain types (AppointmentRecord, AppointmentStatus, ...)
//! - [`gateway`]: Remote gateway trait, wire format, memory and SQLite gateways
//! - [`db`]: SQLite appointment store
//! - [`cache`]: Optimistic cache and highlight tracker
//! - [`query`]: Search, filter, sort, and status totals
//! - [`config`]: Settings loaded from file and environment
//! - [`logging`]: Tracing subscriber setup

pub mod cache;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod query;

// Re-export commonly used types
pub use cache::{AppointmentCache, CacheError, CacheResult, HighlightTracker, Snapshot};
pub use config::{CacheConfig, FailurePolicy, Settings};
pub use db::Database;
pub use gateway::{Gateway, GatewayError, MemoryGateway, SqliteGateway};
pub use models::{
    AppointmentAction, AppointmentCategory, AppointmentDraft, AppointmentId, AppointmentRecord,
    AppointmentStatus, SubjectRef, SyncState,
};
pub use query::{run_query, QueryState, StatusCounts, StatusFilter};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

use tokio::runtime::Runtime;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum LabdashError {
    #[error("Network error: {0}")]
    GatewayError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Missing reason: {0}")]
    MissingReason(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

impl From<CacheError> for LabdashError {
    fn from(e: CacheError) -> Self {
        let message = e.to_string();
        match e {
            CacheError::Gateway(_) => LabdashError::GatewayError(message),
            CacheError::InvalidTransition { .. }
            | CacheError::NotEditable { .. }
            | CacheError::NotSynced(_) => LabdashError::InvalidTransition(message),
            CacheError::MissingReason => LabdashError::MissingReason(message),
            CacheError::NotFound(_) => LabdashError::NotFound(message),
            CacheError::InvalidDraft(_) => LabdashError::InvalidInput(message),
        }
    }
}

impl From<GatewayError> for LabdashError {
    fn from(e: GatewayError) -> Self {
        LabdashError::GatewayError(e.to_string())
    }
}

impl From<std::io::Error> for LabdashError {
    fn from(e: std::io::Error) -> Self {
        LabdashError::RuntimeError(e.to_string())
    }
}

impl From<anyhow::Error> for LabdashError {
    fn from(e: anyhow::Error) -> Self {
        LabdashError::RuntimeError(format!("{:#}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create an appointment store at the given path.
#[uniffi::export]
pub fn open_dashboard(path: String) -> Result<Arc<DashboardCore>, LabdashError> {
    DashboardCore::start(SqliteGateway::open(&path)?, CacheConfig::default())
}

/// Create an in-memory appointment store (for testing).
#[uniffi::export]
pub fn open_dashboard_in_memory() -> Result<Arc<DashboardCore>, LabdashError> {
    DashboardCore::start(SqliteGateway::open_in_memory()?, CacheConfig::default())
}

/// Open a store using `labdash.toml` and `LABDASH_*` settings, and install logging.
#[uniffi::export]
pub fn open_dashboard_from_settings() -> Result<Arc<DashboardCore>, LabdashError> {
    let settings = Settings::load()?;
    logging::init(&settings.logging);
    let gateway = match &settings.database.path {
        Some(path) => SqliteGateway::open(path)?,
        None => SqliteGateway::open_in_memory()?,
    };
    DashboardCore::start(gateway, settings.cache)
}

// =========================================================================
// Main API Object
// =========================================================================

/// Blocking facade over the cache for UI bindings.
///
/// Owns the runtime that drives gateway calls, background refreshes and
/// highlight timers.
#[derive(uniffi::Object)]
pub struct DashboardCore {
    runtime: Runtime,
    cache: AppointmentCache<SqliteGateway>,
}

impl DashboardCore {
    fn start(gateway: SqliteGateway, config: CacheConfig) -> Result<Arc<Self>, LabdashError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("labdash-core")
            .enable_all()
            .build()?;
        let cache = AppointmentCache::new(gateway, config);
        runtime.block_on(cache.load())?;
        Ok(Arc::new(Self { runtime, cache }))
    }

    fn to_ffi(&self, record: AppointmentRecord) -> FfiAppointment {
        let highlighted = self.cache.is_highlighted(record.id.as_str());
        FfiAppointment::new(record, highlighted)
    }
}

#[uniffi::export]
impl DashboardCore {
    // =========================================================================
    // Reads
    // =========================================================================

    /// Filtered, sorted appointments for display.
    pub fn query_appointments(&self, query: FfiQuery) -> Result<Vec<FfiAppointment>, LabdashError> {
        let query = QueryState::try_from(query)?;
        Ok(self
            .cache
            .query(&query)
            .into_iter()
            .map(|r| self.to_ffi(r))
            .collect())
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: String) -> Option<FfiAppointment> {
        self.cache.get(&id).map(|r| self.to_ffi(r))
    }

    /// Totals per status for dashboard cards.
    pub fn status_counts(&self) -> FfiStatusCounts {
        self.cache.status_counts().into()
    }

    /// Check if an appointment was just created.
    pub fn is_highlighted(&self, id: String) -> bool {
        self.cache.is_highlighted(&id)
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Reload everything from the store.
    pub fn refresh(&self) -> Result<u32, LabdashError> {
        let snapshot = self.runtime.block_on(self.cache.load())?;
        Ok(snapshot.len() as u32)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Book a new appointment.
    pub fn create_appointment(
        &self,
        draft: FfiAppointmentDraft,
    ) -> Result<FfiAppointment, LabdashError> {
        let draft = AppointmentDraft::try_from(draft)?;
        let record = self.runtime.block_on(self.cache.create(draft))?;
        Ok(self.to_ffi(record))
    }

    /// Confirm a pending appointment.
    pub fn confirm_appointment(
        &self,
        id: String,
        note: Option<String>,
    ) -> Result<FfiAppointment, LabdashError> {
        let record = self
            .runtime
            .block_on(self.cache.confirm(&id, note.as_deref()))?;
        Ok(self.to_ffi(record))
    }

    /// Cancel an appointment with a reason.
    pub fn cancel_appointment(
        &self,
        id: String,
        reason: String,
    ) -> Result<FfiAppointment, LabdashError> {
        let record = self.runtime.block_on(self.cache.cancel(&id, &reason))?;
        Ok(self.to_ffi(record))
    }

    /// Move an appointment to a new date (`YYYY-MM-DD`) and time (`HH:MM`).
    pub fn reschedule_appointment(
        &self,
        id: String,
        date: String,
        time: String,
    ) -> Result<FfiAppointment, LabdashError> {
        let date = gateway::parse_wire_date(&date)
            .ok_or_else(|| LabdashError::InvalidInput(format!("Invalid date: {}", date)))?;
        let time = gateway::parse_wire_time(&time)
            .ok_or_else(|| LabdashError::InvalidInput(format!("Invalid time: {}", time)))?;
        let record = self
            .runtime
            .block_on(self.cache.reschedule(&id, date, time))?;
        Ok(self.to_ffi(record))
    }

    /// Replace an appointment's notes.
    pub fn update_notes(&self, id: String, notes: String) -> Result<FfiAppointment, LabdashError> {
        let record = self
            .runtime
            .block_on(self.cache.update_notes(&id, &notes))?;
        Ok(self.to_ffi(record))
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub is_provisional: bool,
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub date: String,
    pub time: String,
    /// Scheduled end, `HH:MM`
    pub end_time: String,
    pub duration_minutes: u32,
    pub category: String,
    pub status: String,
    pub status_label: String,
    pub notes: String,
    pub created_at: String,
    pub updated_at: String,
    pub sync_failed: bool,
    pub highlighted: bool,
    pub allowed_actions: Vec<String>,
}

impl FfiAppointment {
    fn new(record: AppointmentRecord, highlighted: bool) -> Self {
        let allowed_actions = if record.id.is_server() {
            record
                .status
                .allowed_actions()
                .into_iter()
                .map(|a| format!("{:?}", a))
                .collect()
        } else {
            Vec::new()
        };
        let end_time = record.ends_at().format(gateway::WIRE_TIME_FORMAT).to_string();
        Self {
            id: record.id.to_string(),
            is_provisional: !record.id.is_server(),
            patient_id: record.subject.id,
            patient_name: record.subject.name,
            date: record.date.format(gateway::WIRE_DATE_FORMAT).to_string(),
            time: record.time.format(gateway::WIRE_TIME_FORMAT).to_string(),
            end_time,
            duration_minutes: record.duration_minutes,
            category: record.category.label().to_string(),
            status: record.status.as_str().to_string(),
            status_label: record.status.label().to_string(),
            notes: record.notes,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
            sync_failed: record.sync == SyncState::Failed,
            highlighted,
            allowed_actions,
        }
    }
}

/// FFI-safe appointment draft.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointmentDraft {
    pub patient_id: Option<String>,
    pub patient_name: String,
    pub date: String,
    pub time: String,
    pub duration_minutes: u32,
    pub category: String,
    pub notes: String,
}

impl TryFrom<FfiAppointmentDraft> for AppointmentDraft {
    type Error = LabdashError;

    fn try_from(draft: FfiAppointmentDraft) -> Result<Self, Self::Error> {
        let date = gateway::parse_wire_date(&draft.date)
            .ok_or_else(|| LabdashError::InvalidInput(format!("Invalid date: {}", draft.date)))?;
        let time = gateway::parse_wire_time(&draft.time)
            .ok_or_else(|| LabdashError::InvalidInput(format!("Invalid time: {}", draft.time)))?;
        let category = draft
            .category
            .parse()
            .map_err(|e: models::UnknownCategory| LabdashError::InvalidInput(e.to_string()))?;

        Ok(AppointmentDraft::new(
            SubjectRef::new(draft.patient_id, draft.patient_name),
            date,
            time,
            draft.duration_minutes,
            category,
        )
        .with_notes(draft.notes))
    }
}

/// FFI-safe query parameters.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiQuery {
    pub search: String,
    /// Status name, or "all"
    pub status: String,
    /// `YYYY-MM-DD`, or None for every day
    pub date: Option<String>,
}

impl TryFrom<FfiQuery> for QueryState {
    type Error = LabdashError;

    fn try_from(query: FfiQuery) -> Result<Self, Self::Error> {
        let status: StatusFilter = query
            .status
            .parse()
            .map_err(|e: models::UnknownStatus| LabdashError::InvalidInput(e.to_string()))?;
        let date = query
            .date
            .map(|d| {
                gateway::parse_wire_date(&d)
                    .ok_or_else(|| LabdashError::InvalidInput(format!("Invalid date: {}", d)))
            })
            .transpose()?;

        Ok(QueryState {
            search: query.search,
            status,
            date,
        })
    }
}

/// FFI-safe status totals.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatusCounts {
    pub total: u32,
    pub scheduled: u32,
    pub confirmed: u32,
    pub cancelled: u32,
    pub completed: u32,
}

impl From<StatusCounts> for FfiStatusCounts {
    fn from(counts: StatusCounts) -> Self {
        Self {
            total: counts.total as u32,
            scheduled: counts.scheduled as u32,
            confirmed: counts.confirmed as u32,
            cancelled: counts.cancelled as u32,
            completed: counts.completed as u32,
        }
    }
}
