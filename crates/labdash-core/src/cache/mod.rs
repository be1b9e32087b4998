//! Optimistic appointment cache.
//!
//! # Flow
//!
//! ```text
//! user action ──▶ validate ──▶ apply locally (visible now)
//!                                   │
//!                                   ▼
//!                           Gateway create/update
//!                             │              │
//!                          success        failure
//!                             │              │
//!              replace with canonical    Keep: mark Failed
//!              record, spawn refresh     Rollback: undo
//!                             │
//!                             ▼
//!                   load(): replace everything
//! ```
//!
//! Refreshes carry a generation number; a response older than the last
//! applied one is discarded. Local writes count as applied, so a refresh
//! issued before a write can never overwrite it.

mod highlight;

pub use highlight::*;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, FailurePolicy};
use crate::gateway::{Gateway, GatewayError, WireAppointmentInput};
use crate::models::{
    AppointmentDraft, AppointmentId, AppointmentRecord, AppointmentStatus, SyncState,
};
use crate::query::{run_query, QueryState, StatusCounts};

/// Cache errors. Each renders as a message suitable for direct display.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Cannot change appointment from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("A reason is required to cancel an appointment")]
    MissingReason,

    #[error("Appointment not found: {0}")]
    NotFound(String),

    #[error("Appointment {id} is {} and can no longer be changed", .status.label())]
    NotEditable {
        id: String,
        status: AppointmentStatus,
    },

    #[error("Appointment {0} is still being saved")]
    NotSynced(String),

    #[error("Invalid appointment: {0}")]
    InvalidDraft(String),
}

impl CacheError {
    /// Coarse error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::Gateway(_) => "gateway",
            CacheError::InvalidTransition { .. } => "invalid_transition",
            CacheError::MissingReason => "missing_reason",
            CacheError::NotFound(_) => "not_found",
            CacheError::NotEditable { .. } => "not_editable",
            CacheError::NotSynced(_) => "not_synced",
            CacheError::InvalidDraft(_) => "invalid_draft",
        }
    }

    /// Whether retrying the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheError::Gateway(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Immutable view of the cached collection.
pub type Snapshot = Arc<Vec<AppointmentRecord>>;

#[derive(Default)]
struct CacheState {
    records: Snapshot,
    issued_generation: u64,
    applied_generation: u64,
}

impl CacheState {
    /// Mark every refresh issued so far as stale.
    fn supersede_loads(&mut self) {
        self.applied_generation = self.issued_generation;
    }
}

struct Inner<G> {
    gateway: G,
    config: CacheConfig,
    state: Mutex<CacheState>,
    highlights: HighlightTracker,
    refreshes: Mutex<Vec<JoinHandle<()>>>,
}

/// Single-writer appointment cache over a [`Gateway`].
///
/// Cloning is cheap and every clone shares the same collection. All
/// mutations apply locally before the gateway call is awaited, so reads
/// observe them immediately. Async operations must run inside a Tokio
/// runtime.
pub struct AppointmentCache<G> {
    inner: Arc<Inner<G>>,
}

impl<G> Clone for AppointmentCache<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: Gateway> AppointmentCache<G> {
    /// Create an empty cache. Call [`load`](Self::load) to populate it.
    pub fn new(gateway: G, config: CacheConfig) -> Self {
        let highlights = HighlightTracker::new(config.highlight_window());
        Self {
            inner: Arc::new(Inner {
                gateway,
                config,
                state: Mutex::new(CacheState::default()),
                highlights,
                refreshes: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn highlights(&self) -> &HighlightTracker {
        &self.inner.highlights
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Current collection, newest optimistic inserts first.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.state().records)
    }

    /// Look a record up by provisional or server ID.
    pub fn get(&self, id: &str) -> Option<AppointmentRecord> {
        self.state()
            .records
            .iter()
            .find(|r| r.matches_id(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    /// Check whether `id` was created within the highlight window.
    pub fn is_highlighted(&self, id: &str) -> bool {
        self.inner.highlights.is_highlighted(id)
    }

    /// Run the query pipeline over the current snapshot.
    pub fn query(&self, query: &QueryState) -> Vec<AppointmentRecord> {
        run_query(&self.snapshot(), query)
    }

    /// Totals per status over the whole collection.
    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_records(self.snapshot().iter())
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Replace the collection with the gateway's list.
    ///
    /// On failure the previous collection is left untouched. A response that
    /// arrives after a newer refresh has been applied is discarded and the
    /// current collection is returned instead.
    pub async fn load(&self) -> CacheResult<Snapshot> {
        let generation = {
            let mut state = self.state();
            state.issued_generation += 1;
            state.issued_generation
        };
        debug!(generation, "Refreshing appointments");

        let wire = self.inner.gateway.list().await.map_err(|e| {
            warn!(generation, error = %e, "Refresh failed; keeping cached appointments");
            CacheError::from(e)
        })?;
        let records = wire
            .into_iter()
            .map(AppointmentRecord::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!(generation, error = %e, "Refresh returned malformed data");
                CacheError::from(e)
            })?;

        let mut state = self.state();
        if generation <= state.applied_generation {
            debug!(
                generation,
                applied = state.applied_generation,
                "Discarding stale refresh"
            );
            return Ok(Arc::clone(&state.records));
        }

        info!(generation, count = records.len(), "Applied refresh");
        state.applied_generation = generation;
        state.records = Arc::new(records);
        Ok(Arc::clone(&state.records))
    }

    /// Wait for every background refresh spawned so far.
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *lock(&self.inner.refreshes));
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background refresh task failed");
                }
            }
        }
    }

    fn schedule_refresh(&self) {
        if !self.inner.config.refresh_after_mutation {
            return;
        }
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            // Errors are already logged by load(); the cached state stays put
            let _ = cache.load().await;
        });

        let mut refreshes = lock(&self.inner.refreshes);
        refreshes.retain(|h| !h.is_finished());
        refreshes.push(handle);
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert a provisional `Scheduled` record, then persist it.
    ///
    /// The provisional record is visible (and highlighted) before the gateway
    /// responds. On success it is replaced by the canonical record.
    pub async fn create(&self, draft: AppointmentDraft) -> CacheResult<AppointmentRecord> {
        draft.validate().map_err(CacheError::InvalidDraft)?;

        let input = WireAppointmentInput::from(&draft);
        let provisional = AppointmentRecord::provisional(draft);
        let provisional_id = provisional.id.clone();
        {
            let mut state = self.state();
            Arc::make_mut(&mut state.records).insert(0, provisional);
            state.supersede_loads();
        }
        self.inner.highlights.mark(provisional_id.as_str());
        debug!(appointment_id = %provisional_id, "Inserted provisional appointment");

        let result = match self.inner.gateway.create(input).await {
            Ok(wire) => AppointmentRecord::try_from(wire).map_err(CacheError::from),
            Err(e) => Err(CacheError::from(e)),
        };

        match result {
            Ok(confirmed) => {
                self.confirm_created(&provisional_id, confirmed.clone());
                info!(
                    provisional_id = %provisional_id,
                    appointment_id = %confirmed.id,
                    "Appointment created"
                );
                self.schedule_refresh();
                Ok(confirmed)
            }
            Err(e) => {
                warn!(appointment_id = %provisional_id, error = %e, "Create failed");
                self.handle_create_failure(&provisional_id);
                Err(e)
            }
        }
    }

    /// Move a record to `target`.
    ///
    /// Cancelling requires a non-empty `reason`. A provided reason or note
    /// replaces the record's notes.
    pub async fn transition(
        &self,
        id: &str,
        target: AppointmentStatus,
        reason: Option<&str>,
    ) -> CacheResult<AppointmentRecord> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.mutate(
            id,
            |record| {
                if !record.status.can_transition_to(target) {
                    return Err(CacheError::InvalidTransition {
                        from: record.status,
                        to: target,
                    });
                }
                if target == AppointmentStatus::Cancelled && reason.is_none() {
                    return Err(CacheError::MissingReason);
                }
                Ok(())
            },
            |record| {
                record.status = target;
                if let Some(reason) = reason {
                    record.notes = reason.to_string();
                }
            },
        )
        .await
    }

    /// Confirm a scheduled appointment, optionally replacing its notes.
    pub async fn confirm(&self, id: &str, note: Option<&str>) -> CacheResult<AppointmentRecord> {
        self.transition(id, AppointmentStatus::Confirmed, note).await
    }

    /// Cancel an appointment with a reason.
    pub async fn cancel(&self, id: &str, reason: &str) -> CacheResult<AppointmentRecord> {
        self.transition(id, AppointmentStatus::Cancelled, Some(reason))
            .await
    }

    /// Move a scheduled or confirmed appointment to a new date and time.
    pub async fn reschedule(
        &self,
        id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> CacheResult<AppointmentRecord> {
        self.mutate(
            id,
            |record| {
                if record.status.is_reschedulable() {
                    Ok(())
                } else {
                    Err(CacheError::NotEditable {
                        id: id.to_string(),
                        status: record.status,
                    })
                }
            },
            |record| {
                record.date = date;
                record.time = time;
            },
        )
        .await
    }

    /// Replace a record's free-text notes.
    pub async fn update_notes(&self, id: &str, notes: &str) -> CacheResult<AppointmentRecord> {
        self.mutate(
            id,
            |record| {
                if record.status.accepts_note_edits() {
                    Ok(())
                } else {
                    Err(CacheError::NotEditable {
                        id: id.to_string(),
                        status: record.status,
                    })
                }
            },
            |record| record.notes = notes.to_string(),
        )
        .await
    }

    /// Validate, apply locally, then push the edited record to the gateway.
    async fn mutate<C, E>(&self, id: &str, check: C, edit: E) -> CacheResult<AppointmentRecord>
    where
        C: FnOnce(&AppointmentRecord) -> CacheResult<()>,
        E: FnOnce(&mut AppointmentRecord),
    {
        let (previous, updated) = {
            let mut state = self.state();
            let index = state
                .records
                .iter()
                .position(|r| r.matches_id(id))
                .ok_or_else(|| CacheError::NotFound(id.to_string()))?;

            let previous = state.records[index].clone();
            check(&previous)?;
            if !previous.id.is_server() {
                return Err(CacheError::NotSynced(id.to_string()));
            }

            let mut updated = previous.clone();
            edit(&mut updated);
            updated.touch();
            updated.sync = SyncState::Pending;
            Arc::make_mut(&mut state.records)[index] = updated.clone();
            state.supersede_loads();
            (previous, updated)
        };
        debug!(appointment_id = %id, status = %updated.status, "Applied optimistic update");

        let input = WireAppointmentInput::from(&updated);
        let result = match self.inner.gateway.update(id.to_string(), input).await {
            Ok(wire) => AppointmentRecord::try_from(wire).map_err(CacheError::from),
            Err(e) => Err(CacheError::from(e)),
        };

        match result {
            Ok(confirmed) => {
                self.replace(&updated.id, confirmed.clone());
                info!(appointment_id = %id, status = %confirmed.status, "Appointment updated");
                self.schedule_refresh();
                Ok(confirmed)
            }
            Err(e) => {
                warn!(appointment_id = %id, error = %e, "Update failed");
                match self.inner.config.failure_policy {
                    FailurePolicy::Keep => self.mark_failed(&updated.id),
                    FailurePolicy::Rollback => self.replace(&updated.id, previous),
                }
                Err(e)
            }
        }
    }

    fn confirm_created(&self, provisional_id: &AppointmentId, confirmed: AppointmentRecord) {
        {
            let mut state = self.state();
            state.supersede_loads();
            let records = Arc::make_mut(&mut state.records);
            // A refresh may already have brought the server copy in
            if records.iter().any(|r| r.id == confirmed.id) {
                records.retain(|r| &r.id != provisional_id);
                for record in records.iter_mut().filter(|r| r.id == confirmed.id) {
                    *record = confirmed.clone();
                }
                debug!(appointment_id = %confirmed.id, "Server copy already cached");
            } else if let Some(index) = records.iter().position(|r| &r.id == provisional_id) {
                records[index] = confirmed.clone();
            } else {
                records.insert(0, confirmed.clone());
            }
        }
        self.inner.highlights.forget(provisional_id.as_str());
        self.inner.highlights.mark(confirmed.id.as_str());
    }

    fn handle_create_failure(&self, provisional_id: &AppointmentId) {
        match self.inner.config.failure_policy {
            FailurePolicy::Keep => self.mark_failed(provisional_id),
            FailurePolicy::Rollback => {
                let mut state = self.state();
                Arc::make_mut(&mut state.records).retain(|r| &r.id != provisional_id);
                drop(state);
                self.inner.highlights.forget(provisional_id.as_str());
            }
        }
    }

    fn replace(&self, id: &AppointmentId, record: AppointmentRecord) {
        let mut state = self.state();
        state.supersede_loads();
        if let Some(index) = state.records.iter().position(|r| &r.id == id) {
            Arc::make_mut(&mut state.records)[index] = record;
        }
    }

    fn mark_failed(&self, id: &AppointmentId) {
        let mut state = self.state();
        if let Some(index) = state.records.iter().position(|r| &r.id == id) {
            Arc::make_mut(&mut state.records)[index].sync = SyncState::Failed;
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        lock(&self.inner.state)
    }
}

// Every critical section leaves the state consistent, so a poisoned lock is
// still safe to use.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryGateway, WireAppointment, WireId};
    use crate::models::{AppointmentCategory, SubjectRef};

    fn quiet_config() -> CacheConfig {
        CacheConfig {
            refresh_after_mutation: false,
            ..CacheConfig::default()
        }
    }

    fn make_draft(name: &str) -> AppointmentDraft {
        AppointmentDraft::new(
            SubjectRef::new(None, name),
            NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            30,
            AppointmentCategory::Consultation,
        )
    }

    async fn loaded_cache(config: CacheConfig) -> AppointmentCache<MemoryGateway> {
        let cache = AppointmentCache::new(MemoryGateway::with_sample_data(), config);
        cache.load().await.unwrap();
        cache
    }

    #[tokio::test]
    async fn test_load_replaces_collection() {
        let cache = loaded_cache(quiet_config()).await;
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.get("APT003").unwrap().status, AppointmentStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_failed_load_keeps_previous_collection() {
        let cache = loaded_cache(quiet_config()).await;
        let before = cache.snapshot();

        cache.gateway().fail_next(GatewayError::Timeout);
        let err = cache.load().await.unwrap_err();

        assert_eq!(err, CacheError::Gateway(GatewayError::Timeout));
        assert!(err.is_retryable());
        assert_eq!(cache.snapshot(), before);
    }

    fn wire_row(id: &str, category: &str, status: &str) -> WireAppointment {
        WireAppointment {
            id: WireId::Text(id.into()),
            patient_id: None,
            patient_name: format!("Patient {}", id),
            date: "2025-01-22".into(),
            time: "09:00".into(),
            duration: 30,
            category: category.into(),
            status: status.into(),
            notes: None,
            created_at: "2025-01-20T08:00:00Z".into(),
            updated_at: "2025-01-20T08:00:00Z".into(),
        }
    }

    #[tokio::test]
    async fn test_load_accepts_every_backend_choice() {
        let gateway = MemoryGateway::with_records(vec![
            wire_row("1", "Follow-up", "Scheduled"),
            wire_row("2", "Emergency", "Confirmed"),
            wire_row("3", "Consultation", "No Show"),
        ]);
        let cache = AppointmentCache::new(gateway, quiet_config());

        cache.load().await.unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("2").unwrap().category, AppointmentCategory::Emergency);
        assert_eq!(cache.get("3").unwrap().status, AppointmentStatus::Cancelled);
        assert!(cache.get("3").unwrap().status.allowed_actions().is_empty());
    }

    #[tokio::test]
    async fn test_every_illegal_transition_is_rejected_without_side_effects() {
        let rows = AppointmentStatus::ALL
            .iter()
            .map(|status| wire_row(status.as_str(), "Consultation", status.as_str()))
            .collect();
        let cache = AppointmentCache::new(MemoryGateway::with_records(rows), quiet_config());
        cache.load().await.unwrap();

        for from in AppointmentStatus::ALL {
            for to in AppointmentStatus::ALL {
                if from.can_transition_to(to) {
                    continue;
                }
                let id = from.as_str();
                let before = cache.get(id).unwrap();
                let updates = cache.gateway().calls().update;

                let err = cache
                    .transition(id, to, Some("Reason given"))
                    .await
                    .unwrap_err();
                assert_eq!(err, CacheError::InvalidTransition { from, to });
                assert_eq!(cache.get(id).unwrap(), before);
                assert_eq!(cache.gateway().calls().update, updates);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_list_is_valid() {
        let cache = AppointmentCache::new(MemoryGateway::new(), quiet_config());
        assert!(cache.load().await.unwrap().is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_create_replaces_provisional_id() {
        let cache = loaded_cache(quiet_config()).await;
        let created = cache.create(make_draft("Jane Doe")).await.unwrap();

        assert_eq!(created.id, AppointmentId::Server("APT006".into()));
        assert_eq!(created.status, AppointmentStatus::Scheduled);
        assert_eq!(cache.len(), 6);
        assert_eq!(cache.snapshot()[0].id, created.id);
        assert!(cache.snapshot().iter().all(|r| r.id.is_server()));
        assert!(cache.is_highlighted("APT006"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_draft() {
        let cache = loaded_cache(quiet_config()).await;
        let err = cache.create(make_draft("")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_draft");
        assert_eq!(cache.len(), 5);
    }

    #[tokio::test]
    async fn test_cancel_requires_reason() {
        let cache = loaded_cache(quiet_config()).await;
        for reason in [None, Some(""), Some("   ")] {
            let err = cache
                .transition("APT003", AppointmentStatus::Cancelled, reason)
                .await
                .unwrap_err();
            assert_eq!(err, CacheError::MissingReason);
        }
        assert_eq!(cache.get("APT003").unwrap().status, AppointmentStatus::Scheduled);
        assert_eq!(cache.gateway().calls().update, 0);
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_record_untouched() {
        let cache = loaded_cache(quiet_config()).await;
        let before = cache.get("APT005").unwrap();

        let err = cache.confirm("APT005", None).await.unwrap_err();
        assert_eq!(
            err,
            CacheError::InvalidTransition {
                from: AppointmentStatus::Cancelled,
                to: AppointmentStatus::Confirmed,
            }
        );
        assert_eq!(err.to_string(), "Cannot change appointment from Cancelled to Confirmed");
        assert_eq!(cache.get("APT005").unwrap(), before);
    }

    #[tokio::test]
    async fn test_confirm_with_note_replaces_notes() {
        let cache = loaded_cache(quiet_config()).await;
        let confirmed = cache.confirm("APT003", Some("Bring ECG")).await.unwrap();

        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
        assert_eq!(confirmed.notes, "Bring ECG");
        assert_eq!(confirmed.sync, SyncState::Synced);
        assert_eq!(cache.get("APT003").unwrap(), confirmed);
    }

    #[tokio::test]
    async fn test_confirm_without_note_keeps_notes() {
        let cache = loaded_cache(quiet_config()).await;
        let confirmed = cache.confirm("APT003", None).await.unwrap();
        assert_eq!(confirmed.notes, "Chest pain evaluation");
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let cache = loaded_cache(quiet_config()).await;
        let err = cache.cancel("APT999", "Duplicate").await.unwrap_err();
        assert_eq!(err, CacheError::NotFound("APT999".into()));
    }

    #[tokio::test]
    async fn test_reschedule_and_notes_respect_status() {
        let cache = loaded_cache(quiet_config()).await;
        let new_date = NaiveDate::from_ymd_opt(2025, 1, 23).unwrap();
        let new_time = NaiveTime::from_hms_opt(11, 15, 0).unwrap();

        let moved = cache.reschedule("APT001", new_date, new_time).await.unwrap();
        assert_eq!((moved.date, moved.time), (new_date, new_time));

        let err = cache
            .reschedule("APT005", new_date, new_time)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_editable");

        let noted = cache.update_notes("APT002", "Fasting required").await.unwrap();
        assert_eq!(noted.notes, "Fasting required");
        assert!(cache.update_notes("APT005", "Too late").await.is_err());
    }

    #[tokio::test]
    async fn test_keep_policy_marks_failed_update() {
        let cache = loaded_cache(quiet_config()).await;
        cache
            .gateway()
            .fail_next(GatewayError::Transport("connection reset".into()));

        let err = cache.confirm("APT003", None).await.unwrap_err();
        assert!(matches!(err, CacheError::Gateway(_)));

        let record = cache.get("APT003").unwrap();
        assert_eq!(record.status, AppointmentStatus::Confirmed);
        assert_eq!(record.sync, SyncState::Failed);
    }

    #[tokio::test]
    async fn test_rollback_policy_restores_previous_record() {
        let config = CacheConfig {
            failure_policy: FailurePolicy::Rollback,
            ..quiet_config()
        };
        let cache = loaded_cache(config).await;
        let before = cache.get("APT003").unwrap();
        cache.gateway().fail_next(GatewayError::Timeout);

        assert!(cache.cancel("APT003", "Patient unwell").await.is_err());
        assert_eq!(cache.get("APT003").unwrap(), before);
    }

    #[tokio::test]
    async fn test_transition_on_provisional_record_waits_for_sync() {
        let cache = loaded_cache(quiet_config()).await;
        cache.gateway().fail_next(GatewayError::Timeout);
        assert!(cache.create(make_draft("Jane Doe")).await.is_err());

        let provisional = cache.snapshot()[0].clone();
        assert_eq!(provisional.sync, SyncState::Failed);
        let err = cache
            .confirm(provisional.id.as_str(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_synced");

        let err = cache
            .transition(provisional.id.as_str(), AppointmentStatus::Completed, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(cache.get(provisional.id.as_str()).unwrap(), provisional);
    }

    #[tokio::test]
    async fn test_mutation_triggers_background_refresh() {
        let cache = loaded_cache(CacheConfig::default()).await;
        assert_eq!(cache.gateway().calls().list, 1);

        cache.confirm("APT003", None).await.unwrap();
        cache.settle().await;
        assert_eq!(cache.gateway().calls().list, 2);
        assert_eq!(cache.get("APT003").unwrap().status, AppointmentStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_refresh_issued_before_write_cannot_overwrite_it() {
        let cache = loaded_cache(quiet_config()).await;
        cache.gateway().hold();

        let loading = tokio::spawn({
            let cache = cache.clone();
            async move { cache.load().await }
        });
        tokio::task::yield_now().await;
        let confirming = tokio::spawn({
            let cache = cache.clone();
            async move { cache.confirm("APT003", None).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(cache.get("APT003").unwrap().status, AppointmentStatus::Confirmed);

        cache.gateway().release();
        loading.await.unwrap().unwrap();
        confirming.await.unwrap().unwrap();
        assert_eq!(cache.get("APT003").unwrap().status, AppointmentStatus::Confirmed);
        assert!(cache.get("APT003").unwrap().is_synced());
    }

    #[tokio::test]
    async fn test_status_counts_track_mutations() {
        let cache = loaded_cache(quiet_config()).await;
        cache.confirm("APT003", None).await.unwrap();
        let counts = cache.status_counts();
        assert_eq!(counts.confirmed, 4);
        assert_eq!(counts.scheduled, 0);
    }
}
