//! In-process gateway for previews and tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use super::{Gateway, GatewayError, GatewayResult, WireAppointment, WireAppointmentInput, WireId};

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub create: usize,
    pub update: usize,
}

#[derive(Default)]
struct MemoryState {
    records: Vec<WireAppointment>,
    next_id: u32,
    failures: VecDeque<GatewayError>,
    latency: Option<Duration>,
    calls: CallCounts,
}

/// Gateway that keeps records in memory and assigns `APT###` identifiers.
///
/// Failures can be queued with [`fail_next`](Self::fail_next), and calls can
/// be held open with [`hold`](Self::hold) until [`release`](Self::release),
/// which lets callers observe optimistic state mid-flight.
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    gate: watch::Sender<bool>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(MemoryState {
                next_id: 1,
                ..MemoryState::default()
            }),
            gate,
        }
    }

    /// Create a gateway seeded with existing records.
    pub fn with_records(records: Vec<WireAppointment>) -> Self {
        let gateway = Self::new();
        {
            let mut state = gateway.lock();
            state.next_id = records.len() as u32 + 1;
            state.records = records;
        }
        gateway
    }

    /// Create a gateway seeded with a doctor's sample day.
    pub fn with_sample_data() -> Self {
        let rows = [
            ("APT001", "P001", "John Smith", "09:00", 30, "Follow-up", "confirmed", "Review blood test results"),
            ("APT002", "P002", "Sarah Johnson", "10:30", 45, "New Patient", "confirmed", "Initial consultation"),
            ("APT003", "P003", "Mike Davis", "14:00", 30, "Consultation", "pending", "Chest pain evaluation"),
            ("APT004", "P004", "Lisa Wilson", "15:30", 30, "Test Review", "confirmed", "MRI results discussion"),
            ("APT005", "P005", "Robert Brown", "16:45", 30, "Follow-up", "cancelled", "Patient cancelled"),
        ];
        let stamp = "2025-01-20T08:00:00+00:00".to_string();
        let records = rows
            .into_iter()
            .map(
                |(id, patient_id, name, time, duration, category, status, notes)| WireAppointment {
                    id: WireId::Text(id.into()),
                    patient_id: Some(WireId::Text(patient_id.into())),
                    patient_name: name.into(),
                    date: "2025-01-22".into(),
                    time: time.into(),
                    duration,
                    category: category.into(),
                    status: status.into(),
                    notes: Some(notes.into()),
                    created_at: stamp.clone(),
                    updated_at: stamp.clone(),
                },
            )
            .collect();
        Self::with_records(records)
    }

    /// Fail the next call (of any kind) with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: GatewayError) {
        self.lock().failures.push_back(error);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Hold all subsequent calls until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held calls proceed.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Snapshot of stored records.
    pub fn records(&self) -> Vec<WireAppointment> {
        self.lock().records.clone()
    }

    /// Calls made so far.
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    // Every critical section leaves the state consistent, so a poisoned lock
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the gate and simulated latency, then pop a queued failure.
    async fn round_trip(&self) -> GatewayResult<()> {
        let mut gate = self.gate.subscribe();
        while !*gate.borrow_and_update() {
            gate.changed()
                .await
                .map_err(|e| GatewayError::Transport(e.to_string()))?;
        }

        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.lock().failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Gateway for MemoryGateway {
    async fn list(&self) -> GatewayResult<Vec<WireAppointment>> {
        self.lock().calls.list += 1;
        self.round_trip().await?;
        Ok(self.lock().records.clone())
    }

    async fn create(&self, input: WireAppointmentInput) -> GatewayResult<WireAppointment> {
        self.lock().calls.create += 1;
        self.round_trip().await?;

        let mut state = self.lock();
        let now = Utc::now().to_rfc3339();
        let record = WireAppointment {
            id: WireId::Text(format!("APT{:03}", state.next_id)),
            patient_id: input.patient_id.map(WireId::Text),
            patient_name: input.patient_name,
            date: input.date,
            time: input.time,
            duration: input.duration,
            category: input.category,
            status: input.status,
            notes: Some(input.notes),
            created_at: now.clone(),
            updated_at: now,
        };
        state.next_id += 1;
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: String, input: WireAppointmentInput) -> GatewayResult<WireAppointment> {
        self.lock().calls.update += 1;
        self.round_trip().await?;

        let mut state = self.lock();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id.to_string() == id)
            .ok_or_else(|| GatewayError::Rejected(format!("Appointment not found: {}", id)))?;

        record.patient_id = input.patient_id.map(WireId::Text);
        record.patient_name = input.patient_name;
        record.date = input.date;
        record.time = input.time;
        record.duration = input.duration;
        record.category = input.category;
        record.status = input.status;
        record.notes = Some(input.notes);
        record.updated_at = Utc::now().to_rfc3339();
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_input(name: &str) -> WireAppointmentInput {
        WireAppointmentInput {
            patient_id: None,
            patient_name: name.into(),
            date: "2025-02-01".into(),
            time: "10:00".into(),
            duration: 30,
            category: "Consultation".into(),
            status: "scheduled".into(),
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let gateway = MemoryGateway::with_sample_data();
        let created = gateway.create(make_input("Jane Doe")).await.unwrap();
        assert_eq!(created.id, WireId::Text("APT006".into()));
        assert_eq!(gateway.list().await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_queued_failure_is_consumed_once() {
        let gateway = MemoryGateway::new();
        gateway.fail_next(GatewayError::Timeout);
        assert_eq!(gateway.list().await, Err(GatewayError::Timeout));
        assert_eq!(gateway.list().await, Ok(vec![]));
        assert_eq!(gateway.calls().list, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_each_call() {
        let gateway = MemoryGateway::with_sample_data();
        gateway.set_latency(Some(Duration::from_millis(800)));

        let started = tokio::time::Instant::now();
        assert_eq!(gateway.list().await.unwrap().len(), 5);
        assert!(started.elapsed() >= Duration::from_millis(800));

        gateway.set_latency(None);
        let started = tokio::time::Instant::now();
        gateway.list().await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_recovered() {
        let gateway = std::sync::Arc::new(MemoryGateway::with_sample_data());
        let poisoner = std::sync::Arc::clone(&gateway);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the gateway lock");
        })
        .join();
        assert!(gateway.state.is_poisoned());

        gateway.fail_next(GatewayError::Timeout);
        assert_eq!(gateway.list().await, Err(GatewayError::Timeout));
        assert_eq!(gateway.records().len(), 5);
        assert_eq!(gateway.calls().list, 1);
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_rejected() {
        let gateway = MemoryGateway::new();
        let err = gateway
            .update("APT999".into(), make_input("Nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
