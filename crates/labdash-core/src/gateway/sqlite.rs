//! Gateway backed by the local SQLite store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{Gateway, GatewayError, GatewayResult, WireAppointment, WireAppointmentInput};
use crate::db::{Database, DbError};

impl From<DbError> for GatewayError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Constraint(msg) => GatewayError::Rejected(msg),
            DbError::NotFound(id) => GatewayError::Rejected(format!("Appointment not found: {}", id)),
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

/// Persistence service over a [`Database`], assigning integer IDs and
/// server timestamps. Queries run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteGateway {
    db: Arc<Mutex<Database>>,
}

impl SqliteGateway {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Create an in-memory store.
    pub fn open_in_memory() -> GatewayResult<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    async fn with_db<T, F>(&self, f: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> GatewayResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db
                .lock()
                .map_err(|e| GatewayError::Transport(format!("Lock poisoned: {}", e)))?;
            f(&db)
        })
        .await
        .map_err(|e| GatewayError::Transport(e.to_string()))?
    }
}

fn parse_id(id: &str) -> GatewayResult<i64> {
    id.parse()
        .map_err(|_| GatewayError::Rejected(format!("Appointment not found: {}", id)))
}

impl Gateway for SqliteGateway {
    async fn list(&self) -> GatewayResult<Vec<WireAppointment>> {
        self.with_db(|db| Ok(db.list_appointments()?)).await
    }

    async fn create(&self, input: WireAppointmentInput) -> GatewayResult<WireAppointment> {
        self.with_db(move |db| Ok(db.insert_appointment(&input)?))
            .await
    }

    async fn update(&self, id: String, input: WireAppointmentInput) -> GatewayResult<WireAppointment> {
        let row_id = parse_id(&id)?;
        self.with_db(move |db| {
            db.update_appointment(row_id, &input)?
                .ok_or_else(|| GatewayError::Rejected(format!("Appointment not found: {}", id)))
        })
        .await
    }
}
