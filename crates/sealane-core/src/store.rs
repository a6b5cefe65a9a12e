//! In-memory implementations of [`EntityStore`] and [`RunLedger`].
//!
//! A single mutex guards each store, which gives natural-key lookups the
//! compare-and-create atomicity the resolver contract requires. Durable
//! storage would implement the same traits over a unique-constrained
//! schema.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{Event, Subject};
use crate::models::{Destination, Ferry, Route, Sailing, Status, Terminal};
use crate::records::SourceKind;
use crate::traits::{EntityStore, RunHandle, RunLedger};

#[derive(Default)]
struct StoreInner {
    terminals: Vec<Terminal>,
    destinations: Vec<Destination>,
    routes: Vec<Route>,
    ferries: Vec<Ferry>,
    statuses: Vec<Status>,
    sailings: Vec<Sailing>,
    events: Vec<Event>,
}

/// In-memory entity store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Store("store lock poisoned".into()))
    }

    /// Snapshot of all sailings, for projections and tests.
    pub fn all_sailings(&self) -> Result<Vec<Sailing>, AppError> {
        Ok(self.lock()?.sailings.clone())
    }

    pub fn all_terminals(&self) -> Result<Vec<Terminal>, AppError> {
        Ok(self.lock()?.terminals.clone())
    }

    pub fn entity_count(&self) -> Result<usize, AppError> {
        let inner = self.lock()?;
        Ok(inner.terminals.len()
            + inner.destinations.len()
            + inner.routes.len()
            + inner.ferries.len()
            + inner.statuses.len()
            + inner.sailings.len())
    }
}

impl EntityStore for MemoryStore {
    async fn find_or_create_terminal(
        &self,
        name: &str,
        short_name: &str,
    ) -> Result<(Terminal, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner.terminals.iter().find(|t| t.short_name == short_name) {
            return Ok((found.clone(), false));
        }
        let terminal = Terminal::new(name, short_name);
        inner.terminals.push(terminal.clone());
        Ok((terminal, true))
    }

    async fn find_or_create_destination(
        &self,
        name: &str,
        terminal_id: Option<Uuid>,
    ) -> Result<(Destination, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner
            .destinations
            .iter()
            .find(|d| d.name == name && d.terminal_id == terminal_id)
        {
            return Ok((found.clone(), false));
        }
        let destination = Destination::new(name, terminal_id);
        inner.destinations.push(destination.clone());
        Ok((destination, true))
    }

    async fn find_or_create_route(
        &self,
        name: &str,
        source_id: Uuid,
        destination_id: Uuid,
        route_code: u32,
    ) -> Result<(Route, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner.routes.iter().find(|r| {
            r.name == name
                && r.source_id == source_id
                && r.destination_id == destination_id
                && r.route_code == route_code
        }) {
            return Ok((found.clone(), false));
        }
        let route = Route::new(name, source_id, destination_id, route_code);
        inner.routes.push(route.clone());
        Ok((route, true))
    }

    async fn find_or_create_ferry(&self, name: &str) -> Result<(Ferry, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner.ferries.iter().find(|f| f.name == name) {
            return Ok((found.clone(), false));
        }
        let ferry = Ferry::new(name);
        inner.ferries.push(ferry.clone());
        Ok((ferry, true))
    }

    async fn find_or_create_status(&self, text: &str) -> Result<(Status, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner.statuses.iter().find(|s| s.text == text) {
            return Ok((found.clone(), false));
        }
        let status = Status::new(text);
        inner.statuses.push(status.clone());
        Ok((status, true))
    }

    async fn find_or_create_sailing(
        &self,
        route_id: Uuid,
        scheduled_departure: DateTime<Utc>,
    ) -> Result<(Sailing, bool), AppError> {
        let mut inner = self.lock()?;
        if let Some(found) = inner
            .sailings
            .iter()
            .find(|s| s.route_id == route_id && s.scheduled_departure == scheduled_departure)
        {
            return Ok((found.clone(), false));
        }
        let sailing = Sailing::new(route_id, scheduled_departure);
        inner.sailings.push(sailing.clone());
        Ok((sailing, true))
    }

    async fn route(&self, id: Uuid) -> Result<Option<Route>, AppError> {
        Ok(self.lock()?.routes.iter().find(|r| r.id == id).cloned())
    }

    async fn route_by_name(&self, name: &str) -> Result<Option<Route>, AppError> {
        Ok(self.lock()?.routes.iter().find(|r| r.name == name).cloned())
    }

    async fn routes(&self) -> Result<Vec<Route>, AppError> {
        Ok(self.lock()?.routes.clone())
    }

    async fn terminal(&self, id: Uuid) -> Result<Option<Terminal>, AppError> {
        Ok(self.lock()?.terminals.iter().find(|t| t.id == id).cloned())
    }

    async fn terminal_by_short_name(&self, short_name: &str) -> Result<Option<Terminal>, AppError> {
        Ok(self
            .lock()?
            .terminals
            .iter()
            .find(|t| t.short_name == short_name)
            .cloned())
    }

    async fn destination(&self, id: Uuid) -> Result<Option<Destination>, AppError> {
        Ok(self
            .lock()?
            .destinations
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn destination_by_prefix(&self, prefix: &str) -> Result<Option<Destination>, AppError> {
        Ok(self
            .lock()?
            .destinations
            .iter()
            .find(|d| d.name.starts_with(prefix))
            .cloned())
    }

    async fn ferry(&self, id: Uuid) -> Result<Option<Ferry>, AppError> {
        Ok(self.lock()?.ferries.iter().find(|f| f.id == id).cloned())
    }

    async fn ferries(&self) -> Result<Vec<Ferry>, AppError> {
        Ok(self.lock()?.ferries.clone())
    }

    async fn status(&self, id: Uuid) -> Result<Option<Status>, AppError> {
        Ok(self.lock()?.statuses.iter().find(|s| s.id == id).cloned())
    }

    async fn sailing_by_key(
        &self,
        route_id: Uuid,
        scheduled_departure: DateTime<Utc>,
    ) -> Result<Option<Sailing>, AppError> {
        Ok(self
            .lock()?
            .sailings
            .iter()
            .find(|s| s.route_id == route_id && s.scheduled_departure == scheduled_departure)
            .cloned())
    }

    async fn sailings_in_range(
        &self,
        route_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Sailing>, AppError> {
        let mut sailings: Vec<_> = self
            .lock()?
            .sailings
            .iter()
            .filter(|s| {
                s.route_id == route_id && s.scheduled_departure >= from && s.scheduled_departure < to
            })
            .cloned()
            .collect();
        sailings.sort_by_key(|s| s.scheduled_departure);
        Ok(sailings)
    }

    async fn sailings_for_route(&self, route_id: Uuid) -> Result<Vec<Sailing>, AppError> {
        let mut sailings: Vec<_> = self
            .lock()?
            .sailings
            .iter()
            .filter(|s| s.route_id == route_id)
            .cloned()
            .collect();
        sailings.sort_by_key(|s| s.scheduled_departure);
        Ok(sailings)
    }

    async fn update_terminal(&self, terminal: &Terminal) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match inner.terminals.iter_mut().find(|t| t.id == terminal.id) {
            Some(slot) => {
                *slot = terminal.clone();
                Ok(())
            }
            None => Err(AppError::Store(format!(
                "terminal {} not found",
                terminal.id
            ))),
        }
    }

    async fn update_route(&self, route: &Route) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match inner.routes.iter_mut().find(|r| r.id == route.id) {
            Some(slot) => {
                *slot = route.clone();
                Ok(())
            }
            None => Err(AppError::Store(format!("route {} not found", route.id))),
        }
    }

    async fn update_ferry(&self, ferry: &Ferry) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match inner.ferries.iter_mut().find(|f| f.id == ferry.id) {
            Some(slot) => {
                *slot = ferry.clone();
                Ok(())
            }
            None => Err(AppError::Store(format!("ferry {} not found", ferry.id))),
        }
    }

    async fn update_sailing(&self, sailing: &Sailing) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        match inner.sailings.iter_mut().find(|s| s.id == sailing.id) {
            Some(slot) => {
                *slot = sailing.clone();
                Ok(())
            }
            None => Err(AppError::Store(format!("sailing {} not found", sailing.id))),
        }
    }

    async fn append_event(&self, event: Event) -> Result<(), AppError> {
        self.lock()?.events.push(event);
        Ok(())
    }

    async fn events_for(&self, subject: Subject) -> Result<Vec<Event>, AppError> {
        // append order doubles as timestamp order for a given subject
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|e| e.subject == subject)
            .cloned()
            .collect())
    }

    async fn event_count(&self) -> Result<usize, AppError> {
        Ok(self.lock()?.events.len())
    }
}

// ---------------------------------------------------------------------------
// Run ledger
// ---------------------------------------------------------------------------

/// One recorded ingestion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub kind: SourceKind,
    pub started_at: DateTime<Utc>,
    pub status: Option<String>,
    pub successful: bool,
    pub captures: Vec<RawCapture>,
}

/// A raw payload captured during a run, kept for audit and replay.
#[derive(Debug, Clone, Serialize)]
pub struct RawCapture {
    pub url: Option<String>,
    pub sha256: String,
    pub bytes: usize,
    pub payload: String,
}

/// In-memory run ledger.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    runs: Arc<Mutex<Vec<RunRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<RunRecord>>, AppError> {
        self.runs
            .lock()
            .map_err(|_| AppError::Store("ledger lock poisoned".into()))
    }

    pub fn runs(&self) -> Result<Vec<RunRecord>, AppError> {
        Ok(self.lock()?.clone())
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>, AppError> {
        Ok(self.lock()?.last().cloned())
    }
}

fn digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl RunLedger for MemoryLedger {
    async fn begin_run(&self, kind: SourceKind) -> Result<RunHandle, AppError> {
        let record = RunRecord {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            status: None,
            successful: false,
            captures: Vec::new(),
        };
        let handle = RunHandle { id: record.id };
        self.lock()?.push(record);
        Ok(handle)
    }

    async fn set_status(
        &self,
        run: &RunHandle,
        message: &str,
        successful: bool,
    ) -> Result<(), AppError> {
        let mut runs = self.lock()?;
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(record) => {
                record.status = Some(message.to_string());
                record.successful = successful;
                Ok(())
            }
            None => Err(AppError::Store(format!("run {} not found", run.id))),
        }
    }

    async fn record_raw_capture(
        &self,
        run: &RunHandle,
        payload: &str,
        url: Option<&str>,
    ) -> Result<(), AppError> {
        let mut runs = self.lock()?;
        match runs.iter_mut().find(|r| r.id == run.id) {
            Some(record) => {
                record.captures.push(RawCapture {
                    url: url.map(str::to_string),
                    sha256: digest(payload),
                    bytes: payload.len(),
                    payload: payload.to_string(),
                });
                Ok(())
            }
            None => Err(AppError::Store(format!("run {} not found", run.id))),
        }
    }
}
