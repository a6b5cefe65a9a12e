use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::{Event, Subject};
use crate::models::{Destination, Ferry, Route, Sailing, Status, Terminal};
use crate::records::SourceKind;

/// Fetches raw page text from a URL. Never parses.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Source of "now", injectable so rollover logic is testable.
pub trait Clock: Send + Sync + Clone {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Persists canonical entities and their event log.
///
/// All `find_or_create_*` operations are natural-key upserts: repeated
/// calls with the same key return the existing entity (created = false)
/// and never create a duplicate. Implementations must make lookup and
/// create atomic with respect to concurrent callers.
pub trait EntityStore: Send + Sync + Clone {
    fn find_or_create_terminal(
        &self,
        name: &str,
        short_name: &str,
    ) -> impl Future<Output = Result<(Terminal, bool), AppError>> + Send;

    fn find_or_create_destination(
        &self,
        name: &str,
        terminal_id: Option<Uuid>,
    ) -> impl Future<Output = Result<(Destination, bool), AppError>> + Send;

    fn find_or_create_route(
        &self,
        name: &str,
        source_id: Uuid,
        destination_id: Uuid,
        route_code: u32,
    ) -> impl Future<Output = Result<(Route, bool), AppError>> + Send;

    fn find_or_create_ferry(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<(Ferry, bool), AppError>> + Send;

    fn find_or_create_status(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<(Status, bool), AppError>> + Send;

    fn find_or_create_sailing(
        &self,
        route_id: Uuid,
        scheduled_departure: DateTime<Utc>,
    ) -> impl Future<Output = Result<(Sailing, bool), AppError>> + Send;

    // -- lookups --

    fn route(&self, id: Uuid) -> impl Future<Output = Result<Option<Route>, AppError>> + Send;

    fn route_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Route>, AppError>> + Send;

    fn routes(&self) -> impl Future<Output = Result<Vec<Route>, AppError>> + Send;

    fn terminal(&self, id: Uuid)
    -> impl Future<Output = Result<Option<Terminal>, AppError>> + Send;

    fn terminal_by_short_name(
        &self,
        short_name: &str,
    ) -> impl Future<Output = Result<Option<Terminal>, AppError>> + Send;

    fn destination(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Destination>, AppError>> + Send;

    /// Prefix match on destination name; the map pages abbreviate.
    fn destination_by_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Option<Destination>, AppError>> + Send;

    fn ferry(&self, id: Uuid) -> impl Future<Output = Result<Option<Ferry>, AppError>> + Send;

    fn ferries(&self) -> impl Future<Output = Result<Vec<Ferry>, AppError>> + Send;

    fn status(&self, id: Uuid) -> impl Future<Output = Result<Option<Status>, AppError>> + Send;

    fn sailing_by_key(
        &self,
        route_id: Uuid,
        scheduled_departure: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Sailing>, AppError>> + Send;

    /// Sailings for a route with scheduled departure in `[from, to)`.
    fn sailings_in_range(
        &self,
        route_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Sailing>, AppError>> + Send;

    fn sailings_for_route(
        &self,
        route_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Sailing>, AppError>> + Send;

    // -- write-backs (keyed by id; identity fields never change) --

    fn update_terminal(
        &self,
        terminal: &Terminal,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_route(&self, route: &Route) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_ferry(&self, ferry: &Ferry) -> impl Future<Output = Result<(), AppError>> + Send;

    fn update_sailing(
        &self,
        sailing: &Sailing,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    // -- event log --

    fn append_event(&self, event: Event) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Events for one subject, ordered by creation (timestamp ascending).
    fn events_for(
        &self,
        subject: Subject,
    ) -> impl Future<Output = Result<Vec<Event>, AppError>> + Send;

    fn event_count(&self) -> impl Future<Output = Result<usize, AppError>> + Send;
}

/// Handle for one ingestion attempt in the run ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle {
    pub id: Uuid,
}

/// Records the outcome and raw capture of every ingestion attempt.
///
/// The pipeline begins a run before fetching, records the raw payload
/// immediately after a successful fetch, and marks the run successful
/// only after the whole batch processed without a fatal error.
pub trait RunLedger: Send + Sync + Clone {
    fn begin_run(
        &self,
        kind: SourceKind,
    ) -> impl Future<Output = Result<RunHandle, AppError>> + Send;

    fn set_status(
        &self,
        run: &RunHandle,
        message: &str,
        successful: bool,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn record_raw_capture(
        &self,
        run: &RunHandle,
        payload: &str,
        url: Option<&str>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}
