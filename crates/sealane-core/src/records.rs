//! Intermediate records produced by the page parsers.
//!
//! Parsers map raw markup to these plain-scalar structures; the resolver
//! and change detector turn them into canonical entities and events.
//! Nothing here touches storage.

use chrono::NaiveDate;
use serde::Serialize;

/// The four source page kinds we ingest, each with its own run ledger kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Departures,
    Conditions,
    SailingDetail,
    Locations,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SourceKind::Departures => "departures",
            SourceKind::Conditions => "conditions",
            SourceKind::SailingDetail => "sailing-detail",
            SourceKind::Locations => "locations",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Departures page
// ---------------------------------------------------------------------------

/// Parsed departures overview page: the service date plus one section per route.
#[derive(Debug, Clone, Serialize)]
pub struct DeparturesPage {
    /// Service date printed on the page; sailing times combine with it.
    pub date: NaiveDate,
    pub routes: Vec<RouteSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteSection {
    /// Full route name as printed, e.g. "Tsawwassen to Swartz Bay".
    pub name: String,
    pub source: String,
    pub destination: String,
    /// Source terminal short code, e.g. "TSA".
    pub source_code: String,
    pub route_code: u32,
    /// Crossing duration in minutes; `None` when the page says "Variable".
    pub duration: Option<i64>,
    pub sailings: Vec<SailingRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SailingRow {
    pub ferry: String,
    /// Scheduled departure clock text, e.g. "10:00 AM".
    pub scheduled: String,
    /// Actual departure clock text; `None` when the sailing has not left.
    pub actual: Option<String>,
    pub eta_or_arrival: EtaOrArrival,
    pub status: String,
}

/// Disambiguated ETA-or-arrival cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "time")]
pub enum EtaOrArrival {
    /// The page printed "..." or nothing.
    Unknown,
    /// "ETA: <time>" — the sailing is still under way.
    Eta(String),
    /// A bare time — the sailing has arrived.
    Arrived(String),
}

// ---------------------------------------------------------------------------
// Conditions ("at-a-glance") page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConditionsPage {
    pub routes: Vec<ConditionsRoute>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionsRoute {
    pub name: String,
    pub route_id: u32,
    /// Source terminal short code from the detail link.
    pub dept: String,
    pub car_waits: Option<i32>,
    pub oversize_waits: Option<i32>,
    /// Near-term sailings with fullness detail; `None` when the cell is "N/A".
    pub sailings: Option<Vec<NearTermSailing>>,
    /// Bare time tokens for sailings beyond the near-term window.
    pub later: Vec<LaterToken>,
    /// The next row said vehicle space is fully booked for the rest of today.
    pub fully_booked_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NearTermSailing {
    pub time: String,
    pub cancelled: bool,
    pub percent_full: Option<i32>,
}

/// One later-sailing token, already stripped of its markers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaterToken {
    pub time: String,
    /// Token carried a `*` prefix (tomorrow, possibly the day after).
    pub tomorrow: bool,
    /// Token carried a `-Cancelled` suffix.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// Sailing detail page
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SailingDetailPage {
    pub route_name: String,
    /// Source terminal short code for the page.
    pub terminal_code: String,
    /// The page said "No more scheduled sailings for today".
    pub no_more_sailings: bool,
    pub sailing: Option<DetailSailing>,
    /// Parking availability at the source terminal, when present.
    pub parking_percent: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailSailing {
    /// Scheduled departure clock text, e.g. "10:00 AM".
    pub scheduled: String,
    pub cancelled: bool,
    /// Car deck space committed, percent. Expected-absent.
    pub car_percent: Option<i32>,
    /// Oversize deck space committed, percent. Expected-absent.
    pub oversize_percent: Option<i32>,
    pub ferry: Option<String>,
}

// ---------------------------------------------------------------------------
// Locations map pages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LocationsPage {
    /// Map page route id, e.g. "0" or "13".
    pub route_id: String,
    pub rows: Vec<LocationRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationRow {
    pub ferry: String,
    pub status: String,
    /// Destination name, or a compass heading on heading-only routes.
    pub destination: String,
    /// Last-seen clock text.
    pub time: String,
}
