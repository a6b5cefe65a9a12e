//! Canonical entities: current-state records identified by natural keys.
//!
//! Entities are created lazily on first sighting during ingestion and are
//! never deleted. Tracked fields are only mutated through the change
//! detector, which pairs every write with an appended event.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::time;

/// A physical terminal a route departs from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Terminal {
    pub id: Uuid,
    pub name: String,
    /// Short code, e.g. "TSA". The natural key.
    pub short_name: String,
    /// Parking availability percentage, tracked from the detail page.
    pub parking: Option<i32>,
}

impl Terminal {
    pub fn new(name: &str, short_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            short_name: short_name.to_string(),
            parking: None,
        }
    }
}

/// Where a route goes. Backed by a Terminal when the destination is one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub id: Uuid,
    pub name: String,
    pub terminal_id: Option<Uuid>,
}

impl Destination {
    pub fn new(name: &str, terminal_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            terminal_id,
        }
    }
}

/// A sailing route between a source terminal and a destination.
///
/// Natural key: (name, source, destination, route_code).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    pub destination_id: Uuid,
    pub route_code: u32,
    /// Crossing duration in minutes. Filled once, the first time the
    /// departures page reports a non-variable sailing time.
    pub duration: Option<i64>,
    pub car_waits: Option<i32>,
    pub oversize_waits: Option<i32>,
}

impl Route {
    pub fn new(name: &str, source_id: Uuid, destination_id: Uuid, route_code: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            source_id,
            destination_id,
            route_code,
            duration: None,
            car_waits: None,
            oversize_waits: None,
        }
    }
}

/// Operational status reported on the location map pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FerryStatus {
    InPort,
    UnderWay,
    Stopped,
    Offline,
}

impl FerryStatus {
    /// Map a page label to a status. Unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "In Port" => Some(FerryStatus::InPort),
            "Under Way" => Some(FerryStatus::UnderWay),
            "Stopped" => Some(FerryStatus::Stopped),
            "Temporarily Off Line" => Some(FerryStatus::Offline),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FerryStatus::InPort => "In Port",
            FerryStatus::UnderWay => "Under Way",
            FerryStatus::Stopped => "Stopped",
            FerryStatus::Offline => "Offline",
        }
    }
}

/// A vessel. Natural key: name.
///
/// `destination_id` and `heading` are mutually exclusive in practice:
/// most map routes report a destination, two report a compass heading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ferry {
    pub id: Uuid,
    pub name: String,
    pub destination_id: Option<Uuid>,
    pub heading: Option<String>,
    pub status: Option<FerryStatus>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Ferry {
    pub fn new(name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            destination_id: None,
            heading: None,
            status: None,
            last_updated: None,
        }
    }
}

/// Free-text sailing status label, deduplicated by exact text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub id: Uuid,
    pub text: String,
}

impl Status {
    pub const CANCELLED: &'static str = "Cancelled";

    pub fn new(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.text == Self::CANCELLED
    }
}

/// One scheduled crossing. Identity: (route, scheduled_departure), fixed
/// at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sailing {
    pub id: Uuid,
    pub route_id: Uuid,
    pub ferry_id: Option<Uuid>,
    pub scheduled_departure: DateTime<Utc>,
    /// scheduled_departure + route duration. Filled once.
    pub scheduled_arrival: Option<DateTime<Utc>>,
    pub actual_departure: Option<DateTime<Utc>>,
    pub eta_or_arrival: Option<DateTime<Utc>>,
    pub status_id: Option<Uuid>,
    pub departed: bool,
    pub arrived: bool,
    pub cancelled: bool,
    pub percent_full: Option<i32>,
    pub car_percent_full: Option<i32>,
    pub oversize_percent_full: Option<i32>,
    /// Local weekday of the scheduled departure. Set at creation.
    pub day_of_week: String,
    /// Local "HH:MM" of the scheduled departure. Set at creation.
    pub sailing_time: String,
    /// Crossing minutes, computed once after arrival is observed.
    pub duration: Option<i64>,
    /// Signed minutes late off the dock; negative means early. Computed once.
    pub late_leaving: Option<i64>,
    /// Signed minutes late alongside; negative means early. Computed once.
    pub late_arriving: Option<i64>,
}

impl Sailing {
    pub fn new(route_id: Uuid, scheduled_departure: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_id,
            ferry_id: None,
            scheduled_departure,
            scheduled_arrival: None,
            actual_departure: None,
            eta_or_arrival: None,
            status_id: None,
            departed: false,
            arrived: false,
            cancelled: false,
            percent_full: None,
            car_percent_full: None,
            oversize_percent_full: None,
            day_of_week: time::weekday_name(scheduled_departure),
            sailing_time: time::local_clock(scheduled_departure),
            duration: None,
            late_leaving: None,
            late_arriving: None,
        }
    }

    pub fn state(&self) -> &'static str {
        if self.departed {
            if self.arrived { "Arrived" } else { "Departed" }
        } else {
            "Not departed"
        }
    }

    /// Fill `scheduled_arrival` from the route duration, once.
    ///
    /// Returns true when the field was filled on this call. Derived fills
    /// are internal bookkeeping and never emit events.
    pub fn fill_scheduled_arrival(&mut self, route_duration_minutes: i64) -> bool {
        if self.scheduled_arrival.is_some() {
            return false;
        }
        self.scheduled_arrival =
            Some(self.scheduled_departure + chrono::Duration::minutes(route_duration_minutes));
        true
    }

    /// Compute `late_leaving` once, after the departure milestone.
    pub fn fill_departure_metrics(&mut self) -> bool {
        if self.late_leaving.is_some() || !self.departed {
            return false;
        }
        let Some(actual) = self.actual_departure else {
            return false;
        };
        self.late_leaving = Some(time::signed_minutes(self.scheduled_departure, actual));
        true
    }

    /// Compute `late_arriving` and `duration` once, after the arrival milestone.
    pub fn fill_arrival_metrics(&mut self) -> bool {
        if !self.arrived {
            return false;
        }
        let Some(arrival) = self.eta_or_arrival else {
            return false;
        };
        let mut filled = false;
        if self.late_arriving.is_none() {
            if let Some(scheduled_arrival) = self.scheduled_arrival {
                self.late_arriving = Some(time::signed_minutes(scheduled_arrival, arrival));
                filled = true;
            }
        }
        if self.duration.is_none() {
            if let Some(actual) = self.actual_departure {
                self.duration = Some(time::signed_minutes(actual, arrival));
                filled = true;
            }
        }
        filled
    }
}
