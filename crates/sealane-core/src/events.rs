//! Append-only change events.
//!
//! Every mutation of a tracked entity field is paired with exactly one of
//! these records. Events are immutable once appended; the original's
//! polymorphic event hierarchy is a closed enum here, discriminated by a
//! serde `type` tag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::time;

/// The entity an event is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "subject_type", content = "subject_id", rename_all = "snake_case")]
pub enum Subject {
    Sailing(Uuid),
    Route(Uuid),
    Ferry(Uuid),
    Terminal(Uuid),
}

/// One observed state transition. `old`/`new` carry display values so the
/// log reads without further lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // -- sailing --
    DepartureTime {
        old: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    },
    ArrivalTime {
        old: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
        is_eta: bool,
    },
    Departed,
    Arrived,
    Status {
        old: Option<String>,
        new: String,
    },
    Ferry {
        old: Option<String>,
        new: String,
    },
    PercentFull {
        old: Option<i32>,
        new: i32,
    },
    CarPercentFull {
        old: Option<i32>,
        new: i32,
    },
    OversizePercentFull {
        old: Option<i32>,
        new: i32,
    },
    Cancelled,
    Full,
    // -- route --
    CarWait {
        old: Option<i32>,
        new: Option<i32>,
    },
    OversizeWait {
        old: Option<i32>,
        new: Option<i32>,
    },
    // -- ferry --
    Heading {
        old: Option<String>,
        new: String,
    },
    Destination {
        new: String,
    },
    InPort,
    UnderWay,
    Stopped,
    Offline,
    // -- terminal --
    Parking {
        old: Option<i32>,
        new: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub subject: Subject,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, subject: Subject, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            subject,
            kind,
        }
    }

    /// Local "HH:MM" of the event creation time.
    pub fn local_time(&self) -> String {
        time::local_clock(self.timestamp)
    }

    /// Human-readable description for projections.
    pub fn text(&self) -> String {
        fn stamp(dt: &Option<DateTime<Utc>>) -> String {
            match dt {
                Some(dt) => time::local_stamp(*dt),
                None => "unknown".to_string(),
            }
        }

        match &self.kind {
            EventKind::DepartureTime { new, .. } => {
                format!("Departure time changed to {}", stamp(new))
            }
            EventKind::ArrivalTime { new, is_eta, .. } => {
                if *is_eta {
                    format!("ETA changed to {}", stamp(new))
                } else {
                    format!("Arrival time changed to {}", stamp(new))
                }
            }
            EventKind::Departed => "Set as departed".to_string(),
            EventKind::Arrived => "Set as arrived".to_string(),
            EventKind::Status { new, .. } => format!("Status changed to {new}"),
            EventKind::Ferry { new, .. } => format!("Ferry changed to {new}"),
            EventKind::PercentFull { new, .. } => format!("Sailing now {new}% full"),
            EventKind::CarPercentFull { new, .. } => {
                format!("Car deck now {new}% committed")
            }
            EventKind::OversizePercentFull { new, .. } => {
                format!("Oversize deck now {new}% committed")
            }
            EventKind::Cancelled => "Sailing cancelled".to_string(),
            EventKind::Full => "Sailing full".to_string(),
            EventKind::CarWait { new, .. } => match new {
                Some(n) => format!("Car waits now {n}"),
                None => "Car waits no longer reported".to_string(),
            },
            EventKind::OversizeWait { new, .. } => match new {
                Some(n) => format!("Oversize waits now {n}"),
                None => "Oversize waits no longer reported".to_string(),
            },
            EventKind::Heading { new, .. } => format!("Heading changed to {new}"),
            EventKind::Destination { new } => format!("Destination changed to {new}"),
            EventKind::InPort => "In port".to_string(),
            EventKind::UnderWay => "Under way".to_string(),
            EventKind::Stopped => "Stopped".to_string(),
            EventKind::Offline => "Temporarily off line".to_string(),
            EventKind::Parking { new, .. } => format!("Parking now {new}% available"),
        }
    }
}

/// Event rendering for entity projections.
#[derive(Debug, Clone, Serialize)]
pub struct EventView {
    pub timestamp: DateTime<Utc>,
    pub local_time: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl From<&Event> for EventView {
    fn from(event: &Event) -> Self {
        Self {
            timestamp: event.timestamp,
            local_time: event.local_time(),
            text: event.text(),
            kind: event.kind.clone(),
        }
    }
}
