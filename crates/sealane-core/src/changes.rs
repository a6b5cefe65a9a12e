//! Change detection: compare-and-set on tracked fields.
//!
//! Every setter compares the observed value with the stored one. Equal
//! values are a no-op; a difference writes the field back through the
//! store and appends exactly one event carrying the old and new values.
//! The departed and arrived flags follow the page in both directions,
//! emitting an event on every flip; cancellation fires once and never
//! reverts.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::AppError;
use crate::events::{Event, EventKind, Subject};
use crate::models::{Destination, Ferry, FerryStatus, Route, Sailing, Status, Terminal};
use crate::traits::{Clock, EntityStore};

#[derive(Clone)]
pub struct ChangeDetector<S, C> {
    store: S,
    clock: C,
}

impl<S: EntityStore, C: Clock> ChangeDetector<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    async fn emit(&self, subject: Subject, kind: EventKind) -> Result<(), AppError> {
        let event = Event::new(self.clock.now(), subject, kind);
        debug!(text = %event.text(), "appending event");
        self.store.append_event(event).await
    }

    // -- sailing --

    pub async fn set_sailing_ferry(
        &self,
        sailing: &mut Sailing,
        ferry: &Ferry,
    ) -> Result<bool, AppError> {
        if sailing.ferry_id == Some(ferry.id) {
            return Ok(false);
        }
        let old = match sailing.ferry_id {
            Some(id) => self.store.ferry(id).await?.map(|f| f.name),
            None => None,
        };
        sailing.ferry_id = Some(ferry.id);
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::Ferry {
                old,
                new: ferry.name.clone(),
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn set_actual_departure(
        &self,
        sailing: &mut Sailing,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, AppError> {
        if sailing.actual_departure == new {
            return Ok(false);
        }
        let old = sailing.actual_departure;
        sailing.actual_departure = new;
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::DepartureTime { old, new },
        )
        .await?;
        Ok(true)
    }

    /// Departure flag as observed on the page. A flip to departed also
    /// computes late_leaving when the actual departure time is known; a
    /// flip back clears it.
    pub async fn set_departed(
        &self,
        sailing: &mut Sailing,
        departed: bool,
    ) -> Result<bool, AppError> {
        if sailing.departed == departed {
            return Ok(false);
        }
        sailing.departed = departed;
        if departed {
            sailing.fill_departure_metrics();
        } else {
            sailing.late_leaving = None;
        }
        self.store.update_sailing(sailing).await?;
        self.emit(Subject::Sailing(sailing.id), EventKind::Departed)
            .await?;
        Ok(true)
    }

    pub async fn set_eta_or_arrival(
        &self,
        sailing: &mut Sailing,
        new: Option<DateTime<Utc>>,
        is_eta: bool,
    ) -> Result<bool, AppError> {
        if sailing.eta_or_arrival == new {
            return Ok(false);
        }
        let old = sailing.eta_or_arrival;
        sailing.eta_or_arrival = new;
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::ArrivalTime { old, new, is_eta },
        )
        .await?;
        Ok(true)
    }

    /// Arrival flag as observed on the page. A flip to arrived computes
    /// late_arriving and crossing duration when their inputs are present;
    /// a flip back clears both.
    pub async fn set_arrived(
        &self,
        sailing: &mut Sailing,
        arrived: bool,
    ) -> Result<bool, AppError> {
        if sailing.arrived == arrived {
            return Ok(false);
        }
        sailing.arrived = arrived;
        if arrived {
            sailing.fill_arrival_metrics();
        } else {
            sailing.late_arriving = None;
            sailing.duration = None;
        }
        self.store.update_sailing(sailing).await?;
        self.emit(Subject::Sailing(sailing.id), EventKind::Arrived)
            .await?;
        Ok(true)
    }

    /// Status label change. A transition to the cancelled label also
    /// fires the cancellation milestone.
    pub async fn set_status(
        &self,
        sailing: &mut Sailing,
        status: &Status,
    ) -> Result<bool, AppError> {
        if sailing.status_id == Some(status.id) {
            return Ok(false);
        }
        let old = match sailing.status_id {
            Some(id) => self.store.status(id).await?.map(|s| s.text),
            None => None,
        };
        sailing.status_id = Some(status.id);
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::Status {
                old,
                new: status.text.clone(),
            },
        )
        .await?;
        if status.is_cancelled() {
            self.set_cancelled(sailing).await?;
        }
        Ok(true)
    }

    pub async fn set_cancelled(&self, sailing: &mut Sailing) -> Result<bool, AppError> {
        if sailing.cancelled {
            return Ok(false);
        }
        sailing.cancelled = true;
        self.store.update_sailing(sailing).await?;
        self.emit(Subject::Sailing(sailing.id), EventKind::Cancelled)
            .await?;
        Ok(true)
    }

    /// Vehicle-deck fullness. Crossing from below 100 to exactly 100 also
    /// fires a full milestone event.
    pub async fn set_percent_full(
        &self,
        sailing: &mut Sailing,
        new: i32,
    ) -> Result<bool, AppError> {
        if sailing.percent_full == Some(new) {
            return Ok(false);
        }
        let old = sailing.percent_full;
        sailing.percent_full = Some(new);
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::PercentFull { old, new },
        )
        .await?;
        if new == 100 && old != Some(100) {
            self.emit(Subject::Sailing(sailing.id), EventKind::Full)
                .await?;
        }
        Ok(true)
    }

    pub async fn set_car_percent_full(
        &self,
        sailing: &mut Sailing,
        new: i32,
    ) -> Result<bool, AppError> {
        if sailing.car_percent_full == Some(new) {
            return Ok(false);
        }
        let old = sailing.car_percent_full;
        sailing.car_percent_full = Some(new);
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::CarPercentFull { old, new },
        )
        .await?;
        Ok(true)
    }

    pub async fn set_oversize_percent_full(
        &self,
        sailing: &mut Sailing,
        new: i32,
    ) -> Result<bool, AppError> {
        if sailing.oversize_percent_full == Some(new) {
            return Ok(false);
        }
        let old = sailing.oversize_percent_full;
        sailing.oversize_percent_full = Some(new);
        self.store.update_sailing(sailing).await?;
        self.emit(
            Subject::Sailing(sailing.id),
            EventKind::OversizePercentFull { old, new },
        )
        .await?;
        Ok(true)
    }

    // -- route --

    pub async fn set_car_waits(
        &self,
        route: &mut Route,
        new: Option<i32>,
    ) -> Result<bool, AppError> {
        if route.car_waits == new {
            return Ok(false);
        }
        let old = route.car_waits;
        route.car_waits = new;
        self.store.update_route(route).await?;
        self.emit(Subject::Route(route.id), EventKind::CarWait { old, new })
            .await?;
        Ok(true)
    }

    pub async fn set_oversize_waits(
        &self,
        route: &mut Route,
        new: Option<i32>,
    ) -> Result<bool, AppError> {
        if route.oversize_waits == new {
            return Ok(false);
        }
        let old = route.oversize_waits;
        route.oversize_waits = new;
        self.store.update_route(route).await?;
        self.emit(
            Subject::Route(route.id),
            EventKind::OversizeWait { old, new },
        )
        .await?;
        Ok(true)
    }

    // -- ferry --

    pub async fn set_heading(&self, ferry: &mut Ferry, new: &str) -> Result<bool, AppError> {
        if ferry.heading.as_deref() == Some(new) {
            return Ok(false);
        }
        let old = ferry.heading.take();
        ferry.heading = Some(new.to_string());
        self.store.update_ferry(ferry).await?;
        self.emit(
            Subject::Ferry(ferry.id),
            EventKind::Heading {
                old,
                new: new.to_string(),
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn set_destination(
        &self,
        ferry: &mut Ferry,
        destination: &Destination,
    ) -> Result<bool, AppError> {
        if ferry.destination_id == Some(destination.id) {
            return Ok(false);
        }
        ferry.destination_id = Some(destination.id);
        self.store.update_ferry(ferry).await?;
        self.emit(
            Subject::Ferry(ferry.id),
            EventKind::Destination {
                new: destination.name.clone(),
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn set_ferry_status(
        &self,
        ferry: &mut Ferry,
        new: FerryStatus,
    ) -> Result<bool, AppError> {
        if ferry.status == Some(new) {
            return Ok(false);
        }
        ferry.status = Some(new);
        self.store.update_ferry(ferry).await?;
        let kind = match new {
            FerryStatus::InPort => EventKind::InPort,
            FerryStatus::UnderWay => EventKind::UnderWay,
            FerryStatus::Stopped => EventKind::Stopped,
            FerryStatus::Offline => EventKind::Offline,
        };
        self.emit(Subject::Ferry(ferry.id), kind).await?;
        Ok(true)
    }

    /// Last-seen time from the map page. Bookkeeping only, no event.
    pub async fn touch_ferry_seen(
        &self,
        ferry: &mut Ferry,
        seen: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        if ferry.last_updated == Some(seen) {
            return Ok(false);
        }
        ferry.last_updated = Some(seen);
        self.store.update_ferry(ferry).await?;
        Ok(true)
    }

    // -- terminal --

    pub async fn set_parking(&self, terminal: &mut Terminal, new: i32) -> Result<bool, AppError> {
        if terminal.parking == Some(new) {
            return Ok(false);
        }
        let old = terminal.parking;
        terminal.parking = Some(new);
        self.store.update_terminal(terminal).await?;
        self.emit(
            Subject::Terminal(terminal.id),
            EventKind::Parking { old, new },
        )
        .await?;
        Ok(true)
    }
}
