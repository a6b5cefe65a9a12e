//! Ingestion pipeline: fetch, capture, parse, resolve, detect changes.
//!
//! One pass per source kind. Every pass runs under a run-ledger record:
//! begin, capture the raw payload, then either "Completed" with
//! successful set or a failure status. Runs of the same kind are
//! serialized behind a per-kind mutex; different kinds may overlap since
//! they touch disjoint event types.
//!
//! Record-level problems (a route we have never seen, an unparseable
//! field) skip that record with a warning. Fetch failures and malformed
//! pages fail the whole run; entity writes already applied earlier in
//! the run are not rolled back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use sealane_core::changes::ChangeDetector;
use sealane_core::error::AppError;
use sealane_core::models::{FerryStatus, Route};
use sealane_core::records::{
    ConditionsPage, ConditionsRoute, DeparturesPage, EtaOrArrival, LocationRow, LocationsPage,
    SailingDetailPage, SailingRow, SourceKind,
};
use sealane_core::resolve::Resolver;
use sealane_core::time;
use sealane_core::traits::{Clock, EntityStore, Fetcher, RunHandle, RunLedger};

use crate::endpoints;
use crate::pages;

/// Where a pass reads its markup from.
pub enum PageSource {
    /// Fetch from the operator's endpoints.
    Live,
    /// A pre-captured payload, for replay and tests.
    Payload(String),
}

#[derive(Default)]
struct KindLocks {
    departures: tokio::sync::Mutex<()>,
    conditions: tokio::sync::Mutex<()>,
    detail: tokio::sync::Mutex<()>,
    locations: tokio::sync::Mutex<()>,
}

/// The ingestion pipeline for all four source kinds.
#[derive(Clone)]
pub struct IngestService<F, S, L, C> {
    fetcher: F,
    resolver: Resolver<S>,
    detector: ChangeDetector<S, C>,
    ledger: L,
    clock: C,
    locks: Arc<KindLocks>,
    /// Pause between successive live fetches to the same host.
    polite_delay: Duration,
}

impl<F, S, L, C> IngestService<F, S, L, C>
where
    F: Fetcher,
    S: EntityStore,
    L: RunLedger,
    C: Clock,
{
    pub fn new(fetcher: F, store: S, ledger: L, clock: C) -> Self {
        Self {
            fetcher,
            resolver: Resolver::new(store.clone()),
            detector: ChangeDetector::new(store, clock.clone()),
            ledger,
            clock,
            locks: Arc::new(KindLocks::default()),
            polite_delay: Duration::from_secs(1),
        }
    }

    pub fn with_polite_delay(mut self, delay: Duration) -> Self {
        self.polite_delay = delay;
        self
    }

    fn store(&self) -> &S {
        self.resolver.store()
    }

    /// Run departures, conditions, and locations in sequence.
    ///
    /// Each pass gets its own run record; a failed pass is reported and
    /// does not stop the remaining passes.
    pub async fn update_all(&self) -> Result<(), AppError> {
        let mut first_failure = None;
        if let Err(err) = self.ingest_departures(PageSource::Live).await {
            error!(%err, "departures pass failed");
            first_failure.get_or_insert(err);
        }
        if let Err(err) = self.ingest_conditions(PageSource::Live).await {
            error!(%err, "conditions pass failed");
            first_failure.get_or_insert(err);
        }
        if let Err(err) = self.ingest_locations(PageSource::Live).await {
            error!(%err, "locations pass failed");
            first_failure.get_or_insert(err);
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // -- departures --

    pub async fn ingest_departures(&self, source: PageSource) -> Result<(), AppError> {
        let _guard = self.locks.departures.lock().await;
        let run = self.ledger.begin_run(SourceKind::Departures).await?;

        let payload = match source {
            PageSource::Live => {
                self.fetch_or_fail(&run, &endpoints::departures_url())
                    .await?
            }
            PageSource::Payload(payload) => {
                self.ledger.record_raw_capture(&run, &payload, None).await?;
                payload
            }
        };
        self.ledger.set_status(&run, "Data retrieved", false).await?;

        let page = match pages::departures::parse_departures(&payload) {
            Ok(page) => page,
            Err(err) => return self.fail_run(&run, "Could not parse the departures page", err).await,
        };
        self.ledger.set_status(&run, "Data parsed", false).await?;

        if let Err(err) = self.apply_departures(&page).await {
            return self.fail_run(&run, "Processing departures failed", err).await;
        }

        self.ledger.set_status(&run, "Completed", true).await?;
        info!("finished retrieving and processing departures");
        Ok(())
    }

    async fn apply_departures(&self, page: &DeparturesPage) -> Result<(), AppError> {
        let routes = self.resolver.resolve_route_sections(&page.routes).await?;

        for (section, mut route) in page.routes.iter().zip(routes) {
            if route.duration.is_none()
                && let Some(minutes) = section.duration
            {
                debug!(route = %route.name, minutes, "setting crossing duration");
                route.duration = Some(minutes);
                self.store().update_route(&route).await?;
            }

            for row in &section.sailings {
                match self.apply_sailing_row(&route, page.date, row).await {
                    Err(err) if err.is_record_skip() => {
                        warn!(route = %route.name, scheduled = %row.scheduled, %err, "skipping sailing row");
                    }
                    other => other?,
                }
            }
        }
        Ok(())
    }

    async fn apply_sailing_row(
        &self,
        route: &Route,
        date: NaiveDate,
        row: &SailingRow,
    ) -> Result<(), AppError> {
        let ferry = self.resolver.resolve_ferry(&row.ferry).await?;
        let scheduled = time::at_local(date, time::parse_clock(&row.scheduled)?);
        let (mut sailing, _) = self.resolver.resolve_sailing(route, scheduled).await?;

        if let Some(minutes) = route.duration
            && sailing.fill_scheduled_arrival(minutes)
        {
            self.store().update_sailing(&sailing).await?;
        }

        self.detector.set_sailing_ferry(&mut sailing, &ferry).await?;

        // an empty actual cell on a later pass un-departs the sailing
        let actual = match &row.actual {
            Some(text) => Some(time::at_local(date, time::parse_clock(text)?)),
            None => None,
        };
        self.detector
            .set_actual_departure(&mut sailing, actual)
            .await?;
        self.detector
            .set_departed(&mut sailing, actual.is_some())
            .await?;

        match &row.eta_or_arrival {
            EtaOrArrival::Unknown => {
                self.detector
                    .set_eta_or_arrival(&mut sailing, None, false)
                    .await?;
                self.detector.set_arrived(&mut sailing, false).await?;
            }
            EtaOrArrival::Eta(text) => {
                let eta = time::at_local(date, time::parse_clock(text)?);
                self.detector
                    .set_eta_or_arrival(&mut sailing, Some(eta), true)
                    .await?;
                self.detector.set_arrived(&mut sailing, false).await?;
            }
            EtaOrArrival::Arrived(text) => {
                let arrival = time::at_local(date, time::parse_clock(text)?);
                self.detector
                    .set_eta_or_arrival(&mut sailing, Some(arrival), false)
                    .await?;
                self.detector.set_arrived(&mut sailing, true).await?;
            }
        }

        let status = self.resolver.resolve_status(&row.status).await?;
        self.detector.set_status(&mut sailing, &status).await?;
        Ok(())
    }

    // -- conditions --

    pub async fn ingest_conditions(&self, source: PageSource) -> Result<(), AppError> {
        let _guard = self.locks.conditions.lock().await;
        let run = self.ledger.begin_run(SourceKind::Conditions).await?;

        let payload = match source {
            PageSource::Live => {
                self.fetch_or_fail(&run, &endpoints::conditions_url())
                    .await?
            }
            PageSource::Payload(payload) => {
                self.ledger.record_raw_capture(&run, &payload, None).await?;
                payload
            }
        };
        self.ledger.set_status(&run, "Data retrieved", false).await?;

        let page = match pages::conditions::parse_conditions(&payload) {
            Ok(page) => page,
            Err(err) => return self.fail_run(&run, "Could not parse the conditions page", err).await,
        };

        if let Err(err) = self.apply_conditions(&page).await {
            return self.fail_run(&run, "Processing conditions failed", err).await;
        }

        self.ledger.set_status(&run, "Completed", true).await?;
        info!("finished retrieving and processing conditions");
        Ok(())
    }

    async fn apply_conditions(&self, page: &ConditionsPage) -> Result<(), AppError> {
        let now = self.clock.now();
        let today = time::local_day(now);
        for entry in &page.routes {
            match self.apply_conditions_route(entry, now, today).await {
                Err(err) if err.is_record_skip() => {
                    warn!(route = %entry.name, %err, "skipping conditions route");
                }
                other => other?,
            }
        }
        Ok(())
    }

    async fn apply_conditions_route(
        &self,
        entry: &ConditionsRoute,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let mut route = self.resolver.require_route_by_name(&entry.name).await?;

        if entry.fully_booked_today {
            debug!(route = %route.name, "all remaining sailings today are fully booked");
            let (_, day_end) = time::local_day_bounds(now);
            for mut sailing in self.store().sailings_in_range(route.id, now, day_end).await? {
                self.detector.set_percent_full(&mut sailing, 100).await?;
            }
        }

        self.detector.set_car_waits(&mut route, entry.car_waits).await?;
        self.detector
            .set_oversize_waits(&mut route, entry.oversize_waits)
            .await?;

        match &entry.sailings {
            Some(rows) => {
                for row in rows {
                    let scheduled = time::at_local(today, time::parse_clock(&row.time)?);
                    let (mut sailing, _) = self.resolver.resolve_sailing(&route, scheduled).await?;
                    if row.cancelled {
                        self.detector.set_cancelled(&mut sailing).await?;
                    } else if let Some(percent) = row.percent_full {
                        self.detector.set_percent_full(&mut sailing, percent).await?;
                    }
                }
            }
            None => debug!(route = %route.name, "no near-term sailing detail for this route"),
        }

        for later in time::resolve_later_sailings(&entry.later, today)? {
            let (mut sailing, _) = self.resolver.resolve_sailing(&route, later.departure).await?;
            if later.cancelled {
                self.detector.set_cancelled(&mut sailing).await?;
            }
        }
        Ok(())
    }

    // -- sailing detail --

    pub async fn ingest_sailing_detail(&self, source: PageSource) -> Result<(), AppError> {
        let _guard = self.locks.detail.lock().await;
        let run = self.ledger.begin_run(SourceKind::SailingDetail).await?;

        let mut payloads = Vec::new();
        match source {
            PageSource::Payload(payload) => {
                self.ledger.record_raw_capture(&run, &payload, None).await?;
                payloads.push(payload);
            }
            PageSource::Live => {
                for route in self.store().routes().await? {
                    let Some(terminal) = self.store().terminal(route.source_id).await? else {
                        warn!(route = %route.name, "route has no source terminal, skipping");
                        continue;
                    };
                    let url =
                        endpoints::sailing_detail_url(route.route_code, &terminal.short_name);
                    self.fetch_lenient(&run, &url, &mut payloads).await?;
                }

                // every page links the day's other sailings via a dropdown
                let follow_ups: Vec<String> = payloads
                    .iter()
                    .flat_map(|payload| pages::detail::parse_detail_links(payload))
                    .collect();
                for option_value in follow_ups {
                    let url = endpoints::detail_follow_url(&option_value);
                    self.fetch_lenient(&run, &url, &mut payloads).await?;
                }
            }
        }
        self.ledger.set_status(&run, "Data retrieved", false).await?;

        for payload in &payloads {
            let page = match pages::detail::parse_detail(payload) {
                Ok(page) => page,
                Err(err) => {
                    return self
                        .fail_run(&run, "Could not parse a sailing detail page", err)
                        .await;
                }
            };
            match self.apply_detail_page(&page).await {
                Err(err) if err.is_record_skip() => {
                    warn!(route = %page.route_name, %err, "skipping sailing detail page");
                }
                Err(err) => {
                    return self.fail_run(&run, "Processing sailing detail failed", err).await;
                }
                Ok(()) => {}
            }
        }

        self.ledger.set_status(&run, "Completed", true).await?;
        info!("finished retrieving and processing sailing detail pages");
        Ok(())
    }

    async fn apply_detail_page(&self, page: &SailingDetailPage) -> Result<(), AppError> {
        let route = self.resolver.require_route_by_name(&page.route_name).await?;
        let mut terminal = self.resolver.require_terminal(&page.terminal_code).await?;

        if let Some(detail) = &page.sailing {
            let today = time::local_day(self.clock.now());
            let scheduled = time::at_local(today, time::parse_clock(&detail.scheduled)?);
            let (mut sailing, _) = self.resolver.resolve_sailing(&route, scheduled).await?;

            if let Some(minutes) = route.duration
                && sailing.fill_scheduled_arrival(minutes)
            {
                self.store().update_sailing(&sailing).await?;
            }

            if detail.cancelled {
                self.detector.set_cancelled(&mut sailing).await?;
            } else {
                if let Some(percent) = detail.car_percent {
                    self.detector
                        .set_car_percent_full(&mut sailing, percent)
                        .await?;
                }
                if let Some(percent) = detail.oversize_percent {
                    self.detector
                        .set_oversize_percent_full(&mut sailing, percent)
                        .await?;
                }
                if let Some(name) = &detail.ferry {
                    let ferry = self.resolver.resolve_ferry(name).await?;
                    self.detector.set_sailing_ferry(&mut sailing, &ferry).await?;
                }
            }
        }

        if let Some(percent) = page.parking_percent {
            self.detector.set_parking(&mut terminal, percent).await?;
        }
        Ok(())
    }

    // -- locations --

    pub async fn ingest_locations(&self, source: PageSource) -> Result<(), AppError> {
        let _guard = self.locks.locations.lock().await;
        let run = self.ledger.begin_run(SourceKind::Locations).await?;

        let mut captured = Vec::new();
        match source {
            PageSource::Payload(payload) => {
                self.ledger.record_raw_capture(&run, &payload, None).await?;
                captured.push(("0".to_string(), payload));
            }
            PageSource::Live => {
                for route_id in endpoints::MAP_ROUTE_IDS {
                    let url = endpoints::locations_url(route_id);
                    self.ledger
                        .set_status(&run, &format!("Querying for locations: {url}"), false)
                        .await?;
                    let payload = self.fetch_or_fail(&run, &url).await?;
                    captured.push((route_id.to_string(), payload));
                    tokio::time::sleep(self.polite_delay).await;
                }
            }
        }
        self.ledger.set_status(&run, "Data retrieved", false).await?;

        for (route_id, payload) in &captured {
            let page = match pages::locations::parse_locations(route_id, payload) {
                Ok(page) => page,
                Err(err) => {
                    return self.fail_run(&run, "Could not parse a locations page", err).await;
                }
            };
            if let Err(err) = self.apply_locations(&page).await {
                return self.fail_run(&run, "Processing locations failed", err).await;
            }
        }

        self.ledger.set_status(&run, "Completed", true).await?;
        info!("finished retrieving and processing locations");
        Ok(())
    }

    async fn apply_locations(&self, page: &LocationsPage) -> Result<(), AppError> {
        let heading_route = endpoints::HEADING_ROUTE_IDS.contains(&page.route_id.as_str());
        let now = self.clock.now();
        let today = time::local_day(now);

        for row in &page.rows {
            match self.apply_location_row(row, heading_route, now, today).await {
                Err(err) if err.is_record_skip() => {
                    warn!(ferry = %row.ferry, %err, "skipping location row");
                }
                other => other?,
            }
        }
        Ok(())
    }

    async fn apply_location_row(
        &self,
        row: &LocationRow,
        heading_route: bool,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<(), AppError> {
        let mut ferry = self.resolver.resolve_ferry(&row.ferry).await?;
        let seen = time::roll_back_if_future(
            time::at_local(today, time::parse_clock(&row.time)?),
            now,
        );

        let mut changed = false;
        if heading_route {
            changed |= self.detector.set_heading(&mut ferry, &row.destination).await?;
        } else {
            match self.resolver.destination_for_location(&row.destination).await? {
                Some(destination) => {
                    changed |= self.detector.set_destination(&mut ferry, &destination).await?;
                }
                None => {
                    return Err(AppError::UnknownEntity(format!(
                        "destination {}",
                        row.destination
                    )));
                }
            }
        }

        match FerryStatus::from_label(&row.status) {
            Some(status) => {
                changed |= self.detector.set_ferry_status(&mut ferry, status).await?;
            }
            None => warn!(status = %row.status, "unknown ferry status"),
        }

        if changed {
            self.detector.touch_ferry_seen(&mut ferry, seen).await?;
        }
        Ok(())
    }

    // -- run plumbing --

    /// Fetch one page and capture it, failing the run on any error.
    async fn fetch_or_fail(&self, run: &RunHandle, url: &str) -> Result<String, AppError> {
        match self.fetcher.fetch(url).await {
            Ok(payload) => {
                self.ledger
                    .record_raw_capture(run, &payload, Some(url))
                    .await?;
                Ok(payload)
            }
            Err(err) => {
                error!(%url, %err, "could not retrieve page");
                self.ledger
                    .set_status(run, "Could not retrieve page from the operator site", false)
                    .await?;
                Err(err)
            }
        }
    }

    /// Fetch one of many per-route pages; a failure skips that page.
    async fn fetch_lenient(
        &self,
        run: &RunHandle,
        url: &str,
        payloads: &mut Vec<String>,
    ) -> Result<(), AppError> {
        debug!(%url, "querying");
        match self.fetcher.fetch(url).await {
            Ok(payload) => {
                self.ledger
                    .record_raw_capture(run, &payload, Some(url))
                    .await?;
                payloads.push(payload);
            }
            Err(err) => warn!(%url, %err, "could not retrieve page, skipping"),
        }
        tokio::time::sleep(self.polite_delay).await;
        Ok(())
    }

    async fn fail_run(
        &self,
        run: &RunHandle,
        message: &str,
        err: AppError,
    ) -> Result<(), AppError> {
        error!(%err, status = message, "run failed");
        self.ledger.set_status(run, message, false).await?;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use sealane_core::events::{EventKind, Subject};
    use sealane_core::store::{MemoryLedger, MemoryStore};
    use sealane_core::testutil::{FixedClock, MockFetcher};

    type Service = IngestService<MockFetcher, MemoryStore, MemoryLedger, FixedClock>;

    const DEPARTURES: &str = r##"
    <html><body>
    <span class="titleSmInv">November 19, 2018</span>
    <table><tr><td class="content"><table>
      <tr><td>
        <a name="#TSA1"></a>
        <table><tr><td><span>Tsawwassen to Swartz Bay<br/>Sailing time: 1 hour 35 minutes</span></td></tr></table>
        <table>
          <tr><td>Ferry</td><td>Scheduled</td><td>Actual</td><td>ETA/Arrival</td><td>Status</td></tr>
          <tr><td>Spirit of British Columbia</td><td>10:00 AM</td><td>10:07 AM</td><td>ETA: 11:40 AM</td><td>On Time</td></tr>
          <tr><td>Spirit of Vancouver Island</td><td>8:00 AM</td><td>8:02 AM</td><td>9:35 AM</td><td>On Time</td></tr>
        </table>
      </td></tr>
    </table></td></tr></table>
    </body></html>
    "##;

    fn local(day: (i32, u32, u32), h: u32, m: u32) -> DateTime<Utc> {
        time::at_local(
            chrono::NaiveDate::from_ymd_opt(day.0, day.1, day.2).unwrap(),
            NaiveTime::from_hms_opt(h, m, 0).unwrap(),
        )
    }

    fn noon() -> DateTime<Utc> {
        local((2018, 11, 19), 12, 0)
    }

    fn service_at(fetcher: MockFetcher, when: DateTime<Utc>) -> (Service, MemoryStore, MemoryLedger) {
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let service = IngestService::new(fetcher, store.clone(), ledger.clone(), FixedClock::new(when))
            .with_polite_delay(Duration::ZERO);
        (service, store, ledger)
    }

    async fn seed_route(store: &MemoryStore) -> Route {
        let (src, _) = store.find_or_create_terminal("Tsawwassen", "TSA").await.unwrap();
        let (dst, _) = store.find_or_create_destination("Swartz Bay", None).await.unwrap();
        let (route, _) = store
            .find_or_create_route("Tsawwassen to Swartz Bay", src.id, dst.id, 1)
            .await
            .unwrap();
        route
    }

    #[tokio::test]
    async fn test_departures_pass_builds_entities_and_events() {
        let (service, store, ledger) = service_at(MockFetcher::new(DEPARTURES), noon());
        service
            .ingest_departures(PageSource::Payload(DEPARTURES.to_string()))
            .await
            .unwrap();

        let routes = store.routes().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].duration, Some(95));
        assert!(store.terminal_by_short_name("TSA").await.unwrap().is_some());

        let sailings = store.sailings_for_route(routes[0].id).await.unwrap();
        assert_eq!(sailings.len(), 2);

        // the 10:00 sailing is under way with an ETA
        let under_way = &sailings[1];
        assert_eq!(under_way.scheduled_departure, local((2018, 11, 19), 10, 0));
        assert_eq!(under_way.actual_departure, Some(local((2018, 11, 19), 10, 7)));
        assert!(under_way.departed && !under_way.arrived);
        assert_eq!(under_way.late_leaving, Some(7));
        assert_eq!(under_way.eta_or_arrival, Some(local((2018, 11, 19), 11, 40)));
        assert_eq!(under_way.scheduled_arrival, Some(local((2018, 11, 19), 11, 35)));

        let events = store.events_for(Subject::Sailing(under_way.id)).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
        assert!(matches!(kinds[0], EventKind::Ferry { .. }));
        assert!(matches!(kinds[1], EventKind::DepartureTime { .. }));
        assert!(matches!(kinds[2], EventKind::Departed));
        assert!(matches!(kinds[3], EventKind::ArrivalTime { is_eta: true, .. }));
        assert!(matches!(&kinds[4], EventKind::Status { old: None, new } if new == "On Time"));
        assert_eq!(kinds.len(), 5);

        // the 8:00 sailing has arrived
        let arrived = &sailings[0];
        assert!(arrived.departed && arrived.arrived);
        assert_eq!(arrived.duration, Some(93));
        let events = store.events_for(Subject::Sailing(arrived.id)).await.unwrap();
        assert!(events.iter().any(|e| matches!(
            e.kind,
            EventKind::ArrivalTime { is_eta: false, .. }
        )));
        assert!(events.iter().any(|e| matches!(e.kind, EventKind::Arrived)));

        let run = ledger.last_run().unwrap().unwrap();
        assert!(run.successful);
        assert_eq!(run.status.as_deref(), Some("Completed"));
        assert_eq!(run.captures.len(), 1);
    }

    #[tokio::test]
    async fn test_second_identical_pass_adds_no_events() {
        let (service, store, _) = service_at(MockFetcher::new(DEPARTURES), noon());
        let source = || PageSource::Payload(DEPARTURES.to_string());

        service.ingest_departures(source()).await.unwrap();
        let after_first = store.event_count().await.unwrap();
        let sailings_before = store.all_sailings().unwrap();

        service.ingest_departures(source()).await.unwrap();
        assert_eq!(store.event_count().await.unwrap(), after_first);
        assert_eq!(store.all_sailings().unwrap(), sailings_before);
    }

    // same page, but the 10:00 sailing has lost its actual time and ETA
    const DEPARTURES_REVERTED: &str = r##"
    <html><body>
    <span class="titleSmInv">November 19, 2018</span>
    <table><tr><td class="content"><table>
      <tr><td>
        <a name="#TSA1"></a>
        <table><tr><td><span>Tsawwassen to Swartz Bay<br/>Sailing time: 1 hour 35 minutes</span></td></tr></table>
        <table>
          <tr><td>Ferry</td><td>Scheduled</td><td>Actual</td><td>ETA/Arrival</td><td>Status</td></tr>
          <tr><td>Spirit of British Columbia</td><td>10:00 AM</td><td></td><td>...</td><td>On Time</td></tr>
          <tr><td>Spirit of Vancouver Island</td><td>8:00 AM</td><td>8:02 AM</td><td>9:35 AM</td><td>On Time</td></tr>
        </table>
      </td></tr>
    </table></td></tr></table>
    </body></html>
    "##;

    #[tokio::test]
    async fn test_reappearing_sailing_without_actual_time_is_reverted() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        service
            .ingest_departures(PageSource::Payload(DEPARTURES.to_string()))
            .await
            .unwrap();
        service
            .ingest_departures(PageSource::Payload(DEPARTURES_REVERTED.to_string()))
            .await
            .unwrap();

        let route = &store.routes().await.unwrap()[0];
        let sailings = store.sailings_for_route(route.id).await.unwrap();
        let reverted = &sailings[1];
        assert_eq!(reverted.scheduled_departure, local((2018, 11, 19), 10, 0));
        assert!(!reverted.departed);
        assert_eq!(reverted.actual_departure, None);
        assert_eq!(reverted.late_leaving, None);
        assert_eq!(reverted.eta_or_arrival, None);

        let events = store.events_for(Subject::Sailing(reverted.id)).await.unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
        assert!(matches!(
            kinds[5],
            EventKind::DepartureTime { old: Some(_), new: None }
        ));
        assert!(matches!(kinds[6], EventKind::Departed));
        assert!(matches!(
            kinds[7],
            EventKind::ArrivalTime { old: Some(_), new: None, .. }
        ));
        assert_eq!(kinds.len(), 8);

        // the unchanged 8:00 sailing picks up nothing new
        let untouched = &sailings[0];
        assert!(untouched.departed && untouched.arrived);
        assert_eq!(
            store.events_for(Subject::Sailing(untouched.id)).await.unwrap().len(),
            6
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_run_without_touching_entities() {
        let fetcher = MockFetcher::with_error(AppError::Fetch("HTTP 500 for page".into()));
        let (service, store, ledger) = service_at(fetcher, noon());

        let err = service.ingest_departures(PageSource::Live).await.unwrap_err();
        assert!(err.is_fetch_failure());

        let run = ledger.last_run().unwrap().unwrap();
        assert!(!run.successful);
        assert!(run.captures.is_empty());
        assert_eq!(store.entity_count().unwrap(), 0);
        assert_eq!(store.event_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_page_fails_run() {
        let (service, _, ledger) = service_at(MockFetcher::new(""), noon());
        let err = service
            .ingest_departures(PageSource::Payload("<html><body></body></html>".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedPage { .. }));

        let run = ledger.last_run().unwrap().unwrap();
        assert!(!run.successful);
        assert_eq!(
            run.status.as_deref(),
            Some("Could not parse the departures page")
        );
    }

    const CONDITIONS_FULLY_BOOKED: &str = r#"
    <html><body><table>
    <tbody>
      <tr><td>Route</td><td>Next</td><td>Car</td><td>Oversize</td><td>Later</td><td></td><td></td><td></td></tr>
      <tr>
        <td>Tsawwassen to Swartz Bay</td>
        <td><div>N/A</div></td>
        <td></td><td></td>
        <td></td>
        <td></td><td></td>
        <td><a href="sailingDetail.asp?route=1&dept=TSA">details</a></td>
      </tr>
      <tr><td>Vehicle space on this route is fully booked for today.</td></tr>
      <tr><td>footer</td></tr>
    </tbody>
    </table></body></html>
    "#;

    #[tokio::test]
    async fn test_fully_booked_route_forces_remaining_sailings_to_100() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        let route = seed_route(&store).await;

        // three sailings later today, one already full, one this morning
        for hour in [15, 17, 19] {
            store
                .find_or_create_sailing(route.id, local((2018, 11, 19), hour, 0))
                .await
                .unwrap();
        }
        let (mut full, _) = store
            .find_or_create_sailing(route.id, local((2018, 11, 19), 21, 0))
            .await
            .unwrap();
        full.percent_full = Some(100);
        store.update_sailing(&full).await.unwrap();
        store
            .find_or_create_sailing(route.id, local((2018, 11, 19), 8, 0))
            .await
            .unwrap();

        service
            .ingest_conditions(PageSource::Payload(CONDITIONS_FULLY_BOOKED.to_string()))
            .await
            .unwrap();

        let mut percent_events = 0;
        for sailing in store.sailings_for_route(route.id).await.unwrap() {
            let events = store.events_for(Subject::Sailing(sailing.id)).await.unwrap();
            percent_events += events
                .iter()
                .filter(|e| matches!(e.kind, EventKind::PercentFull { .. }))
                .count();
            if sailing.scheduled_departure > noon() {
                assert_eq!(sailing.percent_full, Some(100));
            } else {
                // the morning sailing already departed and is left alone
                assert_eq!(sailing.percent_full, None);
            }
        }
        assert_eq!(percent_events, 3);
    }

    const CONDITIONS_DETAIL: &str = r#"
    <html><body><table>
    <tbody>
      <tr><td>Route</td><td>Next</td><td>Car</td><td>Oversize</td><td>Later</td><td></td><td></td><td></td></tr>
      <tr>
        <td>Tsawwassen to Swartz Bay</td>
        <td><div><table>
          <tr><td>3:00pm</td><td>73% full</td></tr>
          <tr><td>4:00pm</td><td>Cancelled</td></tr>
        </table></div></td>
        <td>2</td>
        <td>0</td>
        <td>7:00pm *6:00am</td>
        <td></td><td></td>
        <td><a href="sailingDetail.asp?route=1&dept=TSA">details</a></td>
      </tr>
      <tr><td>footer</td></tr>
    </tbody>
    </table></body></html>
    "#;

    #[tokio::test]
    async fn test_conditions_updates_waits_fullness_and_later_sailings() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        let route = seed_route(&store).await;

        service
            .ingest_conditions(PageSource::Payload(CONDITIONS_DETAIL.to_string()))
            .await
            .unwrap();

        let route = store.route(route.id).await.unwrap().unwrap();
        assert_eq!(route.car_waits, Some(2));
        assert_eq!(route.oversize_waits, Some(0));

        let sailings = store.sailings_for_route(route.id).await.unwrap();
        let departures: Vec<_> = sailings.iter().map(|s| s.scheduled_departure).collect();
        assert_eq!(
            departures,
            vec![
                local((2018, 11, 19), 15, 0),
                local((2018, 11, 19), 16, 0),
                local((2018, 11, 19), 19, 0),
                local((2018, 11, 20), 6, 0),
            ]
        );
        assert_eq!(sailings[0].percent_full, Some(73));
        assert!(sailings[1].cancelled);
        let cancelled_events = store
            .events_for(Subject::Sailing(sailings[1].id))
            .await
            .unwrap();
        assert!(cancelled_events.iter().any(|e| matches!(e.kind, EventKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_conditions_unknown_route_is_skipped_not_fatal() {
        let (service, store, ledger) = service_at(MockFetcher::new(""), noon());
        // no routes seeded: the page's route is unknown

        service
            .ingest_conditions(PageSource::Payload(CONDITIONS_DETAIL.to_string()))
            .await
            .unwrap();

        assert_eq!(store.event_count().await.unwrap(), 0);
        assert!(store.routes().await.unwrap().is_empty());
        let run = ledger.last_run().unwrap().unwrap();
        assert!(run.successful);
    }

    const DETAIL: &str = r#"
    <html><body>
    <font>Tsawwassen to Swartz Bay</font>
    <a href="arrivals-departures.html?dept=TSA&route=01">schedule</a>
    <span>Sailing Details: 10:00 AM</span>
    <select>
      <option value="sailingDetail.asp?route=01&dept=TSA&time=12:00PM">12:00 PM</option>
      <option value="sailingDetail.asp?route=01&dept=TSA&time=2:00PM">2:00 PM</option>
    </select>
    <a href="DeckSpace_pop.asp" onclick='window.open("DeckSpace_pop.asp?os=41&uh=73&tm=1542650400")'>Deck space</a>
    <a href="/onboard/spirit.html">Spirit of British Columbia</a>
    <table><tr>
      <td><a href="parking.html">Parking</a> 55% available</td>
    </tr></table>
    </body></html>
    "#;

    #[tokio::test]
    async fn test_detail_page_updates_deck_space_ferry_and_parking() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        let route = seed_route(&store).await;

        service
            .ingest_sailing_detail(PageSource::Payload(DETAIL.to_string()))
            .await
            .unwrap();

        let sailing = store
            .sailing_by_key(route.id, local((2018, 11, 19), 10, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sailing.car_percent_full, Some(73));
        assert_eq!(sailing.oversize_percent_full, Some(41));
        assert!(sailing.ferry_id.is_some());

        let terminal = store.terminal_by_short_name("TSA").await.unwrap().unwrap();
        assert_eq!(terminal.parking, Some(55));
        let events = store.events_for(Subject::Terminal(terminal.id)).await.unwrap();
        assert!(matches!(events[0].kind, EventKind::Parking { old: None, new: 55 }));
    }

    #[tokio::test]
    async fn test_detail_walk_fetches_route_page_then_dropdown_links() {
        let fetcher = MockFetcher::repeating(DETAIL);
        let (service, store, ledger) = service_at(fetcher.clone(), noon());
        seed_route(&store).await;

        service.ingest_sailing_detail(PageSource::Live).await.unwrap();

        // one fetch per seeded route, then one per dropdown option
        let requested = fetcher.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec![
                endpoints::sailing_detail_url(1, "TSA"),
                endpoints::detail_follow_url("sailingDetail.asp?route=01&dept=TSA&time=12:00PM"),
                endpoints::detail_follow_url("sailingDetail.asp?route=01&dept=TSA&time=2:00PM"),
            ]
        );

        let run = ledger.last_run().unwrap().unwrap();
        assert!(run.successful);
        assert_eq!(run.captures.len(), 3);
    }

    const LOCATIONS: &str = r#"
    <html><body><table>
      <tr><td>Ferry</td><td>Status</td><td>Destination</td><td>Time</td></tr>
      <tr><td>Spirit of British Columbia</td><td>Under Way</td><td>Swartz Bay</td><td>10:15</td></tr>
      <tr><td>Queen of New Westminster</td><td>Lost At Sea</td><td>Swartz Bay</td><td>10:12</td></tr>
    </table></body></html>
    "#;

    #[tokio::test]
    async fn test_locations_sets_destination_and_status() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        store
            .find_or_create_destination("Swartz Bay (Victoria)", None)
            .await
            .unwrap();

        service
            .ingest_locations(PageSource::Payload(LOCATIONS.to_string()))
            .await
            .unwrap();

        let ferries = store.ferries().await.unwrap();
        assert_eq!(ferries.len(), 2);

        let spirit = ferries.iter().find(|f| f.name.starts_with("Spirit")).unwrap();
        assert_eq!(spirit.status, Some(FerryStatus::UnderWay));
        assert!(spirit.destination_id.is_some());
        assert_eq!(spirit.last_updated, Some(local((2018, 11, 19), 10, 15)));
        let events = store.events_for(Subject::Ferry(spirit.id)).await.unwrap();
        assert!(matches!(&events[0].kind, EventKind::Destination { new } if new == "Swartz Bay (Victoria)"));
        assert!(matches!(events[1].kind, EventKind::UnderWay));

        // the unknown status label changes nothing on that ferry
        let queen = ferries.iter().find(|f| f.name.starts_with("Queen")).unwrap();
        assert_eq!(queen.status, None);
    }

    #[tokio::test]
    async fn test_heading_routes_track_heading_instead_of_destination() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        let page = LocationsPage {
            route_id: "13".to_string(),
            rows: vec![LocationRow {
                ferry: "Queen of Capilano".to_string(),
                status: "Under Way".to_string(),
                destination: "NW".to_string(),
                time: "10:20".to_string(),
            }],
        };

        service.apply_locations(&page).await.unwrap();

        let ferry = &store.ferries().await.unwrap()[0];
        assert_eq!(ferry.heading.as_deref(), Some("NW"));
        assert_eq!(ferry.destination_id, None);
        let events = store.events_for(Subject::Ferry(ferry.id)).await.unwrap();
        assert!(matches!(&events[0].kind, EventKind::Heading { old: None, new } if new == "NW"));
    }

    #[tokio::test]
    async fn test_location_row_with_unknown_destination_is_skipped() {
        let (service, store, ledger) = service_at(MockFetcher::new(""), noon());
        // no destinations seeded, so the prefix match finds nothing

        service
            .ingest_locations(PageSource::Payload(LOCATIONS.to_string()))
            .await
            .unwrap();

        // ferries were still resolved, but no destination or status applied
        // beyond the rows we could not place
        let run = ledger.last_run().unwrap().unwrap();
        assert!(run.successful);
        for ferry in store.ferries().await.unwrap() {
            assert_eq!(ferry.destination_id, None);
        }
    }

    #[tokio::test]
    async fn test_last_seen_time_in_the_future_rolls_back_a_day() {
        let early = local((2018, 11, 19), 6, 0);
        let (service, store, _) = service_at(MockFetcher::new(""), early);
        store
            .find_or_create_destination("Swartz Bay (Victoria)", None)
            .await
            .unwrap();

        let page = LocationsPage {
            route_id: "0".to_string(),
            rows: vec![LocationRow {
                ferry: "Spirit of British Columbia".to_string(),
                status: "In Port".to_string(),
                destination: "Swartz Bay".to_string(),
                time: "23:45".to_string(),
            }],
        };
        service.apply_locations(&page).await.unwrap();

        let ferry = &store.ferries().await.unwrap()[0];
        assert_eq!(ferry.last_updated, Some(local((2018, 11, 18), 23, 45)));
    }

    #[tokio::test]
    async fn test_runs_of_one_kind_are_serialized() {
        let (service, store, _) = service_at(MockFetcher::new(""), noon());
        let a = service.clone();
        let b = service.clone();

        let (first, second) = tokio::join!(
            a.ingest_departures(PageSource::Payload(DEPARTURES.to_string())),
            b.ingest_departures(PageSource::Payload(DEPARTURES.to_string())),
        );
        first.unwrap();
        second.unwrap();

        // both passes completed against the same entities without duplicates
        assert_eq!(store.routes().await.unwrap().len(), 1);
        let route = &store.routes().await.unwrap()[0];
        assert_eq!(store.sailings_for_route(route.id).await.unwrap().len(), 2);
    }
}
