//! Read-side projections: entities rendered with their event history.
//!
//! These are the JSON shapes handed to whatever sits on top of the
//! pipeline. Identifier fields are replaced by display names and local
//! time renderings so the output reads without further lookups.

use serde::Serialize;

use crate::error::AppError;
use crate::events::{EventView, Subject};
use crate::models::{Ferry, Route, Sailing, Terminal};
use crate::time;
use crate::traits::EntityStore;

#[derive(Debug, Clone, Serialize)]
pub struct TerminalView {
    pub name: String,
    pub short_name: String,
    pub parking: Option<i32>,
    pub events: Vec<EventView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteView {
    pub name: String,
    pub route_code: u32,
    pub source: String,
    pub destination: String,
    pub duration: Option<i64>,
    pub car_waits: Option<i32>,
    pub oversize_waits: Option<i32>,
    pub events: Vec<EventView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FerryView {
    pub name: String,
    pub destination: Option<String>,
    pub heading: Option<String>,
    pub status: Option<&'static str>,
    pub last_updated: Option<String>,
    pub events: Vec<EventView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SailingView {
    pub route: String,
    pub ferry: Option<String>,
    pub scheduled_departure: String,
    pub scheduled_arrival: Option<String>,
    pub actual_departure: Option<String>,
    pub eta_or_arrival: Option<String>,
    pub status: Option<String>,
    pub state: &'static str,
    pub cancelled: bool,
    pub percent_full: Option<i32>,
    pub car_percent_full: Option<i32>,
    pub oversize_percent_full: Option<i32>,
    pub day_of_week: String,
    pub sailing_time: String,
    pub duration: Option<i64>,
    pub late_leaving: Option<i64>,
    pub late_arriving: Option<i64>,
    pub events: Vec<EventView>,
}

async fn events_for<S: EntityStore>(
    store: &S,
    subject: Subject,
) -> Result<Vec<EventView>, AppError> {
    Ok(store
        .events_for(subject)
        .await?
        .iter()
        .map(EventView::from)
        .collect())
}

pub async fn terminal_view<S: EntityStore>(
    store: &S,
    terminal: &Terminal,
) -> Result<TerminalView, AppError> {
    Ok(TerminalView {
        name: terminal.name.clone(),
        short_name: terminal.short_name.clone(),
        parking: terminal.parking,
        events: events_for(store, Subject::Terminal(terminal.id)).await?,
    })
}

pub async fn route_view<S: EntityStore>(store: &S, route: &Route) -> Result<RouteView, AppError> {
    let source = store
        .terminal(route.source_id)
        .await?
        .map(|t| t.name)
        .unwrap_or_default();
    let destination = store
        .destination(route.destination_id)
        .await?
        .map(|d| d.name)
        .unwrap_or_default();
    Ok(RouteView {
        name: route.name.clone(),
        route_code: route.route_code,
        source,
        destination,
        duration: route.duration,
        car_waits: route.car_waits,
        oversize_waits: route.oversize_waits,
        events: events_for(store, Subject::Route(route.id)).await?,
    })
}

pub async fn ferry_view<S: EntityStore>(store: &S, ferry: &Ferry) -> Result<FerryView, AppError> {
    let destination = match ferry.destination_id {
        Some(id) => store.destination(id).await?.map(|d| d.name),
        None => None,
    };
    Ok(FerryView {
        name: ferry.name.clone(),
        destination,
        heading: ferry.heading.clone(),
        status: ferry.status.map(|s| s.label()),
        last_updated: ferry.last_updated.map(time::local_stamp),
        events: events_for(store, Subject::Ferry(ferry.id)).await?,
    })
}

pub async fn sailing_view<S: EntityStore>(
    store: &S,
    sailing: &Sailing,
) -> Result<SailingView, AppError> {
    let route = store
        .route(sailing.route_id)
        .await?
        .map(|r| r.name)
        .unwrap_or_default();
    let ferry = match sailing.ferry_id {
        Some(id) => store.ferry(id).await?.map(|f| f.name),
        None => None,
    };
    let status = match sailing.status_id {
        Some(id) => store.status(id).await?.map(|s| s.text),
        None => None,
    };
    Ok(SailingView {
        route,
        ferry,
        scheduled_departure: time::local_stamp(sailing.scheduled_departure),
        scheduled_arrival: sailing.scheduled_arrival.map(time::local_stamp),
        actual_departure: sailing.actual_departure.map(time::local_stamp),
        eta_or_arrival: sailing.eta_or_arrival.map(time::local_stamp),
        status,
        state: sailing.state(),
        cancelled: sailing.cancelled,
        percent_full: sailing.percent_full,
        car_percent_full: sailing.car_percent_full,
        oversize_percent_full: sailing.oversize_percent_full,
        day_of_week: sailing.day_of_week.clone(),
        sailing_time: sailing.sailing_time.clone(),
        duration: sailing.duration,
        late_leaving: sailing.late_leaving,
        late_arriving: sailing.late_arriving,
        events: events_for(store, Subject::Sailing(sailing.id)).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventKind};
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_sailing_view_resolves_names_and_events() {
        let store = MemoryStore::new();
        let (src, _) = store.find_or_create_terminal("Tsawwassen", "TSA").await.unwrap();
        let (dst, _) = store
            .find_or_create_destination("Swartz Bay", None)
            .await
            .unwrap();
        let (route, _) = store
            .find_or_create_route("Tsawwassen to Swartz Bay", src.id, dst.id, 1)
            .await
            .unwrap();
        let (mut sailing, _) = store
            .find_or_create_sailing(route.id, Utc::now())
            .await
            .unwrap();
        let (ferry, _) = store.find_or_create_ferry("Spirit of British Columbia").await.unwrap();
        sailing.ferry_id = Some(ferry.id);
        store.update_sailing(&sailing).await.unwrap();
        store
            .append_event(Event::new(
                Utc::now(),
                Subject::Sailing(sailing.id),
                EventKind::Departed,
            ))
            .await
            .unwrap();

        let view = sailing_view(&store, &sailing).await.unwrap();
        assert_eq!(view.route, "Tsawwassen to Swartz Bay");
        assert_eq!(view.ferry.as_deref(), Some("Spirit of British Columbia"));
        assert_eq!(view.state, "Not departed");
        assert_eq!(view.events.len(), 1);
        assert_eq!(view.events[0].text, "Set as departed");
    }

    #[tokio::test]
    async fn test_route_view_names_endpoints() {
        let store = MemoryStore::new();
        let (src, _) = store.find_or_create_terminal("Horseshoe Bay", "HSB").await.unwrap();
        let (dst, _) = store
            .find_or_create_destination("Departure Bay", None)
            .await
            .unwrap();
        let (route, _) = store
            .find_or_create_route("Horseshoe Bay to Departure Bay", src.id, dst.id, 3)
            .await
            .unwrap();

        let view = route_view(&store, &route).await.unwrap();
        assert_eq!(view.source, "Horseshoe Bay");
        assert_eq!(view.destination, "Departure Bay");
        assert_eq!(view.route_code, 3);
    }
}
