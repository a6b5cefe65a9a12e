//! Entity resolution: parsed records to canonical entities.
//!
//! Resolution is get-or-create by natural key. First sightings create the
//! entity and log at info; repeat sightings log at debug. Records that
//! reference a route or terminal the store has never seen resolve to
//! `UnknownRoute`/`UnknownEntity`, which callers treat as a per-record
//! skip rather than a batch failure.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Destination, Ferry, Route, Sailing, Status, Terminal};
use crate::records::RouteSection;
use crate::traits::EntityStore;

#[derive(Clone)]
pub struct Resolver<S> {
    store: S,
}

impl<S: EntityStore> Resolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn resolve_terminal(
        &self,
        name: &str,
        short_name: &str,
    ) -> Result<Terminal, AppError> {
        let (terminal, created) = self.store.find_or_create_terminal(name, short_name).await?;
        if created {
            info!(name, short_name, "created terminal");
        } else {
            debug!(short_name, "found terminal");
        }
        Ok(terminal)
    }

    pub async fn resolve_destination(
        &self,
        name: &str,
        terminal_id: Option<Uuid>,
    ) -> Result<Destination, AppError> {
        let (destination, created) = self
            .store
            .find_or_create_destination(name, terminal_id)
            .await?;
        if created {
            info!(name, "created destination");
        } else {
            debug!(name, "found destination");
        }
        Ok(destination)
    }

    pub async fn resolve_ferry(&self, name: &str) -> Result<Ferry, AppError> {
        let (ferry, created) = self.store.find_or_create_ferry(name).await?;
        if created {
            info!(name, "created ferry");
        } else {
            debug!(name, "found ferry");
        }
        Ok(ferry)
    }

    pub async fn resolve_status(&self, text: &str) -> Result<Status, AppError> {
        let (status, created) = self.store.find_or_create_status(text).await?;
        if created {
            info!(text, "created status");
        }
        Ok(status)
    }

    pub async fn resolve_sailing(
        &self,
        route: &Route,
        scheduled_departure: DateTime<Utc>,
    ) -> Result<(Sailing, bool), AppError> {
        let (sailing, created) = self
            .store
            .find_or_create_sailing(route.id, scheduled_departure)
            .await?;
        if created {
            info!(route = %route.name, %scheduled_departure, "created sailing");
        } else {
            debug!(route = %route.name, %scheduled_departure, "found sailing");
        }
        Ok((sailing, created))
    }

    /// Resolve every route section of a departures page.
    ///
    /// Source terminals resolve first; a destination whose name matches a
    /// source terminal on the same page links back to that terminal.
    pub async fn resolve_route_sections(
        &self,
        sections: &[RouteSection],
    ) -> Result<Vec<Route>, AppError> {
        let mut terminals_by_name: HashMap<String, Terminal> = HashMap::new();
        for section in sections {
            let terminal = self
                .resolve_terminal(&section.source, &section.source_code)
                .await?;
            terminals_by_name.insert(section.source.clone(), terminal);
        }

        let mut routes = Vec::with_capacity(sections.len());
        for section in sections {
            let source = terminals_by_name
                .get(&section.source)
                .ok_or_else(|| AppError::UnknownEntity(section.source.clone()))?;
            let backing = terminals_by_name.get(&section.destination).map(|t| t.id);
            let destination = self
                .resolve_destination(&section.destination, backing)
                .await?;

            let (route, created) = self
                .store
                .find_or_create_route(&section.name, source.id, destination.id, section.route_code)
                .await?;
            if created {
                info!(name = %route.name, code = route.route_code, "created route");
            } else {
                debug!(name = %route.name, "found route");
            }
            routes.push(route);
        }
        Ok(routes)
    }

    /// Route previously created from the departures page, by exact name.
    pub async fn require_route_by_name(&self, name: &str) -> Result<Route, AppError> {
        self.store
            .route_by_name(name)
            .await?
            .ok_or_else(|| AppError::UnknownRoute(name.to_string()))
    }

    /// Terminal previously created from the departures page, by short code.
    pub async fn require_terminal(&self, short_name: &str) -> Result<Terminal, AppError> {
        self.store
            .terminal_by_short_name(short_name)
            .await?
            .ok_or_else(|| AppError::UnknownEntity(short_name.to_string()))
    }

    /// Destination for a map-page row. The map abbreviates names, so this
    /// is a prefix match; `None` when nothing matches.
    pub async fn destination_for_location(
        &self,
        name: &str,
    ) -> Result<Option<Destination>, AppError> {
        self.store.destination_by_prefix(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn section(name: &str, source: &str, code: &str, destination: &str) -> RouteSection {
        RouteSection {
            name: name.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            source_code: code.to_string(),
            route_code: 1,
            duration: Some(95),
            sailings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_route_sections_resolve_once() {
        let resolver = Resolver::new(MemoryStore::new());
        let sections = vec![section(
            "Tsawwassen to Swartz Bay",
            "Tsawwassen",
            "TSA",
            "Swartz Bay",
        )];

        let first = resolver.resolve_route_sections(&sections).await.unwrap();
        let second = resolver.resolve_route_sections(&sections).await.unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(resolver.store().routes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_destination_links_to_matching_terminal() {
        let resolver = Resolver::new(MemoryStore::new());
        let sections = vec![
            section(
                "Tsawwassen to Swartz Bay",
                "Tsawwassen",
                "TSA",
                "Swartz Bay",
            ),
            section(
                "Swartz Bay to Tsawwassen",
                "Swartz Bay",
                "SWB",
                "Tsawwassen",
            ),
        ];

        let routes = resolver.resolve_route_sections(&sections).await.unwrap();
        let tsa = resolver.require_terminal("TSA").await.unwrap();

        let back = resolver
            .store()
            .destination(routes[1].destination_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(back.name, "Tsawwassen");
        assert_eq!(back.terminal_id, Some(tsa.id));
    }

    #[tokio::test]
    async fn test_unknown_route_is_a_record_skip() {
        let resolver = Resolver::new(MemoryStore::new());
        let err = resolver
            .require_route_by_name("Nowhere to Elsewhere")
            .await
            .unwrap_err();
        assert!(err.is_record_skip());
    }

    #[tokio::test]
    async fn test_unknown_terminal_is_a_record_skip() {
        let resolver = Resolver::new(MemoryStore::new());
        let err = resolver.require_terminal("XXX").await.unwrap_err();
        assert!(err.is_record_skip());
    }
}
