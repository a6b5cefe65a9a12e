//! Departures overview page ("actualDepartures").
//!
//! The page is one outer content table holding, per route, a header
//! table (route name and crossing time, preceded by a named anchor
//! carrying the terminal and route codes) followed by a table of
//! sailing rows.

use chrono::NaiveDate;
use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;

use sealane_core::error::AppError;
use sealane_core::records::{DeparturesPage, EtaOrArrival, RouteSection, SailingRow, SourceKind};

use super::{selector, text_of};

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#([A-Z]+)(\d+)").unwrap());
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*?)<br\s*/?>\s*Sailing time:\s*(.*)$").unwrap());
static ROUTE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(.*) to (.*)").unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:(\d+)\s*hours?)?\s*(?:(\d+)\s*minutes)?").unwrap());

pub fn parse_departures(html: &str) -> Result<DeparturesPage, AppError> {
    let doc = Html::parse_document(html);
    let kind = SourceKind::Departures;

    let date_text = doc
        .select(&selector("span.titleSmInv"))
        .next()
        .map(text_of)
        .ok_or_else(|| AppError::malformed(kind, "missing page date"))?;
    let date = parse_page_date(&date_text)?;

    // one named anchor per route, in the same document order as the tables
    let anchors: Vec<(String, u32)> = doc
        .select(&selector("a[name]"))
        .filter_map(|a| a.value().attr("name"))
        .filter_map(|name| {
            let caps = ANCHOR_RE.captures(name)?;
            let code = caps[2].parse().ok()?;
            Some((caps[1].to_string(), code))
        })
        .collect();

    let tables: Vec<_> = doc.select(&selector("td.content > table table")).collect();
    if tables.is_empty() || tables.len() % 2 != 0 {
        return Err(AppError::malformed(kind, "route tables do not pair up"));
    }
    if anchors.len() != tables.len() / 2 {
        return Err(AppError::malformed(kind, "route anchors do not match tables"));
    }

    let mut routes = Vec::with_capacity(anchors.len());
    for (pair, (source_code, route_code)) in tables.chunks(2).zip(anchors) {
        let header = pair[0]
            .select(&selector("span"))
            .next()
            .ok_or_else(|| AppError::malformed(kind, "route header has no title"))?;
        let header_html = header.inner_html();
        let caps = HEADER_RE
            .captures(header_html.trim())
            .ok_or_else(|| AppError::malformed(kind, "route header did not match"))?;
        let name = caps[1].trim().to_string();
        let duration = parse_duration(caps[2].trim())?;

        let endpoints = ROUTE_NAME_RE
            .captures(&name)
            .ok_or_else(|| AppError::malformed(kind, "route name has no endpoints"))?;
        let source = endpoints[1].to_string();
        let destination = endpoints[2].to_string();

        let mut sailings = Vec::new();
        for row in pair[1].select(&selector("tr")).skip(1) {
            let cells: Vec<String> = row.select(&selector("td")).map(text_of).collect();
            let [ferry, scheduled, actual, eta_or_arrival, status] = cells.as_slice() else {
                return Err(AppError::malformed(kind, "sailing row is not 5 cells"));
            };
            sailings.push(SailingRow {
                ferry: ferry.clone(),
                scheduled: scheduled.clone(),
                actual: (!actual.is_empty()).then(|| actual.clone()),
                eta_or_arrival: classify_eta(eta_or_arrival),
                status: status.clone(),
            });
        }

        routes.push(RouteSection {
            name,
            source,
            destination,
            source_code,
            route_code,
            duration,
            sailings,
        });
    }

    Ok(DeparturesPage { date, routes })
}

/// The page prints the service date as e.g. "November 19, 2018",
/// sometimes with a leading weekday.
fn parse_page_date(text: &str) -> Result<NaiveDate, AppError> {
    let trimmed = text.trim();
    let bare = trimmed
        .split_once(", ")
        .filter(|(head, _)| head.chars().all(char::is_alphabetic))
        .map_or(trimmed, |(_, rest)| rest);
    NaiveDate::parse_from_str(bare, "%B %d, %Y").map_err(|_| {
        AppError::malformed(
            SourceKind::Departures,
            format!("unparseable page date '{text}'"),
        )
    })
}

/// "Variable" yields no duration; otherwise optional hour and minute
/// parts accumulate. Neither part matching is a parse error.
fn parse_duration(text: &str) -> Result<Option<i64>, AppError> {
    if text == "Variable" {
        return Ok(None);
    }
    let caps = DURATION_RE
        .captures(text)
        .filter(|c| c.get(1).is_some() || c.get(2).is_some())
        .ok_or_else(|| {
            AppError::malformed(
                SourceKind::Departures,
                format!("unparseable sailing time '{text}'"),
            )
        })?;
    let hours: i64 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).map_err(|_| {
        AppError::malformed(SourceKind::Departures, format!("bad hours in '{text}'"))
    })?;
    let minutes: i64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).map_err(|_| {
        AppError::malformed(SourceKind::Departures, format!("bad minutes in '{text}'"))
    })?;
    Ok(Some(hours * 60 + minutes))
}

fn classify_eta(text: &str) -> EtaOrArrival {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "..." {
        EtaOrArrival::Unknown
    } else if let Some(rest) = trimmed.strip_prefix("ETA:") {
        EtaOrArrival::Eta(rest.trim().to_string())
    } else {
        EtaOrArrival::Arrived(trimmed.to_string())
    }
}
