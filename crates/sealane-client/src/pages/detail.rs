//! Sailing detail page, one sailing per page.
//!
//! Deck-space figures ride in a popup link's query string rather than
//! page text, and are frequently absent; both extractions are treated
//! as expected-absent instead of parse failures. The same page carries
//! the source terminal's parking availability in an unrelated cell.

use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;
use tracing::debug;

use sealane_core::error::AppError;
use sealane_core::records::{DetailSailing, SailingDetailPage, SourceKind};

use super::{selector, text_of};

static TERMINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"arrivals-departures\.html\?dept=(\w+)&").unwrap());
static SAILING_TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\s(\S+ \w+)").unwrap());
static DECK_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""DeckSpace_pop\.asp\?os=(-?\d+)&uh=(-?\d+)&tm=\d+""#).unwrap()
});
static PARKING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)%").unwrap());

const NO_MORE_SAILINGS: &str = "No more scheduled sailings for today";

pub fn parse_detail(html: &str) -> Result<SailingDetailPage, AppError> {
    let doc = Html::parse_document(html);
    let kind = SourceKind::SailingDetail;

    let route_name = doc
        .select(&selector("font"))
        .next()
        .map(text_of)
        .ok_or_else(|| AppError::malformed(kind, "missing route title"))?;
    let terminal_code = TERMINAL_RE
        .captures(html)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| AppError::malformed(kind, "missing terminal code link"))?;

    let no_more_sailings = html.contains(NO_MORE_SAILINGS);
    let sailing = if no_more_sailings {
        debug!(route = %route_name, "no more scheduled sailings for today");
        None
    } else {
        Some(parse_sailing(&doc, html)?)
    };

    Ok(SailingDetailPage {
        route_name,
        terminal_code,
        no_more_sailings,
        sailing,
        parking_percent: parse_parking(&doc),
    })
}

fn parse_sailing(doc: &Html, html: &str) -> Result<DetailSailing, AppError> {
    let details = doc
        .select(&selector("span"))
        .map(text_of)
        .find(|text| text.contains("Sailing Details"))
        .ok_or_else(|| {
            AppError::malformed(SourceKind::SailingDetail, "missing sailing details block")
        })?;
    let scheduled = SAILING_TIME_RE
        .captures(&details)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            AppError::malformed(SourceKind::SailingDetail, "missing scheduled time")
        })?;

    if details.contains("CANCELLED") {
        return Ok(DetailSailing {
            scheduled,
            cancelled: true,
            car_percent: None,
            oversize_percent: None,
            ferry: None,
        });
    }

    // expected-absent: pages without the popup link carry no deck figures
    let (oversize_percent, car_percent) = match DECK_SPACE_RE.captures(html) {
        Some(caps) => (caps[1].parse().ok(), caps[2].parse().ok()),
        None => {
            debug!("no deck space figures on this page");
            (None, None)
        }
    };

    let ferry = doc
        .select(&selector("a[href]"))
        .filter(|a| a.value().attr("href").is_some_and(|h| h.contains("onboard")))
        .map(text_of)
        .find(|text| !text.is_empty());

    Ok(DetailSailing {
        scheduled,
        cancelled: false,
        car_percent,
        oversize_percent,
        ferry,
    })
}

/// Parking availability lives in the cell whose only link is "Parking".
fn parse_parking(doc: &Html) -> Option<i32> {
    doc.select(&selector("td"))
        .find(|td| {
            let links: Vec<_> = td.select(&selector("a")).collect();
            links.len() == 1 && text_of(links[0]) == "Parking"
        })
        .and_then(|td| PARKING_RE.captures(&text_of(td)).and_then(|c| c[1].parse().ok()))
}

/// Follow-up URLs for the other sailings of the day, from the page's
/// time-selection dropdown. Empty when the page reports no more sailings.
pub fn parse_detail_links(html: &str) -> Vec<String> {
    if html.contains(NO_MORE_SAILINGS) {
        return Vec::new();
    }
    let doc = Html::parse_document(html);
    doc.select(&selector("select option"))
        .filter_map(|option| option.value().attr("value"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const PAGE: &str = r#"
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

    const CANCELLED_PAGE: &str = r#"
    <html><body>
    <font>Tsawwassen to Swartz Bay</font>
    <a href="arrivals-departures.html?dept=TSA&route=01">schedule</a>
    <span>Sailing Details: 10:00 AM CANCELLED</span>
    </body></html>
    "#;

    const QUIET_PAGE: &str = r#"
    <html><body>
    <font>Tsawwassen to Swartz Bay</font>
    <a href="arrivals-departures.html?dept=TSA&route=01">schedule</a>
    <p>No more scheduled sailings for today</p>
    <table><tr>
      <td><a href="parking.html">Parking</a> 40% available</td>
    </tr></table>
    </body></html>
    "#;

    #[test]
    fn test_parses_sailing_and_parking() {
        let page = parse_detail(PAGE).unwrap();
        assert_eq!(page.route_name, "Tsawwassen to Swartz Bay");
        assert_eq!(page.terminal_code, "TSA");
        assert!(!page.no_more_sailings);
        assert_eq!(page.parking_percent, Some(55));

        let sailing = page.sailing.unwrap();
        assert_eq!(sailing.scheduled, "10:00 AM");
        assert!(!sailing.cancelled);
        assert_eq!(sailing.oversize_percent, Some(41));
        assert_eq!(sailing.car_percent, Some(73));
        assert_eq!(sailing.ferry.as_deref(), Some("Spirit of British Columbia"));
    }

    #[test]
    fn test_cancelled_sailing_skips_deck_space() {
        let page = parse_detail(CANCELLED_PAGE).unwrap();
        let sailing = page.sailing.unwrap();
        assert!(sailing.cancelled);
        assert_eq!(sailing.car_percent, None);
        assert_eq!(sailing.ferry, None);
        assert_eq!(page.parking_percent, None);
    }

    #[test]
    fn test_no_more_sailings() {
        let page = parse_detail(QUIET_PAGE).unwrap();
        assert!(page.no_more_sailings);
        assert!(page.sailing.is_none());
        assert_eq!(page.parking_percent, Some(40));
        assert!(parse_detail_links(QUIET_PAGE).is_empty());
    }

    #[test]
    fn test_follow_up_links() {
        let links = parse_detail_links(PAGE);
        assert_eq!(links.len(), 2);
        assert!(links[0].contains("time=12:00PM"));
    }

    #[test]
    fn test_missing_deck_space_is_expected_absent() {
        let page_without_popup = PAGE.replace("DeckSpace_pop.asp?os=41&uh=73&tm=1542650400", "");
        let page = parse_detail(&page_without_popup).unwrap();
        let sailing = page.sailing.unwrap();
        assert_eq!(sailing.car_percent, None);
        assert_eq!(sailing.oversize_percent, None);
        // the rest of the page still parses
        assert_eq!(sailing.ferry.as_deref(), Some("Spirit of British Columbia"));
    }
}
