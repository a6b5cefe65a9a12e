//! Current conditions ("at-a-glance") page.
//!
//! Route rows live in table sections; sections holding a span are
//! terminal headers and carry no sailings. Each route row is keyed by
//! the sailing-detail link in its last cell. A row without that link is
//! either the "fully booked" banner for the route above it or noise.

use regex::Regex;
use scraper::Html;
use std::sync::LazyLock;
use tracing::{debug, warn};

use sealane_core::error::AppError;
use sealane_core::records::{
    ConditionsPage, ConditionsRoute, LaterToken, NearTermSailing, SourceKind,
};

use super::{child_elements, selector, text_of};

static DETAIL_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"route=(\d+)&dept=(\w+)").unwrap());
static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)%").unwrap());

const FULLY_BOOKED: &str = "Vehicle space on this route is fully booked";

pub fn parse_conditions(html: &str) -> Result<ConditionsPage, AppError> {
    let doc = Html::parse_document(html);
    let mut routes: Vec<ConditionsRoute> = Vec::new();

    for section in doc.select(&selector("tbody")) {
        // terminal header sections carry a span and no route rows
        if section.select(&selector("span")).next().is_some() {
            continue;
        }

        let rows = child_elements(section, "tr");
        if rows.len() < 3 {
            continue;
        }
        // first and last rows are the column headers and the footer
        for row in &rows[1..rows.len() - 1] {
            let cells = child_elements(*row, "td");

            let link = cells
                .get(7)
                .and_then(|cell| cell.select(&selector("a")).next())
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| DETAIL_LINK_RE.captures(href));

            let Some(caps) = link else {
                let banner = cells.first().map(|c| text_of(*c)).unwrap_or_default();
                if banner.contains(FULLY_BOOKED) {
                    match routes.last_mut() {
                        Some(previous) => {
                            debug!(route = %previous.name, "route is fully booked for today");
                            previous.fully_booked_today = true;
                        }
                        None => warn!("fully booked banner with no preceding route"),
                    }
                } else {
                    warn!(fragment = %banner, "unrecognised conditions row");
                }
                continue;
            };

            let name = cells
                .first()
                .map(|c| text_of(*c))
                .ok_or_else(|| AppError::malformed(SourceKind::Conditions, "route row has no name"))?;
            let route_id: u32 = caps[1].parse().map_err(|_| {
                AppError::malformed(SourceKind::Conditions, "bad route id in detail link")
            })?;
            let dept = caps[2].to_string();

            let detail_cell = cells.get(1).and_then(|c| c.select(&selector("div")).next());
            let (sailings, car_waits, oversize_waits) = match detail_cell {
                Some(div) if text_of(div) != "N/A" => {
                    let mut near_term = Vec::new();
                    for sailing_row in div.select(&selector("tr")) {
                        let sailing_cells: Vec<String> =
                            sailing_row.select(&selector("td")).map(text_of).collect();
                        let [time, status] = sailing_cells.as_slice() else {
                            return Err(AppError::malformed(
                                SourceKind::Conditions,
                                "near-term sailing row is not 2 cells",
                            ));
                        };
                        if status == "Cancelled" {
                            near_term.push(NearTermSailing {
                                time: time.clone(),
                                cancelled: true,
                                percent_full: None,
                            });
                        } else {
                            let percent = PERCENT_RE
                                .captures(status)
                                .and_then(|c| c[1].parse().ok())
                                .ok_or_else(|| {
                                    AppError::malformed(
                                        SourceKind::Conditions,
                                        format!("unparseable fullness '{status}'"),
                                    )
                                })?;
                            near_term.push(NearTermSailing {
                                time: time.clone(),
                                cancelled: false,
                                percent_full: Some(percent),
                            });
                        }
                    }
                    let car_waits = cells.get(2).and_then(|c| text_of(*c).parse().ok());
                    let oversize_waits = cells.get(3).and_then(|c| text_of(*c).parse().ok());
                    (Some(near_term), car_waits, oversize_waits)
                }
                _ => (None, None, None),
            };

            let later = cells
                .get(4)
                .map(|c| parse_later_tokens(&text_of(*c)))
                .unwrap_or_default();

            routes.push(ConditionsRoute {
                name,
                route_id,
                dept,
                car_waits,
                oversize_waits,
                sailings,
                later,
                fully_booked_today: false,
            });
        }
    }

    Ok(ConditionsPage { routes })
}

/// Split the later-sailings cell into tokens, stripping the `*` tomorrow
/// prefix and `-Cancelled` suffix markers.
fn parse_later_tokens(text: &str) -> Vec<LaterToken> {
    text.split_whitespace()
        .map(|raw| {
            let (raw, cancelled) = match raw.strip_suffix("-Cancelled") {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            let (time, tomorrow) = match raw.strip_prefix('*') {
                Some(stripped) => (stripped, true),
                None => (raw, false),
            };
            LaterToken {
                time: time.to_string(),
                tomorrow,
                cancelled,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const PAGE: &str = r#"
    <html><body><table>
    <tbody>
      <tr><td><span>Tsawwassen</span></td></tr>
    </tbody>
    <tbody>
      <tr><td>Route</td><td>Next Sailings</td><td>Car</td><td>Oversize</td><td>Later</td><td></td><td></td><td></td></tr>
      <tr>
        <td>Tsawwassen to Swartz Bay</td>
        <td><div><table>
          <tr><td>3:00pm</td><td>73% full</td></tr>
          <tr><td>4:00pm</td><td>Cancelled</td></tr>
          <tr><td>5:00pm</td><td>100% full</td></tr>
        </table></div></td>
        <td>2</td>
        <td>0</td>
        <td> 7:00pm 9:00pm-Cancelled *6:00am</td>
        <td></td><td></td>
        <td><a href="sailingDetail.asp?route=1&dept=TSA">details</a></td>
      </tr>
      <tr>
        <td>Tsawwassen to Southern Gulf Islands</td>
        <td><div>N/A</div></td>
        <td></td>
        <td></td>
        <td>*11:10am *5:40pm *9:05pm *9:55am</td>
        <td></td><td></td>
        <td><a href="sailingDetail.asp?route=9&dept=TSA">details</a></td>
      </tr>
      <tr>
        <td>Vehicle space on this route is fully booked for the rest of today.</td>
      </tr>
      <tr><td>footer</td></tr>
    </tbody>
    </table></body></html>
    "#;

    #[test]
    fn test_parses_route_rows() {
        let page = parse_conditions(PAGE).unwrap();
        assert_eq!(page.routes.len(), 2);

        let route = &page.routes[0];
        assert_eq!(route.name, "Tsawwassen to Swartz Bay");
        assert_eq!(route.route_id, 1);
        assert_eq!(route.dept, "TSA");
        assert_eq!(route.car_waits, Some(2));
        assert_eq!(route.oversize_waits, Some(0));

        let sailings = route.sailings.as_ref().unwrap();
        assert_eq!(sailings.len(), 3);
        assert_eq!(sailings[0].time, "3:00pm");
        assert_eq!(sailings[0].percent_full, Some(73));
        assert!(sailings[1].cancelled);
        assert_eq!(sailings[1].percent_full, None);
        assert_eq!(sailings[2].percent_full, Some(100));
    }

    #[test]
    fn test_not_available_detail_cell() {
        let page = parse_conditions(PAGE).unwrap();
        let route = &page.routes[1];
        assert!(route.sailings.is_none());
        assert_eq!(route.car_waits, None);
        assert_eq!(route.oversize_waits, None);
    }

    #[test]
    fn test_fully_booked_banner_flags_previous_route() {
        let page = parse_conditions(PAGE).unwrap();
        assert!(page.routes[1].fully_booked_today);
        assert!(!page.routes[0].fully_booked_today);
    }

    #[test]
    fn test_later_tokens() {
        let tokens = parse_later_tokens(" 7:00pm 9:00pm-Cancelled *6:00am");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].time, "7:00pm");
        assert!(!tokens[0].tomorrow && !tokens[0].cancelled);
        assert_eq!(tokens[1].time, "9:00pm");
        assert!(tokens[1].cancelled);
        assert_eq!(tokens[2].time, "6:00am");
        assert!(tokens[2].tomorrow);
    }

    #[test]
    fn test_empty_page_yields_no_routes() {
        let page = parse_conditions("<html><body></body></html>").unwrap();
        assert!(page.routes.is_empty());
    }
}
