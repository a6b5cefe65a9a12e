//! Ferry location map popups, one fixed-width table per route id.

use scraper::Html;

use sealane_core::error::AppError;
use sealane_core::records::{LocationRow, LocationsPage, SourceKind};

use super::{selector, text_of};

pub fn parse_locations(route_id: &str, html: &str) -> Result<LocationsPage, AppError> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&selector("body table"))
        .next()
        .ok_or_else(|| AppError::malformed(SourceKind::Locations, "missing locations table"))?;

    let mut rows = Vec::new();
    for row in table.select(&selector("tr")).skip(1) {
        let cells: Vec<String> = row.select(&selector("td")).map(text_of).collect();
        // only 4-cell rows carry ferry details; everything else is layout
        let [ferry, status, destination, time] = cells.as_slice() else {
            continue;
        };
        rows.push(LocationRow {
            ferry: ferry.clone(),
            status: status.clone(),
            destination: destination.clone(),
            time: time.clone(),
        });
    }

    Ok(LocationsPage {
        route_id: route_id.to_string(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const PAGE: &str = r#"
    <html><body><table>
      <tr><td>Ferry</td><td>Status</td><td>Destination</td><td>Time</td></tr>
      <tr><td>Spirit of British Columbia</td><td>Under Way</td><td>Swartz Bay</td><td>10:15</td></tr>
      <tr><td>Spirit of Vancouver Island</td><td>In Port</td><td>Tsawwassen</td><td>10:12</td></tr>
      <tr><td colspan="4">legend</td></tr>
      <tr><td>spacer</td><td>spacer</td></tr>
    </table></body></html>
    "#;

    #[test]
    fn test_parses_four_cell_rows_only() {
        let page = parse_locations("0", PAGE).unwrap();
        assert_eq!(page.route_id, "0");
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].ferry, "Spirit of British Columbia");
        assert_eq!(page.rows[0].status, "Under Way");
        assert_eq!(page.rows[0].destination, "Swartz Bay");
        assert_eq!(page.rows[0].time, "10:15");
    }

    #[test]
    fn test_missing_table_is_malformed() {
        let err = parse_locations("0", "<html><body></body></html>").unwrap_err();
        assert!(matches!(err, AppError::MalformedPage { .. }));
    }
}
