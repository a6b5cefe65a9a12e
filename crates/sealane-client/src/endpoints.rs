//! The operator's fixed, versionless page endpoints.

/// Base for the marquee pages (departures, conditions, sailing detail).
pub const BASE_URL: &str = "https://orca.bcferries.com/cc/marqui";

/// Base for the per-route location map popups.
pub const MAP_BASE: &str = "https://orca.bcferries.com/cc/settings/includes/maps";

/// Map page route ids. Not contiguous; 8 through 12 do not exist.
pub const MAP_ROUTE_IDS: [&str; 9] = ["0", "1", "2", "3", "4", "5", "6", "7", "13"];

/// Map routes that report a compass heading instead of a destination.
pub const HEADING_ROUTE_IDS: [&str; 2] = ["2", "13"];

pub fn departures_url() -> String {
    format!("{BASE_URL}/actualDepartures.asp")
}

pub fn conditions_url() -> String {
    format!("{BASE_URL}/at-a-glance.asp")
}

/// Sailing detail page for one route. The route code is zero-padded to
/// two digits; `dept` is the source terminal's short code.
pub fn sailing_detail_url(route_code: u32, dept: &str) -> String {
    format!("{BASE_URL}/sailingDetail.asp?route={route_code:02}&dept={dept}")
}

/// A follow-up detail URL from a page's sailing-time `<option>` value.
pub fn detail_follow_url(option_value: &str) -> String {
    format!("{BASE_URL}/{option_value}")
}

pub fn locations_url(route_id: &str) -> String {
    format!("{MAP_BASE}/route{route_id}.html")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_url_pads_route_code() {
        assert_eq!(
            sailing_detail_url(1, "TSA"),
            "https://orca.bcferries.com/cc/marqui/sailingDetail.asp?route=01&dept=TSA"
        );
        assert_eq!(
            sailing_detail_url(30, "HSB"),
            "https://orca.bcferries.com/cc/marqui/sailingDetail.asp?route=30&dept=HSB"
        );
    }

    #[test]
    fn test_locations_urls() {
        assert_eq!(
            locations_url("13"),
            "https://orca.bcferries.com/cc/settings/includes/maps/route13.html"
        );
        assert_eq!(MAP_ROUTE_IDS.len(), 9);
    }
}
