//! Availability window evaluation
//!
//! Pure queries over a record's named availability windows. All boundary
//! comparisons are strict: the start and end instants themselves are outside
//! the window.

use chrono::{DateTime, Utc};
use core_library::AvailabilityWindow;

/// Read-only view over a set of windows
#[derive(Debug, Clone, Copy)]
pub struct Availability<'a> {
    windows: &'a [AvailabilityWindow],
}

impl<'a> Availability<'a> {
    pub fn new(windows: &'a [AvailabilityWindow]) -> Self {
        Self { windows }
    }

    /// Minimum non-null start across all windows
    pub fn earliest_start(&self) -> Option<DateTime<Utc>> {
        self.windows.iter().filter_map(|window| window.start).min()
    }

    /// Maximum non-null end across all windows; `None` means unbounded
    pub fn latest_end(&self) -> Option<DateTime<Utc>> {
        self.windows.iter().filter_map(|window| window.end).max()
    }

    /// `earliest_start < at` and (`latest_end` unbounded or `at < latest_end`).
    ///
    /// Without any start the content has never been released, so it is not
    /// available.
    pub fn is_available(&self, at: DateTime<Utc>) -> bool {
        let started = matches!(self.earliest_start(), Some(start) if start < at);
        let not_ended = self.latest_end().map_or(true, |end| at < end);
        started && not_ended
    }

    /// Same rule as [`Self::is_available`] applied to a single window
    pub fn is_window_active(window: &AvailabilityWindow, at: DateTime<Utc>) -> bool {
        matches!(window.start, Some(start) if start < at)
            && window.end.map_or(true, |end| at < end)
    }

    /// Whether only restricted windows are active at `at`.
    ///
    /// Windows are scanned in `priority` order, then any windows whose names
    /// are not listed, in stored order. An active unrestricted window returns
    /// `false` immediately. An active restricted window marks the result
    /// `true` but the scan continues, so an unrestricted window found active
    /// later still wins.
    pub fn is_restricted_only(
        &self,
        at: DateTime<Utc>,
        priority: &[String],
        restricted: &[String],
    ) -> bool {
        let mut restricted_only = false;

        for window in self.in_priority_order(priority) {
            if !Self::is_window_active(window, at) {
                continue;
            }

            if restricted.iter().any(|name| name == &window.name) {
                restricted_only = true;
            } else {
                return false;
            }
        }

        restricted_only
    }

    fn in_priority_order<'b>(
        &self,
        priority: &'b [String],
    ) -> impl Iterator<Item = &'b AvailabilityWindow> + 'b
    where
        'a: 'b,
    {
        let windows: &'b [AvailabilityWindow] = self.windows;
        let listed = priority
            .iter()
            .flat_map(move |name| windows.iter().filter(move |window| &window.name == name));
        let unlisted = windows
            .iter()
            .filter(move |window| !priority.iter().any(|name| name == &window.name));
        listed.chain(unlisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::seconds(offset)
    }

    fn window(name: &str, start: Option<i64>, end: Option<i64>) -> AvailabilityWindow {
        AvailabilityWindow::new(name, start.map(t), end.map(t))
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_boundaries_are_strict() {
        let windows = vec![window("public", Some(0), Some(10))];
        let availability = Availability::new(&windows);

        assert!(!availability.is_available(t(0)));
        assert!(availability.is_available(t(1)));
        assert!(!availability.is_available(t(10)));
    }

    #[test]
    fn test_earliest_start_and_latest_end_span_windows() {
        let windows = vec![
            window("public", Some(100), Some(200)),
            window("all_members", Some(50), None),
            window("station_members", None, Some(300)),
        ];
        let availability = Availability::new(&windows);

        assert_eq!(availability.earliest_start(), Some(t(50)));
        assert_eq!(availability.latest_end(), Some(t(300)));
    }

    #[test]
    fn test_null_end_is_unbounded() {
        let windows = vec![window("public", Some(0), None)];
        let availability = Availability::new(&windows);

        assert_eq!(availability.latest_end(), None);
        assert!(availability.is_available(t(1_000_000)));
    }

    #[test]
    fn test_no_start_is_never_available() {
        let windows = vec![window("public", None, None)];
        assert!(!Availability::new(&windows).is_available(t(5)));
        assert!(!Availability::new(&[]).is_available(t(5)));
    }

    #[test]
    fn test_restricted_only_when_only_member_window_active() {
        let windows = vec![
            window("public", Some(100), None),
            window("all_members", Some(0), None),
        ];
        let availability = Availability::new(&windows);
        let priority = names(&["public", "all_members", "station_members"]);
        let restricted = names(&["all_members", "station_members"]);

        assert!(availability.is_restricted_only(t(10), &priority, &restricted));
        assert!(!availability.is_restricted_only(t(101), &priority, &restricted));
    }

    #[test]
    fn test_later_public_window_overrides_restricted_match() {
        // Restricted window comes first in priority; the active public window
        // scanned after it must still flip the result.
        let priority = names(&["all_members", "public"]);
        let restricted = names(&["all_members"]);

        let mut windows = vec![
            window("public", Some(100), None),
            window("all_members", Some(0), None),
        ];
        assert!(Availability::new(&windows).is_restricted_only(t(10), &priority, &restricted));

        windows.push(window("public", Some(0), None));
        assert!(!Availability::new(&windows).is_restricted_only(t(10), &priority, &restricted));
    }

    #[test]
    fn test_unlisted_windows_are_scanned_last() {
        let priority = names(&["all_members"]);
        let restricted = names(&["all_members"]);
        let windows = vec![
            window("festival", Some(0), None),
            window("all_members", Some(0), None),
        ];

        assert!(!Availability::new(&windows).is_restricted_only(t(1), &priority, &restricted));
    }

    #[test]
    fn test_nothing_active_is_not_restricted_only() {
        let windows = vec![window("all_members", Some(10), Some(20))];
        let restricted = names(&["all_members"]);
        assert!(!Availability::new(&windows).is_restricted_only(
            t(20),
            &restricted,
            &restricted
        ));
    }
}
