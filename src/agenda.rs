//! Agenda date buckets.
//!
//! Items are placed under every local calendar day their occurrences touch
//! inside the active window, so a multi-day occurrence shows up on each day
//! it spans rather than only on its start day. Bucket keys ascend; entries
//! inside a bucket keep server order.

use std::collections::{BTreeMap, HashSet};

use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::anchor::Anchor;
use crate::dates::{
    days_spanned, end_of_month, local_day, start_of_month, start_of_week, WeekStart,
};
use crate::types::{Item, ItemId, Occurrence, PlanningRef};

/// Grouping granularity of the agenda view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateGroupingState {
    pub anchor: Anchor,
    pub grouping: Grouping,
}

/// Inclusive range of local days. `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
}

impl ActiveWindow {
    pub const UNBOUNDED: ActiveWindow = ActiveWindow {
        first: None,
        last: None,
    };

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.first.map_or(true, |first| day >= first) && self.last.map_or(true, |last| day <= last)
    }

    /// Intersection of `[first, last]` with the window.
    fn clip(&self, first: NaiveDate, last: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let from = self.first.map_or(first, |w| w.max(first));
        let to = self.last.map_or(last, |w| w.min(last));
        (from <= to).then_some((from, to))
    }
}

/// Days an occurrence may fill when the window has no last day.
pub const OPEN_WINDOW_SPAN_DAYS: u64 = 31;

/// One item placed on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub item_id: ItemId,
    /// The occurrence that put the item on this day.
    pub occurrence: Occurrence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgendaGroups {
    buckets: BTreeMap<NaiveDate, Vec<BucketEntry>>,
}

impl AgendaGroups {
    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Vec<BucketEntry>)> {
        self.buckets.iter()
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.buckets.keys().copied()
    }

    pub fn get(&self, day: NaiveDate) -> Option<&[BucketEntry]> {
        self.buckets.get(&day).map(Vec::as_slice)
    }

    /// Item ids in one bucket, in server order.
    pub fn item_ids(&self, day: NaiveDate) -> Vec<&str> {
        self.get(day)
            .map(|entries| entries.iter().map(|e| e.item_id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AgendaGrouper {
    tz: Tz,
    week_start: WeekStart,
}

impl AgendaGrouper {
    pub fn new(tz: Tz, week_start: WeekStart) -> Self {
        Self { tz, week_start }
    }

    pub fn timezone(&self) -> &Tz {
        &self.tz
    }

    /// Days visible for the given anchor and granularity.
    pub fn window(&self, state: &DateGroupingState) -> ActiveWindow {
        let Some(instant) = state.anchor.instant() else {
            return ActiveWindow::UNBOUNDED;
        };
        let day = local_day(instant, &self.tz);
        let (first, last) = match state.grouping {
            Grouping::Day => (day, day),
            Grouping::Week => {
                let first = start_of_week(day, self.week_start);
                (first, first + chrono::Duration::days(6))
            }
            Grouping::Month => (start_of_month(day), end_of_month(day)),
        };
        ActiveWindow {
            first: Some(first),
            last: Some(last),
        }
    }

    /// Partition `items` into day buckets for the active window.
    ///
    /// Items without an occurrence in the window are left out. An item is
    /// listed at most once per day; the first occurrence touching that day
    /// is the one recorded. Without a last window day, an occurrence fills
    /// at most [`OPEN_WINDOW_SPAN_DAYS`] days from its first one.
    pub fn group<'a, I>(&self, items: I, state: &DateGroupingState) -> AgendaGroups
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let window = self.window(state);
        let mut groups = AgendaGroups::default();
        let mut placed: HashSet<(NaiveDate, &str)> = HashSet::new();

        for item in items {
            for occurrence in &item.occurrences {
                let (first, last) = days_spanned(occurrence.start, occurrence.end, &self.tz);
                let Some((from, mut to)) = window.clip(first, last) else {
                    continue;
                };
                if window.last.is_none() {
                    if let Some(cap) = from.checked_add_days(Days::new(OPEN_WINDOW_SPAN_DAYS - 1)) {
                        to = to.min(cap);
                    }
                }
                for day in from.iter_days().take_while(|d| *d <= to) {
                    if placed.insert((day, item.id.as_str())) {
                        groups.buckets.entry(day).or_default().push(BucketEntry {
                            item_id: item.id.clone(),
                            occurrence: occurrence.clone(),
                        });
                    }
                }
            }
        }

        groups
    }

    /// Planning references of `item` scheduled on local `day`, in item order.
    pub fn plans_for_day<'a>(&self, item: &'a Item, day: NaiveDate) -> Vec<&'a PlanningRef> {
        item.planning_items
            .iter()
            .filter(|plan| {
                plan.planning_date
                    .is_some_and(|date| local_day(date, &self.tz) == day)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn agenda_item(id: &str, spans: &[(DateTime<Utc>, DateTime<Utc>)]) -> Item {
        Item {
            id: id.to_string(),
            revision: 1,
            created: None,
            headline: None,
            slugline: None,
            name: Some(id.to_string()),
            coverages: vec![],
            watches: vec![],
            bookmarks: vec![],
            occurrences: spans
                .iter()
                .map(|(start, end)| Occurrence {
                    item_id: id.to_string(),
                    start: *start,
                    end: *end,
                })
                .collect(),
            planning_items: vec![],
        }
    }

    fn utc_grouper() -> AgendaGrouper {
        AgendaGrouper::new(Tz::UTC, WeekStart::Monday)
    }

    fn state(anchor: DateTime<Utc>, grouping: Grouping) -> DateGroupingState {
        DateGroupingState {
            anchor: Anchor::At(anchor),
            grouping,
        }
    }

    #[test]
    fn test_multi_day_occurrence_lands_on_middle_day() {
        let item = agenda_item("conf", &[(at(2024, 4, 30, 22, 0), at(2024, 5, 2, 2, 0))]);
        let groups = utc_grouper().group([&item], &state(at(2024, 5, 1, 9, 0), Grouping::Day));

        assert_eq!(groups.days().collect::<Vec<_>>(), vec![day(2024, 5, 1)]);
        assert_eq!(groups.item_ids(day(2024, 5, 1)), vec!["conf"]);
    }

    #[test]
    fn test_week_window_duplicates_across_spanned_days() {
        let item = agenda_item("conf", &[(at(2024, 4, 30, 22, 0), at(2024, 5, 2, 2, 0))]);
        let groups = utc_grouper().group([&item], &state(at(2024, 5, 1, 9, 0), Grouping::Week));

        assert_eq!(
            groups.days().collect::<Vec<_>>(),
            vec![day(2024, 4, 30), day(2024, 5, 1), day(2024, 5, 2)]
        );
    }

    #[test]
    fn test_window_excludes_days_outside() {
        // Spans Sunday 2024-04-28 .. Tuesday 2024-04-30; weekly window starts Monday 29th
        let item = agenda_item("long", &[(at(2024, 4, 28, 10, 0), at(2024, 4, 30, 10, 0))]);
        let groups = utc_grouper().group([&item], &state(at(2024, 5, 1, 9, 0), Grouping::Week));
        assert_eq!(
            groups.days().collect::<Vec<_>>(),
            vec![day(2024, 4, 29), day(2024, 4, 30)]
        );

        let outside = agenda_item("old", &[(at(2024, 3, 1, 10, 0), at(2024, 3, 1, 11, 0))]);
        let groups = utc_grouper().group([&outside], &state(at(2024, 5, 1, 9, 0), Grouping::Month));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_bucket_order_is_day_then_server_order() {
        let b = agenda_item("b", &[(at(2024, 5, 2, 9, 0), at(2024, 5, 2, 10, 0))]);
        let z = agenda_item("z", &[(at(2024, 5, 1, 15, 0), at(2024, 5, 1, 16, 0))]);
        let a = agenda_item("a", &[(at(2024, 5, 1, 8, 0), at(2024, 5, 1, 9, 0))]);
        let groups = utc_grouper().group(
            [&b, &z, &a],
            &state(at(2024, 5, 1, 0, 0), Grouping::Month),
        );

        assert_eq!(
            groups.days().collect::<Vec<_>>(),
            vec![day(2024, 5, 1), day(2024, 5, 2)]
        );
        // server order z, a is kept even though a starts earlier
        assert_eq!(groups.item_ids(day(2024, 5, 1)), vec!["z", "a"]);
        assert_eq!(groups.item_ids(day(2024, 5, 2)), vec!["b"]);
    }

    #[test]
    fn test_item_listed_once_per_day_with_two_occurrences() {
        let item = agenda_item(
            "twice",
            &[
                (at(2024, 5, 1, 8, 0), at(2024, 5, 1, 9, 0)),
                (at(2024, 5, 1, 17, 0), at(2024, 5, 1, 18, 0)),
            ],
        );
        let groups = utc_grouper().group([&item], &state(at(2024, 5, 1, 0, 0), Grouping::Day));
        let entries = groups.get(day(2024, 5, 1)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].occurrence.start, at(2024, 5, 1, 8, 0));
    }

    #[test]
    fn test_items_without_occurrences_excluded() {
        let item = agenda_item("undated", &[]);
        let groups = utc_grouper().group([&item], &state(at(2024, 5, 1, 0, 0), Grouping::Day));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_earliest_anchor_is_unbounded() {
        let old = agenda_item("old", &[(at(2019, 1, 1, 10, 0), at(2019, 1, 1, 11, 0))]);
        let new = agenda_item("new", &[(at(2030, 1, 1, 10, 0), at(2030, 1, 2, 11, 0))]);
        let groups = utc_grouper().group(
            [&old, &new],
            &DateGroupingState {
                anchor: Anchor::Earliest,
                grouping: Grouping::Day,
            },
        );
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_open_ended_occurrence_is_capped_without_window_end() {
        let open = agenda_item("open", &[(at(2024, 5, 1, 9, 0), at(9999, 12, 31, 0, 0))]);
        let short = agenda_item("short", &[(at(2024, 6, 10, 9, 0), at(2024, 6, 11, 9, 0))]);
        let groups = utc_grouper().group(
            [&open, &short],
            &DateGroupingState {
                anchor: Anchor::Earliest,
                grouping: Grouping::Month,
            },
        );

        let days: Vec<_> = groups.days().collect();
        assert_eq!(days.len(), OPEN_WINDOW_SPAN_DAYS as usize + 2);
        assert_eq!(days.first(), Some(&day(2024, 5, 1)));
        assert_eq!(groups.item_ids(day(2024, 5, 31)), vec!["open"]);
        assert!(groups.get(day(2024, 6, 1)).is_none());
        assert_eq!(groups.item_ids(day(2024, 6, 11)), vec!["short"]);

        // A bounded window still shows the full span inside it.
        let groups = utc_grouper().group([&open], &state(at(2031, 2, 1, 0, 0), Grouping::Month));
        assert_eq!(groups.len(), 28);
    }

    #[test]
    fn test_local_timezone_shifts_bucket() {
        let prague = AgendaGrouper::new("Europe/Prague".parse().unwrap(), WeekStart::Monday);
        // 23:30 UTC Apr 30 is 01:30 May 1 in Prague
        let item = agenda_item("late", &[(at(2024, 4, 30, 23, 30), at(2024, 4, 30, 23, 45))]);
        let groups = prague.group([&item], &state(at(2024, 5, 1, 10, 0), Grouping::Day));
        assert_eq!(groups.item_ids(day(2024, 5, 1)), vec!["late"]);
    }

    #[test]
    fn test_plans_for_day() {
        let mut item = agenda_item("ev", &[(at(2024, 5, 1, 8, 0), at(2024, 5, 2, 18, 0))]);
        item.planning_items = vec![
            PlanningRef {
                id: "p1".to_string(),
                planning_date: Some(at(2024, 5, 1, 9, 0)),
            },
            PlanningRef {
                id: "p2".to_string(),
                planning_date: Some(at(2024, 5, 2, 9, 0)),
            },
            PlanningRef {
                id: "p3".to_string(),
                planning_date: None,
            },
        ];
        let plans = utc_grouper().plans_for_day(&item, day(2024, 5, 2));
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].id, "p2");
    }
}
