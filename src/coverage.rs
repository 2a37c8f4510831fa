//! Coverage classification for a viewed agenda day.
//!
//! When a multi-day occurrence is viewed on one of its later days, coverages
//! scheduled the day before are still shown, but apart from the current
//! day's ones.

use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::dates::local_day;
use crate::types::{Coverage, Item};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageBucket {
    Current,
    Previous,
    Excluded,
}

/// Bucket for one coverage relative to the viewed local `day`.
///
/// Unscheduled coverages always count as current.
pub fn classify_coverage(coverage: &Coverage, day: NaiveDate, tz: &Tz) -> CoverageBucket {
    let Some(scheduled) = coverage.scheduled else {
        return CoverageBucket::Current;
    };
    let scheduled_day = local_day(scheduled, tz);
    if scheduled_day == day {
        CoverageBucket::Current
    } else if day.pred_opt() == Some(scheduled_day) {
        CoverageBucket::Previous
    } else {
        CoverageBucket::Excluded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedCoverages<'a> {
    pub current: Vec<&'a Coverage>,
    pub previous: Vec<&'a Coverage>,
}

impl ClassifiedCoverages<'_> {
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.previous.is_empty()
    }
}

/// Split the coverages of `item` that belong to `planning_id`.
///
/// Each bucket is ordered by scheduled time with unscheduled entries last;
/// ties keep their original order.
pub fn classify_coverages<'a>(
    item: &'a Item,
    planning_id: &str,
    day: NaiveDate,
    tz: &Tz,
) -> ClassifiedCoverages<'a> {
    let mut classified = ClassifiedCoverages::default();
    for coverage in item.coverages.iter().filter(|c| c.planning_id == planning_id) {
        match classify_coverage(coverage, day, tz) {
            CoverageBucket::Current => classified.current.push(coverage),
            CoverageBucket::Previous => classified.previous.push(coverage),
            CoverageBucket::Excluded => {}
        }
    }
    // sort_by_key is stable
    classified
        .current
        .sort_by_key(|c| (c.scheduled.is_none(), c.scheduled));
    classified
        .previous
        .sort_by_key(|c| (c.scheduled.is_none(), c.scheduled));
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap()
    }

    fn coverage(planning: &str, id: &str, scheduled: Option<DateTime<Utc>>) -> Coverage {
        Coverage {
            planning_id: planning.to_string(),
            coverage_id: Some(id.to_string()),
            scheduled,
            status: "coverage intended".to_string(),
            coverage_type: Some("text".to_string()),
        }
    }

    fn item_with(coverages: Vec<Coverage>) -> Item {
        Item {
            id: "ev".to_string(),
            revision: 1,
            created: None,
            headline: None,
            slugline: None,
            name: None,
            coverages,
            watches: vec![],
            bookmarks: vec![],
            occurrences: vec![],
            planning_items: vec![],
        }
    }

    fn ids(list: &[&Coverage]) -> Vec<String> {
        list.iter()
            .map(|c| c.coverage_id.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_previous_and_current_day() {
        let item = item_with(vec![
            coverage("p1", "late", Some(at(1, 23, 30))),
            coverage("p1", "morning", Some(at(2, 8, 0))),
        ]);
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let classified = classify_coverages(&item, "p1", day, &Tz::UTC);

        assert_eq!(ids(&classified.current), vec!["morning"]);
        assert_eq!(ids(&classified.previous), vec!["late"]);
    }

    #[test]
    fn test_other_planning_and_distant_days_excluded() {
        let item = item_with(vec![
            coverage("p2", "other-plan", Some(at(2, 9, 0))),
            coverage(
                "p1",
                "two-days-back",
                Some(Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap()),
            ),
            coverage("p1", "tomorrow", Some(at(3, 9, 0))),
        ]);
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let classified = classify_coverages(&item, "p1", day, &Tz::UTC);
        assert!(classified.is_empty());
    }

    #[test]
    fn test_unscheduled_is_current_and_sorted_last() {
        let item = item_with(vec![
            coverage("p1", "open", None),
            coverage("p1", "noon", Some(at(2, 12, 0))),
            coverage("p1", "open-2", None),
            coverage("p1", "dawn", Some(at(2, 6, 0))),
            coverage("p1", "noon-2", Some(at(2, 12, 0))),
        ]);
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let classified = classify_coverages(&item, "p1", day, &Tz::UTC);

        assert_eq!(
            ids(&classified.current),
            vec!["dawn", "noon", "noon-2", "open", "open-2"]
        );
        assert!(classified.previous.is_empty());
    }

    #[test]
    fn test_repeated_classification_is_identical() {
        let item = item_with(vec![
            coverage("p1", "noon", Some(at(2, 12, 0))),
            coverage("p1", "open", None),
            coverage("p1", "late", Some(at(1, 23, 30))),
            coverage("p1", "noon-2", Some(at(2, 12, 0))),
            coverage("p1", "eve", Some(at(1, 18, 0))),
        ]);
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let first = classify_coverages(&item, "p1", day, &Tz::UTC);
        for _ in 0..3 {
            let again = classify_coverages(&item, "p1", day, &Tz::UTC);
            assert_eq!(ids(&again.current), ids(&first.current));
            assert_eq!(ids(&again.previous), ids(&first.previous));
        }
        assert_eq!(ids(&first.current), vec!["noon", "noon-2", "open"]);
        assert_eq!(ids(&first.previous), vec!["eve", "late"]);
    }

    #[test]
    fn test_every_coverage_gets_exactly_one_bucket() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let prague: Tz = "Europe/Prague".parse().unwrap();
        for hour in 0..72 {
            let scheduled = at(1, 0, 0) + chrono::Duration::hours(hour);
            let c = coverage("p1", "c", Some(scheduled));
            let bucket = classify_coverage(&c, day, &prague);
            let local = local_day(scheduled, &prague);
            let expected = if local == day {
                CoverageBucket::Current
            } else if local == NaiveDate::from_ymd_opt(2024, 5, 1).unwrap() {
                CoverageBucket::Previous
            } else {
                CoverageBucket::Excluded
            };
            assert_eq!(bucket, expected, "hour {}", hour);
        }
    }
}
