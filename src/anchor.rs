//! Reference date for agenda views.
//!
//! Resolved on every fresh commit, in priority order:
//! 1. bookmark browsing is never date-windowed: [`Anchor::Earliest`]
//! 2. an active created-date filter pins the anchor to its `from` bound
//! 3. otherwise the persisted last-selected date, or now

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dates::{
    local_day, local_midnight, parse_local_date, start_of_month, start_of_week, WeekStart,
};
use crate::types::CreatedFilter;

/// Agenda reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Anchor {
    /// Earliest possible date; no window applies.
    Earliest,
    At(DateTime<Utc>),
}

impl Anchor {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Anchor::Earliest => None,
            Anchor::At(instant) => Some(*instant),
        }
    }
}

/// What the resolver looks at.
#[derive(Debug, Clone, Copy)]
pub struct AnchorInputs<'a> {
    pub bookmarks: bool,
    pub created_filter: &'a CreatedFilter,
    /// Last date the user picked, from the local store.
    pub persisted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct DateAnchorResolver {
    tz: Tz,
    week_start: WeekStart,
}

impl DateAnchorResolver {
    pub fn new(tz: Tz, week_start: WeekStart) -> Self {
        Self { tz, week_start }
    }

    pub fn resolve(&self, inputs: &AnchorInputs<'_>, now: DateTime<Utc>) -> Anchor {
        if inputs.bookmarks {
            return Anchor::Earliest;
        }
        if inputs.created_filter.is_active() {
            return self.resolve_created_from(inputs.created_filter.from_value(), now);
        }
        Anchor::At(inputs.persisted.unwrap_or(now))
    }

    fn resolve_created_from(&self, from: Option<&str>, now: DateTime<Utc>) -> Anchor {
        let today = local_day(now, &self.tz);
        match from {
            Some("now/d") => Anchor::At(local_midnight(today, &self.tz)),
            Some("now/w") => Anchor::At(local_midnight(
                start_of_week(today, self.week_start),
                &self.tz,
            )),
            Some("now/M") => Anchor::At(local_midnight(start_of_month(today), &self.tz)),
            Some(explicit) => match parse_local_date(explicit, &self.tz) {
                Some(instant) => Anchor::At(instant),
                None => {
                    log::warn!(
                        "Unrecognized created_from value '{}', using earliest date",
                        explicit
                    );
                    Anchor::Earliest
                }
            },
            None => Anchor::Earliest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn resolver() -> DateAnchorResolver {
        DateAnchorResolver::new("Europe/Prague".parse().unwrap(), WeekStart::Monday)
    }

    // Wednesday 2024-05-01 14:00 local (12:00 UTC)
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn filter(from: Option<&str>, to: Option<&str>) -> CreatedFilter {
        CreatedFilter {
            from: from.map(str::to_string),
            to: to.map(str::to_string),
        }
    }

    #[test]
    fn test_bookmarks_win_over_everything() {
        let created = filter(Some("now/d"), None);
        let inputs = AnchorInputs {
            bookmarks: true,
            created_filter: &created,
            persisted: Some(now()),
        };
        assert_eq!(resolver().resolve(&inputs, now()), Anchor::Earliest);
    }

    #[test]
    fn test_now_d_is_start_of_local_day() {
        let created = filter(Some("now/d"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &created,
            persisted: None,
        };
        assert_eq!(
            resolver().resolve(&inputs, now()),
            Anchor::At(Utc.with_ymd_and_hms(2024, 4, 30, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_now_w_is_most_recent_monday_midnight() {
        let created = filter(Some("now/w"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &created,
            persisted: None,
        };
        // Monday 2024-04-29 00:00 in Prague
        assert_eq!(
            resolver().resolve(&inputs, now()),
            Anchor::At(Utc.with_ymd_and_hms(2024, 4, 28, 22, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_now_w_with_sunday_week_start() {
        let created = filter(Some("now/w"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &created,
            persisted: None,
        };
        let sunday = DateAnchorResolver::new(Tz::UTC, WeekStart::Sunday);
        assert_eq!(
            sunday.resolve(&inputs, now()),
            Anchor::At(Utc.with_ymd_and_hms(2024, 4, 28, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_now_m_is_first_of_month() {
        let created = filter(Some("now/M"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &created,
            persisted: None,
        };
        let utc = DateAnchorResolver::new(Tz::UTC, WeekStart::Monday);
        let mid_month = Utc.with_ymd_and_hms(2024, 5, 17, 9, 0, 0).unwrap();
        assert_eq!(
            utc.resolve(&inputs, mid_month),
            Anchor::At(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_explicit_and_missing_from() {
        let explicit = filter(Some("2024-03-10"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &explicit,
            persisted: None,
        };
        assert_eq!(
            resolver().resolve(&inputs, now()),
            Anchor::At(Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap())
        );

        let only_to = filter(None, Some("2024-03-10"));
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &only_to,
            persisted: Some(now()),
        };
        assert_eq!(resolver().resolve(&inputs, now()), Anchor::Earliest);

        let garbage = filter(Some("soon"), None);
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &garbage,
            persisted: None,
        };
        assert_eq!(resolver().resolve(&inputs, now()), Anchor::Earliest);
    }

    #[test]
    fn test_no_filter_uses_persisted_then_now() {
        let none = CreatedFilter::default();
        let persisted = Utc.with_ymd_and_hms(2024, 2, 2, 8, 0, 0).unwrap();
        let inputs = AnchorInputs {
            bookmarks: false,
            created_filter: &none,
            persisted: Some(persisted),
        };
        assert_eq!(resolver().resolve(&inputs, now()), Anchor::At(persisted));

        let inputs = AnchorInputs {
            persisted: None,
            ..inputs
        };
        assert_eq!(resolver().resolve(&inputs, now()), Anchor::At(now()));
    }
}
