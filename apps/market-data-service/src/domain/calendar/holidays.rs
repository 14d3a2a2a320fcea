//! US Equity Market Holidays
//!
//! Holiday rules for the regular-session calendar. Each holiday is a rule
//! that resolves to a concrete date for a given year; weekend holidays are
//! shifted to their observed weekday.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Rule that yields a holiday's calendar date for a given year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolidayRule {
    /// Same month/day every year.
    Fixed {
        /// Month (1-12).
        month: u32,
        /// Day of month.
        day: u32,
    },
    /// The nth occurrence of a weekday in a month (e.g. 3rd Monday of January).
    NthWeekday {
        /// Month (1-12).
        month: u32,
        /// Weekday to count.
        weekday: Weekday,
        /// Occurrence, 1-based.
        n: u8,
    },
    /// The last occurrence of a weekday in a month (e.g. last Monday of May).
    LastWeekday {
        /// Month (1-12).
        month: u32,
        /// Weekday to find.
        weekday: Weekday,
    },
    /// Fixed offset in days from Western (Gregorian) Easter Sunday.
    EasterOffset {
        /// Days relative to Easter Sunday; Good Friday is -2.
        days: i64,
    },
}

impl HolidayRule {
    /// Resolve the rule to a date in `year`.
    #[must_use]
    pub fn date_in(&self, year: i32) -> Option<NaiveDate> {
        match *self {
            Self::Fixed { month, day } => NaiveDate::from_ymd_opt(year, month, day),
            Self::NthWeekday { month, weekday, n } => {
                NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
            }
            Self::LastWeekday { month, weekday } => last_weekday_of_month(year, month, weekday),
            Self::EasterOffset { days } => {
                easter_sunday(year).map(|easter| easter + Duration::days(days))
            }
        }
    }
}

/// A named market holiday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holiday {
    /// Display name, surfaced in the market status reason.
    pub name: &'static str,
    /// Date rule.
    pub rule: HolidayRule,
}

impl Holiday {
    /// Observed date of this holiday in `year`.
    ///
    /// Saturday holidays are observed the preceding Friday, Sunday holidays the
    /// following Monday.
    #[must_use]
    pub fn observed_in(&self, year: i32) -> Option<NaiveDate> {
        let date = self.rule.date_in(year)?;
        let observed = match date.weekday() {
            Weekday::Sat => date - Duration::days(1),
            Weekday::Sun => date + Duration::days(1),
            _ => date,
        };
        Some(observed)
    }
}

/// Full-day closures of the regular equities session.
pub const US_MARKET_HOLIDAYS: &[Holiday] = &[
    Holiday {
        name: "New Year's Day",
        rule: HolidayRule::Fixed { month: 1, day: 1 },
    },
    Holiday {
        name: "Martin Luther King Jr. Day",
        rule: HolidayRule::NthWeekday {
            month: 1,
            weekday: Weekday::Mon,
            n: 3,
        },
    },
    Holiday {
        name: "Washington's Birthday",
        rule: HolidayRule::NthWeekday {
            month: 2,
            weekday: Weekday::Mon,
            n: 3,
        },
    },
    Holiday {
        name: "Good Friday",
        rule: HolidayRule::EasterOffset { days: -2 },
    },
    Holiday {
        name: "Memorial Day",
        rule: HolidayRule::LastWeekday {
            month: 5,
            weekday: Weekday::Mon,
        },
    },
    Holiday {
        name: "Juneteenth National Independence Day",
        rule: HolidayRule::Fixed { month: 6, day: 19 },
    },
    Holiday {
        name: "Independence Day",
        rule: HolidayRule::Fixed { month: 7, day: 4 },
    },
    Holiday {
        name: "Labor Day",
        rule: HolidayRule::NthWeekday {
            month: 9,
            weekday: Weekday::Mon,
            n: 1,
        },
    },
    Holiday {
        name: "Thanksgiving Day",
        rule: HolidayRule::NthWeekday {
            month: 11,
            weekday: Weekday::Thu,
            n: 4,
        },
    },
    Holiday {
        name: "Christmas Day",
        rule: HolidayRule::Fixed { month: 12, day: 25 },
    },
];

/// Find the holiday observed on `date`, if any.
///
/// Next year's holidays are checked too: a Saturday New Year's Day is
/// observed on December 31st of the prior year.
#[must_use]
pub fn observed_holiday(holidays: &[Holiday], date: NaiveDate) -> Option<&Holiday> {
    let year = date.year();
    holidays.iter().find(|holiday| {
        [year, year + 1]
            .into_iter()
            .filter_map(|y| holiday.observed_in(y))
            .any(|observed| observed == date)
    })
}

/// Western Easter Sunday, by the anonymous Gregorian algorithm.
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15).rem_euclid(30);
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k).rem_euclid(7);
    let m = (a + 11 * h + 22 * l) / 451;
    let n = h + l - 7 * m + 114;
    let month = u32::try_from(n / 31).ok()?;
    let day = u32::try_from(n % 31 + 1).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut date = first_of_next.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holiday(name: &str) -> &'static Holiday {
        US_MARKET_HOLIDAYS.iter().find(|h| h.name == name).unwrap()
    }

    #[test]
    fn nth_weekday_rules_resolve() {
        assert_eq!(
            holiday("Martin Luther King Jr. Day").rule.date_in(2025),
            Some(date(2025, 1, 20))
        );
        assert_eq!(
            holiday("Labor Day").rule.date_in(2025),
            Some(date(2025, 9, 1))
        );
        assert_eq!(
            holiday("Thanksgiving Day").rule.date_in(2025),
            Some(date(2025, 11, 27))
        );
    }

    #[test]
    fn last_weekday_rule_resolves() {
        assert_eq!(
            holiday("Memorial Day").rule.date_in(2025),
            Some(date(2025, 5, 26))
        );
        assert_eq!(
            holiday("Memorial Day").rule.date_in(2024),
            Some(date(2024, 5, 27))
        );
    }

    #[test]
    fn easter_sunday_matches_published_dates() {
        for (y, m, d) in [
            (2008, 3, 23),
            (2019, 4, 21),
            (2024, 3, 31),
            (2025, 4, 20),
            (2038, 4, 25),
            (2049, 4, 18),
        ] {
            assert_eq!(easter_sunday(y), Some(date(y, m, d)), "Easter {y}");
        }
    }

    #[test]
    fn good_friday_resolves_for_any_year() {
        let good_friday = holiday("Good Friday");
        assert_eq!(good_friday.rule.date_in(2025), Some(date(2025, 4, 18)));
        assert_eq!(good_friday.rule.date_in(2026), Some(date(2026, 4, 3)));
        assert_eq!(good_friday.rule.date_in(2031), Some(date(2031, 4, 11)));
        assert_eq!(good_friday.rule.date_in(2045), Some(date(2045, 4, 7)));
        for year in 2000..2100 {
            let observed = good_friday.observed_in(year).unwrap();
            assert_eq!(observed.weekday(), Weekday::Fri, "Good Friday {year}");
        }
    }

    #[test]
    fn saturday_holiday_observed_friday() {
        // July 4th 2026 is a Saturday.
        assert_eq!(
            holiday("Independence Day").observed_in(2026),
            Some(date(2026, 7, 3))
        );
    }

    #[test]
    fn sunday_holiday_observed_monday() {
        // Juneteenth 2022 was a Sunday.
        assert_eq!(
            holiday("Juneteenth National Independence Day").observed_in(2022),
            Some(date(2022, 6, 20))
        );
    }

    #[test]
    fn saturday_new_year_closes_prior_december_31() {
        // January 1st 2028 is a Saturday.
        let found = observed_holiday(US_MARKET_HOLIDAYS, date(2027, 12, 31));
        assert_eq!(found.map(|h| h.name), Some("New Year's Day"));
    }

    #[test]
    fn ordinary_day_has_no_holiday() {
        assert!(observed_holiday(US_MARKET_HOLIDAYS, date(2025, 3, 12)).is_none());
    }
}
