/// In-game date as a day count. All link graph timestamps use it.
pub type Date = i32;

/// Signed interval between two dates, in days.
pub type DateDelta = i32;

/// Timestamp that was never set.
pub const INVALID_DATE: Date = -1;

/// Days per month used when normalising accumulated figures.
pub const DAYS_PER_MONTH: u32 = 30;

/// Shift `date` by `interval` unless it is [`INVALID_DATE`].
#[inline]
pub fn shift_valid(date: Date, interval: DateDelta) -> Date {
    if date == INVALID_DATE {
        date
    } else {
        date.saturating_add(interval)
    }
}

/// Number of days covered by `[since, now]`, never less than one.
#[inline]
pub fn inclusive_age(now: Date, since: Date) -> u32 {
    let age = i64::from(now) - i64::from(since) + 1;
    age.clamp(1, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_date_is_not_shifted() {
        assert_eq!(shift_valid(INVALID_DATE, 100), INVALID_DATE);
        assert_eq!(shift_valid(20, -5), 15);
    }

    #[test]
    fn inclusive_age_counts_both_ends() {
        assert_eq!(inclusive_age(10, 10), 1);
        assert_eq!(inclusive_age(10, 4), 7);
    }

    #[test]
    fn inclusive_age_never_zero() {
        // A date in the future relative to `now` still yields a usable divisor.
        assert_eq!(inclusive_age(3, 50), 1);
    }
}
