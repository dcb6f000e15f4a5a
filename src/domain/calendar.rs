//! Weekly trading calendar for backtests.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// A Monday-to-Friday trading week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWeek {
    pub monday: NaiveDate,
    pub friday: NaiveDate,
}

/// Every week whose Monday falls within `[start, end]`, in order.
pub fn trading_weeks(start: NaiveDate, end: NaiveDate) -> Vec<TradingWeek> {
    let offset = (7 - start.weekday().num_days_from_monday()) % 7;
    let mut weeks = Vec::new();
    let mut monday = match start.checked_add_days(Days::new(offset as u64)) {
        Some(d) => d,
        None => return weeks,
    };

    while monday <= end {
        debug_assert_eq!(monday.weekday(), Weekday::Mon);
        let Some(friday) = monday.checked_add_days(Days::new(4)) else {
            break;
        };
        weeks.push(TradingWeek { monday, friday });
        match monday.checked_add_days(Days::new(7)) {
            Some(next) => monday = next,
            None => break,
        }
    }
    weeks
}

/// Label for the `index`-th (0-based) week, e.g. `W1(2024-01-01)`.
pub fn week_label(index: usize, monday: NaiveDate) -> String {
    format!("W{}({})", index + 1, monday.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn starts_on_first_monday_at_or_after_start() {
        // 2024-01-03 is a Wednesday
        let weeks = trading_weeks(d(2024, 1, 3), d(2024, 1, 31));
        let mondays: Vec<NaiveDate> = weeks.iter().map(|w| w.monday).collect();
        assert_eq!(mondays, vec![d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 22), d(2024, 1, 29)]);
        assert_eq!(weeks[0].friday, d(2024, 1, 12));
    }

    #[test]
    fn monday_start_and_end_are_inclusive() {
        let weeks = trading_weeks(d(2024, 1, 1), d(2024, 1, 8));
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[1].monday, d(2024, 1, 8));
    }

    #[test]
    fn empty_when_no_monday_in_range() {
        assert!(trading_weeks(d(2024, 1, 2), d(2024, 1, 7)).is_empty());
        assert!(trading_weeks(d(2024, 2, 1), d(2024, 1, 1)).is_empty());
    }

    #[test]
    fn labels_are_one_based() {
        assert_eq!(week_label(0, d(2024, 1, 1)), "W1(2024-01-01)");
        assert_eq!(week_label(11, d(2024, 3, 25)), "W12(2024-03-25)");
    }
}
