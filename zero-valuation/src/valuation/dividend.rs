//! Dense daily trailing cash-dividend series.

use chrono::NaiveDate;
use tracing::debug;

use crate::data::DividendEvent;

/// Trailing dividend sum on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DividendPoint {
    pub date: NaiveDate,
    pub dividend_ttm: f64,
}

/// Daily `dividend_ttm(d)` = sum of cash per share with ex-date in
/// `(d - window_days, d]`, for every calendar day from the first ex-date
/// through `through`.
#[derive(Debug, Clone, Default)]
pub struct DividendSeries {
    points: Vec<DividendPoint>,
}

impl DividendSeries {
    /// Build the series. Events after `through` and non-finite amounts are ignored.
    pub fn build(events: &[DividendEvent], window_days: u32, through: NaiveDate) -> Self {
        let usable: Vec<&DividendEvent> = events
            .iter()
            .filter(|e| {
                let ok = e.cash_dividend_per_share.is_finite() && e.ex_date <= through;
                if !ok {
                    debug!(
                        symbol = %e.symbol,
                        ex_date = %e.ex_date,
                        amount = e.cash_dividend_per_share,
                        "Ignoring dividend event"
                    );
                }
                ok
            })
            .collect();

        let Some(start) = usable.iter().map(|e| e.ex_date).min() else {
            return Self::default();
        };

        let days = (through - start).num_days() as usize + 1;
        let mut paid = vec![0.0_f64; days];
        for event in usable {
            paid[(event.ex_date - start).num_days() as usize] += event.cash_dividend_per_share;
        }

        let mut prefix = Vec::with_capacity(days + 1);
        prefix.push(0.0_f64);
        for amount in &paid {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + amount);
        }

        let window = window_days as usize;
        let points = (0..days)
            .map(|i| {
                let lower = (i + 1).saturating_sub(window);
                DividendPoint {
                    date: start + chrono::Duration::days(i as i64),
                    dividend_ttm: prefix[i + 1] - prefix[lower],
                }
            })
            .collect();

        Self { points }
    }

    /// Dense points in date order.
    pub fn points(&self) -> &[DividendPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Exact-date lookup; 0 outside the series.
    pub fn value_on(&self, date: NaiveDate) -> f64 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };
        let offset = (date - first.date).num_days();
        if offset < 0 {
            return 0.0;
        }
        self.points
            .get(offset as usize)
            .map_or(0.0, |p| p.dividend_ttm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(ex_date: NaiveDate, amount: f64) -> DividendEvent {
        DividendEvent {
            symbol: "600036".into(),
            ex_date,
            cash_dividend_per_share: amount,
        }
    }

    fn t0() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 7, 1).unwrap()
    }

    #[test]
    fn test_window_excludes_old_event() {
        let t = t0();
        let events = vec![
            event(t, 1.0),
            event(t + Duration::days(200), 1.0),
            event(t + Duration::days(400), 1.0),
        ];

        let series = DividendSeries::build(&events, 395, t + Duration::days(500));

        assert_eq!(series.value_on(t + Duration::days(400)), 2.0);
        assert_eq!(series.value_on(t + Duration::days(394)), 2.0);
        // t drops out on t+395
        assert_eq!(series.value_on(t + Duration::days(395)), 1.0);
        assert_eq!(series.value_on(t + Duration::days(399)), 1.0);
    }

    #[test]
    fn test_dense_from_first_ex_date() {
        let t = t0();
        let through = t + Duration::days(30);
        let series = DividendSeries::build(&[event(t, 0.5)], 395, through);

        assert_eq!(series.points().len(), 31);
        assert_eq!(series.points()[0].date, t);
        assert_eq!(series.points()[30].date, through);
        assert!(series.points().iter().all(|p| p.dividend_ttm == 0.5));
    }

    #[test]
    fn test_zero_before_first_ex_date() {
        let t = t0();
        let series = DividendSeries::build(&[event(t, 0.5)], 395, t + Duration::days(5));
        assert_eq!(series.value_on(t - Duration::days(1)), 0.0);
        assert_eq!(series.value_on(t), 0.5);
    }

    #[test]
    fn test_same_day_events_summed() {
        let t = t0();
        let series = DividendSeries::build(&[event(t, 0.3), event(t, 0.2)], 395, t);
        assert!((series.value_on(t) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_no_events() {
        let series = DividendSeries::build(&[], 395, t0());
        assert!(series.is_empty());
        assert_eq!(series.value_on(t0()), 0.0);
    }

    #[test]
    fn test_future_events_ignored() {
        let t = t0();
        let series = DividendSeries::build(&[event(t + Duration::days(10), 1.0)], 395, t);
        assert!(series.is_empty());
    }
}
