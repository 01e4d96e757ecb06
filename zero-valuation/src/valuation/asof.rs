//! Backward as-of join.
//!
//! For every point on a dense timeline, attach the latest element of a sparse
//! series whose key does not exceed that point. Share counts, roll-up rows and
//! the daily dividend series are all aligned onto the trading calendar this way.

/// Align `series` onto `timeline` with a backward as-of join.
///
/// Both inputs must be sorted ascending (`timeline` by value, `series` by
/// `key`). When several elements share a key, the last one wins. Points that
/// precede the first key resolve to `None`.
pub fn as_of_join<'a, D, T, K>(timeline: &[D], series: &'a [T], key: K) -> Vec<Option<&'a T>>
where
    D: Ord + Copy,
    K: Fn(&T) -> D,
{
    debug_assert!(timeline.windows(2).all(|w| w[0] <= w[1]), "timeline not sorted");
    debug_assert!(
        series.windows(2).all(|w| key(&w[0]) <= key(&w[1])),
        "series not sorted by key"
    );

    let mut aligned = Vec::with_capacity(timeline.len());
    let mut next = 0;
    let mut current: Option<&T> = None;

    for &point in timeline {
        while next < series.len() && key(&series[next]) <= point {
            current = Some(&series[next]);
            next += 1;
        }
        aligned.push(current);
    }

    aligned
}
