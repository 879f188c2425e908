//! Series alignment
//!
//! Brings series of differing native resolution onto one time base before
//! they are combined. The coarsest step wins and each series is
//! consolidated into it with its own consolidation function; nothing is
//! interpolated.
//!
//! ```text
//! a: step 60   [0, 600)   10 samples ─┐
//! b: step 120  [0, 480)    4 samples ─┴─> step 120, [0, 480), 4 samples each
//! ```

use crate::store::TimeSeries;

/// Output of [`align`]
#[derive(Debug, Clone, PartialEq)]
pub struct Aligned {
    /// Common step in seconds
    pub step: i64,
    /// Common start (inclusive)
    pub start: i64,
    /// Common end (exclusive)
    pub end: i64,
    /// Inputs resampled onto the common grid, in input order
    pub series: Vec<TimeSeries>,
}

/// Align series onto a common step and window
///
/// The window is the overlap of all inputs. When steps differ it is widened
/// to whole multiples of the common step; inputs that already share a step
/// keep their exact bounds, so a single series passes through unchanged.
/// Inputs without overlap come back empty rather than failing.
pub fn align(series: &[TimeSeries]) -> Aligned {
    let Some(step) = series.iter().map(|s| s.step).max() else {
        return Aligned {
            step: 1,
            start: 0,
            end: 0,
            series: Vec::new(),
        };
    };

    let latest_start = series.iter().map(|s| s.start).max().unwrap_or(0);
    let earliest_end = series.iter().map(|s| s.end).min().unwrap_or(0);

    let (start, end) = if series.iter().all(|s| s.step == step) {
        (latest_start, earliest_end)
    } else {
        (
            latest_start.div_euclid(step) * step,
            ceil_div(earliest_end, step) * step,
        )
    };
    let end = end.max(start);

    let aligned = series
        .iter()
        .map(|s| resample(s, step, start, end))
        .collect();

    Aligned {
        step,
        start,
        end,
        series: aligned,
    }
}

/// Resample one series onto `[start, end)` at `step`
fn resample(series: &TimeSeries, step: i64, start: i64, end: i64) -> TimeSeries {
    let len = ((end - start) / step) as usize;

    let values = if series.step == step && series.start == start {
        series.values.iter().copied().take(len).collect()
    } else {
        (0..len)
            .map(|bucket| {
                let lo = start + bucket as i64 * step;
                let hi = lo + step;
                let first = ceil_div(lo - series.start, series.step).max(0) as usize;
                let last = (ceil_div(hi - series.start, series.step).max(0) as usize).min(series.len());
                if first >= last {
                    None
                } else {
                    series.consolidation.apply(&series.values[first..last])
                }
            })
            .collect()
    };

    with_grid(series, start, step, values)
}

/// Apply a `maxDataPoints` limit
///
/// Groups of `ceil(len / max_points)` consecutive samples are consolidated
/// into one, so the step grows by the same factor.
pub fn consolidate_to_max_points(series: &TimeSeries, max_points: usize) -> TimeSeries {
    if max_points == 0 || series.len() <= max_points {
        return series.clone();
    }
    let per_point = series.len().div_ceil(max_points);
    consolidate(series, per_point)
}

/// Consolidate every `per_point` consecutive samples into one
pub fn consolidate(series: &TimeSeries, per_point: usize) -> TimeSeries {
    if per_point <= 1 {
        return series.clone();
    }

    let values = series
        .values
        .chunks(per_point)
        .map(|chunk| series.consolidation.apply(chunk))
        .collect();

    with_grid(series, series.start, series.step * per_point as i64, values)
}

fn with_grid(series: &TimeSeries, start: i64, step: i64, values: Vec<Option<f64>>) -> TimeSeries {
    TimeSeries {
        name: series.name.clone(),
        path_expression: series.path_expression.clone(),
        start,
        end: start + step * values.len() as i64,
        step,
        values,
        consolidation: series.consolidation,
    }
}

fn ceil_div(a: i64, b: i64) -> i64 {
    -((-a).div_euclid(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Consolidation;

    fn ramp(name: &str, start: i64, step: i64, len: usize) -> TimeSeries {
        TimeSeries::new(name, start, step, (0..len).map(|i| Some(i as f64)).collect())
    }

    #[test]
    fn test_single_series_is_unchanged() {
        let series = ramp("a", 1_000, 7, 13);
        let aligned = align(std::slice::from_ref(&series));

        assert_eq!(aligned.step, 7);
        assert_eq!(aligned.start, series.start);
        assert_eq!(aligned.end, series.end);
        assert_eq!(aligned.series, vec![series]);
    }

    #[test]
    fn test_coarsest_step_wins() {
        let fine = ramp("fine", 0, 60, 10);
        let coarse = TimeSeries::new("coarse", 0, 120, vec![Some(1.0); 4]);

        let aligned = align(&[fine, coarse]);
        assert_eq!(aligned.step, 120);
        assert_eq!(aligned.start, 0);
        assert_eq!(aligned.end, 480);

        let fine = &aligned.series[0];
        assert_eq!(fine.step, 120);
        assert_eq!(fine.values, vec![Some(0.5), Some(2.5), Some(4.5), Some(6.5)]);
        assert_eq!(aligned.series[1].values, vec![Some(1.0); 4]);
    }

    #[test]
    fn test_consolidation_function_is_used() {
        let fine = ramp("fine", 0, 60, 4).with_consolidation(Consolidation::Max);
        let coarse = TimeSeries::new("coarse", 0, 120, vec![None, None]);

        let aligned = align(&[fine, coarse]);
        assert_eq!(aligned.series[0].values, vec![Some(1.0), Some(3.0)]);
        assert_eq!(aligned.series[0].consolidation, Consolidation::Max);
    }

    #[test]
    fn test_absent_samples_are_skipped() {
        let fine = TimeSeries::new("fine", 0, 60, vec![Some(2.0), None, None, None]);
        let coarse = TimeSeries::new("coarse", 0, 120, vec![Some(0.0); 2]);

        let aligned = align(&[fine, coarse]);
        assert_eq!(aligned.series[0].values, vec![Some(2.0), None]);
    }

    #[test]
    fn test_no_overlap_gives_empty_series() {
        let a = ramp("a", 0, 60, 5);
        let b = ramp("b", 10_000, 60, 5);

        let aligned = align(&[a, b]);
        assert!(aligned.series.iter().all(|s| s.is_empty()));
        assert_eq!(aligned.series.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let aligned = align(&[]);
        assert!(aligned.series.is_empty());
    }

    #[test]
    fn test_max_points() {
        let series = ramp("sin", 0, 60, 1440);

        let limited = consolidate_to_max_points(&series, 5);
        assert_eq!(limited.len(), 5);
        assert_eq!(limited.step, 60 * 288);
        assert_eq!(limited.end - limited.start, limited.step * 5);

        let limited = consolidate_to_max_points(&series, 100);
        assert_eq!(limited.len(), 96);

        let short = TimeSeries::new("c", 0, 1800, vec![Some(12.0); 3]);
        assert_eq!(consolidate_to_max_points(&short, 12), short);
    }

    #[test]
    fn test_consolidate_uneven_tail() {
        let series = TimeSeries::new("x", 0, 1, vec![Some(1.0), Some(3.0), Some(5.0)])
            .with_consolidation(Consolidation::Sum);
        let out = consolidate(&series, 2);
        assert_eq!(out.values, vec![Some(4.0), Some(5.0)]);
        assert_eq!(out.step, 2);
        assert_eq!(out.end, 4);
    }
}
