//! Millisecond/`Duration` conversions used at the API edge.
//!
//! Everything inside the scheduler is an integer-nanosecond `Duration`; the
//! public configuration and statistics speak milliseconds as `f64`.

use std::time::Duration;

/// Wall-clock budget for draining updates in a single frame.
pub const PHYSICS_BUDGET: Duration = Duration::from_millis(8);

/// Convert milliseconds to a `Duration`. Negative and NaN values become zero,
/// values too large to represent saturate.
pub fn from_ms(ms: f64) -> Duration {
    if ms.is_nan() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
}

/// Convert a `Duration` to fractional milliseconds.
#[inline]
pub fn as_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Nanosecond count clamped into a `u64` (wire format).
#[inline]
pub fn to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Multiply a duration by a positive factor. A factor of exactly 1.0 is
/// returned untouched so unscaled sessions never round.
pub fn scale(d: Duration, factor: f64) -> Duration {
    if factor == 1.0 {
        return d;
    }
    if !factor.is_finite() || factor <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(d.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// `d * new / old` in integer nanoseconds.
pub fn rescale(d: Duration, new: Duration, old: Duration) -> Duration {
    let old = old.as_nanos();
    if old == 0 {
        return d;
    }
    let nanos = d.as_nanos() * new.as_nanos() / old;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// `a / b` as a float, zero when `b` is zero.
pub fn ratio(a: Duration, b: Duration) -> f64 {
    if b.is_zero() {
        return 0.0;
    }
    a.as_nanos() as f64 / b.as_nanos() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_round_trip_is_close() {
        let d = from_ms(16.667);
        assert!((as_ms(d) - 16.667).abs() < 1e-6);
    }

    #[test]
    fn negative_and_nan_become_zero() {
        assert_eq!(from_ms(-3.0), Duration::ZERO);
        assert_eq!(from_ms(f64::NAN), Duration::ZERO);
        assert_eq!(from_ms(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn rescale_preserves_ratio() {
        let acc = Duration::from_millis(20);
        let out = rescale(acc, from_ms(8.0), from_ms(16.667));
        assert!((as_ms(out) - 9.5998).abs() < 1e-3, "got {}", as_ms(out));
    }

    #[test]
    fn unit_scale_is_exact() {
        let d = Duration::from_nanos(16_666_667);
        assert_eq!(scale(d, 1.0), d);
        assert_eq!(scale(Duration::from_millis(10), 2.0), Duration::from_millis(20));
    }
}
