//! Derived metrics
//!
//! Pure functions that turn raw counters and timestamps into display values. All of
//! them are total: zero denominators, absent timestamps, clock skew and non-finite
//! inputs produce `0` (or `"N/A"` for formatted times), never NaN or infinity.
//!
//! Timestamps are Unix seconds as reported by the backend (`f64`).

use chrono::{Local, TimeZone, Utc};

/// Bytes per mebibyte, the unit of the bandwidth readouts.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Percentage of completed writes, clamped to `[0, 100]`.
///
/// `completed > requested` happens when the backend counters race; it shows as 100.
pub fn progress_percent(completed: f64, requested: f64) -> f64 {
    if requested.is_nan() || requested <= 0.0 {
        return 0.0;
    }
    let percent = 100.0 * completed / requested;
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0)
}

/// Whole seconds between `start` and `stop` (or now, while still running).
pub fn elapsed_seconds(start: Option<f64>, stop: Option<f64>) -> u64 {
    elapsed_seconds_at(start, stop, now_unix_seconds())
}

/// [`elapsed_seconds`] against an explicit clock.
///
/// A start of zero or below is treated as absent; the backend uses `0` for "never".
pub fn elapsed_seconds_at(start: Option<f64>, stop: Option<f64>, now: f64) -> u64 {
    let Some(start) = start.filter(|s| s.is_finite() && *s > 0.0) else {
        return 0;
    };
    let end = stop.filter(|s| s.is_finite()).unwrap_or(now);
    let delta = (end - start).round();
    if delta.is_finite() && delta > 0.0 {
        delta as u64
    } else {
        0
    }
}

/// Seconds between two recorded timestamps, `0.0` unless both are present and ordered.
pub fn duration_seconds(start: Option<f64>, stop: Option<f64>) -> f64 {
    match (start, stop) {
        (Some(start), Some(stop)) => {
            let delta = stop - start;
            if delta.is_finite() && delta > 0.0 {
                delta
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Bandwidth in MB/s with two decimals.
pub fn bandwidth_mbps(bytes_per_second: f64) -> String {
    fixed2(bytes_per_second / BYTES_PER_MB)
}

/// Image rate in Hz with two decimals.
pub fn frequency_hz(images_per_second: f64) -> String {
    fixed2(images_per_second)
}

/// Local `YYYY-MM-DD HH:MM:SS`, or `N/A` for an absent/zero timestamp.
pub fn format_timestamp(unix_seconds: Option<f64>) -> String {
    let Some(ts) = unix_seconds.filter(|t| t.is_finite() && *t > 0.0) else {
        return "N/A".to_string();
    };
    let secs = ts.trunc() as i64;
    let nanos = ((ts - ts.trunc()) * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "N/A".to_string(),
    }
}

/// Two-decimal rendering that maps non-finite input to `0.00` and avoids `-0.00`.
pub fn fixed2(value: f64) -> String {
    if !value.is_finite() {
        return "0.00".to_string();
    }
    let text = format!("{:.2}", value);
    if text == "-0.00" {
        "0.00".to_string()
    } else {
        text
    }
}

fn now_unix_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_bounded() {
        assert_eq!(progress_percent(0.0, 0.0), 0.0);
        assert_eq!(progress_percent(5.0, 0.0), 0.0);
        assert_eq!(progress_percent(50.0, 100.0), 50.0);
        assert_eq!(progress_percent(150.0, 100.0), 100.0);
        assert_eq!(progress_percent(-3.0, 100.0), 0.0);
        assert_eq!(progress_percent(1.0, -1.0), 0.0);
        assert_eq!(progress_percent(f64::NAN, 10.0), 0.0);
        assert_eq!(progress_percent(10.0, f64::NAN), 0.0);
        assert_eq!(progress_percent(f64::INFINITY, f64::INFINITY), 0.0);
        assert_eq!(progress_percent(f64::INFINITY, 10.0), 100.0);
    }

    #[test]
    fn progress_grid_stays_in_range() {
        for completed in 0..=40u32 {
            for requested in 0..=40u32 {
                let p = progress_percent(f64::from(completed), f64::from(requested));
                assert!(p.is_finite());
                assert!((0.0..=100.0).contains(&p), "{completed}/{requested} -> {p}");
            }
        }
    }

    #[test]
    fn elapsed_examples() {
        assert_eq!(elapsed_seconds_at(Some(1000.0), Some(1005.0), 0.0), 5);
        assert_eq!(elapsed_seconds_at(None, Some(1005.0), 2000.0), 0);
        assert_eq!(elapsed_seconds(None, None), 0);
        assert_eq!(elapsed_seconds_at(Some(1000.0), None, 1010.4), 10);
        assert_eq!(elapsed_seconds_at(Some(1000.0), Some(1000.6), 0.0), 1);
    }

    #[test]
    fn elapsed_never_negative() {
        assert_eq!(elapsed_seconds_at(Some(1005.0), Some(1000.0), 0.0), 0);
        assert_eq!(elapsed_seconds_at(Some(5000.0), None, 1000.0), 0);
        assert_eq!(elapsed_seconds_at(Some(f64::NAN), Some(1.0), 2.0), 0);
        assert_eq!(elapsed_seconds_at(Some(0.0), None, 1_700_000_000.0), 0);
        assert_eq!(
            elapsed_seconds_at(Some(1000.0), Some(f64::INFINITY), 1003.0),
            3
        );
    }

    #[test]
    fn duration_requires_both_ends() {
        assert_eq!(duration_seconds(Some(10.0), Some(12.5)), 2.5);
        assert_eq!(duration_seconds(Some(10.0), None), 0.0);
        assert_eq!(duration_seconds(Some(12.0), Some(10.0)), 0.0);
    }

    #[test]
    fn bandwidth_and_frequency_formatting() {
        assert_eq!(bandwidth_mbps(2_097_152.0), "2.00");
        assert_eq!(bandwidth_mbps(0.0), "0.00");
        assert_eq!(bandwidth_mbps(f64::NAN), "0.00");
        assert_eq!(bandwidth_mbps(-1.0), "0.00");
        assert_eq!(frequency_hz(99.999), "100.00");
        assert_eq!(frequency_hz(12.346), "12.35");
        assert_eq!(frequency_hz(f64::INFINITY), "0.00");
    }

    #[test]
    fn timestamps_absent_render_na() {
        assert_eq!(format_timestamp(None), "N/A");
        assert_eq!(format_timestamp(Some(0.0)), "N/A");
        assert_eq!(format_timestamp(Some(f64::NAN)), "N/A");
        let text = format_timestamp(Some(1_684_930_336.125));
        assert_eq!(text.len(), "2023-05-24 12:12:16".len());
        assert!(text.starts_with("2023-05-2"));
    }
}
