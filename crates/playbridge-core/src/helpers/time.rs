// crates/playbridge-core/src/helpers/time.rs
//
// Duration utilities shared by the engine (seek clamping) and the control
// (position coercion, log lines).

use std::time::Duration;

/// Clamp `value` into `[min, max]`. Callers check `max > min` first; a
/// degenerate window returns `min`.
pub fn clamp_duration(value: Duration, min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    value.clamp(min, max)
}

/// Scale a wall-clock interval by a playback speed ratio.
/// Non-finite or negative ratios advance nothing.
pub fn scale_elapsed(elapsed: Duration, speed_ratio: f64) -> Duration {
    if !speed_ratio.is_finite() || speed_ratio <= 0.0 {
        return Duration::ZERO;
    }
    elapsed.mul_f64(speed_ratio)
}

/// Format a duration as `HH:MM:SS.mmm`.
///
/// ```
/// use std::time::Duration;
/// use playbridge_core::helpers::time::format_timecode;
/// assert_eq!(format_timecode(Duration::ZERO),                "00:00:00.000");
/// assert_eq!(format_timecode(Duration::from_millis(61_500)), "00:01:01.500");
/// assert_eq!(format_timecode(Duration::from_secs(3_725)),    "01:02:05.000");
/// ```
pub fn format_timecode(d: Duration) -> String {
    let total = d.as_secs();
    let h  = total / 3600;
    let m  = (total % 3600) / 60;
    let s  = total % 60;
    let ms = d.subsec_millis();
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_inside_window() {
        let (a, b) = (Duration::from_secs(2), Duration::from_secs(8));
        assert_eq!(clamp_duration(Duration::from_secs(5), a, b), Duration::from_secs(5));
        assert_eq!(clamp_duration(Duration::from_secs(1), a, b), a);
        assert_eq!(clamp_duration(Duration::from_secs(9), a, b), b);
    }

    #[test]
    fn clamp_degenerate_window_returns_min() {
        let t = Duration::from_secs(3);
        assert_eq!(clamp_duration(Duration::from_secs(7), t, t), t);
        assert_eq!(clamp_duration(Duration::from_secs(7), t, Duration::from_secs(1)), t);
    }

    #[test]
    fn scale_elapsed_by_ratio() {
        let ms = Duration::from_millis(100);
        assert_eq!(scale_elapsed(ms, 2.0), Duration::from_millis(200));
        assert_eq!(scale_elapsed(ms, 0.0), Duration::ZERO);
        assert_eq!(scale_elapsed(ms, f64::NAN), Duration::ZERO);
    }

    #[test]
    fn timecode_subsecond() {
        assert_eq!(format_timecode(Duration::from_millis(999)), "00:00:00.999");
    }
}
