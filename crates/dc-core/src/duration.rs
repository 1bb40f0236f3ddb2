//! Remaining-time formatting for work results.

use std::fmt;

const SECS_PER_DAY: u64 = 24 * 60 * 60;
const SECS_PER_HOUR: u64 = 60 * 60;
const SECS_PER_MINUTE: u64 = 60;

/// A whole-second duration split into days, hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dhms {
    pub days: u64,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl Dhms {
    /// Rounds `secs` to the nearest second and decomposes it.
    ///
    /// Negative, NaN and infinite inputs are treated as zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        let total = if secs.is_finite() && secs > 0.0 {
            // `as` saturates for values beyond u64::MAX
            secs.round() as u64
        } else {
            0
        };
        Self::from_secs(total)
    }

    pub fn from_secs(total: u64) -> Self {
        // Each remainder is below its modulus, so the narrowing casts are lossless.
        Self {
            days: total / SECS_PER_DAY,
            hours: ((total % SECS_PER_DAY) / SECS_PER_HOUR) as u8,
            minutes: ((total % SECS_PER_HOUR) / SECS_PER_MINUTE) as u8,
            seconds: (total % SECS_PER_MINUTE) as u8,
        }
    }

    pub fn total_secs(&self) -> u64 {
        self.days * SECS_PER_DAY
            + u64::from(self.hours) * SECS_PER_HOUR
            + u64::from(self.minutes) * SECS_PER_MINUTE
            + u64::from(self.seconds)
    }
}

/// Compact rendering: leading zero units are dropped.
///
/// `5s`, `2m:5s`, `1h:2m:5s`, `3d 1h:2m:5s`.
impl fmt::Display for Dhms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.days > 0 {
            write!(
                f,
                "{}d {}h:{}m:{}s",
                self.days, self.hours, self.minutes, self.seconds
            )
        } else if self.hours > 0 {
            write!(f, "{}h:{}m:{}s", self.hours, self.minutes, self.seconds)
        } else if self.minutes > 0 {
            write!(f, "{}m:{}s", self.minutes, self.seconds)
        } else {
            write!(f, "{}s", self.seconds)
        }
    }
}

/// Formats a remaining-seconds estimate for display.
pub fn format_dhms(secs: f64) -> String {
    Dhms::from_secs_f64(secs).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_compact_forms() {
        assert_eq!(format_dhms(0.0), "0s");
        assert_eq!(format_dhms(5.0), "5s");
        assert_eq!(format_dhms(125.0), "2m:5s");
        assert_eq!(format_dhms(3725.0), "1h:2m:5s");
        assert_eq!(format_dhms(90125.0), "1d 1h:2m:5s");
    }

    #[test]
    fn test_inner_zero_units_are_kept() {
        assert_eq!(format_dhms(3600.0), "1h:0m:0s");
        assert_eq!(format_dhms(86400.0 + 5.0), "1d 0h:0m:5s");
    }

    #[test]
    fn test_rounds_to_nearest_second() {
        assert_eq!(format_dhms(59.4), "59s");
        assert_eq!(format_dhms(59.5), "1m:0s");
        assert_eq!(Dhms::from_secs_f64(0.49).total_secs(), 0);
    }

    #[test]
    fn test_negative_and_non_finite_clamp_to_zero() {
        assert_eq!(Dhms::from_secs_f64(-12.0), Dhms::default());
        assert_eq!(Dhms::from_secs_f64(f64::NAN), Dhms::default());
        assert_eq!(Dhms::from_secs_f64(f64::NEG_INFINITY), Dhms::default());
    }

    #[test]
    fn test_decomposition_recomposes() {
        let samples = [
            0.0, 0.5, 1.0, 59.0, 60.0, 61.7, 3599.0, 3600.0, 86399.5, 86400.0, 123_456.2,
            1_000_000.0, 31_536_000.9,
        ];
        for secs in samples {
            let d = Dhms::from_secs_f64(secs);
            assert_eq!(d.total_secs(), secs.round() as u64, "input {secs}");
            assert!(d.hours < 24);
            assert!(d.minutes < 60);
            assert!(d.seconds < 60);
        }
    }

    #[test]
    fn test_decomposition_recomposes_dense_range() {
        for total in (0..200_000u64).step_by(37) {
            let d = Dhms::from_secs(total);
            assert_eq!(d.total_secs(), total);
            assert!(d.hours < 24 && d.minutes < 60 && d.seconds < 60);
        }
    }
}
