//! raw adc → moisture percentage for the capacitive grain probe.
//!
//! the probe reads ~3200 in dry grain and ~1500 when saturated; values in
//! between are interpolated linearly.

/// adc value of a dry probe (0% moisture)
pub const DRY_RAW: f64 = 3200.0;
/// adc value of a wet probe (100% moisture)
pub const WET_RAW: f64 = 1500.0;

/// convert a raw reading, rounded to one decimal and clamped to [0, 100]
pub fn to_moisture_percent(raw: f64) -> f64 {
    let pct = (DRY_RAW - raw) / (DRY_RAW - WET_RAW) * 100.0;
    if pct.is_nan() {
        return 0.0;
    }
    round1(pct).clamp(0.0, 100.0)
}

/// round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_endpoints() {
        assert_eq!(to_moisture_percent(WET_RAW), 100.0);
        assert_eq!(to_moisture_percent(DRY_RAW), 0.0);
        assert_eq!(to_moisture_percent(2350.0), 50.0);
    }

    #[test]
    fn test_non_increasing_over_calibrated_range() {
        let mut previous = f64::INFINITY;
        for raw in 1500..=3200 {
            let pct = to_moisture_percent(raw as f64);
            assert!(pct <= previous, "raw {} gave {} after {}", raw, pct, previous);
            previous = pct;
        }
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(to_moisture_percent(0.0), 100.0);
        assert_eq!(to_moisture_percent(4095.0), 0.0);
        assert_eq!(to_moisture_percent(-1.0e9), 100.0);
        assert_eq!(to_moisture_percent(f64::INFINITY), 0.0);
        assert_eq!(to_moisture_percent(f64::NAN), 0.0);
    }

    #[test]
    fn test_one_decimal() {
        // 3000 -> 11.7647..%
        assert_eq!(to_moisture_percent(3000.0), 11.8);
    }
}
