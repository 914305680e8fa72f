//! simulated 7-day moisture and temperature outlooks.
//!
//! both are clamped random walks; the random source is injected so callers
//! can seed it.

use crate::calibration::round1;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use serde::Serialize;

pub const FORECAST_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyForecast {
    /// abbreviated weekday, e.g. "Mon"
    pub day: String,
    pub high: f64,
    pub low: f64,
}

fn day_label(start: NaiveDate, offset: i64) -> String {
    (start + Duration::days(offset)).format("%a").to_string()
}

/// centered uniform noise: U(-0.5, 0.5) * span
fn noise<R: Rng + ?Sized>(rng: &mut R, span: f64) -> f64 {
    (rng.gen::<f64>() - 0.5) * span
}

/// grain moisture highs/lows (%), drifting slightly downward
pub fn moisture_forecast<R: Rng + ?Sized>(rng: &mut R, start: NaiveDate) -> Vec<DailyForecast> {
    let mut high = 18.0 + noise(rng, 4.0);
    let mut low = 15.0 + noise(rng, 4.0);

    (0..FORECAST_DAYS)
        .map(|i| {
            high += -0.3 + noise(rng, 1.5);
            // low drifts down a little less than high
            low += -0.3 + (rng.gen::<f64>() - 0.4) * 1.5;

            if high < 12.0 {
                high = 12.0 + rng.gen::<f64>();
            }
            if high > 22.0 {
                high = 22.0 - rng.gen::<f64>();
            }
            if low < 11.0 {
                low = 11.0 + rng.gen::<f64>();
            }
            if low > high - 1.0 {
                low = high - 1.0 - rng.gen::<f64>();
            }

            DailyForecast { day: day_label(start, i), high: round1(high), low: round1(low) }
        })
        .collect()
}

/// air temperature highs/lows (°C), whole degrees
pub fn temperature_forecast<R: Rng + ?Sized>(rng: &mut R, start: NaiveDate) -> Vec<DailyForecast> {
    let mut high = 20.0 + noise(rng, 8.0);
    let mut low = 10.0 + noise(rng, 6.0);

    (0..FORECAST_DAYS)
        .map(|i| {
            high += noise(rng, 3.0);
            low += noise(rng, 3.0);

            if low >= high - 3.0 {
                low = high - 4.0 - rng.gen::<f64>() * 2.0;
            }

            DailyForecast { day: day_label(start, i), high: high.round(), low: low.round() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    #[test]
    fn test_day_labels_start_today() {
        let days: Vec<String> = moisture_forecast(&mut StdRng::seed_from_u64(1), monday())
            .into_iter()
            .map(|d| d.day)
            .collect();
        assert_eq!(days, vec!["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]);
    }

    #[test]
    fn test_moisture_walk_stays_in_band() {
        for seed in 0..200 {
            let forecast = moisture_forecast(&mut StdRng::seed_from_u64(seed), monday());
            assert_eq!(forecast.len(), 7);
            for day in forecast {
                assert!((12.0..=22.0).contains(&day.high), "seed {} high {}", seed, day.high);
                assert!(day.low < day.high, "seed {} low {} high {}", seed, day.low, day.high);
            }
        }
    }

    #[test]
    fn test_temperature_keeps_a_spread() {
        for seed in 0..200 {
            for day in temperature_forecast(&mut StdRng::seed_from_u64(seed), monday()) {
                assert!(day.high - day.low >= 3.0, "seed {} {:?}", seed, day);
                assert_eq!(day.high.fract(), 0.0);
            }
        }
    }

    #[test]
    fn test_same_seed_same_forecast() {
        let a = temperature_forecast(&mut StdRng::seed_from_u64(9), monday());
        let b = temperature_forecast(&mut StdRng::seed_from_u64(9), monday());
        assert_eq!(a, b);
    }
}
