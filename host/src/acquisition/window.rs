use crate::calibration::{round1, to_moisture_percent};
use crate::domain::{MoistureSample, RawReading};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// how many samples the live chart keeps
pub const DISPLAY_BUFFER_LEN: usize = 30;

/// where the window's readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// synthetic generator, no hardware needed
    #[default]
    Simulated,
    /// request/response against the sensor endpoint
    Polled,
    /// push updates for one device from the reading store
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    LastSample,
    Mean,
}

/// termination rules for one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPolicy {
    pub ticks: u32,
    pub finalize: Finalize,
    /// readings at least this old (ms) at arrival are discarded
    pub stale_after_ms: Option<i64>,
}

impl WindowPolicy {
    pub fn for_source(kind: SourceKind, stale_after_ms: i64) -> Self {
        match kind {
            SourceKind::Simulated => Self {
                ticks: 10,
                finalize: Finalize::LastSample,
                stale_after_ms: None,
            },
            SourceKind::Subscription => Self {
                ticks: 8,
                finalize: Finalize::LastSample,
                stale_after_ms: None,
            },
            SourceKind::Polled => Self {
                ticks: 6,
                finalize: Finalize::Mean,
                stale_after_ms: Some(stale_after_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Offer {
    /// sample counted; window still open
    Recorded(MoistureSample),
    /// sample counted and the window closed with this final value
    Complete(f64),
    /// too old, not counted
    Stale,
    /// window already closed
    Closed,
}

/// tick counter, live buffer and final-value bookkeeping for one window
#[derive(Debug, Clone)]
pub struct AcquisitionWindow {
    policy: WindowPolicy,
    ticks: u32,
    buffer: VecDeque<MoistureSample>,
    collected: Vec<f64>,
    current: Option<f64>,
    complete: bool,
}

impl AcquisitionWindow {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            ticks: 0,
            buffer: VecDeque::with_capacity(DISPLAY_BUFFER_LEN),
            collected: Vec::with_capacity(policy.ticks as usize),
            current: None,
            complete: false,
        }
    }

    /// start over, optionally under a different policy
    pub fn reset(&mut self, policy: WindowPolicy) {
        *self = Self::new(policy);
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn samples(&self) -> Vec<MoistureSample> {
        self.buffer.iter().copied().collect()
    }

    /// convert and record a raw reading, discarding it if stale at `now_ms`
    pub fn offer_raw(&mut self, reading: &RawReading, now_ms: i64) -> Offer {
        if let Some(limit) = self.policy.stale_after_ms {
            if now_ms - reading.timestamp >= limit {
                return Offer::Stale;
            }
        }
        self.offer(to_moisture_percent(reading.raw_value))
    }

    /// record an already-converted moisture value
    pub fn offer(&mut self, moisture_percent: f64) -> Offer {
        if self.complete {
            return Offer::Closed;
        }

        self.ticks += 1;
        let sample = MoistureSample { sequence_index: self.ticks, moisture_percent };
        if self.buffer.len() == DISPLAY_BUFFER_LEN {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
        self.collected.push(moisture_percent);
        self.current = Some(moisture_percent);

        if self.ticks < self.policy.ticks {
            return Offer::Recorded(sample);
        }

        self.complete = true;
        let value = match self.policy.finalize {
            Finalize::LastSample => moisture_percent,
            Finalize::Mean => {
                round1(self.collected.iter().sum::<f64>() / self.collected.len() as f64)
            }
        };
        self.current = Some(value);
        Offer::Complete(value)
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn polled() -> AcquisitionWindow {
        AcquisitionWindow::new(WindowPolicy::for_source(SourceKind::Polled, 30_000))
    }

    #[test]
    fn test_simulated_window_closes_on_tenth_tick_with_last_value() {
        let mut window = AcquisitionWindow::new(WindowPolicy::for_source(SourceKind::Simulated, 30_000));
        for i in 1..10 {
            assert!(matches!(window.offer(14.0 + i as f64 / 10.0), Offer::Recorded(_)));
        }
        assert_eq!(window.offer(13.2), Offer::Complete(13.2));
        assert_eq!(window.offer(99.0), Offer::Closed);
        assert_eq!(window.ticks(), 10);
    }

    #[test]
    fn test_subscription_window_is_eight_ticks() {
        let mut window = AcquisitionWindow::new(WindowPolicy::for_source(SourceKind::Subscription, 30_000));
        for _ in 0..7 {
            window.offer(12.0);
        }
        assert!(!window.is_complete());
        assert_eq!(window.offer(12.5), Offer::Complete(12.5));
    }

    #[test]
    fn test_polled_window_finalizes_to_mean() {
        let mut window = polled();
        let values = [10.0, 10.2, 9.8, 10.1, 9.9, 10.0];
        let mut last = Offer::Closed;
        for v in values {
            last = window.offer(v);
        }
        assert_eq!(last, Offer::Complete(10.0));
        assert_eq!(window.current(), Some(10.0));
    }

    #[test]
    fn test_stale_polled_reading_is_not_counted() {
        let mut window = polled();
        let stale = RawReading { raw_value: 2350.0, timestamp: NOW - 30_000 };
        assert_eq!(window.offer_raw(&stale, NOW), Offer::Stale);
        assert_eq!(window.ticks(), 0);
        assert!(window.samples().is_empty());
        assert_eq!(window.current(), None);

        let fresh = RawReading { raw_value: 2350.0, timestamp: NOW - 29_999 };
        assert!(matches!(window.offer_raw(&fresh, NOW), Offer::Recorded(s) if s.moisture_percent == 50.0));
        assert_eq!(window.ticks(), 1);
    }

    #[test]
    fn test_non_polled_sources_ignore_age() {
        let mut window = AcquisitionWindow::new(WindowPolicy::for_source(SourceKind::Subscription, 30_000));
        let ancient = RawReading { raw_value: 3200.0, timestamp: 0 };
        assert!(matches!(window.offer_raw(&ancient, NOW), Offer::Recorded(_)));
    }

    #[test]
    fn test_reset_clears_buffer_and_counter() {
        let mut window = polled();
        window.offer(10.0);
        window.offer(11.0);
        window.reset(WindowPolicy::for_source(SourceKind::Simulated, 30_000));

        assert_eq!(window.ticks(), 0);
        assert!(window.samples().is_empty());
        assert_eq!(window.current(), None);
        assert_eq!(window.policy().ticks, 10);
    }

    #[test]
    fn test_display_buffer_keeps_last_thirty() {
        let policy = WindowPolicy { ticks: 40, finalize: Finalize::LastSample, stale_after_ms: None };
        let mut window = AcquisitionWindow::new(policy);
        for i in 0..35 {
            window.offer(i as f64);
        }
        let samples = window.samples();
        assert_eq!(samples.len(), DISPLAY_BUFFER_LEN);
        assert_eq!(samples[0].sequence_index, 6);
        assert_eq!(samples.last().unwrap().sequence_index, 35);
    }
}
