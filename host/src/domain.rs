//! ==============================================================================
//! domain.rs - shared data model
//! ==============================================================================
//!
//! purpose:
//!     the types that flow between the sensor endpoint, the acquisition
//!     windows, the advisor and the http api. everything here is plain data
//!     with serde derives; behavior lives in the modules that own it.
//!
//! relationships:
//!     - used by: store.rs, acquisition/*, advisor.rs, server.rs, dashboard.rs
//!
//! ==============================================================================

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// current unix time in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ==============================================================================
// grain & status
// ==============================================================================

/// grain types the analyzer knows thresholds for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GrainType {
    #[default]
    Wheat,
    Rice,
    Maize,
}

impl GrainType {
    pub const ALL: [GrainType; 3] = [GrainType::Wheat, GrainType::Rice, GrainType::Maize];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrainType::Wheat => "Wheat",
            GrainType::Rice => "Rice",
            GrainType::Maize => "Maize",
        }
    }
}

impl fmt::Display for GrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrainType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrainType::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown grain type: {}", s))
    }
}

/// three-level storage verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoistureStatus {
    Good,
    Caution,
    Bad,
}

impl MoistureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoistureStatus::Good => "good",
            MoistureStatus::Caution => "caution",
            MoistureStatus::Bad => "bad",
        }
    }
}

// ==============================================================================
// readings & measurements
// ==============================================================================

/// last raw adc value reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    /// unprocessed capacitive sensor value (roughly 1500 wet .. 3200 dry)
    pub raw_value: f64,
    /// arrival time in milliseconds since the unix epoch
    pub timestamp: i64,
}

/// one converted point of the live series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoistureSample {
    pub sequence_index: u32,
    pub moisture_percent: f64,
}

/// the finalized result of one acquisition window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub grain_type: GrainType,
    pub moisture_percent: f64,
    pub taken_at: DateTime<Utc>,
}

// ==============================================================================
// advice
// ==============================================================================

/// structured advice returned by the advisor model.
/// exactly these three fields - anything else is a schema mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdviceResult {
    pub status: MoistureStatus,
    pub title: String,
    pub suggestion: String,
}

impl AdviceResult {
    /// substituted when the advisor call fails
    pub fn fallback() -> Self {
        Self {
            status: MoistureStatus::Bad,
            title: "Error".to_string(),
            suggestion: "Could not retrieve AI-powered harvest advice.".to_string(),
        }
    }

    /// shown until a measurement completes
    pub fn awaiting() -> Self {
        Self {
            status: MoistureStatus::Caution,
            title: "Awaiting results".to_string(),
            suggestion: "Complete a measurement to get advice.".to_string(),
        }
    }
}

/// non-blocking, user-visible notification (the dashboard shows it as a toast)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

// ==============================================================================
// acquisition state
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionState {
    #[default]
    Idle,
    Measuring,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorStatus {
    #[default]
    Idle,
    Loading,
    Done,
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grain_parsing_is_case_insensitive() {
        assert_eq!("maize".parse::<GrainType>().unwrap(), GrainType::Maize);
        assert_eq!(" RICE ".parse::<GrainType>().unwrap(), GrainType::Rice);
        assert!("barley".parse::<GrainType>().is_err());
    }

    #[test]
    fn test_raw_reading_wire_shape() {
        let reading = RawReading { raw_value: 2048.0, timestamp: 1_700_000_000_000 };
        let json = serde_json::to_value(reading).unwrap();
        assert_eq!(json["rawValue"], 2048.0);
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_advice_rejects_extra_fields() {
        let ok = r#"{"status":"good","title":"Ready","suggestion":"Store it."}"#;
        let advice: AdviceResult = serde_json::from_str(ok).unwrap();
        assert_eq!(advice.status, MoistureStatus::Good);

        let extra = r#"{"status":"good","title":"Ready","suggestion":"Store it.","score":3}"#;
        assert!(serde_json::from_str::<AdviceResult>(extra).is_err());

        let bad_status = r#"{"status":"great","title":"Ready","suggestion":"Store it."}"#;
        assert!(serde_json::from_str::<AdviceResult>(bad_status).is_err());
    }

    #[test]
    fn test_timestamp() {
        // should be after 2024
        assert!(now_ms() > 1_700_000_000_000, "timestamp should be after 2024");
    }
}
