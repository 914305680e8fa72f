//! ==============================================================================
//! thresholds.rs - per-grain storage breakpoints
//! ==============================================================================
//!
//! purpose:
//!     maps (grain, moisture%) to a good / caution / bad verdict. the same
//!     table is rendered into the advisor prompt so the model and the local
//!     classification agree on the rules.
//!
//! relationships:
//!     - used by: advisor.rs (prompt), acquisition/controller.rs (local verdict)
//!
//! ==============================================================================

use crate::domain::{GrainType, MoistureStatus};

/// moisture breakpoints in percent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// below this the grain is ready for storage
    pub good_below: f64,
    /// below this storage is acceptable with care; at or above is bad
    pub caution_below: f64,
}

pub fn thresholds(grain: GrainType) -> Thresholds {
    match grain {
        GrainType::Wheat => Thresholds {
            good_below: 13.5,
            caution_below: 15.5,
        },
        GrainType::Rice => Thresholds {
            good_below: 14.0,
            caution_below: 16.0,
        },
        GrainType::Maize => Thresholds {
            good_below: 15.5,
            caution_below: 18.0,
        },
    }
}

pub fn classify(grain: GrainType, moisture_percent: f64) -> MoistureStatus {
    let t = thresholds(grain);
    if moisture_percent < t.good_below {
        MoistureStatus::Good
    } else if moisture_percent < t.caution_below {
        MoistureStatus::Caution
    } else {
        MoistureStatus::Bad
    }
}

/// the rules block embedded in the advisor prompt, one line per grain
pub fn rules_table() -> String {
    GrainType::ALL
        .iter()
        .map(|&grain| {
            let t = thresholds(grain);
            format!(
                "- {}: Ideal <{}%, Caution <{}%, Bad >{}%",
                grain, t.good_below, t.caution_below, t.caution_below
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wheat_bands() {
        assert_eq!(classify(GrainType::Wheat, 13.4), MoistureStatus::Good);
        assert_eq!(classify(GrainType::Wheat, 13.6), MoistureStatus::Caution);
        assert_eq!(classify(GrainType::Wheat, 15.6), MoistureStatus::Bad);
    }

    #[test]
    fn test_rice_and_maize() {
        assert_eq!(classify(GrainType::Rice, 16.1), MoistureStatus::Bad);
        assert_eq!(classify(GrainType::Rice, 13.9), MoistureStatus::Good);
        assert_eq!(classify(GrainType::Maize, 15.4), MoistureStatus::Good);
        assert_eq!(classify(GrainType::Maize, 17.9), MoistureStatus::Caution);
    }

    #[test]
    fn test_boundaries_belong_to_the_worse_band() {
        assert_eq!(classify(GrainType::Wheat, 13.5), MoistureStatus::Caution);
        assert_eq!(classify(GrainType::Wheat, 15.5), MoistureStatus::Bad);
        assert_eq!(classify(GrainType::Maize, 18.0), MoistureStatus::Bad);
    }

    #[test]
    fn test_rules_table_text() {
        let table = rules_table();
        assert_eq!(
            table,
            "- Wheat: Ideal <13.5%, Caution <15.5%, Bad >15.5%\n\
             - Rice: Ideal <14%, Caution <16%, Bad >16%\n\
             - Maize: Ideal <15.5%, Caution <18%, Bad >18%"
        );
    }
}
