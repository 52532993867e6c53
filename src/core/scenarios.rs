//! Unit conversion and the standard sea-level-rise / storm-surge scenario
//! grid.
//!
//! User-facing elevations are feet above mean sea level; the DEM is meters.
//! Conversions keep full floating-point precision, no rounding anywhere.

use crate::types::{FloodError, FloodResult};
use serde::{Deserialize, Serialize};

pub const METERS_PER_FOOT: f64 = 0.3048;

/// Sea level rise steps evaluated by the standard scenarios, in feet
pub const SEA_LEVEL_RISE_STEPS_FT: [f64; 7] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * METERS_PER_FOOT
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters / METERS_PER_FOOT
}

/// Storm surge categories, in the fixed evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurgeCategory {
    Mhhw,
    Surge10Yr,
    Surge50Yr,
    Surge100Yr,
}

impl SurgeCategory {
    pub const ALL: [SurgeCategory; 4] = [
        SurgeCategory::Mhhw,
        SurgeCategory::Surge10Yr,
        SurgeCategory::Surge50Yr,
        SurgeCategory::Surge100Yr,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SurgeCategory::Mhhw => "MHHW",
            SurgeCategory::Surge10Yr => "10yr",
            SurgeCategory::Surge50Yr => "50yr",
            SurgeCategory::Surge100Yr => "100yr",
        }
    }
}

impl std::fmt::Display for SurgeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Reference storm-surge elevations in feet above mean sea level.
///
/// Defaults are the published values for the study area; a category left
/// unset makes the standard-scenario grid fail rather than silently skip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeElevations {
    pub mhhw_ft: Option<f64>,
    pub surge_10yr_ft: Option<f64>,
    pub surge_50yr_ft: Option<f64>,
    pub surge_100yr_ft: Option<f64>,
}

impl Default for SurgeElevations {
    fn default() -> Self {
        Self {
            mhhw_ft: Some(4.0),
            surge_10yr_ft: Some(8.0),
            surge_50yr_ft: Some(9.6),
            surge_100yr_ft: Some(10.5),
        }
    }
}

impl SurgeElevations {
    pub fn elevation_ft(&self, category: SurgeCategory) -> FloodResult<f64> {
        let value = match category {
            SurgeCategory::Mhhw => self.mhhw_ft,
            SurgeCategory::Surge10Yr => self.surge_10yr_ft,
            SurgeCategory::Surge50Yr => self.surge_50yr_ft,
            SurgeCategory::Surge100Yr => self.surge_100yr_ft,
        };
        value.ok_or_else(|| {
            FloodError::Configuration(format!(
                "storm surge category {} has no reference elevation configured",
                category
            ))
        })
    }
}

/// One flood elevation to evaluate, either from the standard grid or
/// supplied directly by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    /// Sea level rise in feet; None for a custom elevation
    pub slr_ft: Option<f64>,
    /// Storm surge category; None for a custom elevation
    pub surge: Option<SurgeCategory>,
    /// Total water surface elevation in feet above mean sea level
    pub elevation_ft: f64,
    /// The same elevation converted to the DEM's meters
    pub elevation_m: f64,
}

impl Scenario {
    /// A caller-supplied elevation outside the standard grid
    pub fn custom(elevation_ft: f64) -> Self {
        Self {
            label: format!("{} ft", elevation_ft),
            slr_ft: None,
            surge: None,
            elevation_ft,
            elevation_m: feet_to_meters(elevation_ft),
        }
    }
}

/// Enumerate the standard scenario grid: sea level rise 0-6 ft (outer,
/// ascending) crossed with the four surge categories (inner, fixed order).
///
/// The deterministic order makes downstream merge order reproducible.
pub fn standard_scenarios(surges: &SurgeElevations) -> FloodResult<Vec<Scenario>> {
    let mut scenarios = Vec::with_capacity(SEA_LEVEL_RISE_STEPS_FT.len() * SurgeCategory::ALL.len());
    for slr in SEA_LEVEL_RISE_STEPS_FT {
        for category in SurgeCategory::ALL {
            let elevation_ft = slr + surges.elevation_ft(category)?;
            scenarios.push(Scenario {
                label: format!("{} ft ({}, {} ft slr)", elevation_ft, category, slr),
                slr_ft: Some(slr),
                surge: Some(category),
                elevation_ft,
                elevation_m: feet_to_meters(elevation_ft),
            });
        }
    }
    Ok(scenarios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_feet_to_meters_round_trip() {
        for value in [0.0, 1.0, 4.0, 9.6, 10.5, 16.5, 123.456] {
            assert_relative_eq!(
                meters_to_feet(feet_to_meters(value)),
                value,
                epsilon = 1e-12
            );
        }
        assert_relative_eq!(feet_to_meters(1.0), 0.3048);
    }

    #[test]
    fn test_standard_scenarios_count_and_order() {
        let scenarios = standard_scenarios(&SurgeElevations::default()).unwrap();
        assert_eq!(scenarios.len(), 28);

        // slr ascending in the outer loop, surge order fixed in the inner
        assert_eq!(scenarios[0].slr_ft, Some(0.0));
        assert_eq!(scenarios[0].surge, Some(SurgeCategory::Mhhw));
        assert_eq!(scenarios[3].surge, Some(SurgeCategory::Surge100Yr));
        assert_eq!(scenarios[4].slr_ft, Some(1.0));
        assert_eq!(scenarios[27].slr_ft, Some(6.0));
        assert_eq!(scenarios[27].surge, Some(SurgeCategory::Surge100Yr));

        assert_relative_eq!(scenarios[0].elevation_ft, 4.0);
        assert_relative_eq!(scenarios[27].elevation_ft, 16.5);
    }

    #[test]
    fn test_standard_scenarios_monotonic_within_category() {
        let scenarios = standard_scenarios(&SurgeElevations::default()).unwrap();
        for category in SurgeCategory::ALL {
            let elevations: Vec<f64> = scenarios
                .iter()
                .filter(|s| s.surge == Some(category))
                .map(|s| s.elevation_ft)
                .collect();
            assert_eq!(elevations.len(), 7);
            for pair in elevations.windows(2) {
                assert!(pair[0] < pair[1]);
            }
        }
    }

    #[test]
    fn test_unconfigured_surge_fails() {
        let surges = SurgeElevations {
            surge_50yr_ft: None,
            ..Default::default()
        };
        let result = standard_scenarios(&surges);
        assert!(matches!(
            result,
            Err(crate::types::FloodError::Configuration(_))
        ));
    }

    #[test]
    fn test_custom_scenario_conversion() {
        let scenario = Scenario::custom(7.5);
        assert_eq!(scenario.slr_ft, None);
        assert_eq!(scenario.surge, None);
        assert_relative_eq!(scenario.elevation_m, 7.5 * 0.3048);
    }
}
