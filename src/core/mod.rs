//! Core flood-assessment modules

pub mod scenarios;
pub mod flood_extent;
pub mod aggregate;
pub mod driver;

// Re-export main types
pub use scenarios::{
    feet_to_meters, meters_to_feet, standard_scenarios, Scenario, SurgeCategory,
    SurgeElevations, METERS_PER_FOOT, SEA_LEVEL_RISE_STEPS_FT,
};
pub use flood_extent::{flood_mask, mask_to_polygons, FloodMapper};
pub use aggregate::{area_of_impact, count_of_impact};
pub use driver::{assess_impact, ElevationSpec, RunProducts, ScenarioDriver, ScenarioRun};
