//! tidegates: flood extent and asset impact assessment behind tidegates
//!
//! This library evaluates the spatial extent of tidal flooding behind
//! tidegates for combinations of sea level rise and storm surge, and
//! quantifies the impact on buildings and wetlands within each tidegate's
//! zone of influence.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    DemRaster, Feature, FeatureLayer, FieldValue, FloodError, FloodLayer, FloodRecord,
    FloodResult, GeoTransform, ZoneId,
};

pub use io::{DemReader, OverwritePolicy, Workspace};

pub use crate::core::{
    area_of_impact, count_of_impact, feet_to_meters, meters_to_feet, standard_scenarios,
    ElevationSpec, FloodMapper, RunProducts, Scenario, ScenarioDriver, ScenarioRun,
    SurgeCategory, SurgeElevations,
};
