//! Scenario orchestration: run the flood-extent and impact-assessment
//! chain once per requested elevation and merge the results into one
//! combined output layer.
//!
//! Everything runs strictly in sequence on one thread; each elevation's
//! result feeds the final merge, and the geometry overlay is not safe for
//! concurrent mutation of a shared workspace anyway.

use crate::core::aggregate::{area_of_impact, count_of_impact};
use crate::core::flood_extent::FloodMapper;
use crate::core::scenarios::{standard_scenarios, Scenario, SurgeElevations};
use crate::io::raster::DemReader;
use crate::io::vector;
use crate::io::workspace::Workspace;
use crate::types::{
    DemRaster, FeatureLayer, FieldValue, FloodLayer, FloodResult,
};
use geo::Area;

/// Default name of the building-identifier field
pub const DEFAULT_BUILDING_ID_FIELD: &str = "STRUCT_ID";

/// Which elevations a run evaluates
#[derive(Debug, Clone, PartialEq)]
pub enum ElevationSpec {
    /// Caller-supplied water surface elevations, in feet
    Custom(Vec<f64>),
    /// The full standard grid of sea level rise x storm surge
    Standard,
}

/// Configuration for one driver invocation.
///
/// Dataset names resolve against the workspace; outputs are only written
/// when an output name is present.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub dem: String,
    pub zones: String,
    pub zone_id_field: String,
    pub elevations: ElevationSpec,
    pub flood_output: Option<String>,
    pub wetlands: Option<String>,
    pub wetlands_output: Option<String>,
    /// When set, distinct wetlands are also counted per zone into `N_wtlds`
    pub wetland_id_field: Option<String>,
    pub buildings: Option<String>,
    pub buildings_output: Option<String>,
    pub building_id_field: String,
    pub surge_elevations: SurgeElevations,
}

impl ScenarioRun {
    pub fn new(
        dem: impl Into<String>,
        zones: impl Into<String>,
        zone_id_field: impl Into<String>,
        elevations: ElevationSpec,
    ) -> Self {
        Self {
            dem: dem.into(),
            zones: zones.into(),
            zone_id_field: zone_id_field.into(),
            elevations,
            flood_output: None,
            wetlands: None,
            wetlands_output: None,
            wetland_id_field: None,
            buildings: None,
            buildings_output: None,
            building_id_field: DEFAULT_BUILDING_ID_FIELD.to_string(),
            surge_elevations: SurgeElevations::default(),
        }
    }
}

/// Everything a completed run produced
#[derive(Debug, Clone)]
pub struct RunProducts {
    /// Combined flood layer across all evaluated elevations
    pub floods: FloodLayer,
    /// Flooded-wetland fragments, when a wetlands layer was supplied
    pub flooded_wetlands: Option<FeatureLayer>,
    /// Flooded-building fragments, when a buildings layer was supplied
    pub flooded_buildings: Option<FeatureLayer>,
}

/// Drives the flood/impact chain across every elevation of a run
pub struct ScenarioDriver<'a> {
    workspace: &'a Workspace,
    config: &'a ScenarioRun,
}

impl<'a> ScenarioDriver<'a> {
    pub fn new(workspace: &'a Workspace, config: &'a ScenarioRun) -> Self {
        Self { workspace, config }
    }

    /// Load the inputs, process every elevation, merge, and persist.
    ///
    /// The named outputs are only touched after every elevation has been
    /// processed successfully: a failed run leaves previously-existing
    /// outputs exactly as they were.
    pub fn run(&self) -> FloodResult<RunProducts> {
        let _cwd = self.workspace.enter()?;

        let dem = DemReader::read(self.workspace.resolve_existing(&self.config.dem)?)?;
        let zones = vector::read_layer(self.workspace.resolve_existing(&self.config.zones)?)?;
        let wetlands = self
            .config
            .wetlands
            .as_deref()
            .map(|name| vector::read_layer(self.workspace.resolve_existing(name)?))
            .transpose()?;
        let buildings = self
            .config
            .buildings
            .as_deref()
            .map(|name| vector::read_layer(self.workspace.resolve_existing(name)?))
            .transpose()?;

        let products =
            self.run_loaded(&dem, &zones, wetlands.as_ref(), buildings.as_ref())?;

        if let Some(name) = &self.config.flood_output {
            vector::write_flood_layer(self.workspace, name, &products.floods)?;
        }
        if let (Some(name), Some(layer)) =
            (&self.config.wetlands_output, &products.flooded_wetlands)
        {
            vector::write_feature_layer(self.workspace, name, layer)?;
        }
        if let (Some(name), Some(layer)) =
            (&self.config.buildings_output, &products.flooded_buildings)
        {
            vector::write_feature_layer(self.workspace, name, layer)?;
        }

        Ok(products)
    }

    /// Process already-loaded inputs across every requested elevation.
    ///
    /// Elevations run strictly in sequence; the first failure aborts the
    /// whole run and discards the partial accumulation.
    pub fn run_loaded(
        &self,
        dem: &DemRaster,
        zones: &FeatureLayer,
        wetlands: Option<&FeatureLayer>,
        buildings: Option<&FeatureLayer>,
    ) -> FloodResult<RunProducts> {
        let scenarios = self.scenarios()?;
        let mapper = FloodMapper::new(dem, zones, &self.config.zone_id_field)?;

        let mut per_elevation = Vec::with_capacity(scenarios.len());
        let mut wetland_fragments: Vec<FeatureLayer> = Vec::new();
        let mut building_fragments: Vec<FeatureLayer> = Vec::new();

        for scenario in &scenarios {
            log::info!("Analyzing flood elevation: {}", scenario.label);

            let mut layer = mapper.flood_extent(scenario.elevation_m)?;
            stamp_scenario_fields(&mut layer, scenario);

            let (flooded_wetlands, flooded_buildings) = assess_impact(
                &mut layer,
                wetlands,
                self.config.wetland_id_field.as_deref(),
                buildings,
                &self.config.building_id_field,
            )?;
            if let Some(fragments) = flooded_wetlands {
                wetland_fragments.push(fragments);
            }
            if let Some(fragments) = flooded_buildings {
                building_fragments.push(fragments);
            }

            per_elevation.push(layer);
        }

        let floods = FloodLayer::merge(per_elevation)?;
        log::info!(
            "Completed {} scenarios, {} flooded-zone records total",
            scenarios.len(),
            floods.len()
        );

        Ok(RunProducts {
            floods,
            flooded_wetlands: wetlands.map(|_| merge_fragments(wetland_fragments)),
            flooded_buildings: buildings.map(|_| merge_fragments(building_fragments)),
        })
    }

    fn scenarios(&self) -> FloodResult<Vec<Scenario>> {
        match &self.config.elevations {
            ElevationSpec::Custom(elevations) => Ok(elevations
                .iter()
                .map(|&elevation_ft| Scenario::custom(elevation_ft))
                .collect()),
            ElevationSpec::Standard => standard_scenarios(&self.config.surge_elevations),
        }
    }
}

/// Assess wetland and building impact on one flood layer.
///
/// Stamps the record's own flooded area into `totalarea`, then fills
/// `area_wtlds` (and `N_wtlds` when a wetland id field is given) from the
/// wetlands layer and `N_bldgs` from the buildings layer when those are
/// supplied. Returns the intersection fragment layers.
pub fn assess_impact(
    floods: &mut FloodLayer,
    wetlands: Option<&FeatureLayer>,
    wetland_id_field: Option<&str>,
    buildings: Option<&FeatureLayer>,
    building_id_field: &str,
) -> FloodResult<(Option<FeatureLayer>, Option<FeatureLayer>)> {
    for record in &mut floods.records {
        record.fields.insert(
            "totalarea".to_string(),
            FieldValue::Real(record.geometry.unsigned_area()),
        );
    }

    let flooded_wetlands = match wetlands {
        Some(assets) => {
            log::info!("Assessing impact to wetlands");
            let fragments = area_of_impact(floods, assets, "area_wtlds")?;
            if let Some(id_field) = wetland_id_field {
                count_of_impact(floods, assets, id_field, "N_wtlds")?;
            }
            Some(fragments)
        }
        None => None,
    };

    let flooded_buildings = match buildings {
        Some(assets) => {
            log::info!("Assessing impact to buildings");
            Some(count_of_impact(floods, assets, building_id_field, "N_bldgs")?)
        }
        None => None,
    };

    Ok((flooded_wetlands, flooded_buildings))
}

fn stamp_scenario_fields(layer: &mut FloodLayer, scenario: &Scenario) {
    for record in &mut layer.records {
        record.fields.insert(
            "flood_elev".to_string(),
            FieldValue::Real(scenario.elevation_ft),
        );
        if let Some(surge) = scenario.surge {
            record.fields.insert(
                "surge".to_string(),
                FieldValue::Text(surge.label().to_string()),
            );
        }
        if let Some(slr) = scenario.slr_ft {
            record
                .fields
                .insert("slr".to_string(), FieldValue::Integer(slr as i64));
        }
    }
}

fn merge_fragments(layers: Vec<FeatureLayer>) -> FeatureLayer {
    let mut iter = layers.into_iter();
    let mut combined = iter.next().unwrap_or_default();
    for layer in iter {
        combined.features.extend(layer.features);
    }
    combined
}
