//! Zonal aggregation of asset impact: intersect a flood layer with an
//! asset layer and write per-zone area sums or distinct-asset counts back
//! onto the flood records.
//!
//! Unlike the flood-extent step, which emits no record for a dry zone,
//! every record that exists here always gets a value: zero when nothing
//! intersects, never a missing field.

use crate::types::{
    Feature, FeatureLayer, FieldValue, FloodError, FloodLayer, FloodResult,
};
use geo::{Area, BooleanOps};
use std::collections::BTreeSet;

/// Sum the intersected asset area per zone into `output_field`.
///
/// Areas are in the layers' native linear unit squared. The returned layer
/// holds the intersection fragments (the flooded portion of each asset),
/// each tagged with the zone id and elevation of the flood record it came
/// from, useful as a persisted "flooded wetlands" product.
///
/// Re-running with the same field name overwrites the prior values.
pub fn area_of_impact(
    floods: &mut FloodLayer,
    assets: &FeatureLayer,
    output_field: &str,
) -> FloodResult<FeatureLayer> {
    check_spatial_refs(floods, assets)?;
    log::info!(
        "Assessing impacted asset area for {} flood records x {} assets",
        floods.len(),
        assets.len()
    );

    let mut fragments = FeatureLayer::new(assets.epsg.or(floods.epsg));
    for record in &mut floods.records {
        let mut total = 0.0;
        for asset in &assets.features {
            let clipped = record.geometry.intersection(&asset.geometry);
            if clipped.0.is_empty() {
                continue;
            }
            total += clipped.unsigned_area();
            fragments.push(tag_fragment(clipped, asset, floods.id_field.as_str(), record));
        }
        record
            .fields
            .insert(output_field.to_string(), FieldValue::Real(total));
    }
    Ok(fragments)
}

/// Count the distinct assets whose geometry intersects each zone's flood
/// polygon, into `output_field`.
///
/// Fragments are grouped by the value of `asset_id_field` before counting,
/// so an asset split into several pieces by the overlay still counts once
/// per zone it truly intersects. Zones with no intersecting assets get 0.
///
/// Re-running with the same field name overwrites the prior values.
pub fn count_of_impact(
    floods: &mut FloodLayer,
    assets: &FeatureLayer,
    asset_id_field: &str,
    output_field: &str,
) -> FloodResult<FeatureLayer> {
    check_spatial_refs(floods, assets)?;
    log::info!(
        "Counting impacted assets for {} flood records x {} assets",
        floods.len(),
        assets.len()
    );

    let mut fragments = FeatureLayer::new(assets.epsg.or(floods.epsg));
    for record in &mut floods.records {
        // group fragments by asset identifier, then count the groups
        let mut distinct: BTreeSet<String> = BTreeSet::new();
        for asset in &assets.features {
            let asset_id = asset.field(asset_id_field).ok_or_else(|| {
                FloodError::NotFound(format!(
                    "asset id field '{}' missing from asset layer",
                    asset_id_field
                ))
            })?;
            let clipped = record.geometry.intersection(&asset.geometry);
            if clipped.0.is_empty() {
                continue;
            }
            distinct.insert(asset_id.to_string());
            fragments.push(tag_fragment(clipped, asset, floods.id_field.as_str(), record));
        }
        record.fields.insert(
            output_field.to_string(),
            FieldValue::Integer(distinct.len() as i64),
        );
    }
    Ok(fragments)
}

fn check_spatial_refs(floods: &FloodLayer, assets: &FeatureLayer) -> FloodResult<()> {
    if let (Some(flood_epsg), Some(asset_epsg)) = (floods.epsg, assets.epsg) {
        if flood_epsg != asset_epsg {
            return Err(FloodError::Configuration(format!(
                "flood layer (EPSG:{}) and asset layer (EPSG:{}) have different spatial references",
                flood_epsg, asset_epsg
            )));
        }
    }
    Ok(())
}

/// An intersection fragment keeps the asset's attributes plus the flood
/// record's zone id and elevation
fn tag_fragment(
    geometry: geo::MultiPolygon<f64>,
    asset: &Feature,
    id_field: &str,
    record: &crate::types::FloodRecord,
) -> Feature {
    let mut fragment = Feature::new(geometry);
    fragment.fields = asset.fields.clone();
    fragment
        .fields
        .insert(id_field.to_string(), FieldValue::Integer(record.zone_id));
    if let Some(elev) = record.fields.get("flood_elev") {
        fragment
            .fields
            .insert("flood_elev".to_string(), elev.clone());
    }
    fragment
}
