//! Flood extent derivation: threshold the DEM, trace the flooded cells
//! into polygons, and clip the result to each tidegate's zone of influence.
//!
//! Polygon boundaries follow grid-cell edges exactly (no smoothing), and
//! adjacent flooded cells dissolve into single features. Adjacency is
//! 4-connected: cells touching only at a corner stay separate features.

use crate::core::scenarios::meters_to_feet;
use crate::types::{
    DemRaster, FeatureLayer, FieldValue, FloodError, FloodLayer, FloodRecord, FloodResult,
    GeoTransform, ZoneId,
};
use crate::io::vector;
use crate::io::workspace::Workspace;
use geo::{BooleanOps, LineString, MultiPolygon, Polygon};
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Default cap on the estimated mask/trace working set, in bytes
const DEFAULT_MEMORY_BUDGET: usize = 4 << 30;

/// Estimated working bytes per DEM cell during mask + trace
/// (mask byte, component label, amortized boundary edges)
const WORKING_BYTES_PER_CELL: usize = 24;

/// Derives per-zone flood extents from a DEM for one or more elevations.
///
/// Construction validates everything that does not depend on the elevation:
/// the DEM and zones must share a spatial reference, and the zone id field
/// must hold a unique integer on every zone record.
pub struct FloodMapper<'a> {
    dem: &'a DemRaster,
    zones: &'a FeatureLayer,
    zone_id_field: String,
    zone_ids: Vec<ZoneId>,
    memory_budget: usize,
}

impl<'a> FloodMapper<'a> {
    pub fn new(
        dem: &'a DemRaster,
        zones: &'a FeatureLayer,
        zone_id_field: &str,
    ) -> FloodResult<Self> {
        if let (Some(dem_epsg), Some(zone_epsg)) = (dem.epsg, zones.epsg) {
            if dem_epsg != zone_epsg {
                return Err(FloodError::Configuration(format!(
                    "DEM (EPSG:{}) and zones (EPSG:{}) have different spatial references",
                    dem_epsg, zone_epsg
                )));
            }
        }

        let mut zone_ids = Vec::with_capacity(zones.len());
        let mut seen = BTreeSet::new();
        for feature in &zones.features {
            let value = feature.field(zone_id_field).ok_or_else(|| {
                FloodError::NotFound(format!(
                    "zone id field '{}' missing from zones layer",
                    zone_id_field
                ))
            })?;
            let id = value.as_integer().ok_or_else(|| {
                FloodError::Configuration(format!(
                    "zone id field '{}' must be an integer field, got {:?}",
                    zone_id_field, value
                ))
            })?;
            if !seen.insert(id) {
                return Err(FloodError::Configuration(format!(
                    "duplicate zone id {} in field '{}'",
                    id, zone_id_field
                )));
            }
            zone_ids.push(id);
        }

        Ok(Self {
            dem,
            zones,
            zone_id_field: zone_id_field.to_string(),
            zone_ids,
            memory_budget: DEFAULT_MEMORY_BUDGET,
        })
    }

    pub fn with_memory_budget(mut self, bytes: usize) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Flood the DEM up to `elevation_m` and clip per zone.
    ///
    /// Zones with zero flooded area produce no record; every record that
    /// does exist carries the zone id and a `flood_elev` field in feet.
    pub fn flood_extent(&self, elevation_m: f64) -> FloodResult<FloodLayer> {
        if !elevation_m.is_finite() {
            return Err(FloodError::Configuration(format!(
                "flood elevation must be finite, got {}",
                elevation_m
            )));
        }

        let cells = self.dem.rows() * self.dem.cols();
        let estimate = cells * WORKING_BYTES_PER_CELL;
        if estimate > self.memory_budget {
            return Err(FloodError::ResourceExhaustion(format!(
                "flood mask for a {}x{} raster needs roughly {} MiB but the budget is {} MiB; \
                 use a coarser DEM or clip it to fewer zones",
                self.dem.rows(),
                self.dem.cols(),
                estimate >> 20,
                self.memory_budget >> 20
            )));
        }

        log::info!(
            "Flooding areas up to {:.4} m ({:.2} ft)",
            elevation_m,
            meters_to_feet(elevation_m)
        );

        let mask = flood_mask(self.dem, elevation_m);
        let flooded = mask_to_polygons(&mask, &self.dem.transform);

        let mut layer = FloodLayer::new(
            self.zone_id_field.clone(),
            self.zones.epsg.or(self.dem.epsg),
        );
        if flooded.0.is_empty() {
            log::info!("No cells at or below {:.4} m", elevation_m);
            return Ok(layer);
        }

        for (feature, &zone_id) in self.zones.features.iter().zip(&self.zone_ids) {
            let clipped = flooded.intersection(&feature.geometry);
            if clipped.0.is_empty() {
                log::debug!("Zone {} stays dry at {:.4} m", zone_id, elevation_m);
                continue;
            }
            let mut fields = std::collections::BTreeMap::new();
            fields.insert(
                "flood_elev".to_string(),
                FieldValue::Real(meters_to_feet(elevation_m)),
            );
            layer.records.push(FloodRecord {
                zone_id,
                elevation_m,
                geometry: clipped,
                fields,
            });
        }

        log::info!(
            "{} of {} zones flooded at {:.4} m",
            layer.len(),
            self.zones.len(),
            elevation_m
        );
        Ok(layer)
    }

    /// Like [`flood_extent`](Self::flood_extent), but also persists the
    /// result under `name` in the workspace.
    ///
    /// An existing output is destroyed (policy permitting) before the
    /// computation starts, so a failure mid-compute leaves no prior output
    /// behind. Callers relying on the old output must not enable
    /// overwrite.
    pub fn flood_extent_to(
        &self,
        elevation_m: f64,
        workspace: &Workspace,
        name: &str,
    ) -> FloodResult<FloodLayer> {
        let path = workspace.prepare_output(name)?;
        let layer = self.flood_extent(elevation_m)?;
        vector::write_flood_layer_to_path(&path, &layer)?;
        Ok(layer)
    }
}

/// Binary flood mask: 1 where the sample is at or below the threshold,
/// 0 elsewhere. Nodata cells never flood.
pub fn flood_mask(dem: &DemRaster, elevation_m: f64) -> Array2<u8> {
    let mut mask = Array2::zeros(dem.data.dim());
    for ((row, col), &sample) in dem.data.indexed_iter() {
        if !dem.is_nodata(sample) && f64::from(sample) <= elevation_m {
            mask[[row, col]] = 1;
        }
    }
    mask
}

/// Convert a binary mask into dissolved polygons in world coordinates.
///
/// Boundary tracing walks directed cell edges with the flooded side kept on
/// the left, so every 4-connected component yields exactly one exterior
/// ring plus one ring per enclosed unflooded hole. Vertices land on grid
/// cell corners, mapped through the geotransform.
pub fn mask_to_polygons(mask: &Array2<u8>, transform: &GeoTransform) -> MultiPolygon<f64> {
    let (rows, cols) = mask.dim();
    let flooded = |r: usize, c: usize| mask[[r, c]] != 0;

    // label 4-connected components so rings can be grouped per feature
    let labels = label_components(mask);

    // directed boundary edges keyed by start vertex; emission order is kept
    // so tracing is deterministic
    let mut outgoing: HashMap<(i64, i64), Vec<((i64, i64), u32)>> = HashMap::new();
    let mut emitted: Vec<((i64, i64), (i64, i64), u32)> = Vec::new();
    let mut emit = |from: (i64, i64), to: (i64, i64), label: u32| {
        outgoing.entry(from).or_default().push((to, label));
        emitted.push((from, to, label));
    };

    for r in 0..rows {
        for c in 0..cols {
            if !flooded(r, c) {
                continue;
            }
            let label = labels[[r, c]];
            let (x, y) = (c as i64, r as i64);
            if r == 0 || !flooded(r - 1, c) {
                emit((x, y), (x + 1, y), label); // north side, eastward
            }
            if r == rows - 1 || !flooded(r + 1, c) {
                emit((x + 1, y + 1), (x, y + 1), label); // south side, westward
            }
            if c == 0 || !flooded(r, c - 1) {
                emit((x, y + 1), (x, y), label); // west side, northward
            }
            if c == cols - 1 || !flooded(r, c + 1) {
                emit((x + 1, y), (x + 1, y + 1), label); // east side, southward
            }
        }
    }

    // chain edges into closed rings, preferring the sharpest left turn at
    // shared vertices so corner-touching components stay separate
    let mut rings_by_label: HashMap<u32, Vec<(Vec<(i64, i64)>, i64)>> = HashMap::new();
    for &(start, first_end, label) in &emitted {
        if !consume_edge(&mut outgoing, start, first_end, label) {
            continue; // already part of an earlier ring
        }
        let mut ring = vec![start];
        let mut prev = start;
        let mut cur = first_end;
        while cur != start {
            ring.push(cur);
            let dir = (cur.0 - prev.0, cur.1 - prev.1);
            let (next, next_label) = take_leftmost(&mut outgoing, cur, dir);
            debug_assert_eq!(next_label, label);
            prev = cur;
            cur = next;
        }
        let ring = drop_collinear(ring);
        let area2 = shoelace2(&ring);
        rings_by_label.entry(label).or_default().push((ring, area2));
    }

    // one polygon per component: the positive ring is the exterior, the
    // negative rings are its holes
    let mut polygons = Vec::new();
    let mut component_labels: Vec<u32> = rings_by_label.keys().copied().collect();
    component_labels.sort_unstable();
    for label in component_labels {
        let rings = rings_by_label.remove(&label).unwrap_or_default();
        let mut exterior = None;
        let mut holes = Vec::new();
        for (ring, area2) in rings {
            if area2 > 0 {
                exterior = Some(ring);
            } else {
                holes.push(ring);
            }
        }
        if let Some(exterior) = exterior {
            polygons.push(Polygon::new(
                ring_to_line_string(&exterior, transform),
                holes
                    .iter()
                    .map(|h| ring_to_line_string(h, transform))
                    .collect(),
            ));
        }
    }

    MultiPolygon(polygons)
}

/// 4-connected component labels; 0 is background
fn label_components(mask: &Array2<u8>) -> Array2<u32> {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::zeros((rows, cols));
    let mut next_label = 0u32;
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            if mask[[r, c]] == 0 || labels[[r, c]] != 0 {
                continue;
            }
            next_label += 1;
            labels[[r, c]] = next_label;
            queue.push_back((r, c));
            while let Some((qr, qc)) = queue.pop_front() {
                let mut visit = |nr: usize, nc: usize, labels: &mut Array2<u32>| {
                    if mask[[nr, nc]] != 0 && labels[[nr, nc]] == 0 {
                        labels[[nr, nc]] = next_label;
                        queue.push_back((nr, nc));
                    }
                };
                if qr > 0 {
                    visit(qr - 1, qc, &mut labels);
                }
                if qr + 1 < rows {
                    visit(qr + 1, qc, &mut labels);
                }
                if qc > 0 {
                    visit(qr, qc - 1, &mut labels);
                }
                if qc + 1 < cols {
                    visit(qr, qc + 1, &mut labels);
                }
            }
        }
    }
    labels
}

/// Remove one specific directed edge; false if it was consumed already
fn consume_edge(
    outgoing: &mut HashMap<(i64, i64), Vec<((i64, i64), u32)>>,
    from: (i64, i64),
    to: (i64, i64),
    label: u32,
) -> bool {
    if let Some(candidates) = outgoing.get_mut(&from) {
        if let Some(pos) = candidates.iter().position(|&(end, l)| end == to && l == label) {
            candidates.swap_remove(pos);
            return true;
        }
    }
    false
}

/// Pop the outgoing edge that turns hardest to the left relative to the
/// incoming direction
fn take_leftmost(
    outgoing: &mut HashMap<(i64, i64), Vec<((i64, i64), u32)>>,
    at: (i64, i64),
    incoming: (i64, i64),
) -> ((i64, i64), u32) {
    let candidates = outgoing
        .get_mut(&at)
        .expect("boundary edges always close into rings");
    let mut best = 0;
    let mut best_rank = u8::MAX;
    for (i, &(end, _)) in candidates.iter().enumerate() {
        let dir = (end.0 - at.0, end.1 - at.1);
        let cross = incoming.0 * dir.1 - incoming.1 * dir.0;
        let dot = incoming.0 * dir.0 + incoming.1 * dir.1;
        let rank = if cross > 0 {
            0 // left
        } else if cross == 0 && dot > 0 {
            1 // straight
        } else if cross < 0 {
            2 // right
        } else {
            3 // reverse
        };
        if rank < best_rank {
            best_rank = rank;
            best = i;
        }
    }
    candidates.swap_remove(best)
}

/// Drop vertices in the middle of straight runs
fn drop_collinear(ring: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let here = ring[i];
        let next = ring[(i + 1) % n];
        let into = (here.0 - prev.0, here.1 - prev.1);
        let outof = (next.0 - here.0, next.1 - here.1);
        if into.0 * outof.1 != into.1 * outof.0 {
            out.push(here);
        }
    }
    out
}

/// Twice the signed area of a closed ring in grid coordinates
fn shoelace2(ring: &[(i64, i64)]) -> i64 {
    let n = ring.len();
    let mut sum = 0i64;
    for i in 0..n {
        let (x0, y0) = ring[i];
        let (x1, y1) = ring[(i + 1) % n];
        sum += x0 * y1 - x1 * y0;
    }
    sum
}

fn ring_to_line_string(ring: &[(i64, i64)], transform: &GeoTransform) -> LineString<f64> {
    LineString::from(
        ring.iter()
            .map(|&(x, y)| transform.grid_to_world(x as f64, y as f64))
            .collect::<Vec<_>>(),
    )
}
