use crate::render::world_pixel;
use crate::state::MonthCursor;
use crate::symbology::prop_radius;
use crate::types::Layers;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};

// Wrapper for RTree indexing
pub struct RegionEntry {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Bounding-box index over the polygon layer.
pub struct RegionIndex {
    tree: RTree<RegionEntry>,
}

impl RegionIndex {
    pub fn build(layers: &Layers) -> Self {
        let entries = layers
            .polygons
            .iter()
            .enumerate()
            .filter_map(|(index, polygon)| {
                // Empty geometries have no bounding box and can never be hit.
                let rect = polygon.geometry.bounding_rect()?;
                Some(RegionEntry {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Index of the polygon containing `(lon, lat)`, if any. Polygons are
    /// drawn in data order, so later ones win where they overlap.
    pub fn region_at(&self, layers: &Layers, lon: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.index)
            .filter(|&i| {
                layers
                    .polygons
                    .get(i)
                    .is_some_and(|p| p.geometry.contains(&point))
            })
            .max()
    }
}

/// Index of the topmost symbol under `(lon, lat)` at `zoom`. Symbols are
/// drawn in data order, so later ones win.
pub fn symbol_at(
    layers: &Layers,
    month: MonthCursor,
    zoom: f64,
    lon: f64,
    lat: f64,
) -> Option<usize> {
    let (qx, qy) = world_pixel(lat, lon, zoom);

    layers
        .points
        .iter()
        .enumerate()
        .rev()
        .find(|(_, p)| {
            let radius = prop_radius(p.counts.get(month.index()));
            let (px, py) = world_pixel(p.point.y(), p.point.x(), zoom);
            radius > 0.0 && (px - qx).hypot(py - qy) <= radius
        })
        .map(|(i, _)| i)
}
