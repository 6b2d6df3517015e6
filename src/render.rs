use crate::config::{AppConfig, MapConfig};
use crate::index::RegionIndex;
use crate::processing::{build_frame, Frame};
use crate::state::{MonthCursor, StyleMode, ViewState};
use crate::symbology::{
    Rgb, REGION_FILL_OPACITY, REGION_OUTLINE, SYMBOL_FILL, SYMBOL_FILL_OPACITY, SYMBOL_STROKE,
};
use crate::types::{Layers, MONTHS};
use anyhow::{Context, Result};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::Serialize;
use std::f64::consts::PI;
use std::fs;
use std::path::PathBuf;
use tracing::info;

// Constants for Web Mercator
const TILE_SIZE: f64 = 256.0;

/// Stand-in for the base map under the thematic layers.
const BACKGROUND: Rgba<u8> = Rgba([0xf2, 0xf2, 0xee, 0xff]);

/// World pixel coordinates of `(lat, lon)` at a possibly fractional zoom.
pub fn world_pixel(lat: f64, lon: f64, zoom: f64) -> (f64, f64) {
    let n = TILE_SIZE * 2.0_f64.powf(zoom);
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Inverse of [`world_pixel`], returning `(lat, lon)`.
pub fn world_lat_lon(x: f64, y: f64, zoom: f64) -> (f64, f64) {
    let n = TILE_SIZE * 2.0_f64.powf(zoom);
    let lon = x / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    (lat, lon)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

/// The fixed map window: the configured center and zoom at the configured
/// image size.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    origin: (f64, f64),
    zoom: f64,
    width: u32,
    height: u32,
}

impl Viewport {
    pub fn from_config(map: &MapConfig) -> Self {
        let [lat, lon] = map.center;
        let (cx, cy) = world_pixel(lat, lon, map.zoom);
        Self {
            origin: (cx - map.width as f64 / 2.0, cy - map.height as f64 / 2.0),
            zoom: map.zoom,
            width: map.width,
            height: map.height,
        }
    }

    /// Screen position of `(lon, lat)`.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = world_pixel(lat, lon, self.zoom);
        (x - self.origin.0, y - self.origin.1)
    }

    /// `(lon, lat)` under the screen position `(x, y)`.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let (lat, lon) = world_lat_lon(x + self.origin.0, y + self.origin.1, self.zoom);
        (lon, lat)
    }

    /// Geographic extent of the initial view; panning is limited to it.
    pub fn bounds(&self) -> Bounds {
        let (west, north) = self.unproject(0.0, 0.0);
        let (east, south) = self.unproject(self.width as f64, self.height as f64);
        Bounds {
            south,
            west,
            north,
            east,
        }
    }
}

pub fn generate_frames(config: &AppConfig, layers: &Layers) -> Result<()> {
    info!(
        "Rendering {} frames at {}x{} into {:?}...",
        StyleMode::ALL.len() * MONTHS.len(),
        config.map.width,
        config.map.height,
        config.output.frame_dir
    );

    for style in StyleMode::ALL {
        let dir = config.output.frame_dir.join(style.as_str());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create frame directory: {:?}", dir))?;
    }

    let views: Vec<ViewState> = StyleMode::ALL
        .into_iter()
        .flat_map(|style| {
            (0..MONTHS.len()).filter_map(move |i| {
                MonthCursor::new(i).ok().map(|month| ViewState { month, style })
            })
        })
        .collect();

    let index = RegionIndex::build(layers);
    let viewport = Viewport::from_config(&config.map);

    views.par_iter().try_for_each(|&view| {
        let img = render_frame(&viewport, layers, &index, view);
        let path = frame_path(config, view);
        img.save(&path)
            .with_context(|| format!("Failed to save frame {:?}", path))
    })?;

    Ok(())
}

pub fn frame_path(config: &AppConfig, view: ViewState) -> PathBuf {
    config
        .output
        .frame_dir
        .join(view.style.as_str())
        .join(format!("{:02}-{}.png", view.month.index() + 1, view.month.name()))
}

pub fn render_frame(
    viewport: &Viewport,
    layers: &Layers,
    index: &RegionIndex,
    view: ViewState,
) -> RgbaImage {
    let frame = build_frame(layers, view);
    let mut img: RgbaImage = ImageBuffer::from_pixel(viewport.width, viewport.height, BACKGROUND);

    match view.style {
        StyleMode::Choropleth => {
            fill_regions(&mut img, viewport, layers, index, &frame);
            outline_regions(&mut img, viewport, layers);
        }
        StyleMode::Proportional => draw_symbols(&mut img, viewport, &frame),
    }

    img
}

fn fill_regions(
    img: &mut RgbaImage,
    viewport: &Viewport,
    layers: &Layers,
    index: &RegionIndex,
    frame: &Frame,
) {
    let width = img.width();
    let rows: Vec<Vec<Option<Rgb>>> = (0..img.height())
        .into_par_iter()
        .map(|py| {
            (0..width)
                .map(|px| {
                    let (lon, lat) = viewport.unproject(px as f64 + 0.5, py as f64 + 0.5);
                    index
                        .region_at(layers, lon, lat)
                        .and_then(|i| frame.regions.get(i))
                        .map(|r| r.fill)
                })
                .collect()
        })
        .collect();

    for (py, row) in rows.into_iter().enumerate() {
        for (px, fill) in row.into_iter().enumerate() {
            if let Some(fill) = fill {
                let pixel = img.get_pixel_mut(px as u32, py as u32);
                *pixel = blend(fill, REGION_FILL_OPACITY, *pixel);
            }
        }
    }
}

fn outline_regions(img: &mut RgbaImage, viewport: &Viewport, layers: &Layers) {
    let outline = opaque(REGION_OUTLINE);
    for polygon in &layers.polygons {
        for part in &polygon.geometry {
            for ring in std::iter::once(part.exterior()).chain(part.interiors()) {
                for line in ring.lines() {
                    let a = viewport.project(line.start.x, line.start.y);
                    let b = viewport.project(line.end.x, line.end.y);
                    draw_line(img, a, b, outline);
                }
            }
        }
    }
}

fn draw_symbols(img: &mut RgbaImage, viewport: &Viewport, frame: &Frame) {
    let stroke = opaque(SYMBOL_STROKE);

    for symbol in &frame.symbols {
        let r = symbol.radius;
        if r.is_nan() || r <= 0.0 {
            continue;
        }
        let (cx, cy) = viewport.project(symbol.lon, symbol.lat);

        let x0 = (cx - r).floor().max(0.0) as u32;
        let y0 = (cy - r).floor().max(0.0) as u32;
        let x1 = ((cx + r).ceil().max(0.0) as u32).min(img.width());
        let y1 = ((cy + r).ceil().max(0.0) as u32).min(img.height());

        for py in y0..y1 {
            for px in x0..x1 {
                let d = (px as f64 + 0.5 - cx).hypot(py as f64 + 0.5 - cy);
                if d > r {
                    continue;
                }
                let pixel = img.get_pixel_mut(px, py);
                *pixel = if d > r - 1.0 {
                    stroke
                } else {
                    blend(SYMBOL_FILL, SYMBOL_FILL_OPACITY, *pixel)
                };
            }
        }
    }
}

// 2px wide, matching the polygon outline weight
fn draw_line(img: &mut RgbaImage, a: (f64, f64), b: (f64, f64), color: Rgba<u8>) {
    let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as usize;
    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        let x = (a.0 + (b.0 - a.0) * t).floor();
        let y = (a.1 + (b.1 - a.1) * t).floor();
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            put_checked(img, x + dx, y + dy, color);
        }
    }
}

fn put_checked(img: &mut RgbaImage, x: f64, y: f64, color: Rgba<u8>) {
    if x >= 0.0 && y >= 0.0 && x < img.width() as f64 && y < img.height() as f64 {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn opaque(color: Rgb) -> Rgba<u8> {
    Rgba([color.0, color.1, color.2, 255])
}

fn blend(top: Rgb, alpha: f64, under: Rgba<u8>) -> Rgba<u8> {
    let mix = |t: u8, u: u8| (t as f64 * alpha + u as f64 * (1.0 - alpha)).round() as u8;
    Rgba([
        mix(top.0, under[0]),
        mix(top.1, under[1]),
        mix(top.2, under[2]),
        255,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::tests::sample_layers;
    use crate::symbology::Bucket;

    fn small_map() -> MapConfig {
        MapConfig {
            width: 320,
            height: 200,
            ..MapConfig::default()
        }
    }

    #[test]
    fn projection_round_trips_near_center() {
        let viewport = Viewport::from_config(&small_map());
        let (x, y) = viewport.project(-98.0, 38.5);
        assert!((x - 160.0).abs() < 1e-6);
        assert!((y - 100.0).abs() < 1e-6);
        let (lon, lat) = viewport.unproject(x, y);
        assert!((lon + 98.0).abs() < 1e-9);
        assert!((lat - 38.5).abs() < 1e-9);
    }

    #[test]
    fn bounds_surround_center() {
        let b = Viewport::from_config(&MapConfig::default()).bounds();
        assert!(b.west < -98.0 && b.east > -98.0);
        assert!(b.south < 38.5 && b.north > 38.5);
    }

    #[test]
    fn choropleth_paints_bucket_color_inside_region() {
        let layers = sample_layers();
        let viewport = Viewport::from_config(&small_map());
        let index = RegionIndex::build(&layers);
        let view = ViewState {
            month: MonthCursor::new(5).unwrap(),
            style: StyleMode::Choropleth,
        };
        let img = render_frame(&viewport, &layers, &index, view);

        // Kansas square is centered on (-98.4, 38.5); sample just off its outline.
        let (x, y) = viewport.project(-98.4, 38.0);
        let pixel = *img.get_pixel(x as u32, y as u32);
        assert_eq!(pixel, blend(Bucket::High.color(), REGION_FILL_OPACITY, BACKGROUND));
    }

    #[test]
    fn proportional_draws_nothing_for_zero_counts() {
        let layers = sample_layers();
        let viewport = Viewport::from_config(&small_map());
        let index = RegionIndex::build(&layers);
        let img = render_frame(&viewport, &layers, &index, ViewState::default());

        // Kansas has 2 tornadoes in January: filled circle at its center.
        let (x, y) = viewport.project(-98.4, 38.5);
        assert_eq!(
            *img.get_pixel(x as u32, y as u32),
            blend(SYMBOL_FILL, SYMBOL_FILL_OPACITY, BACKGROUND)
        );
        // Nothing outside any symbol.
        assert_eq!(*img.get_pixel(2, 2), BACKGROUND);
    }

    #[test]
    fn generates_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = crate::config::AppConfig::from_toml(
            "[input]\npoints = \"p.geojson\"\npolygons = \"q.geojson\"\n",
        )
        .unwrap();
        config.map = MapConfig {
            width: 64,
            height: 40,
            ..MapConfig::default()
        };
        config.output.frame_dir = dir.path().to_path_buf();

        generate_frames(&config, &sample_layers()).unwrap();

        for style in StyleMode::ALL {
            let count = fs::read_dir(dir.path().join(style.as_str())).unwrap().count();
            assert_eq!(count, 12);
        }
        let june = ViewState {
            month: MonthCursor::new(5).unwrap(),
            style: StyleMode::Choropleth,
        };
        assert!(frame_path(&config, june).ends_with("choropleth/06-June.png"));
    }
}
