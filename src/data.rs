use crate::config::AppConfig;
use crate::types::{Layers, MonthlyCounts, StatePoint, StatePolygon, MONTHS};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::{Feature, GeoJson, JsonObject};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// Where a dataset comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    File(PathBuf),
    Url(String),
}

impl Source {
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Source::Url(location.to_string())
        } else {
            Source::File(PathBuf::from(location))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => f.write_str(url),
        }
    }
}

/// Fetches the point and polygon datasets concurrently and parses both.
/// Nothing is returned unless both succeed.
pub async fn load_layers(config: &AppConfig) -> Result<Layers> {
    let points_src = Source::parse(&config.input.points);
    let polygons_src = Source::parse(&config.input.polygons);
    info!("Loading {} and {}...", points_src, polygons_src);

    let client = reqwest::Client::new();
    let (points_json, polygons_json) = tokio::try_join!(
        fetch_geojson(&client, &points_src),
        fetch_geojson(&client, &polygons_src)
    )?;

    let points = parse_points(points_json)
        .with_context(|| format!("Invalid point dataset: {}", points_src))?;
    let polygons = parse_polygons(polygons_json)
        .with_context(|| format!("Invalid polygon dataset: {}", polygons_src))?;
    info!(
        "Loaded {} state points and {} state polygons",
        points.len(),
        polygons.len()
    );

    Ok(Layers { points, polygons })
}

async fn fetch_geojson(client: &reqwest::Client, source: &Source) -> Result<GeoJson> {
    let text = match source {
        Source::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read GeoJSON file: {:?}", path))?,
        Source::Url(url) => client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("Failed to fetch GeoJSON: {}", url))?
            .text()
            .await
            .with_context(|| format!("Failed to read GeoJSON body: {}", url))?,
    };
    text.parse::<GeoJson>()
        .with_context(|| format!("Failed to parse GeoJSON from {}", source))
}

pub fn parse_points(geojson: GeoJson) -> Result<Vec<StatePoint>> {
    let mut points = Vec::new();

    for feature in features(geojson)? {
        let (state, counts) = attributes(&feature);
        let geometry = match to_geo(&feature)? {
            Some(g) => g,
            None => {
                warn!("Skipping {}: feature has no geometry", state);
                continue;
            }
        };

        let point = match geometry {
            geo::Geometry::Point(p) => p,
            geo::Geometry::MultiPoint(mp) if mp.0.len() == 1 => mp.0[0],
            _ => {
                warn!("Skipping {}: expected a point geometry", state);
                continue;
            }
        };

        points.push(StatePoint { state, point, counts });
    }

    Ok(points)
}

pub fn parse_polygons(geojson: GeoJson) -> Result<Vec<StatePolygon>> {
    let mut polygons = Vec::new();

    for feature in features(geojson)? {
        let (state, counts) = attributes(&feature);
        let geometry = match to_geo(&feature)? {
            Some(geo::Geometry::MultiPolygon(mp)) => mp,
            Some(geo::Geometry::Polygon(p)) => MultiPolygon::new(vec![p]),
            Some(_) => {
                warn!("Skipping {}: expected a polygon geometry", state);
                continue;
            }
            None => {
                warn!("Skipping {}: feature has no geometry", state);
                continue;
            }
        };

        polygons.push(StatePolygon {
            state,
            geometry,
            counts,
        });
    }

    Ok(polygons)
}

fn features(geojson: GeoJson) -> Result<Vec<Feature>> {
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc.features),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

fn to_geo(feature: &Feature) -> Result<Option<geo::Geometry<f64>>> {
    let Some(geometry) = &feature.geometry else {
        return Ok(None);
    };
    let converted: geo::Geometry<f64> = geometry
        .value
        .clone()
        .try_into()
        .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
    Ok(Some(converted))
}

fn attributes(feature: &Feature) -> (String, MonthlyCounts) {
    let props = feature.properties.as_ref();

    let state = match property(props, "State") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "Unknown".to_string(),
    };

    let mut counts = [f64::NAN; 12];
    for (slot, month) in counts.iter_mut().zip(MONTHS) {
        match property(props, month).and_then(count_value) {
            Some(v) => *slot = v,
            None => warn!("{}: no usable count for {}", state, month),
        }
    }

    (state, MonthlyCounts(counts))
}

/// Looks a property up by exact key first, then ignoring ASCII case.
fn property<'a>(props: Option<&'a JsonObject>, key: &str) -> Option<&'a serde_json::Value> {
    let props = props?;
    props.get(key).or_else(|| {
        props
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn count_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputConfig, MapConfig, OutputConfig, ServerConfig};
    use std::io::Write;

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-97.5, 35.5]},
             "properties": {"State": "Oklahoma", "January": 1.5, "February": 2,
                "March": 4, "april": 9, "May": 20, "June": 10, "July": 3,
                "August": 2, "September": 2, "October": 3, "November": "2.5", "December": 1}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-72.7, 44.0]},
             "properties": {"State": "Vermont", "january": 0, "february": 0,
                "march": 0, "april": 0, "may": 0.5, "june": 1, "july": 0.5,
                "august": 0.2, "september": 0, "october": 0, "november": 0}}
        ]
    }"#;

    const POLYGONS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[-103,37],[-94,37],[-94,34],[-103,34],[-103,37]]]},
             "properties": {"State": "Oklahoma", "january": 1.5}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [0, 0]},
             "properties": {"State": "Nowhere"}}
        ]
    }"#;

    const SPARSE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": null,
             "properties": {"State": "Nevada", "january": 0.1}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [-100.0, 40.0]},
             "properties": {"january": "", "february": null, "march": 2}}
        ]
    }"#;

    #[test]
    fn features_without_geometry_are_skipped() {
        let points = parse_points(SPARSE.parse().unwrap()).unwrap();
        assert_eq!(points.len(), 1);
        assert!(points.iter().all(|p| p.state != "Nevada"));

        let polygons = parse_polygons(SPARSE.parse().unwrap()).unwrap();
        assert!(polygons.is_empty());
    }

    #[test]
    fn missing_state_is_unknown_and_blank_counts_are_nan() {
        let points = parse_points(SPARSE.parse().unwrap()).unwrap();
        assert_eq!(points[0].state, "Unknown");
        assert!(points[0].counts.get(0).is_nan());
        assert!(points[0].counts.get(1).is_nan());
        assert_eq!(points[0].counts.get(2), 2.0);
    }

    #[test]
    fn month_keys_are_case_insensitive() {
        let points = parse_points(POINTS.parse().unwrap()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].state, "Oklahoma");
        assert_eq!(points[0].counts.get(3), 9.0);
        assert_eq!(points[1].counts.get(0), 0.0);
        assert_eq!(points[1].counts.get(4), 0.5);
    }

    #[test]
    fn numeric_strings_are_counts_and_missing_months_are_nan() {
        let points = parse_points(POINTS.parse().unwrap()).unwrap();
        assert_eq!(points[0].counts.get(10), 2.5);
        assert!(points[1].counts.get(11).is_nan());
    }

    #[test]
    fn point_coordinates_are_lon_lat() {
        let points = parse_points(POINTS.parse().unwrap()).unwrap();
        assert_eq!(points[0].point.x(), -97.5);
        assert_eq!(points[0].point.y(), 35.5);
    }

    #[test]
    fn polygons_skip_non_polygon_features() {
        let polygons = parse_polygons(POLYGONS.parse().unwrap()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].state, "Oklahoma");
        assert_eq!(polygons[0].geometry.0.len(), 1);
    }

    #[test]
    fn bare_geometry_is_rejected() {
        let geojson: GeoJson = r#"{"type": "Point", "coordinates": [0, 0]}"#.parse().unwrap();
        assert!(parse_points(geojson).is_err());
    }

    #[test]
    fn source_recognizes_urls() {
        assert_eq!(
            Source::parse("https://example.org/a.geojson"),
            Source::Url("https://example.org/a.geojson".to_string())
        );
        assert_eq!(
            Source::parse("data/a.geojson"),
            Source::File(PathBuf::from("data/a.geojson"))
        );
    }

    fn config_for(points: &str, polygons: &str) -> AppConfig {
        AppConfig {
            input: InputConfig {
                points: points.to_string(),
                polygons: polygons.to_string(),
            },
            map: MapConfig::default(),
            output: OutputConfig::default(),
            server: ServerConfig::default(),
        }
    }

    #[tokio::test]
    async fn loads_both_layers_from_files() {
        let mut points = tempfile::NamedTempFile::new().unwrap();
        points.write_all(POINTS.as_bytes()).unwrap();
        let mut polygons = tempfile::NamedTempFile::new().unwrap();
        polygons.write_all(POLYGONS.as_bytes()).unwrap();

        let config = config_for(
            points.path().to_str().unwrap(),
            polygons.path().to_str().unwrap(),
        );
        let layers = load_layers(&config).await.unwrap();
        assert_eq!(layers.points.len(), 2);
        assert_eq!(layers.polygons.len(), 1);
    }

    async fn serve_points() -> String {
        let app = axum::Router::new()
            .route("/points.geojson", axum::routing::get(|| async { POINTS }))
            .route("/polygons.geojson", axum::routing::get(|| async { POLYGONS }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn loads_both_layers_from_urls() {
        let base = serve_points().await;
        let config = config_for(
            &format!("{}/points.geojson", base),
            &format!("{}/polygons.geojson", base),
        );
        let layers = load_layers(&config).await.unwrap();
        assert_eq!(layers.points.len(), 2);
        assert_eq!(layers.points[0].state, "Oklahoma");
        assert_eq!(layers.polygons.len(), 1);
    }

    #[tokio::test]
    async fn http_error_status_names_the_url() {
        let base = serve_points().await;
        let missing = format!("{}/missing.geojson", base);
        let config = config_for(&format!("{}/points.geojson", base), &missing);

        let err = load_layers(&config).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains(&missing));
        assert!(message.contains("404"));
    }

    #[tokio::test]
    async fn one_failed_fetch_fails_the_join() {
        let mut points = tempfile::NamedTempFile::new().unwrap();
        points.write_all(POINTS.as_bytes()).unwrap();

        let config = config_for(points.path().to_str().unwrap(), "/nonexistent/polygons.geojson");
        let err = load_layers(&config).await.unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/polygons.geojson"));
    }
}
