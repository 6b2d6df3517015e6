use crate::state::{MonthCursor, StyleMode, ViewState};
use crate::symbology::{self, circle_values, prop_radius, Bucket, CircleValues, Rgb};
use crate::types::{Layers, MonthlyCounts};
use serde::Serialize;
use std::fmt::Write;

/// Everything shown for one (month, style) selection.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub header: &'static str,
    pub month: usize,
    pub style: StyleMode,
    pub symbols: Vec<Symbol>,
    pub regions: Vec<Region>,
    pub legend: Legend,
    pub panel: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub state: String,
    pub lon: f64,
    pub lat: f64,
    pub value: f64,
    pub radius: f64,
    pub popup: Popup,
}

#[derive(Debug, Clone, Serialize)]
pub struct Region {
    pub state: String,
    pub value: f64,
    pub bucket: Bucket,
    pub fill: Rgb,
    pub popup: Popup,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub month: &'static str,
    pub state: String,
    pub tornadoes: f64,
}

impl Popup {
    pub fn to_html(&self) -> String {
        format!(
            "<h4>{}</h4><p><b>State:</b> {}</p><p> <b>Tornadoes: </b>{}</p>",
            self.month, self.state, self.tornadoes
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Legend {
    Symbols {
        title: &'static str,
        circles: Vec<LegendCircle>,
    },
    Grades {
        title: &'static str,
        rows: Vec<LegendGrade>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendCircle {
    pub key: &'static str,
    pub value: f64,
    pub radius: f64,
    pub cy: f64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendGrade {
    pub color: Rgb,
    pub label: String,
}

// Legend SVG geometry
const LEGEND_WIDTH: u32 = 180;
const LEGEND_HEIGHT: u32 = 60;
const LEGEND_BASELINE: f64 = 59.0;
const LEGEND_CX: u32 = 30;
const LEGEND_TEXT_X: u32 = 65;

pub fn build_frame(layers: &Layers, view: ViewState) -> Frame {
    let month = view.month;
    let (symbols, regions, panel) = match view.style {
        StyleMode::Proportional => {
            let symbols = symbols_for(layers, month);
            let panel = panel_entries(symbols.iter().map(|s| (s.state.as_str(), s.value)));
            (symbols, Vec::new(), panel)
        }
        StyleMode::Choropleth => {
            let regions = regions_for(layers, month);
            let panel = panel_entries(regions.iter().map(|r| (r.state.as_str(), r.value)));
            (Vec::new(), regions, panel)
        }
    };

    let legend = match view.style {
        StyleMode::Proportional => symbol_legend(layers, month),
        StyleMode::Choropleth => grade_legend(month),
    };

    Frame {
        header: month.name(),
        month: month.index(),
        style: view.style,
        symbols,
        regions,
        legend,
        panel,
    }
}

pub fn symbols_for(layers: &Layers, month: MonthCursor) -> Vec<Symbol> {
    layers
        .points
        .iter()
        .map(|p| {
            let value = p.counts.get(month.index());
            Symbol {
                state: p.state.clone(),
                lon: p.point.x(),
                lat: p.point.y(),
                value,
                radius: prop_radius(value),
                popup: popup(month, &p.state, &p.counts),
            }
        })
        .collect()
}

pub fn regions_for(layers: &Layers, month: MonthCursor) -> Vec<Region> {
    layers
        .polygons
        .iter()
        .map(|p| {
            let value = p.counts.get(month.index());
            let bucket = Bucket::classify(value);
            Region {
                state: p.state.clone(),
                value,
                bucket,
                fill: bucket.color(),
                popup: popup(month, &p.state, &p.counts),
            }
        })
        .collect()
}

pub fn popup(month: MonthCursor, state: &str, counts: &MonthlyCounts) -> Popup {
    Popup {
        month: month.name(),
        state: state.to_string(),
        tornadoes: counts.get(month.index()),
    }
}

/// Side panel lines, in data order, for states with at least some activity.
fn panel_entries<'a, I>(values: I) -> Vec<String>
where
    I: Iterator<Item = (&'a str, f64)>,
{
    values
        .filter(|(_, v)| *v > 0.0)
        .map(|(state, v)| format!("{}  {}", state, v))
        .collect()
}

/// Three sample circles sized from the point layer for `month`.
pub fn symbol_legend(layers: &Layers, month: MonthCursor) -> Legend {
    let CircleValues { max, mean, min } =
        circle_values(layers.points.iter().map(|p| p.counts.get(month.index())));

    let circles = [("max", max), ("mean", mean), ("min", min)]
        .into_iter()
        .map(|(key, value)| {
            let radius = prop_radius(value);
            LegendCircle {
                key,
                value,
                radius,
                cy: LEGEND_BASELINE - radius,
                label: format!("{} Tornadoes", value.round()),
            }
        })
        .collect();

    Legend::Symbols {
        title: month.name(),
        circles,
    }
}

pub fn grade_legend(month: MonthCursor) -> Legend {
    let rows = symbology::grade_rows()
        .into_iter()
        .map(|(color, label)| LegendGrade { color, label })
        .collect();
    Legend::Grades {
        title: month.name(),
        rows,
    }
}

impl Legend {
    pub fn title(&self) -> &'static str {
        match self {
            Legend::Symbols { title, .. } | Legend::Grades { title, .. } => title,
        }
    }

    pub fn to_svg(&self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" id="attribute-legend" width="{}px" height="{}px">"#,
            LEGEND_WIDTH, LEGEND_HEIGHT
        );
        match self {
            Legend::Symbols { circles, .. } => {
                for (i, c) in circles.iter().enumerate() {
                    let _ = write!(
                        svg,
                        r##"<circle class="legend-circle" id="{key}" fill="red" fill-opacity="0.8" stroke="#000000" cx="{cx}" cy="{cy}" r="{r}"/><text id="{key}-text" x="{tx}" y="{ty}">{label}</text>"##,
                        key = c.key,
                        cx = LEGEND_CX,
                        cy = c.cy,
                        r = c.radius,
                        tx = LEGEND_TEXT_X,
                        ty = (i as u32 + 1) * 20,
                        label = c.label,
                    );
                }
            }
            Legend::Grades { rows, .. } => {
                for (i, row) in rows.iter().enumerate() {
                    let y = i as u32 * 20;
                    let _ = write!(
                        svg,
                        r#"<rect x="0" y="{y}" width="18" height="18" fill="{fill}" opacity="0.7"/><text x="24" y="{ty}">{label}</text>"#,
                        fill = row.color.hex(),
                        ty = y + 14,
                        label = row.label,
                    );
                }
            }
        }
        svg.push_str("</svg>");
        svg
    }
}
