//! Value-to-symbol rules shared by the frame builder, the legend and the
//! renderer.

use serde::Serialize;
use std::f64::consts::PI;

/// Scale factor applied to a count before it is treated as a circle area.
pub const SCALE_FACTOR: f64 = 50.0;

/// The smallest count shown by the symbol legend. Not derived from data.
pub const LEGEND_MIN: f64 = 1.0;

/// Lower bounds of the choropleth legend rows.
pub const GRADES: [f64; 3] = [1.0, 7.0, 14.0];

pub const SYMBOL_FILL: Rgb = Rgb(0xff, 0x00, 0x00);
pub const SYMBOL_FILL_OPACITY: f64 = 0.8;
pub const SYMBOL_STROKE: Rgb = Rgb(0x00, 0x00, 0x00);
pub const REGION_FILL_OPACITY: f64 = 0.7;
pub const REGION_OUTLINE: Rgb = Rgb(0xff, 0xff, 0xff);

/// Circle radius in pixels whose area is proportional to `value`.
pub fn prop_radius(value: f64) -> f64 {
    ((value * SCALE_FACTOR) / PI).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.hex())
    }
}

/// Choropleth color classes, darkest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    High,
    Elevated,
    Low,
    None,
}

impl Bucket {
    /// `NaN` falls through every comparison and lands in `None`.
    pub fn classify(value: f64) -> Self {
        if value > 14.0 {
            Bucket::High
        } else if value > 7.0 {
            Bucket::Elevated
        } else if value >= 1.0 {
            Bucket::Low
        } else {
            Bucket::None
        }
    }

    pub fn color(self) -> Rgb {
        match self {
            Bucket::High => Rgb(0xf0, 0x3b, 0x20),
            Bucket::Elevated => Rgb(0xfe, 0xb2, 0x4c),
            Bucket::Low => Rgb(0xff, 0xed, 0xa0),
            Bucket::None => Rgb(0xe0, 0xe0, 0xd1),
        }
    }
}

pub fn choropleth_color(value: f64) -> Rgb {
    Bucket::classify(value).color()
}

/// Sample values for the three legend circles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CircleValues {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
}

/// `min` is fixed at [`LEGEND_MIN`] and `mean` is the midpoint of `max` and
/// `min`. `NaN` values are ignored; with no usable values `max` equals `min`.
pub fn circle_values<I>(values: I) -> CircleValues
where
    I: IntoIterator<Item = f64>,
{
    let min = LEGEND_MIN;
    let max = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
        .unwrap_or(min);

    CircleValues {
        max,
        mean: (max + min) / 2.0,
        min,
    }
}

/// One row of the choropleth legend: `(swatch, label)`.
pub fn grade_rows() -> Vec<(Rgb, String)> {
    GRADES
        .iter()
        .enumerate()
        .map(|(i, &grade)| {
            let label = match GRADES.get(i + 1) {
                Some(next) => format!("{}\u{2013}{}", grade, next),
                None => format!("{}+", grade),
            };
            (choropleth_color(grade + 1.0), label)
        })
        .collect()
}
