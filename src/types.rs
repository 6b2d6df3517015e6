use geo::{MultiPolygon, Point};
use serde::Serialize;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Average tornado count per month, January first. Missing values are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonthlyCounts(pub [f64; 12]);

impl MonthlyCounts {
    pub fn get(&self, month: usize) -> f64 {
        self.0[month]
    }
}

#[derive(Debug, Clone)]
pub struct StatePoint {
    pub state: String,
    pub point: Point<f64>, // x = lon, y = lat
    pub counts: MonthlyCounts,
}

#[derive(Debug, Clone)]
pub struct StatePolygon {
    pub state: String,
    pub geometry: MultiPolygon<f64>,
    pub counts: MonthlyCounts,
}

/// Both layers, as joined after the two fetches complete.
#[derive(Debug, Clone, Default)]
pub struct Layers {
    pub points: Vec<StatePoint>,
    pub polygons: Vec<StatePolygon>,
}
