use crate::types::MONTHS;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ViewError {
    #[error("month index {0} is out of range 0..=11")]
    MonthOutOfRange(usize),
    #[error("unknown map style '{0}', expected 'proportional' or 'choropleth'")]
    UnknownStyle(String),
}

/// Selected month, always in `0..=11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MonthCursor(usize);

impl MonthCursor {
    pub const LAST: usize = MONTHS.len() - 1;

    pub fn new(index: usize) -> Result<Self, ViewError> {
        if index > Self::LAST {
            return Err(ViewError::MonthOutOfRange(index));
        }
        Ok(Self(index))
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn name(self) -> &'static str {
        MONTHS[self.0]
    }

    pub fn next(self) -> Self {
        if self.0 == Self::LAST {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }

    pub fn prev(self) -> Self {
        if self.0 == 0 {
            Self(Self::LAST)
        } else {
            Self(self.0 - 1)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleMode {
    #[default]
    Proportional,
    Choropleth,
}

impl StyleMode {
    pub const ALL: [StyleMode; 2] = [StyleMode::Proportional, StyleMode::Choropleth];

    pub fn as_str(self) -> &'static str {
        match self {
            StyleMode::Proportional => "proportional",
            StyleMode::Choropleth => "choropleth",
        }
    }
}

impl fmt::Display for StyleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StyleMode {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proportional" => Ok(StyleMode::Proportional),
            "choropleth" => Ok(StyleMode::Choropleth),
            _ => Err(ViewError::UnknownStyle(s.to_string())),
        }
    }
}

/// What the controls currently select. Starts at January, proportional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewState {
    pub month: MonthCursor,
    pub style: StyleMode,
}

impl ViewState {
    pub fn forward(&mut self) {
        self.month = self.month.next();
    }

    pub fn reverse(&mut self) {
        self.month = self.month.prev();
    }

    pub fn select_month(&mut self, index: usize) -> Result<(), ViewError> {
        self.month = MonthCursor::new(index)?;
        Ok(())
    }

    /// Switches the active layer. The month cursor is left untouched.
    pub fn select_style(&mut self, style: StyleMode) {
        self.style = style;
    }
}
