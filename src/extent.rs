//! Ground-space extent covered by a printed map page.
//!
//! The printed map frame has a fixed physical size (from the layout) and is
//! rendered at a fixed scale, so its footprint on the ground is
//! `physical size * scale`, centered on the view center.

use serde::{Deserialize, Serialize};

use crate::error::{PrintError, Result};

/// Metres per inch.
const METRES_PER_INCH: f64 = 0.0254;
/// Points per inch (MapFish layouts declare map sizes in points).
const POINTS_PER_INCH: f64 = 72.0;

/// 2D ground coordinate `[x, y]`.
pub type Coordinate = [f64; 2];

/// Unit of the page dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageUnit {
    #[default]
    Millimetres,
    Points,
}

impl PageUnit {
    fn metres_per_unit(self) -> f64 {
        match self {
            PageUnit::Millimetres => 0.001,
            PageUnit::Points => METRES_PER_INCH / POINTS_PER_INCH,
        }
    }
}

/// Physical size of the map frame on the printed page.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub unit: PageUnit,
}

impl PageSize {
    pub fn millimetres(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: PageUnit::Millimetres,
        }
    }

    pub fn points(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: PageUnit::Points,
        }
    }

    fn in_metres(&self) -> (f64, f64) {
        let factor = self.unit.metres_per_unit();
        (self.width * factor, self.height * factor)
    }
}

/// Axis-aligned rectangle in map ground coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PrintExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl PrintExtent {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coordinate {
        [
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        ]
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() / self.height()
    }

    pub fn intersects(&self, other: &PrintExtent) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<[f64; 4]> for PrintExtent {
    fn from(value: [f64; 4]) -> Self {
        Self {
            min_x: value[0],
            min_y: value[1],
            max_x: value[2],
            max_y: value[3],
        }
    }
}

impl From<PrintExtent> for [f64; 4] {
    fn from(value: PrintExtent) -> Self {
        value.to_array()
    }
}

/// Compute the extent for a metric projection (one ground unit per metre).
pub fn compute_extent(page: PageSize, center: Coordinate, scale: f64) -> Result<PrintExtent> {
    compute_extent_in(page, center, scale, 1.0)
}

/// Compute the extent for a projection with `meters_per_unit` metres per
/// ground unit.
pub fn compute_extent_in(
    page: PageSize,
    center: Coordinate,
    scale: f64,
    meters_per_unit: f64,
) -> Result<PrintExtent> {
    require_positive("page width", page.width)?;
    require_positive("page height", page.height)?;
    require_positive("scale", scale)?;
    require_positive("meters per unit", meters_per_unit)?;
    if !center.iter().all(|c| c.is_finite()) {
        return Err(PrintError::InvalidArgument(format!(
            "center must be finite, got [{}, {}]",
            center[0], center[1]
        )));
    }

    let (width_m, height_m) = page.in_metres();
    let half_width = width_m * scale / meters_per_unit / 2.0;
    let half_height = height_m * scale / meters_per_unit / 2.0;

    Ok(PrintExtent {
        min_x: center[0] - half_width,
        min_y: center[1] - half_height,
        max_x: center[0] + half_width,
        max_y: center[1] + half_height,
    })
}

/// Metres per ground unit for the projections the encoder knows about.
/// Unknown codes are assumed to be metric.
pub fn meters_per_unit(projection: &str) -> f64 {
    match projection.to_ascii_uppercase().as_str() {
        "EPSG:4326" | "CRS:84" | "EPSG:4258" => 2.0 * std::f64::consts::PI * 6_378_137.0 / 360.0,
        _ => 1.0,
    }
}

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PrintError::InvalidArgument(format!(
            "{name} must be a positive finite number, got {value}"
        )))
    }
}
