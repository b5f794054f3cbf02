use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::style::VectorStyle;
use crate::extent::{Coordinate, PrintExtent};

pub type Properties = BTreeMap<String, Value>;

/// Number of segments used to turn a circle into a polygon.
const CIRCLE_SEGMENTS: usize = 64;

/// Snapshot of the interactive map at the moment the user asked to print.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapView {
    pub center: Coordinate,
    /// Scale denominator (50000 means 1:50000)
    pub scale: f64,
    /// Ground units per pixel at the current zoom
    pub resolution: f64,
    pub dpi: u32,
    /// Clockwise rotation in degrees
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_projection")]
    pub projection: String,
    /// Bottom-to-top in visual order
    #[serde(default)]
    pub layers: Vec<LayerDescriptor>,
}

fn default_projection() -> String {
    "EPSG:3857".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerDescriptor {
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_resolution: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_resolution: Option<f64>,
    pub source: LayerSource,
}

fn default_visible() -> bool {
    true
}

fn default_opacity() -> f64 {
    1.0
}

impl LayerDescriptor {
    /// Whether the layer shows up on the map at `resolution`.
    ///
    /// Follows the usual web-map convention: visible when
    /// `min_resolution <= resolution < max_resolution`.
    pub fn is_printable(&self, resolution: f64) -> bool {
        if !self.visible || self.opacity <= 0.0 {
            return false;
        }
        if let Some(min) = self.min_resolution {
            if resolution < min {
                return false;
            }
        }
        if let Some(max) = self.max_resolution {
            if resolution >= max {
                return false;
            }
        }
        true
    }
}

/// Where the layer's content comes from.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSource {
    Osm {
        #[serde(default = "default_osm_url")]
        url: String,
    },
    Xyz {
        url: String,
        #[serde(default = "default_image_extension")]
        image_extension: String,
    },
    Wms {
        url: String,
        #[serde(default)]
        params: Properties,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    Vector {
        #[serde(default)]
        features: Vec<Feature>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<VectorStyle>,
    },
    VectorTile {
        url: String,
    },
}

fn default_osm_url() -> String {
    "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string()
}

fn default_image_extension() -> String {
    "png".to_string()
}

impl LayerSource {
    pub fn kind(&self) -> &'static str {
        match self {
            LayerSource::Osm { .. } => "osm",
            LayerSource::Xyz { .. } => "xyz",
            LayerSource::Wms { .. } => "wms",
            LayerSource::Vector { .. } => "vector",
            LayerSource::VectorTile { .. } => "vector_tile",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: Properties,
    pub geometry: Geometry,
    /// Overrides the layer style when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<VectorStyle>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            properties: Properties::new(),
            geometry,
            style: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_style(mut self, style: VectorStyle) -> Self {
        self.style = Some(style);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Coordinate },
    LineString { coordinates: Vec<Coordinate> },
    Polygon { coordinates: Vec<Vec<Coordinate>> },
    Circle { center: Coordinate, radius: f64 },
}

/// Which kind of symbolizer renders a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point { .. } => GeometryKind::Point,
            Geometry::LineString { .. } => GeometryKind::Line,
            Geometry::Polygon { .. } | Geometry::Circle { .. } => GeometryKind::Polygon,
        }
    }

    /// Bounding box, or `None` for empty geometries.
    pub fn bbox(&self) -> Option<PrintExtent> {
        match self {
            Geometry::Point { coordinates } => bbox_of(std::iter::once(coordinates)),
            Geometry::LineString { coordinates } => bbox_of(coordinates.iter()),
            Geometry::Polygon { coordinates } => bbox_of(coordinates.iter().flatten()),
            Geometry::Circle { center, radius } => Some(PrintExtent {
                min_x: center[0] - radius,
                min_y: center[1] - radius,
                max_x: center[0] + radius,
                max_y: center[1] + radius,
            }),
        }
    }

    /// GeoJSON geometry object. Circles have no GeoJSON form and are
    /// densified into a closed polygon ring.
    pub fn to_geojson(&self) -> Value {
        match self {
            Geometry::Point { coordinates } => {
                json!({ "type": "Point", "coordinates": coordinates })
            }
            Geometry::LineString { coordinates } => {
                json!({ "type": "LineString", "coordinates": coordinates })
            }
            Geometry::Polygon { coordinates } => {
                json!({ "type": "Polygon", "coordinates": coordinates })
            }
            Geometry::Circle { center, radius } => {
                let mut ring: Vec<Coordinate> = (0..CIRCLE_SEGMENTS)
                    .map(|i| {
                        let angle = 2.0 * std::f64::consts::PI * i as f64 / CIRCLE_SEGMENTS as f64;
                        [
                            center[0] + radius * angle.cos(),
                            center[1] + radius * angle.sin(),
                        ]
                    })
                    .collect();
                ring.push(ring[0]);
                json!({ "type": "Polygon", "coordinates": [ring] })
            }
        }
    }
}

fn bbox_of<'a>(mut coords: impl Iterator<Item = &'a Coordinate>) -> Option<PrintExtent> {
    let first = coords.next()?;
    let init = PrintExtent {
        min_x: first[0],
        min_y: first[1],
        max_x: first[0],
        max_y: first[1],
    };
    Some(coords.fold(init, |acc, c| PrintExtent {
        min_x: acc.min_x.min(c[0]),
        min_y: acc.min_y.min(c[1]),
        max_x: acc.max_x.max(c[0]),
        max_y: acc.max_y.max(c[1]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(visible: bool, opacity: f64) -> LayerDescriptor {
        LayerDescriptor {
            name: "base".to_string(),
            visible,
            opacity,
            min_resolution: Some(1.0),
            max_resolution: Some(100.0),
            source: LayerSource::Osm {
                url: default_osm_url(),
            },
        }
    }

    #[test]
    fn test_printable_layers() {
        assert!(layer(true, 1.0).is_printable(10.0));
        assert!(layer(true, 1.0).is_printable(1.0));
        assert!(!layer(true, 1.0).is_printable(100.0));
        assert!(!layer(true, 1.0).is_printable(0.5));
        assert!(!layer(false, 1.0).is_printable(10.0));
        assert!(!layer(true, 0.0).is_printable(10.0));
    }

    #[test]
    fn test_deserialize_view_with_defaults() {
        let json = r#"{
            "center": [796612, 5836960],
            "scale": 50000,
            "resolution": 38.2,
            "dpi": 254,
            "layers": [
                {"name": "osm", "source": {"type": "osm"}},
                {"name": "wms", "opacity": 0.5, "source": {
                    "type": "wms",
                    "url": "https://wms.geo.admin.ch/",
                    "params": {"LAYERS": "ch.astra.wanderland-sperrungen_umleitungen", "FORMAT": "image/png"}
                }}
            ]
        }"#;

        let view: MapView = serde_json::from_str(json).unwrap();
        assert_eq!(view.projection, "EPSG:3857");
        assert_eq!(view.rotation, 0.0);
        assert_eq!(view.layers.len(), 2);
        assert!(view.layers[0].visible);
        assert_eq!(view.layers[1].source.kind(), "wms");
    }

    #[test]
    fn test_circle_is_densified() {
        let circle = Geometry::Circle {
            center: [796932.0, 5836860.0],
            radius: 75.0,
        };
        let geojson = circle.to_geojson();
        let ring = geojson["coordinates"][0].as_array().unwrap();
        assert_eq!(geojson["type"], "Polygon");
        assert_eq!(ring.len(), CIRCLE_SEGMENTS + 1);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn test_bbox() {
        let line = Geometry::LineString {
            coordinates: vec![[796712.0, 5836960.0], [796712.0, 5836760.0], [796812.0, 5836760.0]],
        };
        let bbox = line.bbox().unwrap();
        assert_eq!(bbox.to_array(), [796712.0, 5836760.0, 796812.0, 5836960.0]);

        let empty = Geometry::LineString {
            coordinates: vec![],
        };
        assert!(empty.bbox().is_none());
    }
}
