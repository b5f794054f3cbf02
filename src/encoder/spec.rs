//! Wire model of a print request.
//!
//! A complete request looks like:
//!
//! ```json
//! {
//!   "attributes": {
//!     "map": {
//!       "center": [796612.0, 5836960.0],
//!       "dpi": 254,
//!       "layers": [ { "type": "osm", "baseURL": "https://tile.openstreetmap.org/{z}/{x}/{y}.png", ... } ],
//!       "projection": "EPSG:3857",
//!       "rotation": 0.0,
//!       "scale": 50000.0
//!     },
//!     "datasource": []
//!   },
//!   "format": "pdf",
//!   "layout": "2 A4 landscape"
//! }
//! ```
//!
//! Everything here is plain owned data so a spec can be logged, stored, and
//! round-tripped through JSON unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::extent::{Coordinate, PrintExtent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintSpec {
    pub attributes: SpecAttributes,
    pub format: String,
    pub layout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecAttributes {
    pub map: MapAttributes,
    #[serde(default)]
    pub datasource: Vec<Value>,
}

impl PrintSpec {
    pub fn new(map: MapAttributes, layout: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            attributes: SpecAttributes {
                map,
                datasource: Vec::new(),
            },
            format: format.into(),
            layout: layout.into(),
        }
    }

    pub fn with_datasource(mut self, rows: impl IntoIterator<Item = Value>) -> Self {
        self.attributes.datasource.extend(rows);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The `attributes.map` block: where, how big, and what to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapAttributes {
    pub dpi: u32,
    pub scale: f64,
    pub rotation: f64,
    pub projection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "bbox")]
    pub extent: Option<PrintExtent>,
    pub layers: Vec<EncodedLayer>,
}

/// A single serialized layer, tagged by the renderer's layer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncodedLayer {
    Osm(TileLayer),
    Wms(WmsLayer),
    Geojson(GeojsonLayer),
}

impl EncodedLayer {
    pub fn name(&self) -> Option<&str> {
        match self {
            EncodedLayer::Osm(l) => l.name.as_deref(),
            EncodedLayer::Wms(l) => l.name.as_deref(),
            EncodedLayer::Geojson(l) => l.name.as_deref(),
        }
    }

    /// URL the renderer fetches this layer from; inline GeoJSON has none.
    pub fn base_url_mut(&mut self) -> Option<&mut String> {
        match self {
            EncodedLayer::Osm(l) => Some(&mut l.base_url),
            EncodedLayer::Wms(l) => Some(&mut l.base_url),
            EncodedLayer::Geojson(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileLayer {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub image_extension: String,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WmsLayer {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub layers: Vec<String>,
    pub image_format: String,
    #[serde(default)]
    pub custom_params: BTreeMap<String, Value>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeojsonLayer {
    pub geo_json: Value,
    pub style: Value,
    pub opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map() -> MapAttributes {
        MapAttributes {
            dpi: 254,
            scale: 50000.0,
            rotation: 0.0,
            projection: "EPSG:3857".to_string(),
            center: Some([796612.0, 5836960.0]),
            extent: None,
            layers: vec![EncodedLayer::Osm(TileLayer {
                base_url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
                image_extension: "png".to_string(),
                opacity: 1.0,
                name: Some("osm".to_string()),
            })],
        }
    }

    #[test]
    fn test_wire_shape() {
        let spec = PrintSpec::new(map(), "2 A4 landscape", "pdf");
        let value = serde_json::to_value(&spec).unwrap();

        assert_eq!(value["layout"], "2 A4 landscape");
        assert_eq!(value["format"], "pdf");
        assert_eq!(value["attributes"]["datasource"], json!([]));
        assert_eq!(value["attributes"]["map"]["center"], json!([796612.0, 5836960.0]));
        assert!(value["attributes"]["map"].get("extent").is_none());
        let layer = &value["attributes"]["map"]["layers"][0];
        assert_eq!(layer["type"], "osm");
        assert_eq!(layer["baseURL"], "https://tile.openstreetmap.org/{z}/{x}/{y}.png");
        assert_eq!(layer["imageExtension"], "png");
    }

    #[test]
    fn test_json_round_trip() {
        let mut attributes = map();
        attributes.center = None;
        attributes.extent = Some(PrintExtent::from([0.0, 0.0, 10.0, 20.0]));
        let spec = PrintSpec::new(attributes, "A4 portrait", "png")
            .with_datasource([json!({"displayName": "table", "table": {"columns": [], "data": []}})]);

        let json = spec.to_json().unwrap();
        let parsed: PrintSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, spec);
    }

    #[test]
    fn test_accepts_bbox_alias() {
        let json = r#"{"dpi": 96, "scale": 1000, "rotation": 0, "projection": "EPSG:2056",
                       "bbox": [1, 2, 3, 4], "layers": []}"#;
        let parsed: MapAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.extent.unwrap().to_array(), [1.0, 2.0, 3.0, 4.0]);
    }
}
