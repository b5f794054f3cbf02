//! Map view → print spec encoding.
//!
//! ## Key Components
//!
//! - [`MapSpecEncoder`] - Serializes a [`MapView`] into [`MapAttributes`]
//! - [`Customizer`] - Per-layer adjustment strategy invoked during encoding
//! - [`BaseCustomizer`], [`ExtentClip`], [`TokenInjector`] - Built-in customizers
//! - [`PrintSpec`] - Complete request submitted to the print service
//!
//! ## Example
//!
//! ```rust,ignore
//! use printbox::encoder::{BaseCustomizer, MapSpecEncoder, PrintSpec};
//! use printbox::extent::{compute_extent, PageSize};
//!
//! let extent = compute_extent(PageSize::millimetres(254.0, 675.0), view.center, 50000.0)?;
//! let map = MapSpecEncoder::default().encode_map(&view, &extent, &BaseCustomizer::new(extent))?;
//! let spec = PrintSpec::new(map, "2 A4 landscape", "pdf");
//! ```

mod customizer;
mod default;
pub mod spec;
pub mod style;
pub mod types;

pub use customizer::{Customizer, CustomizerChain, LayerAdjustment, LayerContext};
pub use default::{BaseCustomizer, ExtentClip, TokenInjector};
pub use spec::{EncodedLayer, GeojsonLayer, MapAttributes, PrintSpec, TileLayer, WmsLayer};
pub use style::{Color, Fill, PointStyle, Stroke, TextStyle, VectorStyle};
pub use types::{Feature, Geometry, LayerDescriptor, LayerSource, MapView};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{PrintError, Result};
use crate::extent::PrintExtent;
use style::{STYLE_PROPERTY, StyleCollector};

/// How the map frame is positioned in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionMode {
    /// `center` + `scale`; the renderer derives the extent from the layout
    #[default]
    Center,
    /// Explicit `extent`
    Extent,
}

#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    pub position: PositionMode,
}

#[derive(Debug, Clone, Default)]
pub struct MapSpecEncoder {
    options: EncoderOptions,
}

impl MapSpecEncoder {
    pub fn new(options: EncoderOptions) -> Self {
        Self { options }
    }

    /// Encode every printable layer of `view`, bottom to top.
    ///
    /// Layers are only described, never fetched: a remote source that is
    /// unreachable right now still encodes and fails later on the server.
    pub fn encode_map(
        &self,
        view: &MapView,
        extent: &PrintExtent,
        customizer: &dyn Customizer,
    ) -> Result<MapAttributes> {
        if view.dpi == 0 {
            return Err(PrintError::InvalidArgument("dpi must be positive".to_string()));
        }
        if !(view.scale.is_finite() && view.scale > 0.0) {
            return Err(PrintError::InvalidArgument(format!(
                "scale must be a positive finite number, got {}",
                view.scale
            )));
        }

        let mut layers = Vec::with_capacity(view.layers.len());

        for layer in &view.layers {
            if !layer.is_printable(view.resolution) {
                debug!(layer = %layer.name, "Layer not visible at print resolution, skipped");
                continue;
            }

            let ctx = LayerContext {
                extent,
                scale: view.scale,
                dpi: view.dpi,
                resolution: view.resolution,
                rotation: view.rotation,
                projection: &view.projection,
                layer_name: &layer.name,
            };

            let Some(encoded) = self.encode_layer(layer, &ctx, customizer)? else {
                continue;
            };

            match customizer.adjust_layer(encoded, &ctx) {
                LayerAdjustment::Keep(encoded) => layers.push(encoded),
                LayerAdjustment::Skip => {
                    debug!(layer = %layer.name, "Layer skipped by customizer");
                }
            }
        }

        let (center, extent) = match self.options.position {
            PositionMode::Center => (Some(view.center), None),
            PositionMode::Extent => (None, Some(*extent)),
        };

        Ok(MapAttributes {
            dpi: view.dpi,
            scale: view.scale,
            rotation: view.rotation,
            projection: view.projection.clone(),
            center,
            extent,
            layers,
        })
    }

    /// `Ok(None)` means the layer has nothing to draw.
    fn encode_layer(
        &self,
        layer: &LayerDescriptor,
        ctx: &LayerContext<'_>,
        customizer: &dyn Customizer,
    ) -> Result<Option<EncodedLayer>> {
        let name = Some(layer.name.clone());

        let encoded = match &layer.source {
            LayerSource::Osm { url } => EncodedLayer::Osm(TileLayer {
                base_url: url.clone(),
                image_extension: "png".to_string(),
                opacity: layer.opacity,
                name,
            }),
            LayerSource::Xyz {
                url,
                image_extension,
            } => EncodedLayer::Osm(TileLayer {
                base_url: url.clone(),
                image_extension: image_extension.clone(),
                opacity: layer.opacity,
                name,
            }),
            LayerSource::Wms {
                url,
                params,
                server_type,
                version,
            } => EncodedLayer::Wms(encode_wms(
                url,
                params,
                server_type.clone(),
                version.clone(),
                layer.opacity,
                name,
            )),
            LayerSource::Vector { features, style } => {
                match encode_vector(features, style.as_ref(), ctx, customizer) {
                    Some((geo_json, style)) => EncodedLayer::Geojson(GeojsonLayer {
                        geo_json,
                        style,
                        opacity: layer.opacity,
                        name,
                    }),
                    None => {
                        debug!(layer = %layer.name, "Vector layer has no printable features");
                        return Ok(None);
                    }
                }
            }
            LayerSource::VectorTile { .. } => {
                return Err(PrintError::UnsupportedLayer {
                    layer: layer.name.clone(),
                    kind: layer.source.kind().to_string(),
                });
            }
        };

        Ok(Some(encoded))
    }
}

/// Encode with default options.
pub fn encode_map(
    view: &MapView,
    extent: &PrintExtent,
    customizer: &dyn Customizer,
) -> Result<MapAttributes> {
    MapSpecEncoder::default().encode_map(view, extent, customizer)
}

fn encode_wms(
    url: &str,
    params: &BTreeMap<String, Value>,
    server_type: Option<String>,
    version: Option<String>,
    opacity: f64,
    name: Option<String>,
) -> WmsLayer {
    let mut layers = Vec::new();
    let mut image_format = "image/png".to_string();
    let mut styles = Vec::new();
    let mut custom_params = BTreeMap::new();

    for (key, value) in params {
        let key = key.to_ascii_uppercase();
        match key.as_str() {
            "LAYERS" => layers = split_list(value),
            "STYLES" => styles = split_list(value),
            "FORMAT" => {
                if let Some(format) = value.as_str() {
                    image_format = format.to_string();
                }
            }
            // the renderer manages these per request
            "VERSION" | "REQUEST" | "SERVICE" | "BBOX" | "WIDTH" | "HEIGHT" => {}
            _ => {
                custom_params.insert(key, value.clone());
            }
        }
    }

    let version = version.or_else(|| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("VERSION"))
            .and_then(|(_, v)| v.as_str().map(str::to_owned))
    });

    WmsLayer {
        base_url: url.to_string(),
        layers,
        image_format,
        custom_params,
        styles,
        server_type,
        version,
        opacity,
        name,
    }
}

fn split_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// Returns the feature collection and style, or `None` when no feature
/// survives filtering or has anything to draw.
fn encode_vector(
    features: &[Feature],
    layer_style: Option<&VectorStyle>,
    ctx: &LayerContext<'_>,
    customizer: &dyn Customizer,
) -> Option<(Value, Value)> {
    let fallback = VectorStyle::fallback();
    let layer_style = layer_style.unwrap_or(&fallback);
    let mut styles = StyleCollector::new();
    let mut encoded = Vec::new();

    for feature in features {
        if !customizer.filter_feature(feature, ctx) {
            continue;
        }

        let style = feature.style.as_ref().unwrap_or(layer_style);
        let symbolizers = style.symbolizers(feature.geometry.kind(), &feature.properties);
        if symbolizers.is_empty() {
            continue;
        }

        let mut properties = feature.properties.clone();
        properties.insert(STYLE_PROPERTY.to_string(), styles.id_for(symbolizers).into());

        encoded.push(json!({
            "type": "Feature",
            "geometry": feature.geometry.to_geojson(),
            "properties": properties,
        }));
    }

    if encoded.is_empty() {
        return None;
    }

    Some((
        json!({ "type": "FeatureCollection", "features": encoded }),
        styles.into_style(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extent::{PageSize, compute_extent};

    fn demo_style(fill: &str) -> VectorStyle {
        let fill = Fill {
            color: fill.parse().unwrap(),
        };
        let stroke = Stroke {
            color: "#002288".parse().unwrap(),
            width: 1.25,
            line_cap: None,
            line_dash: None,
        };
        VectorStyle {
            fill: Some(fill.clone()),
            stroke: Some(stroke.clone()),
            point: Some(PointStyle {
                radius: 5.0,
                fill: Some(fill),
                stroke: Some(stroke),
            }),
            text: Some(TextStyle {
                text: None,
                property: Some("name".to_string()),
                font: "12px sans-serif".to_string(),
                offset_x: 0.0,
                offset_y: 12.0,
                fill: None,
                stroke: None,
            }),
        }
    }

    fn layer(name: &str, source: LayerSource) -> LayerDescriptor {
        LayerDescriptor {
            name: name.to_string(),
            visible: true,
            opacity: 1.0,
            min_resolution: None,
            max_resolution: None,
            source,
        }
    }

    fn demo_view() -> MapView {
        let features = vec![
            Feature::new(Geometry::Polygon {
                coordinates: vec![vec![
                    [796612.0, 5837460.0],
                    [796812.0, 5837460.0],
                    [796812.0, 5837260.0],
                    [796612.0, 5837260.0],
                    [796612.0, 5837460.0],
                ]],
            })
            .with_property("name", "A polygon")
            .with_style(demo_style("rgba(255,155,50,0.4)")),
            Feature::new(Geometry::Circle {
                center: [796932.0, 5836860.0],
                radius: 75.0,
            })
            .with_property("name", "A Circle")
            .with_style(demo_style("rgba(0,0,0,0.4)")),
            Feature::new(Geometry::LineString {
                coordinates: vec![
                    [796712.0, 5836960.0],
                    [796712.0, 5836760.0],
                    [796812.0, 5836760.0],
                ],
            })
            .with_property("name", "A line"),
            Feature::new(Geometry::Point {
                coordinates: [796612.0, 5836960.0],
            })
            .with_property("name", "A point"),
        ];

        let mut wms_params = BTreeMap::new();
        wms_params.insert("LAYERS".to_string(), json!("ch.astra.wanderland-sperrungen_umleitungen"));
        wms_params.insert("FORMAT".to_string(), json!("image/png"));
        wms_params.insert("CRS".to_string(), json!("EPSG:4326"));
        wms_params.insert("TRANSPARENT".to_string(), json!(true));

        MapView {
            center: [796612.0, 5836960.0],
            scale: 50000.0,
            resolution: 38.21,
            dpi: 254,
            rotation: 0.0,
            projection: "EPSG:3857".to_string(),
            layers: vec![
                layer(
                    "osm",
                    LayerSource::Osm {
                        url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
                    },
                ),
                layer(
                    "features",
                    LayerSource::Vector {
                        features,
                        style: Some(demo_style("rgba(255, 0, 255, 0.4)")),
                    },
                ),
                layer(
                    "wms",
                    LayerSource::Wms {
                        url: "https://wms.geo.admin.ch/".to_string(),
                        params: wms_params,
                        server_type: None,
                        version: None,
                    },
                ),
            ],
        }
    }

    fn demo_extent(view: &MapView) -> PrintExtent {
        compute_extent(PageSize::millimetres(254.0, 675.0), view.center, view.scale).unwrap()
    }

    #[test]
    fn test_encode_demo_map() {
        let view = demo_view();
        let extent = demo_extent(&view);
        let map = encode_map(&view, &extent, &BaseCustomizer::new(extent)).unwrap();

        assert_eq!(map.dpi, 254);
        assert_eq!(map.scale, 50000.0);
        assert_eq!(map.center, Some([796612.0, 5836960.0]));
        assert!(map.extent.is_none());

        let names: Vec<_> = map.layers.iter().map(|l| l.name().unwrap()).collect();
        assert_eq!(names, ["osm", "features", "wms"]);

        let EncodedLayer::Wms(wms) = &map.layers[2] else {
            panic!("expected wms layer");
        };
        assert_eq!(wms.layers, ["ch.astra.wanderland-sperrungen_umleitungen"]);
        assert_eq!(wms.image_format, "image/png");
        assert_eq!(wms.custom_params["TRANSPARENT"], true);
        assert!(!wms.custom_params.contains_key("FORMAT"));
    }

    #[test]
    fn test_feature_styles_are_deduplicated() {
        let view = demo_view();
        let extent = demo_extent(&view);
        let map = encode_map(&view, &extent, &BaseCustomizer::new(extent)).unwrap();

        let EncodedLayer::Geojson(geojson) = &map.layers[1] else {
            panic!("expected geojson layer");
        };
        let features = geojson.geo_json["features"].as_array().unwrap();
        assert_eq!(features.len(), 4);
        assert_eq!(features[1]["geometry"]["type"], "Polygon");

        // polygon, circle, line and point each need their own rule
        let ids: Vec<_> = features
            .iter()
            .map(|f| f["properties"][STYLE_PROPERTY].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, ["1", "2", "3", "4"]);
        assert_eq!(geojson.style["version"], "2");
        assert_eq!(
            geojson.style["[_mfp_style = '1']"]["symbolizers"][1]["label"],
            "A polygon"
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let view = demo_view();
        let extent = demo_extent(&view);
        let customizer = CustomizerChain::new().with(ExtentClip);

        let first = PrintSpec::new(encode_map(&view, &extent, &customizer).unwrap(), "A4", "pdf");
        let second = PrintSpec::new(encode_map(&view, &extent, &customizer).unwrap(), "A4", "pdf");

        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_hidden_and_skipped_layers() {
        struct SkipWms;
        impl Customizer for SkipWms {
            fn adjust_layer(&self, layer: EncodedLayer, _ctx: &LayerContext<'_>) -> LayerAdjustment {
                match layer {
                    EncodedLayer::Wms(_) => LayerAdjustment::Skip,
                    other => LayerAdjustment::Keep(other),
                }
            }
        }

        let mut view = demo_view();
        view.layers[0].visible = false;
        let extent = demo_extent(&view);

        let map = encode_map(&view, &extent, &SkipWms).unwrap();
        let names: Vec<_> = map.layers.iter().map(|l| l.name().unwrap()).collect();
        assert_eq!(names, ["features"]);
    }

    #[test]
    fn test_features_outside_extent_are_dropped() {
        let mut view = demo_view();
        view.layers[1] = layer(
            "far away",
            LayerSource::Vector {
                features: vec![Feature::new(Geometry::Point {
                    coordinates: [0.0, 0.0],
                })],
                style: None,
            },
        );
        let extent = demo_extent(&view);

        let map = encode_map(&view, &extent, &ExtentClip).unwrap();
        assert!(map.layers.iter().all(|l| l.name() != Some("far away")));

        let map = encode_map(&view, &extent, &BaseCustomizer::new(extent)).unwrap();
        assert_eq!(map.layers[1].name(), Some("far away"));
    }

    #[test]
    fn test_extent_position_mode() {
        let view = demo_view();
        let extent = demo_extent(&view);
        let encoder = MapSpecEncoder::new(EncoderOptions {
            position: PositionMode::Extent,
        });

        let map = encoder.encode_map(&view, &extent, &BaseCustomizer::new(extent)).unwrap();
        assert!(map.center.is_none());
        assert_eq!(map.extent, Some(extent));
    }

    #[test]
    fn test_unsupported_layer_is_surfaced() {
        let mut view = demo_view();
        view.layers.push(layer(
            "mvt",
            LayerSource::VectorTile {
                url: "https://tiles.example.com/{z}/{x}/{y}.pbf".to_string(),
            },
        ));
        let extent = demo_extent(&view);

        let err = encode_map(&view, &extent, &BaseCustomizer::new(extent)).unwrap_err();
        assert!(matches!(
            err,
            PrintError::UnsupportedLayer { ref layer, ref kind } if layer == "mvt" && kind == "vector_tile"
        ));
    }

    #[test]
    fn test_invalid_view() {
        let mut view = demo_view();
        view.dpi = 0;
        let extent = PrintExtent::from([0.0, 0.0, 1.0, 1.0]);
        assert!(matches!(
            encode_map(&view, &extent, &BaseCustomizer::new(extent)),
            Err(PrintError::InvalidArgument(_))
        ));
    }
}
