use serde_json::Value;
use url::Url;

use super::customizer::{Customizer, LayerAdjustment, LayerContext};
use super::spec::EncodedLayer;
use super::types::Feature;
use crate::extent::PrintExtent;

/// Customizer that keeps every layer as encoded.
///
/// It remembers the print extent so callers that only need the default
/// behaviour still have it at hand.
#[derive(Debug, Clone)]
pub struct BaseCustomizer {
    print_extent: PrintExtent,
}

impl BaseCustomizer {
    pub fn new(print_extent: PrintExtent) -> Self {
        Self { print_extent }
    }

    pub fn print_extent(&self) -> &PrintExtent {
        &self.print_extent
    }
}

impl Customizer for BaseCustomizer {
    fn adjust_layer(&self, layer: EncodedLayer, _ctx: &LayerContext<'_>) -> LayerAdjustment {
        LayerAdjustment::Keep(layer)
    }
}

/// Restricts what is sent to the printed extent: WMS requests get a `BBOX`
/// matching the page, vector features entirely off the page are dropped.
#[derive(Debug, Clone, Default)]
pub struct ExtentClip;

impl Customizer for ExtentClip {
    fn adjust_layer(&self, layer: EncodedLayer, ctx: &LayerContext<'_>) -> LayerAdjustment {
        match layer {
            EncodedLayer::Wms(mut wms) => {
                let bbox = ctx
                    .extent
                    .to_array()
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                wms.custom_params.insert("BBOX".to_string(), Value::String(bbox));
                LayerAdjustment::Keep(EncodedLayer::Wms(wms))
            }
            other => LayerAdjustment::Keep(other),
        }
    }

    fn filter_feature(&self, feature: &Feature, ctx: &LayerContext<'_>) -> bool {
        feature
            .geometry
            .bbox()
            .is_some_and(|bbox| bbox.intersects(ctx.extent))
    }
}

/// Appends an access token as a query parameter to every remote layer URL.
#[derive(Debug, Clone)]
pub struct TokenInjector {
    param: String,
    token: String,
}

impl TokenInjector {
    pub fn new(param: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            token: token.into(),
        }
    }
}

impl Customizer for TokenInjector {
    fn adjust_layer(&self, mut layer: EncodedLayer, ctx: &LayerContext<'_>) -> LayerAdjustment {
        if let Some(base_url) = layer.base_url_mut() {
            match Url::parse(base_url) {
                Ok(mut url) => {
                    url.query_pairs_mut().append_pair(&self.param, &self.token);
                    // keep tile placeholders like {z} readable for the renderer
                    *base_url = url
                        .as_str()
                        .replace("%7B", "{")
                        .replace("%7D", "}");
                }
                Err(e) => {
                    tracing::warn!(layer = ctx.layer_name, error = %e, "Layer URL not parseable, token not added");
                }
            }
        }
        LayerAdjustment::Keep(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::spec::{TileLayer, WmsLayer};
    use crate::encoder::types::Geometry;
    use std::collections::BTreeMap;

    fn ctx(extent: &PrintExtent) -> LayerContext<'_> {
        LayerContext {
            extent,
            scale: 50000.0,
            dpi: 254,
            resolution: 10.0,
            rotation: 0.0,
            projection: "EPSG:3857",
            layer_name: "test",
        }
    }

    fn wms() -> EncodedLayer {
        EncodedLayer::Wms(WmsLayer {
            base_url: "https://wms.geo.admin.ch/".to_string(),
            layers: vec!["ch.astra.wanderland-sperrungen_umleitungen".to_string()],
            image_format: "image/png".to_string(),
            custom_params: BTreeMap::new(),
            styles: vec![],
            server_type: None,
            version: None,
            opacity: 1.0,
            name: None,
        })
    }

    #[test]
    fn test_base_customizer_keeps_layers() {
        let extent = PrintExtent::from([0.0, 0.0, 10.0, 10.0]);
        let customizer = BaseCustomizer::new(extent);
        assert_eq!(customizer.adjust_layer(wms(), &ctx(&extent)), LayerAdjustment::Keep(wms()));
        assert_eq!(customizer.print_extent(), &extent);
    }

    #[test]
    fn test_extent_clip_sets_wms_bbox() {
        let extent = PrintExtent::from([1.0, 2.0, 3.5, 4.0]);
        let LayerAdjustment::Keep(EncodedLayer::Wms(layer)) = ExtentClip.adjust_layer(wms(), &ctx(&extent))
        else {
            panic!("expected WMS layer");
        };
        assert_eq!(layer.custom_params["BBOX"], "1,2,3.5,4");
    }

    #[test]
    fn test_extent_clip_filters_features() {
        let extent = PrintExtent::from([0.0, 0.0, 10.0, 10.0]);
        let inside = Feature::new(Geometry::Point {
            coordinates: [5.0, 5.0],
        });
        let outside = Feature::new(Geometry::Point {
            coordinates: [50.0, 5.0],
        });
        let overlapping = Feature::new(Geometry::Circle {
            center: [12.0, 5.0],
            radius: 3.0,
        });

        assert!(ExtentClip.filter_feature(&inside, &ctx(&extent)));
        assert!(!ExtentClip.filter_feature(&outside, &ctx(&extent)));
        assert!(ExtentClip.filter_feature(&overlapping, &ctx(&extent)));
    }

    #[test]
    fn test_token_injector_keeps_placeholders() {
        let extent = PrintExtent::from([0.0, 0.0, 10.0, 10.0]);
        let layer = EncodedLayer::Osm(TileLayer {
            base_url: "https://tiles.example.com/{z}/{x}/{y}.png".to_string(),
            image_extension: "png".to_string(),
            opacity: 1.0,
            name: None,
        });

        let LayerAdjustment::Keep(EncodedLayer::Osm(tile)) =
            TokenInjector::new("key", "s3cr3t").adjust_layer(layer, &ctx(&extent))
        else {
            panic!("expected tile layer");
        };
        assert_eq!(tile.base_url, "https://tiles.example.com/{z}/{x}/{y}.png?key=s3cr3t");
    }
}
