use super::spec::EncodedLayer;
use super::types::Feature;
use crate::extent::PrintExtent;

/// Print parameters a customizer may base its decisions on.
#[derive(Debug, Clone, Copy)]
pub struct LayerContext<'a> {
    pub extent: &'a PrintExtent,
    pub scale: f64,
    pub dpi: u32,
    pub resolution: f64,
    pub rotation: f64,
    pub projection: &'a str,
    pub layer_name: &'a str,
}

/// What to do with an encoded layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerAdjustment {
    Keep(EncodedLayer),
    Skip,
}

/// Per-layer adjustment strategy applied while a map is encoded.
///
/// Customizers only see serialized descriptions; they must not perform I/O.
pub trait Customizer: Send + Sync {
    /// Return the (possibly rewritten) layer, or `Skip` to leave it out of the print
    fn adjust_layer(&self, layer: EncodedLayer, ctx: &LayerContext<'_>) -> LayerAdjustment;

    /// Decide whether a vector feature is written at all
    fn filter_feature(&self, _feature: &Feature, _ctx: &LayerContext<'_>) -> bool {
        true
    }
}

/// Applies several customizers in order. A `Skip` from any member ends the
/// chain for that layer.
#[derive(Default)]
pub struct CustomizerChain {
    members: Vec<Box<dyn Customizer>>,
}

impl CustomizerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, customizer: impl Customizer + 'static) -> Self {
        self.members.push(Box::new(customizer));
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Customizer for CustomizerChain {
    fn adjust_layer(&self, layer: EncodedLayer, ctx: &LayerContext<'_>) -> LayerAdjustment {
        let mut current = layer;
        for member in &self.members {
            match member.adjust_layer(current, ctx) {
                LayerAdjustment::Keep(next) => current = next,
                LayerAdjustment::Skip => return LayerAdjustment::Skip,
            }
        }
        LayerAdjustment::Keep(current)
    }

    fn filter_feature(&self, feature: &Feature, ctx: &LayerContext<'_>) -> bool {
        self.members.iter().all(|m| m.filter_feature(feature, ctx))
    }
}
