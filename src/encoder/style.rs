//! Vector styling and its translation into MapFish "version 2" style rules.
//!
//! Every distinct set of symbolizers becomes one rule keyed by a filter on the
//! `_mfp_style` feature property:
//!
//! ```json
//! {
//!   "version": "2",
//!   "[_mfp_style = '1']": { "symbolizers": [ { "type": "polygon", ... } ] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::types::{GeometryKind, Properties};

/// Feature property that links a feature to its style rule.
pub const STYLE_PROPERTY: &str = "_mfp_style";

#[derive(Debug, Error, PartialEq)]
pub enum ColorError {
    #[error("unrecognised color: {0}")]
    Unrecognised(String),
    #[error("color needs 3 or 4 components, got {0}")]
    ComponentCount(usize),
}

/// RGBA color; channels are 0-255, alpha is 0.0-1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "ColorRepr", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColorRepr {
    Text(String),
    Components(Vec<f64>),
}

impl TryFrom<ColorRepr> for Color {
    type Error = ColorError;

    fn try_from(value: ColorRepr) -> Result<Self, Self::Error> {
        match value {
            ColorRepr::Text(s) => s.parse(),
            ColorRepr::Components(c) => Color::from_components(&c),
        }
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    fn from_components(c: &[f64]) -> Result<Self, ColorError> {
        let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        match c {
            [r, g, b] => Ok(Self::rgba(channel(*r), channel(*g), channel(*b), 1.0)),
            [r, g, b, a] => Ok(Self::rgba(
                channel(*r),
                channel(*g),
                channel(*b),
                a.clamp(0.0, 1.0),
            )),
            other => Err(ColorError::ComponentCount(other.len())),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let unrecognised = || ColorError::Unrecognised(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            let digits: Vec<u8> = match hex.len() {
                3 | 4 => hex
                    .chars()
                    .map(|c| c.to_digit(16).map(|d| (d * 17) as u8))
                    .collect::<Option<_>>()
                    .ok_or_else(unrecognised)?,
                6 | 8 => (0..hex.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
                    .collect::<Option<_>>()
                    .ok_or_else(unrecognised)?,
                _ => return Err(unrecognised()),
            };
            let alpha = digits.get(3).map_or(1.0, |a| *a as f64 / 255.0);
            return Ok(Self::rgba(digits[0], digits[1], digits[2], alpha));
        }

        let lower = s.to_ascii_lowercase();
        let inner = lower
            .strip_prefix("rgba(")
            .or_else(|| lower.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(unrecognised)?;
        let components = inner
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| unrecognised())?;
        Self::from_components(&components)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fill {
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Stroke {
    pub color: Color,
    #[serde(default = "default_stroke_width")]
    pub width: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_cap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dash: Option<Vec<f64>>,
}

fn default_stroke_width() -> f64 {
    1.0
}

/// Circle marker drawn for point geometries.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PointStyle {
    pub radius: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextStyle {
    /// Literal label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Feature property used as label when `text` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default)]
    pub offset_x: f64,
    #[serde(default)]
    pub offset_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
}

fn default_font() -> String {
    "10px sans-serif".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct VectorStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<Fill>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<Stroke>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<PointStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextStyle>,
}

impl VectorStyle {
    /// Style applied to features that carry none, matching the default look
    /// of web map vector layers.
    pub fn fallback() -> Self {
        let fill = Fill {
            color: Color::rgba(255, 255, 255, 0.4),
        };
        let stroke = Stroke {
            color: Color::rgba(0x33, 0x99, 0xcc, 1.0),
            width: 1.25,
            line_cap: None,
            line_dash: None,
        };
        Self {
            fill: Some(fill.clone()),
            stroke: Some(stroke.clone()),
            point: Some(PointStyle {
                radius: 5.0,
                fill: Some(fill),
                stroke: Some(stroke),
            }),
            text: None,
        }
    }

    /// Symbolizers that draw a geometry of `kind` with this style.
    pub fn symbolizers(&self, kind: GeometryKind, properties: &Properties) -> Vec<Value> {
        let mut out = Vec::new();

        match kind {
            GeometryKind::Point => {
                if let Some(point) = &self.point {
                    let mut sym = Map::new();
                    sym.insert("type".into(), "point".into());
                    sym.insert("graphicName".into(), "circle".into());
                    sym.insert("pointRadius".into(), json!(point.radius));
                    put_fill(&mut sym, point.fill.as_ref());
                    put_stroke(&mut sym, point.stroke.as_ref());
                    out.push(Value::Object(sym));
                }
            }
            GeometryKind::Line => {
                if let Some(stroke) = &self.stroke {
                    let mut sym = Map::new();
                    sym.insert("type".into(), "line".into());
                    put_stroke(&mut sym, Some(stroke));
                    out.push(Value::Object(sym));
                }
            }
            GeometryKind::Polygon => {
                if self.fill.is_some() || self.stroke.is_some() {
                    let mut sym = Map::new();
                    sym.insert("type".into(), "polygon".into());
                    put_fill(&mut sym, self.fill.as_ref());
                    put_stroke(&mut sym, self.stroke.as_ref());
                    out.push(Value::Object(sym));
                }
            }
        }

        if let Some(text) = &self.text {
            if let Some(sym) = text_symbolizer(text, properties) {
                out.push(sym);
            }
        }

        out
    }
}

fn put_fill(sym: &mut Map<String, Value>, fill: Option<&Fill>) {
    match fill {
        Some(fill) => {
            sym.insert("fillColor".into(), fill.color.to_hex().into());
            sym.insert("fillOpacity".into(), json!(fill.color.a));
        }
        None => {
            sym.insert("fillOpacity".into(), json!(0.0));
        }
    }
}

fn put_stroke(sym: &mut Map<String, Value>, stroke: Option<&Stroke>) {
    match stroke {
        Some(stroke) => {
            sym.insert("strokeColor".into(), stroke.color.to_hex().into());
            sym.insert("strokeOpacity".into(), json!(stroke.color.a));
            sym.insert("strokeWidth".into(), json!(stroke.width));
            if let Some(cap) = &stroke.line_cap {
                sym.insert("strokeLinecap".into(), cap.clone().into());
            }
            if let Some(dash) = &stroke.line_dash {
                let pattern: Vec<String> = dash.iter().map(|d| d.to_string()).collect();
                sym.insert("strokeDashstyle".into(), pattern.join(" ").into());
            }
        }
        None => {
            sym.insert("strokeOpacity".into(), json!(0.0));
        }
    }
}

fn text_symbolizer(text: &TextStyle, properties: &Properties) -> Option<Value> {
    let label = match (&text.text, &text.property) {
        (Some(literal), _) => literal.clone(),
        (None, Some(property)) => match properties.get(property)? {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        },
        (None, None) => return None,
    };
    if label.is_empty() {
        return None;
    }

    let font = FontSpec::parse(&text.font);
    let mut sym = Map::new();
    sym.insert("type".into(), "text".into());
    sym.insert("label".into(), label.into());
    sym.insert("fontFamily".into(), font.family.into());
    sym.insert("fontSize".into(), font.size.into());
    sym.insert("fontWeight".into(), font.weight.into());
    sym.insert("fontStyle".into(), font.style.into());
    sym.insert("labelXOffset".into(), json!(text.offset_x));
    // screen offsets grow downwards, print offsets grow upwards
    sym.insert("labelYOffset".into(), json!(-text.offset_y));
    if let Some(fill) = &text.fill {
        sym.insert("fontColor".into(), fill.color.to_hex().into());
        sym.insert("fontOpacity".into(), json!(fill.color.a));
    }
    if let Some(halo) = &text.stroke {
        sym.insert("haloColor".into(), halo.color.to_hex().into());
        sym.insert("haloOpacity".into(), json!(halo.color.a));
        sym.insert("haloRadius".into(), json!(halo.width));
    }
    Some(Value::Object(sym))
}

/// CSS font shorthand split into the parts print symbolizers want.
struct FontSpec {
    family: String,
    size: String,
    weight: String,
    style: String,
}

impl FontSpec {
    fn parse(font: &str) -> Self {
        let mut spec = FontSpec {
            family: String::new(),
            size: "10px".to_string(),
            weight: "normal".to_string(),
            style: "normal".to_string(),
        };
        let mut family = Vec::new();

        for token in font.split_whitespace() {
            let lower = token.to_ascii_lowercase();
            if lower.ends_with("px") || lower.ends_with("pt") {
                spec.size = lower;
            } else if lower == "bold" || lower == "bolder" || lower.parse::<u16>().is_ok() {
                spec.weight = lower;
            } else if lower == "italic" || lower == "oblique" {
                spec.style = lower;
            } else if lower != "normal" {
                family.push(token);
            }
        }

        spec.family = if family.is_empty() {
            "sans-serif".to_string()
        } else {
            family.join(" ")
        };
        spec
    }
}

/// Deduplicates symbolizer sets into numbered style rules.
#[derive(Debug, Default)]
pub struct StyleCollector {
    rules: Vec<Vec<Value>>,
}

impl StyleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rule id (1-based, in order of first appearance) for `symbolizers`.
    pub fn id_for(&mut self, symbolizers: Vec<Value>) -> String {
        let index = match self.rules.iter().position(|r| *r == symbolizers) {
            Some(index) => index,
            None => {
                self.rules.push(symbolizers);
                self.rules.len() - 1
            }
        };
        (index + 1).to_string()
    }

    pub fn into_style(self) -> Value {
        let mut style = Map::new();
        style.insert("version".into(), "2".into());
        for (index, symbolizers) in self.rules.into_iter().enumerate() {
            style.insert(
                format!("[{STYLE_PROPERTY} = '{}']", index + 1),
                json!({ "symbolizers": symbolizers }),
            );
        }
        Value::Object(style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#f7001d".parse::<Color>().unwrap(), Color::rgba(0xf7, 0, 0x1d, 1.0));
        assert_eq!("#f00".parse::<Color>().unwrap(), Color::rgba(255, 0, 0, 1.0));
        assert_eq!(
            "rgba(255, 0, 255, 0.4)".parse::<Color>().unwrap(),
            Color::rgba(255, 0, 255, 0.4)
        );
        assert_eq!(
            "rgba(255,155,50,0.4)".parse::<Color>().unwrap(),
            Color::rgba(255, 155, 50, 0.4)
        );
        assert!("blue".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
    }

    #[test]
    fn test_deserialize_color_array() {
        let fill: Fill = serde_json::from_str(r#"{"color": [247, 0, 29, 0.7]}"#).unwrap();
        assert_eq!(fill.color, Color::rgba(247, 0, 29, 0.7));
        assert_eq!(fill.color.to_hex(), "#f7001d");

        let bad: Result<Fill, _> = serde_json::from_str(r#"{"color": [1, 2]}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_polygon_symbolizer() {
        let style = VectorStyle {
            fill: Some(Fill {
                color: "rgba(255,155,50,0.4)".parse().unwrap(),
            }),
            stroke: Some(Stroke {
                color: "#002288".parse().unwrap(),
                width: 1.25,
                line_cap: None,
                line_dash: None,
            }),
            ..Default::default()
        };

        let symbolizers = style.symbolizers(GeometryKind::Polygon, &Properties::new());
        assert_eq!(symbolizers.len(), 1);
        assert_eq!(symbolizers[0]["type"], "polygon");
        assert_eq!(symbolizers[0]["fillColor"], "#ff9b32");
        assert_eq!(symbolizers[0]["fillOpacity"], 0.4);
        assert_eq!(symbolizers[0]["strokeColor"], "#002288");
        assert_eq!(symbolizers[0]["strokeWidth"], 1.25);
    }

    #[test]
    fn test_text_from_property() {
        let style = VectorStyle {
            text: Some(TextStyle {
                text: None,
                property: Some("name".to_string()),
                font: "bold 12px Arial Narrow".to_string(),
                offset_x: 0.0,
                offset_y: 12.0,
                fill: None,
                stroke: None,
            }),
            ..Default::default()
        };
        let mut props = Properties::new();
        props.insert("name".into(), "A point".into());

        let symbolizers = style.symbolizers(GeometryKind::Point, &props);
        assert_eq!(symbolizers.len(), 1);
        let text = &symbolizers[0];
        assert_eq!(text["label"], "A point");
        assert_eq!(text["fontSize"], "12px");
        assert_eq!(text["fontWeight"], "bold");
        assert_eq!(text["fontFamily"], "Arial Narrow");
        assert_eq!(text["labelYOffset"], -12.0);

        assert!(style.symbolizers(GeometryKind::Point, &Properties::new()).is_empty());
    }

    #[test]
    fn test_collector_dedups_rules() {
        let mut collector = StyleCollector::new();
        let a = vec![json!({"type": "line", "strokeColor": "#000000"})];
        let b = vec![json!({"type": "line", "strokeColor": "#ffffff"})];

        assert_eq!(collector.id_for(a.clone()), "1");
        assert_eq!(collector.id_for(b), "2");
        assert_eq!(collector.id_for(a), "1");

        let style = collector.into_style();
        assert_eq!(style["version"], "2");
        assert_eq!(style["[_mfp_style = '2']"]["symbolizers"][0]["strokeColor"], "#ffffff");
    }
}
