//! Style rules: ordered (filter, symbol) pairs evaluated first-match-wins
//!
//! Filters use the familiar JSON array grammar (`["==", "kind", "school"]`, `["all", ..]`, ...)
//! and are compiled once into a [`Filter`] tree. Classification is a linear scan over the
//! rule list; a feature that matches no rule is not drawn.

use crate::{Feature, LayerError, Properties, Result};
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Fill used for extrusions whose symbol declares no polygon fill
const DEFAULT_POLYGON_FILL: Color = Color([128, 128, 128, 255]);

/// An RGBA color with 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const TRANSPARENT: Color = Color([0, 0, 0, 0]);

    /// Color with its alpha multiplied by `opacity` (clamped to 0..=1)
    pub fn with_opacity(self, opacity: f32) -> Self {
        let [r, g, b, a] = self.0;
        let a = (a as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
        Color([r, g, b, a])
    }

    /// Channels normalized to 0..=1
    pub fn to_f32(self) -> [f32; 4] {
        self.0.map(|c| c as f32 / 255.0)
    }
}

impl FromStr for Color {
    type Err = LayerError;

    /// Parses `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)` and `rgba(r, g, b, a)`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || LayerError::InvalidColor(s.to_string());

        if let Some(hex) = s.strip_prefix('#') {
            let digits: Vec<u8> = hex
                .chars()
                .map(|c| c.to_digit(16).map(|d| d as u8))
                .collect::<Option<_>>()
                .ok_or_else(invalid)?;
            return match digits.as_slice() {
                [r, g, b] => Ok(Color([r * 17, g * 17, b * 17, 255])),
                [r1, r0, g1, g0, b1, b0] => Ok(Color([
                    r1 * 16 + r0,
                    g1 * 16 + g0,
                    b1 * 16 + b0,
                    255,
                ])),
                [r1, r0, g1, g0, b1, b0, a1, a0] => Ok(Color([
                    r1 * 16 + r0,
                    g1 * 16 + g0,
                    b1 * 16 + b0,
                    a1 * 16 + a0,
                ])),
                _ => Err(invalid()),
            };
        }

        let body = s
            .strip_prefix("rgba(")
            .or_else(|| s.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let parts: Vec<f32> = body
            .split(',')
            .map(|p| p.trim().parse::<f32>().ok())
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;
        let channel = |v: f32| v.clamp(0.0, 255.0).round() as u8;
        match parts.as_slice() {
            [r, g, b] => Ok(Color([channel(*r), channel(*g), channel(*b), 255])),
            [r, g, b, a] => Ok(Color([
                channel(*r),
                channel(*g),
                channel(*b),
                (a.clamp(0.0, 1.0) * 255.0).round() as u8,
            ])),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        let [r, g, b, a] = color.0;
        format!("#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

/// Vector marker shapes the default rasterizer can draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum MarkerType {
    #[default]
    Ellipse,
    #[cfg_attr(feature = "serde", serde(alias = "square"))]
    Rectangle,
    Triangle,
    Diamond,
    Cross,
}

/// Visual definition of a style rule
///
/// Marker properties drive point sprites, polygon properties drive extrusion fills.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "camelCase", default)
)]
pub struct Symbol {
    pub marker_type: Option<MarkerType>,
    /// Path or URL of an icon image
    pub marker_file: Option<String>,
    pub marker_fill: Option<Color>,
    pub marker_fill_opacity: Option<f32>,
    pub marker_line_color: Option<Color>,
    pub marker_line_width: Option<f32>,
    pub marker_line_opacity: Option<f32>,
    pub marker_width: Option<f32>,
    pub marker_height: Option<f32>,
    /// Horizontal placement offset in pixels
    pub marker_dx: f32,
    /// Vertical placement offset in pixels
    pub marker_dy: f32,
    pub marker_opacity: Option<f32>,
    pub polygon_fill: Option<Color>,
    pub polygon_opacity: Option<f32>,
}

impl Symbol {
    /// Whether the marker part of the symbol would produce any pixels
    pub fn has_marker(&self) -> bool {
        if self.marker_file.is_some() {
            return true;
        }
        let stroked = self.marker_line_color.is_some()
            && self.marker_line_width.unwrap_or(1.0) > 0.0;
        self.marker_type.is_some() && (self.marker_fill.is_some() || stroked)
    }

    /// Fill color for extrusions, opacity applied
    pub fn polygon_color(&self) -> Color {
        self.polygon_fill
            .unwrap_or(DEFAULT_POLYGON_FILL)
            .with_opacity(self.polygon_opacity.unwrap_or(1.0))
    }
}

/// Comparison operators of the filter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A compiled feature filter
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Value", into = "Value")
)]
pub enum Filter {
    /// `true` / `false`
    Constant(bool),
    All(Vec<Filter>),
    Any(Vec<Filter>),
    NoneOf(Vec<Filter>),
    Compare {
        op: CompareOp,
        key: String,
        value: Value,
    },
    In {
        key: String,
        values: Vec<Value>,
        negate: bool,
    },
    Has {
        key: String,
        negate: bool,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Constant(true)
    }
}

impl Filter {
    /// Compile a filter from its JSON array form
    pub fn from_json(value: &Value) -> Result<Self> {
        let invalid = |reason: &str| LayerError::InvalidFilter(format!("{reason}: {value}"));

        let items = match value {
            Value::Bool(b) => return Ok(Filter::Constant(*b)),
            Value::Null => return Ok(Filter::Constant(true)),
            Value::Array(items) => items,
            _ => return Err(invalid("expected an array")),
        };
        let (op, args) = items.split_first().ok_or_else(|| invalid("empty filter"))?;
        let op = op.as_str().ok_or_else(|| invalid("operator must be a string"))?;

        let key = || -> Result<String> {
            args.first()
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid("missing property key"))
        };
        let children = || -> Result<Vec<Filter>> { args.iter().map(Filter::from_json).collect() };
        let compare = |op: CompareOp| -> Result<Filter> {
            match args {
                [_, value] => Ok(Filter::Compare {
                    op,
                    key: key()?,
                    value: value.clone(),
                }),
                _ => Err(invalid("comparison takes a key and a value")),
            }
        };

        match op {
            "all" => Ok(Filter::All(children()?)),
            "any" => Ok(Filter::Any(children()?)),
            "none" => Ok(Filter::NoneOf(children()?)),
            "==" => compare(CompareOp::Eq),
            "!=" => compare(CompareOp::Ne),
            "<" => compare(CompareOp::Lt),
            "<=" => compare(CompareOp::Le),
            ">" => compare(CompareOp::Gt),
            ">=" => compare(CompareOp::Ge),
            "in" | "!in" => Ok(Filter::In {
                key: key()?,
                values: args[1..].to_vec(),
                negate: op == "!in",
            }),
            "has" | "!has" => Ok(Filter::Has {
                key: key()?,
                negate: op == "!has",
            }),
            other => Err(LayerError::InvalidFilter(format!(
                "unknown operator {other:?}"
            ))),
        }
    }

    /// JSON array form of the filter
    pub fn to_json(&self) -> Value {
        match self {
            Filter::Constant(b) => Value::Bool(*b),
            Filter::All(children) => combinator("all", children),
            Filter::Any(children) => combinator("any", children),
            Filter::NoneOf(children) => combinator("none", children),
            Filter::Compare { op, key, value } => Value::Array(vec![
                Value::from(op.token()),
                Value::from(key.as_str()),
                value.clone(),
            ]),
            Filter::In {
                key,
                values,
                negate,
            } => {
                let mut items = vec![
                    Value::from(if *negate { "!in" } else { "in" }),
                    Value::from(key.as_str()),
                ];
                items.extend(values.iter().cloned());
                Value::Array(items)
            }
            Filter::Has { key, negate } => Value::Array(vec![
                Value::from(if *negate { "!has" } else { "has" }),
                Value::from(key.as_str()),
            ]),
        }
    }

    /// Evaluate the filter against a property bag
    pub fn evaluate(&self, properties: &Properties) -> bool {
        match self {
            Filter::Constant(b) => *b,
            Filter::All(children) => children.iter().all(|f| f.evaluate(properties)),
            Filter::Any(children) => children.iter().any(|f| f.evaluate(properties)),
            Filter::NoneOf(children) => !children.iter().any(|f| f.evaluate(properties)),
            Filter::Compare { op, key, value } => {
                let actual = properties.get(key);
                match op {
                    CompareOp::Eq => actual.is_some_and(|a| values_equal(a, value)),
                    CompareOp::Ne => !actual.is_some_and(|a| values_equal(a, value)),
                    _ => match actual.and_then(|a| compare_values(a, value)) {
                        Some(ordering) => match op {
                            CompareOp::Lt => ordering == Ordering::Less,
                            CompareOp::Le => ordering != Ordering::Greater,
                            CompareOp::Gt => ordering == Ordering::Greater,
                            CompareOp::Ge => ordering != Ordering::Less,
                            CompareOp::Eq | CompareOp::Ne => unreachable!(),
                        },
                        None => false,
                    },
                }
            }
            Filter::In {
                key,
                values,
                negate,
            } => {
                let found = properties
                    .get(key)
                    .is_some_and(|a| values.iter().any(|v| values_equal(a, v)));
                found != *negate
            }
            Filter::Has { key, negate } => properties.contains_key(key) != *negate,
        }
    }
}

impl TryFrom<Value> for Filter {
    type Error = LayerError;

    fn try_from(value: Value) -> Result<Self> {
        Filter::from_json(&value)
    }
}

impl From<Filter> for Value {
    fn from(filter: Filter) -> Self {
        filter.to_json()
    }
}

fn combinator(op: &str, children: &[Filter]) -> Value {
    let mut items = vec![Value::from(op)];
    items.extend(children.iter().map(Filter::to_json));
    Value::Array(items)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// One (filter, symbol) pair
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct StyleRule {
    pub filter: Filter,
    pub symbol: Symbol,
}

impl StyleRule {
    pub fn new(filter: Filter, symbol: Symbol) -> Self {
        Self { filter, symbol }
    }
}

/// Ordered list of style rules
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Styles {
    rules: Vec<StyleRule>,
}

impl Styles {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[StyleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Index of the first rule whose filter matches, if any
    pub fn classify(&self, properties: &Properties) -> Option<usize> {
        self.rules
            .iter()
            .position(|rule| rule.filter.evaluate(properties))
    }

    /// Classify a feature; features without properties see an empty property bag
    pub fn classify_feature(&self, feature: &Feature) -> Option<usize> {
        match feature.properties() {
            Some(properties) => self.classify(properties),
            None => self.classify(&Properties::new()),
        }
    }

    /// One normalized RGBA quadruple per rule, in rule order
    pub fn fill_styles_uniform(&self) -> Vec<f32> {
        self.rules
            .iter()
            .flat_map(|rule| rule.symbol.polygon_color().to_f32())
            .collect()
    }
}

impl From<Vec<StyleRule>> for Styles {
    fn from(rules: Vec<StyleRule>) -> Self {
        Self::new(rules)
    }
}
