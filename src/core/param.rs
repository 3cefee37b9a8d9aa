//! Parameter model for hit construction.
//!
//! A [`Param`] is a key plus one or more value sources. Sources are evaluated
//! at build time, so computed values (timestamps, user ids) always reflect the
//! moment the hit is assembled rather than the moment the parameter was set.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Default separator used when joining appended values and array items.
pub const DEFAULT_SEPARATOR: &str = ",";

/// A concrete parameter value, produced by evaluating a [`ValueSource`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    Array(Vec<ParamValue>),
}

impl ParamValue {
    /// Render the value as it should appear in a query string (before encoding).
    pub fn render(&self, separator: &str) -> String {
        match self {
            ParamValue::Str(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Json(v) => v.to_string(),
            ParamValue::Array(items) => items
                .iter()
                .map(|item| item.render(separator))
                .collect::<Vec<_>>()
                .join(separator),
        }
    }

    /// Whether this value participates in JSON deep-merging.
    pub fn is_json(&self) -> bool {
        matches!(self, ParamValue::Json(Value::Object(_)) | ParamValue::Json(Value::Array(_)))
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<i32> for ParamValue {
    fn from(i: i32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<f64> for ParamValue {
    fn from(f: f64) -> Self {
        ParamValue::Float(f)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Json(v)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        ParamValue::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Function producing a value at build time.
pub type ValueProducer = Arc<dyn Fn() -> ParamValue + Send + Sync>;

/// Where a parameter value comes from.
#[derive(Clone)]
pub enum ValueSource {
    /// Fixed value captured when the parameter was set.
    Literal(ParamValue),
    /// Value recomputed every time a hit is built.
    Computed(ValueProducer),
}

impl ValueSource {
    /// Build a computed source from a closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> ParamValue + Send + Sync + 'static,
    {
        ValueSource::Computed(Arc::new(f))
    }

    /// Evaluate the source.
    pub fn evaluate(&self) -> ParamValue {
        match self {
            ValueSource::Literal(v) => v.clone(),
            ValueSource::Computed(f) => f(),
        }
    }
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ValueSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

macro_rules! literal_source_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for ValueSource {
                fn from(v: $ty) -> Self {
                    ValueSource::Literal(v.into())
                }
            }
        )*
    };
}

literal_source_from!(
    ParamValue,
    &str,
    String,
    i64,
    i32,
    f64,
    bool,
    Value,
    Vec<&str>,
    Vec<String>,
    Vec<ParamValue>,
);

/// Position constraint applied when ordering parameters in a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativePosition {
    #[default]
    None,
    First,
    Last,
}

/// Options controlling how a parameter is stored and serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamOption {
    /// Survives across hits (persistent slot) instead of being one-shot.
    pub persistent: bool,
    /// Adds a new value source instead of replacing existing ones.
    pub append: bool,
    /// Percent-encode the value and its separator.
    pub encode: bool,
    /// Separator used between appended values.
    pub separator: String,
    pub relative_position: RelativePosition,
}

impl Default for ParamOption {
    fn default() -> Self {
        Self {
            persistent: false,
            append: false,
            encode: false,
            separator: DEFAULT_SEPARATOR.to_string(),
            relative_position: RelativePosition::None,
        }
    }
}

impl ParamOption {
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn append(mut self) -> Self {
        self.append = true;
        self
    }

    pub fn encode(mut self) -> Self {
        self.encode = true;
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn first(mut self) -> Self {
        self.relative_position = RelativePosition::First;
        self
    }

    pub fn last(mut self) -> Self {
        self.relative_position = RelativePosition::Last;
        self
    }
}

/// A single hit parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub key: String,
    pub values: Vec<ValueSource>,
    pub options: ParamOption,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<ValueSource>, options: ParamOption) -> Self {
        Self {
            key: key.into(),
            values: vec![value.into()],
            options,
        }
    }

    /// Evaluate every value source in order.
    pub fn evaluate(&self) -> Vec<ParamValue> {
        self.values.iter().map(ValueSource::evaluate).collect()
    }
}
