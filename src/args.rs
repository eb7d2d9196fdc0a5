//! Request arguments.
//!
//! Arguments are a flat mapping from names to a closed set of primitive values. They are stored
//! sorted by name, so two [`Args`] built from the same pairs in a different order are equal and
//! produce the same canonical encoding.
//!
//! There is a single number kind: a float without a fractional part is stored as the
//! corresponding integer, so `42` and `42.0` are the same argument.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::{btree_map, BTreeMap};

/// Floats at or above this are out of `u64` range.
const U64_LIMIT: f64 = u64::MAX as f64;

/// Single argument value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawArgValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl<'de> Deserialize<'de> for ArgValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawArgValue::deserialize(deserializer)? {
            RawArgValue::Null => Self::Null,
            RawArgValue::Bool(value) => Self::Bool(value),
            RawArgValue::Number(value) => value.into(),
            RawArgValue::String(value) => Self::String(value),
        })
    }
}

/// Turn integral floats into integers. `-0.0` becomes `0`.
fn integral(number: Number) -> Number {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 => {
            if (0.0..U64_LIMIT).contains(&float) {
                Number::from(float as u64)
            } else if (i64::MIN as f64..0.0).contains(&float) {
                Number::from(float as i64)
            } else {
                number
            }
        }
        _ => number,
    }
}

impl ArgValue {
    /// Text used when this value is sent as a form field.
    pub fn to_form_value(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::String(value) => value.clone(),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(value) => JsonValue::Bool(*value),
            Self::Number(value) => JsonValue::Number(value.clone()),
            Self::String(value) => JsonValue::String(value.clone()),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Non-finite floats have no JSON representation and become [`ArgValue::Null`].
impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Self::Null, Into::into)
    }
}

impl From<Number> for ArgValue {
    fn from(value: Number) -> Self {
        Self::Number(integral(value))
    }
}

macro_rules! arg_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for ArgValue {
                fn from(value: $ty) -> Self {
                    Self::Number(Number::from(value))
                }
            }
        )*
    };
}

arg_from_integer!(i32, i64, u32, u64);

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Named arguments of a remote operation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(BTreeMap<String, ArgValue>);

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert an argument, returning the previous value under that name.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ArgValue>,
    ) -> Option<ArgValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ArgValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical encoding: compact JSON with keys in sorted order.
    pub fn canonical(&self) -> String {
        let object: Map<String, JsonValue> = self
            .0
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        // serde_json's map is ordered by key unless `preserve_order` is enabled, and our
        // iteration is already sorted, so the output is stable in both configurations.
        JsonValue::Object(object).to_string()
    }
}

impl<'a> IntoIterator for &'a Args {
    type Item = (&'a String, &'a ArgValue);
    type IntoIter = btree_map::Iter<'a, String, ArgValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}
