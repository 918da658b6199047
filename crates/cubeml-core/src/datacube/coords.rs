//! Coordinate labels attached to datacube dimensions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single coordinate label along a datacube dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordValue {
    Int(i64),
    Float(f64),
    Label(String),
}

impl CoordValue {
    pub fn as_label(&self) -> Option<&str> {
        match self {
            CoordValue::Label(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CoordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordValue::Int(v) => write!(f, "{}", v),
            CoordValue::Float(v) => write!(f, "{}", v),
            CoordValue::Label(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CoordValue {
    fn from(s: &str) -> Self {
        CoordValue::Label(s.to_string())
    }
}

impl From<String> for CoordValue {
    fn from(s: String) -> Self {
        CoordValue::Label(s)
    }
}

impl From<i64> for CoordValue {
    fn from(v: i64) -> Self {
        CoordValue::Int(v)
    }
}

impl From<i32> for CoordValue {
    fn from(v: i32) -> Self {
        CoordValue::Int(v as i64)
    }
}

impl From<f64> for CoordValue {
    fn from(v: f64) -> Self {
        CoordValue::Float(v)
    }
}

/// Build a coordinate sequence from anything convertible to [`CoordValue`].
pub fn coords<I, T>(values: I) -> Vec<CoordValue>
where
    I: IntoIterator<Item = T>,
    T: Into<CoordValue>,
{
    values.into_iter().map(Into::into).collect()
}
