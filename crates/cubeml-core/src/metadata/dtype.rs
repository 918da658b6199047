//! Tensor element types declared by model metadata.

use crate::error::{CubeError, CubeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element data type of a model input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    #[default]
    Float32,
    Float64,
    Bool,
    Cint16,
    Cint32,
    Cfloat32,
    Cfloat64,
    Other,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float16 => "float16",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Bool => "bool",
            DataType::Cint16 => "cint16",
            DataType::Cint32 => "cint32",
            DataType::Cfloat32 => "cfloat32",
            DataType::Cfloat64 => "cfloat64",
            DataType::Other => "other",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Uint8
                | DataType::Uint16
                | DataType::Uint32
                | DataType::Uint64
                | DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
        )
    }

    /// Returns a converter mapping an `f32` value into this type's domain.
    ///
    /// Integer targets truncate toward zero and saturate at the type bounds.
    /// Complex and unspecified types cannot be represented in the real-valued
    /// backing store.
    pub fn converter(&self) -> CubeResult<fn(f32) -> f32> {
        let f: fn(f32) -> f32 = match self {
            DataType::Uint8 => |x| saturate(x, u8::MIN as f64, u8::MAX as f64),
            DataType::Uint16 => |x| saturate(x, u16::MIN as f64, u16::MAX as f64),
            DataType::Uint32 => |x| saturate(x, u32::MIN as f64, u32::MAX as f64),
            DataType::Uint64 => |x| saturate(x, u64::MIN as f64, u64::MAX as f64),
            DataType::Int8 => |x| saturate(x, i8::MIN as f64, i8::MAX as f64),
            DataType::Int16 => |x| saturate(x, i16::MIN as f64, i16::MAX as f64),
            DataType::Int32 => |x| saturate(x, i32::MIN as f64, i32::MAX as f64),
            DataType::Int64 => |x| saturate(x, i64::MIN as f64, i64::MAX as f64),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => |x| x,
            DataType::Bool => |x| if x != 0.0 { 1.0 } else { 0.0 },
            DataType::Cint16
            | DataType::Cint32
            | DataType::Cfloat32
            | DataType::Cfloat64
            | DataType::Other => {
                return Err(CubeError::not_implemented(format!(
                    "casting datacubes to data type '{}' is not supported",
                    self
                )))
            }
        };
        Ok(f)
    }
}

fn saturate(x: f32, min: f64, max: f64) -> f32 {
    if x.is_nan() {
        return 0.0;
    }
    (x as f64).trunc().clamp(min, max) as f32
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_lowercase() {
        let dt: DataType = serde_json::from_str("\"float64\"").unwrap();
        assert_eq!(dt, DataType::Float64);
        let dt: DataType = serde_json::from_str("\"uint8\"").unwrap();
        assert_eq!(dt, DataType::Uint8);
    }

    #[test]
    fn test_integer_conversion_truncates_and_saturates() {
        let to_u8 = DataType::Uint8.converter().unwrap();
        assert_eq!(to_u8(3.9), 3.0);
        assert_eq!(to_u8(-4.0), 0.0);
        assert_eq!(to_u8(1000.0), 255.0);

        let to_i8 = DataType::Int8.converter().unwrap();
        assert_eq!(to_i8(-3.7), -3.0);
        assert_eq!(to_i8(-500.0), -128.0);
    }

    #[test]
    fn test_bool_and_float_conversion() {
        assert_eq!(DataType::Bool.converter().unwrap()(0.2), 1.0);
        assert_eq!(DataType::Float32.converter().unwrap()(0.25), 0.25);
    }

    #[test]
    fn test_complex_types_rejected() {
        assert!(matches!(
            DataType::Cfloat32.converter(),
            Err(CubeError::NotImplemented(_))
        ));
    }
}
