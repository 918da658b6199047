//! Value scaling.

use crate::datacube::Datacube;
use crate::dims;
use crate::error::{CubeError, CubeResult};
use crate::metadata::ValueScaling;

impl ValueScaling {
    /// Per-value function for this scaling.
    ///
    /// `processing` scalings have no closed form and are not supported.
    pub fn as_fn(&self) -> CubeResult<impl Fn(f32) -> f32> {
        let (a, b, kind) = match *self {
            ValueScaling::MinMax { minimum, maximum } => (minimum, maximum - minimum, Kind::Standardize),
            ValueScaling::ZScore { mean, stddev } => (mean, stddev, Kind::Standardize),
            ValueScaling::Clip { minimum, maximum } => (minimum, maximum, Kind::Clamp),
            ValueScaling::ClipMin { minimum } => (minimum, f64::INFINITY, Kind::Clamp),
            ValueScaling::ClipMax { maximum } => (f64::NEG_INFINITY, maximum, Kind::Clamp),
            ValueScaling::Offset { value } => (value, 1.0, Kind::Standardize),
            ValueScaling::Scale { value } => (0.0, value, Kind::Standardize),
            ValueScaling::Processing { ref format, ref expression } => {
                return Err(CubeError::not_implemented(format!(
                    "value scaling by '{}' expression '{}'",
                    format, expression
                )));
            }
        };
        let (a, b) = (a as f32, b as f32);
        Ok(move |x: f32| match kind {
            Kind::Standardize => (x - a) / b,
            Kind::Clamp => x.max(a).min(b),
        })
    }
}

#[derive(Clone, Copy)]
enum Kind {
    /// `(x - a) / b`
    Standardize,
    /// clamp to `[a, b]`
    Clamp,
}

/// Apply the model's value scaling to a cube.
///
/// One entry applies to every value. Several entries must match the band
/// dimension length, entry `i` scaling band `i`.
pub fn apply_value_scaling(cube: Datacube, scaling: Option<&[ValueScaling]>) -> CubeResult<Datacube> {
    let scaling = match scaling {
        None | Some([]) => return Ok(cube),
        Some(s) => s,
    };

    if let [shared] = scaling {
        log::debug!(target: "cubeml_core", "Applying shared value scaling {:?}", shared);
        return cube.map_values(shared.as_fn()?);
    }

    let band_dim = dims::band_dimension(cube.dims())
        .ok_or_else(|| {
            CubeError::DimensionMissing(
                "per-band value scaling requires a band dimension in the datacube".to_string(),
            )
        })?
        .to_string();
    let band_count = cube.len_of(&band_dim).unwrap_or_default();
    if scaling.len() != band_count {
        return Err(CubeError::value(format!(
            "{} value scaling entries were given for {} bands",
            scaling.len(),
            band_count
        )));
    }

    let mut cube = cube;
    for (index, entry) in scaling.iter().enumerate() {
        cube = cube.map_index(&band_dim, index, entry.as_fn()?)?;
    }
    Ok(cube)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn apply(s: ValueScaling, x: f32) -> f32 {
        s.as_fn().unwrap()(x)
    }

    #[test]
    fn test_scaling_formulas() {
        assert_eq!(apply(ValueScaling::MinMax { minimum: 0.0, maximum: 10000.0 }, 2500.0), 0.25);
        assert_eq!(apply(ValueScaling::ZScore { mean: 10.0, stddev: 2.0 }, 14.0), 2.0);
        assert_eq!(apply(ValueScaling::Clip { minimum: 0.0, maximum: 1.0 }, 1.5), 1.0);
        assert_eq!(apply(ValueScaling::Clip { minimum: 0.0, maximum: 1.0 }, -0.5), 0.0);
        assert_eq!(apply(ValueScaling::ClipMin { minimum: 3.0 }, 1.0), 3.0);
        assert_eq!(apply(ValueScaling::ClipMax { maximum: 3.0 }, 5.0), 3.0);
        assert_eq!(apply(ValueScaling::Offset { value: 2.0 }, 5.0), 3.0);
        assert_eq!(apply(ValueScaling::Scale { value: 4.0 }, 2.0), 0.5);
    }

    #[test]
    fn test_processing_not_implemented() {
        let s = ValueScaling::Processing {
            format: "python".into(),
            expression: "pkg.mod:fn".into(),
        };
        assert!(matches!(s.as_fn(), Err(CubeError::NotImplemented(_))));
    }

    fn cube() -> Datacube {
        Datacube::from_fn(["band", "x"], &[2, 2], |idx| (idx[0] * 10 + 10) as f32).unwrap()
    }

    #[test]
    fn test_shared_scaling() {
        let scaled = apply_value_scaling(cube(), Some(&[ValueScaling::Scale { value: 10.0 }])).unwrap();
        assert_eq!(scaled.data().unwrap().as_slice().unwrap(), &[1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_per_band_scaling() {
        let scaling = [
            ValueScaling::Offset { value: 10.0 },
            ValueScaling::Scale { value: 20.0 },
        ];
        let scaled = apply_value_scaling(cube(), Some(&scaling)).unwrap();
        let data = scaled.data().unwrap();
        assert_eq!(data[IxDyn(&[0, 1])], 0.0);
        assert_eq!(data[IxDyn(&[1, 0])], 1.0);
    }

    #[test]
    fn test_per_band_count_mismatch() {
        let scaling = vec![ValueScaling::Scale { value: 1.0 }; 3];
        let err = apply_value_scaling(cube(), Some(&scaling)).unwrap_err();
        assert!(matches!(err, CubeError::Value(ref m) if m.contains("3") && m.contains("2 bands")));
    }

    #[test]
    fn test_no_scaling() {
        let unchanged = apply_value_scaling(cube(), None).unwrap();
        assert_eq!(unchanged.data().unwrap().sum(), 60.0);
    }
}
