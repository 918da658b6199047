//! Datacube validation against a model input specification.
//!
//! [`check_datacube_dimensions`] runs three checks in order and fails on the
//! first violation:
//!
//! 1. **Presence** - every model dimension resolves to a cube dimension.
//! 2. **Size** - every resolved dimension is at least as large as required.
//!    Larger dimensions are accepted because the tiler cuts them down later.
//! 3. **Bands** - every required band is present or declared derivable.
//!
//! Validation only inspects names, sizes and coordinates, so lazy cubes are
//! never materialized here.

use crate::datacube::Datacube;
use crate::dims::{self, DimensionMapping};
use crate::error::{CubeError, CubeResult};
use crate::metadata::{ModelInput, BATCH_DIM, WILDCARD_SIZE};

/// Check that every model dimension has a counterpart in the cube.
///
/// With `ignore_batch`, an unresolved `batch` dimension is tolerated since
/// the tiler creates it.
pub fn check_dimensions_present(
    cube: &Datacube,
    input: &ModelInput,
    ignore_batch: bool,
) -> CubeResult<DimensionMapping> {
    let model_dims = input.dim_order();
    let mapping = dims::resolve(model_dims, cube.dims());

    let unmatched: Vec<&str> = mapping
        .unmatched(model_dims)
        .into_iter()
        .filter(|name| !(ignore_batch && *name == BATCH_DIM))
        .collect();

    if !unmatched.is_empty() {
        return Err(CubeError::DimensionMissing(format!(
            "the model input requires dimension(s) [{}] which could not be matched in the datacube \
             (datacube dimensions: [{}])",
            unmatched.join(", "),
            cube.dims().join(", ")
        )));
    }
    Ok(mapping)
}

/// Check that every resolved dimension is at least the required size.
///
/// Wildcard (`-1`) sizes never fail. `batch` is skipped when `ignore_batch`.
pub fn check_dimension_sizes(
    cube: &Datacube,
    input: &ModelInput,
    mapping: &DimensionMapping,
    ignore_batch: bool,
) -> CubeResult<()> {
    input.input.check_consistent()?;
    let model_dims = input.dim_order();
    let required_shape = input.shape();

    for (model_index, model_dim) in model_dims.iter().enumerate() {
        if ignore_batch && model_dim == BATCH_DIM {
            continue;
        }
        let required = required_shape[model_index];
        if required == WILDCARD_SIZE {
            continue;
        }
        let Some(resolved) = mapping.get(model_index) else {
            // Unresolved entries were rejected by the presence check
            continue;
        };

        let actual = cube.shape()[resolved.index];
        let required = usize::try_from(required).map_err(|_| {
            CubeError::value(format!(
                "model dimension '{}' has invalid size {}",
                model_dim, required
            ))
        })?;
        if actual < required {
            return Err(CubeError::DimensionMismatch {
                dimension: model_dim.clone(),
                required,
                actual,
            });
        }
    }
    Ok(())
}

/// Check that every required band is available in the cube.
///
/// A band is available when its name is exactly one of the band dimension's
/// coordinate labels, or when it is declared derivable with both `format`
/// and `expression`. Common-name aliases are not considered here.
pub fn check_bands(cube: &Datacube, input: &ModelInput) -> CubeResult<()> {
    if input.bands.is_empty() {
        return Ok(());
    }

    let band_dim = dims::band_dimension(cube.dims()).ok_or_else(|| {
        CubeError::DimensionMissing(format!(
            "the model requires bands but no band dimension was found in the datacube \
             (datacube dimensions: [{}])",
            cube.dims().join(", ")
        ))
    })?;
    let labels = cube.coords(band_dim).unwrap_or(&[]);

    let mut unavailable = Vec::new();
    for band in &input.bands {
        if labels.iter().any(|label| label.as_label() == Some(band.name())) {
            continue;
        }
        match (band.format(), band.expression()) {
            (None, None) => unavailable.push(band.name()),
            (Some(_), Some(_)) => {
                log::debug!(
                    target: "cubeml_core",
                    "band '{}' is not in the datacube but is declared derivable",
                    band.name()
                );
            }
            _ => {
                return Err(CubeError::value(format!(
                    "band '{}' must declare both 'format' and 'expression' to be derivable, or neither",
                    band.name()
                )));
            }
        }
    }

    if !unavailable.is_empty() {
        return Err(CubeError::LabelDoesNotExist(format!(
            "the model requires band(s) [{}] which are not present in the datacube dimension '{}'",
            unavailable.join(", "),
            band_dim
        )));
    }
    Ok(())
}

/// Run the presence, size and band checks in order.
///
/// A model input whose `shape` and `dim_order` differ in length is rejected
/// with [`CubeError::Value`] before any check runs.
pub fn check_datacube_dimensions(
    cube: &Datacube,
    input: &ModelInput,
    ignore_batch: bool,
) -> CubeResult<DimensionMapping> {
    input.input.check_consistent()?;
    let mapping = check_dimensions_present(cube, input, ignore_batch)?;
    check_dimension_sizes(cube, input, &mapping, ignore_batch)?;
    check_bands(cube, input)?;
    Ok(mapping)
}
