//! Band lookup and selection.
//!
//! Bands are looked up by exact coordinate label first. Failing that,
//! Sentinel-2 common names (`red`, `nir`, ...) are translated to their band
//! identifiers and tried again, so metadata written against either naming
//! scheme matches the same cube.

use crate::datacube::{CoordValue, Datacube};
use crate::dims;
use crate::error::{CubeError, CubeResult};
use crate::metadata::ModelInput;

/// Sentinel-2 common band names and their band identifiers.
const SENTINEL2_ALIASES: &[(&str, &str)] = &[
    ("coastal", "B01"),
    ("blue", "B02"),
    ("green", "B03"),
    ("red", "B04"),
    ("rededge1", "B05"),
    ("rededge2", "B06"),
    ("rededge3", "B07"),
    ("nir", "B08"),
    ("nir08", "B8A"),
    ("nir09", "B09"),
    ("cirrus", "B10"),
    ("swir16", "B11"),
    ("swir22", "B12"),
];

/// Names a band may also be known under, common name <-> identifier.
pub fn band_aliases(name: &str) -> Vec<&'static str> {
    SENTINEL2_ALIASES
        .iter()
        .filter_map(|&(common, id)| {
            if common.eq_ignore_ascii_case(name) {
                Some(id)
            } else if id.eq_ignore_ascii_case(name) {
                Some(common)
            } else {
                None
            }
        })
        .collect()
}

/// Position of band `name` among the band dimension's labels.
pub fn find_band(labels: &[CoordValue], name: &str) -> Option<usize> {
    let position_of = |wanted: &str| {
        labels
            .iter()
            .position(|label| label.as_label().is_some_and(|l| l == wanted))
    };
    position_of(name).or_else(|| {
        band_aliases(name).into_iter().find_map(|alias| {
            labels.iter().position(|label| {
                label
                    .as_label()
                    .is_some_and(|l| l.eq_ignore_ascii_case(alias))
            })
        })
    })
}

/// Select the model's bands, in declared order, along the band dimension.
///
/// Derivable bands missing from the cube are skipped; they are not computed.
pub fn select_bands(cube: Datacube, input: &ModelInput) -> CubeResult<Datacube> {
    if input.bands.is_empty() {
        return Ok(cube);
    }
    let band_dim = dims::band_dimension(cube.dims())
        .ok_or_else(|| CubeError::DimensionMissing("no band dimension found in the datacube".to_string()))?
        .to_string();
    let labels = cube.coords(&band_dim).unwrap_or(&[]);

    let mut indices = Vec::with_capacity(input.bands.len());
    for band in &input.bands {
        match find_band(labels, band.name()) {
            Some(index) => indices.push(index),
            None if band.format().is_some() && band.expression().is_some() => {
                log::warn!(
                    "derivable band '{}' is not present in the datacube and will not be computed; \
                     it is left out of the model input",
                    band.name()
                );
            }
            None => {
                return Err(CubeError::LabelDoesNotExist(format!(
                    "band '{}' does not exist in datacube dimension '{}'",
                    band.name(),
                    band_dim
                )));
            }
        }
    }

    log::debug!(target: "cubeml_core", "Selecting bands {:?} along '{}'", indices, band_dim);
    cube.select_indices(&band_dim, &indices)
}
