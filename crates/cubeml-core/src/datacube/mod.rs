//! Labeled N-dimensional arrays ("datacubes").
//!
//! A [`Datacube`] has named, ordered dimensions, an optional coordinate label
//! sequence per dimension, and an `f32` backing store that is either already
//! materialized or produced on demand by a loader. Dimension names, sizes and
//! coordinates can be inspected without materializing a lazy cube; every
//! operation touching values requires [`Datacube::compute`] first.
//!
//! # Example
//!
//! ```rust
//! use cubeml_core::datacube::{coords, Datacube};
//!
//! let cube = Datacube::from_fn(["band", "y", "x"], &[2, 4, 4], |idx| idx[0] as f32)
//!     .unwrap()
//!     .with_coords("band", coords(["B04", "B08"]))
//!     .unwrap();
//! assert_eq!(cube.len_of("y"), Some(4));
//! assert_eq!(cube.coords("band").unwrap()[1].to_string(), "B08");
//! ```

mod coords;

pub use coords::{coords, CoordValue};

use crate::error::{CubeError, CubeResult};
use crate::metadata::DataType;
use ndarray::{concatenate, ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice};
use std::collections::HashSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Produces the values of a lazily evaluated datacube.
pub type LazyLoader = Arc<dyn Fn() -> CubeResult<ArrayD<f32>> + Send + Sync>;

#[derive(Clone)]
enum CubeData {
    Eager(ArrayD<f32>),
    Lazy(LazyLoader),
}

/// A named-dimension labeled array.
#[derive(Clone)]
pub struct Datacube {
    dims: Vec<String>,
    shape: Vec<usize>,
    coords: Vec<Option<Vec<CoordValue>>>,
    data: CubeData,
    dtype: DataType,
}

impl fmt::Debug for Datacube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datacube")
            .field("dims", &self.dims)
            .field("shape", &self.shape)
            .field("dtype", &self.dtype)
            .field("lazy", &self.is_lazy())
            .finish()
    }
}

fn check_dims(dims: &[String], ndim: usize) -> CubeResult<()> {
    if dims.len() != ndim {
        return Err(CubeError::value(format!(
            "datacube has {} dimension names but {} axes",
            dims.len(),
            ndim
        )));
    }
    let mut seen = HashSet::new();
    for d in dims {
        if !seen.insert(d.as_str()) {
            return Err(CubeError::value(format!("duplicate dimension name '{}'", d)));
        }
    }
    Ok(())
}

impl Datacube {
    /// Create an eager datacube from an array and one name per axis.
    pub fn new<I, S>(dims: I, data: ArrayD<f32>) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        check_dims(&dims, data.ndim())?;
        Ok(Self {
            shape: data.shape().to_vec(),
            coords: vec![None; dims.len()],
            dims,
            data: CubeData::Eager(data),
            dtype: DataType::Float32,
        })
    }

    /// Create an eager datacube from a flat row-major value vector.
    pub fn from_shape_vec<I, S>(dims: I, shape: &[usize], values: Vec<f32>) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let array = ArrayD::from_shape_vec(IxDyn(shape), values)?;
        Self::new(dims, array)
    }

    /// Create an eager datacube by evaluating `f` at every index.
    pub fn from_fn<I, S, F>(dims: I, shape: &[usize], mut f: F) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnMut(&[usize]) -> f32,
    {
        let array = ArrayD::from_shape_fn(IxDyn(shape), |idx| f(idx.slice()));
        Self::new(dims, array)
    }

    /// Create a lazily evaluated datacube of known shape.
    pub fn lazy<I, S, F>(dims: I, shape: &[usize], loader: F) -> CubeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn() -> CubeResult<ArrayD<f32>> + Send + Sync + 'static,
    {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        check_dims(&dims, shape.len())?;
        Ok(Self {
            shape: shape.to_vec(),
            coords: vec![None; dims.len()],
            dims,
            data: CubeData::Lazy(Arc::new(loader)),
            dtype: DataType::Float32,
        })
    }

    /// Attach coordinate labels to a dimension.
    pub fn with_coords(mut self, dim: &str, values: Vec<CoordValue>) -> CubeResult<Self> {
        let axis = self.require_axis(dim)?;
        if values.len() != self.shape[axis] {
            return Err(CubeError::value(format!(
                "dimension '{}' has {} values but {} coordinates were given",
                dim,
                self.shape[axis],
                values.len()
            )));
        }
        self.coords[axis] = Some(values);
        Ok(self)
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.data, CubeData::Lazy(_))
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis_of(dim).is_some()
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn len_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.shape[axis])
    }

    /// Coordinate labels of a dimension, if any were attached.
    pub fn coords(&self, dim: &str) -> Option<&[CoordValue]> {
        self.axis_of(dim)
            .and_then(|axis| self.coords[axis].as_deref())
    }

    fn require_axis(&self, dim: &str) -> CubeResult<usize> {
        self.axis_of(dim).ok_or_else(|| {
            CubeError::DimensionMissing(format!(
                "datacube has no dimension '{}' (dimensions: {})",
                dim,
                self.dims.join(", ")
            ))
        })
    }

    /// Force a lazy datacube into memory. Eager cubes are returned unchanged.
    pub fn compute(mut self) -> CubeResult<Self> {
        let loader = match &self.data {
            CubeData::Eager(_) => None,
            CubeData::Lazy(loader) => Some(Arc::clone(loader)),
        };
        let Some(loader) = loader else {
            return Ok(self);
        };
        let array = loader()?;
        if array.shape() != self.shape.as_slice() {
            return Err(CubeError::value(format!(
                "lazy datacube produced shape {:?}, expected {:?}",
                array.shape(),
                self.shape
            )));
        }
        self.data = CubeData::Eager(array);
        Ok(self)
    }

    /// Borrow the materialized values.
    pub fn data(&self) -> CubeResult<&ArrayD<f32>> {
        match &self.data {
            CubeData::Eager(array) => Ok(array),
            CubeData::Lazy(_) => Err(CubeError::config(
                "datacube is not materialized; call compute() first",
            )),
        }
    }

    /// Take the materialized values.
    pub fn into_data(self) -> CubeResult<ArrayD<f32>> {
        match self.data {
            CubeData::Eager(array) => Ok(array),
            CubeData::Lazy(_) => Err(CubeError::config(
                "datacube is not materialized; call compute() first",
            )),
        }
    }

    fn with_array(
        dims: Vec<String>,
        coords: Vec<Option<Vec<CoordValue>>>,
        array: ArrayD<f32>,
        dtype: DataType,
    ) -> Self {
        Self {
            shape: array.shape().to_vec(),
            dims,
            coords,
            data: CubeData::Eager(array),
            dtype,
        }
    }

    /// Reorder dimensions. `order` must name every dimension exactly once.
    pub fn transpose<S: AsRef<str>>(&self, order: &[S]) -> CubeResult<Self> {
        if order.len() != self.ndim() {
            return Err(CubeError::value(format!(
                "transpose needs {} dimensions, got {}",
                self.ndim(),
                order.len()
            )));
        }
        let mut perm = Vec::with_capacity(order.len());
        for name in order {
            let axis = self.require_axis(name.as_ref())?;
            if perm.contains(&axis) {
                return Err(CubeError::value(format!(
                    "dimension '{}' listed twice in transpose",
                    name.as_ref()
                )));
            }
            perm.push(axis);
        }

        let array = self
            .data()?
            .clone()
            .permuted_axes(IxDyn(&perm))
            .as_standard_layout()
            .into_owned();
        let dims = perm.iter().map(|&a| self.dims[a].clone()).collect();
        let coords = perm.iter().map(|&a| self.coords[a].clone()).collect();
        Ok(Self::with_array(dims, coords, array, self.dtype))
    }

    /// Take the index range `range` along `dim`.
    pub fn slice_axis(&self, dim: &str, range: Range<usize>) -> CubeResult<Self> {
        let axis = self.require_axis(dim)?;
        if range.start > range.end || range.end > self.shape[axis] {
            return Err(CubeError::value(format!(
                "range {:?} out of bounds for dimension '{}' of size {}",
                range, dim, self.shape[axis]
            )));
        }
        let array = self
            .data()?
            .slice_axis(Axis(axis), Slice::from(range.clone()))
            .to_owned();
        let mut coords = self.coords.clone();
        if let Some(values) = coords[axis].as_mut() {
            *values = values[range].to_vec();
        }
        Ok(Self::with_array(self.dims.clone(), coords, array, self.dtype))
    }

    /// Select positions along `dim`, in the given order.
    pub fn select_indices(&self, dim: &str, indices: &[usize]) -> CubeResult<Self> {
        let axis = self.require_axis(dim)?;
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.shape[axis]) {
            return Err(CubeError::value(format!(
                "index {} out of bounds for dimension '{}' of size {}",
                bad, dim, self.shape[axis]
            )));
        }
        let array = self.data()?.select(Axis(axis), indices);
        let mut coords = self.coords.clone();
        if let Some(values) = coords[axis].as_mut() {
            *values = indices.iter().map(|&i| values[i].clone()).collect();
        }
        Ok(Self::with_array(self.dims.clone(), coords, array, self.dtype))
    }

    /// Select positions along `dim` by coordinate label.
    pub fn select_labels(&self, dim: &str, labels: &[CoordValue]) -> CubeResult<Self> {
        let available = self.coords(dim).ok_or_else(|| {
            CubeError::LabelDoesNotExist(format!("dimension '{}' has no coordinates", dim))
        })?;
        let indices = labels
            .iter()
            .map(|label| {
                available.iter().position(|c| c == label).ok_or_else(|| {
                    CubeError::LabelDoesNotExist(format!(
                        "label '{}' does not exist in dimension '{}'",
                        label, dim
                    ))
                })
            })
            .collect::<CubeResult<Vec<_>>>()?;
        self.select_indices(dim, &indices)
    }

    /// Select one coordinate value along `dim`, dropping the dimension.
    ///
    /// With repeated labels the first match wins; use [`Self::select_position`]
    /// to address a specific occurrence.
    pub fn select_value(&self, dim: &str, value: &CoordValue) -> CubeResult<Self> {
        let axis = self.require_axis(dim)?;
        let index = match self.coords[axis].as_ref() {
            Some(values) => values.iter().position(|c| c == value),
            None => match value {
                CoordValue::Int(i) if *i >= 0 && (*i as usize) < self.shape[axis] => {
                    Some(*i as usize)
                }
                _ => None,
            },
        }
        .ok_or_else(|| {
            CubeError::LabelDoesNotExist(format!(
                "label '{}' does not exist in dimension '{}'",
                value, dim
            ))
        })?;
        self.select_position(dim, index)
    }

    /// Select position `index` along `dim`, dropping the dimension.
    pub fn select_position(&self, dim: &str, index: usize) -> CubeResult<Self> {
        let axis = self.require_axis(dim)?;
        if index >= self.shape[axis] {
            return Err(CubeError::value(format!(
                "index {} is out of bounds for dimension '{}' of size {}",
                index, dim, self.shape[axis]
            )));
        }

        let array = self.data()?.index_axis(Axis(axis), index).to_owned();
        let mut dims = self.dims.clone();
        let mut coords = self.coords.clone();
        dims.remove(axis);
        coords.remove(axis);
        Ok(Self::with_array(dims, coords, array, self.dtype))
    }

    /// Remove coordinate labels from the given dimensions.
    pub fn drop_coords<S: AsRef<str>>(mut self, dims: &[S]) -> Self {
        for name in dims {
            if let Some(axis) = self.axis_of(name.as_ref()) {
                self.coords[axis] = None;
            }
        }
        self
    }

    /// Insert a new size-1 dimension at `position`.
    pub fn insert_axis(self, name: &str, position: usize) -> CubeResult<Self> {
        if self.has_dim(name) {
            return Err(CubeError::value(format!("dimension '{}' already exists", name)));
        }
        if position > self.ndim() {
            return Err(CubeError::value(format!(
                "cannot insert dimension '{}' at position {} of a {}-dimensional cube",
                name,
                position,
                self.ndim()
            )));
        }
        let dtype = self.dtype;
        let mut dims = self.dims.clone();
        let mut coords = self.coords.clone();
        dims.insert(position, name.to_string());
        coords.insert(position, None);
        let array = self.into_data()?.insert_axis(Axis(position));
        Ok(Self::with_array(dims, coords, array, dtype))
    }

    /// Concatenate cubes with identical dimensions along `dim`, in order.
    pub fn concat(cubes: &[Datacube], dim: &str) -> CubeResult<Self> {
        let first = cubes
            .first()
            .ok_or_else(|| CubeError::value("cannot concatenate an empty list of datacubes"))?;
        let axis = first.require_axis(dim)?;
        for cube in &cubes[1..] {
            if cube.dims != first.dims {
                return Err(CubeError::value(format!(
                    "cannot concatenate datacubes with dimensions [{}] and [{}]",
                    first.dims.join(", "),
                    cube.dims.join(", ")
                )));
            }
        }

        let views: Vec<ArrayViewD<'_, f32>> = cubes
            .iter()
            .map(|c| c.data().map(|a| a.view()))
            .collect::<CubeResult<_>>()?;
        let array = concatenate(Axis(axis), &views)?;

        let mut coords = first.coords.clone();
        coords[axis] = cubes
            .iter()
            .map(|c| c.coords[axis].clone())
            .collect::<Option<Vec<_>>>()
            .map(|parts| parts.concat());

        Ok(Self::with_array(first.dims.clone(), coords, array, first.dtype))
    }

    /// Rename a dimension.
    pub fn rename_dim(mut self, from: &str, to: &str) -> CubeResult<Self> {
        let axis = self.require_axis(from)?;
        if from != to && self.has_dim(to) {
            return Err(CubeError::value(format!("dimension '{}' already exists", to)));
        }
        self.dims[axis] = to.to_string();
        Ok(self)
    }

    /// Apply `f` to every value.
    pub fn map_values<F>(self, f: F) -> CubeResult<Self>
    where
        F: Fn(f32) -> f32,
    {
        let dims = self.dims.clone();
        let coords = self.coords.clone();
        let dtype = self.dtype;
        let mut array = self.into_data()?;
        array.mapv_inplace(f);
        Ok(Self::with_array(dims, coords, array, dtype))
    }

    /// Apply `f` to the values at position `index` of `dim`.
    pub fn map_index<F>(self, dim: &str, index: usize, f: F) -> CubeResult<Self>
    where
        F: Fn(f32) -> f32,
    {
        let axis = self.require_axis(dim)?;
        if index >= self.shape[axis] {
            return Err(CubeError::value(format!(
                "index {} out of bounds for dimension '{}' of size {}",
                index, dim, self.shape[axis]
            )));
        }
        let dims = self.dims.clone();
        let coords = self.coords.clone();
        let dtype = self.dtype;
        let mut array = self.into_data()?;
        array.index_axis_mut(Axis(axis), index).mapv_inplace(f);
        Ok(Self::with_array(dims, coords, array, dtype))
    }

    /// Convert values into the domain of `dtype` and record it.
    pub fn astype(self, dtype: DataType) -> CubeResult<Self> {
        let convert = dtype.converter()?;
        let mut cube = self.map_values(convert)?;
        cube.dtype = dtype;
        Ok(cube)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_3x4() -> Datacube {
        Datacube::from_fn(["y", "x"], &[3, 4], |idx| (idx[0] * 10 + idx[1]) as f32)
            .unwrap()
            .with_coords("y", coords([100, 200, 300]))
            .unwrap()
    }

    #[test]
    fn test_rejects_duplicate_dims() {
        let result = Datacube::from_shape_vec(["x", "x"], &[1, 1], vec![0.0]);
        assert!(matches!(result, Err(CubeError::Value(_))));
    }

    #[test]
    fn test_rejects_wrong_dim_count() {
        let result = Datacube::from_shape_vec(["x"], &[1, 1], vec![0.0]);
        assert!(result.is_err());
    }

    #[test]
    fn test_coords_length_checked() {
        let result = cube_3x4().with_coords("x", coords([1, 2]));
        assert!(matches!(result, Err(CubeError::Value(_))));
    }

    #[test]
    fn test_transpose() {
        let t = cube_3x4().transpose(&["x", "y"]).unwrap();
        assert_eq!(t.dims(), &["x", "y"]);
        assert_eq!(t.shape(), &[4, 3]);
        assert_eq!(t.data().unwrap()[IxDyn(&[3, 2])], 23.0);
        assert_eq!(t.coords("y").unwrap().len(), 3);
    }

    #[test]
    fn test_slice_axis_slices_coords() {
        let s = cube_3x4().slice_axis("y", 1..3).unwrap();
        assert_eq!(s.shape(), &[2, 4]);
        assert_eq!(s.coords("y").unwrap(), &coords([200, 300])[..]);
        assert_eq!(s.data().unwrap()[IxDyn(&[0, 1])], 11.0);
    }

    #[test]
    fn test_select_value_drops_dimension() {
        let s = cube_3x4().select_value("y", &CoordValue::Int(300)).unwrap();
        assert_eq!(s.dims(), &["x"]);
        assert_eq!(s.data().unwrap().as_slice().unwrap(), &[20.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn test_select_position_with_repeated_labels() {
        let cube = Datacube::from_fn(["t", "x"], &[2, 2], |idx| idx[0] as f32)
            .unwrap()
            .with_coords("t", coords(["a", "a"]))
            .unwrap();
        assert_eq!(cube.select_position("t", 1).unwrap().data().unwrap().as_slice().unwrap(), &[1.0, 1.0]);
        assert_eq!(cube.select_value("t", &CoordValue::from("a")).unwrap().data().unwrap().as_slice().unwrap(), &[0.0, 0.0]);
        assert!(matches!(cube.select_position("t", 2), Err(CubeError::Value(_))));
    }

    #[test]
    fn test_select_labels_missing() {
        let err = cube_3x4()
            .select_labels("y", &coords([999]))
            .unwrap_err();
        assert!(matches!(err, CubeError::LabelDoesNotExist(_)));
    }

    #[test]
    fn test_insert_axis_and_concat() {
        let a = cube_3x4().insert_axis("batch", 0).unwrap();
        let b = cube_3x4().insert_axis("batch", 0).unwrap();
        assert_eq!(a.shape(), &[1, 3, 4]);
        let c = Datacube::concat(&[a, b], "batch").unwrap();
        assert_eq!(c.shape(), &[2, 3, 4]);
        assert!(c.coords("batch").is_none());
        assert_eq!(c.coords("y").unwrap().len(), 3);
    }

    #[test]
    fn test_concat_rejects_mismatched_dims() {
        let a = cube_3x4();
        let b = cube_3x4().transpose(&["x", "y"]).unwrap();
        assert!(Datacube::concat(&[a, b], "y").is_err());
    }

    #[test]
    fn test_lazy_compute() {
        let cube = Datacube::lazy(["x"], &[3], || {
            Ok(ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0])?)
        })
        .unwrap();
        assert!(cube.is_lazy());
        assert_eq!(cube.len_of("x"), Some(3));
        assert!(cube.data().is_err());
        let cube = cube.compute().unwrap();
        assert!(!cube.is_lazy());
        assert_eq!(cube.data().unwrap().sum(), 6.0);
    }

    #[test]
    fn test_lazy_shape_mismatch() {
        let cube = Datacube::lazy(["x"], &[4], || Ok(ArrayD::zeros(IxDyn(&[3])))).unwrap();
        assert!(cube.compute().is_err());
    }

    #[test]
    fn test_map_index_and_astype() {
        let cube = cube_3x4()
            .map_index("y", 0, |v| v + 0.7)
            .unwrap()
            .astype(DataType::Uint8)
            .unwrap();
        assert_eq!(cube.dtype(), DataType::Uint8);
        assert_eq!(cube.data().unwrap()[IxDyn(&[0, 1])], 1.0);
        assert_eq!(cube.data().unwrap()[IxDyn(&[1, 1])], 11.0);
    }
}
