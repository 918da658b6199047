//! Tiling of oversized datacube dimensions into model-sized windows.
//!
//! The cube is first reordered into the model's dimension order, with any
//! dimensions the model does not consume appended in their original order.
//! Every mapped non-batch dimension is then cut into non-overlapping windows
//! of the model's declared size. A remainder smaller than one window is
//! dropped, never padded.
//!
//! All windows are stacked along a new `batch` dimension, enumerated over the
//! cartesian product of per-dimension origins with the first tiled dimension
//! varying slowest.

use crate::datacube::Datacube;
use crate::dims;
use crate::error::{CubeError, CubeResult};
use crate::metadata::{ModelInput, BATCH_DIM, WILDCARD_SIZE};

/// One window cut from the datacube.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Start offset per tiled dimension
    pub origin: Vec<usize>,
    /// Window size per tiled dimension
    pub size: Vec<usize>,
}

/// The result of tiling: all windows stacked along `batch`.
#[derive(Debug, Clone)]
pub struct TiledCube {
    /// Tiles concatenated along the `batch` dimension, in [`TiledCube::tiles`] order
    pub cube: Datacube,
    /// Names of the tiled dimensions, aligned with each tile's `origin`
    pub tiled_dims: Vec<String>,
    pub tiles: Vec<Tile>,
}

impl TiledCube {
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

/// Per-dimension start offsets, cartesian product, first dimension slowest.
///
/// `steps[i] * counts[i]` bounds dimension `i`; anything past it is dropped.
pub fn origin_grid(steps: &[usize], counts: &[usize]) -> Vec<Vec<usize>> {
    let mut grid = vec![Vec::new()];
    for (&step, &count) in steps.iter().zip(counts) {
        grid = grid
            .into_iter()
            .flat_map(|prefix| {
                (0..count).map(move |i| {
                    let mut origin = prefix.clone();
                    origin.push(i * step);
                    origin
                })
            })
            .collect();
    }
    grid
}

/// Reorder, materialize and tile a cube for `input`.
///
/// The cube is expected to have passed validation; a dimension smaller than
/// its window still fails here with [`CubeError::DimensionMismatch`].
///
/// If the cube already carries a dimension resolved to the model's `batch`,
/// tiles are stacked along it (renamed to `batch`) instead of a new axis.
pub fn tile(cube: Datacube, input: &ModelInput) -> CubeResult<TiledCube> {
    input.input.check_consistent()?;
    let model_dims = input.dim_order();
    let model_shape = input.shape();
    let mapping = dims::resolve(model_dims, cube.dims());

    let mut order: Vec<String> = Vec::with_capacity(cube.ndim());
    for resolved in mapping.entries().iter().flatten() {
        if !order.contains(&resolved.name) {
            order.push(resolved.name.clone());
        }
    }
    for name in cube.dims() {
        if !order.contains(name) {
            order.push(name.clone());
        }
    }

    let batch_source = input
        .input
        .batch_index()
        .and_then(|index| mapping.get(index))
        .map(|resolved| resolved.name.clone());

    let reordered = cube.compute()?.transpose(&order)?;

    let mut tiled_dims = Vec::new();
    let mut steps = Vec::new();
    let mut counts = Vec::new();
    for (model_index, model_dim) in model_dims.iter().enumerate() {
        if model_dim == BATCH_DIM {
            continue;
        }
        let Some(resolved) = mapping.get(model_index) else {
            continue;
        };
        if tiled_dims.contains(&resolved.name) || batch_source.as_ref() == Some(&resolved.name) {
            continue;
        }

        let size = reordered.len_of(&resolved.name).unwrap_or_default();
        let required = model_shape[model_index];
        let step = if required == WILDCARD_SIZE {
            size
        } else {
            usize::try_from(required).map_err(|_| {
                CubeError::value(format!("model dimension '{}' has invalid size {}", model_dim, required))
            })?
        };
        if step == 0 || size < step {
            return Err(CubeError::DimensionMismatch {
                dimension: model_dim.clone(),
                required: step,
                actual: size,
            });
        }

        tiled_dims.push(resolved.name.clone());
        steps.push(step);
        counts.push(size / step);
    }

    let origins = origin_grid(&steps, &counts);
    log::debug!(
        target: "cubeml_core",
        "Tiling dimensions {:?} with windows {:?}: {:?} steps, {} tiles",
        tiled_dims,
        steps,
        counts,
        origins.len()
    );

    let (stack_dim, insert_at) = match &batch_source {
        Some(name) => (name.as_str(), None),
        None => {
            let position = input.input.batch_index().unwrap_or(0).min(reordered.ndim());
            (BATCH_DIM, Some(position))
        }
    };

    let mut windows = Vec::with_capacity(origins.len());
    for origin in &origins {
        let mut window: Option<Datacube> = None;
        for ((dim, &start), &step) in tiled_dims.iter().zip(origin).zip(&steps) {
            let source = window.as_ref().unwrap_or(&reordered);
            window = Some(source.slice_axis(dim, start..start + step)?);
        }
        let window = match window {
            Some(w) => w,
            None => reordered.clone(),
        }
        .drop_coords(&tiled_dims);
        let window = match insert_at {
            Some(position) => window.insert_axis(BATCH_DIM, position)?,
            None => window,
        };
        windows.push(window);
    }

    let mut stacked = Datacube::concat(&windows, stack_dim)?;
    if stack_dim != BATCH_DIM {
        stacked = stacked.rename_dim(stack_dim, BATCH_DIM)?;
    }

    let tiles = origins
        .into_iter()
        .map(|origin| Tile {
            origin,
            size: steps.clone(),
        })
        .collect();

    Ok(TiledCube {
        cube: stacked,
        tiled_dims,
        tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacube::coords;
    use crate::metadata::{DataType, InputStructure};
    use ndarray::IxDyn;

    fn model(dim_order: &[&str], shape: &[i64]) -> ModelInput {
        ModelInput::new("input", InputStructure::new(dim_order, shape, DataType::Float32))
    }

    #[test]
    fn test_origin_grid_order() {
        let grid = origin_grid(&[2, 3], &[2, 2]);
        assert_eq!(grid, vec![vec![0, 0], vec![0, 3], vec![2, 0], vec![2, 3]]);
        assert_eq!(origin_grid(&[], &[]), vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_rejects_inconsistent_input_structure() {
        let cube = || Datacube::from_fn(["y", "x"], &[4, 4], |_| 0.0).unwrap();
        let short = tile(cube(), &model(&["batch", "y", "x"], &[-1, 2]));
        assert!(matches!(short, Err(CubeError::Value(_))));
        let long = tile(cube(), &model(&["y", "x"], &[2, 2, 2]));
        assert!(matches!(long, Err(CubeError::Value(_))));
    }

    #[test]
    fn test_tiles_15x15_into_5x5() {
        let cube = Datacube::from_fn(["b", "y", "x"], &[3, 15, 15], |idx| idx[0] as f32).unwrap();
        let tiled = tile(cube, &model(&["batch", "band", "x", "y"], &[-1, 3, 5, 5])).unwrap();
        assert_eq!(tiled.tile_count(), 9);
        assert_eq!(tiled.cube.dims(), &["batch", "b", "x", "y"]);
        assert_eq!(tiled.cube.shape(), &[9, 3, 5, 5]);
        assert_eq!(tiled.tiled_dims, vec!["b", "x", "y"]);
    }

    #[test]
    fn test_remainder_dropped() {
        let cube = Datacube::from_fn(["x", "y"], &[12, 7], |_| 0.0).unwrap();
        let tiled = tile(cube, &model(&["batch", "x", "y"], &[-1, 5, 5])).unwrap();
        assert_eq!(tiled.tile_count(), 2);
        assert_eq!(tiled.cube.shape(), &[2, 5, 5]);
    }

    #[test]
    fn test_exact_size_gives_one_tile() {
        let cube = Datacube::from_fn(["x", "y"], &[4, 4], |_| 1.0).unwrap();
        let tiled = tile(cube, &model(&["batch", "x", "y"], &[-1, 4, 4])).unwrap();
        assert_eq!(tiled.tile_count(), 1);
        assert_eq!(tiled.tiles[0].origin, vec![0, 0]);
    }

    #[test]
    fn test_tile_contents_follow_grid_order() {
        let cube = Datacube::from_fn(["y", "x"], &[4, 4], |idx| (idx[0] * 4 + idx[1]) as f32).unwrap();
        let tiled = tile(cube, &model(&["batch", "y", "x"], &[-1, 2, 2])).unwrap();
        let data = tiled.cube.data().unwrap();
        // tile 1 starts at (y=0, x=2), tile 2 at (y=2, x=0)
        assert_eq!(tiled.tiles[1].origin, vec![0, 2]);
        assert_eq!(data[IxDyn(&[1, 0, 0])], 2.0);
        assert_eq!(data[IxDyn(&[2, 0, 0])], 8.0);
        assert_eq!(data[IxDyn(&[3, 1, 1])], 15.0);
    }

    #[test]
    fn test_unmapped_dims_appended_and_coords_dropped() {
        let cube = Datacube::from_fn(["time", "x", "y"], &[2, 4, 4], |_| 0.0)
            .unwrap()
            .with_coords("time", coords(["2024-01-01", "2024-02-01"]))
            .unwrap()
            .with_coords("x", coords([0, 1, 2, 3]))
            .unwrap();
        let tiled = tile(cube, &model(&["batch", "x", "y"], &[-1, 2, 2])).unwrap();
        assert_eq!(tiled.cube.dims(), &["batch", "x", "y", "time"]);
        assert_eq!(tiled.cube.shape(), &[4, 2, 2, 2]);
        assert!(tiled.cube.coords("x").is_none());
        assert_eq!(tiled.cube.coords("time").unwrap().len(), 2);
    }

    #[test]
    fn test_batch_inserted_at_declared_position() {
        let cube = Datacube::from_fn(["band", "x"], &[2, 6], |_| 0.0).unwrap();
        let tiled = tile(cube, &model(&["band", "batch", "x"], &[2, -1, 3])).unwrap();
        assert_eq!(tiled.cube.dims(), &["band", "batch", "x"]);
        assert_eq!(tiled.cube.shape(), &[2, 2, 3]);
    }

    #[test]
    fn test_existing_batch_dimension_is_reused() {
        let cube = Datacube::from_fn(["batches", "x"], &[3, 4], |_| 0.0).unwrap();
        let tiled = tile(cube, &model(&["batch", "x"], &[-1, 2])).unwrap();
        assert_eq!(tiled.cube.dims(), &["batch", "x"]);
        assert_eq!(tiled.cube.shape(), &[6, 2]);
    }

    #[test]
    fn test_too_small_dimension() {
        let cube = Datacube::from_fn(["x"], &[3], |_| 0.0).unwrap();
        let err = tile(cube, &model(&["batch", "x"], &[-1, 4])).unwrap_err();
        assert!(matches!(err, CubeError::DimensionMismatch { required: 4, actual: 3, .. }));
    }
}
