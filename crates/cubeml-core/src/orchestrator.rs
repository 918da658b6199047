//! Inference orchestration.
//!
//! [`InferenceOrchestrator`] drives one model over a datacube:
//!
//! ```text
//! run(cube)
//!   ├── check_datacube_dimensions(ignore_batch = true)
//!   ├── create_object()                -- model handle, at most once
//!   ├── preprocess_datacube()          -- bands, scaling, expression, dtype
//!   ├── tile()                         -- reorder + model-sized windows
//!   └── for each combination of the dimensions the model does not consume
//!         └── feed_to_model()          -- batches, sequentially, in order
//! ```
//!
//! Everything runs synchronously on the caller's thread. Outputs are
//! concatenated along `batch` in enumeration order, so identical inputs give
//! identical results. Validation errors surface before the model is loaded.

use crate::assets::{select_model_asset, AssetMap, LocalFileProvider, ModelAssetProvider};
use crate::backend::ModelBackend;
use crate::batching::{resolve_batch_size, split_into_batches};
use crate::config::EngineConfig;
use crate::datacube::{CoordValue, Datacube};
use crate::dims::{self, DimensionMapping};
use crate::error::{CubeError, CubeResult};
use crate::expression::ExpressionSandbox;
use crate::metadata::{MlmMetadata, ModelInput, ModelOutput, BATCH_DIM};
use crate::preprocessing;
use crate::tiling::{self, Tile};
use crate::validation;
use std::sync::Arc;

/// One position along a dimension the model does not consume.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordSelection {
    pub dim: String,
    /// Position along `dim`
    pub index: usize,
    /// Coordinate label at `index`, or the index itself for unlabelled dimensions
    pub value: CoordValue,
}

/// One selection per dimension the model does not consume.
pub type Combination = Vec<CoordSelection>;

/// How a prediction result was laid out along `batch`.
#[derive(Debug, Clone)]
pub struct PredictionLayout {
    /// Names of the tiled dimensions, aligned with each tile's origin
    pub tiled_dims: Vec<String>,
    /// Tiles in the order they appear within each combination
    pub tiles: Vec<Tile>,
    /// Combinations in the order their outputs were concatenated
    pub combinations: Vec<Combination>,
}

/// Reassembles per-tile model outputs into the original cube layout.
pub trait TileReassembler: Send {
    fn reassemble(&self, result: Datacube, layout: &PredictionLayout) -> CubeResult<Datacube>;
}

/// Placeholder reassembler; reassembly is not provided yet.
#[derive(Debug, Clone, Default)]
pub struct UnimplementedReassembler;

impl TileReassembler for UnimplementedReassembler {
    fn reassemble(&self, _result: Datacube, _layout: &PredictionLayout) -> CubeResult<Datacube> {
        Err(CubeError::not_implemented(
            "reassembling tiled model outputs into the original datacube layout",
        ))
    }
}

/// Drives one model input/output pair over datacubes.
pub struct InferenceOrchestrator {
    metadata: MlmMetadata,
    assets: AssetMap,
    asset_name: Option<String>,
    input_index: usize,
    output_index: usize,
    backend: Box<dyn ModelBackend>,
    provider: Arc<dyn ModelAssetProvider>,
    sandbox: ExpressionSandbox,
    reassembler: Box<dyn TileReassembler>,
}

impl std::fmt::Debug for InferenceOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceOrchestrator")
            .field("model", &self.metadata.name)
            .field("framework", &self.backend.framework())
            .field("input_index", &self.input_index)
            .field("output_index", &self.output_index)
            .field("provider", &self.provider.name())
            .field("loaded", &self.backend.is_loaded())
            .finish()
    }
}

impl InferenceOrchestrator {
    /// Create an orchestrator for the first input and output of `metadata`.
    ///
    /// Model assets are resolved with a [`LocalFileProvider`] until
    /// [`with_provider`](Self::with_provider) installs another one.
    pub fn new(
        metadata: MlmMetadata,
        assets: AssetMap,
        backend: Box<dyn ModelBackend>,
        config: &EngineConfig,
    ) -> CubeResult<Self> {
        config.validate()?;
        let orchestrator = Self {
            metadata,
            assets,
            asset_name: None,
            input_index: 0,
            output_index: 0,
            backend,
            provider: Arc::new(LocalFileProvider),
            sandbox: ExpressionSandbox::new(config),
            reassembler: Box::new(UnimplementedReassembler),
        };
        orchestrator.check_indices()?;
        Ok(orchestrator)
    }

    /// Select which `mlm:input` / `mlm:output` entries to use.
    pub fn with_indices(mut self, input_index: usize, output_index: usize) -> CubeResult<Self> {
        self.input_index = input_index;
        self.output_index = output_index;
        self.check_indices()?;
        Ok(self)
    }

    /// Select a model asset by key instead of relying on there being one.
    pub fn with_asset_name(mut self, name: impl Into<String>) -> Self {
        self.asset_name = Some(name.into());
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelAssetProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_sandbox(mut self, sandbox: ExpressionSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_reassembler(mut self, reassembler: Box<dyn TileReassembler>) -> Self {
        self.reassembler = reassembler;
        self
    }

    fn check_indices(&self) -> CubeResult<()> {
        if self.input_index >= self.metadata.input.len() {
            return Err(CubeError::config(format!(
                "input index {} is out of range; the model declares {} input(s)",
                self.input_index,
                self.metadata.input.len()
            )));
        }
        if self.output_index >= self.metadata.output.len() {
            return Err(CubeError::config(format!(
                "output index {} is out of range; the model declares {} output(s)",
                self.output_index,
                self.metadata.output.len()
            )));
        }
        Ok(())
    }

    pub fn metadata(&self) -> &MlmMetadata {
        &self.metadata
    }

    pub fn input(&self) -> &ModelInput {
        &self.metadata.input[self.input_index]
    }

    pub fn output(&self) -> &ModelOutput {
        &self.metadata.output[self.output_index]
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    /// Validate a cube against the selected model input.
    pub fn check_datacube_dimensions(&self, cube: &Datacube, ignore_batch: bool) -> CubeResult<DimensionMapping> {
        validation::check_datacube_dimensions(cube, self.input(), ignore_batch)
    }

    /// Number of tiles fed to the backend per call.
    pub fn batch_size(&self) -> usize {
        resolve_batch_size(&self.input().input, self.metadata.batch_size_suggestion)
    }

    /// Load the model if it is not loaded yet.
    pub fn create_object(&mut self) -> CubeResult<()> {
        if self.backend.is_loaded() {
            return Ok(());
        }
        let (key, asset) = select_model_asset(&self.assets, self.asset_name.as_deref())?;
        let path = self.provider.resolve_local_path(&asset.href)?;
        log::info!(
            "Creating {} model object from asset '{}' ({})",
            self.backend.framework(),
            key,
            path.display()
        );
        self.backend.create_model_object(&path)?;
        Ok(())
    }

    /// Release the model handle. The next run loads it again.
    pub fn teardown(&mut self) {
        if self.backend.is_loaded() {
            log::info!("Releasing {} model object", self.backend.framework());
        }
        self.backend.release();
    }

    /// Materialize the cube and apply band selection, scaling, the
    /// pre-processing expression and the dtype cast.
    pub fn preprocess_datacube(&self, cube: Datacube) -> CubeResult<Datacube> {
        preprocessing::preprocess(cube.compute()?, self.input(), &self.sandbox)
    }

    /// Coordinate combinations of the dimensions the model does not consume.
    ///
    /// Enumerated as a cartesian product with the first dimension varying
    /// slowest. Every position along each dimension is visited, so repeated
    /// or non-comparable labels still address distinct slices. Dimensions
    /// without coordinate labels report their integer positions. When every
    /// dimension is consumed there is exactly one, empty, combination.
    pub fn subset_combinations(&self, cube: &Datacube) -> Vec<Combination> {
        let mapping = dims::resolve(self.input().dim_order(), cube.dims());
        let consumed = mapping.cube_dims_in_model();
        let free: Vec<&String> = cube
            .dims()
            .iter()
            .filter(|d| d.as_str() != BATCH_DIM && !consumed.contains(&d.as_str()))
            .collect();

        let mut combinations: Vec<Combination> = vec![Vec::new()];
        for dim in free {
            let selections: Vec<CoordSelection> = (0..cube.len_of(dim).unwrap_or_default())
                .map(|index| CoordSelection {
                    dim: dim.clone(),
                    index,
                    value: cube
                        .coords(dim)
                        .map_or(CoordValue::Int(index as i64), |labels| labels[index].clone()),
                })
                .collect();
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    selections.iter().map(move |selection| {
                        let mut combination = prefix.clone();
                        combination.push(selection.clone());
                        combination
                    })
                })
                .collect();
        }
        combinations
    }

    /// Names for the axes of a backend output of rank `rank`.
    fn output_dims(&self, rank: usize) -> Vec<String> {
        let declared = &self.output().result.dim_order;
        if declared.len() == rank && declared.iter().any(|d| d == BATCH_DIM) {
            return declared.clone();
        }
        (0..rank)
            .map(|i| if i == 0 { BATCH_DIM.to_string() } else { format!("dim_{}", i) })
            .collect()
    }

    /// Run a tiled subset through the backend batch by batch.
    pub fn feed_to_model(&mut self, cube: Datacube, batch_size: usize) -> CubeResult<Datacube> {
        let total = cube.len_of(BATCH_DIM).ok_or_else(|| {
            CubeError::DimensionMissing("tiled datacube has no 'batch' dimension".to_string())
        })?;
        let batches = split_into_batches(total, batch_size);

        let mut outputs = Vec::with_capacity(batches.len());
        for (n, range) in batches.into_iter().enumerate() {
            log::debug!(
                target: "cubeml_core",
                "Dispatching batch {} (tiles {}..{} of {})",
                n,
                range.start,
                range.end,
                total
            );
            let batch = cube.slice_axis(BATCH_DIM, range)?.into_data()?;
            let result = self.backend.execute_model(batch)?;
            let mut out = Datacube::new(self.output_dims(result.ndim()), result)?;
            if let Some(expression) = &self.output().post_processing_function {
                out = self.sandbox.run_expression(out, expression)?;
            }
            outputs.push(out);
        }
        Datacube::concat(&outputs, BATCH_DIM)
    }

    /// Run the model and report how the result is laid out along `batch`.
    pub fn run_with_layout(&mut self, cube: Datacube) -> CubeResult<(Datacube, PredictionLayout)> {
        log::info!(
            "Validating datacube [{}] against model input '{}'",
            cube.dims().join(", "),
            self.input().name
        );
        self.check_datacube_dimensions(&cube, true)?;

        self.create_object()?;

        let preprocessed = self.preprocess_datacube(cube)?;
        let tiled = tiling::tile(preprocessed, self.input())?;
        log::info!(
            "Tiled datacube into {} window(s) over [{}]",
            tiled.tile_count(),
            tiled.tiled_dims.join(", ")
        );

        let combinations = self.subset_combinations(&tiled.cube);
        let batch_size = self.batch_size();
        log::debug!(
            target: "cubeml_core",
            "Resolved batch size {} for {} combination(s)",
            batch_size,
            combinations.len()
        );

        let mut results = Vec::with_capacity(combinations.len());
        for combination in &combinations {
            let mut subset = tiled.cube.clone();
            for selection in combination {
                subset = subset.select_position(&selection.dim, selection.index)?;
            }
            results.push(self.feed_to_model(subset, batch_size)?);
        }
        let result = Datacube::concat(&results, BATCH_DIM)?;

        let layout = PredictionLayout {
            tiled_dims: tiled.tiled_dims,
            tiles: tiled.tiles,
            combinations,
        };
        Ok((result, layout))
    }

    /// Run the model over a datacube.
    ///
    /// The result holds one entry along `batch` per tile and combination;
    /// it is not reassembled into the input's spatial layout.
    pub fn run(&mut self, cube: Datacube) -> CubeResult<Datacube> {
        self.run_with_layout(cube).map(|(result, _)| result)
    }

    /// Reassemble a result into the original datacube layout.
    pub fn postprocess_datacube(&self, result: Datacube, layout: &PredictionLayout) -> CubeResult<Datacube> {
        self.reassembler.reassemble(result, layout)
    }
}
