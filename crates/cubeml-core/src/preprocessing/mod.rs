//! Input preprocessing: band selection, value scaling, the optional
//! pre-processing expression, and the cast to the model's data type.

pub mod bands;
pub mod scaling;

pub use bands::{band_aliases, find_band, select_bands};
pub use scaling::apply_value_scaling;

use crate::datacube::Datacube;
use crate::error::CubeResult;
use crate::expression::ExpressionSandbox;
use crate::metadata::ModelInput;

/// Prepare a materialized cube for tiling.
pub fn preprocess(cube: Datacube, input: &ModelInput, sandbox: &ExpressionSandbox) -> CubeResult<Datacube> {
    let cube = select_bands(cube, input)?;
    let cube = apply_value_scaling(cube, input.value_scaling.as_deref())?;
    let cube = match &input.pre_processing_function {
        Some(expression) => {
            log::debug!(target: "cubeml_core", "Running pre-processing expression '{}'", expression.expression);
            sandbox.run_expression(cube, expression)?
        }
        None => cube,
    };
    cube.astype(input.input.data_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::datacube::coords;
    use crate::metadata::{DataType, InputStructure, ProcessingExpression, ValueScaling};
    use ndarray::IxDyn;

    fn cube() -> Datacube {
        Datacube::from_fn(["band", "x"], &[3, 2], |idx| (idx[0] * 1000 + idx[1]) as f32 + 0.5)
            .unwrap()
            .with_coords("band", coords(["B02", "B03", "B04"]))
            .unwrap()
    }

    #[test]
    fn test_preprocess_pipeline() {
        let input = ModelInput::new("input", InputStructure::new(&["band", "x"], &[2, 2], DataType::Int16))
            .with_bands(["B04", "B02"])
            .with_value_scaling(vec![ValueScaling::Scale { value: 0.5 }]);
        let sandbox = ExpressionSandbox::new(&EngineConfig::default());

        let out = preprocess(cube(), &input, &sandbox).unwrap();
        assert_eq!(out.dtype(), DataType::Int16);
        assert_eq!(out.coords("band").unwrap(), &coords(["B04", "B02"])[..]);
        // (2000.5 / 0.5) truncated
        assert_eq!(out.data().unwrap()[IxDyn(&[0, 0])], 4001.0);
        assert_eq!(out.data().unwrap()[IxDyn(&[1, 1])], 3.0);
    }

    #[test]
    fn test_preprocess_expression_disabled() {
        let input = ModelInput::new("input", InputStructure::new(&["band", "x"], &[3, 2], DataType::Float32))
            .with_pre_processing(ProcessingExpression::python("numpy:negative"));
        let config = EngineConfig::default().with_processing_functions(false);
        let sandbox = ExpressionSandbox::new(&config);
        assert!(preprocess(cube(), &input, &sandbox).is_err());
    }
}
