//! Output helpers for vision-transformer encoders.
//!
//! Encoder outputs are `(batch, tokens, embedding)` cubes. The patch helpers
//! rearrange the patch tokens into a square `(batch, patch_y, patch_x,
//! embedding)` raster; the CLS helpers pick the class token. The multilevel
//! helper takes the hidden states of every encoder layer stacked as
//! `(batch, level, tokens, embedding)`.

use super::registry::ExpressionRegistry;
use crate::datacube::Datacube;
use crate::error::{CubeError, CubeResult};
use ndarray::{Axis, IxDyn};

/// Module path the helpers are registered under.
pub const VIT_TOOLS_MODULE: &str = "ml_datacube_bridge.output_preprocessing_functions.torch_vit_encoder_tools";

pub(crate) fn register(registry: &mut ExpressionRegistry) {
    registry
        .register_function(
            VIT_TOOLS_MODULE,
            "get_patch_embeddings_without_cls_square",
            patch_embeddings_without_cls_square,
        )
        .register_function(
            VIT_TOOLS_MODULE,
            "get_patch_embeddings_with_cls_square",
            patch_embeddings_with_cls_square,
        )
        .register_function(
            VIT_TOOLS_MODULE,
            "get_patch_embedding_without_cls_square_multilevel",
            patch_embeddings_without_cls_square_multilevel,
        )
        .register_function(
            VIT_TOOLS_MODULE,
            "get_image_cls_embedding_prepended_torch",
            cls_embedding_prepended,
        )
        .register_function(
            VIT_TOOLS_MODULE,
            "get_image_cls_embedding_appended_torch",
            cls_embedding_appended,
        );
}

fn encoder_dims(cube: &Datacube) -> CubeResult<(usize, usize, usize)> {
    match cube.shape() {
        &[batch, tokens, embedding] => Ok((batch, tokens, embedding)),
        other => Err(CubeError::expression(format!(
            "expected a (batch, tokens, embedding) encoder output, got shape {:?}",
            other
        ))),
    }
}

fn square_side(patches: usize) -> CubeResult<usize> {
    let side = (patches as f64).sqrt().round() as usize;
    if side * side != patches {
        return Err(CubeError::expression(format!(
            "cannot arrange {} patch embeddings into an n*n raster; \
             if the output includes a CLS token use get_patch_embeddings_with_cls_square",
            patches
        )));
    }
    Ok(side)
}

fn reorder_patch_embeddings(cube: Datacube) -> CubeResult<Datacube> {
    let (batch, patches, embedding) = encoder_dims(&cube)?;
    let side = square_side(patches)?;
    let dims = [
        cube.dims()[0].clone(),
        "patch_y".to_string(),
        "patch_x".to_string(),
        cube.dims()[2].clone(),
    ];
    let array = cube
        .into_data()?
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&[batch, side, side, embedding]))?;
    Datacube::new(dims, array)
}

/// Patch tokens without a CLS token, as a square raster.
pub fn patch_embeddings_without_cls_square(cube: Datacube) -> CubeResult<Datacube> {
    reorder_patch_embeddings(cube)
}

/// Patch tokens after a leading CLS token, as a square raster.
pub fn patch_embeddings_with_cls_square(cube: Datacube) -> CubeResult<Datacube> {
    let (_, tokens, _) = encoder_dims(&cube)?;
    if tokens == 0 {
        return Err(CubeError::expression("encoder output has no tokens"));
    }
    let token_dim = cube.dims()[1].clone();
    reorder_patch_embeddings(cube.slice_axis(&token_dim, 1..tokens)?)
}

/// Patch tokens of every encoder level, without CLS tokens, as square
/// rasters of shape `(batch, level, patch_y, patch_x, embedding)`.
pub fn patch_embeddings_without_cls_square_multilevel(cube: Datacube) -> CubeResult<Datacube> {
    let (batch, levels, patches, embedding) = match cube.shape() {
        &[batch, levels, patches, embedding] => (batch, levels, patches, embedding),
        other => {
            return Err(CubeError::expression(format!(
                "expected a (batch, level, tokens, embedding) encoder output, got shape {:?}",
                other
            )))
        }
    };
    let side = square_side(patches)?;
    let dims = [
        cube.dims()[0].clone(),
        cube.dims()[1].clone(),
        "patch_y".to_string(),
        "patch_x".to_string(),
        cube.dims()[3].clone(),
    ];
    let array = cube
        .into_data()?
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order(IxDyn(&[batch, levels, side, side, embedding]))?;
    Datacube::new(dims, array)
}

fn token(cube: Datacube, pick: impl Fn(usize) -> Option<usize>) -> CubeResult<Datacube> {
    let (_, tokens, _) = encoder_dims(&cube)?;
    let index = pick(tokens).ok_or_else(|| CubeError::expression("encoder output has no tokens"))?;
    let dims = [cube.dims()[0].clone(), cube.dims()[2].clone()];
    let array = cube.data()?.index_axis(Axis(1), index).to_owned();
    Datacube::new(dims, array)
}

/// The CLS token at position 0, shape `(batch, embedding)`.
pub fn cls_embedding_prepended(cube: Datacube) -> CubeResult<Datacube> {
    token(cube, |tokens| (tokens > 0).then_some(0))
}

/// The CLS token at the last position, shape `(batch, embedding)`.
pub fn cls_embedding_appended(cube: Datacube) -> CubeResult<Datacube> {
    token(cube, |tokens| tokens.checked_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn encoder_output(tokens: usize) -> Datacube {
        Datacube::from_fn(["batch", "token", "embedding"], &[2, tokens, 3], |idx| {
            (idx[0] * 100 + idx[1] * 10 + idx[2]) as f32
        })
        .unwrap()
    }

    #[test]
    fn test_patch_embeddings_without_cls() {
        let out = patch_embeddings_without_cls_square(encoder_output(4)).unwrap();
        assert_eq!(out.dims(), &["batch", "patch_y", "patch_x", "embedding"]);
        assert_eq!(out.shape(), &[2, 2, 2, 3]);
        // token 3 lands at (1, 1)
        assert_eq!(out.data().unwrap()[IxDyn(&[1, 1, 1, 2])], 132.0);
    }

    #[test]
    fn test_patch_embeddings_with_cls() {
        let out = patch_embeddings_with_cls_square(encoder_output(10)).unwrap();
        assert_eq!(out.shape(), &[2, 3, 3, 3]);
        // token 1 becomes the first patch
        assert_eq!(out.data().unwrap()[IxDyn(&[0, 0, 0, 0])], 10.0);
    }

    #[test]
    fn test_multilevel_patch_embeddings() {
        let levels = Datacube::from_fn(["batch", "level", "token", "embedding"], &[2, 3, 4, 2], |idx| {
            (idx[0] * 1000 + idx[1] * 100 + idx[2] * 10 + idx[3]) as f32
        })
        .unwrap();
        let out = patch_embeddings_without_cls_square_multilevel(levels).unwrap();
        assert_eq!(out.dims(), &["batch", "level", "patch_y", "patch_x", "embedding"]);
        assert_eq!(out.shape(), &[2, 3, 2, 2, 2]);
        // level 2, token 2 lands at (1, 0)
        assert_eq!(out.data().unwrap()[IxDyn(&[1, 2, 1, 0, 1])], 1221.0);

        let err = patch_embeddings_without_cls_square_multilevel(encoder_output(4)).unwrap_err();
        assert!(matches!(err, CubeError::ExpressionEvaluation(_)));
    }

    #[test]
    fn test_non_square_patch_count() {
        let err = patch_embeddings_without_cls_square(encoder_output(5)).unwrap_err();
        assert!(matches!(err, CubeError::ExpressionEvaluation(_)));
    }

    #[test]
    fn test_cls_embeddings() {
        let first = cls_embedding_prepended(encoder_output(5)).unwrap();
        assert_eq!(first.dims(), &["batch", "embedding"]);
        assert_eq!(first.data().unwrap()[IxDyn(&[1, 2])], 102.0);

        let last = cls_embedding_appended(encoder_output(5)).unwrap();
        assert_eq!(last.data().unwrap()[IxDyn(&[1, 2])], 142.0);
    }

    #[test]
    fn test_registered_under_module() {
        let registry = ExpressionRegistry::with_builtins();
        assert!(registry.has_module(VIT_TOOLS_MODULE));
    }
}
