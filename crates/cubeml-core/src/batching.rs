//! Batch-size policy and batch partitioning.

use crate::metadata::{InputStructure, WILDCARD_SIZE};
use std::ops::Range;

/// Batch size used when the model accepts any batch size and suggests none.
pub const FALLBACK_BATCH_SIZE: usize = 12;

/// Decide how many tiles go into one inference call.
///
/// | `batch` in `dim_order` | suggestion | result |
/// |---|---|---|
/// | no | absent | 1 |
/// | no | present | suggestion |
/// | yes, wildcard | absent | [`FALLBACK_BATCH_SIZE`] |
/// | yes, fixed | absent | declared size |
/// | yes, wildcard | present | suggestion |
/// | yes, fixed | present | declared size |
///
/// A fixed declared size always wins over the suggestion.
pub fn resolve_batch_size(input: &InputStructure, suggestion: Option<usize>) -> usize {
    let declared = input
        .batch_index()
        .map(|index| input.shape.get(index).copied().unwrap_or(WILDCARD_SIZE));

    let size = match (declared, suggestion) {
        (None, None) => 1,
        (None, Some(suggested)) => suggested,
        (Some(WILDCARD_SIZE), None) => FALLBACK_BATCH_SIZE,
        (Some(WILDCARD_SIZE), Some(suggested)) => suggested,
        (Some(fixed), _) => usize::try_from(fixed).unwrap_or(FALLBACK_BATCH_SIZE),
    };
    // A zero batch size would never make progress
    size.max(1)
}

/// Half-open ranges `[i, min(i + batch_size, total))` covering `0..total`.
pub fn split_into_batches(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DataType;

    fn structure(dim_order: &[&str], shape: &[i64]) -> InputStructure {
        InputStructure::new(dim_order, shape, DataType::Float32)
    }

    #[test]
    fn test_batch_size_table() {
        let no_batch = structure(&["band", "x", "y"], &[3, 5, 5]);
        let wildcard = structure(&["batch", "band", "x", "y"], &[-1, 3, 5, 5]);
        let fixed = structure(&["batch", "band", "x", "y"], &[8, 3, 5, 5]);

        assert_eq!(resolve_batch_size(&no_batch, None), 1);
        assert_eq!(resolve_batch_size(&no_batch, Some(4)), 4);
        assert_eq!(resolve_batch_size(&wildcard, None), FALLBACK_BATCH_SIZE);
        assert_eq!(resolve_batch_size(&fixed, None), 8);
        assert_eq!(resolve_batch_size(&wildcard, Some(4)), 4);
        assert_eq!(resolve_batch_size(&fixed, Some(8)), 8);
        assert_eq!(resolve_batch_size(&fixed, Some(4)), 8);
    }

    #[test]
    fn test_split_into_batches() {
        assert_eq!(split_into_batches(10, 4), vec![0..4, 4..8, 8..10]);
        assert_eq!(split_into_batches(8, 4), vec![0..4, 4..8]);
        assert_eq!(split_into_batches(3, 12), vec![0..3]);
        assert!(split_into_batches(0, 4).is_empty());
    }

    #[test]
    fn test_split_covers_range_contiguously() {
        for total in 0..30 {
            for batch_size in 1..7 {
                let batches = split_into_batches(total, batch_size);
                let mut next = 0;
                for range in &batches {
                    assert_eq!(range.start, next);
                    assert!(range.len() <= batch_size && !range.is_empty());
                    next = range.end;
                }
                assert_eq!(next, total);
            }
        }
    }
}
