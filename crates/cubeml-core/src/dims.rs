//! Dimension-name resolution.
//!
//! Model metadata names its dimensions with an abstract vocabulary
//! (`batch`, `band`, `x`, ...) while datacubes use whatever names their
//! producer chose (`bands`, `lon`, `t`, ...). Resolution first tries an exact
//! name match and otherwise falls back to a fixed set of synonym classes.
//!
//! Several model names may resolve to the same physical cube dimension; the
//! resolver does not check the mapping for uniqueness.

/// Groups of interchangeable dimension names.
///
/// Within a class, synonyms are listed in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynonymClass {
    Time,
    Band,
    X,
    Y,
    Batch,
}

impl SynonymClass {
    pub const ALL: [SynonymClass; 5] = [
        SynonymClass::Time,
        SynonymClass::Band,
        SynonymClass::X,
        SynonymClass::Y,
        SynonymClass::Batch,
    ];

    /// Synonyms of this class, in priority order.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            SynonymClass::Time => &["time", "times", "t", "date", "dates", "DATE"],
            SynonymClass::Band => &["band", "bands", "b", "channel", "channels"],
            SynonymClass::X => &["x", "lon", "lng", "longitude"],
            SynonymClass::Y => &["y", "lat", "latitude"],
            SynonymClass::Batch => &["batch", "batches"],
        }
    }

    /// The class a dimension name belongs to, if any.
    pub fn classify(name: &str) -> Option<SynonymClass> {
        Self::ALL
            .into_iter()
            .find(|class| class.synonyms().contains(&name))
    }

    /// First synonym of this class present among `cube_dims`.
    ///
    /// Ties are broken by the class's own order, not by cube order.
    pub fn find_in<'a, S: AsRef<str>>(&self, cube_dims: &'a [S]) -> Option<&'a str> {
        self.synonyms().iter().find_map(|synonym| {
            cube_dims
                .iter()
                .map(AsRef::as_ref)
                .find(|d| d == synonym)
        })
    }
}

/// A model dimension resolved to a datacube dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDim {
    /// Datacube dimension name
    pub name: String,
    /// Position of that dimension in the datacube
    pub index: usize,
}

/// One entry per model dimension, in model order; `None` when unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMapping {
    entries: Vec<Option<ResolvedDim>>,
}

impl DimensionMapping {
    pub fn entries(&self) -> &[Option<ResolvedDim>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, model_index: usize) -> Option<&ResolvedDim> {
        self.entries.get(model_index).and_then(Option::as_ref)
    }

    /// Model dimension names whose entry is unresolved.
    pub fn unmatched<'a, S: AsRef<str>>(&self, model_dims: &'a [S]) -> Vec<&'a str> {
        model_dims
            .iter()
            .zip(&self.entries)
            .filter(|(_, entry)| entry.is_none())
            .map(|(name, _)| name.as_ref())
            .collect()
    }

    /// Names of the datacube dimensions consumed by the model, in model order.
    pub fn cube_dims_in_model(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flatten()
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Resolve one model dimension name against the datacube's dimension names.
pub fn resolve_dimension<'a, S: AsRef<str>>(model_dim: &str, cube_dims: &'a [S]) -> Option<&'a str> {
    if let Some(exact) = cube_dims.iter().map(AsRef::as_ref).find(|d| *d == model_dim) {
        return Some(exact);
    }
    SynonymClass::classify(model_dim).and_then(|class| class.find_in(cube_dims))
}

/// Map every model dimension to a datacube dimension.
///
/// The result always has exactly one entry per model dimension.
pub fn resolve<M, C>(model_dims: &[M], cube_dims: &[C]) -> DimensionMapping
where
    M: AsRef<str>,
    C: AsRef<str>,
{
    let entries = model_dims
        .iter()
        .map(|model_dim| {
            resolve_dimension(model_dim.as_ref(), cube_dims).map(|name| ResolvedDim {
                name: name.to_string(),
                index: cube_dims
                    .iter()
                    .position(|d| d.as_ref() == name)
                    .unwrap_or_default(),
            })
        })
        .collect();
    DimensionMapping { entries }
}

/// The datacube's band dimension, found via the band synonym class.
pub fn band_dimension<S: AsRef<str>>(cube_dims: &[S]) -> Option<&str> {
    SynonymClass::Band.find_in(cube_dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(mapping: &DimensionMapping) -> Vec<Option<usize>> {
        mapping
            .entries()
            .iter()
            .map(|e| e.as_ref().map(|r| r.index))
            .collect()
    }

    #[test]
    fn test_exact_and_synonym_matches() {
        let cases: [(&[&str], &[&str], &[Option<usize>]); 4] = [
            (&["bands", "x", "y", "time"], &["band", "x", "y", "time"], &[Some(0), Some(1), Some(2), Some(3)]),
            (&["band", "x", "y", "time"], &["band", "lon", "lat", "t"], &[Some(0), Some(1), Some(2), Some(3)]),
            (&["t", "x", "y", "channel"], &["band", "x", "y", "time"], &[Some(3), Some(1), Some(2), Some(0)]),
            (&["x", "y", "asdf"], &["x", "y", "bands", "t"], &[Some(0), Some(1), None]),
        ];
        for (model, cube, expected) in cases {
            let mapping = resolve(model, cube);
            assert_eq!(mapping.len(), model.len());
            assert_eq!(indices(&mapping), expected.to_vec(), "model {:?} cube {:?}", model, cube);
            for entry in mapping.entries().iter().flatten() {
                assert_eq!(cube[entry.index], entry.name);
            }
        }
    }

    #[test]
    fn test_every_spelling_resolves_to_same_dimension() {
        for class in SynonymClass::ALL {
            for present in class.synonyms() {
                let cube = ["other", *present];
                for spelling in class.synonyms() {
                    assert_eq!(
                        resolve_dimension(spelling, &cube),
                        Some(*present),
                        "{} should resolve to {}",
                        spelling,
                        present
                    );
                }
            }
        }
    }

    #[test]
    fn test_ties_broken_by_class_order() {
        // "band" precedes "channel" in the class even though cube order is reversed
        let cube = ["channel", "band"];
        assert_eq!(resolve_dimension("b", &cube), Some("band"));
    }

    #[test]
    fn test_exact_match_wins_over_class_order() {
        let cube = ["band", "channel"];
        assert_eq!(resolve_dimension("channel", &cube), Some("channel"));
    }

    #[test]
    fn test_many_to_one_allowed() {
        let mapping = resolve(&["band", "channel"], &["bands"]);
        assert_eq!(indices(&mapping), vec![Some(0), Some(0)]);
    }

    #[test]
    fn test_unknown_names_unresolved() {
        let mapping = resolve(&["width", "height"], &["x", "y"]);
        assert_eq!(mapping.unmatched(&["width", "height"]), vec!["width", "height"]);
    }

    #[test]
    fn test_band_dimension() {
        assert_eq!(band_dimension(&["x", "channels"]), Some("channels"));
        assert_eq!(band_dimension(&["x", "asdf"]), None);
    }
}
