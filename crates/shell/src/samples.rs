//! Reading the samples.json configuration and the diagram files it names.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Deserialize;

use persistence::PersistenceDiagram;
use subsample::PointSource;

use crate::point::DiagramTuple;

/// The parsed samples.json file.
///
/// ```json
/// { "path": "<basepath>", "sample": [ ["file_a", "file_b"], ... ] }
/// ```
///
/// Each inner array names the diagram files of one sample; the loader joins
/// `path` with each filename.
#[derive(Debug, Deserialize)]
pub struct SamplesFile {
    /// Base path joined with every diagram filename.
    pub path: String,
    /// One filename tuple per sample.
    pub sample: Vec<Vec<String>>,
}

impl SamplesFile {
    /// Parses a samples.json file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not of the expected shape.
    pub fn read<Q: AsRef<Path>>(path: Q) -> Result<Self, String> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| format!("cannot read samples file {}: {e}", path.display()))?;
        serde_json::from_str(&contents).map_err(|e| format!("malformed samples file {}: {e}", path.display()))
    }

    /// Number of samples named by the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sample.len()
    }

    /// Whether the file names no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    /// Loads the diagram tuple at `index`, with that index as its id.
    ///
    /// # Errors
    ///
    /// If `index` is out of range or a diagram file fails to load.
    pub fn tuple(&self, index: usize) -> Result<DiagramTuple, String> {
        let files = self.sample.get(index).ok_or_else(|| format!("sample index {index} out of range"))?;
        let base = PathBuf::from(&self.path);
        let diagrams = files
            .iter()
            .map(|file| PersistenceDiagram::load(base.join(file)))
            .collect::<Result<Vec<_>, _>>()?;
        let id = i64::try_from(index).map_err(|_| format!("sample index {index} overflows an id"))?;
        Ok(DiagramTuple { id, diagrams })
    }

    /// Loads every sample, in file order.
    ///
    /// # Errors
    ///
    /// If any diagram file fails to load.
    pub fn load_all(&self) -> Result<Vec<DiagramTuple>, String> {
        (0..self.len()).into_par_iter().map(|index| self.tuple(index)).collect()
    }

    /// Loads only the samples at the given indices, in the given order.
    ///
    /// # Errors
    ///
    /// If an index is out of range or a diagram file fails to load.
    pub fn load_indices(&self, indices: &[usize]) -> Result<Vec<DiagramTuple>, String> {
        indices.par_iter().map(|&index| self.tuple(index)).collect()
    }
}

impl PointSource<DiagramTuple> for SamplesFile {
    fn points(&self) -> Result<Vec<DiagramTuple>, String> {
        self.load_all()
    }
}
