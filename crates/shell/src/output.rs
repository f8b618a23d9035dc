//! The output side of the binaries: subsample.json, distance.txt, and the
//! optional distance filter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use subsample::ResultSink;

use crate::point::DiagramTuple;

/// Writes subsample.json once the subsampling pipeline finishes.
///
/// The retained sample indices are written in ascending order, together with
/// the job parameters, so `compute-distances` can re-load exactly the
/// retained tuples.
pub struct SubsampleSink {
    /// The samples.json path, recorded verbatim in the output.
    samples_path: String,
    /// The δ parameter of the job.
    delta: f64,
    /// The order of the distance; `∞` is recorded as the string `"inf"`.
    p: f64,
    /// Where to write the JSON.
    out_path: PathBuf,
}

impl SubsampleSink {
    /// Creates the sink.
    pub fn new<Q: Into<PathBuf>>(samples_path: String, delta: f64, p: f64, out_path: Q) -> Self {
        Self { samples_path, delta, p, out_path: out_path.into() }
    }
}

impl ResultSink<DiagramTuple> for SubsampleSink {
    fn accept(&mut self, results: &[DiagramTuple]) -> Result<(), String> {
        let mut indices: Vec<i64> = results.iter().map(|tuple| tuple.id).collect();
        indices.sort_unstable();
        let output = json!({
            "sample": self.samples_path,
            "delta": self.delta,
            "p": order_to_json(self.p),
            "subsample": indices,
        });
        std::fs::write(&self.out_path, output.to_string())
            .map_err(|e| format!("cannot write subsample file {}: {e}", self.out_path.display()))
    }
}

/// Writes distance.txt: one line of space-separated doubles, the
/// upper-triangular distance matrix in row-major order.
pub struct MatrixSink {
    /// Where to write the matrix.
    out_path: PathBuf,
}

impl MatrixSink {
    /// Creates the sink.
    pub fn new<Q: Into<PathBuf>>(out_path: Q) -> Self {
        Self { out_path: out_path.into() }
    }
}

impl ResultSink<f64> for MatrixSink {
    fn accept(&mut self, results: &[f64]) -> Result<(), String> {
        let line = results.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        std::fs::write(&self.out_path, format!("{line}\n"))
            .map_err(|e| format!("cannot write distance file {}: {e}", self.out_path.display()))
    }
}

/// The parsed subsample.json file.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubsampleFile {
    /// The samples.json path the subsample was computed from.
    pub sample: String,
    /// The δ parameter of the job.
    pub delta: f64,
    /// The order of the distance: the string `"inf"` or a number.
    #[serde(default)]
    pub p: Option<serde_json::Value>,
    /// The retained sample indices, ascending.
    pub subsample: Vec<usize>,
}

impl SubsampleFile {
    /// Parses a subsample.json file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not of the expected shape.
    pub fn read<Q: AsRef<Path>>(path: Q) -> Result<Self, String> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| format!("cannot read subsample file {}: {e}", path.display()))?;
        serde_json::from_str(&contents).map_err(|e| format!("malformed subsample file {}: {e}", path.display()))
    }

    /// The recorded order of the distance; absent or unreadable means `∞`.
    #[must_use]
    pub fn order(&self) -> f64 {
        self.p.as_ref().map_or(f64::INFINITY, |value| match value {
            serde_json::Value::Number(number) => number.as_f64().unwrap_or(f64::INFINITY),
            serde_json::Value::String(text) => text.parse().unwrap_or(f64::INFINITY),
            _ => f64::INFINITY,
        })
    }
}

/// Renders the distance order for subsample.json, `∞` as `"inf"`.
fn order_to_json(p: f64) -> serde_json::Value {
    if p.is_infinite() { json!("inf") } else { json!(p) }
}

/// Parses a distance-filter file: space-separated 0/1 flags, one per
/// upper-triangular pair.
///
/// # Errors
///
/// If the file cannot be read or an entry is not 0 or 1.
pub fn read_filter<Q: AsRef<Path>>(path: Q) -> Result<Vec<u8>, String> {
    let path = path.as_ref();
    let contents =
        std::fs::read_to_string(path).map_err(|e| format!("cannot read distance filter {}: {e}", path.display()))?;
    contents
        .split_whitespace()
        .map(|entry| match entry {
            "0" => Ok(0),
            "1" => Ok(1),
            other => Err(format!("distance filter {}: unexpected entry {other:?}", path.display())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn order_round_trips_through_json() {
        assert_eq!(order_to_json(f64::INFINITY), serde_json::Value::String("inf".into()));
        assert_eq!(order_to_json(2.0), serde_json::json!(2.0));

        let inf: SubsampleFile =
            serde_json::from_str(r#"{"sample":"s.json","delta":0.1,"p":"inf","subsample":[0,2]}"#).unwrap();
        assert!(inf.order().is_infinite());

        let finite: SubsampleFile =
            serde_json::from_str(r#"{"sample":"s.json","delta":0.1,"p":2.0,"subsample":[]}"#).unwrap();
        assert_eq!(finite.order(), 2.0);

        let absent: SubsampleFile =
            serde_json::from_str(r#"{"sample":"s.json","delta":0.1,"subsample":[]}"#).unwrap();
        assert!(absent.order().is_infinite());
    }

    #[test]
    fn filter_entries_must_be_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.txt");
        std::fs::write(&path, "1 0 1").unwrap();
        assert_eq!(read_filter(&path).unwrap(), vec![1, 0, 1]);

        std::fs::write(&path, "1 2").unwrap();
        assert!(read_filter(&path).is_err());
    }
}
