//! Result and restart vectors keyed by step and name.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use nalgebra::DVector;

use crate::error::FsiError;
use crate::processing::csv_writer::write_single_column;

pub trait ResultWriter {
    fn write_vector(&mut self, step: usize, time: f64, name: &str, v: &DVector<f64>) -> Result<(), FsiError>;
}

pub trait RestartReader {
    fn read_vector(&self, step: usize, name: &str) -> Result<DVector<f64>, FsiError>;
}

/// Keeps everything in memory. Used by tests and in-process restarts.
#[derive(Clone, Debug, Default)]
pub struct MemoryResults {
    vectors: HashMap<(usize, String), DVector<f64>>,
    times: HashMap<usize, f64>,
}

impl MemoryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, step: usize, name: &str) -> Option<&DVector<f64>> {
        self.vectors.get(&(step, name.to_string()))
    }

    pub fn time(&self, step: usize) -> Option<f64> {
        self.times.get(&step).copied()
    }

    /// Steps that carry a vector called `name`, ascending.
    pub fn steps(&self, name: &str) -> Vec<usize> {
        let mut steps: Vec<usize> = self
            .vectors
            .keys()
            .filter(|(_, n)| n == name)
            .map(|(s, _)| *s)
            .collect();
        steps.sort_unstable();
        steps
    }
}

impl ResultWriter for MemoryResults {
    fn write_vector(&mut self, step: usize, time: f64, name: &str, v: &DVector<f64>) -> Result<(), FsiError> {
        self.vectors.insert((step, name.to_string()), v.clone());
        self.times.insert(step, time);
        Ok(())
    }
}

impl RestartReader for MemoryResults {
    fn read_vector(&self, step: usize, name: &str) -> Result<DVector<f64>, FsiError> {
        self.get(step, name)
            .cloned()
            .ok_or(FsiError::MissingState("restart vector"))
    }
}

/// One CSV column file per vector: `{dir}/{name}_{step:05}.csv`.
#[derive(Clone, Debug)]
pub struct CsvResultWriter {
    dir: PathBuf,
}

impl CsvResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FsiError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, step: usize, name: &str) -> PathBuf {
        self.dir.join(format!("{name}_{step:05}.csv"))
    }
}

impl ResultWriter for CsvResultWriter {
    fn write_vector(&mut self, step: usize, _time: f64, name: &str, v: &DVector<f64>) -> Result<(), FsiError> {
        write_single_column(self.path(step, name), name, v.as_slice())?;
        Ok(())
    }
}

impl RestartReader for CsvResultWriter {
    fn read_vector(&self, step: usize, name: &str) -> Result<DVector<f64>, FsiError> {
        let content = fs::read_to_string(self.path(step, name))?;
        let values = content
            .lines()
            .skip(1)
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                l.trim().parse::<f64>().map_err(|e| {
                    FsiError::InvalidParameter(format!("restart vector `{name}`: {e}"))
                })
            })
            .collect::<Result<Vec<f64>, FsiError>>()?;
        Ok(DVector::from_vec(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_vectors_read_back() {
        let dir = std::env::temp_dir().join("mfsi_rs_output_test");
        let mut w = CsvResultWriter::new(&dir).unwrap();
        let v = DVector::from_vec(vec![1.5, -2.25e-3, 0.0]);
        w.write_vector(7, 0.7, "fsilambda", &v).unwrap();
        let back = w.read_vector(7, "fsilambda").unwrap();
        assert_eq!(back, v);
        assert!(w.read_vector(8, "fsilambda").is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn memory_results_track_steps() {
        let mut m = MemoryResults::new();
        m.write_vector(2, 0.2, "a", &DVector::zeros(1)).unwrap();
        m.write_vector(1, 0.1, "a", &DVector::zeros(1)).unwrap();
        assert_eq!(m.steps("a"), vec![1, 2]);
        assert!(m.read_vector(3, "a").is_err());
    }
}
