use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::processing::summary::RunSummary;

/// Write column data to a CSV file with one header per column.
pub fn write_csv<P: AsRef<Path>>(path: P, headers: &[&str], data: &[Vec<f64>]) -> io::Result<()> {
    if !headers.is_empty() && !data.is_empty() && headers.len() != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                data.len()
            ),
        ));
    }

    let mut file = File::create(path)?;
    writeln!(file, "{}", headers.join(","))?;

    let n_rows = data.iter().map(|col| col.len()).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = data
            .iter()
            .map(|col| col.get(i).map_or_else(String::new, |v| format!("{v:.15e}")))
            .collect();
        writeln!(file, "{}", row.join(","))?;
    }

    Ok(())
}

pub fn write_single_column<P: AsRef<Path>>(path: P, header: &str, data: &[f64]) -> io::Result<()> {
    write_csv(path, &[header], &[data.to_vec()])
}

/// Per-step interface energy: `step,time,energy,energy_sum`.
pub fn write_energy<P: AsRef<Path>>(path: P, summary: &RunSummary) -> io::Result<()> {
    let steps = summary.steps.iter().map(|s| s.step as f64).collect();
    let times = summary.steps.iter().map(|s| s.time).collect();
    let increments: Vec<f64> = summary.steps.iter().map(|s| s.energy_increment).collect();
    let cumulative = increments
        .iter()
        .scan(0.0, |acc, e| {
            *acc += e;
            Some(*acc)
        })
        .collect();
    write_csv(
        path,
        &["step", "time", "energy", "energy_sum"],
        &[steps, times, increments, cumulative],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::summary::StepRecord;
    use std::fs;

    #[test]
    fn test_write_csv() {
        let path = std::env::temp_dir().join("mfsi_rs_csv_test.csv");
        write_csv(&path, &["x", "y"], &[vec![1.0, 2.0], vec![4.0]]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "x,y");
        assert!(lines[2].ends_with(','));
        assert!(write_csv(&path, &["x"], &[vec![1.0], vec![2.0]]).is_err());
        fs::remove_file(&path).ok();
    }

    #[test]
    fn energy_columns_accumulate() {
        let path = std::env::temp_dir().join("mfsi_rs_energy_test.csv");
        let mut summary = RunSummary::default();
        for (step, e) in [(1, 0.5), (2, 0.25)] {
            summary.steps.push(StepRecord {
                step,
                time: step as f64,
                dt: 1.0,
                iterations: 1,
                energy_increment: e,
            });
        }
        write_energy(&path, &summary).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let last = content.lines().last().unwrap();
        assert!(last.ends_with("7.500000000000000e-1"));
        fs::remove_file(&path).ok();
    }
}
