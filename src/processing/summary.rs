use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tracing::info;

#[derive(Clone, Copy, Debug)]
pub struct StepRecord {
    pub step: usize,
    pub time: f64,
    pub dt: f64,
    pub iterations: u32,
    pub energy_increment: f64,
}

/// What a coupled run did, step by step.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub steps: Vec<StepRecord>,
    /// Steps that had to be repeated with a different size.
    pub repeated_steps: usize,
    /// Steps accepted although Newton did not converge.
    pub unconverged_steps: usize,
    pub energy_sum: f64,
}

impl RunSummary {
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn newton_iterations(&self) -> u32 {
        self.steps.iter().map(|s| s.iterations).sum()
    }

    pub fn final_time(&self) -> f64 {
        self.steps.last().map_or(0.0, |s| s.time)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file, "MONOLITHIC FSI RUN SUMMARY")?;
        writeln!(file, "{}", "=".repeat(60))?;
        writeln!(file)?;
        writeln!(file, "Accepted steps:      {}", self.num_steps())?;
        writeln!(file, "Repeated steps:      {}", self.repeated_steps)?;
        writeln!(file, "Unconverged steps:   {}", self.unconverged_steps)?;
        writeln!(file, "Newton iterations:   {}", self.newton_iterations())?;
        writeln!(file, "Final time:          {:.6e}", self.final_time())?;
        writeln!(file, "Interface energy:    {:.6e}", self.energy_sum)?;
        writeln!(file)?;

        writeln!(file, "{:>6} {:>14} {:>12} {:>6} {:>14}", "step", "time", "dt", "iter", "energy")?;
        writeln!(file, "{}", "-".repeat(60))?;
        for s in &self.steps {
            writeln!(
                file,
                "{:>6} {:>14.6e} {:>12.4e} {:>6} {:>14.6e}",
                s.step, s.time, s.dt, s.iterations, s.energy_increment
            )?;
        }
        writeln!(file, "{}", "=".repeat(60))?;
        Ok(())
    }

    pub fn print_to_console(&self) {
        info!("{}", "=".repeat(60));
        info!("RUN SUMMARY");
        info!("{}", "=".repeat(60));
        info!(
            "Steps:         {} accepted, {} repeated, {} unconverged",
            self.num_steps(),
            self.repeated_steps,
            self.unconverged_steps
        );
        info!("Newton iter:   {}", self.newton_iterations());
        info!("Final time:    {:.4e}", self.final_time());
        info!("Energy sum:    {:.6e}", self.energy_sum);
        info!("{}", "=".repeat(60));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals() {
        let mut s = RunSummary::default();
        for step in 1..=3 {
            s.steps.push(StepRecord {
                step,
                time: 0.1 * step as f64,
                dt: 0.1,
                iterations: 2,
                energy_increment: 0.0,
            });
        }
        assert_eq!(s.newton_iterations(), 6);
        assert!((s.final_time() - 0.3).abs() < 1e-15);
    }
}
