//! Run parameters for the monolithic FSI solver, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid value for '{key}': {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Full,
    Medium,
    Low,
    Subproblem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearBlockSolver {
    PreconditionedKrylov,
    #[default]
    LinalgSolver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxIntegrator {
    None,
    ExplicitEuler,
    #[default]
    Ab2,
}

/// What to do when the Newton loop of a time step does not converge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceAction {
    #[default]
    Stop,
    Continue,
    HalveStep,
    RevertDt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FsiDynamicParams {
    pub timestep: f64,
    pub numstep: usize,
    pub maxtime: f64,
    /// Result output interval in steps; 0 disables it.
    pub results_every: usize,
    /// Restart output interval in steps; 0 disables it.
    pub restart_every: usize,
    pub verbosity: Verbosity,
    pub monolithic: MonolithicSolverParams,
    pub time_adaptivity: TimeAdaptivityParams,
}

impl Default for FsiDynamicParams {
    fn default() -> Self {
        Self {
            timestep: 0.1,
            numstep: 200,
            maxtime: 1000.0,
            results_every: 1,
            restart_every: 1,
            verbosity: Verbosity::Full,
            monolithic: MonolithicSolverParams::default(),
            time_adaptivity: TimeAdaptivityParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonolithicSolverParams {
    pub infnorm_scaling: bool,
    pub itemax: u32,
    pub linear_block_solver: LinearBlockSolver,
    pub krylov_itemax: usize,
    pub basetol: f64,
    pub shape_derivatives: bool,
    pub energy_file: bool,
    pub tolerances: NonlinearTolerances,
}

impl Default for MonolithicSolverParams {
    fn default() -> Self {
        Self {
            infnorm_scaling: true,
            itemax: 100,
            linear_block_solver: LinearBlockSolver::LinalgSolver,
            krylov_itemax: 1000,
            basetol: 1e-3,
            shape_derivatives: false,
            energy_file: false,
            tolerances: NonlinearTolerances::default(),
        }
    }
}

/// Residual and increment tolerances of one convergence group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NormTolerances {
    pub res_l2: f64,
    pub res_inf: f64,
    pub inc_l2: f64,
    pub inc_inf: f64,
}

impl Default for NormTolerances {
    fn default() -> Self {
        Self {
            res_l2: 1e-6,
            res_inf: 1e-6,
            inc_l2: 1e-6,
            inc_inf: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NonlinearTolerances {
    /// structure displacement
    pub dis: NormTolerances,
    /// structure interface
    pub fsi: NormTolerances,
    /// inner fluid velocity
    pub vel: NormTolerances,
    /// fluid pressure
    pub pre: NormTolerances,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeAdaptivityParams {
    pub time_adapt_on: bool,
    pub adapt_step_max: usize,
    pub structure_error_estimation: bool,
    pub aux_integrator_fluid: AuxIntegrator,
    pub averaging_dt: Vec<f64>,
    pub divercont: DivergenceAction,
    pub dtmax: f64,
    pub dtmin: f64,
    pub loc_err_tol_fluid: f64,
    pub loc_err_tol_structure: f64,
    pub num_increase_steps: usize,
    pub safety_factor: f64,
    pub size_ratio_max: f64,
    pub size_ratio_min: f64,
}

impl Default for TimeAdaptivityParams {
    fn default() -> Self {
        Self {
            time_adapt_on: false,
            adapt_step_max: 5,
            structure_error_estimation: true,
            aux_integrator_fluid: AuxIntegrator::Ab2,
            averaging_dt: vec![0.3, 0.7],
            divercont: DivergenceAction::Stop,
            dtmax: 0.1,
            dtmin: 1e-4,
            loc_err_tol_fluid: 1e-3,
            loc_err_tol_structure: 1e-3,
            num_increase_steps: 0,
            safety_factor: 0.9,
            size_ratio_max: 2.0,
            size_ratio_min: 0.5,
        }
    }
}

impl FsiDynamicParams {
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let params: FsiDynamicParams =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.timestep > 0.0) {
            return Err(invalid("timestep", self.timestep, "must be positive"));
        }
        if self.monolithic.itemax == 0 {
            return Err(invalid("monolithic.itemax", 0, "must be at least 1"));
        }

        let ta = &self.time_adaptivity;
        if !(ta.dtmin > 0.0) || ta.dtmin > ta.dtmax {
            return Err(invalid(
                "time_adaptivity.dtmin",
                ta.dtmin,
                "must be positive and not exceed dtmax",
            ));
        }
        if !(ta.safety_factor > 0.0 && ta.safety_factor <= 1.0) {
            return Err(invalid(
                "time_adaptivity.safety_factor",
                ta.safety_factor,
                "must lie in (0, 1]",
            ));
        }
        if !(ta.size_ratio_min > 0.0 && ta.size_ratio_min <= 1.0 && ta.size_ratio_max >= 1.0) {
            return Err(invalid(
                "time_adaptivity.size_ratio_min/max",
                format!("{}/{}", ta.size_ratio_min, ta.size_ratio_max),
                "need 0 < min <= 1 <= max",
            ));
        }
        if ta.averaging_dt.is_empty() {
            return Err(invalid("time_adaptivity.averaging_dt", "[]", "needs at least one weight"));
        }
        if ta.loc_err_tol_fluid <= 0.0 || ta.loc_err_tol_structure <= 0.0 {
            return Err(invalid(
                "time_adaptivity.loc_err_tol_*",
                format!("{}/{}", ta.loc_err_tol_structure, ta.loc_err_tol_fluid),
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = FsiDynamicParams::default();
        params.validate().unwrap();
        assert!(params.monolithic.infnorm_scaling);
        assert_eq!(params.time_adaptivity.averaging_dt, vec![0.3, 0.7]);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let params = FsiDynamicParams::from_json_str(
            r#"{ "timestep": 0.05, "monolithic": { "infnorm_scaling": false },
                 "time_adaptivity": { "divercont": "halve_step" } }"#,
        )
        .unwrap();
        assert_eq!(params.timestep, 0.05);
        assert!(!params.monolithic.infnorm_scaling);
        assert_eq!(params.monolithic.itemax, 100);
        assert_eq!(params.time_adaptivity.divercont, DivergenceAction::HalveStep);
        assert_eq!(params.monolithic.tolerances.vel.inc_inf, 1e-6);
    }

    #[test]
    fn roundtrip_through_json() {
        let params = FsiDynamicParams::default();
        let json = params.to_json_string().unwrap();
        let parsed = FsiDynamicParams::from_json_str(&json).unwrap();
        assert_eq!(parsed.numstep, params.numstep);
        assert_eq!(parsed.monolithic.linear_block_solver, LinearBlockSolver::LinalgSolver);
    }

    #[test]
    fn zero_output_intervals_disable_output() {
        let params =
            FsiDynamicParams::from_json_str(r#"{ "results_every": 0, "restart_every": 0 }"#).unwrap();
        assert_eq!(params.results_every, 0);
        assert_eq!(params.restart_every, 0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(FsiDynamicParams::from_json_str(r#"{ "timestep": -1.0 }"#).is_err());
        let err = FsiDynamicParams::from_json_str(
            r#"{ "time_adaptivity": { "dtmin": 1.0, "dtmax": 0.1 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("dtmin"));
        assert!(matches!(
            FsiDynamicParams::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
