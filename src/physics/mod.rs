pub mod bc;

use crate::error::FsiError;
use crate::fsi::stc::StcStrategy;
use crate::linalg::{BlockSparseMatrix, DofMap, MapExtractor, SparseMatrix};
use nalgebra::DVector;

/// Supplies the current right-hand side (negative residual) of a field.
pub trait ResidualProvider {
    fn rhs(&self) -> &DVector<f64>;
}

/// Supplies the linearization of a field at its current state.
pub trait JacobianProvider {
    type Jacobian;

    /// Fails with [`FsiError::MissingBlock`] before the first evaluation.
    fn jacobian(&self) -> Result<&Self::Jacobian, FsiError>;
}

/// DOF layout of a field.
pub trait DofPartitionProvider {
    fn dof_row_map(&self) -> &DofMap;

    /// FSI interface (cond) versus inner (other) DOFs.
    fn interface(&self) -> &MapExtractor;

    /// DOFs carrying Dirichlet conditions.
    fn dbc_map(&self) -> &DofMap;
}

/// Time stepping bookkeeping shared by all fields.
pub trait TimeIntegration {
    /// Weight of the old time level in the interface coupling terms.
    fn tim_int_param(&self) -> f64;

    fn time(&self) -> f64;
    fn step(&self) -> usize;
    fn dt(&self) -> f64;
    fn set_dt(&mut self, dt: f64);

    /// Advance time and apply the field predictor and Dirichlet values.
    fn prepare_time_step(&mut self) -> Result<(), FsiError>;

    /// Accept the converged state as the new old state.
    fn update(&mut self);

    /// Drop the current step and return to the last accepted state.
    fn reset_step(&mut self);
}

pub trait StructureField:
    ResidualProvider + JacobianProvider<Jacobian = SparseMatrix> + DofPartitionProvider + TimeIntegration
{
    /// Evaluate at the predictor plus `step_increment`.
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError>;

    fn stc_strategy(&self) -> StcStrategy;

    /// Transformation matrix of the active STC strategy.
    fn stc_mat(&self) -> Option<&SparseMatrix>;

    fn dispn(&self) -> &DVector<f64>;
    fn dispnp(&self) -> &DVector<f64>;

    /// Local truncation error estimate over all DOFs and over the FSI interface.
    fn local_error_norms(&self) -> (f64, f64);
}

pub trait FluidField:
    ResidualProvider
    + JacobianProvider<Jacobian = BlockSparseMatrix>
    + DofPartitionProvider
    + TimeIntegration
{
    /// Evaluate at the old state plus `step_increment`.
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError>;

    /// Mesh-motion sensitivity blocks, split like the Jacobian.
    fn shape_derivatives(&self) -> Option<&BlockSparseMatrix>;

    fn residual_scaling(&self) -> f64;
    fn time_scaling(&self) -> f64;

    /// Interface velocity at the old time level.
    fn extract_interface_veln(&self) -> DVector<f64>;

    /// Turn an interface displacement step increment into a velocity step increment.
    fn displacement_to_velocity(&self, fcx: &mut DVector<f64>) -> Result<(), FsiError>;

    /// Mesh displacement laid out over the fluid DOF map (zero on pressure DOFs).
    fn apply_mesh_displacement(&mut self, disp: &DVector<f64>) -> Result<(), FsiError>;

    fn velocity_row_map(&self) -> &DofMap;
    fn pressure_row_map(&self) -> &DofMap;
    fn inner_velocity_row_map(&self) -> &DofMap;

    /// Local error estimate for the inner velocities, if an auxiliary integrator runs.
    fn local_error_norm_inner(&self) -> Option<f64>;
}

pub trait AleField:
    ResidualProvider
    + JacobianProvider<Jacobian = BlockSparseMatrix>
    + DofPartitionProvider
    + TimeIntegration
{
    /// Evaluate at the old displacement plus `step_increment`.
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError>;

    fn dispnp(&self) -> &DVector<f64>;
}
