//! Monolithic fluid-structure-ALE coupling with the fluid interface condensed.

pub mod assemble;
pub mod context;
pub mod couplings;
pub mod fluid_split;
pub mod lagrange;
pub mod rhs;
pub mod scaling;
pub mod stc;

pub use context::{IterationContext, MatrixSnapshot};
pub use couplings::{CouplingNodes, FsiCouplings};
pub use fluid_split::{LAMBDA_NAME, MonolithicFluidSplit};
pub use stc::StcStrategy;
