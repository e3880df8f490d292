//! Node-matching couplings between fields and the transfer of vectors and
//! sparse blocks across them.

pub mod adapter;
pub mod converter;
pub mod transform;

pub use adapter::{Coupling, InterfaceNode};
pub use converter::{CouplingConverter, CouplingMasterConverter, CouplingSlaveConverter};
pub use transform::{matrix_col_transform, matrix_row_col_transform, matrix_row_transform};
