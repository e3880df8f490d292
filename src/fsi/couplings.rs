use nalgebra::DVector;

use crate::coupling::{Coupling, InterfaceNode};
use crate::error::FsiError;
use crate::linalg::DofMap;

/// Interface nodes of every field, as needed to build [`FsiCouplings`].
#[derive(Clone, Debug, Default)]
pub struct CouplingNodes {
    pub structure_interface: Vec<InterfaceNode>,
    pub fluid_interface: Vec<InterfaceNode>,
    pub ale_interface: Vec<InterfaceNode>,
    /// Every fluid node with its velocity DOFs.
    pub fluid_volume: Vec<InterfaceNode>,
    /// Every ALE node with its displacement DOFs.
    pub ale_volume: Vec<InterfaceNode>,
}

/// The four couplings of a monolithic FSI problem.
///
/// Structure is master on the interface. The fluid is master with respect
/// to the ALE field.
#[derive(Clone, Debug)]
pub struct FsiCouplings {
    /// structure interface (master) to fluid interface (slave)
    pub coupsf: Coupling,
    /// structure interface (master) to ALE interface (slave)
    pub coupsa: Coupling,
    /// fluid velocity DOFs (master) to ALE DOFs (slave), whole volume
    pub coupfa: Coupling,
    /// fluid interface (master) to ALE interface (slave)
    pub icoupfa: Coupling,
}

impl FsiCouplings {
    pub fn setup(nodes: &CouplingNodes, ndim: usize, tolerance: f64) -> Result<Self, FsiError> {
        Ok(Self {
            coupsf: Coupling::setup(&nodes.structure_interface, &nodes.fluid_interface, ndim, tolerance)?,
            coupsa: Coupling::setup(&nodes.structure_interface, &nodes.ale_interface, ndim, tolerance)?,
            coupfa: Coupling::setup(&nodes.fluid_volume, &nodes.ale_volume, ndim, tolerance)?,
            icoupfa: Coupling::setup(&nodes.fluid_interface, &nodes.ale_interface, ndim, tolerance)?,
        })
    }

    /// The couplings must connect exactly the interface maps of the fields.
    pub fn check_interfaces(
        &self,
        structure_interface: &DofMap,
        fluid_interface: &DofMap,
        ale_interface: &DofMap,
    ) -> Result<(), FsiError> {
        let checks = [
            (self.coupsf.master_dof_map(), structure_interface, "structure-fluid master"),
            (self.coupsf.slave_dof_map(), fluid_interface, "structure-fluid slave"),
            (self.coupsa.master_dof_map(), structure_interface, "structure-ALE master"),
            (self.coupsa.slave_dof_map(), ale_interface, "structure-ALE slave"),
            (self.icoupfa.master_dof_map(), fluid_interface, "fluid-ALE interface master"),
            (self.icoupfa.slave_dof_map(), ale_interface, "fluid-ALE interface slave"),
        ];
        for (coupled, field, what) in checks {
            if coupled != field {
                return Err(FsiError::Coupling(format!(
                    "{what} DOFs ({}) differ from the field interface ({})",
                    coupled.len(),
                    field.len()
                )));
            }
        }
        Ok(())
    }

    pub fn struct_to_fluid(&self, v: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.coupsf.master_to_slave(v)
    }

    pub fn fluid_to_struct(&self, v: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.coupsf.slave_to_master(v)
    }

    pub fn struct_to_ale(&self, v: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.coupsa.master_to_slave(v)
    }

    /// ALE vector over all ALE DOFs to fluid velocity DOFs.
    pub fn ale_to_fluid(&self, v: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.coupfa.slave_to_master(v)
    }

    pub fn ale_to_fluid_interface(&self, v: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        self.icoupfa.slave_to_master(v)
    }
}
