use super::adapter::Coupling;
use crate::linalg::DofMap;

/// Translates gids from one side of a [`Coupling`] to the other.
pub trait CouplingConverter {
    fn src_map(&self) -> &DofMap;
    fn dst_map(&self) -> &DofMap;
    fn convert(&self, gid: usize) -> Option<usize>;
}

/// Master gids to slave gids.
pub struct CouplingMasterConverter<'a>(pub &'a Coupling);

/// Slave gids to master gids.
pub struct CouplingSlaveConverter<'a>(pub &'a Coupling);

impl CouplingConverter for CouplingMasterConverter<'_> {
    fn src_map(&self) -> &DofMap {
        self.0.master_dof_map()
    }

    fn dst_map(&self) -> &DofMap {
        self.0.slave_dof_map()
    }

    fn convert(&self, gid: usize) -> Option<usize> {
        self.0.master_gid_to_slave(gid)
    }
}

impl CouplingConverter for CouplingSlaveConverter<'_> {
    fn src_map(&self) -> &DofMap {
        self.0.slave_dof_map()
    }

    fn dst_map(&self) -> &DofMap {
        self.0.master_dof_map()
    }

    fn convert(&self, gid: usize) -> Option<usize> {
        self.0.slave_gid_to_master(gid)
    }
}
