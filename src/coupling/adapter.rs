use std::collections::HashMap;

use nalgebra::DVector;

use crate::error::FsiError;
use crate::linalg::DofMap;

/// A node on a coupling surface with the global DOF ids it carries.
#[derive(Clone, Debug)]
pub struct InterfaceNode {
    pub position: [f64; 3],
    pub dofs: Vec<usize>,
}

/// One-to-one DOF correspondence between two fields sharing matching nodes.
#[derive(Clone, Debug)]
pub struct Coupling {
    master_dof_map: DofMap,
    slave_dof_map: DofMap,
    master_to_slave: HashMap<usize, usize>,
    slave_to_master: HashMap<usize, usize>,
}

impl Coupling {
    /// Match `master` and `slave` nodes by position and couple the first
    /// `num_dof` DOFs of every pair. Every node must find exactly one partner
    /// within `tolerance`.
    pub fn setup(
        master: &[InterfaceNode],
        slave: &[InterfaceNode],
        num_dof: usize,
        tolerance: f64,
    ) -> Result<Self, FsiError> {
        if master.len() != slave.len() {
            return Err(FsiError::Coupling(format!(
                "{} master nodes cannot be matched to {} slave nodes",
                master.len(),
                slave.len()
            )));
        }

        let mut master_to_slave = HashMap::new();
        let mut slave_to_master = HashMap::new();
        let mut taken = vec![false; slave.len()];

        for m in master {
            let mut hits = slave
                .iter()
                .enumerate()
                .filter(|(_, s)| distance(&m.position, &s.position) <= tolerance);
            let Some((idx, s)) = hits.next() else {
                return Err(FsiError::Coupling(format!(
                    "no slave node found at {:?}",
                    m.position
                )));
            };
            if hits.next().is_some() || taken[idx] {
                return Err(FsiError::Coupling(format!(
                    "ambiguous node match at {:?}",
                    m.position
                )));
            }
            taken[idx] = true;

            if m.dofs.len() < num_dof || s.dofs.len() < num_dof {
                return Err(FsiError::Coupling(format!(
                    "node at {:?} carries fewer than {num_dof} DOFs",
                    m.position
                )));
            }
            for (&md, &sd) in m.dofs.iter().zip(&s.dofs).take(num_dof) {
                master_to_slave.insert(md, sd);
                slave_to_master.insert(sd, md);
            }
        }

        Ok(Self {
            master_dof_map: DofMap::new(master_to_slave.keys().copied()),
            slave_dof_map: DofMap::new(slave_to_master.keys().copied()),
            master_to_slave,
            slave_to_master,
        })
    }

    pub fn master_dof_map(&self) -> &DofMap {
        &self.master_dof_map
    }

    pub fn slave_dof_map(&self) -> &DofMap {
        &self.slave_dof_map
    }

    pub fn master_gid_to_slave(&self, gid: usize) -> Option<usize> {
        self.master_to_slave.get(&gid).copied()
    }

    pub fn slave_gid_to_master(&self, gid: usize) -> Option<usize> {
        self.slave_to_master.get(&gid).copied()
    }

    /// Vector over the master DOF map to a vector over the slave DOF map.
    pub fn master_to_slave(&self, mv: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        transfer(
            &self.master_dof_map,
            mv,
            &self.slave_dof_map,
            &self.slave_to_master,
        )
    }

    pub fn slave_to_master(&self, sv: &DVector<f64>) -> Result<DVector<f64>, FsiError> {
        transfer(
            &self.slave_dof_map,
            sv,
            &self.master_dof_map,
            &self.master_to_slave,
        )
    }
}

fn transfer(
    src_map: &DofMap,
    src: &DVector<f64>,
    dst_map: &DofMap,
    dst_to_src: &HashMap<usize, usize>,
) -> Result<DVector<f64>, FsiError> {
    src_map.check_vector(src, "coupling transfer")?;
    let mut out = DVector::zeros(dst_map.len());
    for (lid, &gid) in dst_map.gids().iter().enumerate() {
        let src_gid = dst_to_src.get(&gid).copied().ok_or(FsiError::DofNotInMap {
            gid,
            map: "coupling partner",
        })?;
        out[lid] = src[src_map.try_lid(src_gid, "coupling source")?];
    }
    Ok(out)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
