//! Linear model problem: an elastic strip below a channel flow.
//!
//! The structure occupies `[0, width] x [-solid_height, 0]` and is clamped at
//! its bottom. The fluid and its ALE mesh occupy `[0, width] x [0, fluid_height]`
//! and are driven by a sliding lid at the top. All operators are graph
//! Laplacians of the structured grids, so every field residual is affine in
//! its state and the monolithic Newton loop converges after one solve.

mod ale;
mod fluid;
mod structure;

pub use ale::ChannelAle;
pub use fluid::ChannelFluid;
pub use structure::ChannelStructure;

use nalgebra::DVector;
use tracing::info;

use crate::config::{AuxIntegrator, FsiDynamicParams};
use crate::coupling::InterfaceNode;
use crate::discretization::generator::create_fsi_strip;
use crate::discretization::mesh::StructuredGrid;
use crate::error::FsiError;
use crate::fsi::{CouplingNodes, FsiCouplings, MonolithicFluidSplit, StcStrategy};
use crate::linalg::DofMap;
use crate::physics::DofPartitionProvider;
use crate::physics::bc::{BCRegistry, BoundaryNode, BoundarySelector, DirichletRule, Point};

/// Names the fields register their Dirichlet rules under.
pub const STRUCTURE_FIELD: &str = "structure";
pub const FLUID_FIELD: &str = "fluid";
pub const ALE_FIELD: &str = "ale";

const INTERFACE: &str = "interface";

/// Coupling tolerance for matching interface nodes.
pub const MATCH_TOLERANCE: f64 = 1e-9;

/// Displacement predictor of the channel structure at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructurePredictor {
    /// dⁿ⁺¹ = dⁿ
    #[default]
    ConstDis,
    /// dⁿ⁺¹ = dⁿ + dt·vⁿ
    ConstVel,
}

#[derive(Debug, Clone)]
pub struct ChannelParams {
    pub width: f64,
    pub solid_height: f64,
    pub fluid_height: f64,
    pub nx: usize,
    pub ny_solid: usize,
    pub ny_fluid: usize,

    pub solid_stiffness: f64,
    /// Diagonal shift of the structure operator, in units of the stiffness.
    pub solid_shift: f64,
    pub body_force: [f64; 2],
    pub structure_theta: f64,
    pub predictor: StructurePredictor,
    pub stc: StcStrategy,
    /// Coupling weight of vertical neighbours in the STC matrix.
    pub stc_weight: f64,

    pub density: f64,
    pub viscosity: f64,
    /// One-step-θ parameter of the fluid time integrator.
    pub ost_theta: f64,
    /// Weight of the old time level in the fluid interface coupling.
    pub fluid_theta: f64,
    /// Pressure gradient weight in the vertical momentum rows.
    pub pressure_coupling: f64,
    /// Vertical velocity weight in the pressure rows.
    pub pressure_feedback: f64,
    /// Sensitivity of the momentum rows to the mesh displacement.
    pub mesh_coupling: f64,
    pub gravity: [f64; 2],
    pub lid_velocity: f64,
    /// Linear ramp of the lid velocity; no ramp when not positive.
    pub ramp_time: f64,
    pub shape_derivatives: bool,
    pub residual_scaling: f64,
    pub aux_integrator: AuxIntegrator,

    pub ale_stiffness: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            width: 1.0,
            solid_height: 0.25,
            fluid_height: 1.0,
            nx: 5,
            ny_solid: 3,
            ny_fluid: 4,
            solid_stiffness: 20.0,
            solid_shift: 0.1,
            body_force: [0.0, -0.5],
            structure_theta: 0.0,
            predictor: StructurePredictor::ConstDis,
            stc: StcStrategy::Inactive,
            stc_weight: 0.25,
            density: 1.0,
            viscosity: 0.1,
            ost_theta: 1.0,
            fluid_theta: 0.0,
            pressure_coupling: 0.5,
            pressure_feedback: 0.1,
            mesh_coupling: 0.05,
            gravity: [0.0, 0.0],
            lid_velocity: 1.0,
            ramp_time: 0.0,
            shape_derivatives: true,
            residual_scaling: 1.0,
            aux_integrator: AuxIntegrator::Ab2,
            ale_stiffness: 1.0,
        }
    }
}

impl ChannelParams {
    /// Lid velocity at time `t`.
    pub fn lid(&self, t: f64) -> f64 {
        if self.ramp_time > 0.0 {
            self.lid_velocity * (t / self.ramp_time).min(1.0)
        } else {
            self.lid_velocity
        }
    }
}

/// Clamped solid bottom, driven lid, fixed mesh top and sliding mesh walls.
pub fn default_boundary_conditions(params: &ChannelParams) -> BCRegistry {
    let mut bcs = BCRegistry::default();
    bcs.add(DirichletRule::new(
        STRUCTURE_FIELD,
        &[0, 1],
        BoundarySelector::Label("bottom".into()),
        0.0,
    ));

    let lid = params.clone();
    bcs.add(DirichletRule::new(
        FLUID_FIELD,
        &[0],
        BoundarySelector::Label("top".into()),
        move |t: f64, _p: Point| lid.lid(t),
    ));
    bcs.add(DirichletRule::new(FLUID_FIELD, &[1], BoundarySelector::Label("top".into()), 0.0));

    bcs.add(DirichletRule::new(ALE_FIELD, &[0, 1], BoundarySelector::Label("top".into()), 0.0));
    for wall in ["left", "right"] {
        bcs.add(DirichletRule::new(ALE_FIELD, &[0], BoundarySelector::Label(wall.into()), 0.0));
    }
    bcs
}

/// The three fields of the channel problem and the interface nodes they share.
pub struct ChannelProblem {
    pub structure: ChannelStructure,
    pub fluid: ChannelFluid,
    pub ale: ChannelAle,
    pub nodes: CouplingNodes,
}

impl ChannelProblem {
    /// Couple the fields and set up the fluid-split monolithic system.
    pub fn into_fluid_split(
        self,
        fsi: &FsiDynamicParams,
    ) -> Result<MonolithicFluidSplit<ChannelStructure, ChannelFluid, ChannelAle>, FsiError> {
        let couplings = FsiCouplings::setup(&self.nodes, 2, MATCH_TOLERANCE)?;
        MonolithicFluidSplit::new(self.structure, self.fluid, self.ale, couplings, fsi)
    }
}

/// Build the strip grids, number the DOFs of the three fields one after the
/// other and set up every field at time zero with step size `dt`.
pub fn channel_problem_def(
    params: &ChannelParams,
    bcs: &BCRegistry,
    dt: f64,
) -> Result<ChannelProblem, FsiError> {
    if params.nx < 2 || params.ny_solid < 2 || params.ny_fluid < 2 {
        return Err(FsiError::InvalidParameter(format!(
            "channel grid needs at least 2 x 2 nodes per layer, got nx={} ny_solid={} ny_fluid={}",
            params.nx, params.ny_solid, params.ny_fluid
        )));
    }
    if !(params.ost_theta > 0.0) || !(dt > 0.0) {
        return Err(FsiError::InvalidParameter(format!(
            "one-step-θ {} and time step {dt} must be positive",
            params.ost_theta
        )));
    }

    let (solid, fluid_grid) = create_fsi_strip(
        params.width,
        params.solid_height,
        params.fluid_height,
        params.nx,
        params.ny_solid,
        params.ny_fluid,
    );
    let ale_grid = fluid_grid.clone();

    let s_layout = GridLayout::new(solid, 0, 2);
    let f_layout = GridLayout::new(fluid_grid, s_layout.end(), 3);
    let a_layout = GridLayout::new(ale_grid, f_layout.end(), 2);

    let nodes = CouplingNodes {
        structure_interface: s_layout.interface_nodes(Some(INTERFACE), &[0, 1]),
        fluid_interface: f_layout.interface_nodes(Some(INTERFACE), &[0, 1]),
        ale_interface: a_layout.interface_nodes(Some(INTERFACE), &[0, 1]),
        fluid_volume: f_layout.interface_nodes(None, &[0, 1]),
        ale_volume: a_layout.interface_nodes(None, &[0, 1]),
    };

    let structure = ChannelStructure::new(s_layout, params, bcs.clone(), dt)?;
    let fluid = ChannelFluid::new(f_layout, params, bcs.clone(), dt)?;
    let ale = ChannelAle::new(a_layout, params, bcs.clone(), dt)?;

    info!(
        structure = structure.dof_row_map().len(),
        fluid = fluid.dof_row_map().len(),
        ale = ale.dof_row_map().len(),
        interface_nodes = nodes.structure_interface.len(),
        "channel problem set up"
    );

    Ok(ChannelProblem {
        structure,
        fluid,
        ale,
        nodes,
    })
}

/// Node-wise DOF numbering of one field on a structured grid.
#[derive(Clone, Debug)]
pub(crate) struct GridLayout {
    pub(crate) grid: StructuredGrid,
    first_gid: usize,
    per_node: usize,
    node_dofs: Vec<Vec<usize>>,
    dof_map: DofMap,
}

impl GridLayout {
    fn new(grid: StructuredGrid, first_gid: usize, per_node: usize) -> Self {
        let node_dofs: Vec<Vec<usize>> = (0..grid.num_nodes())
            .map(|n| (0..per_node).map(|c| first_gid + n * per_node + c).collect())
            .collect();
        let dof_map = DofMap::from_range(first_gid..first_gid + grid.num_nodes() * per_node);
        Self {
            grid,
            first_gid,
            per_node,
            node_dofs,
            dof_map,
        }
    }

    fn end(&self) -> usize {
        self.first_gid + self.dof_map.len()
    }

    pub(crate) fn dof_map(&self) -> &DofMap {
        &self.dof_map
    }

    pub(crate) fn gid(&self, node: usize, comp: usize) -> usize {
        self.first_gid + self.lid(node, comp)
    }

    pub(crate) fn lid(&self, node: usize, comp: usize) -> usize {
        node * self.per_node + comp
    }

    /// DOFs of components `comps` at every node, optionally only at nodes carrying `label`.
    pub(crate) fn component_map(&self, label: Option<&str>, comps: &[usize]) -> DofMap {
        DofMap::new(
            (0..self.grid.num_nodes())
                .filter(|&n| label.is_none_or(|l| self.grid.has_label(n, l)))
                .flat_map(|n| comps.iter().map(move |&c| self.gid(n, c))),
        )
    }

    fn interface_nodes(&self, label: Option<&str>, comps: &[usize]) -> Vec<InterfaceNode> {
        self.grid
            .nodes
            .iter()
            .enumerate()
            .filter(|(n, _)| label.is_none_or(|l| self.grid.has_label(*n, l)))
            .map(|(n, node)| InterfaceNode {
                position: node.position,
                dofs: comps.iter().map(|&c| self.gid(n, c)).collect(),
            })
            .collect()
    }

    fn boundary_nodes(&self) -> Vec<BoundaryNode<'_>> {
        self.grid
            .nodes
            .iter()
            .zip(&self.node_dofs)
            .map(|(node, dofs)| BoundaryNode {
                position: Point::from(node.position),
                labels: &node.labels,
                dofs,
            })
            .collect()
    }

    pub(crate) fn dbc_map(&self, bcs: &BCRegistry, field: &str) -> DofMap {
        bcs.dbc_map(field, &self.boundary_nodes())
    }

    /// Overwrite the Dirichlet DOFs of `v` with their values at time `t`.
    pub(crate) fn impose_dirichlet(&self, bcs: &BCRegistry, field: &str, t: f64, v: &mut DVector<f64>) {
        for (gid, value) in bcs.dirichlet_values(field, &self.boundary_nodes(), t) {
            if let Some(lid) = self.dof_map.lid(gid) {
                v[lid] = value;
            }
        }
    }

    /// Graph Laplacian of the grid acting on each of `comps` separately,
    /// times `factor`, with `shift` added to the degree on the diagonal.
    pub(crate) fn laplacian(&self, comps: &[usize], factor: f64, shift: f64) -> Vec<(usize, usize, f64)> {
        let mut triplets = Vec::new();
        for n in 0..self.grid.num_nodes() {
            let neighbors = self.grid.neighbors(n);
            for &c in comps {
                let row = self.gid(n, c);
                triplets.push((row, row, factor * (neighbors.len() as f64 + shift)));
                for &m in &neighbors {
                    triplets.push((row, self.gid(m, c), -factor));
                }
            }
        }
        triplets
    }
}

/// ‖v‖₂/√n, zero for an empty vector.
pub(crate) fn scaled_norm(v: &DVector<f64>) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        v.norm() / (v.len() as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_numbered_consecutively() {
        let params = ChannelParams::default();
        let bcs = default_boundary_conditions(&params);
        let p = channel_problem_def(&params, &bcs, 0.1).unwrap();

        let ns = params.nx * params.ny_solid;
        let nf = params.nx * params.ny_fluid;
        assert_eq!(p.structure.dof_row_map().len(), 2 * ns);
        assert_eq!(p.fluid.dof_row_map().gids()[0], 2 * ns);
        assert_eq!(p.ale.dof_row_map().gids()[0], 2 * ns + 3 * nf);
        assert_eq!(p.nodes.structure_interface.len(), params.nx);
        assert_eq!(p.nodes.fluid_volume.len(), nf);
    }

    #[test]
    fn laplacian_rows_sum_to_shift() {
        let (solid, _) = create_fsi_strip(1.0, 0.5, 1.0, 3, 3, 2);
        let layout = GridLayout::new(solid, 0, 2);
        let mut sums = vec![0.0; layout.dof_map().len()];
        for (r, _, v) in layout.laplacian(&[0, 1], 2.0, 0.5) {
            sums[r] += v;
        }
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-14));
    }

    #[test]
    fn too_coarse_grid_is_rejected() {
        let params = ChannelParams {
            ny_fluid: 1,
            ..ChannelParams::default()
        };
        let bcs = default_boundary_conditions(&params);
        assert!(matches!(
            channel_problem_def(&params, &bcs, 0.1),
            Err(FsiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn lid_ramp() {
        let params = ChannelParams {
            ramp_time: 2.0,
            lid_velocity: 4.0,
            ..ChannelParams::default()
        };
        assert_eq!(params.lid(1.0), 2.0);
        assert_eq!(params.lid(3.0), 4.0);
    }
}
