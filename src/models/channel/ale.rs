use nalgebra::DVector;
use tracing::debug;

use super::{ALE_FIELD, ChannelParams, GridLayout, INTERFACE};
use crate::error::FsiError;
use crate::linalg::{BlockSparseMatrix, DofMap, MapExtractor, MultiMapExtractor, SparseMatrix};
use crate::physics::bc::BCRegistry;
use crate::physics::{AleField, DofPartitionProvider, JacobianProvider, ResidualProvider, TimeIntegration};

/// Laplacian mesh smoothing of the fluid grid.
pub struct ChannelAle {
    layout: GridLayout,
    bcs: BCRegistry,
    interface: MapExtractor,
    blocks: MultiMapExtractor,
    dbc_map: DofMap,
    stiffness: SparseMatrix,

    time: f64,
    time_n: f64,
    step: usize,
    step_n: usize,
    dt: f64,

    dispn: DVector<f64>,
    dispnp: DVector<f64>,
    rhs: DVector<f64>,
    jacobian: Option<BlockSparseMatrix>,
}

impl ChannelAle {
    pub(crate) fn new(layout: GridLayout, params: &ChannelParams, bcs: BCRegistry, dt: f64) -> Result<Self, FsiError> {
        let dof_map = layout.dof_map().clone();
        let interface = MapExtractor::new(dof_map.clone(), layout.component_map(Some(INTERFACE), &[0, 1]))?;
        let blocks = MultiMapExtractor::new(vec![interface.other_map().clone(), interface.cond_map().clone()])?;
        let dbc_map = layout.dbc_map(&bcs, ALE_FIELD);

        let mut stiffness = SparseMatrix::from_triplets(
            dof_map.clone(),
            dof_map.clone(),
            &layout.laplacian(&[0, 1], params.ale_stiffness, 0.0),
        )?;
        // interface rows are never solved for; their DOFs follow the structure
        stiffness.apply_dirichlet(&DofMap::intersect_maps(&dbc_map, interface.other_map()), true)?;

        let n = dof_map.len();
        Ok(Self {
            layout,
            bcs,
            interface,
            blocks,
            dbc_map,
            stiffness,
            time: 0.0,
            time_n: 0.0,
            step: 0,
            step_n: 0,
            dt,
            dispn: DVector::zeros(n),
            dispnp: DVector::zeros(n),
            rhs: DVector::zeros(n),
            jacobian: None,
        })
    }

    pub fn dispn(&self) -> &DVector<f64> {
        &self.dispn
    }
}

impl ResidualProvider for ChannelAle {
    fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }
}

impl JacobianProvider for ChannelAle {
    type Jacobian = BlockSparseMatrix;

    fn jacobian(&self) -> Result<&BlockSparseMatrix, FsiError> {
        self.jacobian.as_ref().ok_or(FsiError::MissingBlock("ALE system matrix"))
    }
}

impl DofPartitionProvider for ChannelAle {
    fn dof_row_map(&self) -> &DofMap {
        self.layout.dof_map()
    }

    fn interface(&self) -> &MapExtractor {
        &self.interface
    }

    fn dbc_map(&self) -> &DofMap {
        &self.dbc_map
    }
}

impl TimeIntegration for ChannelAle {
    fn tim_int_param(&self) -> f64 {
        0.0
    }

    fn time(&self) -> f64 {
        self.time
    }

    fn step(&self) -> usize {
        self.step
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    fn prepare_time_step(&mut self) -> Result<(), FsiError> {
        self.time = self.time_n + self.dt;
        self.step = self.step_n + 1;
        let mut dispnp = self.dispn.clone();
        self.layout.impose_dirichlet(&self.bcs, ALE_FIELD, self.time, &mut dispnp);
        self.dispnp = dispnp;
        Ok(())
    }

    fn update(&mut self) {
        self.dispn = self.dispnp.clone();
        self.time_n = self.time;
        self.step_n = self.step;
    }

    fn reset_step(&mut self) {
        self.time = self.time_n;
        self.step = self.step_n;
        self.dispnp = self.dispn.clone();
    }
}

impl AleField for ChannelAle {
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError> {
        let mut d = self.dispn.clone();
        if let Some(inc) = step_increment {
            self.layout.dof_map().check_vector(inc, "ALE increment")?;
            d += inc;
        }
        let interface_values = self.interface.extract_cond_vector(&d)?;
        self.layout.impose_dirichlet(&self.bcs, ALE_FIELD, self.time, &mut d);
        // the structure owns the interface motion
        self.interface.add_cond_vector(
            &(interface_values - self.interface.extract_cond_vector(&d)?),
            &mut d,
            1.0,
        )?;

        let mut rhs = -self.stiffness.apply(&d)?;
        for &gid in self.dbc_map.gids() {
            if let Some(lid) = self.layout.dof_map().lid(gid) {
                rhs[lid] = 0.0;
            }
        }
        self.rhs = rhs;
        self.dispnp = d;
        if self.jacobian.is_none() {
            self.jacobian = Some(BlockSparseMatrix::split(
                &self.stiffness,
                self.blocks.clone(),
                self.blocks.clone(),
            )?);
        }
        debug!(rhs = self.interface.extract_other_vector(&self.rhs)?.norm(), "ALE evaluated");
        Ok(())
    }

    fn dispnp(&self) -> &DVector<f64> {
        &self.dispnp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::channel::{channel_problem_def, default_boundary_conditions};
    use approx::assert_relative_eq;

    fn ale() -> ChannelAle {
        let params = ChannelParams::default();
        let bcs = default_boundary_conditions(&params);
        channel_problem_def(&params, &bcs, 0.1).unwrap().ale
    }

    #[test]
    fn interface_motion_overrides_wall_conditions() {
        let mut a = ale();
        a.prepare_time_step().unwrap();
        let inc = a
            .interface()
            .insert_cond_vector(&DVector::from_element(a.interface().cond_map().len(), 0.01))
            .unwrap();
        a.evaluate(Some(&inc)).unwrap();
        let g = a.interface().extract_cond_vector(a.dispnp()).unwrap();
        assert!(g.iter().all(|&v| v == 0.01));
    }

    #[test]
    fn inner_solve_interpolates_interface_motion() {
        let mut a = ale();
        a.prepare_time_step().unwrap();
        let n_cond = a.interface().cond_map().len();
        let lift = DVector::from_fn(n_cond, |i, _| if i % 2 == 1 { 0.04 } else { 0.0 });
        let inc = a.interface().insert_cond_vector(&lift).unwrap();
        a.evaluate(Some(&inc)).unwrap();

        let j = a.jacobian().unwrap();
        let aii = j.matrix(0, 0).to_dense();
        let b = a.interface().extract_other_vector(a.rhs()).unwrap();
        let x = aii.lu().solve(&b).unwrap();
        let inc = &inc + a.interface().insert_other_vector(&x).unwrap();
        a.evaluate(Some(&inc)).unwrap();

        let inner = a.interface().extract_other_vector(a.rhs()).unwrap();
        assert_relative_eq!(inner.amax(), 0.0, epsilon = 1e-12);
        // vertical motion decays towards the fixed top
        let max = a.dispnp().amax();
        assert_relative_eq!(max, 0.04, epsilon = 1e-12);
    }
}
