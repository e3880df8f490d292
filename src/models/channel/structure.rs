use nalgebra::DVector;
use tracing::debug;

use super::{ChannelParams, GridLayout, INTERFACE, STRUCTURE_FIELD, StructurePredictor, scaled_norm};
use crate::error::FsiError;
use crate::fsi::StcStrategy;
use crate::linalg::{DofMap, MapExtractor, SparseMatrix};
use crate::physics::bc::BCRegistry;
use crate::physics::{
    DofPartitionProvider, JacobianProvider, ResidualProvider, StructureField, TimeIntegration,
};

/// Quasi-static elastic strip: `K d = f` with `K` a shifted graph Laplacian
/// per displacement component.
pub struct ChannelStructure {
    layout: GridLayout,
    bcs: BCRegistry,
    interface: MapExtractor,
    dbc_map: DofMap,
    /// Dirichlet rows already replaced by unit rows.
    stiffness: SparseMatrix,
    load: DVector<f64>,
    theta: f64,
    predictor: StructurePredictor,
    stc: StcStrategy,
    stc_mat: Option<SparseMatrix>,

    time: f64,
    time_n: f64,
    step: usize,
    step_n: usize,
    dt: f64,

    dispn: DVector<f64>,
    dispnp: DVector<f64>,
    /// Predictor of the current step; Newton increments are added to it.
    dis_pred: DVector<f64>,
    veln: DVector<f64>,
    rhs: DVector<f64>,
    jacobian: Option<SparseMatrix>,
}

impl ChannelStructure {
    pub(crate) fn new(layout: GridLayout, params: &ChannelParams, bcs: BCRegistry, dt: f64) -> Result<Self, FsiError> {
        let dof_map = layout.dof_map().clone();
        let interface = MapExtractor::new(dof_map.clone(), layout.component_map(Some(INTERFACE), &[0, 1]))?;
        let dbc_map = layout.dbc_map(&bcs, STRUCTURE_FIELD);

        let mut stiffness = SparseMatrix::from_triplets(
            dof_map.clone(),
            dof_map.clone(),
            &layout.laplacian(&[0, 1], params.solid_stiffness, params.solid_shift),
        )?;
        stiffness.apply_dirichlet(&dbc_map, true)?;

        let load = DVector::from_iterator(
            dof_map.len(),
            (0..layout.grid.num_nodes()).flat_map(|_| params.body_force),
        );

        let stc_mat = if params.stc.is_active() {
            Some(stc_matrix(&layout, &dbc_map, params.stc_weight)?)
        } else {
            None
        };

        let mut dispn = DVector::zeros(dof_map.len());
        layout.impose_dirichlet(&bcs, STRUCTURE_FIELD, 0.0, &mut dispn);
        let n = dof_map.len();

        Ok(Self {
            layout,
            bcs,
            interface,
            dbc_map,
            stiffness,
            load,
            theta: params.structure_theta,
            predictor: params.predictor,
            stc: params.stc,
            stc_mat,
            time: 0.0,
            time_n: 0.0,
            step: 0,
            step_n: 0,
            dt,
            dispnp: dispn.clone(),
            dis_pred: dispn.clone(),
            dispn,
            veln: DVector::zeros(n),
            rhs: DVector::zeros(n),
            jacobian: None,
        })
    }

    pub fn veln(&self) -> &DVector<f64> {
        &self.veln
    }
}

/// Identity plus `weight` times the vertical neighbour coupling of each
/// component; Dirichlet rows stay unit rows.
fn stc_matrix(layout: &GridLayout, dbc: &DofMap, weight: f64) -> Result<SparseMatrix, FsiError> {
    let grid = &layout.grid;
    let mut triplets = Vec::new();
    for n in 0..grid.num_nodes() {
        for c in 0..2 {
            let row = layout.gid(n, c);
            triplets.push((row, row, 1.0));
            if dbc.contains(row) {
                continue;
            }
            for m in grid.neighbors(n).into_iter().filter(|m| m.abs_diff(n) == grid.nx) {
                triplets.push((row, layout.gid(m, c), weight));
            }
        }
    }
    SparseMatrix::from_triplets(layout.dof_map().clone(), layout.dof_map().clone(), &triplets)
}

impl ResidualProvider for ChannelStructure {
    fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }
}

impl JacobianProvider for ChannelStructure {
    type Jacobian = SparseMatrix;

    fn jacobian(&self) -> Result<&SparseMatrix, FsiError> {
        self.jacobian.as_ref().ok_or(FsiError::MissingBlock("structure stiffness"))
    }
}

impl DofPartitionProvider for ChannelStructure {
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

impl TimeIntegration for ChannelStructure {
    fn tim_int_param(&self) -> f64 {
        self.theta
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

    /// Displacement predictor with the new Dirichlet values.
    fn prepare_time_step(&mut self) -> Result<(), FsiError> {
        self.time = self.time_n + self.dt;
        self.step = self.step_n + 1;
        let mut pred = match self.predictor {
            StructurePredictor::ConstDis => self.dispn.clone(),
            StructurePredictor::ConstVel => &self.dispn + &self.veln * self.dt,
        };
        self.layout
            .impose_dirichlet(&self.bcs, STRUCTURE_FIELD, self.time, &mut pred);
        self.dispnp = pred.clone();
        self.dis_pred = pred;
        Ok(())
    }

    fn update(&mut self) {
        self.veln = (&self.dispnp - &self.dispn) / self.dt;
        self.dispn = self.dispnp.clone();
        self.time_n = self.time;
        self.step_n = self.step;
    }

    fn reset_step(&mut self) {
        self.time = self.time_n;
        self.step = self.step_n;
        self.dispnp = self.dispn.clone();
        self.dis_pred = self.dispn.clone();
    }
}

impl StructureField for ChannelStructure {
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError> {
        let mut d = self.dis_pred.clone();
        if let Some(inc) = step_increment {
            self.layout.dof_map().check_vector(inc, "structure increment")?;
            d += inc;
        }
        self.layout
            .impose_dirichlet(&self.bcs, STRUCTURE_FIELD, self.time, &mut d);

        let mut rhs = &self.load - self.stiffness.apply(&d)?;
        for &gid in self.dbc_map.gids() {
            if let Some(lid) = self.layout.dof_map().lid(gid) {
                rhs[lid] = 0.0;
            }
        }
        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(FsiError::NonFinite("structure residual"));
        }

        self.dispnp = d;
        self.rhs = rhs;
        if self.jacobian.is_none() {
            self.jacobian = Some(self.stiffness.clone());
        }
        debug!(rhs = self.rhs.norm(), "structure evaluated");
        Ok(())
    }

    fn stc_strategy(&self) -> StcStrategy {
        self.stc
    }

    fn stc_mat(&self) -> Option<&SparseMatrix> {
        self.stc_mat.as_ref()
    }

    fn dispn(&self) -> &DVector<f64> {
        &self.dispn
    }

    fn dispnp(&self) -> &DVector<f64> {
        &self.dispnp
    }

    /// Deviation of the solution from an explicit Euler step.
    fn local_error_norms(&self) -> (f64, f64) {
        let err = &self.dispnp - (&self.dispn + &self.veln * self.dt);
        let on_interface = self
            .interface
            .extract_cond_vector(&err)
            .map(|e| scaled_norm(&e))
            .unwrap_or(0.0);
        (scaled_norm(&err), on_interface)
    }
}
