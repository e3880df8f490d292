use nalgebra::DVector;
use tracing::debug;

use super::{ChannelParams, FLUID_FIELD, GridLayout, INTERFACE, scaled_norm};
use crate::config::AuxIntegrator;
use crate::error::FsiError;
use crate::linalg::{BlockSparseMatrix, DofMap, MapExtractor, MultiMapExtractor, SparseMatrix, export_vector};
use crate::physics::bc::BCRegistry;
use crate::physics::{
    DofPartitionProvider, FluidField, JacobianProvider, ResidualProvider, TimeIntegration,
};

const U: usize = 0;
const V: usize = 1;
const P: usize = 2;

/// Linear Stokes-like channel flow on a moving mesh, one-step-θ in time.
///
/// Momentum rows (velocity component c at node i):
/// ```text
/// ρ (u − uⁿ)/(θ dt) + ν L u + (1−θ)/θ ν L uⁿ + γ p δ_{c,v} + σ L d − ρ g
/// ```
/// Pressure rows: `p − β v`. `d` is the mesh displacement handed over by
/// the ALE field.
pub struct ChannelFluid {
    layout: GridLayout,
    bcs: BCRegistry,
    interface: MapExtractor,
    /// [inner, interface] split of rows and columns.
    blocks: MultiMapExtractor,
    dbc_map: DofMap,
    velocity_map: DofMap,
    pressure_map: DofMap,
    inner_velocity_map: DofMap,

    density: f64,
    ost_theta: f64,
    theta: f64,
    gravity: [f64; 2],
    residual_scaling: f64,
    aux_integrator: AuxIntegrator,
    /// ν L on velocities
    viscous: SparseMatrix,
    /// ν L plus the γ and β pressure terms; no mass.
    operator: SparseMatrix,
    /// σ L on velocity rows and mesh displacement columns.
    mesh_operator: SparseMatrix,
    with_shape_derivatives: bool,

    time: f64,
    time_n: f64,
    step: usize,
    step_n: usize,
    dt: f64,
    dt_old: f64,

    veln: DVector<f64>,
    velnp: DVector<f64>,
    accn: DVector<f64>,
    accnm: DVector<f64>,
    mesh_disp: DVector<f64>,
    rhs: DVector<f64>,
    jacobian: Option<BlockSparseMatrix>,
    shape_derivatives: Option<BlockSparseMatrix>,
}

impl ChannelFluid {
    pub(crate) fn new(layout: GridLayout, params: &ChannelParams, bcs: BCRegistry, dt: f64) -> Result<Self, FsiError> {
        let dof_map = layout.dof_map().clone();
        let interface = MapExtractor::new(dof_map.clone(), layout.component_map(Some(INTERFACE), &[U, V]))?;
        let blocks = MultiMapExtractor::new(vec![interface.other_map().clone(), interface.cond_map().clone()])?;
        let dbc_map = layout.dbc_map(&bcs, FLUID_FIELD);
        let velocity_map = layout.component_map(None, &[U, V]);
        let pressure_map = layout.component_map(None, &[P]);
        let inner_velocity_map = velocity_map.split(interface.cond_map());

        let viscous_triplets = layout.laplacian(&[U, V], params.viscosity, 0.0);
        let viscous = SparseMatrix::from_triplets(dof_map.clone(), dof_map.clone(), &viscous_triplets)?;
        let mut triplets = viscous_triplets;
        for n in 0..layout.grid.num_nodes() {
            let (v, p) = (layout.gid(n, V), layout.gid(n, P));
            triplets.push((v, p, params.pressure_coupling));
            triplets.push((p, p, 1.0));
            triplets.push((p, v, -params.pressure_feedback));
        }
        let operator = SparseMatrix::from_triplets(dof_map.clone(), dof_map.clone(), &triplets)?;
        let mesh_operator = SparseMatrix::from_triplets(
            dof_map.clone(),
            dof_map.clone(),
            &layout.laplacian(&[U, V], params.mesh_coupling, 0.0),
        )?;

        let mut veln = DVector::zeros(dof_map.len());
        layout.impose_dirichlet(&bcs, FLUID_FIELD, 0.0, &mut veln);
        let n = dof_map.len();

        Ok(Self {
            layout,
            bcs,
            interface,
            blocks,
            dbc_map,
            velocity_map,
            pressure_map,
            inner_velocity_map,
            density: params.density,
            ost_theta: params.ost_theta,
            theta: params.fluid_theta,
            gravity: params.gravity,
            residual_scaling: params.residual_scaling,
            aux_integrator: params.aux_integrator,
            viscous,
            operator,
            mesh_operator,
            with_shape_derivatives: params.shape_derivatives,
            time: 0.0,
            time_n: 0.0,
            step: 0,
            step_n: 0,
            dt,
            dt_old: dt,
            velnp: veln.clone(),
            veln,
            accn: DVector::zeros(n),
            accnm: DVector::zeros(n),
            mesh_disp: DVector::zeros(n),
            rhs: DVector::zeros(n),
            jacobian: None,
            shape_derivatives: None,
        })
    }

    pub fn velnp(&self) -> &DVector<f64> {
        &self.velnp
    }

    pub fn veln(&self) -> &DVector<f64> {
        &self.veln
    }

    /// ρ/(θ dt) on the velocity diagonal plus the steady operator.
    fn system_matrix(&self) -> Result<SparseMatrix, FsiError> {
        let mut m = self.operator.clone();
        m.un_complete()?;
        let mass = self.density * self.time_scaling();
        for &gid in self.velocity_map.gids() {
            m.insert(gid, gid, mass)?;
        }
        m.complete()?;
        m.apply_dirichlet(&self.dbc_map, true)?;
        Ok(m)
    }

    fn zero_dirichlet_rows(&self, v: &mut DVector<f64>) {
        for &gid in self.dbc_map.gids() {
            if let Some(lid) = self.layout.dof_map().lid(gid) {
                v[lid] = 0.0;
            }
        }
    }

    /// Explicit prediction of the new velocity from old accelerations.
    fn aux_prediction(&self) -> Option<DVector<f64>> {
        match self.aux_integrator {
            AuxIntegrator::None => None,
            AuxIntegrator::ExplicitEuler => Some(&self.veln + &self.accn * self.dt),
            AuxIntegrator::Ab2 => {
                let r = self.dt / (2.0 * self.dt_old);
                Some(&self.veln + (&self.accn * (1.0 + r) - &self.accnm * r) * self.dt)
            }
        }
    }
}

impl ResidualProvider for ChannelFluid {
    fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }
}

impl JacobianProvider for ChannelFluid {
    type Jacobian = BlockSparseMatrix;

    fn jacobian(&self) -> Result<&BlockSparseMatrix, FsiError> {
        self.jacobian.as_ref().ok_or(FsiError::MissingBlock("fluid system matrix"))
    }
}

impl DofPartitionProvider for ChannelFluid {
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

impl TimeIntegration for ChannelFluid {
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

    fn prepare_time_step(&mut self) -> Result<(), FsiError> {
        self.time = self.time_n + self.dt;
        self.step = self.step_n + 1;
        let mut velnp = self.veln.clone();
        self.layout
            .impose_dirichlet(&self.bcs, FLUID_FIELD, self.time, &mut velnp);
        self.velnp = velnp;
        Ok(())
    }

    fn update(&mut self) {
        let acc = (&self.velnp - &self.veln) / self.dt;
        self.accnm = std::mem::replace(&mut self.accn, acc);
        self.veln = self.velnp.clone();
        self.dt_old = self.dt;
        self.time_n = self.time;
        self.step_n = self.step;
    }

    fn reset_step(&mut self) {
        self.time = self.time_n;
        self.step = self.step_n;
        self.velnp = self.veln.clone();
    }
}

impl FluidField for ChannelFluid {
    fn evaluate(&mut self, step_increment: Option<&DVector<f64>>) -> Result<(), FsiError> {
        let mut u = self.veln.clone();
        if let Some(inc) = step_increment {
            self.layout.dof_map().check_vector(inc, "fluid increment")?;
            u += inc;
        }
        self.layout.impose_dirichlet(&self.bcs, FLUID_FIELD, self.time, &mut u);

        let ts = self.time_scaling();
        let old_weight = (1.0 - self.ost_theta) / self.ost_theta;
        let mut residual = self.operator.apply(&u)? + self.mesh_operator.apply(&self.mesh_disp)?;
        if old_weight != 0.0 {
            residual += self.viscous.apply(&self.veln)? * old_weight;
        }
        for n in 0..self.layout.grid.num_nodes() {
            for (c, g) in [(U, self.gravity[0]), (V, self.gravity[1])] {
                let lid = self.layout.lid(n, c);
                residual[lid] += self.density * ((u[lid] - self.veln[lid]) * ts - g);
            }
        }

        let mut rhs = -residual;
        self.zero_dirichlet_rows(&mut rhs);
        if rhs.iter().any(|v| !v.is_finite()) {
            return Err(FsiError::NonFinite("fluid residual"));
        }
        self.rhs = rhs;
        self.velnp = u;

        let matrix = self.system_matrix()?;
        self.jacobian = Some(BlockSparseMatrix::split(&matrix, self.blocks.clone(), self.blocks.clone())?);
        if self.with_shape_derivatives {
            let mut g = self.mesh_operator.clone();
            g.apply_dirichlet(&self.dbc_map, false)?;
            self.shape_derivatives = Some(BlockSparseMatrix::split(&g, self.blocks.clone(), self.blocks.clone())?);
        }
        debug!(rhs = self.rhs.norm(), "fluid evaluated");
        Ok(())
    }

    fn shape_derivatives(&self) -> Option<&BlockSparseMatrix> {
        self.shape_derivatives.as_ref()
    }

    fn residual_scaling(&self) -> f64 {
        self.residual_scaling
    }

    fn time_scaling(&self) -> f64 {
        1.0 / (self.ost_theta * self.dt)
    }

    fn extract_interface_veln(&self) -> DVector<f64> {
        export_vector(self.layout.dof_map(), &self.veln, self.interface.cond_map())
            .unwrap_or_else(|_| DVector::zeros(self.interface.cond_map().len()))
    }

    /// Δu_Γ = Δd_Γ/(θ dt) − uⁿ_Γ/θ
    fn displacement_to_velocity(&self, fcx: &mut DVector<f64>) -> Result<(), FsiError> {
        self.interface.cond_map().check_vector(fcx, "interface displacement")?;
        let ts = self.time_scaling();
        let veln = self.extract_interface_veln();
        *fcx *= ts;
        *fcx -= veln * (self.dt * ts);
        Ok(())
    }

    fn apply_mesh_displacement(&mut self, disp: &DVector<f64>) -> Result<(), FsiError> {
        self.layout.dof_map().check_vector(disp, "mesh displacement")?;
        self.mesh_disp = disp.clone();
        Ok(())
    }

    fn velocity_row_map(&self) -> &DofMap {
        &self.velocity_map
    }

    fn pressure_row_map(&self) -> &DofMap {
        &self.pressure_map
    }

    fn inner_velocity_row_map(&self) -> &DofMap {
        &self.inner_velocity_map
    }

    fn local_error_norm_inner(&self) -> Option<f64> {
        let aux = self.aux_prediction()?;
        let err = &self.velnp - aux;
        export_vector(self.layout.dof_map(), &err, &self.inner_velocity_map)
            .ok()
            .map(|e| scaled_norm(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::channel::{channel_problem_def, default_boundary_conditions};
    use approx::assert_relative_eq;

    fn fluid(params: &ChannelParams) -> ChannelFluid {
        let bcs = default_boundary_conditions(params);
        channel_problem_def(params, &bcs, 0.1).unwrap().fluid
    }

    #[test]
    fn interface_carries_velocities_only() {
        let f = fluid(&ChannelParams::default());
        let cond = f.interface().cond_map();
        assert_eq!(cond.len(), 2 * ChannelParams::default().nx);
        assert!(DofMap::intersect_maps(cond, f.pressure_row_map()).is_empty());
        assert!(DofMap::intersect_maps(cond, f.dbc_map()).is_empty());
    }

    #[test]
    fn jacobian_is_split_into_inner_and_interface() {
        let mut f = fluid(&ChannelParams::default());
        f.prepare_time_step().unwrap();
        f.evaluate(None).unwrap();
        let j = f.jacobian().unwrap();
        assert_eq!(j.rows(), 2);
        let gid = f.interface().cond_map().gid(0);
        let mass = 1.0 / 0.1;
        assert_relative_eq!(j.matrix(1, 1).get(gid, gid), mass + 0.1 * 2.0);
        assert!(f.shape_derivatives().is_some());
    }

    #[test]
    fn newton_step_on_fixed_interface_converges() {
        let mut f = fluid(&ChannelParams::default());
        f.prepare_time_step().unwrap();
        f.evaluate(None).unwrap();
        let a = f.jacobian().unwrap().merged().unwrap().to_dense();
        // keep the interface at rest
        let mut a = a;
        let mut b = f.rhs().clone();
        for &g in f.interface().cond_map().gids() {
            let lid = f.dof_row_map().lid(g).unwrap();
            a.row_mut(lid).fill(0.0);
            a[(lid, lid)] = 1.0;
            b[lid] = 0.0;
        }
        let inc = a.lu().solve(&b).unwrap();
        f.evaluate(Some(&inc)).unwrap();
        let inner = f.interface().extract_other_vector(f.rhs()).unwrap();
        assert!(inner.amax() < 1e-10);
    }

    #[test]
    fn displacement_to_velocity_matches_theta_rule() {
        let f = fluid(&ChannelParams {
            ost_theta: 0.5,
            ..ChannelParams::default()
        });
        let mut fcx = DVector::from_element(f.interface().cond_map().len(), 0.02);
        f.displacement_to_velocity(&mut fcx).unwrap();
        // veln on the interface is zero: Δu = Δd/(θ dt)
        assert_relative_eq!(fcx[0], 0.02 / 0.05);
    }

    #[test]
    fn no_aux_integrator_no_error_norm() {
        let f = fluid(&ChannelParams {
            aux_integrator: AuxIntegrator::None,
            ..ChannelParams::default()
        });
        assert!(f.local_error_norm_inner().is_none());
    }
}
