use approx::assert_relative_eq;
use nalgebra::DVector;

use mfsi_rs::config::{DivergenceAction, FsiDynamicParams};
use mfsi_rs::error::FsiError;
use mfsi_rs::fsi::{IterationContext, LAMBDA_NAME, MonolithicFluidSplit, StcStrategy};
use mfsi_rs::models::channel::{
    ChannelAle, ChannelFluid, ChannelParams, ChannelStructure, FLUID_FIELD, StructurePredictor,
    channel_problem_def, default_boundary_conditions,
};
use mfsi_rs::numerics::IterationPhase;
use mfsi_rs::numerics::linear;
use mfsi_rs::numerics::solver::{MonolithicNewton, MonolithicSystem, SolverError};
use mfsi_rs::numerics::transient::{CoupledTimeIntegrator, FsiTimeLoop};
use mfsi_rs::physics::bc::{BoundarySelector, DirichletRule};
use mfsi_rs::physics::{
    AleField, DofPartitionProvider, FluidField, JacobianProvider, ResidualProvider, StructureField,
};
use mfsi_rs::processing::output::MemoryResults;

type Channel = MonolithicFluidSplit<ChannelStructure, ChannelFluid, ChannelAle>;

fn fsi_params() -> FsiDynamicParams {
    FsiDynamicParams {
        timestep: 0.1,
        numstep: 3,
        ..FsiDynamicParams::default()
    }
}

fn setup(channel: &ChannelParams, params: &FsiDynamicParams) -> Channel {
    let bcs = default_boundary_conditions(channel);
    channel_problem_def(channel, &bcs, params.timestep)
        .unwrap()
        .into_fluid_split(params)
        .unwrap()
}

fn newton(params: &FsiDynamicParams) -> MonolithicNewton {
    let mut newton = MonolithicNewton::new(linear::from_params(&params.monolithic));
    newton.logging = false;
    newton
}

/// Prepare and solve the first time step, recover λ.
fn first_step(fsi: &mut Channel, params: &FsiDynamicParams) -> (u32, IterationContext) {
    fsi.prepare_time_step().unwrap();
    let mut ctx = IterationContext::default();
    let result = newton(params).solve(fsi, &mut ctx).unwrap();
    fsi.post_converged(&ctx).unwrap();
    (result.iterations, ctx)
}

#[test]
fn affine_problem_converges_after_one_solve() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    fsi.prepare_time_step().unwrap();
    let mut ctx = IterationContext::default();
    let result = newton(&params).solve(&mut fsi, &mut ctx).unwrap();

    // one solve, one confirming iteration
    assert_eq!(result.iterations, 2);
    assert!(result.final_residual < 1e-10);
    assert!(result.history[0].residual > 1e-3);
    assert_eq!(ctx.phase, IterationPhase::SubsequentIteration);
}

#[test]
fn fluid_interface_rows_carry_identity() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    first_step(&mut fsi, &params);

    let cond = fsi.fluid().interface().cond_map().clone();
    let mat = fsi.system_matrix();
    for (r, c, v) in mat.matrix(1, 1).entries() {
        if cond.contains(r) {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((v - expected).abs() < 1e-14, "entry ({r}, {c}) = {v}");
        }
    }
    for block in [0, 2] {
        assert!(
            mat.matrix(1, block)
                .entries()
                .iter()
                .all(|&(r, _, v)| !cond.contains(r) || v.abs() < 1e-14)
        );
    }
}

#[test]
fn equal_theta_scenario() {
    let channel = ChannelParams {
        structure_theta: 0.5,
        fluid_theta: 0.5,
        ..ChannelParams::default()
    };
    let mut params = fsi_params();
    params.monolithic.shape_derivatives = true;
    let mut fsi = setup(&channel, &params);

    fsi.prepare_time_step().unwrap();
    assert_eq!(fsi.ddgpred().unwrap().amax(), 0.0);
    let mut ctx = IterationContext::default();
    newton(&params).solve(&mut fsi, &mut ctx).unwrap();
    fsi.post_converged(&ctx).unwrap();

    // (1-θs)/(1-θf) = 1: the structure interface diagonal picks up the fluid
    // interface block with weight one
    let fluid = fsi.fluid();
    let gs = fsi.structure().interface().cond_map().gid(0);
    let gf = fsi.couplings().coupsf.master_gid_to_slave(gs).unwrap();
    let ts = fluid.time_scaling();
    let expected = fsi.structure().jacobian().unwrap().get(gs, gs)
        + ts * fluid.jacobian().unwrap().matrix(1, 1).get(gf, gf)
        + fluid.shape_derivatives().unwrap().matrix(1, 1).get(gf, gf);
    assert_relative_eq!(fsi.system_matrix().matrix(0, 0).get(gs, gs), expected, epsilon = 1e-10);

    // first step: no old multiplier, no increments left at convergence
    let r_gamma = -fluid.interface().extract_cond_vector(fluid.rhs()).unwrap();
    let expected = -r_gamma * (fluid.residual_scaling() / (1.0 - 0.5));
    assert!(fsi.lambda().amax() > 1e-6);
    assert_relative_eq!(fsi.lambda().clone(), expected, epsilon = 1e-8);
}

#[test]
fn slave_side_dirichlet_is_rejected() {
    let channel = ChannelParams::default();
    let mut bcs = default_boundary_conditions(&channel);
    bcs.add(DirichletRule::new(
        FLUID_FIELD,
        &[0, 1],
        BoundarySelector::Label("left".into()),
        0.0,
    ));
    let problem = channel_problem_def(&channel, &bcs, 0.1).unwrap();
    match problem.into_fluid_split(&fsi_params()) {
        Err(FsiError::SlaveInterfaceDirichlet { dofs }) => {
            // u and v of the lower left fluid node
            assert_eq!(dofs.len(), 2);
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("interface Dirichlet conditions accepted"),
    }
}

#[test]
fn fluid_theta_one_is_rejected() {
    let channel = ChannelParams {
        fluid_theta: 1.0,
        ..ChannelParams::default()
    };
    let bcs = default_boundary_conditions(&channel);
    let problem = channel_problem_def(&channel, &bcs, 0.1).unwrap();
    assert!(matches!(
        problem.into_fluid_split(&fsi_params()),
        Err(FsiError::InvalidParameter(_))
    ));
}

/// Assemble the first iteration and return (matrix, rhs) before scaling.
fn assembled(fsi: &mut Channel) -> (nalgebra::DMatrix<f64>, DVector<f64>) {
    fsi.prepare_time_step().unwrap();
    let mut ctx = IterationContext::default();
    fsi.evaluate(&mut ctx, None).unwrap();
    let b = fsi.residual(&mut ctx, IterationPhase::FirstIteration).unwrap();
    fsi.setup_system_matrix(&mut ctx).unwrap();
    (fsi.system_matrix().to_dense(), b)
}

#[test]
fn disabled_infnorm_scaling_changes_nothing() {
    let mut params = fsi_params();
    params.monolithic.infnorm_scaling = false;
    let mut fsi = setup(&ChannelParams::default(), &params);
    let (a, b0) = assembled(&mut fsi);

    let mut b = b0.clone();
    fsi.scale_system(&mut b).unwrap();
    assert_eq!(fsi.system_matrix().to_dense(), a);
    assert_eq!(b, b0);

    let x0 = DVector::from_fn(b.len(), |i, _| (i as f64).sin());
    let mut x = x0.clone();
    fsi.unscale_solution(&mut x, &mut b).unwrap();
    assert_eq!(x, x0);
    assert_eq!(b, b0);
    assert_eq!(fsi.system_matrix().to_dense(), a);
}

#[test]
fn infnorm_scaling_round_trip() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    let (a, b0) = assembled(&mut fsi);

    let mut b = b0.clone();
    fsi.scale_system(&mut b).unwrap();
    assert_ne!(fsi.system_matrix().to_dense(), a);
    let mut x = DVector::zeros(b.len());
    fsi.unscale_solution(&mut x, &mut b).unwrap();
    assert_relative_eq!(fsi.system_matrix().to_dense(), a, epsilon = 1e-12, max_relative = 1e-12);
    assert_relative_eq!(b, b0, epsilon = 1e-12, max_relative = 1e-12);
}

#[test]
fn dirichlet_rows_survive_reassembly() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    let (a, _) = assembled(&mut fsi);
    let mut ctx = IterationContext::default();
    fsi.setup_system_matrix(&mut ctx).unwrap();
    assert_eq!(fsi.system_matrix().to_dense(), a);

    let full = fsi.extractor().full_map();
    for &gid in fsi.dbc_map().gids() {
        let lid = full.lid(gid).unwrap();
        assert_eq!(a.row(lid).iter().filter(|v| **v != 0.0).count(), 1);
        assert_eq!(a[(lid, lid)], 1.0);
    }
}

#[test]
fn stc_variants_agree_on_the_solution() {
    let params = fsi_params();
    let mut reference = setup(&ChannelParams::default(), &params);
    first_step(&mut reference, &params);

    for stc in [StcStrategy::Curr, StcStrategy::CurrSym] {
        let channel = ChannelParams {
            stc,
            ..ChannelParams::default()
        };
        let mut fsi = setup(&channel, &params);
        first_step(&mut fsi, &params);
        assert_relative_eq!(
            fsi.structure().dispnp().clone(),
            reference.structure().dispnp().clone(),
            epsilon = 1e-9
        );
        assert_relative_eq!(fsi.lambda().clone(), reference.lambda().clone(), epsilon = 1e-8);
    }
}

/// Two steps with the given structure predictor; Newton iterations and the
/// largest interface predictor entry per step.
fn two_steps(channel: &ChannelParams, params: &FsiDynamicParams) -> (Channel, Vec<u32>, Vec<f64>) {
    let mut fsi = setup(channel, params);
    let (mut iterations, mut predictors) = (Vec::new(), Vec::new());
    for _ in 0..2 {
        fsi.prepare_time_step().unwrap();
        predictors.push(fsi.ddgpred().unwrap().amax());
        let mut ctx = IterationContext::default();
        let result = newton(params).solve(&mut fsi, &mut ctx).unwrap();
        fsi.post_converged(&ctx).unwrap();
        fsi.update().unwrap();
        iterations.push(result.iterations);
    }
    (fsi, iterations, predictors)
}

#[test]
fn interface_predictor_does_not_change_the_solution() {
    let params = fsi_params();
    for stc in [StcStrategy::Inactive, StcStrategy::CurrSym] {
        let constant = ChannelParams {
            stc,
            ..ChannelParams::default()
        };
        let extrapolated = ChannelParams {
            predictor: StructurePredictor::ConstVel,
            ..constant.clone()
        };
        let (reference, ref_iterations, ref_predictors) = two_steps(&constant, &params);
        let (fsi, iterations, predictors) = two_steps(&extrapolated, &params);

        assert_eq!(ref_predictors, vec![0.0, 0.0]);
        assert_eq!(predictors[0], 0.0);
        assert!(predictors[1] > 1e-6, "{stc:?}: predictor {}", predictors[1]);

        // affine problem: one solve per step either way
        assert_eq!(ref_iterations, vec![2, 2]);
        assert_eq!(iterations, vec![2, 2]);
        assert_relative_eq!(
            fsi.structure().dispnp().clone(),
            reference.structure().dispnp().clone(),
            epsilon = 1e-9
        );
        assert_relative_eq!(fsi.ale().dispnp().clone(), reference.ale().dispnp().clone(), epsilon = 1e-9);
        assert_relative_eq!(fsi.lambda().clone(), reference.lambda().clone(), epsilon = 1e-8);
    }
}

#[test]
fn interface_stays_kinematically_coupled() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    first_step(&mut fsi, &params);

    let structure_gamma = fsi
        .structure()
        .interface()
        .extract_cond_vector(fsi.structure().dispnp())
        .unwrap();
    let ale_gamma = fsi.ale().interface().extract_cond_vector(fsi.ale().dispnp()).unwrap();
    assert_relative_eq!(fsi.couplings().struct_to_ale(&structure_gamma).unwrap(), ale_gamma, epsilon = 1e-14);

    // θ = 1 and uⁿ = 0: u_Γ = d_Γ / dt
    let fluid_gamma = fsi
        .fluid()
        .interface()
        .extract_cond_vector(fsi.fluid().velnp())
        .unwrap();
    let expected = fsi.couplings().struct_to_fluid(&structure_gamma).unwrap() / params.timestep;
    assert_relative_eq!(fluid_gamma, expected, epsilon = 1e-12);
}

#[test]
fn time_loop_writes_multiplier_and_energy() {
    let params = fsi_params();
    let mut fsi = setup(&ChannelParams::default(), &params);
    let mut results = MemoryResults::new();
    let mut time_loop = FsiTimeLoop::new(&params, newton(&params));
    let summary = time_loop.run(&mut fsi, &mut results).unwrap();

    assert_eq!(summary.num_steps(), 3);
    assert_eq!(summary.steps[0].iterations, 2);
    assert!(summary.steps.iter().all(|s| s.iterations <= 2));
    assert_relative_eq!(summary.final_time(), 0.3, epsilon = 1e-12);
    assert_eq!(results.steps(LAMBDA_NAME), vec![1, 2, 3]);
    assert_eq!(results.steps("structure_displacement"), vec![1, 2, 3]);

    let energy: f64 = summary.steps.iter().map(|s| s.energy_increment).sum();
    assert_relative_eq!(summary.energy_sum, energy);
    assert_relative_eq!(fsi.energy_sum(), energy, epsilon = 1e-14);
    assert_eq!(fsi.lambda_old(), Some(fsi.lambda()));
}

#[test]
fn zero_intervals_disable_output() {
    let params = FsiDynamicParams {
        restart_every: 0,
        results_every: 2,
        numstep: 4,
        ..fsi_params()
    };
    params.validate().unwrap();
    let mut fsi = setup(&ChannelParams::default(), &params);
    let mut results = MemoryResults::new();
    let summary = FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut results)
        .unwrap();
    assert_eq!(summary.num_steps(), 4);
    assert_eq!(results.steps(LAMBDA_NAME), vec![2, 4]);
    assert_eq!(results.steps("structure_displacement"), vec![2, 4]);

    let silent = FsiDynamicParams {
        restart_every: 0,
        results_every: 0,
        ..fsi_params()
    };
    let mut fsi = setup(&ChannelParams::default(), &silent);
    let mut results = MemoryResults::new();
    FsiTimeLoop::new(&silent, newton(&silent))
        .run(&mut fsi, &mut results)
        .unwrap();
    assert!(results.steps(LAMBDA_NAME).is_empty());
    assert!(results.steps("ale_displacement").is_empty());
}

#[test]
fn restart_restores_multiplier() {
    let params = FsiDynamicParams {
        numstep: 2,
        ..fsi_params()
    };
    let mut fsi = setup(&ChannelParams::default(), &params);
    let mut results = MemoryResults::new();
    FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut results)
        .unwrap();

    let mut restarted = setup(&ChannelParams::default(), &params);
    restarted.read_restart(&results, 2).unwrap();
    assert_eq!(restarted.lambda(), fsi.lambda());
    assert_eq!(restarted.lambda_old(), Some(fsi.lambda()));

    assert!(restarted.read_restart(&results, 7).is_err());
}

#[test]
fn continue_policy_accepts_unconverged_steps() {
    let mut params = fsi_params();
    params.monolithic.itemax = 1;
    params.time_adaptivity.divercont = DivergenceAction::Continue;
    let mut fsi = setup(&ChannelParams::default(), &params);

    let summary = FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut MemoryResults::new())
        .unwrap();
    assert_eq!(summary.unconverged_steps, 3);
    assert_eq!(summary.num_steps(), 3);
}

#[test]
fn halving_stops_at_minimal_step() {
    let mut params = fsi_params();
    params.monolithic.itemax = 1;
    params.time_adaptivity.divercont = DivergenceAction::HalveStep;
    params.time_adaptivity.dtmin = 0.03;
    let mut fsi = setup(&ChannelParams::default(), &params);

    let err = FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut MemoryResults::new())
        .unwrap_err();
    assert!(matches!(err, FsiError::Solver(SolverError::NonConvergence { .. })));
    // 0.1 -> 0.05 -> 0.025 < dtmin
    assert_relative_eq!(CoupledTimeIntegrator::dt(&fsi), 0.05);
}

#[test]
fn adaptive_steps_stay_within_bounds() {
    let mut params = fsi_params();
    params.numstep = 6;
    params.time_adaptivity.time_adapt_on = true;
    params.time_adaptivity.dtmax = 0.2;
    let mut fsi = setup(&ChannelParams::default(), &params);

    let summary = FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut MemoryResults::new())
        .unwrap();
    assert_eq!(summary.num_steps(), 6);
    assert!(summary.steps.iter().all(|s| (1e-4..=0.2).contains(&s.dt)));
    let elapsed: f64 = summary.steps.iter().map(|s| s.dt).sum();
    assert_relative_eq!(summary.final_time(), elapsed, epsilon = 1e-12);
}

#[test]
fn shape_derivatives_only_with_flag() {
    let mut params = fsi_params();
    let mut without = setup(&ChannelParams::default(), &params);
    let (a_without, _) = assembled(&mut without);
    params.monolithic.shape_derivatives = true;
    let mut with = setup(&ChannelParams::default(), &params);
    let (a_with, _) = assembled(&mut with);

    let gs = with.structure().interface().cond_map().gid(0);
    let gf = with.couplings().coupsf.master_gid_to_slave(gs).unwrap();
    let lid = with.extractor().full_map().lid(gs).unwrap();
    let g = with.fluid().shape_derivatives().unwrap().matrix(1, 1).get(gf, gf);
    assert!(g.abs() > 0.0);
    assert_relative_eq!(a_with[(lid, lid)] - a_without[(lid, lid)], g, epsilon = 1e-12);
}
