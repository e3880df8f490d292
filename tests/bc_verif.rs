use approx::assert_relative_eq;

use mfsi_rs::config::FsiDynamicParams;
use mfsi_rs::models::channel::{
    ChannelParams, STRUCTURE_FIELD, channel_problem_def, default_boundary_conditions,
};
use mfsi_rs::numerics::linear;
use mfsi_rs::numerics::solver::MonolithicNewton;
use mfsi_rs::numerics::transient::FsiTimeLoop;
use mfsi_rs::physics::bc::{BoundarySelector, DirichletRule, Point};
use mfsi_rs::physics::{DofPartitionProvider, StructureField};
use mfsi_rs::processing::output::MemoryResults;

fn params(numstep: usize) -> FsiDynamicParams {
    FsiDynamicParams {
        timestep: 0.1,
        numstep,
        ..FsiDynamicParams::default()
    }
}

fn newton(params: &FsiDynamicParams) -> MonolithicNewton {
    let mut newton = MonolithicNewton::new(linear::from_params(&params.monolithic));
    newton.logging = false;
    newton
}

#[test]
fn verify_ramped_lid() {
    println!("Test: ramped lid velocity on the fluid top");
    let channel = ChannelParams {
        ramp_time: 0.5,
        ..ChannelParams::default()
    };
    let params = params(3);
    let bcs = default_boundary_conditions(&channel);
    let mut fsi = channel_problem_def(&channel, &bcs, params.timestep)
        .and_then(|p| p.into_fluid_split(&params))
        .unwrap();
    FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut MemoryResults::new())
        .unwrap();

    let fluid = fsi.fluid();
    let first = fluid.dof_row_map().gid(0);
    let lid = channel.lid(0.3);
    assert_relative_eq!(lid, 0.6, epsilon = 1e-12);
    for &gid in fluid.dbc_map().gids() {
        let lid_dof = fluid.dof_row_map().lid(gid).unwrap();
        let expected = if (gid - first) % 3 == 0 { lid } else { 0.0 };
        assert_relative_eq!(fluid.velnp()[lid_dof], expected, epsilon = 1e-12);
    }
}

#[test]
fn verify_moving_support() {
    println!("Test: time dependent support displacement selected by position");
    let channel = ChannelParams::default();
    let params = params(2);
    let mut bcs = default_boundary_conditions(&channel);
    bcs.add(DirichletRule::new(
        STRUCTURE_FIELD,
        &[0],
        BoundarySelector::Predicate(std::sync::Arc::new(|p: Point| p.y < -0.25 + 1e-9)),
        |t: f64, _p: Point| 0.01 * t,
    ));
    let mut fsi = channel_problem_def(&channel, &bcs, params.timestep)
        .and_then(|p| p.into_fluid_split(&params))
        .unwrap();
    let summary = FsiTimeLoop::new(&params, newton(&params))
        .run(&mut fsi, &mut MemoryResults::new())
        .unwrap();
    assert_eq!(summary.num_steps(), 2);

    let structure = fsi.structure();
    let dbc = structure.dbc_map();
    assert_eq!(dbc.len(), 2 * channel.nx);
    for &gid in dbc.gids() {
        let expected = if gid % 2 == 0 { 0.002 } else { 0.0 };
        assert_relative_eq!(structure.dispnp()[gid], expected, epsilon = 1e-14);
    }
}
