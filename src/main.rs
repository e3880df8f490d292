use std::fs;
use std::path::Path;
use std::process::ExitCode;

use mfsi_rs::config::FsiDynamicParams;
use mfsi_rs::error::FsiError;
use mfsi_rs::models::channel::{ChannelParams, channel_problem_def, default_boundary_conditions};
use mfsi_rs::numerics::linear;
use mfsi_rs::numerics::solver::MonolithicNewton;
use mfsi_rs::numerics::transient::FsiTimeLoop;
use mfsi_rs::processing::csv_writer;
use mfsi_rs::processing::output::CsvResultWriter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const OUTPUT_DIR: &str = "output/main";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Driven channel over an elastic strip. An optional first argument names a
/// JSON file with the run parameters.
fn run() -> Result<(), FsiError> {
    let params = match std::env::args().nth(1) {
        Some(path) => {
            info!("Reading parameters from {path}");
            FsiDynamicParams::from_file(path)?
        }
        None => {
            let mut params = FsiDynamicParams {
                timestep: 0.05,
                numstep: 20,
                ..FsiDynamicParams::default()
            };
            params.monolithic.energy_file = true;
            params.monolithic.shape_derivatives = true;
            params
        }
    };

    let out = Path::new(OUTPUT_DIR);
    fs::create_dir_all(out)?;

    let channel = ChannelParams {
        ramp_time: 0.5,
        ..ChannelParams::default()
    };
    let bcs = default_boundary_conditions(&channel);
    let mut fsi = channel_problem_def(&channel, &bcs, params.timestep)?.into_fluid_split(&params)?;

    let newton = MonolithicNewton::new(linear::from_params(&params.monolithic));
    let mut time_loop = FsiTimeLoop::new(&params, newton);
    let mut writer = CsvResultWriter::new(out.join("results"))?;

    let summary = time_loop.run(&mut fsi, &mut writer)?;

    summary.write_to_file(out.join("run_summary.txt"))?;
    summary.print_to_console();
    if params.monolithic.energy_file {
        csv_writer::write_energy(out.join("interface_energy.csv"), &summary)?;
    }
    csv_writer::write_single_column(out.join("final_lambda.csv"), "lambda", fsi.lambda().as_slice())?;

    info!("Results saved to {}", out.display());
    Ok(())
}
