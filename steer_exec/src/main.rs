//! Steering controller executable entry point.
//!
//! Runs the steering controller in closed loop against the kinematic
//! simulation host, recording telemetry for offline model training.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Create the session and initialise logging
//!     - Load the controller and simulation parameters
//!     - Apply command line overrides
//!     - Initialise the controller and the simulation
//!     - Run the simulation for the requested number of ticks
//!     - Close the controller, flushing the telemetry, whether or not the run
//!       succeeded

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::PathBuf;
use color_eyre::{Report, eyre::WrapErr};
use log::{error, info};
use structopt::StructOpt;

// Internal
use steer_lib::{sim::{self, Sim}, steer_ctrl::{self, Controller}};
use util::{
    archive::Archiver,
    logger::{logger_init, LevelFilter, ModuleLevel},
    session::Session
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Run the steering controller against the simulation host.
#[derive(Debug, StructOpt)]
#[structopt(name = "steer_exec")]
struct Opt {
    /// Path to the steering controller parameters.
    #[structopt(long, parse(from_os_str), default_value = "params/steer_ctrl.toml")]
    params: PathBuf,

    /// Path to the simulation parameters.
    #[structopt(long, parse(from_os_str), default_value = "params/sim.toml")]
    sim_params: PathBuf,

    /// Name of the control law to run, overriding the parameter file.
    #[structopt(long)]
    law: Option<String>,

    /// Number of ticks to run, overriding the simulation parameters.
    #[structopt(long)]
    ticks: Option<u64>,

    /// Telemetry output path, overriding the parameter file.
    #[structopt(long, parse(from_os_str))]
    telemetry: Option<PathBuf>,

    /// Disable telemetry recording.
    #[structopt(long, conflicts_with = "telemetry")]
    no_telemetry: bool,

    /// Directory in which session directories are created.
    #[structopt(long, parse(from_os_str), default_value = "sessions")]
    sessions_dir: PathBuf,

    /// Minimum log level, at least `info`.
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    /// Log level for a module path, as `path=level`. May be repeated.
    #[structopt(long = "log-module", number_of_values = 1)]
    log_modules: Vec<ModuleLevel>
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("steer_exec", &opt.sessions_dir)
        .wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opt.log_level, &opt.log_modules, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Steering Controller Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut ctrl_params: steer_ctrl::Params = util::params::load(&opt.params)
        .wrap_err("Could not load steering controller params")?;
    let mut sim_params: sim::Params = util::params::load(&opt.sim_params)
        .wrap_err("Could not load simulation params")?;

    if let Some(ref law) = opt.law {
        ctrl_params.law = law.clone();
    }
    if let Some(ref path) = opt.telemetry {
        ctrl_params.telemetry_path = path.clone();
    }
    if opt.no_telemetry {
        ctrl_params.telemetry_enabled = false;
    }
    if let Some(ticks) = opt.ticks {
        sim_params.num_ticks = ticks;
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut controller = Controller::init(&ctrl_params)
        .wrap_err("Failed to initialise the steering controller")?;

    let num_ticks = sim_params.num_ticks;
    let mut sim = Sim::new(sim_params)
        .wrap_err("Failed to initialise the simulation")?
        .with_archiver(
            Archiver::from_path(&session, "sim/vehicle.csv")
                .wrap_err("Failed to create the vehicle trace archive")?
        );

    info!("Module initialisation complete\n");

    // ---- MAIN LOOP ----

    let run_result = sim.run(&mut controller, num_ticks);

    // ---- SHUTDOWN ----

    // The controller is closed even if the run failed so the telemetry
    // gathered so far is kept.
    let close_result = controller.close();
    if let Err(ref e) = close_result {
        error!("Failed to close the steering controller: {}", e);
    }

    let summary = run_result.wrap_err("Simulation run failed")?;
    close_result.wrap_err("Failed to close the steering controller")?;

    info!("Run summary:");
    info!("    Ticks: {}", summary.num_ticks);
    info!("    Waypoints reached: {}", summary.waypoints_reached);
    info!("    Mean |angular error|: {:.3} deg", summary.mean_abs_angular_error_deg);
    info!("    Max |angular error|: {:.3} deg", summary.max_abs_angular_error_deg);
    info!("    Distance travelled: {:.2} m", summary.distance_travelled_m);

    info!("End of execution");

    Ok(())
}
