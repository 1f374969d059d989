use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use log::info;

use ifem::params::SimulationType;
use ifem::{Fsi, Parameters, PenaltyFluid, SolidSolver};

const ABOUT: &str = "
Immersed finite element simulation of a Lagrangian solid in an Eulerian fluid.";

#[derive(Parser)]
#[clap(author, about = ABOUT, name = "ifem")]
struct Opt {
    /// Path to the parameter file.
    ///
    /// Files with a `.ron` extension are deserialized directly. Anything else is read as a
    /// list of `set key = value` lines.
    #[clap(name = "PARAMS", parse(from_os_str), default_value = "parameters.prm")]
    params: PathBuf,

    /// Directory for results and checkpoints.
    ///
    /// Overrides the output directory given in the parameter file. A run restarts from the
    /// latest checkpoint found here.
    #[clap(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Log file path.
    #[clap(short, long, parse(from_os_str))]
    logfile: Option<PathBuf>,

    #[clap(flatten)]
    verbose: Verbosity,
}

pub fn main() {
    if let Err(err) = try_main() {
        eprintln!();
        eprintln!("----------------------------------------------------");
        eprintln!("Exception on processing:");
        eprintln!("{:#}", err);
        eprintln!("Aborting!");
        eprintln!("----------------------------------------------------");
        std::process::exit(1);
    }
}

pub fn try_main() -> Result<()> {
    let opt = Opt::parse();

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::new().filter_or("IFEM_LOG", "info"),
    );
    // `-v` and `-q` override the environment.
    let level = opt.verbose.log_level_filter();
    if level != log::LevelFilter::Error {
        builder.filter_level(level);
    }
    let _ = builder.try_init();

    // Pre-emptively create the log file. This way we can fail early.
    if let Some(logfile) = opt.logfile.as_ref() {
        let _ = std::fs::File::create(logfile)?;
    }

    let mut params = Parameters::load(&opt.params)?;
    if let Some(output) = opt.output {
        params.output_dir = output;
    }
    std::fs::create_dir_all(&params.output_dir)?;

    // Write the parameters so we know how the results were created.
    if let Some(ref logfile) = opt.logfile {
        let f = std::fs::File::options().append(true).open(logfile)?;
        let mut buf = std::io::BufWriter::new(f);
        writeln!(buf, "\nParameters:\n\n{:#?}", params)?;
    }

    info!(
        "Running a {:?} simulation in {}",
        params.simulation_type,
        params.output_dir.display()
    );
    match params.simulation_type {
        SimulationType::Solid => SolidSolver::from_params(params)?.run()?,
        SimulationType::Fluid => PenaltyFluid::from_params(params).run()?,
        SimulationType::FSI => {
            let mut solid = SolidSolver::from_params(params.clone())?;
            let mut fluid = PenaltyFluid::from_params(params.clone());
            Fsi::new(&mut solid, &mut fluid, params).run()?;
        }
    }
    Ok(())
}
