use std::{fs::File, io::Write, os::unix::prelude::AsRawFd, path::Path};

use dftq::{
    program::espresso::QuantumEspresso,
    queue::{local::Local, pbs::Pbs, slurm::Slurm},
};
use kconv::{
    config::{Config, Program, Queue},
    converger::Outcome,
    die,
    report::{Report, write_summary},
};

include!(concat!(env!("OUT_DIR"), "/version.rs"));

use clap::Parser;

/// converge the k-point grid of a plane-wave DFT calculation
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)]
struct Args {
    /// input file
    #[arg(value_parser, default_value_t = String::from("kconv.toml"))]
    infile: String,

    /// Overwrite existing output from a previous run. Defaults to false.
    #[arg(short, long, default_value_t = false)]
    overwrite: bool,

    /// Print the git commit hash and exit. Defaults to false.
    #[arg(short, long, default_value_t = false)]
    version: bool,

    /// Serialize the input file to JSON and exit.
    #[arg(short, default_value_t = false, hide = true)]
    json: bool,
}

fn dispatch(config: &Config) -> Result<Outcome, kconv::Error> {
    let template = config.queue_template.clone();
    match (config.program, config.queue) {
        (Program::QuantumEspresso, Queue::Pbs) => kconv::run(
            config,
            &QuantumEspresso,
            &Pbs::new(config.sleep_int, template),
        ),
        (Program::QuantumEspresso, Queue::Slurm) => kconv::run(
            config,
            &QuantumEspresso,
            &Slurm::new(config.sleep_int, template),
        ),
        (Program::QuantumEspresso, Queue::Local) => {
            kconv::run(config, &QuantumEspresso, &Local::new(template))
        }
    }
}

fn main() -> Result<(), std::io::Error> {
    env_logger::init();
    let args = Args::parse();
    if args.version {
        println!("version: {}", version());
        return Ok(());
    }
    if args.json {
        let config = match Config::load(&args.infile) {
            Ok(c) => c,
            Err(e) => die!("{e}"),
        };
        match serde_json::to_string(&config) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                die!("failed to serialize {} with {e}", args.infile);
            }
        };
        return Ok(());
    }
    let path = Path::new("kconv.out");
    if path.exists() && !args.overwrite {
        die!("existing kconv output. overwrite with -o/--overwrite");
    }
    let outfile = match File::create(path) {
        Ok(f) => f,
        Err(e) => die!("failed to create {} with {e}", path.display()),
    };
    let logfile = match File::create("kconv.log") {
        Ok(f) => f,
        Err(e) => die!("failed to create kconv.log with {e}"),
    };
    let out_fd = outfile.as_raw_fd();
    let log_fd = logfile.as_raw_fd();
    // redirect stdout to outfile and stderr to logfile
    unsafe {
        libc::dup2(out_fd, 1);
        libc::dup2(log_fd, 2);
    }
    let config = match Config::load(&args.infile) {
        Ok(c) => c,
        Err(e) => die!("{e}"),
    };
    println!("PID: {}", std::process::id());
    println!("version: {}", version());
    println!("{config}");

    let outcome = match dispatch(&config) {
        Ok(o) => o,
        Err(e) => die!("{e}"),
    };

    write_summary(&mut std::io::stdout(), &outcome)?;

    let mut f = File::create("kconv.json")?;
    let report = Report::new(&outcome, config.tolerance);
    writeln!(f, "{}", serde_json::to_string_pretty(&report)?)?;

    if let Outcome::Failed { grid, source, .. } = &outcome {
        die!("iteration on k-point grid {grid} failed: {source}");
    }

    println!("normal termination of kconv");

    Ok(())
}
