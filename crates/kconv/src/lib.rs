use std::{error::Error as StdError, fmt::Display, path::PathBuf};

use dftq::{input::InputError, program::Program, queue::Queue};

pub mod config;
pub mod converger;
pub mod report;

use config::Config;
use converger::{Converger, Outcome};

/// print the formatted message to stderr and exit with status 1
#[macro_export]
macro_rules! die {
    ($($t:tt)*) => {{
        eprintln!($($t)*);
        std::process::exit(1);
    }};
}

#[derive(Debug)]
pub enum Error {
    /// invalid settings, detected before any job runs
    Config(String),

    /// the template input file does not exist
    MissingResource(PathBuf),

    /// the template input file could not be read or its k-point card could
    /// not be rewritten
    Input(InputError),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(s) => write!(f, "configuration error: {s}"),
            Error::MissingResource(p) => write!(f, "cannot open {}", p.display()),
            Error::Input(e) => write!(f, "malformed template: {e}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Input(e) => Some(e),
            _ => None,
        }
    }
}

impl From<InputError> for Error {
    fn from(e: InputError) -> Self {
        match e {
            InputError::Missing(p) => Self::MissingResource(p),
            e => Self::Input(e),
        }
    }
}

/// run a full convergence study described by `config`, using `program` to
/// write inputs and read outputs and `queue` to run the jobs. only problems
/// found before the first job runs are errors. a failed iteration ends the
/// study with [Outcome::Failed] instead
pub fn run<P: Program, Q: Queue>(
    config: &Config,
    program: &P,
    queue: &Q,
) -> Result<Outcome, Error> {
    Ok(Converger::new(config, program, queue)?.run())
}
