//! Configuration settings for running a convergence study

use std::{
    fmt::{Debug, Display},
    fs::read_to_string,
    path::{Path, PathBuf},
};

use dftq::{input::Grid, program::Parameter};
use serde::{Deserialize, Serialize};

use crate::Error;


/// Templates can either be literal strings in the config file, or the name of a
/// file to be loaded
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(untagged)]
enum TemplateSrc {
    Literal(String),
    File { file: String },
}

impl TryFrom<TemplateSrc> for String {
    type Error = Error;

    fn try_from(value: TemplateSrc) -> Result<Self, Self::Error> {
        match value {
            TemplateSrc::Literal(s) => Ok(s),
            TemplateSrc::File { file } => read_to_string(&file).map_err(|e| {
                Error::Config(format!(
                    "failed to locate template file {file} with {e}"
                ))
            }),
        }
    }
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    /// The template input file for the simulation program. Its k-point card is
    /// rewritten into automatic form, and the grid is replaced on every
    /// iteration. Everything else is copied verbatim.
    template: String,

    /// The command running the simulation program, including any launcher,
    /// for example "mpirun -np 16 pw.x". The input file is redirected to its
    /// standard input and its standard output is written to the output file.
    command: String,

    /// The simulation program. Currently only "qe" (Quantum ESPRESSO pw.x) is
    /// supported.
    program: Option<Program>,

    /// The queuing system to use in running the jobs. Currently-supported
    /// values are "local", which uses sh to run computations directly, "pbs",
    /// and "slurm".
    queue: Queue,

    /// The template for the queue submission script. Supported formatting
    /// directives include {{.basename}} for the name of the job and {{.dir}}
    /// for the directory it runs in. The command running the job is appended
    /// to the end.
    queue_template: Option<TemplateSrc>,

    /// Additional options to pass to the submit command, for example
    /// "-l nodes=1:ppn=16".
    queue_params: Option<String>,

    /// The input parameter to converge. Only "kpoints" is supported.
    parameter: Option<Parameter>,

    /// The property used to judge convergence. Only "total energy" is
    /// supported.
    criterion: Option<String>,

    /// The largest change in the criterion between successive iterations, in
    /// eV, that is considered converged. Must be greater than 0. Defaults to
    /// 1e-8.
    tolerance: Option<f64>,

    /// The starting k-point grid, as three non-negative integers.
    start: Vec<i64>,

    /// The amount to add to the grid after each unconverged iteration, as
    /// three non-negative integers.
    step: Vec<i64>,

    /// The interval in seconds to wait between checks on the running job.
    /// Defaults to 10.
    sleep_int: Option<usize>,

    /// The number of seconds to wait for a single job to leave the queue
    /// before giving up on it. By default jobs are waited on indefinitely.
    timeout: Option<u64>,

    /// The maximum number of iterations to run before giving up. Defaults to
    /// 20.
    max_iter: Option<usize>,

    /// The number of times to rerun an iteration whose job failed to run or
    /// whose output lacks an energy. Defaults to 0.
    retries: Option<usize>,

    /// The directory in which to create the per-iteration directories.
    /// Defaults to the current directory.
    root: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Program {
    #[default]
    #[serde(alias = "qe", alias = "pw.x", alias = "espresso")]
    QuantumEspresso,
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Program::QuantumEspresso => write!(f, "qe"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Queue {
    #[serde(alias = "pbs")]
    Pbs,
    #[serde(alias = "slurm")]
    Slurm,
    #[serde(alias = "local")]
    Local,
}

impl Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Queue::Pbs => "pbs",
                Queue::Slurm => "slurm",
                Queue::Local => "local",
            }
        )
    }
}

/// The scalar property compared between iterations
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Criterion {
    #[serde(rename = "total energy")]
    TotalEnergy,
}

impl Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::TotalEnergy => write!(f, "total energy"),
        }
    }
}

impl std::str::FromStr for Criterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total energy" => Ok(Self::TotalEnergy),
            _ => Err(Error::Config(format!(
                "unsupported criterion '{s}', only 'total energy' is allowed"
            ))),
        }
    }
}

/// Construct a full `Config` using [Config::load] on a TOML file or use
/// [Config::new] and the Builder pattern
#[derive(Clone, Serialize, Deserialize, PartialEq, Debug)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    /// path to the template input file
    pub template: PathBuf,

    /// the program command, without redirections
    pub command: String,

    pub program: Program,

    /// the type of queuing system to use, as deserialized from [Queue]
    pub queue: Queue,

    /// the optional template to use for the queuing system. If this is not
    /// provided, the queue's implementation of
    /// [dftq::queue::Queue::default_submit_script] will be used
    pub queue_template: Option<String>,

    /// extra arguments to the submit command
    pub queue_params: Option<String>,

    /// the parameter being converged
    pub parameter: Parameter,

    pub criterion: Criterion,

    /// convergence threshold in eV
    pub tolerance: f64,

    /// the first grid to run
    pub start: Grid,

    /// the grid increment between iterations
    pub step: Grid,

    /// how long to sleep between intervals polling running jobs
    pub sleep_int: usize,

    /// seconds to wait on a single job. None means wait forever
    pub timeout: Option<u64>,

    /// the iteration cap
    pub max_iter: usize,

    /// how many times to rerun a failed iteration
    pub retries: usize,

    /// directory holding the per-iteration directories
    pub root: PathBuf,
}

/// convert `v` into a [Grid], checking that it has exactly three non-negative
/// entries
fn grid(name: &str, v: &[i64]) -> Result<Grid, Error> {
    let [x, y, z] = v else {
        return Err(Error::Config(format!(
            "k-point {name} must be input as [x, y, z], got {} values",
            v.len()
        )));
    };
    let mut ret = [0; 3];
    for (r, &i) in ret.iter_mut().zip([x, y, z]) {
        *r = usize::try_from(i).map_err(|_| {
            Error::Config(format!(
                "k-point {name} values must not be negative, got {v:?}"
            ))
        })?;
    }
    Ok(Grid(ret))
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(rc: RawConfig) -> Result<Self, Self::Error> {
        let ret = Self {
            template: PathBuf::from(rc.template),
            command: rc.command,
            program: rc.program.unwrap_or_default(),
            queue: rc.queue,
            queue_template: rc
                .queue_template
                .map(String::try_from)
                .transpose()?,
            queue_params: rc.queue_params,
            parameter: rc.parameter.unwrap_or(Parameter::Kpoints),
            criterion: rc
                .criterion
                .as_deref()
                .unwrap_or("total energy")
                .parse()?,
            tolerance: rc.tolerance.unwrap_or(1e-8),
            start: grid("grid", &rc.start)?,
            step: grid("grid step", &rc.step)?,
            sleep_int: rc.sleep_int.unwrap_or(10),
            timeout: rc.timeout,
            max_iter: rc.max_iter.unwrap_or(20),
            retries: rc.retries.unwrap_or(0),
            root: rc.root.map(PathBuf::from).unwrap_or_else(|| ".".into()),
        };
        ret.validate()?;
        Ok(ret)
    }
}

macro_rules! int_builders {
    ($($name: ident$(,)*)*) => {
        $(pub fn $name(mut self, i: usize) -> Self {
            self.$name = i;
            self
        })*
    }
}

impl Config {
    /// Construct a [Config] with default values for `tolerance` (1e-8 eV),
    /// `queue_template` (`None`), `queue_params` (`None`), `sleep_int` (10
    /// seconds), `timeout` (`None`), `max_iter` (20), `retries` (0), and
    /// `root` (the current directory)
    pub fn new(
        template: impl Into<PathBuf>,
        command: impl Into<String>,
        queue: Queue,
        start: Grid,
        step: Grid,
    ) -> Self {
        Self {
            template: template.into(),
            command: command.into(),
            program: Program::QuantumEspresso,
            queue,
            queue_template: None,
            queue_params: None,
            parameter: Parameter::Kpoints,
            criterion: Criterion::TotalEnergy,
            tolerance: 1e-8,
            start,
            step,
            sleep_int: 10,
            timeout: None,
            max_iter: 20,
            retries: 0,
            root: PathBuf::from("."),
        }
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn queue_template(mut self, t: Option<String>) -> Self {
        self.queue_template = t;
        self
    }

    pub fn queue_params(mut self, p: Option<String>) -> Self {
        self.queue_params = p;
        self
    }

    int_builders!(sleep_int, max_iter, retries);

    /// load a [Config] from the TOML file specified by `filename`. returns
    /// [Error::Config] on failure to read the file, to deserialize it, or if
    /// the settings fail [Config::validate]
    pub fn load<P>(filename: P) -> Result<Self, Error>
    where
        P: AsRef<Path> + Debug,
    {
        let contents = std::fs::read_to_string(&filename).map_err(|e| {
            Error::Config(format!(
                "failed to load config file {filename:?} with {e}"
            ))
        })?;
        toml::from_str(&contents).map_err(|e| {
            Error::Config(format!(
                "failed to deserialize config file {filename:?} with {e}"
            ))
        })
    }

    /// check that the settings in `self` make any sense
    pub fn validate(&self) -> Result<(), Error> {
        if self.parameter != Parameter::Kpoints {
            return Err(Error::Config(format!(
                "unsupported parameter '{}', only 'kpoints' is allowed",
                self.parameter
            )));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(Error::Config(format!(
                "tolerance must be greater than 0, got {}",
                self.tolerance
            )));
        }
        if self.max_iter < 2 {
            return Err(Error::Config(format!(
                "max_iter must be at least 2 to compare iterations, got {}",
                self.max_iter
            )));
        }
        if self.command.trim().is_empty() {
            return Err(Error::Config("command must not be empty".to_owned()));
        }
        Ok(())
    }

    /// the job timeout as a [std::time::Duration]
    pub fn timeout_duration(&self) -> Option<std::time::Duration> {
        self.timeout.map(std::time::Duration::from_secs)
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Config {
            template,
            command,
            program,
            queue,
            queue_template,
            queue_params,
            parameter,
            criterion,
            tolerance,
            start,
            step,
            sleep_int,
            timeout,
            max_iter,
            retries,
            root,
        } = self;
        writeln!(
            f,
            "
Configuration Options:
template = {template:?}
command = {command}
program = {program}
queue = {queue}
queue_params = {queue_params:?}
parameter = {parameter}
criterion = {criterion}
tolerance = {tolerance:e}
start = [{start}]
step = [{step}]
sleep_int = {sleep_int}
timeout = {timeout:?}
max_iter = {max_iter}
retries = {retries}
root = {root:?}"
        )?;
        if let Some(t) = queue_template {
            writeln!(f, "queue_template = {{\n{t}\n}}")?;
        }
        Ok(())
    }
}
