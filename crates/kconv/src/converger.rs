//! The convergence loop: render an input for the current grid, run it, read
//! the energy, and either stop or step the grid

use std::{
    error::Error as StdError,
    fmt::Display,
    io::ErrorKind,
    path::PathBuf,
};

use dftq::{
    input::{Grid, InputDocument, Template},
    program::{Program, ProgramError},
    queue::{Job, Queue, QueueError},
    time,
};
use log::{info, warn};
use serde::Serialize;

use crate::{
    Error,
    config::{Config, Criterion},
};


/// The result of one completed iteration
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub grid: Grid,

    /// total energy in eV
    pub energy: f64,

    /// the number of k-points reported by the program, if it reported one
    pub kpoints: Option<usize>,
}

/// The mutable state of a study. `history` only ever grows, and `converged`
/// only ever goes from false to true
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub criterion: Criterion,
    pub tolerance: f64,
    history: Vec<Sample>,
    converged: bool,
}

impl State {
    pub fn new(criterion: Criterion, tolerance: f64) -> Self {
        Self {
            criterion,
            tolerance,
            history: Vec::new(),
            converged: false,
        }
    }

    pub fn history(&self) -> &[Sample] {
        &self.history
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// the change in energy between the last two samples, if there are two
    pub fn delta(&self) -> Option<f64> {
        match self.history.as_slice() {
            [.., prev, last] => Some((last.energy - prev.energy).abs()),
            _ => None,
        }
    }

    /// record `sample` and return whether the study has now converged. with
    /// fewer than two samples there is nothing to compare, so the study is not
    /// converged
    pub fn push(&mut self, sample: Sample) -> bool {
        self.history.push(sample);
        if let Some(delta) = self.delta()
            && delta <= self.tolerance
        {
            self.converged = true;
        }
        self.converged
    }
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// the last two samples agreed to within the tolerance. `sample` is the
    /// last one
    Converged { sample: Sample, history: Vec<Sample> },

    /// the iteration cap was reached first
    ExceededIterations { history: Vec<Sample> },

    /// the iteration on `grid` still failed after every retry. `history`
    /// holds the samples completed before it
    Failed {
        grid: Grid,
        source: IterationError,
        history: Vec<Sample>,
    },
}

impl Outcome {
    pub fn history(&self) -> &[Sample] {
        match self {
            Outcome::Converged { history, .. } => history,
            Outcome::ExceededIterations { history } => history,
            Outcome::Failed { history, .. } => history,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged { .. })
    }
}

/// The ways a single iteration can fail without ending the study outright
#[derive(Debug, PartialEq)]
pub enum IterationError {
    /// failed to create the iteration directory, write its input file, or
    /// remove a stale output file
    Io(PathBuf, ErrorKind),
    Queue(QueueError),
    Program(ProgramError),
}

impl Display for IterationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterationError::Io(p, e) => {
                write!(f, "failed to prepare {} with {e}", p.display())
            }
            IterationError::Queue(e) => write!(f, "{e}"),
            IterationError::Program(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for IterationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            IterationError::Io(..) => None,
            IterationError::Queue(e) => Some(e),
            IterationError::Program(e) => Some(e),
        }
    }
}

impl From<QueueError> for IterationError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl From<ProgramError> for IterationError {
    fn from(e: ProgramError) -> Self {
        Self::Program(e)
    }
}

impl IterationError {
    /// whether running the iteration again is safe. a job that could not be
    /// cancelled may still be running and writing to the same output file
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IterationError::Queue(e) if e.is_cancel())
    }
}

/// the name shared by the directory, input file, and output file of the
/// iteration running `grid`, like `kpoints_4x4x2`
pub fn job_name(parameter: impl Display, grid: &Grid) -> String {
    let [x, y, z] = grid.0;
    format!("{parameter}_{x}x{y}x{z}")
}

/// Drives a convergence study of `config.parameter`, using `program` to
/// read outputs and `queue` to run the jobs
pub struct Converger<'a, P: Program, Q: Queue> {
    config: &'a Config,
    program: &'a P,
    queue: &'a Q,
    template: Template,
    state: State,

    /// absolute form of `config.root`, since relative paths mean something
    /// else once a job lands on a compute node
    root: PathBuf,
}

impl<'a, P: Program, Q: Queue> Converger<'a, P, Q> {
    /// load the template input named in `config` and rewrite its k-point card.
    /// fails if `config` is invalid, if the template does not exist, or if the
    /// card cannot be found or rewritten
    pub fn new(
        config: &'a Config,
        program: &'a P,
        queue: &'a Q,
    ) -> Result<Self, Error> {
        config.validate()?;
        let root = std::path::absolute(&config.root).map_err(|e| {
            Error::Config(format!(
                "failed to resolve root {} with {e}",
                config.root.display()
            ))
        })?;
        let doc = InputDocument::load(&config.template)?;
        let template = program.template(&doc)?;
        info!(
            "loaded {} template {} with k-point grid on line {}",
            program.name(),
            config.template.display(),
            template.placeholder() + 1
        );
        Ok(Self {
            config,
            program,
            queue,
            template,
            state: State::new(config.criterion, config.tolerance),
            root,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// the [Job] running `grid`, in its own directory under the absolute root
    pub fn job(&self, grid: &Grid) -> Job {
        let name = job_name(self.config.parameter, grid);
        Job::new(
            &name,
            &self.config.command,
            self.root.join(&name),
            format!("{name}.{}", self.program.extension()),
            format!("{name}.out"),
            self.config.queue_params.clone(),
        )
    }

    /// Run the calculation for `grid` in its own directory under
    /// `config.root`: write the input file, run the job to completion, and
    /// read the energy from the output. A missing energy is an error rather
    /// than a zero
    pub fn iterate(&self, grid: &Grid) -> Result<Sample, IterationError> {
        let mut job = self.job(grid);
        let name = job.name.clone();
        std::fs::create_dir_all(&job.dir)
            .map_err(|e| IterationError::Io(job.dir.clone(), e.kind()))?;
        let inpath = job.inpath();
        self.template
            .write(grid, &inpath)
            .map_err(|e| IterationError::Io(inpath, e.kind()))?;

        // don't mistake output left by an earlier run for this one
        let outpath = job.outpath();
        if let Err(e) = std::fs::remove_file(&outpath)
            && e.kind() != ErrorKind::NotFound
        {
            return Err(IterationError::Io(outpath, e.kind()));
        }

        time!(e, {
            self.queue.run(&mut job, self.config.timeout_duration())?;
        });
        log::debug!("{name} finished in {:.1} s", e.as_secs_f64());

        let extraction = self.program.read_output(&outpath)?;
        let energy = extraction.energy(&outpath.display().to_string())?;
        if extraction.kpoints.is_none() {
            warn!("no k-point count found in {}", outpath.display());
        }
        Ok(Sample {
            grid: *grid,
            energy,
            kpoints: extraction.kpoints,
        })
    }

    /// call [Converger::iterate] on `grid`, retrying up to `config.retries`
    /// times
    fn attempt(&self, grid: &Grid) -> Result<Sample, IterationError> {
        let mut tries = 0;
        loop {
            match self.iterate(grid) {
                Ok(sample) => return Ok(sample),
                Err(e) if tries < self.config.retries && e.is_retryable() => {
                    tries += 1;
                    warn!(
                        "iteration on grid {grid} failed with `{e}`, \
                         retrying ({tries}/{})",
                        self.config.retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run iterations, starting from `config.start` and adding `config.step`
    /// after each one, until two successive energies differ by no more than
    /// `config.tolerance` or `config.max_iter` iterations have run. An
    /// iteration that fails after every retry ends the study with
    /// [Outcome::Failed], keeping the samples collected so far
    pub fn run(mut self) -> Outcome {
        let mut grid = self.config.start;
        for iter in 1..=self.config.max_iter {
            let sample = match self.attempt(&grid) {
                Ok(sample) => sample,
                Err(source) => {
                    warn!("iteration on grid {grid} failed with `{source}`");
                    return Outcome::Failed {
                        grid,
                        source,
                        history: self.state.history,
                    };
                }
            };
            let converged = self.state.push(sample);
            match self.state.delta() {
                Some(delta) => info!(
                    "iteration {iter}: grid {grid}, E = {:.8} eV, dE = {delta:.3e} eV",
                    sample.energy
                ),
                None => info!(
                    "iteration {iter}: grid {grid}, E = {:.8} eV",
                    sample.energy
                ),
            }
            if converged {
                info!("converged at grid {grid} after {iter} iterations");
                return Outcome::Converged {
                    sample,
                    history: self.state.history,
                };
            }
            grid.step(&self.config.step);
        }
        warn!(
            "failed to converge {} within {} iterations",
            self.state.criterion, self.config.max_iter
        );
        Outcome::ExceededIterations {
            history: self.state.history,
        }
    }
}
