//! Summaries of a finished convergence study, for people and for plotting

use std::io::Write;

use dftq::input::Grid;
use serde::Serialize;

use crate::converger::{Outcome, Sample};

#[cfg(test)]
mod tests;

/// The machine-readable result of a study, written to `kconv.json`
#[derive(Debug, PartialEq, Serialize)]
pub struct Report<'a> {
    pub converged: bool,

    /// the grid of the last sample, which is the converged grid when
    /// `converged` is true
    pub grid: Option<Grid>,

    pub tolerance: f64,

    pub samples: &'a [Sample],

    /// why the study stopped early, if an iteration failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<'a> Report<'a> {
    pub fn new(outcome: &'a Outcome, tolerance: f64) -> Self {
        let samples = outcome.history();
        Self {
            converged: outcome.is_converged(),
            grid: samples.last().map(|s| s.grid),
            tolerance,
            samples,
            error: match outcome {
                Outcome::Failed { grid, source, .. } => {
                    Some(format!("k-point grid {grid}: {source}"))
                }
                _ => None,
            },
        }
    }
}

/// write a table of the energy at each grid, and the change from the previous
/// grid, to `w`
pub fn write_summary(
    w: &mut impl Write,
    outcome: &Outcome,
) -> std::io::Result<()> {
    writeln!(
        w,
        "{:<5}{:>12}{:>8}{:>20}{:>14}",
        "Iter", "Grid", "Kpts", "Energy (eV)", "dE (eV)"
    )?;
    let mut prev = None;
    for (i, s) in outcome.history().iter().enumerate() {
        let kpts = s.kpoints.map_or_else(|| "-".to_owned(), |k| k.to_string());
        let grid = s.grid.0.map(|g| g.to_string()).join("x");
        write!(w, "{:<5}{grid:>12}{kpts:>8}{:>20.8}", i + 1, s.energy)?;
        match prev {
            Some(p) => writeln!(w, "{:>14.3e}", s.energy - p)?,
            None => writeln!(w)?,
        }
        prev = Some(s.energy);
    }
    match outcome {
        Outcome::Converged { sample, .. } => writeln!(
            w,
            "\nconverged at k-point grid {} with E = {:.8} eV",
            sample.grid, sample.energy
        ),
        Outcome::ExceededIterations { history } => writeln!(
            w,
            "\nfailed to converge after {} iterations",
            history.len()
        ),
        Outcome::Failed { grid, source, .. } => {
            writeln!(w, "\niteration on k-point grid {grid} failed: {source}")
        }
    }
}
