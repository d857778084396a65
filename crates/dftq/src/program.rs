use std::{
    error::Error,
    fmt::Display,
    fs::read_to_string,
    path::Path,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::input::{InputDocument, InputError, Template};

pub mod espresso;


#[derive(Debug, PartialEq, Eq)]
pub enum ProgramError {
    FileNotFound(String),
    ReadFileError(String, std::io::ErrorKind),
    EnergyNotFound(String),
    EnergyParseError(String),
    KpointsParseError(String),
}

impl ProgramError {
    /// Returns `true` if the program error is [`EnergyNotFound`], meaning the
    /// output file exists but never reached the final energy.
    ///
    /// [`EnergyNotFound`]: ProgramError::EnergyNotFound
    #[must_use]
    pub fn is_energy_not_found(&self) -> bool {
        matches!(self, Self::EnergyNotFound(..))
    }
}

impl Display for ProgramError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for ProgramError {}

/// The generic names of the input parameters a convergence study can vary.
/// Each [Program] maps these onto its own input keywords
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Parameter {
    #[serde(alias = "kpoints")]
    Kpoints,
    #[serde(alias = "kinetic energy cutoff", alias = "ecut")]
    KineticEnergyCutoff,
}

impl Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Parameter::Kpoints => write!(f, "kpoints"),
            Parameter::KineticEnergyCutoff => write!(f, "kinetic energy cutoff"),
        }
    }
}

/// A line marker in a program's output: any line containing `token` holds a
/// value in its whitespace-separated field number `field`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Marker {
    pub token: &'static str,
    pub field: usize,
}

/// The values recovered from an output file. `None` means the corresponding
/// marker never appeared, which is distinct from a value of zero
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Extraction {
    pub energy: Option<f64>,
    pub kpoints: Option<usize>,
}

impl Extraction {
    /// the energy, or [ProgramError::EnergyNotFound] naming `outfile` if it
    /// was never found
    pub fn energy(&self, outfile: &str) -> Result<f64, ProgramError> {
        self.energy
            .ok_or_else(|| ProgramError::EnergyNotFound(outfile.to_owned()))
    }
}

/// Pulls the total energy and the number of k-points out of an output file
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extractor {
    pub energy: Marker,
    pub kpoints: Marker,

    /// factor multiplying the raw energy, for converting units
    pub scale: f64,
}

impl Extractor {
    /// scan every line of `contents` once, in order. when a marker occurs more
    /// than once, the last occurrence wins. `outname` is only used for error
    /// messages
    pub fn extract(
        &self,
        contents: &str,
        outname: &str,
    ) -> Result<Extraction, ProgramError> {
        let mut ret = Extraction::default();
        for line in contents.lines() {
            if line.contains(self.energy.token) {
                ret.energy = Some(
                    parse_field::<f64>(line, self.energy.field).ok_or_else(
                        || ProgramError::EnergyParseError(outname.to_owned()),
                    )? * self.scale,
                );
            }
            if line.contains(self.kpoints.token) {
                ret.kpoints =
                    Some(parse_field(line, self.kpoints.field).ok_or_else(
                        || ProgramError::KpointsParseError(outname.to_owned()),
                    )?);
            }
        }
        Ok(ret)
    }

    /// read the output file at `path` and [Extractor::extract] from it
    pub fn read(&self, path: &Path) -> Result<Extraction, ProgramError> {
        let outname = path.display().to_string();
        if !path.exists() {
            return Err(ProgramError::FileNotFound(outname));
        }
        let contents = match read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                return Err(ProgramError::ReadFileError(outname, e.kind()));
            }
        };
        self.extract(&contents, &outname)
    }
}

/// parse the `nth` whitespace-separated field of `line`, returning None if the
/// field is missing or fails to parse
#[inline]
fn parse_field<T: FromStr>(line: &str, nth: usize) -> Option<T> {
    line.split_whitespace().nth(nth)?.parse().ok()
}

/// A trait for describing the simulation packages whose inputs can be
/// rewritten and whose outputs can be read
pub trait Program {
    /// a short name for the program, used in log messages
    fn name(&self) -> &'static str;

    /// the keyword introducing `param` in an input file
    fn keyword(&self, param: Parameter) -> &'static str;

    /// the extension of input files, without the leading dot
    fn extension(&self) -> &'static str {
        "in"
    }

    /// the [Extractor] configured with this program's output markers
    fn extractor(&self) -> Extractor;

    /// locate the k-point card in `doc` and convert it into a [Template] with
    /// an automatic grid placeholder
    fn template(&self, doc: &InputDocument) -> Result<Template, InputError> {
        let keyword = self.keyword(Parameter::Kpoints);
        let Some(line) = doc.find_line(keyword) else {
            return Err(InputError::CardNotFound(keyword.to_owned()));
        };
        doc.kpoint_template(line, keyword)
    }

    /// read the output file at `path`
    fn read_output(&self, path: &Path) -> Result<Extraction, ProgramError> {
        self.extractor().read(path)
    }
}
