//! Card-based input documents and the k-point templates built from them

use std::{
    error::Error,
    fmt::Display,
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};


/// shift values written after the grid dimensions on an automatic card
const SHIFTS: &str = "0 0 0";

#[derive(Debug, PartialEq, Eq)]
pub enum InputError {
    /// the input file does not exist
    Missing(PathBuf),
    ReadError(PathBuf, std::io::ErrorKind),
    CardNotFound(String),
    /// the count line of an explicit k-point list is not an integer
    MalformedCount {
        line: usize,
        text: String,
    },
    MalformedGrid(String),
}

impl Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::Missing(p) => write!(f, "cannot open {}", p.display()),
            InputError::ReadError(p, e) => {
                write!(f, "failed to read {} with {e}", p.display())
            }
            InputError::CardNotFound(c) => {
                write!(f, "card {c} not found in template")
            }
            InputError::MalformedCount { line, text } => write!(
                f,
                "expected a k-point count on line {}, found `{text}`",
                line + 1
            ),
            InputError::MalformedGrid(s) => {
                write!(f, "failed to parse k-point grid from `{s}`")
            }
        }
    }
}

impl Error for InputError {}

/// A k-point grid: the number of points along each reciprocal lattice vector
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct Grid(pub [usize; 3]);

impl Grid {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self([x, y, z])
    }

    /// advance `self` by `step` elementwise
    pub fn step(&mut self, step: &Grid) {
        for (g, s) in self.0.iter_mut().zip(step.0) {
            *g += s;
        }
    }

    /// the line written into an automatic card for this grid
    pub fn card_line(&self) -> String {
        format!("{self} {SHIFTS}")
    }
}

impl Display for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.0;
        write!(f, "{x} {y} {z}")
    }
}

/// parse the first three fields of an automatic card line. any shift values
/// following them are ignored
impl FromStr for Grid {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InputError::MalformedGrid(s.to_owned());
        let mut fields = s.split_whitespace().map(str::parse::<usize>);
        let mut ret = [0; 3];
        for r in ret.iter_mut() {
            *r = fields.next().ok_or_else(err)?.map_err(|_| err())?;
        }
        Ok(Self(ret))
    }
}

/// The lines of a simulation input file, stored without line terminators
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputDocument {
    lines: Vec<String>,
}

impl InputDocument {
    /// load the document in `path`, returning [InputError::Missing] if it
    /// doesn't exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InputError::Missing(path.to_owned()));
        }
        let contents = read_to_string(path)
            .map_err(|e| InputError::ReadError(path.to_owned(), e.kind()))?;
        Ok(Self::from_text(&contents))
    }

    fn from_text(s: &str) -> Self {
        Self {
            lines: s.lines().map(String::from).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// return the index of the last line containing `keyword`. earlier matches
    /// are overridden by later ones
    pub fn find_line(&self, keyword: &str) -> Option<usize> {
        let mut ret = None;
        for (i, line) in self.lines.iter().enumerate() {
            if line.contains(keyword) {
                ret = Some(i);
            }
        }
        ret
    }

    /// Rewrite the k-point card headed by `keyword` on line `line` into
    /// automatic form, leaving a placeholder line for the grid directly after
    /// the header. The option following `keyword` decides the shape of the
    /// existing card:
    ///
    /// - `gamma` has no body, so a placeholder line is inserted
    /// - `automatic` already has a single grid line, which becomes the
    ///   placeholder
    /// - anything else is an explicit list, where the line after the header
    ///   holds the number of points `n` and is followed by the `n` points. The
    ///   count line becomes the placeholder and the points are deleted
    pub fn kpoint_template(
        &self,
        line: usize,
        keyword: &str,
    ) -> Result<Template, InputError> {
        let Some(header) = self.lines.get(line) else {
            return Err(InputError::CardNotFound(keyword.to_owned()));
        };
        let option = header
            .split_whitespace()
            .nth(1)
            .map(|s| {
                s.trim_matches(|c| matches!(c, '{' | '}' | '(' | ')'))
                    .to_lowercase()
            })
            .unwrap_or_default();
        let automatic = format!("{keyword} automatic");
        let placeholder = Grid::default().card_line();
        let mut lines = self.lines.clone();
        let body = line + 1;
        match option.as_str() {
            "gamma" => {
                lines[line] = automatic;
                lines.insert(body, placeholder);
            }
            "automatic" => {
                if body < lines.len() {
                    lines[body] = placeholder;
                } else {
                    lines.push(placeholder);
                }
            }
            _ => {
                let text = lines.get(body).cloned().unwrap_or_default();
                let n: usize = text.trim().parse().map_err(|_| {
                    InputError::MalformedCount {
                        line: body,
                        text: text.clone(),
                    }
                })?;
                lines[line] = automatic;
                lines[body] = placeholder;
                let start = (body + 1).min(lines.len());
                let end = (body + 1 + n).min(lines.len());
                lines.drain(start..end);
            }
        }
        Ok(Template {
            lines,
            placeholder: body,
        })
    }
}

impl FromStr for InputDocument {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_text(s))
    }
}

impl From<Vec<String>> for InputDocument {
    fn from(lines: Vec<String>) -> Self {
        Self { lines }
    }
}

/// An input document with an automatic k-point card whose grid line is a
/// placeholder to be filled in by [Template::render]
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    lines: Vec<String>,
    placeholder: usize,
}

impl Template {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// the index of the placeholder line
    pub fn placeholder(&self) -> usize {
        self.placeholder
    }

    /// return the lines of `self` with the placeholder replaced by `grid`.
    /// every other line is left untouched
    pub fn render(&self, grid: &Grid) -> Vec<String> {
        let mut ret = self.lines.clone();
        ret[self.placeholder] = grid.card_line();
        ret
    }

    /// recover the grid from the placeholder line of `lines`, as returned by
    /// [Template::render]
    pub fn grid(&self, lines: &[String]) -> Result<Grid, InputError> {
        lines
            .get(self.placeholder)
            .ok_or_else(|| InputError::MalformedGrid(String::new()))?
            .parse()
    }

    /// render `grid` into `self` and write the result to `path`
    pub fn write(
        &self,
        grid: &Grid,
        path: impl AsRef<Path>,
    ) -> std::io::Result<()> {
        use std::fmt::Write;
        let mut body = String::new();
        for line in self.render(grid) {
            writeln!(body, "{line}").unwrap();
        }
        std::fs::write(path, body)
    }
}
