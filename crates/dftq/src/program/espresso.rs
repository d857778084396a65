use serde::{Deserialize, Serialize};

use super::{Extractor, Marker, Parameter, Program};

#[cfg(test)]
mod tests;

/// eV per Rydberg
pub const RYD_TO_EV: f64 = 13.605698065894;

/// The `pw.x` code from Quantum ESPRESSO. Energies are read from the line
/// starting with `!` that pw.x prints once SCF convergence is reached:
///
/// ```text
/// !    total energy              =     -15.84452726 Ry
/// ```
///
/// and converted to eV. The k-point count comes from
///
/// ```text
///      number of k points=    10
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantumEspresso;

impl QuantumEspresso {
    pub const EXTRACTOR: Extractor = Extractor {
        energy: Marker {
            token: "!",
            field: 4,
        },
        kpoints: Marker {
            token: "number of k points",
            field: 4,
        },
        scale: RYD_TO_EV,
    };
}

impl Program for QuantumEspresso {
    fn name(&self) -> &'static str {
        "pw.x"
    }

    fn keyword(&self, param: Parameter) -> &'static str {
        match param {
            Parameter::Kpoints => "K_POINTS",
            Parameter::KineticEnergyCutoff => "ecutwfc",
        }
    }

    fn extractor(&self) -> Extractor {
        Self::EXTRACTOR
    }
}
