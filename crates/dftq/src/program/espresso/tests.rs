use std::path::Path;

use approx::assert_abs_diff_eq;

use crate::{
    input::{Grid, InputDocument},
    program::{Extraction, ProgramError},
};

use super::*;

mod read_output {
    use super::*;

    #[test]
    fn scf() {
        let got = QuantumEspresso
            .read_output(Path::new("testfiles/qe/si.scf.out"))
            .unwrap();
        assert_eq!(got.kpoints, Some(10));
        assert_abs_diff_eq!(
            got.energy.unwrap(),
            -15.84452726 * RYD_TO_EV,
            epsilon = 1e-10
        );
    }

    /// relaxations print one `!` line per ionic step, and the last one is the
    /// relaxed energy
    #[test]
    fn relax() {
        let got = QuantumEspresso
            .read_output(Path::new("testfiles/qe/relax.out"))
            .unwrap();
        assert_abs_diff_eq!(
            got.energy.unwrap(),
            -15.84452726 * RYD_TO_EV,
            epsilon = 1e-10
        );
        assert_eq!(got.kpoints, None);
    }

    #[test]
    fn crashed() {
        let path = Path::new("testfiles/qe/crashed.out");
        let got = QuantumEspresso.read_output(path).unwrap();
        assert_eq!(
            got,
            Extraction {
                energy: None,
                kpoints: Some(42)
            }
        );
        assert_eq!(
            got.energy("testfiles/qe/crashed.out"),
            Err(ProgramError::EnergyNotFound(
                "testfiles/qe/crashed.out".to_owned()
            ))
        );
    }

    #[test]
    fn garbled() {
        let got =
            QuantumEspresso.read_output(Path::new("testfiles/qe/garbled.out"));
        assert_eq!(
            got,
            Err(ProgramError::EnergyParseError(
                "testfiles/qe/garbled.out".to_owned()
            ))
        );
    }

    #[test]
    fn missing() {
        let got =
            QuantumEspresso.read_output(Path::new("testfiles/qe/missing.out"));
        assert_eq!(
            got,
            Err(ProgramError::FileNotFound(
                "testfiles/qe/missing.out".to_owned()
            ))
        );
    }
}

#[test]
fn keywords() {
    let doc = InputDocument::load("testfiles/qe/si.scf.in").unwrap();
    let qe = QuantumEspresso;
    assert_eq!(doc.find_line(qe.keyword(Parameter::Kpoints)), Some(24));
    assert_eq!(
        doc.find_line(qe.keyword(Parameter::KineticEnergyCutoff)),
        Some(11)
    );
}

#[test]
fn template() {
    let doc = InputDocument::load("testfiles/qe/si.tpiba.in").unwrap();
    let tmpl = QuantumEspresso.template(&doc).unwrap();
    assert_eq!(tmpl.lines()[23], "K_POINTS automatic");
    assert_eq!(tmpl.placeholder(), 24);
    let rendered = tmpl.render(&Grid::new(3, 3, 3));
    assert_eq!(rendered[24], "3 3 3 0 0 0");
    assert_eq!(rendered.len(), 25);
}

#[test]
fn template_without_card() {
    let doc: InputDocument = " &control\n /\n".parse().unwrap();
    assert_eq!(
        QuantumEspresso.template(&doc),
        Err(crate::input::InputError::CardNotFound("K_POINTS".to_owned()))
    );
}
