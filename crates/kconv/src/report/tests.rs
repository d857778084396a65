use std::time::Duration;

use dftq::queue::QueueError;

use super::*;
use crate::converger::IterationError;

fn sample(n: usize, energy: f64, kpoints: Option<usize>) -> Sample {
    Sample {
        grid: Grid::new(n, n, n),
        energy,
        kpoints,
    }
}

fn history() -> Vec<Sample> {
    vec![
        sample(2, -214.96, Some(3)),
        sample(4, -215.5, Some(10)),
        sample(6, -215.5005, None),
    ]
}

#[test]
fn summary() -> anyhow::Result<()> {
    let history = history();
    let outcome = Outcome::Converged {
        sample: history[2],
        history,
    };
    let mut got = Vec::new();
    write_summary(&mut got, &outcome)?;
    let got = String::from_utf8(got)?;
    insta::assert_snapshot!(got, @r"
    Iter         Grid    Kpts         Energy (eV)       dE (eV)
    1           2x2x2       3       -214.96000000
    2           4x4x4      10       -215.50000000     -5.400e-1
    3           6x6x6       -       -215.50050000     -5.000e-4

    converged at k-point grid 6 6 6 with E = -215.50050000 eV
    ");
    Ok(())
}

#[test]
fn summary_unconverged() -> anyhow::Result<()> {
    let outcome = Outcome::ExceededIterations { history: history() };
    let mut got = Vec::new();
    write_summary(&mut got, &outcome)?;
    let got = String::from_utf8(got)?;
    assert!(got.ends_with("failed to converge after 3 iterations\n"));
    Ok(())
}

#[test]
fn json() -> anyhow::Result<()> {
    let outcome = Outcome::ExceededIterations {
        history: history()[..2].to_vec(),
    };
    let report = Report::new(&outcome, 1e-3);
    assert!(!report.converged);
    assert_eq!(report.grid, Some(Grid::new(4, 4, 4)));
    let got = serde_json::to_string_pretty(&report)?;
    insta::assert_snapshot!(got, @r#"
    {
      "converged": false,
      "grid": [
        4,
        4,
        4
      ],
      "tolerance": 0.001,
      "samples": [
        {
          "grid": [
            2,
            2,
            2
          ],
          "energy": -214.96,
          "kpoints": 3
        },
        {
          "grid": [
            4,
            4,
            4
          ],
          "energy": -215.5,
          "kpoints": 10
        }
      ]
    }
    "#);
    Ok(())
}

#[test]
fn failed() -> anyhow::Result<()> {
    let outcome = Outcome::Failed {
        grid: Grid::new(6, 6, 6),
        source: IterationError::Queue(QueueError::Timeout {
            job_id: "1234".to_owned(),
            waited: Duration::from_secs(60),
        }),
        history: history()[..2].to_vec(),
    };
    let mut got = Vec::new();
    write_summary(&mut got, &outcome)?;
    let got = String::from_utf8(got)?;
    assert!(got.contains("-215.50000000"));
    assert!(got.ends_with(
        "iteration on k-point grid 6 6 6 failed: \
         job 1234 still queued after 60.0 s\n"
    ));

    let report = Report::new(&outcome, 1e-3);
    assert!(!report.converged);
    assert_eq!(report.grid, Some(Grid::new(4, 4, 4)));
    assert_eq!(report.samples.len(), 2);
    let json: serde_json::Value =
        serde_json::from_str(&serde_json::to_string(&report)?)?;
    assert_eq!(json["converged"], false);
    assert!(json["error"].as_str().is_some_and(|e| e.contains("6 6 6")));
    Ok(())
}
