use std::{fs::read_to_string, path::Path};

use assert_cmd::Command;
use tempfile::{TempDir, tempdir};

const CONFIG: &str = r#"
template = "si.scf.in"
command = "sh ../pw.sh"
queue = "local"
tolerance = 1e-3
start = [2, 2, 2]
step = [2, 2, 2]
sleep_int = 0
"#;

/// set up a scratch directory holding the template input, the fake pw.x, and
/// a kconv.toml ending with `extra`
fn setup(extra: &str) -> std::io::Result<TempDir> {
    let dir = tempdir()?;
    for file in ["testfiles/si.scf.in", "testfiles/pw.sh"] {
        let p = Path::new(file);
        let filename = p.file_name().unwrap();
        std::fs::copy(file, dir.path().join(filename))?;
    }
    std::fs::write(dir.path().join("kconv.toml"), format!("{CONFIG}{extra}"))?;
    Ok(dir)
}

fn kconv(dir: &TempDir, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = Command::cargo_bin("kconv").unwrap();
    cmd.args(args).current_dir(dir).assert()
}

#[test]
fn run() -> anyhow::Result<()> {
    let dir = setup("")?;
    let assert = kconv(&dir, &[]);
    let output = assert.get_output();
    assert!(
        output.status.success(),
        "stderr: {}\nlog: {}",
        String::from_utf8_lossy(&output.stderr),
        read_to_string(dir.path().join("kconv.log"))?,
    );

    let out = read_to_string(dir.path().join("kconv.out"))?;
    assert!(out.starts_with("PID: "));
    assert!(out.contains("Configuration Options:"));
    assert!(out.ends_with("normal termination of kconv\n"));
    let start = out.find("Iter").unwrap();
    let end = out.find("normal termination").unwrap();
    insta::assert_snapshot!(out[start..end].trim(), @r"
    Iter         Grid    Kpts         Energy (eV)       dE (eV)
    1           2x2x2       8       -214.97002944
    2           4x4x4      64       -215.51425736     -5.442e-1
    3           6x6x6     216       -215.57548301     -6.123e-2
    4           8x8x8     512       -215.57575512     -2.721e-4

    converged at k-point grid 8 8 8 with E = -215.57575512 eV
    ");

    for n in [2, 4, 6, 8] {
        let name = format!("kpoints_{n}x{n}x{n}");
        let input = read_to_string(dir.path().join(&name).join(format!("{name}.in")))?;
        assert!(input.contains(&format!("K_POINTS automatic\n{n} {n} {n} 0 0 0\n")));
        assert!(dir.path().join(&name).join(format!("{name}.out")).exists());
    }
    assert!(!dir.path().join("kpoints_10x10x10").exists());

    let report: serde_json::Value =
        serde_json::from_str(&read_to_string(dir.path().join("kconv.json"))?)?;
    assert_eq!(report["converged"], true);
    assert_eq!(report["grid"], serde_json::json!([8, 8, 8]));
    assert_eq!(report["samples"].as_array().map(Vec::len), Some(4));
    assert_eq!(report["samples"][3]["kpoints"], 512);
    Ok(())
}

#[test]
fn exceeded() -> anyhow::Result<()> {
    let dir = setup("max_iter = 3\n")?;
    kconv(&dir, &[]).success();
    let out = read_to_string(dir.path().join("kconv.out"))?;
    assert!(out.contains("failed to converge after 3 iterations"), "{out}");
    let report: serde_json::Value =
        serde_json::from_str(&read_to_string(dir.path().join("kconv.json"))?)?;
    assert_eq!(report["converged"], false);
    assert_eq!(report["grid"], serde_json::json!([6, 6, 6]));
    Ok(())
}

#[test]
fn failed_iteration() -> anyhow::Result<()> {
    let dir = setup("")?;
    // crash on every grid from 6x6x6 on, leaving an empty output
    std::fs::rename(dir.path().join("pw.sh"), dir.path().join("real.sh"))?;
    std::fs::write(
        dir.path().join("pw.sh"),
        r#"input=$(cat)
n=$(printf '%s\n' "$input" | awk 'found { print $1; exit } /K_POINTS/ { found = 1 }')
[ "$n" -lt 6 ] || exit 1
printf '%s\n' "$input" | sh ../real.sh
"#,
    )?;
    kconv(&dir, &[]).failure().code(1);

    let out = read_to_string(dir.path().join("kconv.out"))?;
    assert!(out.contains("4x4x4"), "{out}");
    assert!(
        out.contains("iteration on k-point grid 6 6 6 failed"),
        "{out}"
    );
    assert!(!out.contains("normal termination"));
    let log = read_to_string(dir.path().join("kconv.log"))?;
    assert!(log.contains("iteration on k-point grid 6 6 6 failed"), "{log}");

    let report: serde_json::Value =
        serde_json::from_str(&read_to_string(dir.path().join("kconv.json"))?)?;
    assert_eq!(report["converged"], false);
    assert_eq!(report["grid"], serde_json::json!([4, 4, 4]));
    assert_eq!(report["samples"].as_array().map(Vec::len), Some(2));
    assert!(
        report["error"]
            .as_str()
            .is_some_and(|e| e.contains("k-point grid 6 6 6")),
        "{report}"
    );
    Ok(())
}

#[test]
fn overwrite() -> anyhow::Result<()> {
    let dir = setup("")?;
    std::fs::write(dir.path().join("kconv.out"), "")?;
    kconv(&dir, &[]).failure().code(1);
    assert_eq!(read_to_string(dir.path().join("kconv.out"))?, "");
    kconv(&dir, &["-o"]).success();
    assert!(
        read_to_string(dir.path().join("kconv.out"))?
            .contains("normal termination of kconv")
    );
    Ok(())
}

#[test]
fn missing_template() -> anyhow::Result<()> {
    let dir = setup("")?;
    std::fs::remove_file(dir.path().join("si.scf.in"))?;
    kconv(&dir, &[]).failure().code(1);
    let log = read_to_string(dir.path().join("kconv.log"))?;
    assert!(log.contains("cannot open si.scf.in"), "{log}");
    assert!(!dir.path().join("kpoints_2x2x2").exists());
    Ok(())
}

#[test]
fn json() -> anyhow::Result<()> {
    let dir = setup("")?;
    let assert = kconv(&dir, &["-j"]).success();
    let got: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(got["queue"], "Local");
    assert_eq!(got["start"], serde_json::json!([2, 2, 2]));
    assert_eq!(got["max_iter"], 20);
    assert!(!dir.path().join("kconv.out").exists());
    Ok(())
}
