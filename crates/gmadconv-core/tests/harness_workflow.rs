#![cfg(unix)]

use gmadconv_core::modules::collimator::CollimatorOverride;
use gmadconv_core::modules::harness::{HarnessConfig, LatticeTest, ShellRunner};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_MADX: &str = r#"#!/bin/sh
cat > /dev/null
cat > fodo.tfs <<'EOF'
@ NAME             %05s "TWISS"
@ SEQUENCE         %04s "FODO"
@ PARTICLE         %06s "PROTON"
@ ENERGY           %le  7000
@ EX               %le  1e-9
@ EY               %le  1e-9
* NAME KEYWORD S L K1L BETX BETY ALFX ALFY
$ %s %s %le %le %le %le %le %le %le
"START" "MARKER" 0.0 0.0 0.0 10.0 5.0 0.0 0.0
"D1" "DRIFT" 1.0 1.0 0.0 10.5 5.2 0.0 0.0
"QF" "QUADRUPOLE" 1.5 0.5 0.2 10.8 5.4 -0.05 0.05
"COL" "RCOLLIMATOR" 1.7 0.2 0.0 10.9 5.45 -0.08 0.08
"D2" "DRIFT" 2.7 1.0 0.0 11.0 5.5 -0.1 0.1
"END" "MARKER" 2.7 0.0 0.0 11.0 5.5 -0.1 0.1
EOF
cat > trackone <<'EOF'
@ NAME             %07s "TRACKONE"
* NUMBER TURN X PX Y PY T PT S E
$ %d %d %le %le %le %le %le %le %le %le
#segment 1 1 3 1 start
1 0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 1.0
2 0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 1.0
3 0 0.0 0.0 0.0 0.0 0.0 0.0 0.0 1.0
#segment 1 1 3 2 end
1 1 1.0e-3 1.0e-4 2.0e-3 2.0e-4 0.0 0.0 2.7 1.0
2 1 -1.0e-3 -1.0e-4 -2.0e-3 -2.0e-4 0.0 0.0 2.7 1.0
3 1 0.0 0.0 0.0 0.0 0.0 0.0 2.7 1.0
EOF
echo "MAD-X finished"
"#;

const FAKE_BDSIM: &str = r#"#!/bin/sh
for arg in "$@"; do
  case "$arg" in
    --file=*) test -f "${arg#--file=}" || exit 2 ;;
  esac
done
cat > FODO.txt <<'EOF'
# x[m] xp[rad] y[m] yp[rad]
1.1e-3 1.0e-4 2.0e-3 2.0e-4
-1.1e-3 -1.0e-4 -2.0e-3 -2.0e-4
0.0 0.0 0.0 0.0
EOF
cat > FODO_optics.dat <<'EOF'
S[m] Beta_x[m] Beta_y[m] Alpha_x Alpha_y
0.0 10.0 5.0 0.0 0.0
2.7 11.2 5.5 -0.1 0.1
EOF
echo "BDSIM finished"
"#;

fn install_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("script should be written");
    let mut permissions = fs::metadata(&path)
        .expect("script metadata should be readable")
        .permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("script should be executable");
    path
}

#[test]
fn shell_runner_drives_a_full_lattice_test() {
    let tools = TempDir::new().expect("tools dir should be created");
    let work = TempDir::new().expect("work dir should be created");
    let madx = install_script(tools.path(), "madx", FAKE_MADX);
    let bdsim = install_script(tools.path(), "bdsim", FAKE_BDSIM);

    let lattice = work.path().join("FODO.madx");
    fs::write(&lattice, "beam; use, sequence=fodo; twiss; stop;\n").expect("lattice");
    fs::write(work.path().join("stale.png"), "old").expect("stale output");

    let mut config = HarnessConfig::new(&lattice);
    config.particles = 3;
    config.madx_binary = madx.display().to_string();
    config.bdsim_binary = bdsim.display().to_string();
    config.conversion.mapper.collimator_overrides.insert(
        "COL".to_string(),
        CollimatorOverride {
            xsize: Some(0.004),
            ..CollimatorOverride::default()
        },
    );

    let report = LatticeTest::new(config)
        .expect("lattice should be accepted")
        .execute(&ShellRunner)
        .expect("harness should succeed");

    assert_eq!(report.attempts, 1);
    assert_eq!(report.particles, 3);
    assert_eq!(report.conversion.placed, 4);
    assert_eq!(report.conversion.omitted, ["START", "END"]);
    assert!(!work.path().join("stale.png").exists());
    assert!(work.path().join("FODO.madx").exists());

    let madx_log = fs::read_to_string(work.path().join("madx.log")).expect("madx log");
    assert_eq!(madx_log, "MAD-X finished\n");
    let gmad = fs::read_to_string(work.path().join("FODO.gmad")).expect("gmad lattice");
    assert!(gmad.contains("option, ngenerate=3;"));
    assert!(gmad.contains("QF: quadrupole, l=0.5*m, k1=0.4;"));
    assert!(gmad.contains("COL: rcol, l=0.2*m, xsize=0.004*m"));
    assert!(gmad.contains("particle=\"proton\""));

    let optics = report.optics.as_ref().expect("optics should be compared");
    let beta_x = optics.function("beta_x").expect("beta_x compared");
    assert_eq!(beta_x.points, 2);
    assert!(beta_x.passed);
    assert_eq!(optics.functions.len(), 4);

    let stdev = fs::read_to_string(work.path().join("FODO_stdev.txt")).expect("stdev table");
    let rows: Vec<&str> = stdev.lines().collect();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].split('\t').count(), 12);

    let json = fs::read_to_string(work.path().join("FODO_report.json")).expect("json report");
    let parsed: serde_json::Value = serde_json::from_str(&json).expect("report should be json");
    assert_eq!(parsed["stem"], "FODO");
    assert_eq!(parsed["distribution"]["particles"], 3);
}
