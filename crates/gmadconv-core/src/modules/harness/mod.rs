//! Runs MAD-X and BDSIM on one lattice and compares their output.
//!
//! A [`LatticeTest`] owns the folder of a `.madx` lattice. Each attempt
//! cleans generated files, runs MAD-X (which writes a twiss table and PTC
//! tracks), converts the twiss table to GMAD, runs BDSIM and compares the
//! final particle distributions. Attempts repeat while the two codes
//! report different particle counts.

mod clean;
mod runner;

pub use clean::{GENERATED_FILE_PATTERNS, clean_generated_files, generated_file_set};
pub use runner::{CommandOutcome, CommandSpec, ShellRunner};

use crate::common::constants::{DEFAULT_HARNESS_PARTICLES, MAX_HARNESS_ATTEMPTS};
use crate::domain::{LatticeError, LatticeResult};
use crate::modules::SimulationRunner;
use crate::modules::comparator::{
    ComparisonThreshold, DistributionComparison, OpticsComparison, PhaseSpace,
    compare_distributions, compare_optics, render_optics_summary,
};
use crate::modules::convert::ConversionReport;
use crate::modules::serialization::{format_scientific_f64, write_text_artifact};
use crate::modules::tfs::load_table;
use crate::modules::tfs2gmad::{TfsConversionOptions, convert_tfs_file};
use serde::Serialize;
use std::path::{Path, PathBuf};

const MADX_LOG: &str = "madx.log";
const BDSIM_LOG: &str = "bdsim.log";
const REFERENCE_TRACKS: &str = "trackone";

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessConfig {
    pub lattice_path: PathBuf,
    pub particles: usize,
    pub max_attempts: usize,
    pub madx_binary: String,
    pub bdsim_binary: String,
    /// `n_generate` is replaced by `particles` for every run. Magnets are
    /// flipped for electron beams unless `flip_magnets` is set.
    pub conversion: TfsConversionOptions,
    pub threshold: ComparisonThreshold,
    pub compare_optics: bool,
}

impl HarnessConfig {
    pub fn new(lattice_path: impl Into<PathBuf>) -> Self {
        Self {
            lattice_path: lattice_path.into(),
            particles: DEFAULT_HARNESS_PARTICLES,
            max_attempts: MAX_HARNESS_ATTEMPTS,
            madx_binary: "madx".to_string(),
            bdsim_binary: "bdsim".to_string(),
            conversion: TfsConversionOptions::default(),
            threshold: ComparisonThreshold::default(),
            compare_optics: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarnessReport {
    pub lattice: String,
    pub stem: String,
    pub attempts: usize,
    pub particles: usize,
    pub conversion: ConversionReport,
    pub distribution: DistributionComparison,
    pub optics: Option<OpticsComparison>,
}

impl HarnessReport {
    pub fn passed(&self) -> bool {
        self.optics
            .as_ref()
            .is_none_or(OpticsComparison::passed)
    }
}

#[derive(Debug, Clone)]
pub struct LatticeTest {
    config: HarnessConfig,
    folder: PathBuf,
    stem: String,
}

impl LatticeTest {
    pub fn new(config: HarnessConfig) -> LatticeResult<Self> {
        let path = &config.lattice_path;
        let is_madx = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("madx"));
        if !is_madx {
            return Err(LatticeError::input_validation(
                "INPUT.HARNESS_LATTICE_EXTENSION",
                format!("lattice '{}' is not a .madx file", path.display()),
            ));
        }
        if config.max_attempts == 0 || config.particles == 0 {
            return Err(LatticeError::input_validation(
                "INPUT.HARNESS_CONFIG",
                "particles and max_attempts must both be at least 1",
            ));
        }

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let folder = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Self {
            config,
            folder,
            stem,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    fn artifact(&self, name: impl AsRef<Path>) -> PathBuf {
        self.folder.join(name)
    }

    pub fn gmad_path(&self) -> PathBuf {
        self.artifact(format!("{}.gmad", self.stem))
    }

    pub fn reference_tracks_path(&self) -> PathBuf {
        self.artifact(REFERENCE_TRACKS)
    }

    pub fn candidate_tracks_path(&self) -> PathBuf {
        self.artifact(format!("{}.txt", self.stem))
    }

    /// MAD-X writes its twiss table under the lower-cased lattice name.
    pub fn reference_optics_path(&self) -> PathBuf {
        self.artifact(format!("{}.tfs", self.stem.to_lowercase()))
    }

    pub fn candidate_optics_path(&self) -> PathBuf {
        self.artifact(format!("{}_optics.dat", self.stem))
    }

    pub fn stdev_path(&self) -> PathBuf {
        self.artifact(format!("{}_stdev.txt", self.stem))
    }

    pub fn report_path(&self) -> PathBuf {
        self.artifact(format!("{}_report.json", self.stem))
    }

    pub fn clean(&self) -> LatticeResult<Vec<PathBuf>> {
        let removed = clean_generated_files(&self.folder)?;
        tracing::debug!(
            folder = %self.folder.display(),
            removed = removed.len(),
            "cleaned generated files"
        );
        Ok(removed)
    }

    /// One MAD-X run, twiss conversion and BDSIM run.
    pub fn run<R: SimulationRunner + ?Sized>(&self, runner: &R) -> LatticeResult<ConversionReport> {
        let madx = CommandSpec::new(&self.config.madx_binary)
            .current_dir(&self.folder)
            .stdin_from(&self.config.lattice_path)
            .stdout_to(self.artifact(MADX_LOG));
        tracing::info!(lattice = %self.stem, "running MAD-X");
        self.run_step(runner, &madx)?;

        let options = TfsConversionOptions {
            n_generate: Some(self.config.particles),
            ..self.config.conversion.clone()
        };
        let conversion =
            convert_tfs_file(&self.reference_optics_path(), &self.gmad_path(), &options)?;

        let bdsim = CommandSpec::new(&self.config.bdsim_binary)
            .current_dir(&self.folder)
            .arg(format!("--file={}.gmad", self.stem))
            .arg(format!("--ngenerate={}", self.config.particles))
            .arg("--batch")
            .arg("--output=ascii")
            .arg(format!("--outfile={}", self.stem))
            .stdout_to(self.artifact(BDSIM_LOG));
        tracing::info!(lattice = %self.stem, particles = self.config.particles, "running BDSIM");
        self.run_step(runner, &bdsim)?;

        Ok(conversion.report)
    }

    fn run_step<R: SimulationRunner + ?Sized>(
        &self,
        runner: &R,
        command: &CommandSpec,
    ) -> LatticeResult<()> {
        let outcome = runner.run(command)?;
        if !outcome.success() {
            // Missing outputs surface when the tables are loaded.
            tracing::warn!(
                command = %command.display_line(),
                status = %outcome.status_text(),
                "external process did not exit cleanly"
            );
        }
        Ok(())
    }

    /// Cleans, runs and compares until both codes agree on the particle
    /// count, giving up after `max_attempts`.
    pub fn execute<R: SimulationRunner + ?Sized>(&self, runner: &R) -> LatticeResult<HarnessReport> {
        let max_attempts = self.config.max_attempts;
        let mut last_counts = (0, 0);

        for attempt in 1..=max_attempts {
            self.clean()?;
            let conversion = self.run(runner)?;
            let (reference, candidate) = self.load_tracks()?;

            if reference.len() == candidate.len() {
                let distribution = compare_distributions(&reference, &candidate)?;
                return self.finish(attempt, conversion, distribution);
            }

            tracing::warn!(
                attempt,
                max_attempts,
                reference = reference.len(),
                candidate = candidate.len(),
                "particle counts differ; rerunning"
            );
            last_counts = (reference.len(), candidate.len());
        }

        Err(LatticeError::computation(
            "RUN.HARNESS_PARTICLE_COUNT",
            format!(
                "particle counts still differ after {} attempts (reference {}, candidate {})",
                max_attempts, last_counts.0, last_counts.1
            ),
        ))
    }

    fn load_tracks(&self) -> LatticeResult<(PhaseSpace, PhaseSpace)> {
        let reference = load_table(self.reference_tracks_path())?.last_segment();
        let candidate = load_table(self.candidate_tracks_path())?;
        Ok((
            PhaseSpace::from_reference_table(&reference)?,
            PhaseSpace::from_candidate_table(&candidate)?,
        ))
    }

    fn finish(
        &self,
        attempts: usize,
        conversion: ConversionReport,
        distribution: DistributionComparison,
    ) -> LatticeResult<HarnessReport> {
        write_artifact(
            &self.stdev_path(),
            &distribution.render_stdev_table(&self.stem),
        )?;

        let optics = if self.config.compare_optics {
            self.compare_optics_files()?
        } else {
            None
        };

        let report = HarnessReport {
            lattice: self.config.lattice_path.display().to_string(),
            stem: self.stem.clone(),
            attempts,
            particles: distribution.particles,
            conversion,
            distribution,
            optics,
        };

        let json = serde_json::to_string_pretty(&report).map_err(|source| {
            LatticeError::internal(
                "INTERNAL.HARNESS_REPORT",
                format!("failed to serialize harness report: {}", source),
            )
        })?;
        write_artifact(&self.report_path(), &json)?;

        tracing::info!(
            lattice = %self.stem,
            attempts,
            particles = report.particles,
            passed = report.passed(),
            "lattice test finished"
        );
        Ok(report)
    }

    fn compare_optics_files(&self) -> LatticeResult<Option<OpticsComparison>> {
        let reference_path = self.reference_optics_path();
        let candidate_path = self.candidate_optics_path();
        if !reference_path.is_file() || !candidate_path.is_file() {
            tracing::debug!(lattice = %self.stem, "optics output missing; optics not compared");
            return Ok(None);
        }

        let reference = load_table(&reference_path)?;
        let candidate = load_table(&candidate_path)?;
        Ok(Some(compare_optics(
            &reference,
            &candidate,
            self.config.threshold,
        )?))
    }
}

fn write_artifact(path: &Path, content: &str) -> LatticeResult<()> {
    write_text_artifact(path, content).map_err(|source| {
        LatticeError::io_system(
            "IO.HARNESS_WRITE",
            format!("failed to write '{}': {}", path.display(), source),
        )
    })
}

pub fn render_harness_summary(report: &HarnessReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed() { "PASS" } else { "FAIL" };
    lines.push(format!("Lattice test: {} ({})", report.stem, status));
    lines.push(format!(
        "Particles: {} after {} attempt(s); elements placed {}, omitted {}, unrecognized {}",
        report.particles,
        report.attempts,
        report.conversion.placed,
        report.conversion.omitted.len(),
        report.conversion.unrecognized.len()
    ));

    for entry in &report.distribution.coordinates {
        lines.push(format!(
            "  {}: std reference={} candidate={} fractional_error={} mean_residual={}",
            entry.coordinate.label(),
            format_scientific_f64(entry.reference_std, 4),
            format_scientific_f64(entry.candidate_std, 4),
            format_scientific_f64(entry.fractional_std_error, 4),
            format_scientific_f64(entry.residual.mean, 4)
        ));
    }

    match &report.optics {
        Some(optics) => lines.push(render_optics_summary(optics)),
        None => lines.push("Optics: not compared".to_string()),
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{CommandOutcome, CommandSpec, HarnessConfig, LatticeTest, render_harness_summary};
    use crate::domain::{LatticeErrorCategory, LatticeResult};
    use crate::modules::SimulationRunner;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const TWISS: &str = "\
@ SEQUENCE %04s \"FODO\"
@ PARTICLE %08s \"ELECTRON\"
@ ENERGY %le 250
@ EX %le 2e-11
@ EY %le 1e-11
* NAME KEYWORD S L K1L BETX BETY
$ %s %s %le %le %le %le %le
\"START\" \"MARKER\" 0.0 0.0 0.0 10.0 5.0
\"D1\" \"DRIFT\" 1.0 1.0 0.0 11.0 5.5
\"QF\" \"QUADRUPOLE\" 1.5 0.5 0.2 11.5 5.8
\"D2\" \"DRIFT\" 2.5 1.0 0.0 12.0 6.0
\"END\" \"MARKER\" 2.5 0.0 0.0 12.0 6.0
";

    const CANDIDATE_OPTICS: &str = "\
S Beta_x Beta_y
0.0 10.0 5.0
2.5 12.0 6.0
";

    /// Writes canned outputs the way MAD-X and BDSIM would.
    struct FakeRunner {
        folder: PathBuf,
        stem: String,
        candidate_counts: RefCell<VecDeque<usize>>,
        commands: RefCell<Vec<CommandSpec>>,
    }

    impl FakeRunner {
        fn new(folder: &Path, stem: &str, candidate_counts: &[usize]) -> Self {
            Self {
                folder: folder.to_path_buf(),
                stem: stem.to_string(),
                candidate_counts: RefCell::new(candidate_counts.iter().copied().collect()),
                commands: RefCell::new(Vec::new()),
            }
        }

        fn write(&self, name: &str, content: &str) {
            fs::write(self.folder.join(name), content).expect("fake output should be written");
        }
    }

    impl SimulationRunner for FakeRunner {
        fn run(&self, command: &CommandSpec) -> LatticeResult<CommandOutcome> {
            self.commands.borrow_mut().push(command.clone());
            if let Some(stdout) = &command.stdout {
                fs::write(stdout, "ok\n").expect("log should be written");
            }

            match command.program.as_str() {
                "madx" => {
                    self.write(&format!("{}.tfs", self.stem.to_lowercase()), TWISS);
                    self.write(
                        "trackone",
                        "\
* NUMBER TURN X PX Y PY
$ %d %d %le %le %le %le
#segment 1 1 2 1 start
1 0 0.0 0.0 0.0 0.0
2 0 0.0 0.0 0.0 0.0
#segment 1 1 2 2 end
1 1 0.001 0.0001 0.002 0.0002
2 1 -0.001 -0.0001 -0.002 -0.0002
",
                    );
                }
                "bdsim" => {
                    let count = self.candidate_counts.borrow_mut().pop_front().unwrap_or(2);
                    let mut tracks = String::from("# x xp y yp\n");
                    for index in 0..count {
                        let sign = if index % 2 == 0 { 1.0 } else { -1.0 };
                        tracks.push_str(&format!(
                            "{} {} {} {}\n",
                            sign * 0.001,
                            sign * 0.0001,
                            sign * 0.002,
                            sign * 0.0002
                        ));
                    }
                    self.write(&format!("{}.txt", self.stem), &tracks);
                    self.write(&format!("{}_optics.dat", self.stem), CANDIDATE_OPTICS);
                }
                other => panic!("unexpected program {other}"),
            }
            Ok(CommandOutcome { exit_code: Some(0) })
        }
    }

    fn lattice_in(temp: &TempDir) -> PathBuf {
        let lattice = temp.path().join("FODO.madx");
        fs::write(&lattice, "call, file=\"fodo.seq\";\n").expect("lattice should be written");
        lattice
    }

    #[test]
    fn non_madx_lattices_are_rejected_up_front() {
        let error = LatticeTest::new(HarnessConfig::new("fodo.gmad"))
            .expect_err("wrong extension should fail");
        assert_eq!(error.code(), "INPUT.HARNESS_LATTICE_EXTENSION");
        assert_eq!(error.category(), LatticeErrorCategory::InputValidationError);
    }

    #[test]
    fn artifact_names_follow_the_lattice_stem() {
        let test = LatticeTest::new(HarnessConfig::new("lattices/FODO.madx")).expect("valid");
        assert_eq!(test.stem(), "FODO");
        assert_eq!(test.folder(), Path::new("lattices"));
        assert_eq!(test.reference_optics_path(), Path::new("lattices/fodo.tfs"));
        assert_eq!(test.candidate_optics_path(), Path::new("lattices/FODO_optics.dat"));
        assert_eq!(test.stdev_path(), Path::new("lattices/FODO_stdev.txt"));

        let bare = LatticeTest::new(HarnessConfig::new("FODO.madx")).expect("valid");
        assert_eq!(bare.folder(), Path::new("."));
    }

    #[test]
    fn execute_runs_both_codes_and_writes_reports() {
        let temp = TempDir::new().expect("tempdir should be created");
        let lattice = lattice_in(&temp);
        let runner = FakeRunner::new(temp.path(), "FODO", &[2]);
        let mut config = HarnessConfig::new(&lattice);
        config.particles = 2;

        let report = LatticeTest::new(config)
            .expect("valid lattice")
            .execute(&runner)
            .expect("harness should succeed");

        assert_eq!(report.attempts, 1);
        assert_eq!(report.particles, 2);
        assert_eq!(report.conversion.placed, 3);
        assert_eq!(report.conversion.omitted, ["START", "END"]);
        assert!(report.passed());
        let optics = report.optics.as_ref().expect("optics compared");
        assert_eq!(optics.functions.len(), 2);

        let commands = runner.commands.borrow();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].stdin.as_deref(), Some(lattice.as_path()));
        assert_eq!(
            commands[1].args,
            [
                "--file=FODO.gmad",
                "--ngenerate=2",
                "--batch",
                "--output=ascii",
                "--outfile=FODO"
            ]
        );

        let gmad = fs::read_to_string(temp.path().join("FODO.gmad")).expect("lattice written");
        assert!(gmad.contains("option, ngenerate=2;"));
        assert!(gmad.contains("QF: quadrupole, l=0.5*m, k1=-0.4;"));
        assert!(gmad.contains("particle=\"e-\""));
        let stdev = fs::read_to_string(temp.path().join("FODO_stdev.txt")).expect("stdev written");
        assert!(stdev.starts_with("FODO Standard Deviations (particles = 2): \n"));
        let json = fs::read_to_string(temp.path().join("FODO_report.json")).expect("report");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(parsed["attempts"], 1);

        let summary = render_harness_summary(&report);
        assert!(summary.starts_with("Lattice test: FODO (PASS)"));
        assert!(summary.contains("Optics status: PASS"));
    }

    #[test]
    fn particle_count_mismatches_are_retried() {
        let temp = TempDir::new().expect("tempdir should be created");
        let runner = FakeRunner::new(temp.path(), "FODO", &[1, 3, 2]);
        let mut config = HarnessConfig::new(lattice_in(&temp));
        config.particles = 2;
        config.compare_optics = false;

        let report = LatticeTest::new(config)
            .expect("valid lattice")
            .execute(&runner)
            .expect("third attempt should match");

        assert_eq!(report.attempts, 3);
        assert!(report.optics.is_none());
        assert_eq!(runner.commands.borrow().len(), 6);
    }

    #[test]
    fn exhausted_retries_are_a_computation_error() {
        let temp = TempDir::new().expect("tempdir should be created");
        let runner = FakeRunner::new(temp.path(), "FODO", &[1, 1, 1]);
        let mut config = HarnessConfig::new(lattice_in(&temp));
        config.max_attempts = 3;

        let error = LatticeTest::new(config)
            .expect("valid lattice")
            .execute(&runner)
            .expect_err("counts never match");

        assert_eq!(error.code(), "RUN.HARNESS_PARTICLE_COUNT");
        assert_eq!(error.exit_code(), 4);
        assert!(error.message().contains("after 3 attempts"));
        assert!(!temp.path().join("FODO_stdev.txt").exists());
    }

    #[test]
    fn missing_twiss_table_stops_the_run() {
        struct SilentRunner;

        impl SimulationRunner for SilentRunner {
            fn run(&self, _command: &CommandSpec) -> LatticeResult<CommandOutcome> {
                Ok(CommandOutcome { exit_code: Some(1) })
            }
        }

        let temp = TempDir::new().expect("tempdir should be created");
        let test = LatticeTest::new(HarnessConfig::new(lattice_in(&temp))).expect("valid");
        let error = test.run(&SilentRunner).expect_err("no twiss table was written");
        assert_eq!(error.code(), "IO.TABLE_READ");
    }
}
