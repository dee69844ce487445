use super::CliError;
use super::helpers::{
    FlipMode, MapperFlags, default_lattice_output, mapper_config, parse_sampler_selection,
    write_json_report,
};
use gmadconv_core::domain::LatticeError;
use gmadconv_core::modules::comparator::{
    ComparisonThreshold, DistributionComparison, PhaseSpace, compare_candidate_optics,
    compare_distributions, compare_optics, render_optics_summary,
};
use gmadconv_core::modules::convert::{ConversionOptions, convert_saveline_file};
use gmadconv_core::modules::harness::{
    HarnessConfig, LatticeTest, ShellRunner, render_harness_summary,
};
use gmadconv_core::modules::serialization::write_text_artifact;
use gmadconv_core::modules::tfs::load_table;
use gmadconv_core::modules::tfs2gmad::{RowSelector, TfsConversionOptions, convert_tfs_file};
use serde::Serialize;
use std::path::PathBuf;

#[derive(clap::Args)]
pub(super) struct ConvertArgs {
    /// MAD8 saveline file
    input: PathBuf,

    /// GMAD output path (defaults to the input with a .gmad extension)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// LINE to expand (defaults to the last LINE in the file)
    #[arg(long)]
    line: Option<String>,

    /// First element to convert
    #[arg(long)]
    start: Option<String>,

    /// Last element to convert
    #[arg(long)]
    end: Option<String>,

    /// Sampler placement: all, none, or comma-separated element names
    #[arg(long, default_value = "all")]
    samplers: String,

    /// Number of primaries written to the lattice options
    #[arg(long, default_value_t = 1000)]
    ngenerate: usize,

    /// Do not write a beam definition
    #[arg(long)]
    no_beam: bool,

    /// Collimator log file name, written beside the output
    #[arg(long, default_value = "collimators.dat")]
    collimator_log: String,

    /// Fail on element types without a GMAD mapping
    #[arg(long)]
    strict: bool,

    /// JSON conversion report path
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    mapper: MapperFlags,
}

#[derive(clap::Args)]
pub(super) struct ConvertTfsArgs {
    /// MAD-X twiss table (TFS)
    input: PathBuf,

    /// GMAD output path (defaults to the input with a .gmad extension)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// First row to convert, by index or element name
    #[arg(long)]
    start: Option<String>,

    /// Row after the last one converted, by index or element name
    #[arg(long)]
    stop: Option<String>,

    /// Row step; negative values walk the table backwards
    #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
    step: isize,

    /// Sampler placement: all, none, or comma-separated element names
    #[arg(long, default_value = "all")]
    samplers: String,

    /// Number of primaries written to the lattice options
    #[arg(long, default_value_t = 1000)]
    ngenerate: usize,

    /// Do not write a beam definition
    #[arg(long)]
    no_beam: bool,

    /// Magnet polarity
    #[arg(long, value_enum, default_value_t = FlipMode::Auto)]
    flip: FlipMode,

    /// Zero sextupole and octupole strengths and drop thin multipoles
    #[arg(long)]
    linear: bool,

    /// Place multipoles as markers or drifts
    #[arg(long)]
    no_thin_multipoles: bool,

    /// Use the APER_1 column as the circular aperture
    #[arg(long)]
    madx_aperture: bool,

    /// JSON conversion report path
    #[arg(long)]
    report: Option<PathBuf>,

    #[command(flatten)]
    mapper: MapperFlags,
}

#[derive(clap::Args)]
pub(super) struct CompareOpticsArgs {
    /// Reference optics table (MAD-X TFS)
    reference: PathBuf,

    /// Candidate optics table (BDSIM optics output)
    candidate: PathBuf,

    /// Treat the reference as a second BDSIM optics table
    #[arg(long)]
    candidate_reference: bool,

    /// Largest accepted mean fractional deviation
    #[arg(long, default_value_t = 0.05)]
    threshold: f64,

    /// JSON comparison report path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct CompareTracksArgs {
    /// Reference tracking table (PTC trackone); its last segment is used
    reference: PathBuf,

    /// Candidate tracking table (BDSIM ascii output)
    candidate: PathBuf,

    /// Title used in the standard deviation table
    #[arg(long, default_value = "tracks")]
    stem: String,

    /// Write the standard deviation table to this path
    #[arg(long)]
    stdev: Option<PathBuf>,

    /// JSON comparison report path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct TestArgs {
    /// MAD-X lattice (.madx)
    lattice: PathBuf,

    /// Particles tracked by both codes
    #[arg(long, default_value_t = 1000)]
    particles: usize,

    /// Runs attempted before particle counts must agree
    #[arg(long, default_value_t = 5)]
    max_attempts: usize,

    /// MAD-X executable
    #[arg(long, default_value = "madx")]
    madx: String,

    /// BDSIM executable
    #[arg(long, default_value = "bdsim")]
    bdsim: String,

    /// Largest accepted mean fractional optics deviation
    #[arg(long, default_value_t = 0.05)]
    threshold: f64,

    /// Skip the optics comparison
    #[arg(long)]
    no_optics: bool,

    /// Magnet polarity of the converted twiss table
    #[arg(long, value_enum, default_value_t = FlipMode::Auto)]
    flip: FlipMode,

    #[command(flatten)]
    mapper: MapperFlags,
}

#[derive(clap::Args)]
pub(super) struct CleanArgs {
    /// MAD-X lattice (.madx) whose folder is cleaned
    lattice: PathBuf,
}

#[derive(Serialize)]
struct TracksReport<'a> {
    reference: String,
    candidate: String,
    comparison: &'a DistributionComparison,
}

fn threshold(value: f64) -> Result<ComparisonThreshold, CliError> {
    if !value.is_finite() || value < 0.0 {
        return Err(CliError::Usage(format!(
            "invalid threshold '{}'; expected a non-negative number",
            value
        )));
    }
    Ok(ComparisonThreshold {
        max_fractional_deviation: value,
    })
}

pub(super) fn run_convert_command(args: ConvertArgs, verbose: bool) -> Result<i32, CliError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_lattice_output(&args.input));
    let options = ConversionOptions {
        mapper: mapper_config(&args.mapper)?,
        samplers: parse_sampler_selection(&args.samplers),
        beam: if args.no_beam {
            None
        } else {
            ConversionOptions::default().beam
        },
        n_generate: Some(args.ngenerate),
        start_name: args.start,
        end_name: args.end,
        line_name: args.line,
        collimator_log_name: args.collimator_log,
        verbose,
        strict: args.strict,
    };

    let conversion = convert_saveline_file(&args.input, &output, &options)?;
    let report = &conversion.report;
    println!(
        "Converted {} elements from '{}': placed {}, omitted {}, unrecognized {}",
        report.input_count,
        report.beamline,
        report.placed,
        report.omitted.len(),
        report.unrecognized.len()
    );
    if !report.collimator_log.is_empty() {
        println!(
            "{} collimator(s) need review; see {}",
            report.collimator_log.len(),
            options.collimator_log_name
        );
    }
    println!("GMAD lattice: {}", output.display());

    if let Some(path) = &args.report {
        write_json_report(path, report)?;
        println!("JSON report: {}", path.display());
    }
    Ok(0)
}

pub(super) fn run_convert_tfs_command(args: ConvertTfsArgs, verbose: bool) -> Result<i32, CliError> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_lattice_output(&args.input));
    let options = TfsConversionOptions {
        mapper: mapper_config(&args.mapper)?,
        start: args.start.as_deref().map(RowSelector::parse),
        stop: args.stop.as_deref().map(RowSelector::parse),
        step: args.step,
        samplers: parse_sampler_selection(&args.samplers),
        beam: !args.no_beam,
        n_generate: Some(args.ngenerate),
        flip_magnets: args.flip.flip_magnets(),
        thin_multipoles: !args.no_thin_multipoles,
        linear: args.linear,
        use_madx_aperture: args.madx_aperture,
        verbose,
    };

    let conversion = convert_tfs_file(&args.input, &output, &options)?;
    let report = &conversion.report;
    println!(
        "Converted {} rows from '{}': placed {}, omitted {}",
        report.input_count,
        report.beamline,
        report.placed,
        report.omitted.len()
    );
    println!("GMAD lattice: {}", output.display());

    if let Some(path) = &args.report {
        write_json_report(path, report)?;
        println!("JSON report: {}", path.display());
    }
    Ok(0)
}

pub(super) fn run_compare_optics_command(args: CompareOpticsArgs) -> Result<i32, CliError> {
    let threshold = threshold(args.threshold)?;
    let reference = load_table(&args.reference).map_err(LatticeError::from)?;
    let candidate = load_table(&args.candidate).map_err(LatticeError::from)?;

    let comparison = if args.candidate_reference {
        compare_candidate_optics(&reference, &candidate, threshold)
    } else {
        compare_optics(&reference, &candidate, threshold)
    };
    let comparison = comparison.map_err(LatticeError::from)?;

    println!("{}", render_optics_summary(&comparison));
    if let Some(path) = &args.report {
        write_json_report(path, &comparison)?;
        println!("JSON report: {}", path.display());
    }

    if comparison.passed() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_compare_tracks_command(args: CompareTracksArgs) -> Result<i32, CliError> {
    let reference = load_table(&args.reference)
        .map_err(LatticeError::from)?
        .last_segment();
    let candidate = load_table(&args.candidate).map_err(LatticeError::from)?;
    let reference = PhaseSpace::from_reference_table(&reference).map_err(LatticeError::from)?;
    let candidate = PhaseSpace::from_candidate_table(&candidate).map_err(LatticeError::from)?;

    let comparison = compare_distributions(&reference, &candidate)?;
    let table = comparison.render_stdev_table(&args.stem);
    print!("{}", table);

    if let Some(path) = &args.stdev {
        write_text_artifact(path, &table).map_err(|source| {
            LatticeError::io_system(
                "IO.CLI_WRITE",
                format!("failed to write '{}': {}", path.display(), source),
            )
        })?;
    }
    if let Some(path) = &args.report {
        let report = TracksReport {
            reference: args.reference.display().to_string(),
            candidate: args.candidate.display().to_string(),
            comparison: &comparison,
        };
        write_json_report(path, &report)?;
        println!("JSON report: {}", path.display());
    }
    Ok(0)
}

pub(super) fn run_test_command(args: TestArgs, verbose: bool) -> Result<i32, CliError> {
    let mut config = HarnessConfig::new(&args.lattice);
    config.particles = args.particles;
    config.max_attempts = args.max_attempts;
    config.madx_binary = args.madx;
    config.bdsim_binary = args.bdsim;
    config.threshold = threshold(args.threshold)?;
    config.compare_optics = !args.no_optics;
    config.conversion.mapper = mapper_config(&args.mapper)?;
    config.conversion.flip_magnets = args.flip.flip_magnets();
    config.conversion.verbose = verbose;

    let test = LatticeTest::new(config)?;
    let report = test.execute(&ShellRunner)?;
    println!("{}", render_harness_summary(&report));
    println!("JSON report: {}", test.report_path().display());

    if report.passed() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_clean_command(args: CleanArgs) -> Result<i32, CliError> {
    let test = LatticeTest::new(HarnessConfig::new(&args.lattice))?;
    let removed = test.clean()?;
    println!(
        "Removed {} generated file(s) from {}",
        removed.len(),
        test.folder().display()
    );
    Ok(0)
}
