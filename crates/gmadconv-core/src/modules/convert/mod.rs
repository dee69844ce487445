//! Beamline to GMAD conversion driver.

use crate::common::constants::{DEFAULT_COLLIMATOR_LOG, DEFAULT_NGENERATE};
use crate::domain::{Beamline, ConversionResult, LatticeError, PropertyValue};
use crate::modules::LatticeBuilder;
use crate::modules::collimator::{CollimatorLogEntry, append_collimator_log};
use crate::modules::gmad::{Beam, Machine, SamplerSelection};
use crate::modules::mapper::{MapOutcome, MapperConfig, UnrecognizedElement, map_element};
use crate::modules::saveline::load_saveline;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    pub mapper: MapperConfig,
    pub samplers: SamplerSelection,
    /// `None` writes no beam definition.
    pub beam: Option<Beam>,
    pub n_generate: Option<usize>,
    pub start_name: Option<String>,
    pub end_name: Option<String>,
    /// Saveline `LINE` to expand; the last one in the file when unset.
    pub line_name: Option<String>,
    /// File name of the collimator log, placed beside the written lattice.
    pub collimator_log_name: String,
    pub verbose: bool,
    pub strict: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            mapper: MapperConfig::default(),
            samplers: SamplerSelection::All,
            beam: Some(Beam::ilc_default()),
            n_generate: Some(DEFAULT_NGENERATE),
            start_name: None,
            end_name: None,
            line_name: None,
            collimator_log_name: DEFAULT_COLLIMATOR_LOG.to_string(),
            verbose: false,
            strict: false,
        }
    }
}

/// Per-element bookkeeping of one conversion run.
///
/// `placed + omitted.len() + unrecognized.len() == input_count` always holds.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConversionReport {
    pub beamline: String,
    pub input_count: usize,
    pub placed: usize,
    pub omitted: Vec<String>,
    pub collimator_log: Vec<CollimatorLogEntry>,
    pub unrecognized: Vec<UnrecognizedElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub machine: Machine,
    pub report: ConversionReport,
}

impl Conversion {
    pub fn omitted(&self) -> &[String] {
        &self.report.omitted
    }

    pub fn collimator_log(&self) -> &[CollimatorLogEntry] {
        &self.report.collimator_log
    }

    pub fn unrecognized(&self) -> &[UnrecognizedElement] {
        &self.report.unrecognized
    }

    pub fn write_lattice(&self, path: &Path) -> ConversionResult<()> {
        self.machine.write_lattice(path)
    }
}

pub fn convert_beamline(
    beamline: &Beamline,
    options: &ConversionOptions,
) -> ConversionResult<Conversion> {
    let mut machine = Machine::new(beamline.name.clone());
    let report = convert_into(beamline, options, &mut machine)?;
    Ok(Conversion { machine, report })
}

pub fn convert_into<B: LatticeBuilder>(
    beamline: &Beamline,
    options: &ConversionOptions,
    builder: &mut B,
) -> ConversionResult<ConversionReport> {
    let selected =
        beamline.slice_between(options.start_name.as_deref(), options.end_name.as_deref())?;
    tracing::info!(
        beamline = %selected.name,
        elements = selected.len(),
        "converting beamline"
    );

    let mut report = ConversionReport {
        beamline: selected.name.clone(),
        input_count: selected.len(),
        ..ConversionReport::default()
    };

    for record in selected.iter() {
        let mapped = map_element(record, &options.mapper)?;

        if let Some(entry) = mapped.collimator_log {
            report.collimator_log.push(entry);
        }

        match mapped.outcome {
            MapOutcome::Component(component) => {
                if let Some(substitution) = mapped.substitution {
                    log_decision(options.verbose, &record.name, substitution);
                }
                builder.add_component(component);
                report.placed += 1;
            }
            MapOutcome::Omitted => {
                log_decision(options.verbose, &record.name, "omitted (zero length)");
                report.omitted.push(record.name.clone());
            }
            MapOutcome::Unrecognized(diagnostic) => {
                if options.strict {
                    return Err(LatticeError::input_validation(
                        "INPUT.UNRECOGNIZED_ELEMENT",
                        format!(
                            "element '{}' has unsupported type '{}' (line {})",
                            diagnostic.name, diagnostic.tag, diagnostic.source_line
                        ),
                    ));
                }
                tracing::warn!(
                    element = %diagnostic.name,
                    tag = %diagnostic.tag,
                    "element type not recognised; element dropped"
                );
                report.unrecognized.push(diagnostic);
            }
        }
    }

    builder.add_sampler(options.samplers.clone());
    if let Some(beam) = &options.beam {
        builder.add_beam(beam.clone());
    }
    if let Some(n_generate) = options.n_generate {
        builder.set_option("ngenerate", PropertyValue::Number(n_generate as f64));
    }

    tracing::info!(
        placed = report.placed,
        omitted = report.omitted.len(),
        unrecognized = report.unrecognized.len(),
        collimators_logged = report.collimator_log.len(),
        "conversion finished"
    );
    Ok(report)
}

/// Loads a saveline, converts it, writes the lattice and appends the
/// collimator log next to it.
pub fn convert_saveline_file(
    input: &Path,
    output: &Path,
    options: &ConversionOptions,
) -> ConversionResult<Conversion> {
    let saveline = load_saveline(input)?;
    let beamline = saveline.beamline(options.line_name.as_deref())?;
    let conversion = convert_beamline(&beamline, options)?;

    conversion.write_lattice(output)?;
    let log_path = output
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(&options.collimator_log_name);
    append_collimator_log(&log_path, conversion.collimator_log())?;

    Ok(conversion)
}

pub(crate) fn log_decision(verbose: bool, element: &str, decision: &str) {
    if verbose {
        tracing::info!(element, decision, "element substituted");
    } else {
        tracing::debug!(element, decision, "element substituted");
    }
}
