//! MAD-X twiss table to GMAD conversion.
//!
//! Every table row is one placed element, typed by its `KEYWORD` column.
//! Strength columns hold integrated values (`K1L`, `K2L`, ...) and are
//! divided by the row length `L`. When magnets are flipped, kicks and
//! non-dipole strengths change sign; bends never do.

use crate::common::constants::{
    DEFAULT_COLLIMATOR_MATERIAL, DEFAULT_NGENERATE, END_OF_LINE_MARKER, FALLBACK_EMITTANCE,
    MULTIPOLE_MAX_ORDER, UNSET_TWISS_EMITTANCE, ZERO_LENGTH_THRESHOLD,
};
use crate::domain::{ConversionResult, LatticeError, LatticeResult, PropertyValue};
use crate::modules::LatticeBuilder;
use crate::modules::convert::{Conversion, ConversionReport, log_decision};
use crate::modules::gmad::{
    Beam, CollimatorFields, Component, ComponentKind, DipoleFields, Machine, SamplerSelection,
};
use crate::modules::mapper::{MapperConfig, apply_element_overrides, per_metre};
use crate::modules::tfs::{Table, load_table};
use std::path::Path;

/// Columns whose non-zero value keeps a zero-length row in the lattice.
const PERTURBING_COLUMNS: [&str; 16] = [
    "ANGLE", "HKICK", "VKICK", "KSI", "K1L", "K2L", "K3L", "K4L", "K5L", "K6L", "K1SL", "K2SL",
    "K3SL", "K4SL", "K5SL", "K6SL",
];

/// First or last row of a conversion, by index or by element name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelector {
    Index(usize),
    Name(String),
}

impl RowSelector {
    /// Non-negative integers select by index; anything else by exact name.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(raw.trim().to_string()),
        }
    }

    fn resolve(&self, table: &Table) -> LatticeResult<usize> {
        match self {
            Self::Index(index) => Ok(*index),
            Self::Name(name) => table
                .text_column("NAME")
                .and_then(|names| names.iter().position(|candidate| candidate == name))
                .ok_or_else(|| {
                    LatticeError::input_validation(
                        "INPUT.RANGE_NAME",
                        format!("element '{}' not found in twiss table", name),
                    )
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TfsConversionOptions {
    pub mapper: MapperConfig,
    pub start: Option<RowSelector>,
    /// Exclusive.
    pub stop: Option<RowSelector>,
    /// `1` walks forward, negative values walk the table backwards.
    pub step: isize,
    pub samplers: SamplerSelection,
    /// Write a beam built from the table header and the first selected row.
    pub beam: bool,
    pub n_generate: Option<usize>,
    /// `None` flips when the table header names an electron beam.
    pub flip_magnets: Option<bool>,
    pub thin_multipoles: bool,
    /// Drops sextupole and octupole strengths and thin multipoles.
    pub linear: bool,
    /// Use `APER_1` as the circular aperture where it is positive.
    pub use_madx_aperture: bool,
    pub verbose: bool,
}

impl Default for TfsConversionOptions {
    fn default() -> Self {
        Self {
            mapper: MapperConfig::default(),
            start: None,
            stop: None,
            step: 1,
            samplers: SamplerSelection::All,
            beam: true,
            n_generate: Some(DEFAULT_NGENERATE),
            flip_magnets: None,
            thin_multipoles: true,
            linear: false,
            use_madx_aperture: false,
            verbose: false,
        }
    }
}

impl TfsConversionOptions {
    /// Resolves the polarity flip against the table's `PARTICLE` header.
    pub fn flips_magnets(&self, table: &Table) -> bool {
        self.flip_magnets.unwrap_or_else(|| {
            table
                .header_text("PARTICLE")
                .is_some_and(|particle| particle.eq_ignore_ascii_case("ELECTRON"))
        })
    }
}

/// Row indices selected by `start`, `stop` and `step`, with the bounds
/// clamped to the table.
pub fn selected_rows(
    table: &Table,
    start: Option<&RowSelector>,
    stop: Option<&RowSelector>,
    step: isize,
) -> LatticeResult<Vec<usize>> {
    if step == 0 {
        return Err(LatticeError::input_validation(
            "INPUT.RANGE_STEP",
            "row step must not be zero",
        ));
    }
    let len = table.len();
    let start = start.map(|selector| selector.resolve(table)).transpose()?;
    let stop = stop.map(|selector| selector.resolve(table)).transpose()?;

    if step > 0 {
        let first = start.unwrap_or(0).min(len);
        let last = stop.unwrap_or(len).min(len);
        return Ok((first..last).step_by(step.unsigned_abs()).collect());
    }

    if len == 0 {
        return Ok(Vec::new());
    }
    let first = start.unwrap_or(len - 1).min(len - 1);
    let rows = (0..=first)
        .rev()
        .step_by(step.unsigned_abs())
        .take_while(|row| stop.is_none_or(|stop| *row > stop))
        .collect();
    Ok(rows)
}

/// Element names usable in GMAD: anything outside `[A-Za-z0-9_]` becomes `_`.
pub fn gmad_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

pub fn convert_twiss_table(
    table: &Table,
    title: &str,
    options: &TfsConversionOptions,
) -> ConversionResult<Conversion> {
    let mut machine = Machine::new(table.header_text("SEQUENCE").unwrap_or(title));
    let mut report = convert_twiss_into(table, options, &mut machine)?;
    report.beamline = machine.title.clone();
    Ok(Conversion { machine, report })
}

pub fn convert_twiss_into<B: LatticeBuilder>(
    table: &Table,
    options: &TfsConversionOptions,
    builder: &mut B,
) -> ConversionResult<ConversionReport> {
    let names = table.text_column("NAME").ok_or_else(|| missing_text_column("NAME"))?;
    if table.text_column("KEYWORD").is_none() {
        return Err(missing_text_column("KEYWORD"));
    }
    let rows = selected_rows(
        table,
        options.start.as_ref(),
        options.stop.as_ref(),
        options.step,
    )?;
    let flip = options.flips_magnets(table);
    tracing::info!(rows = rows.len(), flip, "converting twiss table");

    let mut report = ConversionReport {
        input_count: rows.len(),
        ..ConversionReport::default()
    };
    let row_view = |index: usize| TwissRow {
        table,
        index,
        name: names[index].as_str(),
    };

    for &index in &rows {
        let row = row_view(index);
        let length = row.number("L");
        let zero_length = length < ZERO_LENGTH_THRESHOLD;

        if zero_length && options.mapper.skip_zero_length && !row.perturbs() {
            log_decision(options.verbose, row.name, "omitted (zero length)");
            report.omitted.push(row.name.to_string());
            continue;
        }

        let component = map_row(&row, length, flip, options)?;
        builder.add_component(component);
        report.placed += 1;
    }

    builder.add_component(Component::marker(END_OF_LINE_MARKER));
    builder.add_sampler(options.samplers.clone());
    if options.beam {
        let start = rows.first().copied().unwrap_or(0);
        builder.add_beam(beam_from_row(table, start)?);
    }
    if let Some(n_generate) = options.n_generate {
        builder.set_option("ngenerate", PropertyValue::Number(n_generate as f64));
    }

    tracing::info!(
        placed = report.placed,
        omitted = report.omitted.len(),
        "twiss conversion finished"
    );
    Ok(report)
}

/// Loads a twiss table, converts it and writes the lattice.
pub fn convert_tfs_file(
    input: &Path,
    output: &Path,
    options: &TfsConversionOptions,
) -> ConversionResult<Conversion> {
    let table = load_table(input)?;
    let title = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let conversion = convert_twiss_table(&table, &title, options)?;
    conversion.write_lattice(output)?;
    Ok(conversion)
}

/// Beam matched to the row before `start`, or to the first row.
///
/// The optics of a twiss row describe the exit of that element, so the
/// entrance of row `start` is the exit of row `start - 1`.
pub fn beam_from_twiss(table: &Table, start: Option<&RowSelector>) -> LatticeResult<Beam> {
    let start = start
        .map(|selector| selector.resolve(table))
        .transpose()?
        .unwrap_or(0);
    beam_from_row(table, start)
}

fn beam_from_row(table: &Table, start: usize) -> LatticeResult<Beam> {
    let index = start.saturating_sub(1);
    if index >= table.len() {
        return Err(LatticeError::input_validation(
            "INPUT.RANGE_NAME",
            format!("row {} is outside a twiss table of {} rows", index, table.len()),
        ));
    }
    let energy = required_header_number(table, "ENERGY")?;
    let particle = table
        .header_text("PARTICLE")
        .ok_or_else(|| missing_header("PARTICLE"))?;
    let particle = match particle.to_ascii_uppercase().as_str() {
        "ELECTRON" => "e-".to_string(),
        "POSITRON" => "e+".to_string(),
        "PROTON" => "proton".to_string(),
        _ => particle.to_ascii_lowercase(),
    };

    let row = |column: &str| table.number_at(column, index).unwrap_or(0.0);
    Ok(Beam {
        beta_x: row("BETX"),
        beta_y: row("BETY"),
        alpha_x: row("ALFX"),
        alpha_y: row("ALFY"),
        emittance_x: header_emittance(table, "EX")?,
        emittance_y: header_emittance(table, "EY")?,
        disp_x: row("DX"),
        disp_y: row("DY"),
        disp_xp: row("DPX"),
        disp_yp: row("DPY"),
        sigma_e: table.header_number("SIGE").unwrap_or(0.0),
        x0: row("X"),
        y0: row("Y"),
        xp0: row("PX"),
        yp0: row("PY"),
        ..Beam::new(particle, energy)
    })
}

fn header_emittance(table: &Table, name: &str) -> LatticeResult<f64> {
    let emittance = required_header_number(table, name)?;
    if emittance == UNSET_TWISS_EMITTANCE {
        tracing::warn!(
            header = name,
            fallback = FALLBACK_EMITTANCE,
            "twiss emittance left at its unset value"
        );
        return Ok(FALLBACK_EMITTANCE);
    }
    Ok(emittance)
}

fn required_header_number(table: &Table, name: &str) -> LatticeResult<f64> {
    table.header_number(name).ok_or_else(|| missing_header(name))
}

fn missing_header(name: &str) -> LatticeError {
    LatticeError::input_validation(
        "INPUT.TABLE_HEADER",
        format!("twiss table has no usable '{}' header", name),
    )
}

fn missing_text_column(name: &str) -> LatticeError {
    LatticeError::input_validation(
        "INPUT.TABLE_COLUMN",
        format!("twiss table has no text column '{}'", name),
    )
}

struct TwissRow<'a> {
    table: &'a Table,
    index: usize,
    name: &'a str,
}

impl TwissRow<'_> {
    /// Absent columns read as zero.
    fn number(&self, column: &str) -> f64 {
        self.table.number_at(column, self.index).unwrap_or(0.0)
    }

    fn keyword(&self) -> String {
        self.table
            .text_at("KEYWORD", self.index)
            .unwrap_or_default()
            .to_ascii_uppercase()
    }

    fn perturbs(&self) -> bool {
        PERTURBING_COLUMNS
            .iter()
            .any(|column| self.number(column) != 0.0)
    }

    fn per_metre(&self, column: &str, length: f64) -> LatticeResult<f64> {
        per_metre(self.name, column, self.number(column), length)
    }

    fn dipole_fields(&self, length: f64) -> LatticeResult<DipoleFields> {
        Ok(DipoleFields {
            angle: self.number("ANGLE"),
            k1: self.per_metre("K1L", length)?,
            e1: self.number("E1"),
            e2: self.number("E2"),
            fint: self.number("FINT"),
            fintx: self.number("FINTX"),
            hgap: self.number("HGAP"),
            tilt: self.number("TILT"),
        })
    }

    fn multipole_coefficients(&self, skew: bool, factor: f64) -> [f64; MULTIPOLE_MAX_ORDER] {
        let suffix = if skew { "SL" } else { "L" };
        std::array::from_fn(|order| self.number(&format!("K{}{}", order + 1, suffix)) * factor)
    }
}

fn map_row(
    row: &TwissRow<'_>,
    length: f64,
    flip: bool,
    options: &TfsConversionOptions,
) -> LatticeResult<Component> {
    let factor = if flip { -1.0 } else { 1.0 };
    let zero_length = length < ZERO_LENGTH_THRESHOLD;
    let name = gmad_name(row.name);
    let keyword = row.keyword();
    let thin_or_drift = |name: String| {
        if zero_length {
            Component::marker(name)
        } else {
            Component::drift(name, length)
        }
    };

    let mut component = match keyword.as_str() {
        "DRIFT" => Component::drift(name, length),
        "MARKER" => Component::marker(name),
        "INSTRUMENT" | "MONITOR" | "PLACEHOLDER" => thin_or_drift(name),
        "HKICKER" => Component::new(
            name,
            length,
            ComponentKind::HKicker {
                angle: row.number("HKICK") * factor,
            },
        ),
        "VKICKER" => Component::new(
            name,
            length,
            ComponentKind::VKicker {
                angle: row.number("VKICK") * factor,
            },
        ),
        "KICKER" | "TKICKER" => Component::new(
            name,
            length,
            ComponentKind::Kicker {
                hkick: row.number("HKICK") * factor,
                vkick: row.number("VKICK") * factor,
            },
        ),
        "QUADRUPOLE" => Component::new(
            name,
            length,
            ComponentKind::Quadrupole {
                k1: row.per_metre("K1L", length)? * factor,
            },
        ),
        "SEXTUPOLE" => {
            let k2 = if options.linear {
                0.0
            } else {
                row.per_metre("K2L", length)? * factor
            };
            let tilt = row.number("TILT");
            Component::new(name, length, ComponentKind::Sextupole { k2, tilt })
        }
        "OCTUPOLE" => {
            let k3 = if options.linear {
                0.0
            } else {
                row.per_metre("K3L", length)? * factor
            };
            let tilt = row.number("TILT");
            Component::new(name, length, ComponentKind::Octupole { k3, tilt })
        }
        "MULTIPOLE" if options.thin_multipoles && !options.linear => Component::new(
            name,
            length,
            ComponentKind::ThinMultipole {
                knl: row.multipole_coefficients(false, factor),
                ksl: row.multipole_coefficients(true, factor),
                tilt: row.number("TILT"),
            },
        ),
        "MULTIPOLE" => thin_or_drift(name),
        "SBEND" => Component::new(name, length, ComponentKind::SBend(row.dipole_fields(length)?)),
        "RBEND" => Component::new(
            name,
            length,
            ComponentKind::RBendDipole(row.dipole_fields(length)?),
        ),
        "RCOLLIMATOR" | "ECOLLIMATOR" => {
            map_collimator(row, &name, &keyword, length, &options.mapper)
        }
        "RFCAVITY" | "SOLENOID" => {
            log_decision(options.verbose, row.name, "converted to drift");
            Component::drift(name, length)
        }
        _ => {
            tracing::warn!(
                element = row.name,
                keyword = %keyword,
                "twiss keyword not recognised; placed as marker or drift"
            );
            thin_or_drift(name)
        }
    };

    let tilt = row.number("TILT");
    if tilt != 0.0 && !carries_tilt(&component.kind) {
        component.set_parameter("tilt", PropertyValue::Number(tilt));
    }
    if options.use_madx_aperture {
        let radius = row.number("APER_1");
        if radius > 0.0 {
            component.aperture = Some(radius);
        }
    }
    apply_element_overrides(&mut component, &options.mapper);
    if component.name != row.name {
        let key = row.name.to_string();
        let mut lookup = component.clone();
        lookup.name = key;
        apply_element_overrides(&mut lookup, &options.mapper);
        component.aperture = lookup.aperture;
        component.parameters = lookup.parameters;
    }
    Ok(component)
}

fn map_collimator(
    row: &TwissRow<'_>,
    name: &str,
    keyword: &str,
    length: f64,
    config: &MapperConfig,
) -> Component {
    let entry = config
        .collimator_overrides
        .get(row.name)
        .or_else(|| config.collimator_overrides.get(name));
    let Some(entry) = entry else {
        if !config.collimator_overrides.is_empty() {
            tracing::warn!(
                element = row.name,
                "collimator has no override entry; placed as drift"
            );
        }
        return Component::drift(name, length);
    };

    let radius = config.beam_pipe_radius;
    let fields = CollimatorFields {
        xsize: entry.xsize.unwrap_or(radius),
        ysize: entry.ysize.unwrap_or(radius),
        angle: entry.angle.unwrap_or_else(|| row.number("TILT")),
        material: entry
            .material
            .clone()
            .unwrap_or_else(|| DEFAULT_COLLIMATOR_MATERIAL.to_string()),
    };
    let kind = if keyword == "RCOLLIMATOR" {
        ComponentKind::RCollimator(fields)
    } else {
        ComponentKind::ECollimator(fields)
    };
    Component::new(name, length, kind)
}

fn carries_tilt(kind: &ComponentKind) -> bool {
    matches!(
        kind,
        ComponentKind::SBend(_)
            | ComponentKind::RBendDipole(_)
            | ComponentKind::Sextupole { .. }
            | ComponentKind::Octupole { .. }
            | ComponentKind::Multipole { .. }
            | ComponentKind::ThinMultipole { .. }
            | ComponentKind::RCollimator(_)
            | ComponentKind::ECollimator(_)
            | ComponentKind::Drift
            | ComponentKind::Marker
    )
}

#[cfg(test)]
mod tests {
    use super::{
        RowSelector, TfsConversionOptions, beam_from_twiss, convert_tfs_file, convert_twiss_table,
        gmad_name, selected_rows,
    };
    use crate::common::constants::{END_OF_LINE_MARKER, FALLBACK_EMITTANCE};
    use crate::modules::collimator::CollimatorOverride;
    use crate::modules::gmad::{ComponentKind, DipoleFields};
    use crate::modules::tfs::parse_table;
    use std::fs;
    use tempfile::TempDir;

    const FODO: &str = r#"@ SEQUENCE         %04s "FODO"
@ PARTICLE         %08s "ELECTRON"
@ ENERGY           %le  250
@ EX               %le  2.0e-11
@ EY               %le  1
@ SIGE             %le  1.0e-4
* NAME      KEYWORD       S     L     ANGLE  K1L    K2L    HKICK   TILT  BETX   BETY   ALFX   ALFY   DX
$ %s        %s            %le   %le   %le    %le    %le    %le     %le   %le    %le    %le    %le    %le
 "START"    "MARKER"      0.0   0.0   0.0    0.0    0.0    0.0     0.0   10.0   20.0   1.0    -1.0   0.0
 "D1"       "DRIFT"       1.0   1.0   0.0    0.0    0.0    0.0     0.0   12.0   18.0   0.5    -0.5   0.0
 "QF.1"     "QUADRUPOLE"  1.5   0.5   0.0    0.2    0.0    0.0     0.0   14.0   16.0   0.0    0.0    0.01
 "SX"       "SEXTUPOLE"   1.75  0.25  0.0    0.0    0.05   0.0     0.0   14.0   16.0   0.0    0.0    0.01
 "HK"       "HKICKER"     1.75  0.0   0.0    0.0    0.0    1.0e-5  0.0   14.0   16.0   0.0    0.0    0.01
 "B1"       "SBEND"       2.75  1.0   0.01   0.0    0.0    0.0     0.0   15.0   15.0   0.0    0.0    0.02
 "BPM"      "MONITOR"     2.75  0.0   0.0    0.0    0.0    0.0     0.0   15.0   15.0   0.0    0.0    0.02
 "END"      "MARKER"      2.75  0.0   0.0    0.0    0.0    0.0     0.0   15.0   15.0   0.0    0.0    0.02
"#;

    fn fodo() -> crate::modules::tfs::Table {
        parse_table(FODO).expect("twiss should parse")
    }

    #[test]
    fn keywords_map_to_gmad_components() {
        let options = TfsConversionOptions {
            flip_magnets: Some(false),
            ..TfsConversionOptions::default()
        };
        let conversion = convert_twiss_table(&fodo(), "fodo", &options).expect("convert");

        assert_eq!(conversion.machine.title, "FODO");
        assert_eq!(
            conversion.machine.sequence(),
            &["D1", "QF_1", "SX", "HK", "B1", END_OF_LINE_MARKER]
        );
        assert_eq!(conversion.report.omitted, &["START", "BPM", "END"]);
        assert_eq!(conversion.report.placed, 5);
        assert_eq!(
            conversion.report.placed + conversion.report.omitted.len(),
            conversion.report.input_count
        );

        let machine = &conversion.machine;
        assert_eq!(
            machine.component("QF_1").map(|c| c.kind.clone()),
            Some(ComponentKind::Quadrupole { k1: 0.4 })
        );
        assert_eq!(
            machine.component("SX").map(|c| c.kind.clone()),
            Some(ComponentKind::Sextupole { k2: 0.2, tilt: 0.0 })
        );
        assert_eq!(
            machine.component("HK").map(|c| c.kind.clone()),
            Some(ComponentKind::HKicker { angle: 1.0e-5 })
        );
        assert_eq!(
            machine.component("B1").map(|c| c.kind.clone()),
            Some(ComponentKind::SBend(DipoleFields {
                angle: 0.01,
                ..DipoleFields::default()
            }))
        );
    }

    #[test]
    fn electron_tables_flip_everything_but_bends() {
        let conversion =
            convert_twiss_table(&fodo(), "fodo", &TfsConversionOptions::default()).expect("convert");
        let machine = &conversion.machine;

        assert_eq!(
            machine.component("QF_1").map(|c| c.kind.clone()),
            Some(ComponentKind::Quadrupole { k1: -0.4 })
        );
        assert_eq!(
            machine.component("HK").map(|c| c.kind.clone()),
            Some(ComponentKind::HKicker { angle: -1.0e-5 })
        );
        assert!(matches!(
            machine.component("B1").map(|c| &c.kind),
            Some(ComponentKind::SBend(fields)) if fields.angle == 0.01
        ));
    }

    #[test]
    fn proton_tables_keep_polarity_unless_asked() {
        let table = parse_table(&FODO.replace("\"ELECTRON\"", "\"PROTON\"")).expect("parse");
        assert!(!TfsConversionOptions::default().flips_magnets(&table));
        let forced = TfsConversionOptions {
            flip_magnets: Some(true),
            ..TfsConversionOptions::default()
        };
        assert!(forced.flips_magnets(&table));
    }

    #[test]
    fn zero_length_rows_are_kept_when_skipping_is_off() {
        let mut options = TfsConversionOptions::default();
        options.mapper.skip_zero_length = false;
        let conversion = convert_twiss_table(&fodo(), "fodo", &options).expect("convert");

        assert!(conversion.report.omitted.is_empty());
        assert_eq!(conversion.report.placed, 8);
        assert_eq!(
            conversion.machine.component("BPM").map(|c| c.kind.clone()),
            Some(ComponentKind::Marker)
        );
    }

    #[test]
    fn start_and_stop_select_a_half_open_range() {
        let options = TfsConversionOptions {
            start: Some(RowSelector::parse("D1")),
            stop: Some(RowSelector::parse("SX")),
            ..TfsConversionOptions::default()
        };
        let conversion = convert_twiss_table(&fodo(), "fodo", &options).expect("convert");

        assert_eq!(
            conversion.machine.sequence(),
            &["D1", "QF_1", END_OF_LINE_MARKER]
        );
        assert_eq!(conversion.report.input_count, 2);
    }

    #[test]
    fn negative_step_walks_backwards() {
        let table = fodo();
        let rows = selected_rows(
            &table,
            Some(&RowSelector::Index(3)),
            Some(&RowSelector::Index(0)),
            -1,
        )
        .expect("rows");
        assert_eq!(rows, vec![3, 2, 1]);

        let error = selected_rows(&table, None, None, 0).expect_err("zero step");
        assert_eq!(error.code(), "INPUT.RANGE_STEP");
        let error = selected_rows(&table, Some(&RowSelector::parse("NOPE")), None, 1)
            .expect_err("unknown start");
        assert_eq!(error.code(), "INPUT.RANGE_NAME");
    }

    #[test]
    fn beam_comes_from_header_and_row_before_start() {
        let table = fodo();
        let beam = beam_from_twiss(&table, Some(&RowSelector::parse("QF.1"))).expect("beam");

        assert_eq!(beam.particle, "e-");
        assert_eq!(beam.energy, 250.0);
        assert_eq!(beam.distribution, "gausstwiss");
        assert_eq!(beam.beta_x, 12.0);
        assert_eq!(beam.alpha_y, -0.5);
        assert_eq!(beam.emittance_x, 2.0e-11);
        assert_eq!(beam.emittance_y, FALLBACK_EMITTANCE);
        assert_eq!(beam.sigma_e, 1.0e-4);

        let first = beam_from_twiss(&table, None).expect("beam");
        assert_eq!(first.beta_x, 10.0);
    }

    #[test]
    fn beam_needs_energy_header() {
        let table = parse_table(&FODO.replace("@ ENERGY           %le  250\n", "")).expect("parse");
        let error = beam_from_twiss(&table, None).expect_err("no energy");
        assert_eq!(error.code(), "INPUT.TABLE_HEADER");
    }

    #[test]
    fn zero_length_quadrupole_with_strength_is_rejected() {
        let table = parse_table(&FODO.replace(
            "\"QF.1\"     \"QUADRUPOLE\"  1.5   0.5",
            "\"QF.1\"     \"QUADRUPOLE\"  1.5   0.0",
        ))
        .expect("parse");
        let error = convert_twiss_table(&table, "fodo", &TfsConversionOptions::default())
            .expect_err("zero length quadrupole");
        assert_eq!(error.code(), "INPUT.ELEMENT_PROPERTY");
    }

    #[test]
    fn collimators_need_an_override_entry() {
        let table = parse_table(
            r#"@ PARTICLE %08s "PROTON"
@ ENERGY %le 7000
@ EX %le 1e-9
@ EY %le 1e-9
* NAME     KEYWORD        L     TILT
$ %s       %s             %le   %le
 "TCP.A"   "RCOLLIMATOR"  0.6   0.3
 "TCP.B"   "ECOLLIMATOR"  0.6   0.0
"#,
        )
        .expect("parse");
        let mut options = TfsConversionOptions::default();
        options.mapper.collimator_overrides.insert(
            "TCP.A".to_string(),
            CollimatorOverride {
                xsize: Some(0.002),
                material: Some("Carbon".to_string()),
                ..CollimatorOverride::default()
            },
        );
        let conversion = convert_twiss_table(&table, "lhc", &options).expect("convert");
        let machine = &conversion.machine;

        let jaw = machine.component("TCP_A").expect("collimator");
        assert!(matches!(
            &jaw.kind,
            ComponentKind::RCollimator(fields)
                if fields.xsize == 0.002 && fields.angle == 0.3 && fields.material == "Carbon"
        ));
        assert!(jaw.parameters.is_empty());
        assert_eq!(
            machine.component("TCP_B").map(|c| c.kind.clone()),
            Some(ComponentKind::Drift)
        );
    }

    #[test]
    fn madx_aperture_and_overrides_use_the_table_name() {
        let table = parse_table(
            r#"@ PARTICLE %08s "PROTON"
@ ENERGY %le 7000
@ EX %le 1e-9
@ EY %le 1e-9
* NAME     KEYWORD   L     APER_1
$ %s       %s        %le   %le
 "D.1"     "DRIFT"   2.0   0.03
 "D.2"     "DRIFT"   2.0   0.0
"#,
        )
        .expect("parse");
        let mut options = TfsConversionOptions {
            use_madx_aperture: true,
            ..TfsConversionOptions::default()
        };
        options.mapper.aperture_overrides.insert("D.2".to_string(), 0.05);
        let conversion = convert_twiss_table(&table, "lhc", &options).expect("convert");

        assert_eq!(conversion.machine.component("D_1").and_then(|c| c.aperture), Some(0.03));
        assert_eq!(conversion.machine.component("D_2").and_then(|c| c.aperture), Some(0.05));
    }

    #[test]
    fn linear_option_replaces_thin_multipoles() {
        let table = parse_table(
            r#"@ PARTICLE %08s "PROTON"
@ ENERGY %le 7000
@ EX %le 1e-9
@ EY %le 1e-9
* NAME     KEYWORD      L     K1L    K2SL
$ %s       %s           %le   %le    %le
 "MP"      "MULTIPOLE"  0.0   0.1    0.02
"#,
        )
        .expect("parse");
        let thin = convert_twiss_table(&table, "mp", &TfsConversionOptions::default())
            .expect("convert");
        assert!(matches!(
            thin.machine.component("MP").map(|c| &c.kind),
            Some(ComponentKind::ThinMultipole { knl, ksl, .. }) if knl[0] == 0.1 && ksl[1] == 0.02
        ));

        let linear = TfsConversionOptions {
            linear: true,
            ..TfsConversionOptions::default()
        };
        let conversion = convert_twiss_table(&table, "mp", &linear).expect("convert");
        assert_eq!(
            conversion.machine.component("MP").map(|c| c.kind.clone()),
            Some(ComponentKind::Marker)
        );
    }

    #[test]
    fn gmad_names_replace_punctuation() {
        assert_eq!(gmad_name("MQ.1$START"), "MQ_1_START");
        assert_eq!(gmad_name("plain_name2"), "plain_name2");
    }

    #[test]
    fn tfs_file_conversion_writes_a_lattice_with_beam() {
        let temp = TempDir::new().expect("tempdir");
        let input = temp.path().join("fodo.tfs");
        let output = temp.path().join("fodo.gmad");
        fs::write(&input, FODO).expect("write twiss");

        let conversion =
            convert_tfs_file(&input, &output, &TfsConversionOptions::default()).expect("convert");
        let written = fs::read_to_string(&output).expect("lattice");

        assert_eq!(conversion.report.placed, 5);
        assert!(written.contains("QF_1: quadrupole"));
        assert!(written.contains("particle=\"e-\""));
        assert!(written.contains("theendoftheline: marker;"));
        assert!(!written.contains("inf"));
    }
}
