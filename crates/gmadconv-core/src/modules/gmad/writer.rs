use super::{
    Beam, CollimatorFields, Component, ComponentKind, DipoleFields, Machine, SamplerSelection,
};
use crate::common::constants::LATTICE_LINE_NAME;
use crate::domain::PropertyValue;
use crate::modules::serialization::format_shortest_f64;
use std::fmt::Write;

const SEQUENCE_NAMES_PER_LINE: usize = 8;

pub fn render_machine(machine: &Machine) -> String {
    let mut out = String::new();
    out.push_str(&format!("! {}\n", machine.title));
    out.push_str("! GMAD lattice written by gmadconv\n\n");

    for component in machine.components() {
        out.push_str(&render_component(component));
        out.push('\n');
    }
    out.push('\n');

    out.push_str(&render_sequence(machine.sequence()));
    out.push_str(&format!("use, period={};\n", LATTICE_LINE_NAME));

    for selection in machine.samplers() {
        out.push_str(&render_sampler(selection));
    }

    if let Some(beam) = machine.beam() {
        out.push('\n');
        out.push_str(&render_beam(beam));
    }

    if !machine.options().is_empty() {
        out.push('\n');
        let options = machine
            .options()
            .iter()
            .map(|(name, value)| format!("{}={}", name, render_value(value)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("option, {};\n", options));
    }

    out
}

pub fn render_component(component: &Component) -> String {
    let mut fields: Vec<String> = Vec::new();
    let metres = |value: f64| format!("{}*m", format_shortest_f64(value));

    if !matches!(component.kind, ComponentKind::Marker) {
        fields.push(format!("l={}", metres(component.length)));
    }

    match &component.kind {
        ComponentKind::Drift | ComponentKind::Marker | ComponentKind::RBend => {}
        ComponentKind::HKicker { angle } | ComponentKind::VKicker { angle } => {
            fields.push(format!("angle={}", format_shortest_f64(*angle)));
        }
        ComponentKind::Kicker { hkick, vkick } => {
            fields.push(format!("hkick={}", format_shortest_f64(*hkick)));
            fields.push(format!("vkick={}", format_shortest_f64(*vkick)));
        }
        ComponentKind::SBend(dipole) | ComponentKind::RBendDipole(dipole) => {
            fields.extend(dipole_fields(dipole));
        }
        ComponentKind::Quadrupole { k1 } => fields.push(format!("k1={}", format_shortest_f64(*k1))),
        ComponentKind::Sextupole { k2, tilt } => {
            fields.push(format!("k2={}", format_shortest_f64(*k2)));
            fields.push(format!("tilt={}", format_shortest_f64(*tilt)));
        }
        ComponentKind::Octupole { k3, tilt } => {
            fields.push(format!("k3={}", format_shortest_f64(*k3)));
            fields.push(format!("tilt={}", format_shortest_f64(*tilt)));
        }
        ComponentKind::Multipole { knl, ksl, tilt }
        | ComponentKind::ThinMultipole { knl, ksl, tilt } => {
            fields.push(format!("knl={}", render_coefficients(knl)));
            fields.push(format!("ksl={}", render_coefficients(ksl)));
            fields.push(format!("tilt={}", format_shortest_f64(*tilt)));
        }
        ComponentKind::ECollimator(collimator) | ComponentKind::RCollimator(collimator) => {
            fields.extend(collimator_fields(collimator));
        }
        ComponentKind::RfCavity(cavity) => {
            fields.push(format!("gradient={}*MV/m", format_shortest_f64(cavity.gradient)));
            fields.push(format!("freq={}", format_shortest_f64(cavity.freq)));
            fields.push(format!("phi0={}", format_shortest_f64(cavity.phi0)));
            fields.push(format!("eloss={}", format_shortest_f64(cavity.eloss)));
        }
    }

    if let Some(radius) = component.aperture {
        fields.push(format!("aper1={}", metres(radius)));
    }
    for (name, value) in &component.parameters {
        fields.push(format!("{}={}", name, render_value(value)));
    }

    if fields.is_empty() {
        format!("{}: {};", component.name, component.kind.keyword())
    } else {
        format!(
            "{}: {}, {};",
            component.name,
            component.kind.keyword(),
            fields.join(", ")
        )
    }
}

fn dipole_fields(dipole: &DipoleFields) -> Vec<String> {
    vec![
        format!("angle={}", format_shortest_f64(dipole.angle)),
        format!("k1={}", format_shortest_f64(dipole.k1)),
        format!("e1={}", format_shortest_f64(dipole.e1)),
        format!("e2={}", format_shortest_f64(dipole.e2)),
        format!("fint={}", format_shortest_f64(dipole.fint)),
        format!("fintx={}", format_shortest_f64(dipole.fintx)),
        format!("hgap={}*m", format_shortest_f64(dipole.hgap)),
        format!("tilt={}", format_shortest_f64(dipole.tilt)),
    ]
}

fn collimator_fields(collimator: &CollimatorFields) -> Vec<String> {
    vec![
        format!("xsize={}*m", format_shortest_f64(collimator.xsize)),
        format!("ysize={}*m", format_shortest_f64(collimator.ysize)),
        format!("tilt={}", format_shortest_f64(collimator.angle)),
        format!("material=\"{}\"", collimator.material),
    ]
}

fn render_coefficients(values: &[f64]) -> String {
    let joined = values
        .iter()
        .map(|value| format_shortest_f64(*value))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", joined)
}

fn render_sequence(sequence: &[String]) -> String {
    let rows = sequence
        .chunks(SEQUENCE_NAMES_PER_LINE)
        .map(|chunk| chunk.join(", "))
        .collect::<Vec<_>>();
    format!("{}: line = ({});\n", LATTICE_LINE_NAME, rows.join(",\n\t"))
}

fn render_sampler(selection: &SamplerSelection) -> String {
    match selection {
        SamplerSelection::All => "sample, all;\n".to_string(),
        SamplerSelection::None => String::new(),
        SamplerSelection::Named(names) => names
            .iter()
            .map(|name| format!("sample, range={};\n", name))
            .collect(),
    }
}

fn render_beam(beam: &Beam) -> String {
    let number = |value: f64| format_shortest_f64(value);
    let mut entries = vec![
        format!("particle=\"{}\"", beam.particle),
        format!("energy={}*GeV", number(beam.energy)),
        format!("distrType=\"{}\"", beam.distribution),
        format!("betx={}*m", number(beam.beta_x)),
        format!("bety={}*m", number(beam.beta_y)),
        format!("alfx={}", number(beam.alpha_x)),
        format!("alfy={}", number(beam.alpha_y)),
        format!("emitx={}*m", number(beam.emittance_x)),
        format!("emity={}*m", number(beam.emittance_y)),
    ];

    // Offsets and dispersion are only written when a twiss table set them.
    let optional = [
        ("dispx", beam.disp_x, "*m"),
        ("dispy", beam.disp_y, "*m"),
        ("dispxp", beam.disp_xp, ""),
        ("dispyp", beam.disp_yp, ""),
        ("sigmaE", beam.sigma_e, ""),
        ("X0", beam.x0, "*m"),
        ("Y0", beam.y0, "*m"),
        ("Xp0", beam.xp0, ""),
        ("Yp0", beam.yp0, ""),
    ];
    for (name, value, unit) in optional {
        if value != 0.0 {
            entries.push(format!("{}={}{}", name, number(value), unit));
        }
    }
    entries.push(format!("Z0={}*m", number(beam.z0)));
    entries.push(format!("T0={}", number(beam.t0)));

    let mut out = String::new();
    let last = entries.len() - 1;
    for (index, entry) in entries.iter().enumerate() {
        let prefix = if index == 0 { "beam, " } else { "      " };
        let suffix = if index == last { ";" } else { "," };
        let _ = writeln!(out, "{}{}{}", prefix, entry, suffix);
    }
    out
}

fn render_value(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Number(number) => format_shortest_f64(*number),
        PropertyValue::Text(text) => format!("\"{}\"", text),
    }
}
