//! In-memory GMAD machine model and its text writer.

mod beam;
mod writer;

pub use beam::Beam;
pub use writer::{render_component, render_machine};

use crate::common::constants::MULTIPOLE_MAX_ORDER;
use crate::domain::{LatticeError, LatticeResult, PropertyValue};
use crate::modules::LatticeBuilder;
use crate::modules::serialization::write_text_artifact;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DipoleFields {
    pub angle: f64,
    pub k1: f64,
    pub e1: f64,
    pub e2: f64,
    pub fint: f64,
    pub fintx: f64,
    pub hgap: f64,
    pub tilt: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollimatorFields {
    pub xsize: f64,
    pub ysize: f64,
    pub angle: f64,
    pub material: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CavityFields {
    pub gradient: f64,
    pub freq: f64,
    pub phi0: f64,
    pub eloss: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    Drift,
    Marker,
    HKicker { angle: f64 },
    VKicker { angle: f64 },
    Kicker { hkick: f64, vkick: f64 },
    SBend(DipoleFields),
    /// Carries no fields: the converted length already holds the bend angle.
    RBend,
    /// Rectangular bend with its real angle, as read from a twiss table.
    RBendDipole(DipoleFields),
    Quadrupole { k1: f64 },
    Sextupole { k2: f64, tilt: f64 },
    Octupole { k3: f64, tilt: f64 },
    Multipole {
        knl: [f64; MULTIPOLE_MAX_ORDER],
        ksl: [f64; MULTIPOLE_MAX_ORDER],
        tilt: f64,
    },
    ThinMultipole {
        knl: [f64; MULTIPOLE_MAX_ORDER],
        ksl: [f64; MULTIPOLE_MAX_ORDER],
        tilt: f64,
    },
    ECollimator(CollimatorFields),
    RCollimator(CollimatorFields),
    RfCavity(CavityFields),
}

impl ComponentKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Drift => "drift",
            Self::Marker => "marker",
            Self::HKicker { .. } => "hkicker",
            Self::VKicker { .. } => "vkicker",
            Self::Kicker { .. } => "kicker",
            Self::SBend(_) => "sbend",
            Self::RBend | Self::RBendDipole(_) => "rbend",
            Self::Quadrupole { .. } => "quadrupole",
            Self::Sextupole { .. } => "sextupole",
            Self::Octupole { .. } => "octupole",
            Self::Multipole { .. } => "multipole",
            Self::ThinMultipole { .. } => "thinmultipole",
            Self::ECollimator(_) => "ecol",
            Self::RCollimator(_) => "rcol",
            Self::RfCavity(_) => "rf",
        }
    }
}

/// One GMAD element definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub length: f64,
    pub kind: ComponentKind,
    /// Circular aperture radius in metres.
    pub aperture: Option<f64>,
    /// User-supplied GMAD parameters, written after the typed fields.
    pub parameters: Vec<(String, PropertyValue)>,
}

impl Component {
    pub fn new(name: impl Into<String>, length: f64, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            length,
            kind,
            aperture: None,
            parameters: Vec::new(),
        }
    }

    pub fn drift(name: impl Into<String>, length: f64) -> Self {
        Self::new(name, length, ComponentKind::Drift)
    }

    pub fn marker(name: impl Into<String>) -> Self {
        Self::new(name, 0.0, ComponentKind::Marker)
    }

    pub fn with_aperture(mut self, radius: f64) -> Self {
        self.aperture = Some(radius);
        self
    }

    /// Sets a user parameter, replacing an earlier value with the same name.
    pub fn set_parameter(&mut self, name: &str, value: PropertyValue) {
        match self.parameters.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.parameters.push((name.to_string(), value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SamplerSelection {
    #[default]
    All,
    None,
    Named(Vec<String>),
}

/// Ordered component definitions plus the placed sequence.
///
/// A name is defined once; later components with the same name only add
/// another placement to the sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Machine {
    pub title: String,
    components: Vec<Component>,
    definitions: BTreeMap<String, usize>,
    sequence: Vec<String>,
    beam: Option<Beam>,
    samplers: Vec<SamplerSelection>,
    options: Vec<(String, PropertyValue)>,
}

impl Machine {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.definitions
            .get(name)
            .and_then(|index| self.components.get(*index))
    }

    pub fn sequence(&self) -> &[String] {
        &self.sequence
    }

    pub fn beam(&self) -> Option<&Beam> {
        self.beam.as_ref()
    }

    pub fn samplers(&self) -> &[SamplerSelection] {
        &self.samplers
    }

    pub fn options(&self) -> &[(String, PropertyValue)] {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&PropertyValue> {
        self.options
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn render(&self) -> String {
        render_machine(self)
    }
}

impl LatticeBuilder for Machine {
    fn add_component(&mut self, component: Component) {
        self.sequence.push(component.name.clone());
        match self.definitions.get(&component.name) {
            Some(index) => {
                if self.components[*index] != component {
                    tracing::warn!(
                        component = %component.name,
                        "conflicting redefinition ignored; first definition is kept"
                    );
                }
            }
            None => {
                self.definitions
                    .insert(component.name.clone(), self.components.len());
                self.components.push(component);
            }
        }
    }

    fn add_beam(&mut self, beam: Beam) {
        self.beam = Some(beam);
    }

    fn add_sampler(&mut self, selection: SamplerSelection) {
        if selection != SamplerSelection::None {
            self.samplers.push(selection);
        }
    }

    fn set_option(&mut self, name: &str, value: PropertyValue) {
        match self.options.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.options.push((name.to_string(), value)),
        }
    }

    fn write_lattice(&self, path: &Path) -> LatticeResult<()> {
        write_text_artifact(path, &self.render()).map_err(|source| {
            LatticeError::io_system(
                "IO.GMAD_WRITE",
                format!("failed to write lattice '{}': {}", path.display(), source),
            )
        })?;
        tracing::info!(
            path = %path.display(),
            components = self.components.len(),
            placements = self.sequence.len(),
            "wrote gmad lattice"
        );
        Ok(())
    }
}
