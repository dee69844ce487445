//! Element-kind to GMAD component mapping.
//!
//! `map_element` is pure: it reads one [`ElementRecord`] and decides what,
//! if anything, the GMAD machine receives for it. Logging of the decision
//! is left to the caller so that verbosity stays a conversion option.

use crate::common::constants::{
    DEFAULT_BEAM_PIPE_RADIUS, DEFAULT_COLLIMATOR_MATERIAL, GEV_TO_MEV, MULTIPOLE_MAX_ORDER,
    ZERO_LENGTH_THRESHOLD,
};
use crate::domain::{ElementKind, ElementRecord, LatticeError, LatticeResult, PropertyValue};
use crate::modules::collimator::{CollimatorLogEntry, CollimatorOverride};
use crate::modules::gmad::{CavityFields, CollimatorFields, Component, ComponentKind, DipoleFields};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultipoleMode {
    /// Sextupoles and octupoles become drifts, multipoles become markers.
    #[default]
    Downgrade,
    Native,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapperConfig {
    pub skip_zero_length: bool,
    pub beam_pipe_radius: f64,
    pub collimator_overrides: BTreeMap<String, CollimatorOverride>,
    pub aperture_overrides: BTreeMap<String, f64>,
    /// Extra GMAD parameters per element name.
    pub user_parameters: BTreeMap<String, BTreeMap<String, PropertyValue>>,
    pub multipole_mode: MultipoleMode,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            skip_zero_length: true,
            beam_pipe_radius: DEFAULT_BEAM_PIPE_RADIUS,
            collimator_overrides: BTreeMap::new(),
            aperture_overrides: BTreeMap::new(),
            user_parameters: BTreeMap::new(),
            multipole_mode: MultipoleMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnrecognizedElement {
    pub name: String,
    pub tag: String,
    pub source_line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Component(Component),
    Omitted,
    Unrecognized(UnrecognizedElement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedElement {
    pub outcome: MapOutcome,
    pub collimator_log: Option<CollimatorLogEntry>,
    /// Set when the element was emitted as something other than its own kind.
    pub substitution: Option<&'static str>,
}

impl MappedElement {
    fn component(component: Component) -> Self {
        Self {
            outcome: MapOutcome::Component(component),
            collimator_log: None,
            substitution: None,
        }
    }

    fn substituted(component: Component, substitution: &'static str) -> Self {
        Self {
            substitution: Some(substitution),
            ..Self::component(component)
        }
    }

    fn omitted() -> Self {
        Self {
            outcome: MapOutcome::Omitted,
            collimator_log: None,
            substitution: None,
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match &self.outcome {
            MapOutcome::Component(component) => Some(component),
            _ => None,
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self.outcome, MapOutcome::Omitted)
    }
}

pub fn map_element(record: &ElementRecord, config: &MapperConfig) -> LatticeResult<MappedElement> {
    let name = record.name.as_str();
    let length = record.length()?;

    let mut mapped = match &record.kind {
        ElementKind::Drift => MappedElement::component(Component::drift(name, length)),
        ElementKind::HKicker => MappedElement::component(Component::new(
            name,
            length,
            ComponentKind::HKicker {
                angle: record.number_or("KICK", 0.0)?,
            },
        )),
        ElementKind::VKicker => MappedElement::component(Component::new(
            name,
            length,
            ComponentKind::VKicker {
                angle: record.number_or("KICK", 0.0)?,
            },
        )),
        ElementKind::Marker => {
            if config.skip_zero_length {
                MappedElement::omitted()
            } else {
                MappedElement::component(Component::marker(name))
            }
        }
        ElementKind::SBend => MappedElement::component(Component::new(
            name,
            length,
            ComponentKind::SBend(DipoleFields {
                angle: record.number_or("ANGLE", 0.0)?,
                k1: integrated_per_length(record, "K1", length)?,
                e1: record.number_or("E1", 0.0)?,
                e2: record.number_or("E2", 0.0)?,
                fint: record.number_or("FINT", 0.0)?,
                fintx: record.number_or("FINTX", 0.0)?,
                hgap: record.number_or("HGAP", 0.0)?,
                tilt: record.number_or("TILT", 0.0)?,
            }),
        )),
        // The bend angle lands in the length slot. Kept as the established
        // output of this converter; see DESIGN.md.
        ElementKind::RBend => MappedElement::component(Component::new(
            name,
            record.number_or("ANGLE", 0.0)?,
            ComponentKind::RBend,
        )),
        ElementKind::Quadrupole => MappedElement::component(Component::new(
            name,
            length,
            ComponentKind::Quadrupole {
                k1: integrated_per_length(record, "K1", length)?,
            },
        )),
        ElementKind::Sextupole => match config.multipole_mode {
            MultipoleMode::Downgrade => MappedElement::substituted(
                Component::drift(name, length),
                "sextupole -> drift",
            ),
            MultipoleMode::Native => MappedElement::component(Component::new(
                name,
                length,
                ComponentKind::Sextupole {
                    k2: integrated_per_length(record, "K2", length)?,
                    tilt: record.number_or("TILT", 0.0)?,
                },
            )),
        },
        ElementKind::Octupole => match config.multipole_mode {
            MultipoleMode::Downgrade => MappedElement::substituted(
                Component::drift(name, length),
                "octupole -> drift",
            ),
            MultipoleMode::Native => MappedElement::component(Component::new(
                name,
                length,
                ComponentKind::Octupole {
                    k3: integrated_per_length(record, "K3", length)?,
                    tilt: record.number_or("TILT", 0.0)?,
                },
            )),
        },
        ElementKind::Multipole => match config.multipole_mode {
            MultipoleMode::Downgrade => {
                MappedElement::substituted(Component::marker(name), "multipole -> marker")
            }
            MultipoleMode::Native => {
                let mut knl = [0.0; MULTIPOLE_MAX_ORDER];
                let mut ksl = [0.0; MULTIPOLE_MAX_ORDER];
                for order in 1..=MULTIPOLE_MAX_ORDER {
                    knl[order - 1] = record.number_or(&format!("K{}L", order), 0.0)?;
                    ksl[order - 1] = record.number_or(&format!("K{}S", order), 0.0)?;
                }
                MappedElement::component(Component::new(
                    name,
                    length,
                    ComponentKind::Multipole {
                        knl,
                        ksl,
                        tilt: record.number_or("TILT", 0.0)?,
                    },
                ))
            }
        },
        ElementKind::ECollimator => map_collimator(record, length, config, ComponentKind::ECollimator)?,
        ElementKind::RCollimator => map_collimator(record, length, config, ComponentKind::RCollimator)?,
        ElementKind::Wire | ElementKind::Instrument | ElementKind::Monitor => {
            map_diagnostic(record, length, config)?
        }
        ElementKind::LCavity => {
            let delta_e = record.number_or("DELTAE", 0.0)? * GEV_TO_MEV;
            MappedElement::component(Component::new(
                name,
                length,
                ComponentKind::RfCavity(CavityFields {
                    gradient: per_metre(name, "DELTAE", delta_e, length)?,
                    freq: record.number_or("FREQ", 0.0)?,
                    phi0: record.number_or("PHI0", 0.0)?,
                    eloss: record.number_or("ELOSS", 0.0)?,
                }),
            ))
        }
        ElementKind::Line | ElementKind::Unknown(_) => MappedElement {
            outcome: MapOutcome::Unrecognized(UnrecognizedElement {
                name: record.name.clone(),
                tag: record.kind.to_string(),
                source_line: record.source_line,
            }),
            collimator_log: None,
            substitution: None,
        },
    };

    if let MapOutcome::Component(component) = &mut mapped.outcome {
        apply_element_overrides(component, config);
    }

    Ok(mapped)
}

/// Attaches the configured aperture and user parameters for this name.
pub(crate) fn apply_element_overrides(component: &mut Component, config: &MapperConfig) {
    if let Some(radius) = config.aperture_overrides.get(&component.name) {
        component.aperture = Some(*radius);
    }
    if let Some(parameters) = config.user_parameters.get(&component.name) {
        for (key, value) in parameters {
            component.set_parameter(key, value.clone());
        }
    }
}

/// Strength properties hold integrated values; GMAD expects per-metre ones.
fn integrated_per_length(record: &ElementRecord, key: &str, length: f64) -> LatticeResult<f64> {
    match record.number(key)? {
        Some(integrated) => per_metre(&record.name, key, integrated, length),
        None => Ok(0.0),
    }
}

/// `quantity / length`. A non-zero quantity on a zero-length element has
/// no finite per-metre value and is rejected.
pub(crate) fn per_metre(
    element: &str,
    property: &str,
    quantity: f64,
    length: f64,
) -> LatticeResult<f64> {
    if quantity == 0.0 {
        return Ok(0.0);
    }
    if length.abs() < ZERO_LENGTH_THRESHOLD {
        return Err(LatticeError::input_validation(
            "INPUT.ELEMENT_PROPERTY",
            format!(
                "element '{}' has {} = {} but zero length; no per-metre value exists",
                element, property, quantity
            ),
        ));
    }
    Ok(quantity / length)
}

fn map_collimator(
    record: &ElementRecord,
    length: f64,
    config: &MapperConfig,
    kind: fn(CollimatorFields) -> ComponentKind,
) -> LatticeResult<MappedElement> {
    let radius = config.beam_pipe_radius;

    if let Some(entry) = config.collimator_overrides.get(&record.name) {
        let fields = CollimatorFields {
            xsize: entry.xsize.unwrap_or(radius),
            ysize: entry.ysize.unwrap_or(radius),
            angle: entry.angle.unwrap_or(0.0),
            material: entry
                .material
                .clone()
                .unwrap_or_else(|| DEFAULT_COLLIMATOR_MATERIAL.to_string()),
        };
        return Ok(MappedElement::component(Component::new(
            record.name.as_str(),
            length,
            kind(fields),
        )));
    }

    let fields = CollimatorFields {
        xsize: record.number_or("XSIZE", radius)?,
        ysize: record.number_or("YSIZE", radius)?,
        angle: record.number_or("ANGLE", 0.0)?,
        material: DEFAULT_COLLIMATOR_MATERIAL.to_string(),
    };
    let log = CollimatorLogEntry {
        name: record.name.clone(),
        angle: fields.angle,
        length,
        xsize: fields.xsize,
        ysize: fields.ysize,
        material: fields.material.clone(),
    };

    Ok(MappedElement {
        collimator_log: Some(log),
        ..MappedElement::component(Component::new(record.name.as_str(), length, kind(fields)))
    })
}

fn map_diagnostic(
    record: &ElementRecord,
    length: f64,
    config: &MapperConfig,
) -> LatticeResult<MappedElement> {
    if !record.is_zero_length()? {
        return Ok(MappedElement::component(Component::drift(
            record.name.as_str(),
            length,
        )));
    }

    if config.skip_zero_length {
        return Ok(MappedElement::omitted());
    }

    let substitution = match record.kind {
        ElementKind::Wire => "wire -> marker",
        ElementKind::Instrument => "instrument -> marker",
        _ => "monitor -> marker",
    };
    Ok(MappedElement::substituted(
        Component::marker(record.name.as_str()),
        substitution,
    ))
}
