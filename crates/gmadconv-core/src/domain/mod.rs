pub mod errors;

pub use errors::{
    ConversionResult, ExitStatus, LatticeError, LatticeErrorCategory, LatticeResult,
    ParserResult,
};

use crate::common::constants::{PLACEHOLDER_LENGTH, ZERO_LENGTH_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Drift,
    HKicker,
    VKicker,
    Marker,
    SBend,
    RBend,
    Quadrupole,
    Sextupole,
    Octupole,
    Multipole,
    ECollimator,
    RCollimator,
    Wire,
    Instrument,
    Monitor,
    LCavity,
    Line,
    Unknown(String),
}

impl ElementKind {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword.trim().to_ascii_uppercase().as_str() {
            "DRIFT" => Self::Drift,
            "HKICKER" => Self::HKicker,
            "VKICKER" => Self::VKicker,
            "MARKER" => Self::Marker,
            "SBEND" => Self::SBend,
            "RBEND" => Self::RBend,
            "QUADRUPOLE" => Self::Quadrupole,
            "SEXTUPOLE" => Self::Sextupole,
            "OCTUPOLE" => Self::Octupole,
            "MULTIPOLE" => Self::Multipole,
            "ECOLLIMATOR" => Self::ECollimator,
            "RCOLLIMATOR" => Self::RCollimator,
            "WIRE" => Self::Wire,
            "INSTRUMENT" => Self::Instrument,
            "MONITOR" => Self::Monitor,
            "LCAVITY" => Self::LCavity,
            "LINE" => Self::Line,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Drift => "DRIFT",
            Self::HKicker => "HKICKER",
            Self::VKicker => "VKICKER",
            Self::Marker => "MARKER",
            Self::SBend => "SBEND",
            Self::RBend => "RBEND",
            Self::Quadrupole => "QUADRUPOLE",
            Self::Sextupole => "SEXTUPOLE",
            Self::Octupole => "OCTUPOLE",
            Self::Multipole => "MULTIPOLE",
            Self::ECollimator => "ECOLLIMATOR",
            Self::RCollimator => "RCOLLIMATOR",
            Self::Wire => "WIRE",
            Self::Instrument => "INSTRUMENT",
            Self::Monitor => "MONITOR",
            Self::LCavity => "LCAVITY",
            Self::Line => "LINE",
            Self::Unknown(tag) => tag.as_str(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl Display for ElementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{}", value),
            Self::Text(text) => write!(f, "\"{}\"", text),
        }
    }
}

/// One named element of a beamline: its kind plus the raw property map.
///
/// Property names are stored upper case. Numeric accessors never fail on
/// absence; they only fail when a property holds text where a number is
/// required.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub name: String,
    pub kind: ElementKind,
    pub properties: BTreeMap<String, PropertyValue>,
    pub source_line: usize,
}

impl ElementRecord {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: BTreeMap::new(),
            source_line: 0,
        }
    }

    pub fn with_number(mut self, key: &str, value: f64) -> Self {
        self.set(key, PropertyValue::Number(value));
        self
    }

    pub fn with_text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, PropertyValue::Text(value.into()));
        self
    }

    pub fn set(&mut self, key: &str, value: PropertyValue) {
        self.properties.insert(key.to_ascii_uppercase(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(&key.to_ascii_uppercase())
    }

    pub fn number(&self, key: &str) -> LatticeResult<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(PropertyValue::Number(value)) => Ok(Some(*value)),
            Some(PropertyValue::Text(text)) => Err(LatticeError::input_validation(
                "INPUT.ELEMENT_PROPERTY",
                format!(
                    "element '{}' property {} must be numeric, found '{}'",
                    self.name,
                    key.to_ascii_uppercase(),
                    text
                ),
            )),
        }
    }

    pub fn number_or(&self, key: &str, default: f64) -> LatticeResult<f64> {
        Ok(self.number(key)?.unwrap_or(default))
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(PropertyValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn has_explicit_length(&self) -> bool {
        self.get("L").is_some()
    }

    /// Length in metres; thin elements get the placeholder length.
    pub fn length(&self) -> LatticeResult<f64> {
        self.number_or("L", PLACEHOLDER_LENGTH)
    }

    pub fn is_zero_length(&self) -> LatticeResult<bool> {
        Ok(self.length()? < ZERO_LENGTH_THRESHOLD)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Beamline {
    pub name: String,
    pub elements: Vec<ElementRecord>,
}

impl Beamline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: Vec::new(),
        }
    }

    pub fn push(&mut self, element: ElementRecord) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ElementRecord> {
        self.elements.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.elements
            .iter()
            .map(|element| element.name.as_str())
            .collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.elements
            .iter()
            .position(|element| element.name.eq_ignore_ascii_case(name))
    }

    /// Inclusive slice from the first `start` to the first `end` at or after it.
    pub fn slice_between(&self, start: Option<&str>, end: Option<&str>) -> LatticeResult<Beamline> {
        let first = match start {
            Some(name) => self.position(name).ok_or_else(|| unknown_bound(name, "start"))?,
            None => 0,
        };
        let last = match end {
            Some(name) => self.elements[first..]
                .iter()
                .position(|element| element.name.eq_ignore_ascii_case(name))
                .map(|offset| first + offset)
                .ok_or_else(|| unknown_bound(name, "end"))?,
            None => self.elements.len().saturating_sub(1),
        };

        let elements = if self.elements.is_empty() {
            Vec::new()
        } else {
            self.elements[first..=last].to_vec()
        };

        Ok(Beamline {
            name: self.name.clone(),
            elements,
        })
    }
}

fn unknown_bound(name: &str, which: &str) -> LatticeError {
    LatticeError::input_validation(
        "INPUT.BEAMLINE_RANGE",
        format!("{} element '{}' is not part of the beamline", which, name),
    )
}
